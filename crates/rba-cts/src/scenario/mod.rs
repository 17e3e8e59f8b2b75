//! Scenario drivers, one per access mechanism.
//!
//! Every mechanism is planned up front into a list of [`CasePlan`]s. A runnable case is then
//! driven through the same sequence: set up a fresh [`Fixture`], execute the valid run followed
//! by the invalid runs, verify each observation, and drop the fixture before the next case.

mod image_load_store;
mod storage_buffer;
mod texel_fetch;
mod texture;
mod uniform_buffer;
mod vertex_buffer;

use std::fmt;

use rba_gl::{enums as gl, ApiType, Gl};
use serde::{Deserialize, Serialize};

use crate::check::expect_no_error;
use crate::format::TexelFormat;
use crate::report::{CaseOutcome, CaseReport, RunReport};
use crate::verify::{Observation, OutcomeVerifier, Verdict};
use crate::CtsError;

pub const KHR_ROBUST_BUFFER_ACCESS_BEHAVIOR: &str = "GL_KHR_robust_buffer_access_behavior";
pub const ARB_ROBUST_BUFFER_ACCESS_BEHAVIOR: &str = "GL_ARB_robust_buffer_access_behavior";

/// GPU access path a test exercises.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mechanism {
    VertexBufferObjects,
    TexelFetch,
    ImageLoadStore,
    StorageBuffer,
    UniformBuffer,
}

impl Mechanism {
    pub const ALL: [Self; 5] = [
        Self::VertexBufferObjects,
        Self::TexelFetch,
        Self::ImageLoadStore,
        Self::StorageBuffer,
        Self::UniformBuffer,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::VertexBufferObjects => "vertex_buffer_objects",
            Self::TexelFetch => "texel_fetch",
            Self::ImageLoadStore => "image_load_store",
            Self::StorageBuffer => "storage_buffer",
            Self::UniformBuffer => "uniform_buffer",
        }
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which side of a run reaches out of bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Validity {
    Valid,
    SourceInvalid,
    DestinationInvalid,
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Valid => "valid indices",
            Self::SourceInvalid => "invalid source indices",
            Self::DestinationInvalid => "invalid destination indices",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OffsetCategory {
    Zero,
    Close,
    Near,
    Medium,
    High,
}

impl fmt::Display for OffsetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Zero => "zero",
            Self::Close => "close",
            Self::Near => "near",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// How far past the valid range an index reaches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AccessPattern {
    pub category: OffsetCategory,
    /// Added to the element index or texel coordinate.
    pub offset: u32,
    /// Added to the sample index of multisample image accesses.
    pub sample_offset: u32,
}

impl AccessPattern {
    pub const ZERO: Self = Self::new(OffsetCategory::Zero, 0);

    pub const fn new(category: OffsetCategory, offset: u32) -> Self {
        Self {
            category,
            offset,
            sample_offset: 0,
        }
    }

    pub const fn with_samples(category: OffsetCategory, offset: u32, sample_offset: u32) -> Self {
        Self {
            category,
            offset,
            sample_offset,
        }
    }
}

/// One execution of a case's pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AccessRun {
    pub validity: Validity,
    pub pattern: AccessPattern,
}

impl AccessRun {
    pub const VALID: Self = Self {
        validity: Validity::Valid,
        pattern: AccessPattern::ZERO,
    };

    pub fn invalid(validity: Validity, pattern: AccessPattern) -> Self {
        Self { validity, pattern }
    }
}

impl fmt::Display for AccessRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.validity == Validity::Valid {
            return write!(f, "{}", self.validity);
        }
        write!(
            f,
            "{}, {} offset {}",
            self.validity, self.pattern.category, self.pattern.offset
        )?;
        if self.pattern.sample_offset != 0 {
            write!(f, ", sample offset {}", self.pattern.sample_offset)?;
        }
        Ok(())
    }
}

/// Invalid runs, one per offset, all reaching out of bounds on the `validity` side.
pub(crate) fn invalid_runs(validity: Validity, patterns: &[AccessPattern]) -> Vec<AccessRun> {
    patterns
        .iter()
        .map(|&pattern| AccessRun::invalid(validity, pattern))
        .collect()
}

/// A case as decided before any GL work is done.
#[derive(Clone, Debug, PartialEq)]
pub struct CasePlan {
    pub name: String,
    pub mechanism: Mechanism,
    pub format: Option<TexelFormat>,
    pub runs: Vec<AccessRun>,
    /// Set when the case cannot run on this context; the reason is logged.
    pub skip: Option<String>,
}

impl CasePlan {
    pub fn new(name: impl Into<String>, mechanism: Mechanism, runs: Vec<AccessRun>) -> Self {
        Self {
            name: name.into(),
            mechanism,
            format: None,
            runs,
            skip: None,
        }
    }

    pub fn with_format(mut self, format: TexelFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn skipped(mut self, reason: impl Into<String>) -> Self {
        self.skip = Some(reason.into());
        self
    }
}

/// What the context offers for robust access testing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub api: ApiType,
    pub khr_robust_buffer_access: bool,
    pub arb_robust_buffer_access: bool,
    pub max_integer_samples: i32,
    pub max_image_samples: i32,
}

impl Capabilities {
    pub fn query(gl: &dyn Gl) -> Result<Self, CtsError> {
        let max_integer_samples = gl.get_integer(gl::MAX_INTEGER_SAMPLES);
        expect_no_error(gl, "GetIntegerv")?;
        let max_image_samples = gl.get_integer(gl::MAX_IMAGE_SAMPLES);
        expect_no_error(gl, "GetIntegerv")?;
        Ok(Self {
            api: gl.api_type(),
            khr_robust_buffer_access: gl.is_extension_supported(KHR_ROBUST_BUFFER_ACCESS_BEHAVIOR),
            arb_robust_buffer_access: gl.is_extension_supported(ARB_ROBUST_BUFFER_ACCESS_BEHAVIOR),
            max_integer_samples,
            max_image_samples,
        })
    }

    /// Robust buffer access behaviour is available at all.
    pub fn robust_access_supported(&self) -> bool {
        self.khr_robust_buffer_access || self.arb_robust_buffer_access || self.api.is_core_at_least(4, 3)
    }

    /// Out-of-bounds accesses may also return values from inside the resource.
    pub fn extended_robustness(&self) -> bool {
        self.khr_robust_buffer_access || self.api.is_core_at_least(4, 5)
    }

    /// Four-sample integer textures can be created and bound as images.
    pub fn multisample_supported(&self) -> bool {
        self.max_integer_samples >= 4 && self.max_image_samples >= 4
    }
}

/// Resources of one case, alive from setup until the case finishes.
pub trait Fixture {
    fn execute(&mut self, run: &AccessRun) -> Result<Observation, CtsError>;
    fn verifier(&self) -> &dyn OutcomeVerifier;
}

/// Every case of `mechanism`, including the ones this context has to skip.
pub fn plan(mechanism: Mechanism, caps: &Capabilities) -> Vec<CasePlan> {
    match mechanism {
        Mechanism::VertexBufferObjects => vertex_buffer::plan(),
        Mechanism::TexelFetch => texel_fetch::plan(caps),
        Mechanism::ImageLoadStore => image_load_store::plan(caps),
        Mechanism::StorageBuffer => storage_buffer::plan(),
        Mechanism::UniformBuffer => uniform_buffer::plan(),
    }
}

fn setup<'gl>(gl: &'gl dyn Gl, caps: &Capabilities, case: &CasePlan) -> Result<Box<dyn Fixture + 'gl>, CtsError> {
    let format = || {
        case.format
            .ok_or_else(|| CtsError::Unsupported(format!("case `{}` has no texel format", case.name)))
    };
    let fixture: Box<dyn Fixture + 'gl> = match case.mechanism {
        Mechanism::VertexBufferObjects => Box::new(vertex_buffer::VertexBufferFixture::new(gl, caps)?),
        Mechanism::TexelFetch => Box::new(texel_fetch::TexelFetchFixture::new(gl, caps, format()?)?),
        Mechanism::ImageLoadStore => Box::new(image_load_store::ImageLoadStoreFixture::new(gl, caps, format()?)?),
        Mechanism::StorageBuffer => Box::new(storage_buffer::StorageBufferFixture::new(gl, caps)?),
        Mechanism::UniformBuffer => Box::new(uniform_buffer::UniformBufferFixture::new(gl, caps)?),
    };
    Ok(fixture)
}

/// Drives one planned case to completion.
///
/// A fatal error stops the case: the remaining runs are not attempted. Violations are recorded
/// and the remaining runs still execute. The fixture is dropped, releasing every object it
/// created, before this returns.
pub fn drive_case(gl: &dyn Gl, caps: &Capabilities, case: &CasePlan) -> CaseReport {
    let mut report = CaseReport::new(&case.name);
    if let Some(reason) = &case.skip {
        tracing::info!(case = %case.name, %reason, "case not supported");
        report.outcome = CaseOutcome::Skipped { reason: reason.clone() };
        return report;
    }

    let mut fixture = match setup(gl, caps, case) {
        Ok(fixture) => fixture,
        Err(CtsError::Unsupported(reason)) => {
            tracing::info!(case = %case.name, %reason, "case not supported");
            report.outcome = CaseOutcome::Skipped { reason };
            return report;
        }
        Err(err) => {
            tracing::warn!(case = %case.name, %err, "case setup failed");
            report.outcome = CaseOutcome::Aborted { error: err.to_string() };
            return report;
        }
    };

    let mut violated = false;
    for run in &case.runs {
        let observation = match fixture.execute(run) {
            Ok(observation) => observation,
            Err(err) => {
                tracing::warn!(case = %case.name, %run, %err, "run aborted");
                report.outcome = CaseOutcome::Aborted { error: err.to_string() };
                return report;
            }
        };
        let verdict = match run.validity {
            Validity::Valid => fixture.verifier().verify_valid(&observation),
            validity => fixture.verifier().verify_invalid(validity, &observation),
        };
        match &verdict {
            Verdict::Conformant => tracing::debug!(case = %case.name, %run, "run conformant"),
            Verdict::Violation(mismatch) => {
                violated = true;
                tracing::warn!(case = %case.name, %run, %mismatch, "robustness violation");
            }
        }
        report.runs.push(RunReport::new(run, &verdict));
    }

    report.outcome = if violated {
        CaseOutcome::Failed
    } else {
        CaseOutcome::Passed
    };
    report
}
