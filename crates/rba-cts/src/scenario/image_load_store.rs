//! Compute copies between images with out-of-range load or store coordinates.

use rba_gl::Gl;

use super::texture::{self, bind_image_pair, dispatch_per_texel, probe_multisample, read_back, upload};
use super::{invalid_runs, AccessPattern, AccessRun, Capabilities, CasePlan, Fixture, Mechanism, OffsetCategory, Validity};
use crate::format::TexelFormat;
use crate::resources::{Program, Texture};
use crate::shaders::{self, ProbeExpectation};
use crate::verify::{ImageVerifier, Observation, OutcomeVerifier};
use crate::CtsError;

const OFFSETS: [AccessPattern; 4] = [
    AccessPattern::with_samples(OffsetCategory::Close, 16, 4),
    AccessPattern::with_samples(OffsetCategory::Near, 512, 4),
    AccessPattern::with_samples(OffsetCategory::Medium, 1024, 8),
    AccessPattern::with_samples(OffsetCategory::High, 2048, 8),
];

/// Value the multisample destination is refilled from before an out-of-range store, so a
/// store that lands on an in-range sample overwrites something other than its own value.
const DESTINATION_BASE: u32 = 1000;

pub(super) fn plan(caps: &Capabilities) -> Vec<CasePlan> {
    TexelFormat::ALL
        .into_iter()
        .map(|format| {
            // Multisample accesses go out of range through the sample index only.
            let patterns = if format.is_multisample() {
                OFFSETS.map(|p| AccessPattern::with_samples(p.category, 0, p.sample_offset))
            } else {
                OFFSETS
            };
            let mut runs = vec![AccessRun::VALID];
            runs.extend(invalid_runs(Validity::DestinationInvalid, &patterns));
            runs.extend(invalid_runs(Validity::SourceInvalid, &patterns));

            let case = CasePlan::new(format!("Copying {} image", format.name()), Mechanism::ImageLoadStore, runs)
                .with_format(format);
            if format.is_multisample() && !caps.multisample_supported() {
                return case.skipped(format!(
                    "four samples needed, GL_MAX_INTEGER_SAMPLES is {} and GL_MAX_IMAGE_SAMPLES is {}",
                    caps.max_integer_samples, caps.max_image_samples
                ));
            }
            case
        })
        .collect()
}

/// `(source coordinate, destination coordinate, source sample, destination sample)` offsets.
fn offsets(run: &AccessRun) -> (u32, u32, u32, u32) {
    let AccessPattern {
        offset, sample_offset, ..
    } = run.pattern;
    match run.validity {
        Validity::Valid => (0, 0, 0, 0),
        Validity::SourceInvalid => (offset, 0, sample_offset, 0),
        Validity::DestinationInvalid => (0, offset, 0, sample_offset),
    }
}

pub(super) struct ImageLoadStoreFixture<'gl> {
    gl: &'gl dyn Gl,
    caps: Capabilities,
    format: TexelFormat,
    program: Program<'gl>,
    source: Texture<'gl>,
    destination: Texture<'gl>,
    verifier: ImageVerifier,
}

impl<'gl> ImageLoadStoreFixture<'gl> {
    pub(super) fn new(gl: &'gl dyn Gl, caps: &Capabilities, format: TexelFormat) -> Result<Self, CtsError> {
        let destination = texture::destination_texture(gl, format)?;
        let source = texture::source_texture(gl, caps.api, format)?;
        Ok(Self {
            gl,
            caps: *caps,
            format,
            program: Program::new(gl),
            source,
            destination,
            verifier: ImageVerifier::new(format),
        })
    }

    /// Leaves the destination holding values no copy of the source can produce. Returns the
    /// single-sample contents the run starts from.
    fn poison_destination(&self, run: &AccessRun) -> Result<Option<Vec<u8>>, CtsError> {
        if self.format.is_multisample() {
            if run.validity == Validity::DestinationInvalid {
                texture::fill_multisample(self.gl, self.caps.api, &self.destination, DESTINATION_BASE)?;
            }
            return Ok(None);
        }
        if run.validity != Validity::Valid {
            upload(&self.destination, self.format, &texture::reversed_pattern(self.format))?;
        }
        read_back(&self.destination, self.format).map(Some)
    }
}

impl Fixture for ImageLoadStoreFixture<'_> {
    fn execute(&mut self, run: &AccessRun) -> Result<Observation, CtsError> {
        let before = self.poison_destination(run)?;

        let (source_coord, destination_coord, source_sample, destination_sample) = offsets(run);
        let sources = shaders::image_copy_program(
            self.caps.api,
            self.format,
            source_coord,
            destination_coord,
            source_sample,
            destination_sample,
        )?;
        self.program.init(&sources)?;
        self.program.use_program()?;
        bind_image_pair(
            &self.program,
            &self.source,
            &self.destination,
            self.format.data_level(),
            self.format.internal_format(),
        )?;
        dispatch_per_texel(self.gl)?;

        if self.format.is_multisample() {
            let expected = match run.validity {
                Validity::Valid => ProbeExpectation::IndexPlus(3),
                Validity::DestinationInvalid => ProbeExpectation::IndexPlus(DESTINATION_BASE + 3),
                Validity::SourceInvalid => ProbeExpectation::Zero,
            };
            let hits = probe_multisample(self.gl, self.caps.api, &self.destination, expected)?;
            return Ok(Observation::new(hits));
        }

        let observation = Observation::new(read_back(&self.destination, self.format)?);
        Ok(match before {
            Some(before) => observation.with_before(before),
            None => observation,
        })
    }

    fn verifier(&self) -> &dyn OutcomeVerifier {
        &self.verifier
    }
}
