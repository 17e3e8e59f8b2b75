//! `texelFetch` from a sampled texture with coordinates, levels or samples out of range.

use rba_gl::{enums as gl, Gl};

use super::texture::{self, probe_multisample, read_back, upload};
use super::{invalid_runs, AccessPattern, AccessRun, Capabilities, CasePlan, Fixture, Mechanism, OffsetCategory, Validity};
use crate::check::{expect_code, expect_no_error};
use crate::format::{TexelFormat, IMAGE_SIZE};
use crate::resources::{Framebuffer, Program, Texture, VertexArray};
use crate::shaders::{self, FetchPlane, ProbeExpectation};
use crate::verify::{Observation, OutcomeVerifier, TexelVerifier};
use crate::CtsError;

const OFFSETS: [AccessPattern; 3] = [
    AccessPattern::new(OffsetCategory::Near, 16),
    AccessPattern::new(OffsetCategory::Medium, 512),
    AccessPattern::new(OffsetCategory::High, 1008),
];

/// Level fetched by invalid runs of the two-level mipmap case.
const MISSING_LEVEL: u32 = 2;
/// Sample fetched by invalid runs of the four-sample case.
const MISSING_SAMPLE: u32 = 9;

pub(super) fn plan(caps: &Capabilities) -> Vec<CasePlan> {
    TexelFormat::ALL
        .into_iter()
        .map(|format| {
            // Level and sample planes reach out of range on their own.
            let patterns = if matches!(format, TexelFormat::R32uiMipmap | TexelFormat::R32uiMultisample) {
                OFFSETS.map(|p| AccessPattern::new(p.category, 0))
            } else {
                OFFSETS
            };
            let mut runs = vec![AccessRun::VALID];
            runs.extend(invalid_runs(Validity::SourceInvalid, &patterns));

            let case = CasePlan::new(format!("Sampling {} texture", format.name()), Mechanism::TexelFetch, runs)
                .with_format(format);
            match format {
                TexelFormat::Rg8Snorm => case.skipped("GL_RG8_SNORM is not a required color-renderable format"),
                TexelFormat::R32uiMultisample if !caps.multisample_supported() => case.skipped(format!(
                    "four samples needed, GL_MAX_INTEGER_SAMPLES is {} and GL_MAX_IMAGE_SAMPLES is {}",
                    caps.max_integer_samples, caps.max_image_samples
                )),
                _ => case,
            }
        })
        .collect()
}

/// Fetch plane and coordinate offset of `run`.
fn fetch(format: TexelFormat, run: &AccessRun) -> (FetchPlane, u32) {
    match (format, run.validity) {
        (TexelFormat::R32uiMultisample, Validity::Valid) => (FetchPlane::SampleId, 0),
        (TexelFormat::R32uiMultisample, _) => (FetchPlane::Index(MISSING_SAMPLE), 0),
        (TexelFormat::R32uiMipmap, Validity::Valid) => (FetchPlane::Index(format.data_level()), 0),
        (TexelFormat::R32uiMipmap, _) => (FetchPlane::Index(MISSING_LEVEL), 0),
        (_, Validity::Valid) => (FetchPlane::Index(0), 0),
        (_, _) => (FetchPlane::Index(0), run.pattern.offset),
    }
}

pub(super) struct TexelFetchFixture<'gl> {
    gl: &'gl dyn Gl,
    caps: Capabilities,
    format: TexelFormat,
    program: Program<'gl>,
    _framebuffer: Framebuffer<'gl>,
    source: Texture<'gl>,
    destination: Texture<'gl>,
    _vertex_array: VertexArray<'gl>,
    verifier: TexelVerifier,
}

impl<'gl> TexelFetchFixture<'gl> {
    pub(super) fn new(gl: &'gl dyn Gl, caps: &Capabilities, format: TexelFormat) -> Result<Self, CtsError> {
        let mut vertex_array = VertexArray::new(gl);
        vertex_array.generate()?;
        vertex_array.bind()?;

        let destination = texture::destination_texture(gl, format)?;
        let source = texture::source_texture(gl, caps.api, format)?;

        let mut framebuffer = Framebuffer::new(gl);
        framebuffer.generate()?;
        framebuffer.bind(gl::DRAW_FRAMEBUFFER)?;
        framebuffer.attach_texture(
            gl::DRAW_FRAMEBUFFER,
            gl::COLOR_ATTACHMENT0,
            destination.id(),
            format.data_level(),
            IMAGE_SIZE,
            IMAGE_SIZE,
        )?;
        match framebuffer.require_complete(gl::DRAW_FRAMEBUFFER) {
            Err(CtsError::FramebufferIncomplete { status }) => {
                return Err(CtsError::Unsupported(format!(
                    "{} cannot be rendered to ({})",
                    format.name(),
                    gl::framebuffer_status_name(status)
                )));
            }
            result => result?,
        }

        Ok(Self {
            gl,
            caps: *caps,
            format,
            program: Program::new(gl),
            _framebuffer: framebuffer,
            source,
            destination,
            _vertex_array: vertex_array,
            verifier: TexelVerifier::new(format),
        })
    }

    /// Fills the destination with what a draw that writes nothing would leave behind.
    fn poison_destination(&self, run: &AccessRun) -> Result<(), CtsError> {
        if self.format.is_multisample() {
            return Ok(());
        }
        let poison = match run.validity {
            Validity::Valid => texture::zeros(self.format),
            Validity::SourceInvalid | Validity::DestinationInvalid => self.format.pattern(),
        };
        upload(&self.destination, self.format, &poison)
    }

    fn draw(&self) -> Result<(), CtsError> {
        let multisample = self.format.is_multisample();
        if multisample {
            self.gl.enable(gl::MULTISAMPLE);
            expect_no_error(self.gl, "Enable")?;
        }
        self.gl.draw_arrays(gl::POINTS, 0, 1);
        let draw_error = self.gl.get_error();
        if multisample {
            self.gl.disable(gl::MULTISAMPLE);
            expect_no_error(self.gl, "Disable")?;
        }
        expect_code(draw_error, "DrawArrays")
    }
}

impl Fixture for TexelFetchFixture<'_> {
    fn execute(&mut self, run: &AccessRun) -> Result<Observation, CtsError> {
        // Uploading binds the destination, so the source is bound afterwards.
        self.poison_destination(run)?;

        let (plane, offset) = fetch(self.format, run);
        self.program
            .init(&shaders::texel_fetch_program(self.caps.api, self.format, plane, offset)?)?;
        self.program.use_program()?;

        self.gl.active_texture(gl::TEXTURE0);
        expect_no_error(self.gl, "ActiveTexture")?;
        self.source.bind(self.format.texture_target())?;
        self.program.set_uniform_i32(0, 0)?;

        self.draw()?;

        let data = if self.format.is_multisample() {
            let expected = match run.validity {
                Validity::Valid => ProbeExpectation::IndexPlus(3),
                Validity::SourceInvalid | Validity::DestinationInvalid => ProbeExpectation::Zero,
            };
            probe_multisample(self.gl, self.caps.api, &self.destination, expected)?
        } else {
            read_back(&self.destination, self.format)?
        };
        Ok(Observation::new(data))
    }

    fn verifier(&self) -> &dyn OutcomeVerifier {
        &self.verifier
    }
}

#[cfg(test)]
mod tests {
    use rba_gl::ApiType;
    use rba_soft::{OutOfBoundsRead, Robustness, SoftGl};

    use super::*;
    use crate::verify::Verdict;

    fn run_case(soft: &SoftGl, format: TexelFormat) -> Vec<Verdict> {
        let caps = Capabilities::query(soft).unwrap();
        let case = plan(&caps).into_iter().find(|c| c.format == Some(format)).unwrap();
        let mut fixture = TexelFetchFixture::new(soft, &caps, format).unwrap();
        case.runs
            .iter()
            .map(|run| {
                let observation = fixture.execute(run).unwrap();
                match run.validity {
                    Validity::Valid => fixture.verifier().verify_valid(&observation),
                    validity => fixture.verifier().verify_invalid(validity, &observation),
                }
            })
            .collect()
    }

    #[test]
    fn conformant_device_passes_every_runnable_format() {
        let soft = SoftGl::default();
        for format in [
            TexelFormat::R8,
            TexelFormat::Rgba32f,
            TexelFormat::R32uiMipmap,
            TexelFormat::R32uiMultisample,
        ] {
            let verdicts = run_case(&soft, format);
            assert_eq!(verdicts.len(), 4);
            assert!(verdicts.iter().all(Verdict::is_conformant), "{format:?}: {verdicts:?}");
        }
        assert_eq!(soft.live_objects().total(), 0);
    }

    #[test]
    fn sample_ids_need_multisample_enabled() {
        let soft = SoftGl::default();
        let caps = Capabilities::query(&soft).unwrap();
        let format = TexelFormat::R32uiMultisample;
        let mut fixture = TexelFetchFixture::new(&soft, &caps, format).unwrap();

        fixture
            .program
            .init(&shaders::texel_fetch_program(caps.api, format, FetchPlane::SampleId, 0).unwrap())
            .unwrap();
        fixture.program.use_program().unwrap();
        soft.active_texture(gl::TEXTURE0);
        fixture.source.bind(format.texture_target()).unwrap();
        fixture.program.set_uniform_i32(0, 0).unwrap();

        // Every sample takes the color shaded for sample 0.
        soft.draw_arrays(gl::POINTS, 0, 1);
        assert_eq!(soft.get_error(), gl::NO_ERROR);
        for (expected, hit) in [(ProbeExpectation::IndexPlus(0), 1u32), (ProbeExpectation::IndexPlus(3), 0)] {
            let probed = probe_multisample(&soft, caps.api, &fixture.destination, expected).unwrap();
            assert!(probed.chunks_exact(4).all(|h| h == hit.to_le_bytes()), "{expected:?}");
        }

        let observation = fixture.execute(&AccessRun::VALID).unwrap();
        assert!(fixture.verifier().verify_valid(&observation).is_conformant());
    }

    #[test]
    fn wrapped_fetch_is_a_violation() {
        let soft = SoftGl::with_robustness(Robustness {
            texel_fetch: OutOfBoundsRead::Wrap,
            ..Robustness::conformant()
        });
        let verdicts = run_case(&soft, TexelFormat::R8);
        assert!(verdicts[0].is_conformant());
        assert!(verdicts[1..].iter().any(|v| !v.is_conformant()));
    }

    #[test]
    fn snorm_and_small_sample_counts_are_planned_as_skips() {
        let caps = Capabilities {
            api: ApiType::core(4, 5),
            khr_robust_buffer_access: true,
            arb_robust_buffer_access: false,
            max_integer_samples: 1,
            max_image_samples: 4,
        };
        let skipped: Vec<_> = plan(&caps)
            .into_iter()
            .filter(|c| c.skip.is_some())
            .filter_map(|c| c.format)
            .collect();
        assert_eq!(skipped, [TexelFormat::Rg8Snorm, TexelFormat::R32uiMultisample]);
    }

    #[test]
    fn level_and_sample_cases_fetch_at_the_origin() {
        let run = AccessRun::invalid(Validity::SourceInvalid, OFFSETS[2]);
        assert_eq!(fetch(TexelFormat::R32uiMipmap, &run), (FetchPlane::Index(2), 0));
        assert_eq!(fetch(TexelFormat::R32uiMultisample, &run), (FetchPlane::Index(9), 0));
        assert_eq!(fetch(TexelFormat::R8, &run), (FetchPlane::Index(0), 1008));
    }
}
