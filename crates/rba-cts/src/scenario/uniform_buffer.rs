//! Compute copies from a uniform block indexed past its end.

use rba_gl::{enums as gl, Gl};

use super::storage_buffer::{copy_and_read, DESTINATION_DATA, OFFSETS};
use super::{invalid_runs, AccessRun, Capabilities, CasePlan, Fixture, Mechanism, Validity};
use crate::resources::{Buffer, BufferTarget, Program};
use crate::shaders::{self, BufferSource};
use crate::verify::{Observation, OutcomeVerifier, UniformVerifier};
use crate::CtsError;

/// `float data[16]` under std140: every element occupies its own 16-byte slot.
#[rustfmt::skip]
const SOURCE_DATA: [f32; 16] = [
    2.0, 0.0, 0.0, 0.0,
    3.0, 0.0, 0.0, 0.0,
    4.0, 0.0, 0.0, 0.0,
    5.0, 0.0, 0.0, 0.0,
];
const EXPECTED_COPY: [f32; 4] = [2.0, 3.0, 4.0, 5.0];

const BINDING: u32 = 0;

pub(super) fn plan() -> Vec<CasePlan> {
    let mut runs = vec![AccessRun::VALID];
    runs.extend(invalid_runs(Validity::SourceInvalid, &OFFSETS));
    vec![CasePlan::new("Copying from a uniform buffer", Mechanism::UniformBuffer, runs)]
}

pub(super) struct UniformBufferFixture<'gl> {
    gl: &'gl dyn Gl,
    caps: Capabilities,
    program: Program<'gl>,
    source: Buffer<'gl>,
    destination: Buffer<'gl>,
    verifier: UniformVerifier,
}

impl<'gl> UniformBufferFixture<'gl> {
    pub(super) fn new(gl: &'gl dyn Gl, caps: &Capabilities) -> Result<Self, CtsError> {
        let mut source = Buffer::new(gl);
        source.init_data(BufferTarget::Uniform, gl::DYNAMIC_COPY, bytemuck::cast_slice(&SOURCE_DATA))?;
        let mut destination = Buffer::new(gl);
        destination.init_data(
            BufferTarget::ShaderStorage,
            gl::DYNAMIC_COPY,
            bytemuck::cast_slice(&DESTINATION_DATA),
        )?;
        Ok(Self {
            gl,
            caps: *caps,
            program: Program::new(gl),
            source,
            destination,
            verifier: UniformVerifier::new(EXPECTED_COPY),
        })
    }
}

impl Fixture for UniformBufferFixture<'_> {
    fn execute(&mut self, run: &AccessRun) -> Result<Observation, CtsError> {
        self.source.sub_data(0, bytemuck::cast_slice(&SOURCE_DATA))?;
        self.destination.sub_data(0, bytemuck::cast_slice(&DESTINATION_DATA))?;
        // Uniform and storage blocks have separate binding points.
        self.destination.bind_base(BINDING)?;
        self.source.bind_base(BINDING)?;

        let source_offset = match run.validity {
            Validity::Valid => 0,
            Validity::SourceInvalid | Validity::DestinationInvalid => run.pattern.offset,
        };
        self.program.init(&shaders::buffer_copy_program(
            self.caps.api,
            BufferSource::Uniform,
            source_offset,
            0,
        )?)?;
        self.program.use_program()?;

        Ok(Observation::new(copy_and_read(self.gl, &self.destination)?))
    }

    fn verifier(&self) -> &dyn OutcomeVerifier {
        &self.verifier
    }
}

#[cfg(test)]
mod tests {
    use rba_soft::{OutOfBoundsRead, Robustness, SoftGl};

    use super::*;
    use crate::verify::Verdict;

    fn verdicts(soft: &SoftGl) -> Vec<Verdict> {
        let caps = Capabilities::query(soft).unwrap();
        let mut fixture = UniformBufferFixture::new(soft, &caps).unwrap();
        plan()[0]
            .runs
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
    fn conformant_reads_return_zero() {
        let soft = SoftGl::default();
        let verdicts = verdicts(&soft);
        assert_eq!(verdicts.len(), 5);
        assert!(verdicts.iter().all(Verdict::is_conformant), "{verdicts:?}");
        assert_eq!(soft.live_objects().total(), 0);
    }

    #[test]
    fn clamped_reads_are_violations() {
        let soft = SoftGl::with_robustness(Robustness {
            uniform_load: OutOfBoundsRead::ClampToEdge,
            ..Robustness::conformant()
        });
        let verdicts = verdicts(&soft);
        assert!(verdicts[0].is_conformant());
        let Verdict::Violation(mismatch) = &verdicts[1] else {
            panic!("clamped read accepted");
        };
        assert_eq!(mismatch.observed, "5");
        assert_eq!(mismatch.expected, "0");
    }
}
