//! Compute copies between two storage buffers with out-of-range element indices.

use rba_gl::{enums as gl, BarrierBits, Gl};

use super::{invalid_runs, AccessPattern, AccessRun, Capabilities, CasePlan, Fixture, Mechanism, OffsetCategory, Validity};
use crate::check::expect_no_error;
use crate::resources::{Buffer, BufferTarget, Program};
use crate::shaders::{self, BufferSource};
use crate::verify::{Observation, OutcomeVerifier, StorageVerifier};
use crate::CtsError;

pub(super) const SOURCE_DATA: [f32; 4] = [2.0, 3.0, 4.0, 5.0];
pub(super) const DESTINATION_DATA: [f32; 4] = [1.0; 4];

/// Shared with the uniform buffer test, which indexes its source the same way.
pub(super) const OFFSETS: [AccessPattern; 4] = [
    AccessPattern::new(OffsetCategory::Close, 16),
    AccessPattern::new(OffsetCategory::Near, 4096),
    AccessPattern::new(OffsetCategory::Medium, 1 << 20),
    AccessPattern::new(OffsetCategory::High, 10 << 20),
];

const DESTINATION_BINDING: u32 = 0;
const SOURCE_BINDING: u32 = 1;

pub(super) fn plan() -> Vec<CasePlan> {
    let mut runs = vec![AccessRun::VALID];
    runs.extend(invalid_runs(Validity::SourceInvalid, &OFFSETS));
    runs.extend(invalid_runs(Validity::DestinationInvalid, &OFFSETS));
    vec![CasePlan::new("Copying between storage buffers", Mechanism::StorageBuffer, runs)]
}

/// Dispatches the single work group of a buffer copy kernel and reads the four destination
/// elements back.
pub(super) fn copy_and_read(gl: &dyn Gl, destination: &Buffer<'_>) -> Result<Vec<u8>, CtsError> {
    gl.dispatch_compute(1, 1, 1);
    expect_no_error(gl, "DispatchCompute")?;
    gl.memory_barrier(BarrierBits::ALL);
    expect_no_error(gl, "MemoryBarrier")?;

    let mut data = vec![0; std::mem::size_of_val(&DESTINATION_DATA)];
    destination.read(0, &mut data)?;
    Ok(data)
}

pub(super) struct StorageBufferFixture<'gl> {
    gl: &'gl dyn Gl,
    caps: Capabilities,
    program: Program<'gl>,
    source: Buffer<'gl>,
    destination: Buffer<'gl>,
    verifier: StorageVerifier,
}

impl<'gl> StorageBufferFixture<'gl> {
    pub(super) fn new(gl: &'gl dyn Gl, caps: &Capabilities) -> Result<Self, CtsError> {
        let mut source = Buffer::new(gl);
        source.init_data(BufferTarget::ShaderStorage, gl::DYNAMIC_COPY, bytemuck::cast_slice(&SOURCE_DATA))?;
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
            verifier: StorageVerifier::new(caps.extended_robustness(), SOURCE_DATA, DESTINATION_DATA),
        })
    }
}

impl Fixture for StorageBufferFixture<'_> {
    fn execute(&mut self, run: &AccessRun) -> Result<Observation, CtsError> {
        // Every run starts from the initial contents.
        self.source.sub_data(0, bytemuck::cast_slice(&SOURCE_DATA))?;
        self.destination.sub_data(0, bytemuck::cast_slice(&DESTINATION_DATA))?;
        self.destination.bind_base(DESTINATION_BINDING)?;
        self.source.bind_base(SOURCE_BINDING)?;

        let (source_offset, destination_offset) = match run.validity {
            Validity::Valid => (0, 0),
            Validity::SourceInvalid => (run.pattern.offset, 0),
            Validity::DestinationInvalid => (0, run.pattern.offset),
        };
        self.program.init(&shaders::buffer_copy_program(
            self.caps.api,
            BufferSource::Storage,
            source_offset,
            destination_offset,
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
    use pretty_assertions::assert_eq;
    use rba_gl::ApiType;
    use rba_soft::{OutOfBoundsRead, OutOfBoundsWrite, Robustness, SoftConfig, SoftGl, ARB_ROBUST_BUFFER_ACCESS_BEHAVIOR};

    use super::*;

    fn observe(soft: &SoftGl, run: AccessRun) -> [f32; 4] {
        let caps = Capabilities::query(soft).unwrap();
        let mut fixture = StorageBufferFixture::new(soft, &caps).unwrap();
        let observation = fixture.execute(&run).unwrap();
        let mut values = [0.0; 4];
        for (value, bytes) in values.iter_mut().zip(observation.data.chunks_exact(4)) {
            *value = bytemuck::pod_read_unaligned(bytes);
        }
        values
    }

    fn source_close() -> AccessRun {
        AccessRun::invalid(Validity::SourceInvalid, OFFSETS[0])
    }

    fn destination_close() -> AccessRun {
        AccessRun::invalid(Validity::DestinationInvalid, OFFSETS[0])
    }

    #[test]
    fn valid_copy_moves_the_source() {
        assert_eq!(observe(&SoftGl::default(), AccessRun::VALID), SOURCE_DATA);
    }

    #[test]
    fn conformant_reads_are_zero_and_writes_are_discarded() {
        let soft = SoftGl::default();
        assert_eq!(observe(&soft, source_close()), [0.0; 4]);
        assert_eq!(observe(&soft, destination_close()), DESTINATION_DATA);
        assert_eq!(soft.live_objects().total(), 0);
    }

    #[test]
    fn clamped_device_needs_extended_robustness() {
        let robustness = Robustness {
            storage_load: OutOfBoundsRead::ClampToEdge,
            storage_store: OutOfBoundsWrite::ClampToEdge,
            ..Robustness::conformant()
        };
        let strict = SoftGl::new(SoftConfig {
            api: ApiType::core(4, 3),
            extensions: vec![ARB_ROBUST_BUFFER_ACCESS_BEHAVIOR.to_string()],
            robustness,
            ..SoftConfig::default()
        });
        let caps = Capabilities::query(&strict).unwrap();
        let fixture = StorageBufferFixture::new(&strict, &caps).unwrap();
        let read = Observation::new(bytemuck::cast_slice(&observe(&strict, source_close())).to_vec());
        assert!(!fixture
            .verifier()
            .verify_invalid(Validity::SourceInvalid, &read)
            .is_conformant());
        drop(fixture);

        let extended = SoftGl::with_robustness(robustness);
        let caps = Capabilities::query(&extended).unwrap();
        let fixture = StorageBufferFixture::new(&extended, &caps).unwrap();
        let read = Observation::new(bytemuck::cast_slice(&observe(&extended, source_close())).to_vec());
        let write = Observation::new(bytemuck::cast_slice(&observe(&extended, destination_close())).to_vec());
        assert!(fixture
            .verifier()
            .verify_invalid(Validity::SourceInvalid, &read)
            .is_conformant());
        assert!(fixture
            .verifier()
            .verify_invalid(Validity::DestinationInvalid, &write)
            .is_conformant());
    }
}
