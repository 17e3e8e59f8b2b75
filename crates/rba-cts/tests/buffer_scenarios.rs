//! The uniform and storage copy scenarios driven by hand through the public wrappers.

use pretty_assertions::assert_eq;
use rba_cts::resources::{Buffer, BufferTarget, Program, INVALID_ID};
use rba_cts::shaders::{buffer_copy_program, BufferSource};
use rba_gl::{enums as gl, ApiType, BarrierBits, Gl};
use rba_soft::{OutOfBoundsRead, OutOfBoundsWrite, Robustness, SoftGl};

const API: ApiType = ApiType::core(4, 5);
const DESTINATION: [f32; 4] = [1.0; 4];
const STORAGE_SOURCE: [f32; 4] = [2.0, 3.0, 4.0, 5.0];
#[rustfmt::skip]
const UNIFORM_SOURCE: [f32; 16] = [
    2.0, 0.0, 0.0, 0.0,
    3.0, 0.0, 0.0, 0.0,
    4.0, 0.0, 0.0, 0.0,
    5.0, 0.0, 0.0, 0.0,
];

fn copy(gl: &SoftGl, source: BufferSource, source_offset: u32, destination_offset: u32) -> [f32; 4] {
    let (target, data, binding): (_, &[f32], _) = match source {
        BufferSource::Storage => (BufferTarget::ShaderStorage, &STORAGE_SOURCE[..], 1),
        BufferSource::Uniform => (BufferTarget::Uniform, &UNIFORM_SOURCE[..], 0),
    };
    let mut src = Buffer::new(gl);
    src.init_data(target, gl::DYNAMIC_COPY, bytemuck::cast_slice(data)).unwrap();
    src.bind_base(binding).unwrap();
    let mut dst = Buffer::new(gl);
    dst.init_data(BufferTarget::ShaderStorage, gl::DYNAMIC_COPY, bytemuck::cast_slice(&DESTINATION))
        .unwrap();
    dst.bind_base(0).unwrap();

    let mut program = Program::new(gl);
    program
        .init(&buffer_copy_program(API, source, source_offset, destination_offset).unwrap())
        .unwrap();
    program.use_program().unwrap();
    gl.dispatch_compute(1, 1, 1);
    gl.memory_barrier(BarrierBits::ALL);
    assert_eq!(gl.get_error(), gl::NO_ERROR);

    let mut bytes = [0u8; 16];
    dst.read(0, &mut bytes).unwrap();
    let mut out = [0.0; 4];
    for (value, chunk) in out.iter_mut().zip(bytes.chunks_exact(4)) {
        *value = bytemuck::pod_read_unaligned(chunk);
    }
    out
}

#[test]
fn uniform_copy_reads_zero_far_past_the_block() {
    let gl = SoftGl::default();
    assert_eq!(copy(&gl, BufferSource::Uniform, 0, 0), [2.0, 3.0, 4.0, 5.0]);
    assert_eq!(copy(&gl, BufferSource::Uniform, 10 << 20, 0), [0.0; 4]);
    assert_eq!(gl.live_objects().total(), 0);
}

#[test]
fn storage_write_past_the_end_is_discarded() {
    let gl = SoftGl::default();
    assert_eq!(copy(&gl, BufferSource::Storage, 0, 0), STORAGE_SOURCE);
    assert_eq!(copy(&gl, BufferSource::Storage, 0, 1 << 20), DESTINATION);
}

#[test]
fn clamped_storage_write_stays_within_extended_outcomes() {
    let gl = SoftGl::with_robustness(Robustness {
        storage_load: OutOfBoundsRead::ClampToEdge,
        storage_store: OutOfBoundsWrite::ClampToEdge,
        ..Robustness::conformant()
    });
    let observed = copy(&gl, BufferSource::Storage, 0, 1 << 20);
    assert_ne!(observed, DESTINATION);
    assert!(
        observed.iter().all(|v| [1.0, 2.0, 3.0, 4.0, 5.0].contains(v)),
        "{observed:?}"
    );
}

#[test]
fn release_is_idempotent() {
    let gl = SoftGl::default();
    let mut buffer = Buffer::new(&gl);
    assert_eq!(buffer.id(), INVALID_ID);
    buffer
        .init_data(BufferTarget::Uniform, gl::STATIC_DRAW, &[0; 64])
        .unwrap();
    assert_ne!(buffer.id(), INVALID_ID);

    buffer.release();
    assert_eq!(buffer.id(), INVALID_ID);
    buffer.release();
    drop(buffer);

    assert_eq!(gl.live_objects().total(), 0);
    assert_eq!(gl.double_deletes(), 0);
}
