//! Texture setup and read-back shared by the texel fetch and image load/store cases.

use rba_gl::{enums as gl, ApiType, BarrierBits, Gl};

use crate::check::expect_no_error;
use crate::format::{TexelFormat, IMAGE_SIZE, IMAGE_TEXELS, MULTISAMPLE_SAMPLES};
use crate::resources::{Program, Texture};
use crate::shaders::{self, ProbeExpectation};
use crate::CtsError;

/// Byte pattern read-back buffers start from, so a read that writes nothing is noticed.
const READ_POISON: u8 = 0xA5;

const SOURCE_UNIT: u32 = 0;
const DESTINATION_UNIT: u32 = 1;

/// Binds the two images of a copy or probe kernel to units 0 and 1 and points the kernel's
/// uniforms at them.
pub(super) fn bind_image_pair(
    program: &Program<'_>,
    source: &Texture<'_>,
    destination: &Texture<'_>,
    level: u32,
    internal_format: u32,
) -> Result<(), CtsError> {
    source.bind_image(SOURCE_UNIT, level, gl::READ_ONLY, internal_format)?;
    destination.bind_image(DESTINATION_UNIT, level, gl::WRITE_ONLY, internal_format)?;
    program.set_uniform_i32(0, SOURCE_UNIT as i32)?;
    program.set_uniform_i32(1, DESTINATION_UNIT as i32)
}

/// Runs the bound image kernel over one work group per texel and waits for its writes.
pub(super) fn dispatch_per_texel(gl: &dyn Gl) -> Result<(), CtsError> {
    gl.dispatch_compute(IMAGE_SIZE, IMAGE_SIZE, 1);
    expect_no_error(gl, "DispatchCompute")?;
    gl.memory_barrier(BarrierBits::ALL);
    expect_no_error(gl, "MemoryBarrier")
}

fn allocate<'gl>(gl: &'gl dyn Gl, format: TexelFormat) -> Result<Texture<'gl>, CtsError> {
    let mut texture = Texture::new(gl);
    texture.generate()?;
    if format.is_multisample() {
        texture.storage_multisample(MULTISAMPLE_SAMPLES, format.internal_format(), IMAGE_SIZE, IMAGE_SIZE)?;
    } else {
        let size = format.base_size();
        texture.storage(gl::TEXTURE_2D, format.levels(), format.internal_format(), size, size)?;
        texture.set_nearest_filtering(gl::TEXTURE_2D)?;
    }
    Ok(texture)
}

/// Texture holding the source pattern in its data level.
///
/// Multisample textures cannot be uploaded to, so a compute kernel writes `index + sample` into
/// every sample instead.
pub(super) fn source_texture<'gl>(gl: &'gl dyn Gl, api: ApiType, format: TexelFormat) -> Result<Texture<'gl>, CtsError> {
    let texture = allocate(gl, format)?;
    if format.is_multisample() {
        fill_multisample(gl, api, &texture, 0)?;
    } else {
        upload(&texture, format, &format.pattern())?;
    }
    Ok(texture)
}

/// Writes `base + index + sample` into the first four samples of every texel of a
/// multisample `R32UI` texture.
pub(super) fn fill_multisample(gl: &dyn Gl, api: ApiType, texture: &Texture<'_>, base: u32) -> Result<(), CtsError> {
    let mut program = Program::new(gl);
    program.init(&shaders::multisample_fill_program(api, base)?)?;
    program.use_program()?;
    texture.bind_image(0, 0, gl::WRITE_ONLY, gl::R32UI)?;
    program.set_uniform_i32(0, 0)?;
    dispatch_per_texel(gl)
}

/// Texture the cases write into, zero-filled where it can be uploaded to.
pub(super) fn destination_texture<'gl>(gl: &'gl dyn Gl, format: TexelFormat) -> Result<Texture<'gl>, CtsError> {
    let texture = allocate(gl, format)?;
    if !format.is_multisample() {
        upload(&texture, format, &zeros(format))?;
    }
    Ok(texture)
}

pub(super) fn zeros(format: TexelFormat) -> Vec<u8> {
    vec![0; IMAGE_TEXELS * format.bytes_per_texel()]
}

/// The source pattern with its texels in reverse order, so no texel holds the value the
/// pattern has at the same coordinate.
pub(super) fn reversed_pattern(format: TexelFormat) -> Vec<u8> {
    let pattern = format.pattern();
    pattern
        .chunks_exact(format.bytes_per_texel())
        .rev()
        .flatten()
        .copied()
        .collect()
}

/// Replaces the data level of a single-sample texture.
pub(super) fn upload(texture: &Texture<'_>, format: TexelFormat, data: &[u8]) -> Result<(), CtsError> {
    let (transfer_format, ty) = format.transfer();
    texture.sub_image(
        gl::TEXTURE_2D,
        format.data_level(),
        IMAGE_SIZE,
        IMAGE_SIZE,
        transfer_format,
        ty,
        data,
    )
}

/// Reads the data level of a single-sample texture.
pub(super) fn read_back(texture: &Texture<'_>, format: TexelFormat) -> Result<Vec<u8>, CtsError> {
    let (transfer_format, ty) = format.transfer();
    let mut data = vec![READ_POISON; IMAGE_TEXELS * format.bytes_per_texel()];
    texture.get_image(gl::TEXTURE_2D, format.data_level(), transfer_format, ty, &mut data)?;
    Ok(data)
}

/// Reduces a four-sample `R32UI` texture to one `u32` per texel: 1 where any sample holds
/// `expected`, 0 elsewhere.
pub(super) fn probe_multisample(
    gl: &dyn Gl,
    api: ApiType,
    texture: &Texture<'_>,
    expected: ProbeExpectation,
) -> Result<Vec<u8>, CtsError> {
    let result_format = TexelFormat::R32uiMipmap;
    let mut result = Texture::new(gl);
    result.generate()?;
    result.storage(gl::TEXTURE_2D, 1, result_format.internal_format(), IMAGE_SIZE, IMAGE_SIZE)?;

    let mut program = Program::new(gl);
    program.init(&shaders::multisample_probe_program(api, expected)?)?;
    program.use_program()?;
    bind_image_pair(&program, texture, &result, 0, gl::R32UI)?;
    dispatch_per_texel(gl)?;

    let (transfer_format, ty) = result_format.transfer();
    let mut data = vec![READ_POISON; IMAGE_TEXELS * 4];
    result.get_image(gl::TEXTURE_2D, 0, transfer_format, ty, &mut data)?;
    Ok(data)
}
