//! OpenGL entry-point abstraction used by the robust buffer access conformance suite.
//!
//! The suite never talks to a driver directly; it goes through [`Gl`], a narrow table of the
//! GL entry points it needs. Object names are plain `u32`s and `0` unbinds, exactly like the C
//! API. Errors are not returned from the calls themselves: callers poll [`Gl::get_error`] after
//! every call, the same way a GL application does.
//!
//! Two implementations exist: the `glow` feature wraps a caller-created `glow::Context`, and the
//! `rba-soft` crate provides a deterministic software device for tests.

mod context;
pub mod enums;
#[cfg(feature = "glow")]
mod glow_backend;

pub use context::ApiType;
#[cfg(feature = "glow")]
pub use glow_backend::GlowContext;

bitflags::bitflags! {
    /// `glMemoryBarrier` bits.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct BarrierBits: u32 {
        const VERTEX_ATTRIB_ARRAY = 0x0000_0001;
        const ELEMENT_ARRAY = 0x0000_0002;
        const UNIFORM = 0x0000_0004;
        const TEXTURE_FETCH = 0x0000_0008;
        const SHADER_IMAGE_ACCESS = 0x0000_0020;
        const COMMAND = 0x0000_0040;
        const PIXEL_BUFFER = 0x0000_0080;
        const TEXTURE_UPDATE = 0x0000_0100;
        const BUFFER_UPDATE = 0x0000_0200;
        const FRAMEBUFFER = 0x0000_0400;
        const TRANSFORM_FEEDBACK = 0x0000_0800;
        const ATOMIC_COUNTER = 0x0000_1000;
        const SHADER_STORAGE = 0x0000_2000;
        const ALL = 0xFFFF_FFFF;
    }
}

/// The GL entry points consumed by the suite.
///
/// Methods take `&self`: a GL context is a shared, implicitly stateful object and implementations
/// are expected to use interior mutability where they keep state of their own.
pub trait Gl {
    fn api_type(&self) -> ApiType;
    fn is_extension_supported(&self, name: &str) -> bool;
    /// Returns and clears the oldest recorded error, `enums::NO_ERROR` when there is none.
    fn get_error(&self) -> u32;
    fn get_integer(&self, pname: u32) -> i32;
    fn enable(&self, cap: u32);
    fn disable(&self, cap: u32);

    fn gen_buffer(&self) -> u32;
    fn delete_buffer(&self, buffer: u32);
    fn bind_buffer(&self, target: u32, buffer: u32);
    fn bind_buffer_base(&self, target: u32, index: u32, buffer: u32);
    fn buffer_data(&self, target: u32, data: &[u8], usage: u32);
    fn buffer_sub_data(&self, target: u32, offset: usize, data: &[u8]);
    /// Blocking read-back of `out.len()` bytes starting at `offset`.
    fn get_buffer_sub_data(&self, target: u32, offset: usize, out: &mut [u8]);

    fn gen_texture(&self) -> u32;
    fn delete_texture(&self, texture: u32);
    fn active_texture(&self, unit: u32);
    fn bind_texture(&self, target: u32, texture: u32);
    fn tex_parameter_i32(&self, target: u32, pname: u32, value: i32);
    fn tex_storage_2d(&self, target: u32, levels: u32, internal_format: u32, width: u32, height: u32);
    fn tex_storage_2d_multisample(
        &self,
        target: u32,
        samples: u32,
        internal_format: u32,
        width: u32,
        height: u32,
        fixed_sample_locations: bool,
    );
    #[allow(clippy::too_many_arguments)]
    fn tex_sub_image_2d(
        &self,
        target: u32,
        level: u32,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        format: u32,
        ty: u32,
        pixels: &[u8],
    );
    fn get_tex_image(&self, target: u32, level: u32, format: u32, ty: u32, out: &mut [u8]);
    #[allow(clippy::too_many_arguments)]
    fn bind_image_texture(
        &self,
        unit: u32,
        texture: u32,
        level: u32,
        layered: bool,
        layer: u32,
        access: u32,
        format: u32,
    );

    fn gen_framebuffer(&self) -> u32;
    fn delete_framebuffer(&self, framebuffer: u32);
    fn bind_framebuffer(&self, target: u32, framebuffer: u32);
    fn framebuffer_texture(&self, target: u32, attachment: u32, texture: u32, level: u32);
    fn check_framebuffer_status(&self, target: u32) -> u32;
    fn viewport(&self, x: i32, y: i32, width: u32, height: u32);

    fn create_shader(&self, stage: u32) -> u32;
    fn delete_shader(&self, shader: u32);
    fn shader_source(&self, shader: u32, source: &str);
    fn compile_shader(&self, shader: u32);
    fn shader_compile_status(&self, shader: u32) -> bool;
    fn shader_info_log(&self, shader: u32) -> String;

    fn create_program(&self) -> u32;
    fn delete_program(&self, program: u32);
    fn attach_shader(&self, program: u32, shader: u32);
    fn link_program(&self, program: u32);
    fn program_link_status(&self, program: u32) -> bool;
    fn program_info_log(&self, program: u32) -> String;
    fn use_program(&self, program: u32);
    fn uniform_1_i32(&self, location: i32, value: i32);

    fn gen_vertex_array(&self) -> u32;
    fn delete_vertex_array(&self, vertex_array: u32);
    fn bind_vertex_array(&self, vertex_array: u32);
    fn bind_vertex_buffer(&self, binding_index: u32, buffer: u32, offset: usize, stride: u32);
    fn vertex_attrib_pointer_f32(
        &self,
        index: u32,
        size: u32,
        ty: u32,
        normalized: bool,
        stride: u32,
        offset: usize,
    );
    fn enable_vertex_attrib_array(&self, index: u32);

    fn draw_arrays(&self, mode: u32, first: u32, count: u32);
    fn draw_elements(&self, mode: u32, count: u32, ty: u32, offset: usize);
    fn dispatch_compute(&self, x: u32, y: u32, z: u32);
    fn memory_barrier(&self, barriers: BarrierBits);
}
