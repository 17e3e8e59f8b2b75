//! [`Gl`] implementation over a caller-created `glow::Context`.
//!
//! Context creation (window, surface, pbuffer) is the caller's business; this wrapper only
//! forwards entry points. Name conversion follows the suite's conventions: `0` means "unbind",
//! and a failed `gen_*` returns the wrapper sentinel so the caller reports an invalid id.

use std::num::NonZeroU32;

use glow::HasContext;

use crate::{ApiType, BarrierBits, Gl};

/// Wraps a `glow::Context` that is current on the calling thread.
pub struct GlowContext {
    gl: glow::Context,
    api: ApiType,
}

impl GlowContext {
    /// # Safety
    ///
    /// `gl` must stay current on the calling thread for the lifetime of the wrapper.
    pub unsafe fn new(gl: glow::Context) -> Self {
        let version = gl.version();
        let api = if version.is_embedded {
            ApiType::es(version.major, version.minor)
        } else {
            ApiType::core(version.major, version.minor)
        };
        tracing::info!(%api, vendor = %version.vendor_info, "wrapping glow context");
        Self { gl, api }
    }

    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }

    pub fn into_gl(self) -> glow::Context {
        self.gl
    }
}

fn name(id: u32) -> Option<NonZeroU32> {
    NonZeroU32::new(id)
}

fn gen_or_sentinel<T>(what: &str, result: Result<T, String>, get: impl Fn(T) -> u32, sentinel: u32) -> u32 {
    match result {
        Ok(object) => get(object),
        Err(err) => {
            tracing::warn!("{what} failed: {err}");
            sentinel
        }
    }
}

fn clamp_i32(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn as_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

// SAFETY (all blocks below): the constructor's contract keeps the context current; every
// argument is forwarded unchanged, and invalid values are reported by the driver via
// `glGetError` rather than causing undefined behaviour.
impl Gl for GlowContext {
    fn api_type(&self) -> ApiType {
        self.api
    }

    fn is_extension_supported(&self, name: &str) -> bool {
        self.gl.supported_extensions().contains(name)
    }

    fn get_error(&self) -> u32 {
        unsafe { self.gl.get_error() }
    }

    fn get_integer(&self, pname: u32) -> i32 {
        unsafe { self.gl.get_parameter_i32(pname) }
    }

    fn enable(&self, cap: u32) {
        unsafe { self.gl.enable(cap) }
    }

    fn disable(&self, cap: u32) {
        unsafe { self.gl.disable(cap) }
    }

    fn gen_buffer(&self) -> u32 {
        let result = unsafe { self.gl.create_buffer() };
        gen_or_sentinel("glGenBuffers", result, |b| b.0.get(), u32::MAX)
    }

    fn delete_buffer(&self, buffer: u32) {
        if let Some(id) = name(buffer) {
            unsafe { self.gl.delete_buffer(glow::NativeBuffer(id)) }
        }
    }

    fn bind_buffer(&self, target: u32, buffer: u32) {
        unsafe { self.gl.bind_buffer(target, name(buffer).map(glow::NativeBuffer)) }
    }

    fn bind_buffer_base(&self, target: u32, index: u32, buffer: u32) {
        unsafe {
            self.gl
                .bind_buffer_base(target, index, name(buffer).map(glow::NativeBuffer))
        }
    }

    fn buffer_data(&self, target: u32, data: &[u8], usage: u32) {
        unsafe { self.gl.buffer_data_u8_slice(target, data, usage) }
    }

    fn buffer_sub_data(&self, target: u32, offset: usize, data: &[u8]) {
        unsafe { self.gl.buffer_sub_data_u8_slice(target, clamp_i32(offset), data) }
    }

    fn get_buffer_sub_data(&self, target: u32, offset: usize, out: &mut [u8]) {
        unsafe { self.gl.get_buffer_sub_data(target, clamp_i32(offset), out) }
    }

    fn gen_texture(&self) -> u32 {
        let result = unsafe { self.gl.create_texture() };
        gen_or_sentinel("glGenTextures", result, |t| t.0.get(), u32::MAX)
    }

    fn delete_texture(&self, texture: u32) {
        if let Some(id) = name(texture) {
            unsafe { self.gl.delete_texture(glow::NativeTexture(id)) }
        }
    }

    fn active_texture(&self, unit: u32) {
        unsafe { self.gl.active_texture(unit) }
    }

    fn bind_texture(&self, target: u32, texture: u32) {
        unsafe { self.gl.bind_texture(target, name(texture).map(glow::NativeTexture)) }
    }

    fn tex_parameter_i32(&self, target: u32, pname: u32, value: i32) {
        unsafe { self.gl.tex_parameter_i32(target, pname, value) }
    }

    fn tex_storage_2d(&self, target: u32, levels: u32, internal_format: u32, width: u32, height: u32) {
        unsafe {
            self.gl.tex_storage_2d(
                target,
                as_i32(levels),
                internal_format,
                as_i32(width),
                as_i32(height),
            )
        }
    }

    fn tex_storage_2d_multisample(
        &self,
        target: u32,
        samples: u32,
        internal_format: u32,
        width: u32,
        height: u32,
        fixed_sample_locations: bool,
    ) {
        unsafe {
            self.gl.tex_storage_2d_multisample(
                target,
                as_i32(samples),
                internal_format,
                as_i32(width),
                as_i32(height),
                fixed_sample_locations,
            )
        }
    }

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
    ) {
        unsafe {
            self.gl.tex_sub_image_2d(
                target,
                as_i32(level),
                as_i32(x),
                as_i32(y),
                as_i32(width),
                as_i32(height),
                format,
                ty,
                glow::PixelUnpackData::Slice(pixels),
            )
        }
    }

    fn get_tex_image(&self, target: u32, level: u32, format: u32, ty: u32, out: &mut [u8]) {
        unsafe {
            self.gl.get_tex_image(
                target,
                as_i32(level),
                format,
                ty,
                glow::PixelPackData::Slice(out),
            )
        }
    }

    fn bind_image_texture(
        &self,
        unit: u32,
        texture: u32,
        level: u32,
        layered: bool,
        layer: u32,
        access: u32,
        format: u32,
    ) {
        let Some(id) = name(texture) else {
            tracing::warn!(unit, "glBindImageTexture with texture 0 is not forwarded");
            return;
        };
        unsafe {
            self.gl.bind_image_texture(
                unit,
                glow::NativeTexture(id),
                as_i32(level),
                layered,
                as_i32(layer),
                access,
                format,
            )
        }
    }

    fn gen_framebuffer(&self) -> u32 {
        let result = unsafe { self.gl.create_framebuffer() };
        gen_or_sentinel("glGenFramebuffers", result, |f| f.0.get(), u32::MAX)
    }

    fn delete_framebuffer(&self, framebuffer: u32) {
        if let Some(id) = name(framebuffer) {
            unsafe { self.gl.delete_framebuffer(glow::NativeFramebuffer(id)) }
        }
    }

    fn bind_framebuffer(&self, target: u32, framebuffer: u32) {
        unsafe {
            self.gl
                .bind_framebuffer(target, name(framebuffer).map(glow::NativeFramebuffer))
        }
    }

    fn framebuffer_texture(&self, target: u32, attachment: u32, texture: u32, level: u32) {
        unsafe {
            self.gl.framebuffer_texture(
                target,
                attachment,
                name(texture).map(glow::NativeTexture),
                as_i32(level),
            )
        }
    }

    fn check_framebuffer_status(&self, target: u32) -> u32 {
        unsafe { self.gl.check_framebuffer_status(target) }
    }

    fn viewport(&self, x: i32, y: i32, width: u32, height: u32) {
        unsafe { self.gl.viewport(x, y, as_i32(width), as_i32(height)) }
    }

    fn create_shader(&self, stage: u32) -> u32 {
        let result = unsafe { self.gl.create_shader(stage) };
        gen_or_sentinel("glCreateShader", result, |s| s.0.get(), 0)
    }

    fn delete_shader(&self, shader: u32) {
        if let Some(id) = name(shader) {
            unsafe { self.gl.delete_shader(glow::NativeShader(id)) }
        }
    }

    fn shader_source(&self, shader: u32, source: &str) {
        if let Some(id) = name(shader) {
            unsafe { self.gl.shader_source(glow::NativeShader(id), source) }
        }
    }

    fn compile_shader(&self, shader: u32) {
        if let Some(id) = name(shader) {
            unsafe { self.gl.compile_shader(glow::NativeShader(id)) }
        }
    }

    fn shader_compile_status(&self, shader: u32) -> bool {
        name(shader)
            .map(|id| unsafe { self.gl.get_shader_compile_status(glow::NativeShader(id)) })
            .unwrap_or(false)
    }

    fn shader_info_log(&self, shader: u32) -> String {
        name(shader)
            .map(|id| unsafe { self.gl.get_shader_info_log(glow::NativeShader(id)) })
            .unwrap_or_default()
    }

    fn create_program(&self) -> u32 {
        let result = unsafe { self.gl.create_program() };
        gen_or_sentinel("glCreateProgram", result, |p| p.0.get(), 0)
    }

    fn delete_program(&self, program: u32) {
        if let Some(id) = name(program) {
            unsafe { self.gl.delete_program(glow::NativeProgram(id)) }
        }
    }

    fn attach_shader(&self, program: u32, shader: u32) {
        if let (Some(program), Some(shader)) = (name(program), name(shader)) {
            unsafe {
                self.gl
                    .attach_shader(glow::NativeProgram(program), glow::NativeShader(shader))
            }
        }
    }

    fn link_program(&self, program: u32) {
        if let Some(id) = name(program) {
            unsafe { self.gl.link_program(glow::NativeProgram(id)) }
        }
    }

    fn program_link_status(&self, program: u32) -> bool {
        name(program)
            .map(|id| unsafe { self.gl.get_program_link_status(glow::NativeProgram(id)) })
            .unwrap_or(false)
    }

    fn program_info_log(&self, program: u32) -> String {
        name(program)
            .map(|id| unsafe { self.gl.get_program_info_log(glow::NativeProgram(id)) })
            .unwrap_or_default()
    }

    fn use_program(&self, program: u32) {
        unsafe { self.gl.use_program(name(program).map(glow::NativeProgram)) }
    }

    fn uniform_1_i32(&self, location: i32, value: i32) {
        let Ok(location) = u32::try_from(location) else {
            return;
        };
        let location = glow::NativeUniformLocation(location);
        unsafe { self.gl.uniform_1_i32(Some(&location), value) }
    }

    fn gen_vertex_array(&self) -> u32 {
        let result = unsafe { self.gl.create_vertex_array() };
        gen_or_sentinel("glGenVertexArrays", result, |v| v.0.get(), u32::MAX)
    }

    fn delete_vertex_array(&self, vertex_array: u32) {
        if let Some(id) = name(vertex_array) {
            unsafe { self.gl.delete_vertex_array(glow::NativeVertexArray(id)) }
        }
    }

    fn bind_vertex_array(&self, vertex_array: u32) {
        unsafe {
            self.gl
                .bind_vertex_array(name(vertex_array).map(glow::NativeVertexArray))
        }
    }

    fn bind_vertex_buffer(&self, binding_index: u32, buffer: u32, offset: usize, stride: u32) {
        unsafe {
            self.gl.bind_vertex_buffer(
                binding_index,
                name(buffer).map(glow::NativeBuffer),
                clamp_i32(offset),
                as_i32(stride),
            )
        }
    }

    fn vertex_attrib_pointer_f32(
        &self,
        index: u32,
        size: u32,
        ty: u32,
        normalized: bool,
        stride: u32,
        offset: usize,
    ) {
        unsafe {
            self.gl.vertex_attrib_pointer_f32(
                index,
                as_i32(size),
                ty,
                normalized,
                as_i32(stride),
                clamp_i32(offset),
            )
        }
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        unsafe { self.gl.enable_vertex_attrib_array(index) }
    }

    fn draw_arrays(&self, mode: u32, first: u32, count: u32) {
        unsafe { self.gl.draw_arrays(mode, as_i32(first), as_i32(count)) }
    }

    fn draw_elements(&self, mode: u32, count: u32, ty: u32, offset: usize) {
        unsafe { self.gl.draw_elements(mode, as_i32(count), ty, clamp_i32(offset)) }
    }

    fn dispatch_compute(&self, x: u32, y: u32, z: u32) {
        unsafe { self.gl.dispatch_compute(x, y, z) }
    }

    fn memory_barrier(&self, barriers: BarrierBits) {
        unsafe { self.gl.memory_barrier(barriers.bits()) }
    }
}
