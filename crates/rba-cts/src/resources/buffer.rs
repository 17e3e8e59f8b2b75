use rba_gl::{enums as gl, Gl};

use super::{warn_on_error, INVALID_ID};
use crate::check::{expect_no_error, expect_valid_id};
use crate::CtsError;

/// Buffer binding points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Array,
    AtomicCounter,
    CopyRead,
    CopyWrite,
    DispatchIndirect,
    DrawIndirect,
    ElementArray,
    PixelPack,
    PixelUnpack,
    Query,
    ShaderStorage,
    TransformFeedback,
    Uniform,
}

impl BufferTarget {
    pub const ALL: [Self; 13] = [
        Self::Array,
        Self::AtomicCounter,
        Self::CopyRead,
        Self::CopyWrite,
        Self::DispatchIndirect,
        Self::DrawIndirect,
        Self::ElementArray,
        Self::PixelPack,
        Self::PixelUnpack,
        Self::Query,
        Self::ShaderStorage,
        Self::TransformFeedback,
        Self::Uniform,
    ];

    pub fn gl_enum(self) -> u32 {
        match self {
            Self::Array => gl::ARRAY_BUFFER,
            Self::AtomicCounter => gl::ATOMIC_COUNTER_BUFFER,
            Self::CopyRead => gl::COPY_READ_BUFFER,
            Self::CopyWrite => gl::COPY_WRITE_BUFFER,
            Self::DispatchIndirect => gl::DISPATCH_INDIRECT_BUFFER,
            Self::DrawIndirect => gl::DRAW_INDIRECT_BUFFER,
            Self::ElementArray => gl::ELEMENT_ARRAY_BUFFER,
            Self::PixelPack => gl::PIXEL_PACK_BUFFER,
            Self::PixelUnpack => gl::PIXEL_UNPACK_BUFFER,
            Self::Query => gl::QUERY_BUFFER,
            Self::ShaderStorage => gl::SHADER_STORAGE_BUFFER,
            Self::TransformFeedback => gl::TRANSFORM_FEEDBACK_BUFFER,
            Self::Uniform => gl::UNIFORM_BUFFER,
        }
    }

    /// Targets with indexed binding points (`glBindBufferBase`).
    pub fn is_indexed(self) -> bool {
        matches!(
            self,
            Self::AtomicCounter | Self::ShaderStorage | Self::TransformFeedback | Self::Uniform
        )
    }
}

pub struct Buffer<'gl> {
    gl: &'gl dyn Gl,
    id: u32,
    target: BufferTarget,
}

impl<'gl> Buffer<'gl> {
    pub fn new(gl: &'gl dyn Gl) -> Self {
        Self {
            gl,
            id: INVALID_ID,
            target: BufferTarget::Array,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Creates a new buffer object bound to `target` and uploads `data` into it.
    pub fn init_data(&mut self, target: BufferTarget, usage: u32, data: &[u8]) -> Result<(), CtsError> {
        self.release();

        let id = self.gl.gen_buffer();
        expect_no_error(self.gl, "GenBuffers")?;
        self.id = expect_valid_id(id, INVALID_ID, "GenBuffers")?;
        self.target = target;

        self.bind()?;
        self.gl.buffer_data(target.gl_enum(), data, usage);
        expect_no_error(self.gl, "BufferData")
    }

    pub fn bind(&self) -> Result<(), CtsError> {
        self.gl.bind_buffer(self.target.gl_enum(), self.id);
        expect_no_error(self.gl, "BindBuffer")
    }

    pub fn bind_base(&self, index: u32) -> Result<(), CtsError> {
        self.gl.bind_buffer_base(self.target.gl_enum(), index, self.id);
        expect_no_error(self.gl, "BindBufferBase")
    }

    pub fn sub_data(&self, offset: usize, data: &[u8]) -> Result<(), CtsError> {
        self.bind()?;
        self.gl.buffer_sub_data(self.target.gl_enum(), offset, data);
        expect_no_error(self.gl, "BufferSubData")
    }

    /// Blocking read-back of `out.len()` bytes.
    pub fn read(&self, offset: usize, out: &mut [u8]) -> Result<(), CtsError> {
        self.bind()?;
        self.gl.get_buffer_sub_data(self.target.gl_enum(), offset, out);
        expect_no_error(self.gl, "GetBufferSubData")
    }

    pub fn release(&mut self) {
        if self.id == INVALID_ID {
            return;
        }
        self.gl.delete_buffer(self.id);
        self.id = INVALID_ID;
        warn_on_error(self.gl, "DeleteBuffers");
    }
}

impl Drop for Buffer<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
