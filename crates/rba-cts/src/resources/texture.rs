use rba_gl::{enums as gl, Gl};

use super::{warn_on_error, INVALID_ID};
use crate::check::{expect_no_error, expect_valid_id};
use crate::CtsError;

/// Texture object with immutable storage.
///
/// The data calls bind the texture to the given target on the active unit before touching it.
pub struct Texture<'gl> {
    gl: &'gl dyn Gl,
    id: u32,
}

impl<'gl> Texture<'gl> {
    pub fn new(gl: &'gl dyn Gl) -> Self {
        Self { gl, id: INVALID_ID }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn generate(&mut self) -> Result<(), CtsError> {
        self.release();
        let id = self.gl.gen_texture();
        expect_no_error(self.gl, "GenTextures")?;
        self.id = expect_valid_id(id, INVALID_ID, "GenTextures")?;
        Ok(())
    }

    pub fn bind(&self, target: u32) -> Result<(), CtsError> {
        self.gl.bind_texture(target, self.id);
        expect_no_error(self.gl, "BindTexture")
    }

    pub fn unbind(gl: &dyn Gl, target: u32) -> Result<(), CtsError> {
        gl.bind_texture(target, 0);
        expect_no_error(gl, "BindTexture")
    }

    pub fn storage(&self, target: u32, levels: u32, internal_format: u32, width: u32, height: u32) -> Result<(), CtsError> {
        self.bind(target)?;
        self.gl.tex_storage_2d(target, levels, internal_format, width, height);
        expect_no_error(self.gl, "TexStorage2D")
    }

    pub fn storage_multisample(&self, samples: u32, internal_format: u32, width: u32, height: u32) -> Result<(), CtsError> {
        self.bind(gl::TEXTURE_2D_MULTISAMPLE)?;
        self.gl
            .tex_storage_2d_multisample(gl::TEXTURE_2D_MULTISAMPLE, samples, internal_format, width, height, false);
        expect_no_error(self.gl, "TexStorage2DMultisample")
    }

    #[allow(clippy::too_many_arguments)]
    pub fn sub_image(
        &self,
        target: u32,
        level: u32,
        width: u32,
        height: u32,
        format: u32,
        ty: u32,
        pixels: &[u8],
    ) -> Result<(), CtsError> {
        self.bind(target)?;
        self.gl
            .tex_sub_image_2d(target, level, 0, 0, width, height, format, ty, pixels);
        expect_no_error(self.gl, "TexSubImage2D")
    }

    pub fn get_image(&self, target: u32, level: u32, format: u32, ty: u32, out: &mut [u8]) -> Result<(), CtsError> {
        self.bind(target)?;
        self.gl.get_tex_image(target, level, format, ty, out);
        expect_no_error(self.gl, "GetTexImage")
    }

    pub fn set_nearest_filtering(&self, target: u32) -> Result<(), CtsError> {
        self.bind(target)?;
        for pname in [gl::TEXTURE_MIN_FILTER, gl::TEXTURE_MAG_FILTER] {
            self.gl.tex_parameter_i32(target, pname, gl::NEAREST as i32);
            expect_no_error(self.gl, "TexParameteri")?;
        }
        Ok(())
    }

    /// Binds `level` of the texture to image unit `unit`.
    pub fn bind_image(&self, unit: u32, level: u32, access: u32, format: u32) -> Result<(), CtsError> {
        self.gl
            .bind_image_texture(unit, self.id, level, false, 0, access, format);
        expect_no_error(self.gl, "BindImageTexture")
    }

    pub fn release(&mut self) {
        if self.id == INVALID_ID {
            return;
        }
        self.gl.delete_texture(self.id);
        self.id = INVALID_ID;
        warn_on_error(self.gl, "DeleteTextures");
    }
}

impl Drop for Texture<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
