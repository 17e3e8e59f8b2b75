use rba_gl::{enums as gl, Gl};

use super::{warn_on_error, INVALID_ID};
use crate::check::{expect_no_error, expect_valid_id};
use crate::CtsError;

pub struct Framebuffer<'gl> {
    gl: &'gl dyn Gl,
    id: u32,
}

impl<'gl> Framebuffer<'gl> {
    pub fn new(gl: &'gl dyn Gl) -> Self {
        Self { gl, id: INVALID_ID }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn generate(&mut self) -> Result<(), CtsError> {
        self.release();
        let id = self.gl.gen_framebuffer();
        expect_no_error(self.gl, "GenFramebuffers")?;
        self.id = expect_valid_id(id, INVALID_ID, "GenFramebuffers")?;
        Ok(())
    }

    pub fn bind(&self, target: u32) -> Result<(), CtsError> {
        self.gl.bind_framebuffer(target, self.id);
        expect_no_error(self.gl, "BindFramebuffer")
    }

    /// Attaches `level` of `texture` and sets the viewport to its size.
    pub fn attach_texture(
        &self,
        target: u32,
        attachment: u32,
        texture: u32,
        level: u32,
        width: u32,
        height: u32,
    ) -> Result<(), CtsError> {
        self.gl.framebuffer_texture(target, attachment, texture, level);
        expect_no_error(self.gl, "FramebufferTexture")?;
        self.gl.viewport(0, 0, width, height);
        expect_no_error(self.gl, "Viewport")
    }

    pub fn status(&self, target: u32) -> Result<u32, CtsError> {
        let status = self.gl.check_framebuffer_status(target);
        expect_no_error(self.gl, "CheckFramebufferStatus")?;
        Ok(status)
    }

    pub fn require_complete(&self, target: u32) -> Result<(), CtsError> {
        match self.status(target)? {
            gl::FRAMEBUFFER_COMPLETE => Ok(()),
            status => Err(CtsError::FramebufferIncomplete { status }),
        }
    }

    pub fn release(&mut self) {
        if self.id == INVALID_ID {
            return;
        }
        self.gl.delete_framebuffer(self.id);
        self.id = INVALID_ID;
        warn_on_error(self.gl, "DeleteFramebuffers");
    }
}

impl Drop for Framebuffer<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
