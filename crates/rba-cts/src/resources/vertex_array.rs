use rba_gl::Gl;

use super::{warn_on_error, INVALID_ID};
use crate::check::{expect_no_error, expect_valid_id};
use crate::CtsError;

pub struct VertexArray<'gl> {
    gl: &'gl dyn Gl,
    id: u32,
}

impl<'gl> VertexArray<'gl> {
    pub fn new(gl: &'gl dyn Gl) -> Self {
        Self { gl, id: INVALID_ID }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn generate(&mut self) -> Result<(), CtsError> {
        self.release();
        let id = self.gl.gen_vertex_array();
        expect_no_error(self.gl, "GenVertexArrays")?;
        self.id = expect_valid_id(id, INVALID_ID, "GenVertexArrays")?;
        Ok(())
    }

    pub fn bind(&self) -> Result<(), CtsError> {
        self.gl.bind_vertex_array(self.id);
        expect_no_error(self.gl, "BindVertexArray")
    }

    pub fn release(&mut self) {
        if self.id == INVALID_ID {
            return;
        }
        self.gl.delete_vertex_array(self.id);
        self.id = INVALID_ID;
        warn_on_error(self.gl, "DeleteVertexArrays");
    }
}

impl Drop for VertexArray<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
