//! Owning wrappers for GL objects.
//!
//! Each wrapper owns at most one GL object. Creation releases whatever the wrapper held before,
//! `release()` is idempotent, and `Drop` releases. Every GL call is followed by an error check so a
//! failure is reported against the call that raised it.

mod buffer;
mod framebuffer;
mod program;
mod texture;
mod vertex_array;

pub use buffer::{Buffer, BufferTarget};
pub use framebuffer::Framebuffer;
pub use program::{Program, ProgramSources, Shader, ShaderStage};
pub use texture::Texture;
pub use vertex_array::VertexArray;

use rba_gl::Gl;

use crate::check::expect_no_error;

/// Name held by a buffer, texture, framebuffer or vertex array wrapper that owns nothing.
pub const INVALID_ID: u32 = u32::MAX;

/// Release paths run from `Drop` and cannot propagate errors.
fn warn_on_error(gl: &dyn Gl, call: &'static str) {
    if let Err(err) = expect_no_error(gl, call) {
        tracing::warn!(%err, "failed to release GL object");
    }
}

#[cfg(test)]
mod tests {
    use rba_gl::enums as gl;
    use rba_soft::{SoftConfig, SoftGl};

    use super::*;
    use crate::CtsError;

    #[test]
    fn release_resets_to_sentinel_and_is_idempotent() {
        let soft = SoftGl::default();
        let mut buffer = Buffer::new(&soft);
        buffer.release();
        assert_eq!(buffer.id(), INVALID_ID);

        buffer
            .init_data(BufferTarget::ShaderStorage, gl::DYNAMIC_COPY, &[0; 16])
            .unwrap();
        assert_ne!(buffer.id(), INVALID_ID);

        buffer.release();
        buffer.release();
        assert_eq!(buffer.id(), INVALID_ID);
        assert_eq!(soft.live_objects().total(), 0);
        assert_eq!(soft.double_deletes(), 0);
    }

    #[test]
    fn reinitialisation_deletes_previous_object_once() {
        let soft = SoftGl::default();
        {
            let mut texture = Texture::new(&soft);
            texture.generate().unwrap();
            let first = texture.id();
            texture.generate().unwrap();
            assert_ne!(texture.id(), first);
            assert_eq!(soft.live_objects().textures, 1);
        }
        assert_eq!(soft.live_objects().total(), 0);
        assert_eq!(soft.double_deletes(), 0);
    }

    #[test]
    fn failed_creation_is_an_invalid_id_error() {
        let soft = SoftGl::new(SoftConfig {
            fail_object_creation: true,
            ..SoftConfig::default()
        });
        let mut buffer = Buffer::new(&soft);
        let err = buffer
            .init_data(BufferTarget::Array, gl::STATIC_DRAW, &[1, 2, 3, 4])
            .unwrap_err();
        assert!(matches!(err, CtsError::InvalidId { call: "GenBuffers" }), "{err}");
        assert_eq!(buffer.id(), INVALID_ID);

        let mut vao = VertexArray::new(&soft);
        assert!(matches!(vao.generate(), Err(CtsError::InvalidId { .. })));
    }

    #[test]
    fn buffer_round_trips_through_sub_data() {
        let soft = SoftGl::default();
        let mut buffer = Buffer::new(&soft);
        buffer
            .init_data(BufferTarget::CopyWrite, gl::DYNAMIC_DRAW, &[0; 8])
            .unwrap();
        buffer.sub_data(4, &[9, 8, 7, 6]).unwrap();
        let mut out = [0u8; 8];
        buffer.read(0, &mut out).unwrap();
        assert_eq!(out, [0, 0, 0, 0, 9, 8, 7, 6]);
    }

    #[test]
    fn binding_an_unindexed_target_by_index_is_a_gl_error() {
        let soft = SoftGl::default();
        let mut buffer = Buffer::new(&soft);
        buffer
            .init_data(BufferTarget::Array, gl::STATIC_DRAW, &[0; 4])
            .unwrap();
        let err = buffer.bind_base(0).unwrap_err();
        assert!(
            matches!(
                err,
                CtsError::Gl {
                    call: "BindBufferBase",
                    code: gl::INVALID_ENUM
                }
            ),
            "{err}"
        );
    }

    #[test]
    fn compile_failure_carries_the_info_log() {
        let soft = SoftGl::default();
        let mut program = Program::new(&soft);
        let sources = ProgramSources {
            compute: "void main() {}\n".to_string(),
            ..ProgramSources::default()
        };
        match program.init(&sources) {
            Err(CtsError::Compile { stage, log }) => {
                assert_eq!(stage, "compute");
                assert!(log.contains("#version"), "{log}");
            }
            other => panic!("expected a compile error, got {other:?}"),
        }
        drop(program);
        assert_eq!(soft.live_objects().total(), 0);
    }

    #[test]
    fn incomplete_framebuffer_reports_its_status() {
        let soft = SoftGl::default();
        let mut texture = Texture::new(&soft);
        texture.generate().unwrap();
        texture
            .storage(gl::TEXTURE_2D, 1, gl::RG8_SNORM, 16, 16)
            .unwrap();
        let mut framebuffer = Framebuffer::new(&soft);
        framebuffer.generate().unwrap();
        framebuffer.bind(gl::DRAW_FRAMEBUFFER).unwrap();
        framebuffer
            .attach_texture(gl::DRAW_FRAMEBUFFER, gl::COLOR_ATTACHMENT0, texture.id(), 0, 16, 16)
            .unwrap();
        let err = framebuffer.require_complete(gl::DRAW_FRAMEBUFFER).unwrap_err();
        assert!(
            matches!(
                err,
                CtsError::FramebufferIncomplete {
                    status: gl::FRAMEBUFFER_UNSUPPORTED
                }
            ),
            "{err}"
        );
    }

    #[test]
    fn buffer_targets_cover_every_binding_point() {
        let enums: std::collections::HashSet<u32> = BufferTarget::ALL.iter().map(|t| t.gl_enum()).collect();
        assert_eq!(enums.len(), 13);
        assert!(BufferTarget::Uniform.is_indexed());
        assert!(!BufferTarget::ElementArray.is_indexed());
    }
}
