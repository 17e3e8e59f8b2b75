use rba_gl::enums;
use thiserror::Error;

use crate::template::TemplateError;

/// Infrastructure failures. None of these is a robustness verdict: a conformance violation is
/// reported through [`crate::verify::Verdict`], never as an error.
#[derive(Debug, Error)]
pub enum CtsError {
    #[error("{call} failed with {} ({code:#06x})", gl_error_name(.code))]
    Gl { call: &'static str, code: u32 },
    #[error("{call} returned an invalid object name")]
    InvalidId { call: &'static str },
    #[error("{stage} shader failed to compile: {log}")]
    Compile { stage: &'static str, log: String },
    #[error("program failed to link: {0}")]
    Link(String),
    #[error("framebuffer is not complete: {}", framebuffer_status_name(.status))]
    FramebufferIncomplete { status: u32 },
    #[error(transparent)]
    Template(#[from] TemplateError),
    /// A capability the case needs is missing; the case is skipped rather than failed.
    #[error("not supported: {0}")]
    Unsupported(String),
}

fn gl_error_name(code: &u32) -> &'static str {
    enums::error_name(*code)
}

fn framebuffer_status_name(status: &u32) -> &'static str {
    enums::framebuffer_status_name(*status)
}
