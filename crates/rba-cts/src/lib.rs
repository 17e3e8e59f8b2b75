//! Conformance tests for robust buffer access behavior.
//!
//! The group `robust_buffer_access_behavior` has five tests, one per GPU access path: vertex
//! fetch, texel fetch, image load/store, shader storage buffers and uniform buffers. Each test
//! draws or dispatches once with in-bounds indices and then repeatedly with indices pushed out of
//! bounds by increasing offsets, and checks the read-back data against the outcomes the robust
//! access rules permit (zero, a value from inside the resource, or a discarded write).
//!
//! Everything runs through [`rba_gl::Gl`]; the `rba-soft` crate provides a software device for
//! running the suite without a driver.
//!
//! ## Environment variables
//!
//! [`run_from_env`] reads its [`RunConfig`] from the environment, see [`config`].

mod check;
pub mod config;
mod error;
pub mod format;
pub mod registry;
pub mod report;
pub mod resources;
pub mod runner;
pub mod scenario;
pub mod shaders;
pub mod sink;
pub mod template;
pub mod verify;

pub use config::RunConfig;
pub use error::CtsError;
pub use report::{CaseOutcome, CaseReport, ConformanceReport, RunReport, TestReport};
pub use runner::{run, RunError};
pub use sink::{LogSink, RecordingSink, ResultSink, TestResult};

use rba_gl::Gl;

/// Runs the suite with configuration from the environment, reporting through `tracing`.
pub fn run_from_env(gl: &dyn Gl) -> Result<ConformanceReport, RunError> {
    let config = RunConfig::from_env();
    let report = run(gl, &config, &mut LogSink)?;
    if config.require_pass && report.failed() > 0 {
        return Err(RunError::Failed {
            failed: report.failed(),
        });
    }
    Ok(report)
}
