use std::io;
use std::path::PathBuf;

use rba_gl::Gl;
use thiserror::Error;

use crate::config::RunConfig;
use crate::registry::{self, TestEntry, TESTS};
use crate::report::{CaseOutcome, CaseReport, ConformanceReport, TestReport};
use crate::scenario::{self, Capabilities};
use crate::sink::ResultSink;
use crate::CtsError;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("filter {filter:?} selects no test (known tests: {known})")]
    NoTestSelected { filter: Vec<String>, known: String },
    #[error("querying context capabilities failed: {0}")]
    Capabilities(#[source] CtsError),
    #[error("writing report to {} failed: {source}", .path.display())]
    Report {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{failed} test(s) failed")]
    Failed { failed: usize },
}

const NOT_SUPPORTED: &str = "robust buffer access behavior is not supported by this context";

/// Runs the selected tests of the group, one after the other, against `gl`.
pub fn run(gl: &dyn Gl, config: &RunConfig, sink: &mut dyn ResultSink) -> Result<ConformanceReport, RunError> {
    let tests = registry::select(&config.filter);
    if tests.is_empty() {
        return Err(RunError::NoTestSelected {
            filter: config.filter.clone(),
            known: TESTS.iter().map(TestEntry::name).collect::<Vec<_>>().join(", "),
        });
    }

    let caps = Capabilities::query(gl).map_err(RunError::Capabilities)?;
    tracing::info!(
        context = %caps.api,
        khr = caps.khr_robust_buffer_access,
        arb = caps.arb_robust_buffer_access,
        extended = caps.extended_robustness(),
        "starting {}",
        registry::GROUP_NAME
    );

    let mut report = ConformanceReport::new(caps.api.to_string());
    for entry in tests {
        let test = if caps.robust_access_supported() {
            run_test(gl, &caps, &entry, sink)
        } else {
            sink.message(entry.name(), NOT_SUPPORTED);
            TestReport::not_supported(entry.mechanism, entry.description, NOT_SUPPORTED)
        };
        sink.set_result(entry.name(), test.result, &test.result.to_string());
        report.tests.push(test);
    }

    if let Some(path) = &config.report_path {
        report.write_json(path).map_err(|source| RunError::Report {
            path: path.clone(),
            source,
        })?;
    }
    Ok(report)
}

fn run_test(gl: &dyn Gl, caps: &Capabilities, entry: &TestEntry, sink: &mut dyn ResultSink) -> TestReport {
    let mut cases = Vec::new();
    for case in scenario::plan(entry.mechanism, caps) {
        let report = scenario::drive_case(gl, caps, &case);
        emit_case(sink, entry.name(), &report);
        cases.push(report);
    }
    TestReport::from_cases(entry.mechanism, entry.description, cases)
}

fn emit_case(sink: &mut dyn ResultSink, test: &str, case: &CaseReport) {
    match &case.outcome {
        CaseOutcome::Passed => {}
        CaseOutcome::Failed => {
            sink.message(test, &format!("Test case: {} failed", case.name));
            for run in case.runs.iter().filter(|r| !r.conformant) {
                if let Some(mismatch) = &run.mismatch {
                    sink.message(test, &format!("{} with {}: {mismatch}", case.name, run.run));
                }
            }
        }
        CaseOutcome::Skipped { reason } => {
            sink.message(test, &format!("Test case: {} not supported: {reason}", case.name));
        }
        CaseOutcome::Aborted { error } => {
            sink.message(test, &format!("Test case: {} aborted: {error}", case.name));
        }
    }
}

#[cfg(test)]
mod tests {
    use rba_gl::ApiType;
    use rba_soft::{SoftConfig, SoftGl};

    use super::*;
    use crate::sink::{RecordingSink, TestResult};

    #[test]
    fn unknown_filter_is_an_error() {
        let gl = SoftGl::default();
        let config = RunConfig {
            filter: vec!["geometry".to_string()],
            ..RunConfig::default()
        };
        let err = run(&gl, &config, &mut RecordingSink::new()).unwrap_err();
        assert!(matches!(err, RunError::NoTestSelected { .. }));
        assert!(err.to_string().contains("texel_fetch"), "{err}");
    }

    #[test]
    fn missing_feature_marks_every_selected_test_not_supported() {
        let gl = SoftGl::new(SoftConfig {
            api: ApiType::core(4, 2),
            extensions: Vec::new(),
            ..SoftConfig::default()
        });
        let mut sink = RecordingSink::new();
        let config = RunConfig {
            filter: vec!["buffer".to_string()],
            ..RunConfig::default()
        };
        let report = run(&gl, &config, &mut sink).unwrap();
        assert_eq!(report.tests.len(), 3);
        assert_eq!(report.not_supported(), 3);
        assert_eq!(sink.result("storage_buffer"), Some(TestResult::NotSupported));
        assert_eq!(sink.result("texel_fetch"), None);
        assert_eq!(gl.live_objects().total(), 0);
    }

    #[test]
    fn filtered_run_reports_only_selected_tests() {
        let gl = SoftGl::default();
        let mut sink = RecordingSink::new();
        let config = RunConfig {
            filter: vec!["uniform".to_string()],
            ..RunConfig::default()
        };
        let report = run(&gl, &config, &mut sink).unwrap();
        assert_eq!(report.tests.len(), 1);
        assert_eq!(report.passed(), 1);
        assert_eq!(sink.results.len(), 1);
    }
}
