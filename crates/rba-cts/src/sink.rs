//! Where test verdicts and diagnostics go.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestResult {
    Pass,
    Fail,
    NotSupported,
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "Pass",
            Self::Fail => "Fail",
            Self::NotSupported => "Not supported",
        })
    }
}

/// Receives per-test diagnostics and the final result of each test.
pub trait ResultSink {
    fn message(&mut self, test: &str, text: &str);
    fn set_result(&mut self, test: &str, result: TestResult, description: &str);
}

/// Forwards everything to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl ResultSink for LogSink {
    fn message(&mut self, test: &str, text: &str) {
        tracing::info!(test, "{text}");
    }

    fn set_result(&mut self, test: &str, result: TestResult, description: &str) {
        match result {
            TestResult::Fail => tracing::warn!(test, %result, "{description}"),
            TestResult::Pass | TestResult::NotSupported => tracing::info!(test, %result, "{description}"),
        }
    }
}

/// Keeps everything in memory.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    pub messages: Vec<(String, String)>,
    pub results: Vec<(String, TestResult, String)>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last result set for `test`.
    pub fn result(&self, test: &str) -> Option<TestResult> {
        self.results
            .iter()
            .rev()
            .find(|(name, _, _)| name == test)
            .map(|(_, result, _)| *result)
    }

    pub fn messages_for<'a>(&'a self, test: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.messages
            .iter()
            .filter(move |(name, _)| name == test)
            .map(|(_, text)| text.as_str())
    }
}

impl ResultSink for RecordingSink {
    fn message(&mut self, test: &str, text: &str) {
        self.messages.push((test.to_string(), text.to_string()));
    }

    fn set_result(&mut self, test: &str, result: TestResult, description: &str) {
        self.results
            .push((test.to_string(), result, description.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_keeps_the_latest_result() {
        let mut sink = RecordingSink::new();
        sink.message("texel_fetch", "Test case: Sampling GL_R8 texture failed");
        sink.set_result("texel_fetch", TestResult::Fail, "Fail");
        sink.set_result("texel_fetch", TestResult::Pass, "Pass");
        assert_eq!(sink.result("texel_fetch"), Some(TestResult::Pass));
        assert_eq!(sink.result("uniform_buffer"), None);
        assert_eq!(sink.messages_for("texel_fetch").count(), 1);
    }

    #[test]
    fn results_serialize_in_snake_case() {
        assert_eq!(serde_json::to_string(&TestResult::NotSupported).unwrap(), "\"not_supported\"");
    }
}
