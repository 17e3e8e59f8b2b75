//! Machine-readable results of a suite run.

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::registry::{GROUP_DESCRIPTION, GROUP_NAME};
use crate::scenario::{AccessRun, Mechanism};
use crate::sink::TestResult;
use crate::verify::Verdict;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run: String,
    pub conformant: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mismatch: Option<String>,
}

impl RunReport {
    pub fn new(run: &AccessRun, verdict: &Verdict) -> Self {
        let mismatch = match verdict {
            Verdict::Conformant => None,
            Verdict::Violation(mismatch) => Some(mismatch.to_string()),
        };
        Self {
            run: run.to_string(),
            conformant: mismatch.is_none(),
            mismatch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaseOutcome {
    Passed,
    /// At least one run violated the permitted outcomes.
    Failed,
    Skipped { reason: String },
    /// A fatal error stopped the case before all runs completed.
    Aborted { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseReport {
    pub name: String,
    pub outcome: CaseOutcome,
    pub runs: Vec<RunReport>,
}

impl CaseReport {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            outcome: CaseOutcome::Passed,
            runs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    pub name: String,
    pub mechanism: Mechanism,
    pub description: String,
    pub result: TestResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub cases: Vec<CaseReport>,
}

impl TestReport {
    /// Fails when any case failed or aborted; not supported when every case was skipped.
    pub fn from_cases(mechanism: Mechanism, description: &str, cases: Vec<CaseReport>) -> Self {
        let failed = cases
            .iter()
            .any(|c| matches!(c.outcome, CaseOutcome::Failed | CaseOutcome::Aborted { .. }));
        let all_skipped = cases
            .iter()
            .all(|c| matches!(c.outcome, CaseOutcome::Skipped { .. }));
        let result = if failed {
            TestResult::Fail
        } else if all_skipped {
            TestResult::NotSupported
        } else {
            TestResult::Pass
        };
        Self {
            name: mechanism.name().to_string(),
            mechanism,
            description: description.to_string(),
            result,
            note: None,
            cases,
        }
    }

    pub fn not_supported(mechanism: Mechanism, description: &str, reason: &str) -> Self {
        Self {
            name: mechanism.name().to_string(),
            mechanism,
            description: description.to_string(),
            result: TestResult::NotSupported,
            note: Some(reason.to_string()),
            cases: Vec::new(),
        }
    }

    pub fn case(&self, name: &str) -> Option<&CaseReport> {
        self.cases.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConformanceReport {
    pub group: String,
    pub description: String,
    pub context: String,
    pub tests: Vec<TestReport>,
}

impl ConformanceReport {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            group: GROUP_NAME.to_string(),
            description: GROUP_DESCRIPTION.to_string(),
            context: context.into(),
            tests: Vec::new(),
        }
    }

    pub fn test(&self, name: &str) -> Option<&TestReport> {
        self.tests.iter().find(|t| t.name == name)
    }

    fn count(&self, result: TestResult) -> usize {
        self.tests.iter().filter(|t| t.result == result).count()
    }

    pub fn passed(&self) -> usize {
        self.count(TestResult::Pass)
    }

    pub fn failed(&self) -> usize {
        self.count(TestResult::Fail)
    }

    pub fn not_supported(&self) -> usize {
        self.count(TestResult::NotSupported)
    }

    pub fn print_summary(&self) {
        eprintln!(
            "{} on {}: {} tests, {} passed, {} failed, {} not supported",
            self.group,
            self.context,
            self.tests.len(),
            self.passed(),
            self.failed(),
            self.not_supported()
        );
        for test in &self.tests {
            eprintln!("  {}: {}", test.name, test.result);
            for case in &test.cases {
                match &case.outcome {
                    CaseOutcome::Passed => {}
                    CaseOutcome::Failed => {
                        eprintln!("    - {}: failed", case.name);
                        for run in case.runs.iter().filter(|r| !r.conformant) {
                            if let Some(mismatch) = &run.mismatch {
                                eprintln!("        {}: {mismatch}", run.run);
                            }
                        }
                    }
                    CaseOutcome::Skipped { reason } => eprintln!("    - {}: skipped ({reason})", case.name),
                    CaseOutcome::Aborted { error } => eprintln!("    - {}: aborted ({error})", case.name),
                }
            }
        }
    }

    pub fn write_json(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(path, contents)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn case(outcome: CaseOutcome) -> CaseReport {
        CaseReport {
            outcome,
            ..CaseReport::new("case")
        }
    }

    #[test]
    fn test_result_follows_case_outcomes() {
        let skipped = || {
            case(CaseOutcome::Skipped {
                reason: "missing".to_string(),
            })
        };
        let result = |cases| TestReport::from_cases(Mechanism::TexelFetch, "d", cases).result;
        assert_eq!(result(vec![case(CaseOutcome::Passed), skipped()]), TestResult::Pass);
        assert_eq!(result(vec![skipped(), skipped()]), TestResult::NotSupported);
        assert_eq!(result(vec![case(CaseOutcome::Failed), case(CaseOutcome::Passed)]), TestResult::Fail);
        assert_eq!(
            result(vec![
                case(CaseOutcome::Aborted {
                    error: "lost".to_string()
                }),
                skipped()
            ]),
            TestResult::Fail
        );
    }

    #[test]
    fn outcome_is_tagged_in_json() {
        let json = serde_json::to_value(case(CaseOutcome::Skipped {
            reason: "missing".to_string(),
        }))
        .unwrap();
        assert_eq!(json["outcome"]["status"], "skipped");
        assert_eq!(json["outcome"]["reason"], "missing");
    }
}
