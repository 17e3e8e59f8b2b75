//! Run configuration read from the environment.
//!
//! - `RBA_CTS_FILTER` (optional): comma, semicolon or whitespace separated substrings; only tests
//!   whose name contains one of them run (case-insensitive).
//! - `RBA_CTS_REPORT_PATH` (optional): write a JSON report of the run to this path.
//! - `RBA_CTS_REQUIRE_PASS` (optional, `1`/`true`/`yes`/`on`): turn any failed test into an
//!   error from [`crate::run_from_env`].

use std::ffi::OsString;
use std::path::PathBuf;

pub const FILTER_ENV: &str = "RBA_CTS_FILTER";
pub const REPORT_PATH_ENV: &str = "RBA_CTS_REPORT_PATH";
pub const REQUIRE_PASS_ENV: &str = "RBA_CTS_REQUIRE_PASS";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunConfig {
    pub filter: Vec<String>,
    pub report_path: Option<PathBuf>,
    pub require_pass: bool,
}

impl RunConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let text = |key: &str| lookup(key).map(|v| v.to_string_lossy().into_owned());
        Self {
            filter: text(FILTER_ENV).map(|v| parse_filter(&v)).unwrap_or_default(),
            report_path: lookup(REPORT_PATH_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            require_pass: text(REQUIRE_PASS_ENV).is_some_and(|v| parse_flag(&v)),
        }
    }
}

pub fn parse_filter(input: &str) -> Vec<String> {
    input
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|term| !term.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

fn parse_flag(input: &str) -> bool {
    matches!(
        input.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    struct EnvGuard {
        key: &'static str,
        prev: Option<OsString>,
    }

    impl EnvGuard {
        fn set(key: &'static str, val: &str) -> Self {
            let prev = std::env::var_os(key);
            std::env::set_var(key, val);
            Self { key, prev }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(prev) = self.prev.take() {
                std::env::set_var(self.key, prev);
            } else {
                std::env::remove_var(self.key);
            }
        }
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> {
        let vars: HashMap<String, OsString> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn filter_splits_on_separators() {
        assert_eq!(
            parse_filter(" Texel_Fetch,storage;  uniform "),
            ["texel_fetch", "storage", "uniform"]
        );
        assert!(parse_filter(" , ").is_empty());
    }

    #[test]
    fn missing_variables_give_defaults() {
        assert_eq!(RunConfig::from_lookup(lookup(&[])), RunConfig::default());
    }

    #[test]
    fn require_pass_accepts_common_spellings() {
        for value in ["1", "true", "YES", " on "] {
            let config = RunConfig::from_lookup(lookup(&[(REQUIRE_PASS_ENV, value)]));
            assert!(config.require_pass, "{value:?}");
        }
        let config = RunConfig::from_lookup(lookup(&[(REQUIRE_PASS_ENV, "0")]));
        assert!(!config.require_pass);
    }

    #[test]
    fn empty_report_path_is_ignored() {
        let config = RunConfig::from_lookup(lookup(&[(REPORT_PATH_ENV, "")]));
        assert_eq!(config.report_path, None);
    }

    #[test]
    fn reads_the_process_environment() {
        let _filter = EnvGuard::set(FILTER_ENV, "image");
        let _path = EnvGuard::set(REPORT_PATH_ENV, "target/rba.json");
        let config = RunConfig::from_env();
        assert_eq!(config.filter, ["image"]);
        assert_eq!(config.report_path, Some(PathBuf::from("target/rba.json")));
    }
}
