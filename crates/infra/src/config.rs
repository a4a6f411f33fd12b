//! Engine configuration.
//!
//! Defaults are usable as-is. Deployments override them from a JSON document
//! ([`EngineConfig::from_json`]) or from `AIDFLOW_*` environment variables
//! ([`EngineConfig::from_env`]).

use serde::{Deserialize, Serialize};
use tracing::warn;

use aidflow_distribution::{ExecutorConfig, MatchingPolicy, ReportConfig};

pub const ENV_PREFER_SUPPLY_ID: &str = "AIDFLOW_PREFER_SUPPLY_ID";
pub const ENV_MAX_CLAMP_RETRIES: &str = "AIDFLOW_MAX_CLAMP_RETRIES";
pub const ENV_DEFAULT_NOTE: &str = "AIDFLOW_DEFAULT_NOTE";
pub const ENV_REPORT_DELIMITER: &str = "AIDFLOW_REPORT_DELIMITER";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub matching: MatchingPolicy,
    pub executor: ExecutorConfig,
    pub report: ReportConfig,
}

impl EngineConfig {
    pub fn with_matching(mut self, matching: MatchingPolicy) -> Self {
        self.matching = matching;
        self
    }

    pub fn with_executor(mut self, executor: ExecutorConfig) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_report(mut self, report: ReportConfig) -> Self {
        self.report = report;
        self
    }

    /// Parse a JSON document. Missing sections keep their defaults.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `AIDFLOW_*` key.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_PREFER_SUPPLY_ID) {
            match parse_flag(&raw) {
                Some(flag) => config.matching.prefer_supply_id = flag,
                None => warn!(key = ENV_PREFER_SUPPLY_ID, value = %raw, "ignoring invalid flag"),
            }
        }

        if let Some(raw) = lookup(ENV_MAX_CLAMP_RETRIES) {
            match raw.trim().parse::<u32>() {
                Ok(retries) => config.executor.max_clamp_retries = retries,
                Err(e) => warn!(key = ENV_MAX_CLAMP_RETRIES, value = %raw, error = %e, "ignoring invalid retry count"),
            }
        }

        if let Some(raw) = lookup(ENV_DEFAULT_NOTE) {
            if raw.trim().is_empty() {
                warn!(key = ENV_DEFAULT_NOTE, "ignoring empty default note");
            } else {
                config.executor.default_note = raw;
            }
        }

        if let Some(raw) = lookup(ENV_REPORT_DELIMITER) {
            match parse_delimiter(&raw) {
                Some(delimiter) => config.report.delimiter = delimiter,
                None => warn!(key = ENV_REPORT_DELIMITER, value = %raw, "ignoring invalid delimiter"),
            }
        }

        config
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// A single ASCII character, or `tab`/`\t`.
fn parse_delimiter(raw: &str) -> Option<u8> {
    if matches!(raw, "tab" | "\\t" | "\t") {
        return Some(b'\t');
    }
    match raw.as_bytes() {
        [b] if b.is_ascii() && !b.is_ascii_alphanumeric() && *b != b'"' && *b != b'\n' => Some(*b),
        _ => None,
    }
}
