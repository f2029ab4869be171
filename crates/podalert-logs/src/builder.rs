use std::collections::HashMap;

use tracing::warn;

use podalert_types::{Alert, AlertLevel};

use crate::parser::parse_line;

/// Which log severity tokens are alert-worthy, and at what level
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportPolicy {
    levels: HashMap<String, AlertLevel>,
}

impl ReportPolicy {
    /// `fatal` and `error` lines
    pub fn baseline() -> Self {
        Self::from_levels([AlertLevel::Fatal, AlertLevel::Error])
    }

    /// `fatal`, `error` and `warn` lines
    pub fn with_warnings() -> Self {
        Self::from_levels([AlertLevel::Fatal, AlertLevel::Error, AlertLevel::Warn])
    }

    /// Build a policy from explicit levels. Info and Debug are never reportable
    /// and are ignored here.
    pub fn from_levels(levels: impl IntoIterator<Item = AlertLevel>) -> Self {
        let levels = levels
            .into_iter()
            .filter(|level| *level >= AlertLevel::Warn)
            .map(|level| (level.token().to_string(), level))
            .collect();
        Self { levels }
    }

    /// Map a severity token to an alert level if it is reportable
    pub fn level_for(&self, token: &str) -> Option<AlertLevel> {
        self.levels.get(token).copied()
    }

    /// True when no line can ever be reported
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

impl Default for ReportPolicy {
    fn default() -> Self {
        Self::baseline()
    }
}

/// Turns a pod's recent log output into at most one alert
#[derive(Clone, Debug, Default)]
pub struct AlertBuilder {
    policy: ReportPolicy,
}

impl AlertBuilder {
    pub fn new(policy: ReportPolicy) -> Self {
        Self { policy }
    }

    /// Scan `logs` in order and build an alert from the first reportable line.
    ///
    /// The alert carries every line of `logs` as context, not just the
    /// triggering one. Later reportable lines are ignored, so a pod yields at
    /// most one log alert per scan.
    pub fn build(&self, service: &str, logs: &str) -> Option<Alert> {
        let lines = split_lines(logs);

        for line in &lines {
            let record = match parse_line(line) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    warn!(service, error = %e, "Failed to parse log line");
                    continue;
                }
            };

            if let Some(level) = self.policy.level_for(&record.level) {
                return Some(Alert::from_logs(
                    service,
                    level,
                    record.message,
                    record.timestamp,
                    lines.iter().map(|l| l.to_string()).collect(),
                ));
            }
        }

        None
    }
}

/// Split a log blob on `\n` and `\r`, dropping the empty segments left by
/// `\r\n` pairs and trailing newlines
fn split_lines(logs: &str) -> Vec<&str> {
    logs.split(['\n', '\r']).filter(|l| !l.is_empty()).collect()
}
