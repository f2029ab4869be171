//! Shared types for podalert
//!
//! This crate contains the pod, log and alert data structures used across
//! multiple podalert crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Kubernetes Resource Types
// ============================================================================

/// Lifecycle phase of a pod.
///
/// Besides the phases reported by the API server this also covers the
/// scheduling/sync failure reasons that some clusters surface in the phase
/// field. Anything else is preserved verbatim in `Other`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Completed,
    FailedScheduling,
    FailedSync,
    FailedValidation,
    Unknown,
    Other(String),
}

impl PodPhase {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Completed => "Completed",
            Self::FailedScheduling => "FailedScheduling",
            Self::FailedSync => "FailedSync",
            Self::FailedValidation => "FailedValidation",
            Self::Unknown => "Unknown",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for PodPhase {
    fn from(s: &str) -> Self {
        match s {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            "Completed" => Self::Completed,
            "FailedScheduling" => Self::FailedScheduling,
            "FailedSync" => Self::FailedSync,
            "FailedValidation" => Self::FailedValidation,
            "Unknown" | "" => Self::Unknown,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for PodPhase {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<PodPhase> for String {
    fn from(phase: PodPhase) -> Self {
        phase.as_str().to_string()
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a single pod
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodSnapshot {
    /// Pod name, unique within the namespace
    pub name: String,
    pub phase: PodPhase,
    /// Status reason (or message when no reason is set), possibly empty
    pub reason: String,
    pub observed_at: DateTime<Utc>,
}

impl PodSnapshot {
    pub fn new(name: impl Into<String>, phase: PodPhase, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phase,
            reason: reason.into(),
            observed_at: Utc::now(),
        }
    }
}

// ============================================================================
// Log Types
// ============================================================================

/// A structured record extracted from one raw log line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    /// Severity token exactly as written in the line (case-sensitive)
    pub level: String,
    pub message: String,
}

// ============================================================================
// Alert Types
// ============================================================================

/// Embed color used for phase-change alerts
pub const PHASE_CHANGE_COLOR: u32 = 0xFFD700;

/// Alert severity
///
/// The ordering is only used for presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AlertLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl AlertLevel {
    /// Map a log severity token to a level. Tokens are case-sensitive.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            "fatal" => Some(Self::Fatal),
            _ => None,
        }
    }

    /// The log token that maps to this level
    pub fn token(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }

    /// Get display color (RGB) for this level
    pub fn color(&self) -> u32 {
        match self {
            Self::Fatal => 0xFF0000,
            Self::Error => 0xFF8000,
            Self::Warn => 0xFFBF00,
            Self::Info => 0xFFFFFF,
            Self::Debug => 0x00FF00,
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fatal => "🤯 Critical",
            Self::Error => "😵‍💫 Error",
            Self::Warn => "😶‍🌫 Warning",
            Self::Info => "Information",
            Self::Debug => "Debug",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where an alert came from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AlertOrigin {
    /// A reportable line in the pod's logs
    Log,
    /// The pod moved into the given phase
    PhaseChange(PodPhase),
    /// A message about podalert itself, addressed to the operator
    Notice,
}

/// A synthesized notification, delivered once and then dropped
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alert {
    /// Pod name (or the tool's own name for operator notices)
    pub service: String,
    pub level: AlertLevel,
    pub message: String,
    /// Raw log lines around the triggering line; empty for phase changes
    pub context: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub origin: AlertOrigin,
}

impl Alert {
    /// Create an alert for a log line
    pub fn from_logs(
        service: impl Into<String>,
        level: AlertLevel,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
        context: Vec<String>,
    ) -> Self {
        Self {
            service: service.into(),
            level,
            message: message.into(),
            context,
            timestamp,
            origin: AlertOrigin::Log,
        }
    }

    /// Create an alert for a pod that entered `phase`
    pub fn phase_change(
        service: impl Into<String>,
        level: AlertLevel,
        phase: PodPhase,
        reason: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            service: service.into(),
            level,
            message: reason.into(),
            context: Vec::new(),
            timestamp,
            origin: AlertOrigin::PhaseChange(phase),
        }
    }

    /// Create an operator notice
    pub fn notice(service: impl Into<String>, level: AlertLevel, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            level,
            message: message.into(),
            context: Vec::new(),
            timestamp: Utc::now(),
            origin: AlertOrigin::Notice,
        }
    }

    /// Render the text body handed to a notification sink
    pub fn render_body(&self) -> String {
        match &self.origin {
            AlertOrigin::Log => format!(
                "Level: {}\nMessage: {}\n\n*Latest logs:*\n```bash\n{}```",
                self.level.label(),
                self.message,
                self.context.join("\n")
            ),
            AlertOrigin::PhaseChange(phase) => {
                format!("Pod status changed to: {}\nMessage: {}", phase, self.message)
            }
            AlertOrigin::Notice => {
                format!("Level: {}\nMessage: {}", self.level.label(), self.message)
            }
        }
    }

    /// Display color for this alert
    pub fn color(&self) -> u32 {
        match self.origin {
            AlertOrigin::Log | AlertOrigin::Notice => self.level.color(),
            AlertOrigin::PhaseChange(_) => PHASE_CHANGE_COLOR,
        }
    }
}
