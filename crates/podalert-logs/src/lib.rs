//! Log processing for podalert
//!
//! This crate extracts structured records from raw pod log lines and turns a
//! pod's recent log output into at most one alert.

mod builder;
mod parser;

pub use builder::{AlertBuilder, ReportPolicy};
pub use parser::{LogParseError, TIMESTAMP_FORMAT, parse_line};

// Re-export types used in our public API
pub use podalert_types::{Alert, AlertLevel, LogRecord};
