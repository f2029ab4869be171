//! Change detection and watch loops for podalert
//!
//! This crate keeps the last observed phase of every pod, decides which
//! observations deserve an alert, and drives the periodic poll and the live
//! event subscription that feed it.

mod cache;
mod detector;
mod watcher;

pub use detector::{ChangeDetector, PHASE_ALERT_LEVEL, default_important_phases};
pub use watcher::{OPERATOR_SERVICE, PhaseAlertPolicy, WatchConfig, WatchError, Watcher};
