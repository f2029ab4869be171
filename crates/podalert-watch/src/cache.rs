use std::collections::HashMap;

use parking_lot::Mutex;

use podalert_types::PodPhase;

/// Last observed phase per pod name.
///
/// Entries are overwritten on every observation and never evicted, so the map
/// grows with the number of distinct pod names seen during the process
/// lifetime.
#[derive(Debug, Default)]
pub(crate) struct PodStateCache {
    phases: Mutex<HashMap<String, PodPhase>>,
}

impl PodStateCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, name: &str) -> Option<PodPhase> {
        self.phases.lock().get(name).cloned()
    }

    /// Store `phase` for `name` and return the phase it replaced.
    ///
    /// Read and write happen under one lock, so two writers racing on the same
    /// pod each see the other's value.
    pub(crate) fn set(&self, name: &str, phase: PodPhase) -> Option<PodPhase> {
        self.phases.lock().insert(name.to_string(), phase)
    }

    pub(crate) fn len(&self) -> usize {
        self.phases.lock().len()
    }
}
