use std::collections::HashSet;

use tracing::{debug, info};

use crate::cache::PodStateCache;
use podalert_types::{Alert, AlertLevel, PodPhase, PodSnapshot};

/// Severity of every phase-change alert
pub const PHASE_ALERT_LEVEL: AlertLevel = AlertLevel::Warn;

/// Phases that alert when a pod enters them
pub fn default_important_phases() -> HashSet<PodPhase> {
    [
        PodPhase::FailedScheduling,
        PodPhase::FailedSync,
        PodPhase::FailedValidation,
        PodPhase::Failed,
        PodPhase::Succeeded,
        PodPhase::Running,
        PodPhase::Completed,
        PodPhase::Pending,
    ]
    .into_iter()
    .collect()
}

/// Decides whether a pod observation is a reportable phase change.
///
/// The only deduplication in podalert: a pod alerts when its phase differs
/// from the last one seen (or it was never seen), so repeating the same phase
/// is silent while A -> B -> A alerts on each step.
#[derive(Debug)]
pub struct ChangeDetector {
    cache: PodStateCache,
    important: HashSet<PodPhase>,
}

impl ChangeDetector {
    pub fn new(important: impl IntoIterator<Item = PodPhase>) -> Self {
        Self {
            cache: PodStateCache::new(),
            important: important.into_iter().collect(),
        }
    }

    /// Record `pod`'s phase and return an alert if it changed into an
    /// important phase.
    ///
    /// Phases outside the important set still update the cache.
    pub fn observe(&self, pod: &PodSnapshot) -> Option<Alert> {
        let previous = self.cache.set(&pod.name, pod.phase.clone());
        if previous.as_ref() == Some(&pod.phase) {
            return None;
        }

        info!(
            pod = %pod.name,
            from = previous.as_ref().map(PodPhase::as_str).unwrap_or("<none>"),
            to = %pod.phase,
            "Pod phase changed"
        );

        if !self.is_important(&pod.phase) {
            debug!(pod = %pod.name, phase = %pod.phase, "Phase is not alert-worthy");
            return None;
        }

        Some(phase_alert(pod))
    }

    /// Alert whenever `pod` is neither Running nor Completed, without looking
    /// at or updating the cache. Repeats on every call.
    pub fn check_unhealthy(&self, pod: &PodSnapshot) -> Option<Alert> {
        if matches!(pod.phase, PodPhase::Running | PodPhase::Completed) {
            return None;
        }
        info!(
            pod = %pod.name,
            phase = %pod.phase,
            reason = %pod.reason,
            "Pod is not healthy"
        );
        Some(phase_alert(pod))
    }

    pub fn is_important(&self, phase: &PodPhase) -> bool {
        self.important.contains(phase)
    }

    /// Last phase seen for `name`, if any
    pub fn last_phase(&self, name: &str) -> Option<PodPhase> {
        self.cache.get(name)
    }

    /// Number of distinct pods observed so far
    pub fn tracked_pods(&self) -> usize {
        self.cache.len()
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(default_important_phases())
    }
}

fn phase_alert(pod: &PodSnapshot) -> Alert {
    Alert::phase_change(
        pod.name.clone(),
        PHASE_ALERT_LEVEL,
        pod.phase.clone(),
        pod.reason.clone(),
        pod.observed_at,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use podalert_types::AlertOrigin;

    fn pod(name: &str, phase: PodPhase) -> PodSnapshot {
        PodSnapshot::new(name, phase, "")
    }

    #[test]
    fn test_repeated_phase_alerts_once() {
        let detector = ChangeDetector::default();

        assert!(detector.observe(&pod("p", PodPhase::Pending)).is_some());
        assert!(detector.observe(&pod("p", PodPhase::Pending)).is_none());

        let alert = detector.observe(&pod("p", PodPhase::Running)).unwrap();
        assert_eq!(alert.origin, AlertOrigin::PhaseChange(PodPhase::Running));
        assert_eq!(alert.level, PHASE_ALERT_LEVEL);

        assert!(detector.observe(&pod("p", PodPhase::Running)).is_none());
        assert_eq!(detector.last_phase("p"), Some(PodPhase::Running));
    }

    #[test]
    fn test_oscillation_alerts_every_transition() {
        let detector = ChangeDetector::default();
        let alerts = [PodPhase::Pending, PodPhase::Running, PodPhase::Pending]
            .into_iter()
            .filter_map(|phase| detector.observe(&pod("p", phase)))
            .count();
        assert_eq!(alerts, 3);
    }

    #[test]
    fn test_unimportant_phase_updates_cache_silently() {
        let detector = ChangeDetector::default();

        assert!(detector.observe(&pod("p", PodPhase::Unknown)).is_none());
        assert_eq!(detector.last_phase("p"), Some(PodPhase::Unknown));

        let evicted = PodPhase::Other("Evicted".to_string());
        assert!(detector.observe(&pod("p", evicted.clone())).is_none());
        assert_eq!(detector.last_phase("p"), Some(evicted));

        // Leaving an unimportant phase for an important one still alerts
        assert!(detector.observe(&pod("p", PodPhase::Failed)).is_some());
    }

    #[test]
    fn test_custom_important_set() {
        let detector = ChangeDetector::new([PodPhase::Failed]);

        assert!(detector.observe(&pod("p", PodPhase::Running)).is_none());
        assert!(detector.observe(&pod("p", PodPhase::Failed)).is_some());
        assert_eq!(detector.tracked_pods(), 1);
    }

    #[test]
    fn test_alert_carries_reason() {
        let detector = ChangeDetector::default();
        let alert = detector
            .observe(&PodSnapshot::new("worker-1", PodPhase::Failed, "OOMKilled"))
            .unwrap();

        assert_eq!(alert.service, "worker-1");
        assert_eq!(alert.message, "OOMKilled");
        assert!(alert.context.is_empty());
    }

    #[test]
    fn test_check_unhealthy_repeats_without_cache() {
        let detector = ChangeDetector::default();
        let pending = pod("p", PodPhase::Pending);

        assert!(detector.check_unhealthy(&pending).is_some());
        assert!(detector.check_unhealthy(&pending).is_some());
        assert!(detector.check_unhealthy(&pod("p", PodPhase::Running)).is_none());
        assert!(detector.check_unhealthy(&pod("p", PodPhase::Completed)).is_none());
        assert_eq!(detector.tracked_pods(), 0);
    }

    #[test]
    fn test_concurrent_observers_alert_once() {
        let detector = ChangeDetector::default();
        let failed = pod("p", PodPhase::Failed);

        let alerts: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| detector.observe(&failed).is_some() as usize))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(alerts, 1);
    }
}
