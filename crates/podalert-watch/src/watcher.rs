use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::detector::ChangeDetector;
use podalert_k8s::{ClusterApi, PodEvent, PodEventType};
use podalert_logs::AlertBuilder;
use podalert_notify::NotificationSink;
use podalert_types::{Alert, AlertLevel, PodSnapshot};

/// Service name used for alerts about podalert itself
pub const OPERATOR_SERVICE: &str = "podalert";

/// How phase alerts are raised
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseAlertPolicy {
    /// Alert when a pod enters an important phase, once per transition
    #[default]
    OnChange,
    /// Alert on every poll for every pod that is not Running/Completed
    EveryCycle,
}

#[derive(Clone, Debug)]
pub struct WatchConfig {
    /// Time between polls; also how far back each poll reads logs
    pub interval: Duration,
    pub phase_alerts: PhaseAlertPolicy,
    /// Subscribe to live pod events in addition to polling. Only used with
    /// [`PhaseAlertPolicy::OnChange`].
    pub watch_events: bool,
}

impl WatchConfig {
    /// Whether the event loop runs and owns change detection
    pub fn events_enabled(&self) -> bool {
        self.watch_events && self.phase_alerts == PhaseAlertPolicy::OnChange
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            phase_alerts: PhaseAlertPolicy::OnChange,
            watch_events: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("pod event stream for namespace {namespace} closed")]
    EventStreamClosed { namespace: String },
}

/// Drives the poll loop and the event loop for one namespace
#[derive(Clone)]
pub struct Watcher {
    cluster: Arc<dyn ClusterApi>,
    sink: Arc<dyn NotificationSink>,
    detector: Arc<ChangeDetector>,
    builder: AlertBuilder,
    config: WatchConfig,
    cancel: CancellationToken,
}

impl Watcher {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        sink: Arc<dyn NotificationSink>,
        detector: Arc<ChangeDetector>,
        builder: AlertBuilder,
        config: WatchConfig,
    ) -> Self {
        Self {
            cluster,
            sink,
            detector,
            builder,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops both loops when cancelled
    pub fn stop_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    /// Run the poll loop and, if enabled, the event loop until stopped.
    ///
    /// Returns the event loop's error if the subscription closed on its own.
    pub async fn run(&self) -> Result<(), WatchError> {
        if self.config.watch_events && !self.config.events_enabled() {
            info!("Pod events are not watched with the every_cycle phase policy");
        }

        let events = async {
            if self.config.events_enabled() {
                self.run_events().await
            } else {
                Ok(())
            }
        };

        let ((), events) = tokio::join!(self.run_polling(), events);
        events
    }

    /// Poll until stopped.
    ///
    /// The stop signal is checked before each cycle and while sleeping; a cycle
    /// that has started always runs to completion.
    pub async fn run_polling(&self) {
        info!(
            namespace = self.cluster.namespace(),
            interval_secs = self.config.interval.as_secs(),
            "Starting poll loop"
        );

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.poll_cycle().await;

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        info!("Poll loop stopped");
    }

    /// List pods once, check each pod's recent logs and (depending on the
    /// policy) its phase. Returns the number of alerts raised.
    pub async fn poll_cycle(&self) -> usize {
        let pods = match self.cluster.list_pods().await {
            Ok(pods) => pods,
            Err(e) => {
                error!(
                    namespace = self.cluster.namespace(),
                    error = %e,
                    "Failed to list pods, skipping cycle"
                );
                return 0;
            }
        };
        info!(pods_count = pods.len(), "Number of pods");

        let since_seconds = self.config.interval.as_secs().max(1) as i64;
        let mut raised = 0;

        for pod in &pods {
            match self.cluster.pod_logs(&pod.name, since_seconds).await {
                Ok(logs) => {
                    if let Some(alert) = self.builder.build(&pod.name, &logs) {
                        self.notify(&alert).await;
                        raised += 1;
                    }
                }
                Err(e) => warn!(pod = %pod.name, error = %e, "Failed to get logs"),
            }

            if let Some(alert) = self.phase_alert(pod) {
                self.notify(&alert).await;
                raised += 1;
            }
        }

        raised
    }

    fn phase_alert(&self, pod: &PodSnapshot) -> Option<Alert> {
        match self.config.phase_alerts {
            PhaseAlertPolicy::EveryCycle => self.detector.check_unhealthy(pod),
            // The event loop owns change detection when it runs
            PhaseAlertPolicy::OnChange if self.config.events_enabled() => None,
            PhaseAlertPolicy::OnChange => self.detector.observe(pod),
        }
    }

    /// Consume the live pod subscription until it closes or the watcher is
    /// stopped.
    ///
    /// The subscription cannot be restarted, so a closed stream means phase
    /// changes are no longer seen. That is reported to the operator and
    /// returned as [`WatchError::EventStreamClosed`].
    pub async fn run_events(&self) -> Result<(), WatchError> {
        let namespace = self.cluster.namespace().to_string();
        let mut events = self.cluster.watch_pods();
        info!(namespace = %namespace, "Subscribed to pod events");

        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Event loop stopped");
                    return Ok(());
                }
                next = events.next() => next,
            };

            match next {
                Some(Ok(event)) => {
                    self.handle_event(&event).await;
                }
                Some(Err(e)) => warn!(error = %e, "Pod event stream error"),
                None => {
                    error!(
                        namespace = %namespace,
                        "Pod event stream closed, phase changes are no longer tracked"
                    );
                    let notice = Alert::notice(
                        OPERATOR_SERVICE,
                        AlertLevel::Fatal,
                        "pod event stream closed; live phase tracking has stopped",
                    );
                    self.notify(&notice).await;
                    return Err(WatchError::EventStreamClosed { namespace });
                }
            }
        }
    }

    /// Forward one pod event to the change detector. Returns whether an alert
    /// was raised.
    ///
    /// Deletions carry the pod's last state and are not phase changes. Events
    /// are ignored entirely under [`PhaseAlertPolicy::EveryCycle`].
    pub async fn handle_event(&self, event: &PodEvent) -> bool {
        if !event.is_pod() {
            debug!(kind = %event.kind, "Ignoring non-pod event");
            return false;
        }
        if !self.config.events_enabled() {
            return false;
        }
        if event.event_type == PodEventType::Deleted {
            debug!(pod = %event.pod.name, "Pod deleted");
            return false;
        }

        match self.detector.observe(&event.pod) {
            Some(alert) => {
                self.notify(&alert).await;
                true
            }
            None => false,
        }
    }

    async fn notify(&self, alert: &Alert) {
        if let Err(e) = self.sink.deliver(alert).await {
            error!(service = %alert.service, error = %e, "Failed to send alert");
        }
    }
}
