//! Kubernetes client for podalert
//!
//! This crate defines the [`ClusterApi`] seam the watcher talks to and a
//! kube-backed implementation for listing pods, fetching their logs and
//! subscribing to pod change events in one namespace.

mod client;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

pub use client::{ClientOptions, KubeCluster, pod_to_snapshot};

// Re-export types that are used in our public API
pub use podalert_types::{PodPhase, PodSnapshot};

/// Object kind carried by pod events
pub const POD_KIND: &str = "Pod";

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("failed to read kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("failed to infer cluster configuration: {0}")]
    Infer(#[from] kube::config::InferConfigError),

    #[error("kubernetes API request failed: {0}")]
    Api(#[from] kube::Error),

    #[error("pod watch failed: {0}")]
    Watch(#[from] kube::runtime::watcher::Error),
}

/// What happened to the object in a [`PodEvent`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PodEventType {
    /// Created, modified, or listed during (re)initialisation
    Applied,
    Deleted,
}

/// One notification from the live pod subscription
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodEvent {
    /// Kind of the object the event refers to, normally [`POD_KIND`]
    pub kind: String,
    pub event_type: PodEventType,
    pub pod: PodSnapshot,
}

impl PodEvent {
    pub fn new(event_type: PodEventType, pod: PodSnapshot) -> Self {
        Self {
            kind: POD_KIND.to_string(),
            event_type,
            pod,
        }
    }

    pub fn is_pod(&self) -> bool {
        self.kind == POD_KIND
    }
}

/// The cluster operations podalert needs, scoped to one namespace
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Namespace every call is scoped to
    fn namespace(&self) -> &str;

    /// List all pods in the namespace
    async fn list_pods(&self) -> Result<Vec<PodSnapshot>, ClusterError>;

    /// Fetch the raw log output a pod produced in the last `since_seconds`
    async fn pod_logs(&self, pod: &str, since_seconds: i64) -> Result<String, ClusterError>;

    /// Subscribe to pod changes.
    ///
    /// The stream is unbounded and cannot be restarted; it ends only when the
    /// underlying subscription closes.
    fn watch_pods(&self) -> BoxStream<'static, Result<PodEvent, ClusterError>>;
}
