use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use futures::stream::BoxStream;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, LogParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::WatchStreamExt;
use kube::runtime::watcher::{self, Event};
use kube::{Api, ResourceExt};
use tracing::{debug, info};

use crate::{ClusterApi, ClusterError, PodEvent, PodEventType};
use podalert_types::{PodPhase, PodSnapshot};

/// How to locate the cluster
#[derive(Clone, Debug, Default)]
pub struct ClientOptions {
    /// Explicit kubeconfig file; `None` infers (in-cluster or `~/.kube/config`)
    pub kubeconfig: Option<PathBuf>,
    /// Context to use instead of the kubeconfig's current one
    pub context: Option<String>,
}

/// Kubernetes client wrapper scoped to one namespace
#[derive(Clone)]
pub struct KubeCluster {
    pods: Api<Pod>,
    namespace: String,
}

impl KubeCluster {
    /// Wrap an existing client
    pub fn new(client: kube::Client, namespace: &str) -> Self {
        Self {
            pods: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }

    /// Build a client from kubeconfig or the in-cluster environment
    pub async fn connect(namespace: &str, options: &ClientOptions) -> Result<Self, ClusterError> {
        let kube_options = KubeConfigOptions {
            context: options.context.clone(),
            ..Default::default()
        };

        let config = match (&options.kubeconfig, &options.context) {
            (Some(path), _) => {
                debug!(path = %path.display(), "Loading kubeconfig");
                let kubeconfig = Kubeconfig::read_from(path)?;
                kube::Config::from_custom_kubeconfig(kubeconfig, &kube_options).await?
            }
            (None, Some(_)) => kube::Config::from_kubeconfig(&kube_options).await?,
            (None, None) => kube::Config::infer().await?,
        };

        info!(cluster = %config.cluster_url, namespace, "Kubernetes client configured");
        let client = kube::Client::try_from(config)?;
        Ok(Self::new(client, namespace))
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn list_pods(&self) -> Result<Vec<PodSnapshot>, ClusterError> {
        let list = self.pods.list(&ListParams::default()).await?;
        Ok(list.items.iter().map(pod_to_snapshot).collect())
    }

    async fn pod_logs(&self, pod: &str, since_seconds: i64) -> Result<String, ClusterError> {
        let params = LogParams {
            since_seconds: Some(since_seconds),
            ..Default::default()
        };
        Ok(self.pods.logs(pod, &params).await?)
    }

    fn watch_pods(&self) -> BoxStream<'static, Result<PodEvent, ClusterError>> {
        watcher::watcher(self.pods.clone(), watcher::Config::default())
            .default_backoff()
            .filter_map(|event| async move {
                match event {
                    Ok(Event::Apply(pod)) | Ok(Event::InitApply(pod)) => Some(Ok(PodEvent::new(
                        PodEventType::Applied,
                        pod_to_snapshot(&pod),
                    ))),
                    Ok(Event::Delete(pod)) => Some(Ok(PodEvent::new(
                        PodEventType::Deleted,
                        pod_to_snapshot(&pod),
                    ))),
                    Ok(Event::Init) | Ok(Event::InitDone) => None,
                    Err(e) => Some(Err(ClusterError::from(e))),
                }
            })
            .boxed()
    }
}

/// Convert a k8s Pod to a PodSnapshot
pub fn pod_to_snapshot(pod: &Pod) -> PodSnapshot {
    let status = pod.status.as_ref();

    let phase = status
        .and_then(|s| s.phase.as_deref())
        .map(PodPhase::from)
        .unwrap_or(PodPhase::Unknown);

    // Prefer the short machine-readable reason, fall back to the message
    let reason = status
        .and_then(|s| s.reason.clone().or_else(|| s.message.clone()))
        .unwrap_or_default();

    PodSnapshot {
        name: pod.name_any(),
        phase,
        reason,
        observed_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PodStatus;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn pod(name: &str, status: Option<PodStatus>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            status,
            ..Default::default()
        }
    }

    #[test]
    fn test_snapshot_uses_reason() {
        let status = PodStatus {
            phase: Some("Failed".to_string()),
            reason: Some("OOMKilled".to_string()),
            message: Some("container exceeded its memory limit".to_string()),
            ..Default::default()
        };
        let snapshot = pod_to_snapshot(&pod("worker-1", Some(status)));

        assert_eq!(snapshot.name, "worker-1");
        assert_eq!(snapshot.phase, PodPhase::Failed);
        assert_eq!(snapshot.reason, "OOMKilled");
    }

    #[test]
    fn test_snapshot_falls_back_to_message() {
        let status = PodStatus {
            phase: Some("Pending".to_string()),
            message: Some("0/3 nodes are available".to_string()),
            ..Default::default()
        };
        let snapshot = pod_to_snapshot(&pod("api", Some(status)));

        assert_eq!(snapshot.phase, PodPhase::Pending);
        assert_eq!(snapshot.reason, "0/3 nodes are available");
    }

    #[test]
    fn test_snapshot_without_status() {
        let snapshot = pod_to_snapshot(&pod("api", None));
        assert_eq!(snapshot.phase, PodPhase::Unknown);
        assert!(snapshot.reason.is_empty());
    }

    #[test]
    fn test_pod_event_kind() {
        let event = PodEvent::new(
            PodEventType::Applied,
            PodSnapshot::new("api", PodPhase::Running, ""),
        );
        assert!(event.is_pod());
        assert_eq!(event.kind, "Pod");
    }
}
