use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::info;

use podalert_k8s::ClientOptions;
use podalert_logs::ReportPolicy;
use podalert_types::{AlertLevel, PodPhase};
use podalert_watch::{PhaseAlertPolicy, WatchConfig, default_important_phases};

pub const DEFAULT_CONFIG_PATH: &str = "podalert.toml";

/// Prefix of every environment override
const ENV_PREFIX: &str = "PODALERT_";

/// podalert.toml
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub discord: DiscordConfig,
    pub k8s: K8sConfig,
    pub alerts: AlertsConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscordConfig {
    pub webhook: String,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct K8sConfig {
    pub namespace: String,
    /// Empty means infer (in-cluster or ~/.kube/config)
    pub kubeconfig: String,
    /// Empty means the kubeconfig's current context
    pub context: String,
    /// Seconds between polls
    pub interval: u64,
}

impl Default for K8sConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            kubeconfig: String::new(),
            context: String::new(),
            interval: 15,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlertsConfig {
    pub report_levels: Vec<String>,
    pub important_phases: Vec<PodPhase>,
    pub phase_alerts: PhaseAlertPolicy,
    pub watch_events: bool,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            report_levels: vec!["fatal".to_string(), "error".to_string()],
            important_phases: default_important_phases().into_iter().collect(),
            phase_alerts: PhaseAlertPolicy::OnChange,
            watch_events: true,
        }
    }
}

impl Config {
    /// Load the config file and apply `PODALERT_*` environment overrides.
    ///
    /// With no explicit path a missing `podalert.toml` falls back to defaults;
    /// an explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    info!("No {} found, using defaults", DEFAULT_CONFIG_PATH);
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Override values from the environment. `lookup` returns the value of a
    /// variable, if set.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(webhook) = var("DISCORD_WEBHOOK") {
            self.discord.webhook = webhook;
        }
        if let Some(namespace) = var("K8S_NAMESPACE") {
            self.k8s.namespace = namespace;
        }
        if let Some(kubeconfig) = var("K8S_KUBECONFIG") {
            self.k8s.kubeconfig = kubeconfig;
        }
        if let Some(context) = var("K8S_CONTEXT") {
            self.k8s.context = context;
        }
        if let Some(interval) = var("K8S_INTERVAL") {
            self.k8s.interval = interval
                .trim()
                .parse()
                .with_context(|| format!("{ENV_PREFIX}K8S_INTERVAL is not a number: {interval}"))?;
        }
        Ok(())
    }

    /// Reject settings the watcher cannot run with
    pub fn validate(&self, dry_run: bool) -> Result<()> {
        if self.k8s.interval == 0 {
            bail!("k8s.interval must be greater than zero");
        }
        if self.k8s.namespace.trim().is_empty() {
            bail!("k8s.namespace must not be empty");
        }
        if !dry_run && self.discord.webhook.trim().is_empty() {
            bail!("discord.webhook is required (or run with --dry-run)");
        }
        self.alerts.report_policy()?;
        Ok(())
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            kubeconfig: non_empty(&self.k8s.kubeconfig).map(PathBuf::from),
            context: non_empty(&self.k8s.context).map(str::to_string),
        }
    }

    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            interval: Duration::from_secs(self.k8s.interval),
            phase_alerts: self.alerts.phase_alerts,
            watch_events: self.alerts.watch_events,
        }
    }
}

impl AlertsConfig {
    /// Only warn, error and fatal lines can be reported
    pub fn report_policy(&self) -> Result<ReportPolicy> {
        let levels = self
            .report_levels
            .iter()
            .map(|token| match AlertLevel::from_token(token) {
                Some(level) if level >= AlertLevel::Warn => Ok(level),
                _ => bail!(
                    "alerts.report_levels: unsupported level {token:?} (expected fatal, error or warn)"
                ),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ReportPolicy::from_levels(levels))
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const SAMPLE: &str = r#"
[discord]
webhook = "https://discord.com/api/webhooks/123/abc"

[k8s]
namespace = "payments"
interval = 30

[alerts]
report_levels = ["fatal", "error", "warn"]
important_phases = ["Failed", "CrashLoopBackOff"]
phase_alerts = "every_cycle"
watch_events = false
"#;

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();

        assert_eq!(config.k8s.namespace, "default");
        assert_eq!(config.k8s.interval, 15);
        assert_eq!(config.alerts.phase_alerts, PhaseAlertPolicy::OnChange);
        assert!(config.alerts.watch_events);
        assert_eq!(config.alerts.report_policy().unwrap(), ReportPolicy::baseline());
        assert_eq!(config.alerts.important_phases.len(), 8);
        assert!(config.alerts.important_phases.contains(&PodPhase::FailedScheduling));

        let options = config.client_options();
        assert!(options.kubeconfig.is_none());
        assert!(options.context.is_none());
    }

    #[test]
    fn test_parse_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.discord.webhook, "https://discord.com/api/webhooks/123/abc");
        assert_eq!(config.k8s.namespace, "payments");
        assert_eq!(
            config.alerts.important_phases,
            vec![PodPhase::Failed, PodPhase::Other("CrashLoopBackOff".to_string())]
        );
        assert_eq!(config.alerts.report_policy().unwrap(), ReportPolicy::with_warnings());

        let watch = config.watch_config();
        assert_eq!(watch.interval, Duration::from_secs(30));
        assert_eq!(watch.phase_alerts, PhaseAlertPolicy::EveryCycle);
        assert!(!watch.watch_events);
        assert!(config.validate(false).is_ok());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(Config::parse("[k8s]\nnamspace = \"x\"\n").is_err());
        assert!(Config::parse("[slack]\nwebhook = \"x\"\n").is_err());
        assert!(Config::parse("[alerts]\nphase_alerts = \"sometimes\"\n").is_err());
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PODALERT_DISCORD_WEBHOOK", "https://discord.com/api/webhooks/1/t"),
            ("PODALERT_K8S_NAMESPACE", "staging"),
            ("PODALERT_K8S_KUBECONFIG", "/etc/kube/config"),
            ("PODALERT_K8S_CONTEXT", "prod"),
            ("PODALERT_K8S_INTERVAL", "5"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::parse(SAMPLE).unwrap();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.discord.webhook, "https://discord.com/api/webhooks/1/t");
        assert_eq!(config.k8s.namespace, "staging");
        assert_eq!(config.k8s.interval, 5);

        let options = config.client_options();
        assert_eq!(options.kubeconfig, Some(PathBuf::from("/etc/kube/config")));
        assert_eq!(options.context.as_deref(), Some("prod"));

        let mut config = Config::default();
        let bad = config.apply_env(|key| (key == "PODALERT_K8S_INTERVAL").then(|| "soon".to_string()));
        assert!(bad.is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        assert!(config.validate(false).is_err(), "webhook is required");
        assert!(config.validate(true).is_ok());

        config.k8s.interval = 0;
        assert!(config.validate(true).is_err());
        config.k8s.interval = 15;

        config.k8s.namespace = "  ".to_string();
        assert!(config.validate(true).is_err());
        config.k8s.namespace = "default".to_string();

        config.alerts.report_levels = Vec::new();
        assert!(config.validate(true).is_ok());
        assert!(config.alerts.report_policy().unwrap().is_empty());

        config.alerts.report_levels = vec!["info".to_string()];
        assert!(config.validate(true).is_err());
        config.alerts.report_levels = vec!["Error".to_string()];
        assert!(config.validate(true).is_err());
    }
}
