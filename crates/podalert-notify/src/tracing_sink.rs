use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::{NotificationSink, SinkError};
use podalert_types::{Alert, AlertLevel};

/// Writes alerts to the process log instead of delivering them.
///
/// Used for dry runs and for trying out a config without a webhook.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn deliver(&self, alert: &Alert) -> Result<(), SinkError> {
        let body = alert.render_body();
        match alert.level {
            AlertLevel::Fatal | AlertLevel::Error => {
                error!(service = %alert.service, level = ?alert.level, "{}", body)
            }
            AlertLevel::Warn => warn!(service = %alert.service, level = ?alert.level, "{}", body),
            AlertLevel::Info | AlertLevel::Debug => {
                info!(service = %alert.service, level = ?alert.level, "{}", body)
            }
        }
        Ok(())
    }
}
