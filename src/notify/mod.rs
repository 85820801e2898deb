pub mod message;
pub mod notifier;
pub mod webhook;

pub use notifier::NotifierSet;
pub use webhook::WebhookNotifier;

use crate::config::NotificationsConfig;
use crate::errors::Result;
use std::time::Duration;
use tracing::{info, warn};

/// Log sink always, plus the relay when a webhook URL survived env expansion
pub fn build_notifiers(config: &NotificationsConfig, timeout: Duration) -> Result<NotifierSet> {
    let mut set = NotifierSet::default();

    match config.webhook_url.as_deref() {
        Some(url) if !url.trim().is_empty() => {
            set.register(Box::new(WebhookNotifier::new(
                url.to_string(),
                config.webhook_token.clone(),
                timeout,
            )?));
            info!("Webhook notifier enabled");
        }
        _ => warn!("No webhook_url configured; alerts will only be logged"),
    }
    info!("{} notifiers registered", set.len());

    Ok(set)
}
