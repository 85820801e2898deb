//! Notification sinks.
//!
//! Every run broadcasts through a `NotifierSet`. The log sink is always present;
//! a relay webhook is added when one is configured.

use crate::errors::Result;
use crate::notify::message::Message;
use async_trait::async_trait;
use tracing::{error, info};

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, message: &Message) -> Result<()>;
}

/// Writes messages to the application log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, message: &Message) -> Result<()> {
        info!("{}\n{}", message.title, message.content);
        Ok(())
    }
}

/// Broadcasts to all registered notifiers
pub struct NotifierSet {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotifierSet {
    pub fn new() -> Self {
        Self {
            notifiers: Vec::new(),
        }
    }

    pub fn register(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    /// Deliver to every notifier; returns how many succeeded
    pub async fn broadcast(&self, message: &Message) -> usize {
        let mut delivered = 0;
        for notifier in &self.notifiers {
            match notifier.send(message).await {
                Ok(()) => delivered += 1,
                Err(e) => error!("Notifier {} failed: {}", notifier.name(), e),
            }
        }
        delivered
    }
}

impl Default for NotifierSet {
    fn default() -> Self {
        let mut set = Self::new();
        set.register(Box::new(LogNotifier));
        set
    }
}
