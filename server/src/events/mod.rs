//! Event publishing to the message bus.

pub mod update;

use async_trait::async_trait;
use tracing::info;

/// Publishes domain events to the message bus. Publishing is best-effort;
/// callers log failures and continue.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> anyhow::Result<()>;
}

/// Publisher that writes events to the log, for development and tests.
#[derive(Debug, Default)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> anyhow::Result<()> {
        info!(topic, %payload, "event (log only)");
        Ok(())
    }
}
