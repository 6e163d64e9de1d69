//! Notification sinks for domain events.
//!
//! The engine receives one sink at construction and never reaches for a
//! process-wide emitter. Dashboards and brokers plug in by implementing
//! [`NotificationSink`].

use crate::domain::event::DomainEvent;
use crate::domain::ports::NotificationSink;
use crate::error::{FareError, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

/// Writes every event to the log and nowhere else.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        info!(
            event = %event.name,
            timestamp = %event.timestamp.to_rfc3339(),
            payload = %event.payload,
            "domain_event"
        );
        Ok(())
    }
}

/// Forwards events into an unbounded tokio channel.
///
/// Publishing fails once the receiver has been dropped; the engine logs that
/// and carries on.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<DomainEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DomainEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| FareError::internal("notification channel closed"))
    }
}
