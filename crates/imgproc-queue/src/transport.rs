//! Queue transport capability.
//!
//! A [`Delivery`] is disposed by value: [`Delivery::ack`] and
//! [`Delivery::reject`] consume it, so every inbound message is acked or
//! rejected at most once.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::QueueResult;

/// Content type of every message the worker publishes.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Durability requested for a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// May be dropped or trimmed (progress updates)
    Transient,
    /// Must be kept until consumed (results)
    Persistent,
}

/// Settles deliveries with the broker they came from.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self, tag: &str) -> QueueResult<()>;

    /// `body` is passed back so a transport can re-publish or dead-letter it.
    async fn reject(&self, tag: &str, body: &[u8], requeue: bool) -> QueueResult<()>;
}

/// One inbound message.
pub struct Delivery {
    tag: String,
    body: Vec<u8>,
    acker: Arc<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(tag: impl Into<String>, body: Vec<u8>, acker: Arc<dyn Acknowledger>) -> Self {
        Self {
            tag: tag.into(),
            body,
            acker,
        }
    }

    /// Broker-assigned identifier (stream entry id, sequence number, ...).
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub async fn ack(self) -> QueueResult<()> {
        self.acker.ack(&self.tag).await
    }

    pub async fn reject(self, requeue: bool) -> QueueResult<()> {
        self.acker.reject(&self.tag, &self.body, requeue).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("tag", &self.tag)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// Ordered, possibly endless stream of deliveries.
pub type DeliveryStream = BoxStream<'static, QueueResult<Delivery>>;

/// Message broker the worker consumes jobs from and publishes to.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Start consuming `queue`.
    async fn subscribe(&self, queue: &str) -> QueueResult<DeliveryStream>;

    async fn publish(
        &self,
        queue: &str,
        content_type: &str,
        mode: DeliveryMode,
        body: &[u8],
    ) -> QueueResult<()>;
}
