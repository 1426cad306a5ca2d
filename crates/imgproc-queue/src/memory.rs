//! In-process queue transport.
//!
//! Records everything published and every ack/reject so callers can assert on
//! how deliveries were settled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use tokio::sync::Notify;

use crate::error::{QueueError, QueueResult};
use crate::transport::{Acknowledger, Delivery, DeliveryMode, DeliveryStream, QueueTransport};

/// A message handed to [`QueueTransport::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub queue: String,
    pub content_type: String,
    pub mode: DeliveryMode,
    pub body: Vec<u8>,
}

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Reject { requeue: bool },
}

type Entry = (String, Vec<u8>);

#[derive(Default)]
struct State {
    next_tag: u64,
    senders: HashMap<String, UnboundedSender<Entry>>,
    receivers: HashMap<String, UnboundedReceiver<Entry>>,
    published: Vec<PublishedMessage>,
    dispositions: Vec<(String, Disposition)>,
}

impl State {
    fn channel(&mut self, queue: &str) -> &UnboundedSender<Entry> {
        if !self.senders.contains_key(queue) {
            let (tx, rx) = unbounded();
            self.senders.insert(queue.to_string(), tx);
            self.receivers.insert(queue.to_string(), rx);
        }
        &self.senders[queue]
    }

    fn enqueue(&mut self, queue: &str, body: Vec<u8>) -> String {
        self.next_tag += 1;
        let tag = self.next_tag.to_string();
        // A closed channel just drops the message.
        let _ = self.channel(queue).unbounded_send((tag.clone(), body));
        tag
    }
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    settled: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn settle(&self, tag: &str, disposition: Disposition) {
        self.lock().dispositions.push((tag.to_string(), disposition));
        self.settled.notify_waiters();
    }
}

/// Queue transport backed by in-process channels.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    shared: Arc<Shared>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a raw message body and return its tag.
    pub fn push(&self, queue: &str, body: impl Into<Vec<u8>>) -> String {
        self.shared.lock().enqueue(queue, body.into())
    }

    /// End the subscription on `queue` once the enqueued messages are drained.
    pub fn close(&self, queue: &str) {
        let mut state = self.shared.lock();
        if let Some(tx) = state.senders.get(queue) {
            tx.close_channel();
        }
    }

    /// Messages published to `queue`, oldest first.
    pub fn published(&self, queue: &str) -> Vec<PublishedMessage> {
        self.shared
            .lock()
            .published
            .iter()
            .filter(|m| m.queue == queue)
            .cloned()
            .collect()
    }

    /// Settled deliveries as `(tag, disposition)`, in settle order.
    pub fn dispositions(&self) -> Vec<(String, Disposition)> {
        self.shared.lock().dispositions.clone()
    }

    /// Wait until at least `count` deliveries have been settled.
    pub async fn wait_for_dispositions(&self, count: usize) -> Vec<(String, Disposition)> {
        loop {
            let notified = self.shared.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let state = self.shared.lock();
                if state.dispositions.len() >= count {
                    return state.dispositions.clone();
                }
            }
            notified.await;
        }
    }
}

struct MemoryAcker {
    shared: Arc<Shared>,
    queue: String,
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&self, tag: &str) -> QueueResult<()> {
        self.shared.settle(tag, Disposition::Ack);
        Ok(())
    }

    async fn reject(&self, tag: &str, body: &[u8], requeue: bool) -> QueueResult<()> {
        if requeue {
            self.shared.lock().enqueue(&self.queue, body.to_vec());
        }
        self.shared.settle(tag, Disposition::Reject { requeue });
        Ok(())
    }
}

#[async_trait]
impl QueueTransport for MemoryQueue {
    async fn subscribe(&self, queue: &str) -> QueueResult<DeliveryStream> {
        let rx = {
            let mut state = self.shared.lock();
            state.channel(queue);
            state.receivers.remove(queue)
        }
        .ok_or_else(|| QueueError::subscribe_failed(format!("{queue} already has a consumer")))?;

        let acker: Arc<dyn Acknowledger> = Arc::new(MemoryAcker {
            shared: self.shared.clone(),
            queue: queue.to_string(),
        });

        let stream = rx.map(move |(tag, body)| Ok(Delivery::new(tag, body, acker.clone())));
        Ok(stream.boxed())
    }

    async fn publish(
        &self,
        queue: &str,
        content_type: &str,
        mode: DeliveryMode,
        body: &[u8],
    ) -> QueueResult<()> {
        let mut state = self.shared.lock();
        state.published.push(PublishedMessage {
            queue: queue.to_string(),
            content_type: content_type.to_string(),
            mode,
            body: body.to_vec(),
        });
        state.enqueue(queue, body.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::CONTENT_TYPE_JSON;

    #[tokio::test]
    async fn test_push_then_consume_in_order() {
        let queue = MemoryQueue::new();
        queue.push("jobs", "a");
        queue.push("jobs", "b");
        queue.close("jobs");

        let deliveries: Vec<_> = queue
            .subscribe("jobs")
            .await
            .unwrap()
            .map(|d| d.unwrap())
            .collect()
            .await;

        let bodies: Vec<_> = deliveries.iter().map(|d| d.body().to_vec()).collect();
        assert_eq!(bodies, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[tokio::test]
    async fn test_ack_and_reject_are_recorded() {
        let queue = MemoryQueue::new();
        let first = queue.push("jobs", "a");
        let second = queue.push("jobs", "b");

        let mut stream = queue.subscribe("jobs").await.unwrap();
        stream.next().await.unwrap().unwrap().ack().await.unwrap();
        stream.next().await.unwrap().unwrap().reject(false).await.unwrap();

        assert_eq!(
            queue.wait_for_dispositions(2).await,
            vec![
                (first, Disposition::Ack),
                (second, Disposition::Reject { requeue: false }),
            ]
        );
    }

    #[tokio::test]
    async fn test_requeue_redelivers_body() {
        let queue = MemoryQueue::new();
        queue.push("jobs", "retry-me");

        let mut stream = queue.subscribe("jobs").await.unwrap();
        let delivery = stream.next().await.unwrap().unwrap();
        delivery.reject(true).await.unwrap();

        let again = stream.next().await.unwrap().unwrap();
        assert_eq!(again.body(), b"retry-me");
    }

    #[test]
    fn test_publish_is_recorded() {
        let queue = MemoryQueue::new();
        tokio_test::assert_ok!(tokio_test::block_on(queue.publish(
            "results",
            CONTENT_TYPE_JSON,
            DeliveryMode::Persistent,
            b"{}"
        )));

        let published = queue.published("results");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].content_type, "application/json");
        assert_eq!(published[0].mode, DeliveryMode::Persistent);
        assert!(queue.published("events").is_empty());
    }

    #[tokio::test]
    async fn test_second_subscriber_is_refused() {
        let queue = MemoryQueue::new();
        let _stream = queue.subscribe("jobs").await.unwrap();
        assert!(matches!(
            queue.subscribe("jobs").await,
            Err(QueueError::SubscribeFailed(_))
        ));
    }
}
