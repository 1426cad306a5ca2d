//! Redis Streams transport.
//!
//! Each queue is a stream read through one consumer group. A delivery is
//! acked with `XACK` + `XDEL`; a rejected delivery is copied either back onto
//! the stream (requeue) or onto `<queue>:rejected`, then acked.
//!
//! Entries left pending by a consumer that died are taken over with
//! `XAUTOCLAIM` once they have been idle for `claim_min_idle_ms`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamAutoClaimReply, StreamId, StreamReadReply};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::transport::{Acknowledger, Delivery, DeliveryMode, DeliveryStream, QueueTransport};

const BODY_FIELD: &str = "body";
const CONTENT_TYPE_FIELD: &str = "content_type";
const CLAIM_START: &str = "0-0";

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Consumer name within the group, unique per process
    pub consumer_name: String,
    /// XREADGROUP block time
    pub block_ms: u64,
    /// Approximate cap applied to streams receiving transient messages
    pub transient_max_len: u64,
    /// Idle time after which another consumer's pending entry is claimed
    pub claim_min_idle_ms: u64,
    /// How often the pending entries list is scanned
    pub claim_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            consumer_group: "imgproc:workers".to_string(),
            consumer_name: default_consumer_name(),
            block_ms: 5000,
            transient_max_len: 10_000,
            claim_min_idle_ms: 600_000,
            claim_interval_ms: 30_000,
        }
    }
}

fn default_consumer_name() -> String {
    format!("imgproc-{}", uuid::Uuid::new_v4())
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or_else(|_| "imgproc:workers".to_string()),
            consumer_name: std::env::var("QUEUE_CONSUMER_NAME")
                .unwrap_or_else(|_| default_consumer_name()),
            block_ms: std::env::var("QUEUE_BLOCK_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5000),
            transient_max_len: std::env::var("QUEUE_TRANSIENT_MAX_LEN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10_000),
            claim_min_idle_ms: std::env::var("QUEUE_CLAIM_MIN_IDLE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(600_000),
            claim_interval_ms: std::env::var("QUEUE_CLAIM_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30_000),
        }
    }

    /// Raise the claim idle time to at least `idle`, so entries still being
    /// worked on are never taken over.
    pub fn with_claim_idle_at_least(mut self, idle: Duration) -> Self {
        let idle_ms = u64::try_from(idle.as_millis()).unwrap_or(u64::MAX);
        self.claim_min_idle_ms = self.claim_min_idle_ms.max(idle_ms);
        self
    }
}

/// Name of the stream rejected deliveries are parked on.
pub fn rejected_stream(queue: &str) -> String {
    format!("{queue}:rejected")
}

/// Redis Streams queue client.
pub struct RedisQueue {
    client: redis::Client,
    conn: MultiplexedConnection,
    config: QueueConfig,
}

impl RedisQueue {
    /// Connect to Redis.
    pub async fn connect(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        info!(consumer = %config.consumer_name, "Connected to Redis");
        Ok(Self {
            client,
            conn,
            config,
        })
    }

    /// Connect using environment variables.
    pub async fn from_env() -> QueueResult<Self> {
        Self::connect(QueueConfig::from_env()).await
    }

    /// Create the consumer group if it does not exist yet.
    async fn ensure_group(&self, queue: &str) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(queue)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group {} on {}", self.config.consumer_group, queue),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }
        Ok(())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }
}

struct StreamAcker {
    conn: MultiplexedConnection,
    stream: String,
    group: String,
}

impl StreamAcker {
    async fn append(&self, stream: &str, body: &[u8]) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("XADD")
            .arg(stream)
            .arg("*")
            .arg(BODY_FIELD)
            .arg(body)
            .query_async::<String>(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Acknowledger for StreamAcker {
    async fn ack(&self, tag: &str) -> QueueResult<()> {
        let mut conn = self.conn.clone();

        redis::cmd("XACK")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(tag)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.stream)
            .arg(tag)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged {} on {}", tag, self.stream);
        Ok(())
    }

    async fn reject(&self, tag: &str, body: &[u8], requeue: bool) -> QueueResult<()> {
        if requeue {
            self.append(&self.stream, body).await?;
        } else {
            self.append(&rejected_stream(&self.stream), body).await?;
        }
        self.ack(tag).await?;
        warn!(requeue, "Rejected {} on {}", tag, self.stream);
        Ok(())
    }
}

struct ReadState {
    conn: MultiplexedConnection,
    stream: String,
    group: String,
    consumer: String,
    block_ms: u64,
    claim_min_idle_ms: u64,
    claim_interval: Duration,
    next_claim: Instant,
    claim_cursor: String,
    acker: Arc<dyn Acknowledger>,
    buffered: VecDeque<Delivery>,
}

impl ReadState {
    async fn read(&mut self) -> QueueResult<()> {
        if Instant::now() >= self.next_claim {
            self.claim().await?;
            if !self.buffered.is_empty() {
                return Ok(());
            }
        }
        self.read_new().await
    }

    /// One `XAUTOCLAIM` step over the pending entries list. The cursor is kept
    /// across calls until the scan wraps around to `0-0`.
    async fn claim(&mut self) -> QueueResult<()> {
        let reply: StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(&self.consumer)
            .arg(self.claim_min_idle_ms)
            .arg(&self.claim_cursor)
            .arg("COUNT")
            .arg(1)
            .query_async(&mut self.conn)
            .await?;

        for id in &reply.deleted_ids {
            debug!("Pending entry {} on {} was deleted", id, self.stream);
        }
        for entry in &reply.claimed {
            info!("Claimed pending entry {} on {}", entry.id, self.stream);
        }
        self.buffer(reply.claimed);

        if reply.next_stream_id == CLAIM_START {
            self.next_claim = Instant::now() + self.claim_interval;
        }
        self.claim_cursor = reply.next_stream_id;
        Ok(())
    }

    async fn read_new(&mut self) -> QueueResult<()> {
        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(self.block_ms)
            .arg("STREAMS")
            .arg(&self.stream)
            .arg(">")
            .query_async(&mut self.conn)
            .await?;

        for key in reply.map(|r| r.keys).unwrap_or_default() {
            self.buffer(key.ids);
        }
        Ok(())
    }

    fn buffer(&mut self, entries: Vec<StreamId>) {
        for entry in entries {
            let body = match entry.map.get(BODY_FIELD) {
                Some(redis::Value::BulkString(body)) => body.clone(),
                _ => {
                    warn!("Stream entry {} has no {} field", entry.id, BODY_FIELD);
                    Vec::new()
                }
            };
            self.buffered
                .push_back(Delivery::new(entry.id, body, self.acker.clone()));
        }
    }
}

#[async_trait]
impl QueueTransport for RedisQueue {
    async fn subscribe(&self, queue: &str) -> QueueResult<DeliveryStream> {
        self.ensure_group(queue).await?;

        // XREADGROUP BLOCK would stall every other command on a shared
        // multiplexed connection.
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::subscribe_failed(e.to_string()))?;

        let acker: Arc<dyn Acknowledger> = Arc::new(StreamAcker {
            conn: self.conn.clone(),
            stream: queue.to_string(),
            group: self.config.consumer_group.clone(),
        });

        let state = ReadState {
            conn,
            stream: queue.to_string(),
            group: self.config.consumer_group.clone(),
            consumer: self.config.consumer_name.clone(),
            block_ms: self.config.block_ms,
            claim_min_idle_ms: self.config.claim_min_idle_ms,
            claim_interval: Duration::from_millis(self.config.claim_interval_ms),
            next_claim: Instant::now(),
            claim_cursor: CLAIM_START.to_string(),
            acker,
            buffered: VecDeque::new(),
        };

        info!("Subscribed to {}", queue);

        let stream = futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(delivery) = state.buffered.pop_front() {
                    return Some((Ok(delivery), state));
                }
                if let Err(e) = state.read().await {
                    return Some((Err(e), state));
                }
            }
        });

        Ok(stream.boxed())
    }

    async fn publish(
        &self,
        queue: &str,
        content_type: &str,
        mode: DeliveryMode,
        body: &[u8],
    ) -> QueueResult<()> {
        let mut conn = self.conn.clone();

        let mut cmd = redis::cmd("XADD");
        cmd.arg(queue);
        if mode == DeliveryMode::Transient {
            cmd.arg("MAXLEN").arg("~").arg(self.config.transient_max_len);
        }
        cmd.arg("*")
            .arg(CONTENT_TYPE_FIELD)
            .arg(content_type)
            .arg(BODY_FIELD)
            .arg(body);

        let id: String = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::publish_failed(format!("{queue}: {e}")))?;

        debug!("Published {} bytes to {} as {}", body.len(), queue, id);
        Ok(())
    }
}
