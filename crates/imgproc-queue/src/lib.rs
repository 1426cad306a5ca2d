//! Queue transports for the imgproc worker.
//!
//! - [`QueueTransport`] is the broker capability: subscribe and publish
//! - [`RedisQueue`] implements it on Redis Streams with consumer groups
//! - [`MemoryQueue`] implements it in-process and records settlements

pub mod error;
pub mod memory;
pub mod streams;
pub mod transport;

pub use error::{QueueError, QueueResult};
pub use memory::{Disposition, MemoryQueue, PublishedMessage};
pub use streams::{rejected_stream, QueueConfig, RedisQueue};
pub use transport::{
    Acknowledger, Delivery, DeliveryMode, DeliveryStream, QueueTransport, CONTENT_TYPE_JSON,
};
