//! The message source the delivery loop consumes.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;

use crate::Result;

/// Identifies one delivery for acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryHandle {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl fmt::Display for DeliveryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]@{}", self.topic, self.partition, self.offset)
    }
}

#[derive(Debug, Clone)]
pub struct Delivery {
    pub handle: DeliveryHandle,
    pub payload: Bytes,
    /// When the producer stamped the message, if the transport knows.
    pub timestamp: Option<DateTime<Utc>>,
}

/// A source of change-event messages with explicit acknowledgment.
///
/// Connection management, reconnection and prefetch belong to the
/// implementation; callers only pull, acknowledge and reject.
#[async_trait]
pub trait Transport: Send {
    /// Waits for the next delivery. `None` means the source is exhausted.
    async fn pull_next(&mut self) -> Result<Option<Delivery>>;

    async fn acknowledge(&mut self, handle: &DeliveryHandle) -> Result<()>;

    /// Rejects a delivery. With `requeue` it will be delivered again,
    /// otherwise it is discarded.
    async fn negative_acknowledge(&mut self, handle: &DeliveryHandle, requeue: bool) -> Result<()>;
}
