use async_trait::async_trait;
use bytes::Bytes;
use chrono::DateTime;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::{ClientConfig, Message, Offset, TopicPartitionList};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::KafkaConfig;
use crate::retry::RetryPolicy;
use crate::transport::{Delivery, DeliveryHandle, Transport};
use crate::{Error, Result};

const METADATA_TIMEOUT: Duration = Duration::from_secs(5);
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// Consumes change events from one topic with manual offset commits.
///
/// Acknowledging or dropping a message commits past it. Requeueing seeks
/// the partition back to the message so it is fetched again.
pub struct KafkaTransport {
    consumer: StreamConsumer,
    requeue_delay: Duration,
    pending_rewind: PendingRewind,
}

/// A requeue whose seek has not succeeded yet.
///
/// Until it does, nothing else may be fetched: the partition's position is
/// already past the requeued offset, and committing a later message would
/// skip it.
#[derive(Debug, Default)]
struct PendingRewind(Option<DeliveryHandle>);

impl PendingRewind {
    fn set(&mut self, handle: &DeliveryHandle) {
        self.0 = Some(handle.clone());
    }

    #[cfg(test)]
    fn is_pending(&self) -> bool {
        self.0.is_some()
    }

    /// Runs `seek` for the outstanding rewind, if any. The rewind stays
    /// outstanding when `seek` fails.
    fn settle<F>(&mut self, seek: F) -> Result<()>
    where
        F: FnOnce(&DeliveryHandle) -> Result<()>,
    {
        let Some(handle) = self.0.as_ref() else {
            return Ok(());
        };
        seek(handle)?;
        debug!(delivery = %handle, "Rewound partition for redelivery");
        self.0 = None;
        Ok(())
    }
}

fn seek_to(consumer: &StreamConsumer, handle: &DeliveryHandle) -> Result<()> {
    consumer.seek(
        &handle.topic,
        handle.partition,
        Offset::Offset(handle.offset),
        SEEK_TIMEOUT,
    )?;
    Ok(())
}

impl KafkaTransport {
    pub async fn connect(config: &KafkaConfig, retry: &RetryPolicy) -> Result<Self> {
        info!(
            brokers = ?config.brokers,
            topic = %config.topic,
            group_id = %config.group_id,
            "Creating Kafka consumer"
        );

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", config.brokers.join(","))
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .set("queued.min.messages", config.prefetch.to_string())
            .create()
            .map_err(Error::Kafka)?;

        let consumer_ref = &consumer;
        let topic = config.topic.as_str();
        retry
            .run("Kafka", move || async move {
                consumer_ref
                    .fetch_metadata(Some(topic), METADATA_TIMEOUT)
                    .map(|_| ())
                    .map_err(Error::from)
            })
            .await?;

        consumer.subscribe(&[topic])?;
        info!("Subscribed to topic '{}'", topic);

        Ok(Self {
            consumer,
            requeue_delay: Duration::from_millis(config.requeue_delay_ms),
            pending_rewind: PendingRewind::default(),
        })
    }

    fn commit_past(&self, handle: &DeliveryHandle) -> Result<()> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&handle.topic, handle.partition, Offset::Offset(handle.offset + 1))?;
        self.consumer.commit(&tpl, CommitMode::Async)?;
        Ok(())
    }

    fn settle_rewind(&mut self) -> Result<()> {
        let consumer = &self.consumer;
        self.pending_rewind.settle(|handle| seek_to(consumer, handle))
    }
}

#[async_trait]
impl Transport for KafkaTransport {
    async fn pull_next(&mut self) -> Result<Option<Delivery>> {
        loop {
            if let Err(e) = self.settle_rewind() {
                warn!("Retrying partition rewind: {}", e);
                tokio::time::sleep(self.requeue_delay).await;
                continue;
            }

            let error = match self.consumer.recv().await {
                Ok(message) => {
                    let handle = DeliveryHandle {
                        topic: message.topic().to_string(),
                        partition: message.partition(),
                        offset: message.offset(),
                    };
                    debug!(delivery = %handle, "Received message");

                    return Ok(Some(Delivery {
                        handle,
                        payload: Bytes::copy_from_slice(message.payload().unwrap_or_default()),
                        timestamp: message
                            .timestamp()
                            .to_millis()
                            .and_then(DateTime::from_timestamp_millis),
                    }));
                }
                Err(e) => e,
            };

            // librdkafka reconnects on its own; wait and poll again.
            warn!("Kafka receive error: {}", error);
            tokio::time::sleep(self.requeue_delay).await;
        }
    }

    async fn acknowledge(&mut self, handle: &DeliveryHandle) -> Result<()> {
        self.commit_past(handle)
    }

    #[instrument(skip(self), fields(delivery = %handle))]
    async fn negative_acknowledge(&mut self, handle: &DeliveryHandle, requeue: bool) -> Result<()> {
        if !requeue {
            warn!("Discarding message");
            return self.commit_past(handle);
        }

        tokio::time::sleep(self.requeue_delay).await;
        self.pending_rewind.set(handle);
        self.settle_rewind()
    }
}
