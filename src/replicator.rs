//! The delivery loop: one message at a time from the transport through
//! decode, validation, schema sync and write, then back to the transport as
//! an acknowledgment decision.
//!
//! Messages are processed strictly in order, each to its acknowledgment
//! before the next is pulled. Two events for the same row can therefore
//! never race, and no transaction is needed around sync plus write.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::event::{self, ChangeEvent};
use crate::postgres::{SchemaSynchronizer, Store, WriteEngine, WriteOutcome};
use crate::transport::{Delivery, Transport};
use crate::{Disposition, Result};

/// The signal sent back to the transport for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Acknowledge,
    Requeue,
    Drop,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryStats {
    pub received: u64,
    pub acknowledged: u64,
    pub requeued: u64,
    pub dropped: u64,
}

pub struct Replicator<T, S> {
    transport: T,
    synchronizer: SchemaSynchronizer<S>,
    writer: WriteEngine<S>,
    stats: DeliveryStats,
}

impl<T: Transport, S: Store> Replicator<T, S> {
    pub fn new(transport: T, store: Arc<S>) -> Self {
        Self {
            transport,
            synchronizer: SchemaSynchronizer::new(store.clone()),
            writer: WriteEngine::new(store),
            stats: DeliveryStats::default(),
        }
    }

    pub fn stats(&self) -> DeliveryStats {
        self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Pulls and handles deliveries until the transport is exhausted or
    /// `shutdown` flips. Shutdown is only observed between deliveries.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<DeliveryStats> {
        info!("Replicator starting");

        loop {
            if *shutdown.borrow() {
                info!("Shutdown requested");
                break;
            }

            let next = tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!("Shutdown requested");
                    break;
                }
                next = self.transport.pull_next() => next?,
            };

            let Some(delivery) = next else {
                info!("Transport closed");
                break;
            };

            self.handle(&delivery).await;
        }

        info!(
            received = self.stats.received,
            acknowledged = self.stats.acknowledged,
            requeued = self.stats.requeued,
            dropped = self.stats.dropped,
            "Replicator stopped"
        );

        Ok(self.stats)
    }

    /// Processes one delivery and signals its outcome to the transport.
    pub async fn handle(&mut self, delivery: &Delivery) -> Outcome {
        self.stats.received += 1;

        if let Some(ts) = delivery.timestamp {
            debug!(
                delivery = %delivery.handle,
                lag_ms = (Utc::now() - ts).num_milliseconds(),
                "Processing message"
            );
        }

        let outcome = match self.process(&delivery.payload).await {
            Ok(_) => Outcome::Acknowledge,
            Err(e) => match e.disposition() {
                Disposition::Drop => {
                    warn!(delivery = %delivery.handle, "Dropping message: {}", e);
                    Outcome::Drop
                }
                Disposition::Requeue => {
                    error!(delivery = %delivery.handle, "Failed to replay message, requeueing: {}", e);
                    Outcome::Requeue
                }
            },
        };

        let signal = match outcome {
            Outcome::Acknowledge => {
                self.stats.acknowledged += 1;
                self.transport.acknowledge(&delivery.handle).await
            }
            Outcome::Requeue => {
                self.stats.requeued += 1;
                self.transport
                    .negative_acknowledge(&delivery.handle, true)
                    .await
            }
            Outcome::Drop => {
                self.stats.dropped += 1;
                self.transport
                    .negative_acknowledge(&delivery.handle, false)
                    .await
            }
        };

        if let Err(e) = signal {
            error!(delivery = %delivery.handle, ?outcome, "Error acknowledging message: {}", e);
        }

        outcome
    }

    /// Decode, validate, sync and write one payload.
    pub async fn process(&self, payload: &[u8]) -> Result<WriteOutcome> {
        let event: ChangeEvent = event::decode(payload)?;
        event::validate(&event)?;

        info!(
            kind = %event.kind,
            table = %event.schema.table_name,
            fields = event.field_changes.len(),
            "Processing change event"
        );

        self.synchronizer.sync(&event.schema).await?;
        let outcome = self.writer.apply(&event).await?;

        debug!(table = %event.schema.table_name, ?outcome, "Change event applied");
        Ok(outcome)
    }
}
