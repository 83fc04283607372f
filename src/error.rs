//! Error types and result handling for pg-cdc-sink.
//!
//! This module defines the main error type [`Error`], a convenience
//! [`Result`] type alias used throughout the crate, and the
//! [`Disposition`] that tells the delivery loop whether a failed message
//! is dropped or handed back to the transport for redelivery.
//!
//! # Example
//!
//! ```rust
//! use pg_cdc_sink::{Disposition, Error};
//!
//! let err = Error::Validation { reason: "table name is empty".to_string() };
//! assert_eq!(err.disposition(), Disposition::Drop);
//!
//! let err = Error::UnknownEventKind("delete".to_string());
//! assert_eq!(err.disposition(), Disposition::Requeue);
//! ```

use thiserror::Error;

/// The main error type for pg-cdc-sink operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, typically from an invalid file or environment variable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// PostgreSQL client error.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Kafka client or consumer error.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// The payload is not a well-formed change event.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The event decoded but is structurally incomplete.
    #[error("Invalid event: {reason}")]
    Validation {
        /// Why the event was rejected
        reason: String,
    },

    /// Creating or altering the destination table failed.
    #[error("Schema error on table {table}: {source}")]
    Schema {
        table: String,
        #[source]
        source: Box<Error>,
    },

    /// Executing an insert or update failed.
    #[error("Write error on table {table}: {source}")]
    Write {
        table: String,
        #[source]
        source: Box<Error>,
    },

    /// An update carried no non-key values to set.
    #[error("No fields to update in table {table}")]
    NoFields { table: String },

    /// An update carried no usable primary key value.
    #[error("No primary key values found for table {table}")]
    NoKey { table: String },

    /// The event kind is neither insert nor update.
    #[error("Unknown event type: {0:?}")]
    UnknownEventKind(String),

    /// A query returned an unexpected result shape.
    #[error("Query error: {message}")]
    Query {
        /// Description of what was unexpected
        message: String,
    },

    /// Generic connection error not covered by specific types.
    #[error("Connection error: {0}")]
    Connection(String),
}

/// What the transport should do with a message whose processing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Discard the message permanently; retrying cannot fix it.
    Drop,
    /// Ask the transport to deliver the message again.
    Requeue,
}

impl Error {
    /// Classifies this error for negative acknowledgment.
    ///
    /// Malformed and incomplete events are dropped. Everything else is
    /// assumed to be transient (lock contention, an unreachable store) and
    /// is requeued.
    pub fn disposition(&self) -> Disposition {
        match self {
            Error::Decode(_) | Error::Validation { .. } => Disposition::Drop,
            _ => Disposition::Requeue,
        }
    }
}

/// A convenient Result type alias for pg-cdc-sink operations.
pub type Result<T> = std::result::Result<T, Error>;
