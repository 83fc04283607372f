pub mod config;
pub mod error;
pub mod event;
pub mod replicator;
pub mod retry;
pub mod transport;

pub mod kafka;
pub mod postgres;

pub use config::Config;
pub use error::{Disposition, Error, Result};
pub use replicator::Replicator;
