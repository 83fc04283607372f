pub mod ddl;
pub mod schema;
pub mod store;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_utils;

pub use schema::SchemaSynchronizer;
pub use store::{PgStore, Row, Store};
pub use writer::{WriteEngine, WriteOutcome};
