use tracing::{trace, warn};

use super::types::ChangeEvent;
use crate::{Error, Result};

/// Parses one wire payload into a [`ChangeEvent`].
///
/// Fails with [`Error::Decode`] when the bytes are not a JSON document of
/// the expected shape. Structural completeness is checked separately by
/// [`validate`].
pub fn decode(payload: &[u8]) -> Result<ChangeEvent> {
    let event: ChangeEvent = serde_json::from_slice(payload)?;

    trace!(
        kind = %event.kind,
        table = %event.schema.table_name,
        fields = event.field_changes.len(),
        "Decoded change event"
    );

    Ok(event)
}

/// Rejects events that cannot be replayed: no table name or no declared
/// columns. An empty list of field changes is accepted.
pub fn validate(event: &ChangeEvent) -> Result<()> {
    let schema = &event.schema;

    if schema.table_name.is_empty() {
        return Err(Error::Validation {
            reason: "schema.tableName is empty".to_string(),
        });
    }

    if schema.columns.is_empty() {
        return Err(Error::Validation {
            reason: format!("schema.columns is empty for table {}", schema.table_name),
        });
    }

    // Not rejected: a dangling key only matters once an update tries to resolve it.
    for pk in &schema.primary_key_columns {
        if !schema.columns.contains_key(pk) {
            warn!(
                table = %schema.table_name,
                column = %pk,
                "Primary key column is not among the declared columns"
            );
        }
    }

    Ok(())
}
