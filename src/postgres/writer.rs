use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::ddl::quote_ident;
use super::store::Store;
use crate::event::{ChangeEvent, EventKind, FieldChange, FieldValue};
use crate::{Error, Result};

/// What a write ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Insert executed; `0` rows means the key already existed.
    Inserted(u64),
    Updated(u64),
    /// Nothing to write, no statement was sent.
    Skipped,
}

fn write_error(table: &str, source: Error) -> Error {
    Error::Write {
        table: table.to_string(),
        source: Box::new(source),
    }
}

/// Turns field changes into single-row `INSERT`/`UPDATE` statements.
///
/// There is no atomic upsert: an insert ignores key conflicts, and an update
/// that matches no row is retried as an insert.
pub struct WriteEngine<S> {
    store: Arc<S>,
}

impl<S: Store> WriteEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, event), fields(table = %event.schema.table_name, kind = %event.kind))]
    pub async fn apply(&self, event: &ChangeEvent) -> Result<WriteOutcome> {
        let table = &event.schema.table_name;

        match &event.kind {
            EventKind::Insert => self.insert(table, &event.field_changes).await,
            EventKind::Update => {
                self.update(
                    table,
                    &event.field_changes,
                    &event.schema.primary_key_columns,
                )
                .await
            }
            EventKind::Other(kind) => Err(Error::UnknownEventKind(kind.clone())),
        }
    }

    /// Inserts the non-null values, leaving other columns to their defaults.
    pub async fn insert(&self, table: &str, changes: &[FieldChange]) -> Result<WriteOutcome> {
        let present: Vec<&FieldChange> = changes
            .iter()
            .filter(|change| !change.new_value.is_null())
            .collect();

        if present.is_empty() {
            debug!(table, "No non-null values to insert");
            return Ok(WriteOutcome::Skipped);
        }

        let columns: Vec<String> = present.iter().map(|c| quote_ident(&c.name)).collect();
        let placeholders: Vec<String> = (1..=present.len()).map(|i| format!("${}", i)).collect();
        let params: Vec<FieldValue> = present.iter().map(|c| c.new_value.clone()).collect();

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT DO NOTHING",
            quote_ident(table),
            columns.join(", "),
            placeholders.join(", ")
        );

        let rows = self
            .store
            .exec(&sql, &params)
            .await
            .map_err(|e| write_error(table, e))?;

        if rows == 0 {
            debug!(table, "Row already present, insert ignored");
        }

        Ok(WriteOutcome::Inserted(rows))
    }

    /// Updates the row addressed by the primary key values in `changes`,
    /// inserting it instead when no row matches.
    pub async fn update(
        &self,
        table: &str,
        changes: &[FieldChange],
        primary_keys: &[String],
    ) -> Result<WriteOutcome> {
        if changes.is_empty() {
            debug!(table, "Update carries no field changes");
            return Ok(WriteOutcome::Skipped);
        }

        let is_key = |name: &str| primary_keys.iter().any(|pk| pk == name);

        let mut params = Vec::new();
        let mut assignments = Vec::new();
        for change in changes
            .iter()
            .filter(|c| !is_key(&c.name) && !c.new_value.is_null())
        {
            params.push(change.new_value.clone());
            assignments.push(format!("{} = ${}", quote_ident(&change.name), params.len()));
        }

        if assignments.is_empty() {
            return Err(Error::NoFields {
                table: table.to_string(),
            });
        }

        let mut predicates = Vec::new();
        for pk in primary_keys {
            // Last change wins when a key field appears more than once.
            let value = changes
                .iter()
                .rev()
                .find(|c| &c.name == pk)
                .map(|c| &c.new_value)
                .filter(|v| !v.is_null());

            if let Some(value) = value {
                params.push(value.clone());
                predicates.push(format!("{} = ${}", quote_ident(pk), params.len()));
            }
        }

        if predicates.is_empty() {
            return Err(Error::NoKey {
                table: table.to_string(),
            });
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            quote_ident(table),
            assignments.join(", "),
            predicates.join(" AND ")
        );

        let rows = self
            .store
            .exec(&sql, &params)
            .await
            .map_err(|e| write_error(table, e))?;

        if rows == 0 {
            info!(table, keys = ?primary_keys, "Update matched no row, inserting instead");
            return self.insert(table, changes).await;
        }

        Ok(WriteOutcome::Updated(rows))
    }
}
