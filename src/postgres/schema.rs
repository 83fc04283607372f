//! Keeps the destination schema a superset of each event's declared schema.
//!
//! The catalog is read on every call; nothing is cached between events.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::ddl;
use super::store::Store;
use crate::event::{ColumnDescriptor, FieldValue, SchemaDescriptor};
use crate::{Error, Result};

const TABLE_EXISTS_SQL: &str = "SELECT EXISTS (\
     SELECT 1 FROM information_schema.tables \
     WHERE table_schema = current_schema() AND table_name = $1)";

const TABLE_COLUMNS_SQL: &str = "SELECT column_name::text, data_type::text, \
     is_nullable::text, character_maximum_length::int4 \
     FROM information_schema.columns \
     WHERE table_schema = current_schema() AND table_name = $1 \
     ORDER BY ordinal_position";

fn schema_error(table: &str, source: Error) -> Error {
    Error::Schema {
        table: table.to_string(),
        source: Box::new(source),
    }
}

pub struct SchemaSynchronizer<S> {
    store: Arc<S>,
}

impl<S: Store> SchemaSynchronizer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Creates the table if it is absent, otherwise adds any declared
    /// columns it lacks. Existing columns are never altered or dropped.
    #[instrument(skip(self, schema), fields(table = %schema.table_name))]
    pub async fn sync(&self, schema: &SchemaDescriptor) -> Result<()> {
        if !self.table_exists(&schema.table_name).await? {
            return self.create_table(schema).await;
        }

        let missing = self.diff(schema).await?;
        if missing.is_empty() {
            debug!("Destination schema is up to date");
            return Ok(());
        }

        self.add_columns(&schema.table_name, &schema.columns, &missing)
            .await
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let row = self
            .store
            .query_row(TABLE_EXISTS_SQL, &[FieldValue::from(table)])
            .await
            .map_err(|e| schema_error(table, e))?;

        row.bool(0).map_err(|e| schema_error(table, e))
    }

    /// Columns as the catalog reports them. Only name, type, nullability
    /// and size are recovered.
    pub async fn current_columns(&self, table: &str) -> Result<BTreeMap<String, ColumnDescriptor>> {
        let rows = self
            .store
            .query(TABLE_COLUMNS_SQL, &[FieldValue::from(table)])
            .await
            .map_err(|e| schema_error(table, e))?;

        let mut columns = BTreeMap::new();
        for row in rows {
            let parse = || -> Result<ColumnDescriptor> {
                Ok(ColumnDescriptor {
                    name: row.text(0)?.to_string(),
                    db_type: row.text(1)?.to_string(),
                    allow_null: row.text(2)? == "YES",
                    size: row.opt_i64(3)?.and_then(|n| u32::try_from(n).ok()),
                    ..Default::default()
                })
            };
            let column = parse().map_err(|e| schema_error(table, e))?;
            columns.insert(column.name.clone(), column);
        }

        Ok(columns)
    }

    /// Declared column names absent from the destination table, in name
    /// order. Compared by name only; type differences are not detected.
    pub async fn diff(&self, schema: &SchemaDescriptor) -> Result<Vec<String>> {
        let existing = self.current_columns(&schema.table_name).await?;

        Ok(schema
            .columns
            .keys()
            .filter(|name| !existing.contains_key(*name))
            .cloned()
            .collect())
    }

    pub async fn create_table(&self, schema: &SchemaDescriptor) -> Result<()> {
        let sql = ddl::create_table_sql(schema);

        info!(
            table = %schema.table_name,
            columns = schema.columns.len(),
            "Creating table"
        );
        debug!(%sql, "create table statement");

        self.store
            .exec(&sql, &[])
            .await
            .map_err(|e| schema_error(&schema.table_name, e))?;

        Ok(())
    }

    pub async fn add_columns(
        &self,
        table: &str,
        columns: &BTreeMap<String, ColumnDescriptor>,
        missing: &[String],
    ) -> Result<()> {
        for name in missing {
            let Some(column) = columns.get(name) else {
                continue;
            };

            let sql = ddl::add_column_sql(table, name, column);
            info!(table, column = %name, "Adding column");

            self.store
                .exec(&sql, &[])
                .await
                .map_err(|e| schema_error(table, e))?;
        }

        Ok(())
    }
}
