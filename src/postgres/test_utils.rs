use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::store::{Row, Store};
use crate::event::FieldValue;
use crate::{Error, Result};

/// A statement the mock store was asked to run.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub sql: String,
    pub params: Vec<FieldValue>,
}

#[derive(Debug, Clone)]
pub struct MockColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub max_length: Option<i64>,
}

/// In-memory [`Store`] that records every call and answers catalog queries
/// from a configured set of tables.
#[derive(Default)]
pub struct MockStore {
    tables: Mutex<HashMap<String, Vec<MockColumn>>>,
    calls: Mutex<Vec<RecordedCall>>,
    update_results: Mutex<VecDeque<u64>>,
    fail_on: Mutex<Option<String>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an existing table with `(name, data_type, nullable, max_length)` columns.
    pub fn with_table(self, table: &str, columns: Vec<(&str, &str, bool, Option<i64>)>) -> Self {
        let columns = columns
            .into_iter()
            .map(|(name, data_type, nullable, max_length)| MockColumn {
                name: name.to_string(),
                data_type: data_type.to_string(),
                nullable,
                max_length,
            })
            .collect();
        self.tables.lock().unwrap().insert(table.to_string(), columns);
        self
    }

    /// Affected-row count reported by the next `UPDATE`. Defaults to 1.
    pub fn with_update_result(self, rows: u64) -> Self {
        self.update_results.lock().unwrap().push_back(rows);
        self
    }

    /// Fails every statement whose SQL contains `fragment`.
    pub fn failing_on(self, fragment: &str) -> Self {
        *self.fail_on.lock().unwrap() = Some(fragment.to_string());
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Statements other than catalog queries.
    pub fn statements(&self) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| !call.sql.contains("information_schema"))
            .collect()
    }

    fn record(&self, sql: &str, params: &[FieldValue]) -> Result<()> {
        self.calls.lock().unwrap().push(RecordedCall {
            sql: sql.to_string(),
            params: params.to_vec(),
        });

        match self.fail_on.lock().unwrap().as_deref() {
            Some(fragment) if sql.contains(fragment) => {
                Err(Error::Connection("injected failure".to_string()))
            }
            _ => Ok(()),
        }
    }

    fn table_param(params: &[FieldValue]) -> String {
        params
            .first()
            .and_then(FieldValue::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

#[async_trait]
impl Store for MockStore {
    async fn exec(&self, sql: &str, params: &[FieldValue]) -> Result<u64> {
        self.record(sql, params)?;

        if sql.starts_with("UPDATE") {
            Ok(self.update_results.lock().unwrap().pop_front().unwrap_or(1))
        } else if sql.starts_with("INSERT") {
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn query(&self, sql: &str, params: &[FieldValue]) -> Result<Vec<Row>> {
        self.record(sql, params)?;

        let table = Self::table_param(params);
        let tables = self.tables.lock().unwrap();

        if sql.contains("information_schema.tables") {
            let exists = tables.contains_key(&table);
            return Ok(vec![Row::new(vec![FieldValue::Boolean(exists)])]);
        }

        if sql.contains("information_schema.columns") {
            let rows = tables
                .get(&table)
                .map(|columns| {
                    columns
                        .iter()
                        .map(|c| {
                            Row::new(vec![
                                FieldValue::Text(c.name.clone()),
                                FieldValue::Text(c.data_type.clone()),
                                FieldValue::Text(if c.nullable { "YES" } else { "NO" }.to_string()),
                                c.max_length.map(FieldValue::Integer).unwrap_or_default(),
                            ])
                        })
                        .collect()
                })
                .unwrap_or_default();
            return Ok(rows);
        }

        Ok(Vec::new())
    }
}
