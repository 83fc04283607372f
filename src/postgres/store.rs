use async_trait::async_trait;
use bytes::BytesMut;
use tokio::task::JoinHandle;
use tokio_postgres::types::{to_sql_checked, Format, IsNull, ToSql, Type};
use tokio_postgres::{Config, NoTls};
use tracing::{debug, error, info};

use crate::event::FieldValue;
use crate::retry::RetryPolicy;
use crate::{Error, Result};

/// A result row, with values converted to [`FieldValue`]s in column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    values: Vec<FieldValue>,
}

impl Row {
    pub fn new(values: Vec<FieldValue>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&FieldValue> {
        self.values.get(idx)
    }

    pub fn text(&self, idx: usize) -> Result<&str> {
        self.get(idx)
            .and_then(FieldValue::as_str)
            .ok_or_else(|| column_error(idx, "text"))
    }

    pub fn bool(&self, idx: usize) -> Result<bool> {
        self.get(idx)
            .and_then(FieldValue::as_bool)
            .ok_or_else(|| column_error(idx, "boolean"))
    }

    /// Integer value, `None` for SQL NULL.
    pub fn opt_i64(&self, idx: usize) -> Result<Option<i64>> {
        match self.get(idx) {
            Some(FieldValue::Null) => Ok(None),
            Some(FieldValue::Integer(i)) => Ok(Some(*i)),
            _ => Err(column_error(idx, "integer")),
        }
    }
}

fn column_error(idx: usize, expected: &str) -> Error {
    Error::Query {
        message: format!("column {} is missing or not {}", idx, expected),
    }
}

/// The destination store as seen by the schema synchronizer and write engine.
///
/// Every call is a single statement; nothing here spans a transaction.
#[async_trait]
pub trait Store: Send + Sync {
    /// Executes a statement and returns the affected row count.
    async fn exec(&self, sql: &str, params: &[FieldValue]) -> Result<u64>;

    async fn query(&self, sql: &str, params: &[FieldValue]) -> Result<Vec<Row>>;

    /// First row of a query that must return one.
    async fn query_row(&self, sql: &str, params: &[FieldValue]) -> Result<Row> {
        self.query(sql, params)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Query {
                message: format!("query returned no rows: {}", sql),
            })
    }
}

/// Binds a value in text format so the server casts it to the target
/// column's type, whatever that type is.
#[derive(Debug)]
struct TextParam(Option<String>);

impl ToSql for TextParam {
    fn to_sql(
        &self,
        _ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match &self.0 {
            Some(text) => {
                out.extend_from_slice(text.as_bytes());
                Ok(IsNull::No)
            }
            None => Ok(IsNull::Yes),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}

fn text_params(params: &[FieldValue]) -> Vec<TextParam> {
    params.iter().map(|p| TextParam(p.to_text())).collect()
}

fn convert_row(row: &tokio_postgres::Row) -> Result<Row> {
    let mut values = Vec::with_capacity(row.len());

    for (idx, column) in row.columns().iter().enumerate() {
        let ty = column.type_();
        let value = if *ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(idx)?.map(FieldValue::Boolean)
        } else if *ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(idx)?
                .map(|v| FieldValue::Integer(v.into()))
        } else if *ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(idx)?
                .map(|v| FieldValue::Integer(v.into()))
        } else if *ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(idx)?.map(FieldValue::Integer)
        } else if *ty == Type::FLOAT4 {
            row.try_get::<_, Option<f32>>(idx)?
                .map(|v| FieldValue::Float(v.into()))
        } else if *ty == Type::FLOAT8 {
            row.try_get::<_, Option<f64>>(idx)?.map(FieldValue::Float)
        } else {
            row.try_get::<_, Option<String>>(idx)?.map(FieldValue::Text)
        };
        values.push(value.unwrap_or(FieldValue::Null));
    }

    Ok(Row::new(values))
}

/// [`Store`] backed by a single tokio-postgres connection.
pub struct PgStore {
    client: tokio_postgres::Client,
    connection_task: JoinHandle<()>,
}

impl PgStore {
    pub async fn connect(connection_string: &str, retry: &RetryPolicy) -> Result<Self> {
        info!("Connecting to PostgreSQL");

        let config = connection_string.parse::<Config>()?;
        let config = &config;
        let (client, connection) = retry
            .run("PostgreSQL", move || async move {
                config.connect(NoTls).await.map_err(Error::from)
            })
            .await?;

        let connection_task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("Connection error: {}", e);
            }
        });

        info!("Successfully connected to PostgreSQL");

        Ok(Self {
            client,
            connection_task,
        })
    }

    pub async fn close(self) -> Result<()> {
        info!("Closing PostgreSQL connection");
        drop(self.client);
        self.connection_task.abort();
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn exec(&self, sql: &str, params: &[FieldValue]) -> Result<u64> {
        debug!(sql, params = params.len(), "exec");

        let params = text_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        Ok(self.client.execute(sql, &refs).await?)
    }

    async fn query(&self, sql: &str, params: &[FieldValue]) -> Result<Vec<Row>> {
        debug!(sql, params = params.len(), "query");

        let params = text_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        self.client
            .query(sql, &refs)
            .await?
            .iter()
            .map(convert_row)
            .collect()
    }
}
