use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// The operation an event asks the sink to replay.
///
/// Only inserts and updates are replayed. Any other tag is kept verbatim so
/// the write stage can reject it with the offending value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Insert,
    Update,
    Other(String),
}

impl Default for EventKind {
    fn default() -> Self {
        EventKind::Other(String::new())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(match tag.as_str() {
            "insert" => EventKind::Insert,
            "update" => EventKind::Update,
            _ => EventKind::Other(tag),
        })
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Insert => f.write_str("insert"),
            EventKind::Update => f.write_str("update"),
            EventKind::Other(tag) => f.write_str(tag),
        }
    }
}

/// A dynamically typed value carried by an event.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    /// A SQL expression such as `CURRENT_TIMESTAMP`, only produced for defaults.
    Expression(String),
    /// Arrays and objects, passed through untouched.
    Json(Value),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Converts a decoded JSON value. Nested values stay opaque.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Boolean(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => FieldValue::Text(s),
            other => FieldValue::Json(other),
        }
    }

    /// Like [`FieldValue::from_json`], but `{"expression": "..."}` becomes an
    /// [`FieldValue::Expression`].
    pub fn from_default_json(value: Value) -> Self {
        if let Value::Object(map) = &value {
            if let Some(expr) = map.get("expression") {
                let expr = match expr {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                return FieldValue::Expression(expr);
            }
        }
        FieldValue::from_json(value)
    }

    /// Text form used when binding the value as a statement parameter.
    pub fn to_text(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Boolean(b) => Some(b.to_string()),
            FieldValue::Integer(i) => Some(i.to_string()),
            FieldValue::Float(f) => Some(f.to_string()),
            FieldValue::Text(s) | FieldValue::Expression(s) => Some(s.clone()),
            FieldValue::Json(v) => Some(v.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        FieldValue::Integer(i.into())
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}

fn field_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FieldValue, D::Error> {
    Value::deserialize(deserializer).map(FieldValue::from_json)
}

/// Reads a JSON `null` as the type's default, like an absent key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn optional_field_value<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<FieldValue>, D::Error> {
    Ok(Option::<Value>::deserialize(deserializer)?.map(FieldValue::from_json))
}

fn default_value<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<FieldValue>, D::Error> {
    Ok(Option::<Value>::deserialize(deserializer)?.map(FieldValue::from_default_json))
}

/// One row-level change: a column name and its before/after values.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldChange {
    #[serde(rename = "field", default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "old_value", default, deserialize_with = "optional_field_value")]
    pub old_value: Option<FieldValue>,
    #[serde(rename = "new_value", default, deserialize_with = "field_value")]
    pub new_value: FieldValue,
}

impl FieldChange {
    pub fn new(name: impl Into<String>, new_value: impl Into<FieldValue>) -> Self {
        Self {
            name: name.into(),
            old_value: None,
            new_value: new_value.into(),
        }
    }

    pub fn null(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            old_value: None,
            new_value: FieldValue::Null,
        }
    }
}

/// Declared shape of one source column.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub logical_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub db_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub allow_null: bool,
    #[serde(default, deserialize_with = "default_value")]
    pub default_value: Option<FieldValue>,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub precision: Option<u32>,
    #[serde(default)]
    pub scale: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_primary_key: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub auto_increment: bool,
}

/// The event's declared view of its source table.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct SchemaDescriptor {
    #[serde(rename = "tableName", default, deserialize_with = "null_as_default")]
    pub table_name: String,
    /// Keyed by column name; a sorted map so generated DDL is reproducible.
    #[serde(default, deserialize_with = "null_as_default")]
    pub columns: BTreeMap<String, ColumnDescriptor>,
    #[serde(rename = "primaryKey", default, deserialize_with = "null_as_default")]
    pub primary_key_columns: Vec<String>,
}

impl SchemaDescriptor {
    pub fn is_primary_key(&self, column: &str) -> bool {
        self.primary_key_columns.iter().any(|pk| pk == column)
    }
}

/// A decoded change event, immutable once built.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "event_type", default, deserialize_with = "null_as_default")]
    pub kind: EventKind,
    #[serde(rename = "data", default, deserialize_with = "null_as_default")]
    pub field_changes: Vec<FieldChange>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub schema: SchemaDescriptor,
}

impl ChangeEvent {
    /// The new value of the first change touching `field`.
    pub fn field_value(&self, field: &str) -> Option<&FieldValue> {
        self.field_changes
            .iter()
            .find(|change| change.name == field)
            .map(|change| &change.new_value)
    }
}
