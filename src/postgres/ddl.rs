//! Statement text for the schema synchronizer.
//!
//! Identifiers are wrapped in double quotes so reserved words such as
//! `order` or `user` work as column names. They are not otherwise escaped
//! or allow-listed.

use crate::event::{ColumnDescriptor, FieldValue, SchemaDescriptor};

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name)
}

/// Maps a column's logical type tag to a PostgreSQL column type.
pub fn map_type(column: &ColumnDescriptor) -> String {
    match column.logical_type.to_ascii_lowercase().as_str() {
        "bigint" => "BIGINT".to_string(),
        "integer" => "INTEGER".to_string(),
        "smallint" => "SMALLINT".to_string(),
        "string" => match column.size {
            Some(size) => format!("VARCHAR({})", size),
            None => "TEXT".to_string(),
        },
        "text" => "TEXT".to_string(),
        "boolean" => "BOOLEAN".to_string(),
        "date" => "DATE".to_string(),
        "timestamp" => "TIMESTAMPTZ".to_string(),
        "double" => "DOUBLE PRECISION".to_string(),
        _ if !column.db_type.is_empty() => column.db_type.to_ascii_uppercase(),
        _ => "TEXT".to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Integer,
    Boolean,
    Numeric,
    Text,
    Timestamp,
    Other,
}

impl TypeFamily {
    /// Classifies a native column type such as `VARCHAR(50)` or `NUMERIC(10,2)`.
    pub fn of(native_type: &str) -> Self {
        let upper = native_type.to_ascii_uppercase();
        let base = upper.split('(').next().unwrap_or_default().trim();

        match base {
            "SMALLINT" | "INTEGER" | "INT" | "INT2" | "INT4" | "INT8" | "BIGINT"
            | "SMALLSERIAL" | "SERIAL" | "BIGSERIAL" => TypeFamily::Integer,
            "BOOLEAN" | "BOOL" => TypeFamily::Boolean,
            "NUMERIC" | "DECIMAL" | "REAL" | "FLOAT" | "FLOAT4" | "FLOAT8"
            | "DOUBLE PRECISION" => TypeFamily::Numeric,
            "TEXT" | "VARCHAR" | "CHAR" | "CHARACTER" | "CHARACTER VARYING" | "BPCHAR" => {
                TypeFamily::Text
            }
            "TIMESTAMP" | "TIMESTAMPTZ" => TypeFamily::Timestamp,
            _ if base.starts_with("TIMESTAMP ") => TypeFamily::Timestamp,
            _ => TypeFamily::Other,
        }
    }

    /// Default given to a NOT NULL column that declares none.
    pub fn implicit_default(self) -> Option<&'static str> {
        match self {
            TypeFamily::Integer | TypeFamily::Numeric => Some("0"),
            TypeFamily::Boolean => Some("false"),
            TypeFamily::Text => Some("''"),
            TypeFamily::Timestamp => Some("CURRENT_TIMESTAMP"),
            TypeFamily::Other => None,
        }
    }
}

/// Renders a declared default as SQL. Opaque JSON values have no SQL form.
pub fn format_default(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Null | FieldValue::Json(_) => None,
        FieldValue::Text(s) => Some(format!("'{}'", s.replace('\'', "''"))),
        FieldValue::Boolean(b) => Some(b.to_string()),
        FieldValue::Integer(i) => Some(i.to_string()),
        FieldValue::Float(f) => Some(f.to_string()),
        FieldValue::Expression(expr) => Some(expr.clone()),
    }
}

fn nullability(column: &ColumnDescriptor) -> &'static str {
    if column.allow_null {
        "NULL"
    } else {
        "NOT NULL"
    }
}

/// One column definition for `CREATE TABLE`.
///
/// NOT NULL columns without a declared default get one for their type,
/// except primary key columns.
pub fn column_definition(name: &str, column: &ColumnDescriptor, primary_key: bool) -> String {
    let native_type = map_type(column);
    let mut def = format!(
        "{} {} {}",
        quote_ident(name),
        native_type,
        nullability(column)
    );

    match column.default_value.as_ref().filter(|v| !v.is_null()) {
        Some(value) => {
            if let Some(rendered) = format_default(value) {
                def.push_str(" DEFAULT ");
                def.push_str(&rendered);
            }
        }
        None if !column.allow_null && !primary_key => {
            if let Some(implicit) = TypeFamily::of(&native_type).implicit_default() {
                def.push_str(" DEFAULT ");
                def.push_str(implicit);
            }
        }
        None => {}
    }

    def
}

pub fn create_table_sql(schema: &SchemaDescriptor) -> String {
    let mut defs: Vec<String> = schema
        .columns
        .iter()
        .map(|(name, column)| {
            let primary_key = column.is_primary_key || schema.is_primary_key(name);
            column_definition(name, column, primary_key)
        })
        .collect();

    if !schema.primary_key_columns.is_empty() {
        let keys: Vec<String> = schema
            .primary_key_columns
            .iter()
            .map(|pk| quote_ident(pk))
            .collect();
        defs.push(format!("PRIMARY KEY ({})", keys.join(", ")));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(&schema.table_name),
        defs.join(", ")
    )
}

/// `ALTER TABLE ... ADD COLUMN`. Never adds an implicit default: existing
/// rows would have to satisfy it.
pub fn add_column_sql(table: &str, name: &str, column: &ColumnDescriptor) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {} {}",
        quote_ident(table),
        quote_ident(name),
        map_type(column),
        nullability(column)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(logical_type: &str, allow_null: bool) -> ColumnDescriptor {
        ColumnDescriptor {
            logical_type: logical_type.to_string(),
            allow_null,
            ..Default::default()
        }
    }

    #[test]
    fn test_type_mapping() {
        assert_eq!(map_type(&column("bigint", true)), "BIGINT");
        assert_eq!(map_type(&column("integer", true)), "INTEGER");
        assert_eq!(map_type(&column("smallint", true)), "SMALLINT");
        assert_eq!(map_type(&column("string", true)), "TEXT");
        assert_eq!(map_type(&column("text", true)), "TEXT");
        assert_eq!(map_type(&column("boolean", true)), "BOOLEAN");
        assert_eq!(map_type(&column("date", true)), "DATE");
        assert_eq!(map_type(&column("timestamp", true)), "TIMESTAMPTZ");
        assert_eq!(map_type(&column("double", true)), "DOUBLE PRECISION");

        let sized = ColumnDescriptor {
            size: Some(50),
            ..column("string", true)
        };
        assert_eq!(map_type(&sized), "VARCHAR(50)");
    }

    #[test]
    fn test_type_mapping_is_case_insensitive() {
        assert_eq!(map_type(&column("BigInt", true)), "BIGINT");
        assert_eq!(map_type(&column("TIMESTAMP", true)), "TIMESTAMPTZ");
    }

    #[test]
    fn test_unknown_type_falls_back_to_db_type() {
        let decimal = ColumnDescriptor {
            db_type: "numeric(10,2)".to_string(),
            ..column("decimal", true)
        };
        assert_eq!(map_type(&decimal), "NUMERIC(10,2)");
        assert_eq!(map_type(&column("json", true)), "TEXT");
    }

    #[test]
    fn test_type_families() {
        assert_eq!(TypeFamily::of("BIGINT"), TypeFamily::Integer);
        assert_eq!(TypeFamily::of("VARCHAR(50)"), TypeFamily::Text);
        assert_eq!(TypeFamily::of("NUMERIC(10,2)"), TypeFamily::Numeric);
        assert_eq!(TypeFamily::of("DOUBLE PRECISION"), TypeFamily::Numeric);
        assert_eq!(TypeFamily::of("TIMESTAMPTZ"), TypeFamily::Timestamp);
        assert_eq!(
            TypeFamily::of("TIMESTAMP WITHOUT TIME ZONE"),
            TypeFamily::Timestamp
        );
        assert_eq!(TypeFamily::of("POINT"), TypeFamily::Other);
        assert_eq!(TypeFamily::of("INTERVAL"), TypeFamily::Other);
        assert_eq!(TypeFamily::of("DATE"), TypeFamily::Other);
    }

    #[test]
    fn test_format_default_by_kind() {
        assert_eq!(
            format_default(&FieldValue::Text("it's".to_string())),
            Some("'it''s'".to_string())
        );
        assert_eq!(format_default(&FieldValue::Boolean(true)), Some("true".to_string()));
        assert_eq!(format_default(&FieldValue::Integer(42)), Some("42".to_string()));
        assert_eq!(format_default(&FieldValue::Float(1.5)), Some("1.5".to_string()));
        assert_eq!(
            format_default(&FieldValue::Expression("CURRENT_TIMESTAMP".to_string())),
            Some("CURRENT_TIMESTAMP".to_string())
        );
        assert_eq!(
            format_default(&FieldValue::Json(serde_json::json!({"a": 1}))),
            None
        );
    }

    #[test]
    fn test_not_null_columns_get_implicit_defaults() {
        assert_eq!(
            column_definition("n", &column("integer", false), false),
            "\"n\" INTEGER NOT NULL DEFAULT 0"
        );
        assert_eq!(
            column_definition("flag", &column("boolean", false), false),
            "\"flag\" BOOLEAN NOT NULL DEFAULT false"
        );
        assert_eq!(
            column_definition("ratio", &column("double", false), false),
            "\"ratio\" DOUBLE PRECISION NOT NULL DEFAULT 0"
        );
        assert_eq!(
            column_definition("body", &column("text", false), false),
            "\"body\" TEXT NOT NULL DEFAULT ''"
        );
        assert_eq!(
            column_definition("seen_at", &column("timestamp", false), false),
            "\"seen_at\" TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP"
        );
        assert_eq!(
            column_definition("born_on", &column("date", false), false),
            "\"born_on\" DATE NOT NULL"
        );
    }

    #[test]
    fn test_nullable_and_key_columns_get_no_implicit_default() {
        assert_eq!(
            column_definition("n", &column("integer", true), false),
            "\"n\" INTEGER NULL"
        );
        assert_eq!(
            column_definition("id", &column("bigint", false), true),
            "\"id\" BIGINT NOT NULL"
        );
    }

    #[test]
    fn test_declared_default_wins() {
        let status = ColumnDescriptor {
            default_value: Some(FieldValue::Text("new".to_string())),
            ..column("string", false)
        };
        assert_eq!(
            column_definition("status", &status, false),
            "\"status\" TEXT NOT NULL DEFAULT 'new'"
        );

        let created = ColumnDescriptor {
            default_value: Some(FieldValue::Expression("now()".to_string())),
            ..column("timestamp", true)
        };
        assert_eq!(
            column_definition("created_at", &created, false),
            "\"created_at\" TIMESTAMPTZ NULL DEFAULT now()"
        );

        // An object default without an expression renders nothing at all
        let opaque = ColumnDescriptor {
            default_value: Some(FieldValue::Json(serde_json::json!({"x": 1}))),
            ..column("integer", false)
        };
        assert_eq!(
            column_definition("opaque", &opaque, false),
            "\"opaque\" INTEGER NOT NULL"
        );
    }

    #[test]
    fn test_add_column_never_synthesizes_default() {
        assert_eq!(
            add_column_sql("leads", "score", &column("integer", false)),
            "ALTER TABLE \"leads\" ADD COLUMN IF NOT EXISTS \"score\" INTEGER NOT NULL"
        );
    }
}
