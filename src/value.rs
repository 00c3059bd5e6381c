//! Runtime values and the typed encode/decode seam.
//!
//! Column kinds form a closed set: every column is one of the variants of
//! [`SqlKind`], every runtime value one of the variants of [`Value`], and
//! the [`SqlType`] trait maps Rust types onto that set. Nullable columns
//! are `Option<T>` on the Rust side; there is no separate class hierarchy
//! per column type.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::Sqlite;
use sqlx::sqlite::{SqliteArguments, SqliteRow};

/// Storage kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlKind {
    Integer,
    Real,
    Boolean,
    Text,
    Blob,
    Timestamp,
    Json,
}

impl SqlKind {
    /// Lowercase name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            SqlKind::Integer => "integer",
            SqlKind::Real => "real",
            SqlKind::Boolean => "boolean",
            SqlKind::Text => "text",
            SqlKind::Blob => "blob",
            SqlKind::Timestamp => "timestamp",
            SqlKind::Json => "json",
        }
    }

    /// Native storage type emitted into DDL when the caller does not give
    /// an explicit one.
    pub(crate) fn default_sql_type(self) -> &'static str {
        match self {
            SqlKind::Integer => "INTEGER",
            SqlKind::Real => "REAL",
            SqlKind::Boolean => "BOOLEAN",
            SqlKind::Text => "TEXT",
            SqlKind::Blob => "BLOB",
            SqlKind::Timestamp => "TIMESTAMP",
            // SQLite has no native JSON storage class
            SqlKind::Json => "TEXT",
        }
    }
}

/// A runtime column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Text(String),
    Blob(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Json(JsonValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The kind this value belongs to; `None` for SQL NULL, which is
    /// accepted by every column.
    pub fn kind(&self) -> Option<SqlKind> {
        match self {
            Value::Null => None,
            Value::Integer(_) => Some(SqlKind::Integer),
            Value::Real(_) => Some(SqlKind::Real),
            Value::Boolean(_) => Some(SqlKind::Boolean),
            Value::Text(_) => Some(SqlKind::Text),
            Value::Blob(_) => Some(SqlKind::Blob),
            Value::Timestamp(_) => Some(SqlKind::Timestamp),
            Value::Json(_) => Some(SqlKind::Json),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind() {
            Some(kind) => kind.name(),
            None => "null",
        }
    }
}

/// Rust-side type of a column.
///
/// `KIND` ties the type to its storage kind; `NULLABLE` is true only for
/// `Option<T>`, the nullable column variant. Decoding a `Value` of the
/// wrong variant yields `None` so the caller can report the mismatch with
/// column context attached.
pub trait SqlType: Sized + Send + Sync + 'static {
    const KIND: SqlKind;
    const NULLABLE: bool;

    fn into_value(self) -> Value;
    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! base_sql_type {
    ($rust:ty, $kind:expr, $variant:ident) => {
        impl SqlType for $rust {
            const KIND: SqlKind = $kind;
            const NULLABLE: bool = false;

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

base_sql_type!(i64, SqlKind::Integer, Integer);
base_sql_type!(f64, SqlKind::Real, Real);
base_sql_type!(bool, SqlKind::Boolean, Boolean);
base_sql_type!(String, SqlKind::Text, Text);
base_sql_type!(Vec<u8>, SqlKind::Blob, Blob);
base_sql_type!(DateTime<Utc>, SqlKind::Timestamp, Timestamp);
base_sql_type!(JsonValue, SqlKind::Json, Json);

impl<T: SqlType> SqlType for Option<T> {
    const KIND: SqlKind = T::KIND;
    const NULLABLE: bool = true;

    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            v => T::from_value(v).map(Some),
        }
    }
}

/// Bind a value to a SQLite query at the next positional slot.
pub(crate) fn bind_value<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q Value,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Integer(v) => query.bind(*v),
        Value::Real(v) => query.bind(*v),
        Value::Boolean(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.as_str()),
        Value::Blob(v) => query.bind(v.as_slice()),
        Value::Timestamp(v) => query.bind(*v),
        // no native JSON storage class, stored as text
        Value::Json(v) => query.bind(v.to_string()),
    }
}

/// Decode the value at `index` out of a result row, driven by the column's
/// declared kind. SQL NULL decodes to [`Value::Null`]; whether that is
/// acceptable is the caller's decision.
pub(crate) fn decode_column(row: &SqliteRow, index: usize, kind: SqlKind) -> Result<Value> {
    use sqlx::Row;

    let value = match kind {
        SqlKind::Integer => row.try_get::<Option<i64>, _>(index)?.map(Value::Integer),
        SqlKind::Real => row.try_get::<Option<f64>, _>(index)?.map(Value::Real),
        SqlKind::Boolean => row.try_get::<Option<bool>, _>(index)?.map(Value::Boolean),
        SqlKind::Text => row.try_get::<Option<String>, _>(index)?.map(Value::Text),
        SqlKind::Blob => row.try_get::<Option<Vec<u8>>, _>(index)?.map(Value::Blob),
        SqlKind::Timestamp => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(Value::Timestamp),
        SqlKind::Json => match row.try_get::<Option<String>, _>(index)? {
            Some(text) => Some(Value::Json(serde_json::from_str(&text).map_err(|e| {
                Error::invalid_input(format!("malformed JSON in result column: {e}"))
            })?)),
            None => None,
        },
    };
    Ok(value.unwrap_or(Value::Null))
}
