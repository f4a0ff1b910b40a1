//! Value mapping between Rust and PostgreSQL.
//!
//! [`Value`] is the single representation used for bound parameters and for
//! decoded columns. Parameters are bound through `PgArguments`; rows are
//! decoded column by column based on the PostgreSQL type name.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Arguments, Column, Postgres, Row as SqlxRow, Type, TypeInfo};
use uuid::Uuid;

use crate::{FinderError, Result, StoreError, StoreErrorKind};

/// A scalar or array value, either bound as a parameter or read from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean (BOOLEAN)
    Bool(bool),
    /// Small integer (SMALLINT)
    SmallInt(i16),
    /// Integer (INTEGER)
    Int(i32),
    /// Big integer (BIGINT)
    BigInt(i64),
    /// Double-precision float (DOUBLE PRECISION, REAL)
    Double(f64),
    /// Decimal/Numeric (NUMERIC)
    Decimal(Decimal),
    /// Variable-length string (VARCHAR, TEXT)
    String(String),
    /// UUID (UUID)
    Uuid(Uuid),
    /// Date (DATE)
    Date(NaiveDate),
    /// Timestamp without timezone (TIMESTAMP)
    Timestamp(NaiveDateTime),
    /// Timestamp with timezone (TIMESTAMPTZ)
    TimestampTz(DateTime<Utc>),
    /// JSON/JSONB
    Json(JsonValue),
    /// Array of values (ARRAY)
    Array(Vec<Value>),
}

impl Value {
    /// Returns the PostgreSQL type name for this value.
    pub fn pg_type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::SmallInt(_) => "SMALLINT",
            Value::Int(_) => "INTEGER",
            Value::BigInt(_) => "BIGINT",
            Value::Double(_) => "DOUBLE PRECISION",
            Value::Decimal(_) => "NUMERIC",
            Value::String(_) => "TEXT",
            Value::Uuid(_) => "UUID",
            Value::Date(_) => "DATE",
            Value::Timestamp(_) => "TIMESTAMP",
            Value::TimestampTz(_) => "TIMESTAMPTZ",
            Value::Json(_) => "JSONB",
            Value::Array(_) => "ARRAY",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view of any integral variant.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::SmallInt(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }

    /// PostgreSQL array type used to cast a bound array parameter.
    ///
    /// Returns `None` for non-arrays, empty arrays, all-NULL arrays and arrays
    /// mixing element types.
    pub fn pg_array_cast(&self) -> Option<&'static str> {
        let values = self.as_array()?;
        let first = values.iter().find(|v| !v.is_null())?;
        let same_kind = values
            .iter()
            .all(|v| v.is_null() || std::mem::discriminant(v) == std::mem::discriminant(first));
        if !same_kind {
            return None;
        }
        match first {
            Value::Bool(_) => Some("bool[]"),
            Value::SmallInt(_) => Some("int2[]"),
            Value::Int(_) => Some("int4[]"),
            Value::BigInt(_) => Some("int8[]"),
            Value::Double(_) => Some("float8[]"),
            Value::Decimal(_) => Some("numeric[]"),
            Value::String(_) => Some("text[]"),
            Value::Uuid(_) => Some("uuid[]"),
            Value::Date(_) => Some("date[]"),
            Value::Timestamp(_) => Some("timestamp[]"),
            Value::TimestampTz(_) => Some("timestamptz[]"),
            Value::Null | Value::Json(_) | Value::Array(_) => None,
        }
    }

    /// Bind this value to a sqlx argument list.
    ///
    /// Arrays must be homogeneous (NULL elements allowed); they are bound as
    /// native PostgreSQL arrays.
    pub fn bind_to_arguments(&self, arguments: &mut PgArguments) -> Result<()> {
        match self {
            // Untyped NULL; PostgreSQL infers the type from the placeholder context
            Value::Null => bind(arguments, Option::<String>::None, "NULL"),
            Value::Bool(v) => bind(arguments, *v, "BOOL"),
            Value::SmallInt(v) => bind(arguments, *v, "SMALLINT"),
            Value::Int(v) => bind(arguments, *v, "INT"),
            Value::BigInt(v) => bind(arguments, *v, "BIGINT"),
            Value::Double(v) => bind(arguments, *v, "DOUBLE"),
            Value::Decimal(v) => bind(arguments, *v, "DECIMAL"),
            Value::String(v) => bind(arguments, v.clone(), "STRING"),
            Value::Uuid(v) => bind(arguments, *v, "UUID"),
            Value::Date(v) => bind(arguments, *v, "DATE"),
            Value::Timestamp(v) => bind(arguments, *v, "TIMESTAMP"),
            Value::TimestampTz(v) => bind(arguments, *v, "TIMESTAMPTZ"),
            Value::Json(v) => bind(arguments, v.clone(), "JSON"),
            Value::Array(values) => bind_array(values, arguments),
        }
    }

    /// Converts the value to JSON.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(v) => JsonValue::Bool(*v),
            Value::SmallInt(v) => JsonValue::Number((*v).into()),
            Value::Int(v) => JsonValue::Number((*v).into()),
            Value::BigInt(v) => JsonValue::Number((*v).into()),
            Value::Double(v) => serde_json::Number::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Decimal(v) => JsonValue::String(v.to_string()),
            Value::String(v) => JsonValue::String(v.clone()),
            Value::Uuid(v) => JsonValue::String(v.to_string()),
            Value::Date(v) => JsonValue::String(v.to_string()),
            Value::Timestamp(v) => JsonValue::String(v.to_string()),
            Value::TimestampTz(v) => JsonValue::String(v.to_rfc3339()),
            Value::Json(v) => v.clone(),
            Value::Array(values) => JsonValue::Array(values.iter().map(Value::to_json).collect()),
        }
    }

    /// SQL-style equality: numeric variants compare by value, NULL never equals
    /// anything (including NULL).
    pub fn sql_eq(&self, other: &Value) -> bool {
        if self.is_null() || other.is_null() {
            return false;
        }
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    /// SQL-style ordering between two non-NULL values of comparable types.
    pub fn sql_cmp(&self, other: &Value) -> Option<Ordering> {
        if let (Some(a), Some(b)) = (self.as_i64(), other.as_i64()) {
            return Some(a.cmp(&b));
        }
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a.partial_cmp(&b);
        }
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::TimestampTz(a), Value::TimestampTz(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::SmallInt(v) => Some(f64::from(*v)),
            Value::Int(v) => Some(f64::from(*v)),
            Value::BigInt(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::Decimal(v) => v.to_f64(),
            _ => None,
        }
    }

    /// Stable textual fingerprint, distinguishing `Int(1)` from `String("1")`.
    pub(crate) fn fingerprint(&self) -> String {
        format!("{}:{}", self.pg_type_name(), self.to_json())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::SmallInt(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::TimestampTz(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::Array(values.into_iter().map(Into::into).collect())
    }
}

fn bind<T>(arguments: &mut PgArguments, value: T, label: &str) -> Result<()>
where
    T: for<'q> sqlx::Encode<'q, Postgres> + Type<Postgres> + Send + 'static,
{
    arguments
        .add(value)
        .map_err(|e| FinderError::invalid(format!("Failed to bind {}: {}", label, e)))
}

macro_rules! bind_elements {
    ($values:expr, $arguments:expr, $variant:ident, $ty:ty, $label:literal) => {{
        let mut items: Vec<Option<$ty>> = Vec::with_capacity($values.len());
        for value in $values {
            match value {
                Value::$variant(v) => items.push(Some(v.clone())),
                Value::Null => items.push(None),
                other => {
                    return Err(FinderError::invalid(format!(
                        "Cannot bind {} element inside a {} array",
                        other.pg_type_name(),
                        $label
                    )))
                }
            }
        }
        bind($arguments, items, $label)
    }};
}

fn bind_array(values: &[Value], arguments: &mut PgArguments) -> Result<()> {
    let first = values.iter().find(|v| !v.is_null());
    match first {
        // Empty or all-NULL arrays carry no element type; bind as TEXT[]
        None => bind(arguments, vec![Option::<String>::None; values.len()], "TEXT[]"),
        Some(Value::Bool(_)) => bind_elements!(values, arguments, Bool, bool, "BOOL[]"),
        Some(Value::SmallInt(_)) => bind_elements!(values, arguments, SmallInt, i16, "INT2[]"),
        Some(Value::Int(_)) => bind_elements!(values, arguments, Int, i32, "INT4[]"),
        Some(Value::BigInt(_)) => bind_elements!(values, arguments, BigInt, i64, "INT8[]"),
        Some(Value::Double(_)) => bind_elements!(values, arguments, Double, f64, "FLOAT8[]"),
        Some(Value::Decimal(_)) => bind_elements!(values, arguments, Decimal, Decimal, "NUMERIC[]"),
        Some(Value::String(_)) => bind_elements!(values, arguments, String, String, "TEXT[]"),
        Some(Value::Uuid(_)) => bind_elements!(values, arguments, Uuid, Uuid, "UUID[]"),
        Some(Value::Date(_)) => bind_elements!(values, arguments, Date, NaiveDate, "DATE[]"),
        Some(Value::Timestamp(_)) => {
            bind_elements!(values, arguments, Timestamp, NaiveDateTime, "TIMESTAMP[]")
        }
        Some(Value::TimestampTz(_)) => {
            bind_elements!(values, arguments, TimestampTz, DateTime<Utc>, "TIMESTAMPTZ[]")
        }
        Some(other) => Err(FinderError::invalid(format!(
            "Arrays of {} cannot be bound as parameters",
            other.pg_type_name()
        ))),
    }
}

fn decode_error(column: &str, type_name: &str, err: sqlx::Error) -> FinderError {
    FinderError::Store(StoreError::new(
        StoreErrorKind::Decode,
        format!("Failed to decode {} from column '{}': {}", type_name, column, err),
    ))
}

macro_rules! decode {
    ($row:expr, $idx:expr, $name:expr, $type_name:expr, $ty:ty, $variant:expr) => {
        match $row.try_get::<Option<$ty>, _>($idx) {
            Ok(Some(v)) => $variant(v),
            Ok(None) => Value::Null,
            Err(e) => return Err(decode_error($name, $type_name, e)),
        }
    };
}

macro_rules! decode_array {
    ($row:expr, $idx:expr, $name:expr, $type_name:expr, $ty:ty, $variant:expr) => {
        match $row.try_get::<Option<Vec<Option<$ty>>>, _>($idx) {
            Ok(Some(items)) => Value::Array(
                items
                    .into_iter()
                    .map(|item| item.map($variant).unwrap_or(Value::Null))
                    .collect(),
            ),
            Ok(None) => Value::Null,
            Err(e) => return Err(decode_error($name, $type_name, e)),
        }
    };
}

/// Decodes a `PgRow` into its column names (in select order) and values.
pub fn decode_row(row: &PgRow) -> Result<(Vec<String>, HashMap<String, Value>)> {
    let mut order = Vec::with_capacity(row.columns().len());
    let mut values = HashMap::with_capacity(row.columns().len());

    for (idx, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let type_name = column.type_info().name();

        let value = match type_name {
            "BOOL" => decode!(row, idx, name, type_name, bool, Value::Bool),
            "INT2" => decode!(row, idx, name, type_name, i16, Value::SmallInt),
            "INT4" => decode!(row, idx, name, type_name, i32, Value::Int),
            "INT8" => decode!(row, idx, name, type_name, i64, Value::BigInt),
            "FLOAT4" => decode!(row, idx, name, type_name, f32, |v: f32| Value::Double(f64::from(v))),
            "FLOAT8" => decode!(row, idx, name, type_name, f64, Value::Double),
            "NUMERIC" => decode!(row, idx, name, type_name, Decimal, Value::Decimal),
            "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => {
                decode!(row, idx, name, type_name, String, Value::String)
            }
            "UUID" => decode!(row, idx, name, type_name, Uuid, Value::Uuid),
            "DATE" => decode!(row, idx, name, type_name, NaiveDate, Value::Date),
            "TIMESTAMP" => decode!(row, idx, name, type_name, NaiveDateTime, Value::Timestamp),
            "TIMESTAMPTZ" => decode!(row, idx, name, type_name, DateTime<Utc>, Value::TimestampTz),
            "JSON" | "JSONB" => decode!(row, idx, name, type_name, JsonValue, Value::Json),
            "BOOL[]" => decode_array!(row, idx, name, type_name, bool, Value::Bool),
            "INT2[]" => decode_array!(row, idx, name, type_name, i16, Value::SmallInt),
            "INT4[]" => decode_array!(row, idx, name, type_name, i32, Value::Int),
            "INT8[]" => decode_array!(row, idx, name, type_name, i64, Value::BigInt),
            "FLOAT4[]" => {
                decode_array!(row, idx, name, type_name, f32, |v: f32| Value::Double(f64::from(v)))
            }
            "FLOAT8[]" => decode_array!(row, idx, name, type_name, f64, Value::Double),
            "NUMERIC[]" => decode_array!(row, idx, name, type_name, Decimal, Value::Decimal),
            "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => {
                decode_array!(row, idx, name, type_name, String, Value::String)
            }
            "UUID[]" => decode_array!(row, idx, name, type_name, Uuid, Value::Uuid),
            "DATE[]" => decode_array!(row, idx, name, type_name, NaiveDate, Value::Date),
            "TIMESTAMP[]" => {
                decode_array!(row, idx, name, type_name, NaiveDateTime, Value::Timestamp)
            }
            "TIMESTAMPTZ[]" => {
                decode_array!(row, idx, name, type_name, DateTime<Utc>, Value::TimestampTz)
            }
            unknown => {
                tracing::warn!(
                    column = name,
                    pg_type = unknown,
                    "Unknown PostgreSQL type, attempting string decode"
                );
                decode!(row, idx, name, type_name, String, Value::String)
            }
        };

        order.push(name.to_string());
        values.insert(name.to_string(), value);
    }

    Ok((order, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_value_type_names() {
        assert_eq!(Value::Null.pg_type_name(), "NULL");
        assert_eq!(Value::Bool(true).pg_type_name(), "BOOLEAN");
        assert_eq!(Value::Int(42).pg_type_name(), "INTEGER");
        assert_eq!(Value::BigInt(42).pg_type_name(), "BIGINT");
        assert_eq!(Value::from("wood").pg_type_name(), "TEXT");
        assert_eq!(Value::Uuid(Uuid::nil()).pg_type_name(), "UUID");
        assert_eq!(Value::Array(vec![]).pg_type_name(), "ARRAY");
        assert_eq!(
            Value::Decimal(Decimal::from_str("1.5").unwrap()).pg_type_name(),
            "NUMERIC"
        );
    }

    #[test]
    fn test_array_cast() {
        assert_eq!(Value::from(vec!["A1", "A2"]).pg_array_cast(), Some("text[]"));
        assert_eq!(Value::from(vec![1, 2]).pg_array_cast(), Some("int4[]"));
        assert_eq!(
            Value::Array(vec![Value::Null, Value::BigInt(7)]).pg_array_cast(),
            Some("int8[]")
        );
        assert_eq!(Value::Array(vec![]).pg_array_cast(), None);
        assert_eq!(
            Value::Array(vec![Value::Int(1), Value::from("x")]).pg_array_cast(),
            None
        );
        assert_eq!(Value::Int(1).pg_array_cast(), None);
    }

    #[test]
    fn test_bind_scalars_and_arrays() {
        let mut args = PgArguments::default();
        assert!(Value::Null.bind_to_arguments(&mut args).is_ok());
        assert!(Value::from("wood").bind_to_arguments(&mut args).is_ok());
        assert!(Value::from(vec!["A1", "C3"]).bind_to_arguments(&mut args).is_ok());
        assert!(Value::Array(vec![Value::Int(1), Value::Null])
            .bind_to_arguments(&mut args)
            .is_ok());
        assert!(Value::Array(vec![]).bind_to_arguments(&mut args).is_ok());
    }

    #[test]
    fn test_bind_mixed_array_fails() {
        let mut args = PgArguments::default();
        let err = Value::Array(vec![Value::Int(1), Value::from("x")])
            .bind_to_arguments(&mut args)
            .unwrap_err();
        assert!(err.is_invalid_query());
    }

    #[test]
    fn test_sql_eq_crosses_numeric_types() {
        assert!(Value::Int(3).sql_eq(&Value::BigInt(3)));
        assert!(Value::SmallInt(2).sql_eq(&Value::Double(2.0)));
        assert!(!Value::Int(3).sql_eq(&Value::from("3")));
        assert!(!Value::Null.sql_eq(&Value::Null));
    }

    #[test]
    fn test_sql_cmp() {
        assert_eq!(Value::from("a").sql_cmp(&Value::from("b")), Some(Ordering::Less));
        assert_eq!(Value::BigInt(10).sql_cmp(&Value::Int(2)), Some(Ordering::Greater));
        assert_eq!(Value::from("a").sql_cmp(&Value::Int(1)), None);
    }

    #[test]
    fn test_to_json() {
        let value = Value::Array(vec![Value::from("A1"), Value::Null, Value::Int(3)]);
        assert_eq!(value.to_json(), serde_json::json!(["A1", null, 3]));
    }

    #[test]
    fn test_fingerprint_distinguishes_types() {
        assert_ne!(Value::Int(1).fingerprint(), Value::from("1").fingerprint());
        assert_eq!(Value::Int(1).fingerprint(), Value::Int(1).fingerprint());
    }

    #[test]
    fn test_option_into_value() {
        let none: Option<i32> = None;
        assert_eq!(Value::from(none), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::from("x"));
    }
}
