//! Records and result sets.
//!
//! A [`Record`] is one immutable row, a [`ResultSet`] the ordered rows a
//! finder call produced. Empty result sets may carry an [`EmptyInput`]
//! marker telling the caller that the query was skipped on purpose.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;

use crate::types::decode_row;
use crate::{FinderError, Result, Value};

/// Why a finder returned an empty result without querying the store.
///
/// This is not an error: the inputs simply cannot match anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmptyInput {
    /// Keyword search without a usable token
    NoKeywords,
    /// A required key (id, uuid, name) was empty or zero
    MissingKey,
    /// An ident list was empty
    NoIdents,
}

impl EmptyInput {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmptyInput::NoKeywords => "no keywords",
            EmptyInput::MissingKey => "missing key",
            EmptyInput::NoIdents => "no idents",
        }
    }
}

impl fmt::Display for EmptyInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single row: column name to value.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    order: Vec<String>,
    values: HashMap<String, Value>,
}

impl Record {
    /// Builds a record from `(column, value)` pairs; later duplicates win.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut order = Vec::new();
        let mut values = HashMap::new();
        for (key, value) in pairs {
            let key = key.into();
            if values.insert(key.clone(), value.into()).is_none() {
                order.push(key);
            }
        }
        Self { order, values }
    }

    /// Converts from a sqlx row.
    pub fn from_sqlx(row: &PgRow) -> Result<Self> {
        let (order, values) = decode_row(row)?;
        Ok(Self { order, values })
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Gets a value by column name, failing if the column is absent.
    pub fn try_get(&self, column: &str) -> Result<&Value> {
        self.values.get(column).ok_or_else(|| {
            FinderError::invalid(format!("Column '{}' not found in record", column))
        })
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    /// Column names in select order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Projects this record onto a subset of its columns.
    pub fn project(&self, columns: &[String]) -> Self {
        Self::from_pairs(columns.iter().map(|c| {
            (
                c.clone(),
                self.values.get(c).cloned().unwrap_or(Value::Null),
            )
        }))
    }

    /// Converts the record to a JSON object.
    pub fn to_json(&self) -> JsonValue {
        let map = self
            .order
            .iter()
            .map(|c| {
                let value = self.values.get(c).map(Value::to_json).unwrap_or(JsonValue::Null);
                (c.clone(), value)
            })
            .collect::<serde_json::Map<_, _>>();
        JsonValue::Object(map)
    }
}

/// Ordered records returned by a finder call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    records: Vec<Record>,
    empty_reason: Option<EmptyInput>,
}

impl ResultSet {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            empty_reason: None,
        }
    }

    /// An empty result produced without querying the store.
    pub fn empty(reason: EmptyInput) -> Self {
        Self {
            records: Vec::new(),
            empty_reason: Some(reason),
        }
    }

    /// Set when the store was skipped because the input cannot match.
    pub fn empty_reason(&self) -> Option<EmptyInput> {
        self.empty_reason
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first(&self) -> Option<&Record> {
        self.records.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Values of one column across all records, in order.
    pub fn column_values(&self, column: &str) -> Vec<Value> {
        self.records
            .iter()
            .map(|r| r.get(column).cloned().unwrap_or(Value::Null))
            .collect()
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Array(self.records.iter().map(Record::to_json).collect())
    }
}

impl IntoIterator for ResultSet {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oak() -> Record {
        Record::from_pairs([
            ("id", Value::Int(1)),
            ("name", Value::from("oak")),
            ("category", Value::from("wood")),
        ])
    }

    #[test]
    fn test_record_access() {
        let record = oak();
        assert_eq!(record.get_str("name"), Some("oak"));
        assert_eq!(record.get_i64("id"), Some(1));
        assert!(record.get("missing").is_none());
        assert!(record.try_get("missing").unwrap_err().is_invalid_query());
        assert_eq!(record.columns().collect::<Vec<_>>(), vec!["id", "name", "category"]);
    }

    #[test]
    fn test_record_to_json() {
        assert_eq!(
            oak().to_json(),
            serde_json::json!({"id": 1, "name": "oak", "category": "wood"})
        );
    }

    #[test]
    fn test_record_project() {
        let projected = oak().project(&["name".to_string(), "colour".to_string()]);
        assert_eq!(projected.len(), 2);
        assert_eq!(projected.get("colour"), Some(&Value::Null));
    }

    #[test]
    fn test_empty_result_set_reason() {
        let empty = ResultSet::empty(EmptyInput::NoKeywords);
        assert!(empty.is_empty());
        assert_eq!(empty.empty_reason(), Some(EmptyInput::NoKeywords));

        let queried = ResultSet::new(vec![]);
        assert!(queried.is_empty());
        assert_eq!(queried.empty_reason(), None);
    }

    #[test]
    fn test_result_set_iteration() {
        let set = ResultSet::new(vec![oak(), oak()]);
        assert_eq!(set.iter().count(), 2);
        assert_eq!(set.column_values("name"), vec![Value::from("oak"), Value::from("oak")]);
        assert_eq!(set.to_json().as_array().map(Vec::len), Some(2));
        assert_eq!(set.into_iter().count(), 2);
    }
}
