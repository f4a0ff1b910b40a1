//! Filter maps: field name to expected value or marker.

use std::collections::BTreeMap;

use super::Condition;
use crate::Value;

/// Expected value (or matching marker) for one filter key.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Equality; `Eq(Value::Null)` matches NULL columns.
    Eq(Value),
    /// Inequality; `Ne(Value::Null)` matches non-NULL columns.
    Ne(Value),
    /// Column equals one of the listed values.
    In(Vec<Value>),
    /// Case-insensitive substring match.
    Contains(String),
    /// Negated case-insensitive substring match.
    NotContains(String),
    /// The listed values all occur in the array column.
    SubsetOf(Vec<Value>),
    /// Some listed value is missing from the array column.
    NotSubsetOf(Vec<Value>),
    /// The listed values and the array column share an element.
    Overlaps(Vec<Value>),
    /// The value occurs in the array column.
    AnyEq(Value),
}

impl From<Value> for FilterValue {
    fn from(value: Value) -> Self {
        FilterValue::Eq(value)
    }
}

macro_rules! filter_eq_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FilterValue {
                fn from(value: $ty) -> Self {
                    FilterValue::Eq(Value::from(value))
                }
            }
        )*
    };
}

filter_eq_from!(bool, i16, i32, i64, f64, &str, String, uuid::Uuid);

/// AND-ed filter conditions keyed by field name.
///
/// Keys are kept sorted so the rendered statement (and its cache key) does
/// not depend on insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterMap {
    entries: BTreeMap<String, FilterValue>,
}

impl FilterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the filter for `field`.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FilterValue>) {
        self.entries.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&FilterValue> {
        self.entries.get(field)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterValue)> {
        self.entries.iter()
    }

    /// Lowers every entry into a [`Condition`].
    pub fn to_conditions(&self) -> Vec<Condition> {
        self.entries
            .iter()
            .map(|(field, value)| {
                let column = field.clone();
                match value {
                    FilterValue::Eq(v) => Condition::equals(column, v.clone()),
                    FilterValue::Ne(v) => Condition::not_equals(column, v.clone()),
                    FilterValue::In(values) => Condition::In {
                        column,
                        values: values.clone(),
                    },
                    FilterValue::Contains(needle) => Condition::contains(column, needle.clone()),
                    FilterValue::NotContains(needle) => {
                        Condition::not_contains(column, needle.clone())
                    }
                    FilterValue::SubsetOf(values) => Condition::ArraySubsetOf {
                        column,
                        values: values.clone(),
                    },
                    FilterValue::NotSubsetOf(values) => Condition::ArrayNotSubsetOf {
                        column,
                        values: values.clone(),
                    },
                    FilterValue::Overlaps(values) => Condition::ArrayOverlaps {
                        column,
                        values: values.clone(),
                    },
                    FilterValue::AnyEq(v) => Condition::any_equals(column, v.clone()),
                }
            })
            .collect()
    }
}

impl<K: Into<String>, V: Into<FilterValue>> FromIterator<(K, V)> for FilterMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut filters = FilterMap::new();
        for (field, value) in iter {
            filters.insert(field, value);
        }
        filters
    }
}
