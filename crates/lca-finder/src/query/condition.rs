//! Typed condition tree.

use crate::source::Source;
use crate::{FinderError, Result, Value};

/// A single WHERE predicate.
///
/// Column names are identifiers checked against the query's [`Source`];
/// values are always bound as parameters by the renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column = value`
    Equals { column: String, value: Value },
    /// `column != value`
    NotEquals { column: String, value: Value },
    /// `column IS NULL`
    IsNull { column: String },
    /// `column IS NOT NULL`
    IsNotNull { column: String },
    /// `column IN (v1, v2, ...)`
    In { column: String, values: Vec<Value> },
    /// Case-insensitive substring match (`ILIKE '%needle%'`)
    Contains { column: String, needle: String },
    /// Negated substring match (`NOT ILIKE '%needle%'`)
    NotContains { column: String, needle: String },
    /// Every element of `values` occurs in the array column
    ArraySubsetOf { column: String, values: Vec<Value> },
    /// At least one element of `values` is missing from the array column
    ArrayNotSubsetOf { column: String, values: Vec<Value> },
    /// `values` and the array column share an element
    ArrayOverlaps { column: String, values: Vec<Value> },
    /// `value` equals some element of the array column
    AnyEquals { column: String, value: Value },
    /// Parenthesised AND group
    All(Vec<Condition>),
}

impl Condition {
    pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        let column = column.into();
        if value.is_null() {
            Condition::IsNull { column }
        } else {
            Condition::Equals { column, value }
        }
    }

    pub fn not_equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        let column = column.into();
        if value.is_null() {
            Condition::IsNotNull { column }
        } else {
            Condition::NotEquals { column, value }
        }
    }

    pub fn is_in<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Condition::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(column: impl Into<String>, needle: impl Into<String>) -> Self {
        Condition::Contains {
            column: column.into(),
            needle: needle.into(),
        }
    }

    pub fn not_contains(column: impl Into<String>, needle: impl Into<String>) -> Self {
        Condition::NotContains {
            column: column.into(),
            needle: needle.into(),
        }
    }

    pub fn array_subset_of<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Condition::ArraySubsetOf {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn array_not_subset_of<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Condition::ArrayNotSubsetOf {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn array_overlaps<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Condition::ArrayOverlaps {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn any_equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::AnyEquals {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Column referenced by a leaf condition; `None` for groups.
    pub fn column(&self) -> Option<&str> {
        match self {
            Condition::Equals { column, .. }
            | Condition::NotEquals { column, .. }
            | Condition::IsNull { column }
            | Condition::IsNotNull { column }
            | Condition::In { column, .. }
            | Condition::Contains { column, .. }
            | Condition::NotContains { column, .. }
            | Condition::ArraySubsetOf { column, .. }
            | Condition::ArrayNotSubsetOf { column, .. }
            | Condition::ArrayOverlaps { column, .. }
            | Condition::AnyEquals { column, .. } => Some(column),
            Condition::All(_) => None,
        }
    }

    /// The same condition with every column prefixed by `alias.`, for
    /// splicing filters into joined SQL.
    pub fn qualified(self, alias: &str) -> Self {
        let q = |column: String| format!("{}.{}", alias, column);
        match self {
            Condition::Equals { column, value } => Condition::Equals { column: q(column), value },
            Condition::NotEquals { column, value } => Condition::NotEquals { column: q(column), value },
            Condition::IsNull { column } => Condition::IsNull { column: q(column) },
            Condition::IsNotNull { column } => Condition::IsNotNull { column: q(column) },
            Condition::In { column, values } => Condition::In { column: q(column), values },
            Condition::Contains { column, needle } => Condition::Contains { column: q(column), needle },
            Condition::NotContains { column, needle } => {
                Condition::NotContains { column: q(column), needle }
            }
            Condition::ArraySubsetOf { column, values } => {
                Condition::ArraySubsetOf { column: q(column), values }
            }
            Condition::ArrayNotSubsetOf { column, values } => {
                Condition::ArrayNotSubsetOf { column: q(column), values }
            }
            Condition::ArrayOverlaps { column, values } => {
                Condition::ArrayOverlaps { column: q(column), values }
            }
            Condition::AnyEquals { column, value } => Condition::AnyEquals { column: q(column), value },
            Condition::All(conditions) => {
                Condition::All(conditions.into_iter().map(|c| c.qualified(alias)).collect())
            }
        }
    }

    /// Checks identifiers and operand shapes against `source`.
    pub fn validate(&self, source: &Source) -> Result<()> {
        if let Some(column) = self.column() {
            source.check_column(column)?;
        }

        match self {
            Condition::Equals { value, .. } | Condition::NotEquals { value, .. } => {
                if value.is_null() {
                    return Err(FinderError::invalid(
                        "NULL comparisons must use IsNull / IsNotNull",
                    ));
                }
            }
            Condition::AnyEquals { value, .. } => {
                if value.is_null() || value.as_array().is_some() {
                    return Err(FinderError::invalid(
                        "ANY comparison needs a non-NULL scalar value",
                    ));
                }
            }
            Condition::In { column, values } => {
                if values.is_empty() {
                    return Err(FinderError::invalid(format!(
                        "IN list for '{}' cannot be empty",
                        column
                    )));
                }
            }
            Condition::ArraySubsetOf { column, values }
            | Condition::ArrayNotSubsetOf { column, values }
            | Condition::ArrayOverlaps { column, values } => {
                if values.is_empty() {
                    return Err(FinderError::invalid(format!(
                        "Array operand for '{}' cannot be empty",
                        column
                    )));
                }
                if Value::Array(values.clone()).pg_array_cast().is_none() {
                    return Err(FinderError::invalid(format!(
                        "Array operand for '{}' must hold elements of a single scalar type",
                        column
                    )));
                }
            }
            Condition::All(conditions) => {
                if conditions.is_empty() {
                    return Err(FinderError::invalid("Condition group cannot be empty"));
                }
                for condition in conditions {
                    condition.validate(source)?;
                }
            }
            Condition::IsNull { .. }
            | Condition::IsNotNull { .. }
            | Condition::Contains { .. }
            | Condition::NotContains { .. } => {}
        }

        Ok(())
    }
}
