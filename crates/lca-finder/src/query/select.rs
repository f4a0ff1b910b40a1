//! SELECT query description.

use super::{Condition, FilterMap, OrderDirection, OrderSpec, Pagination};
use crate::source::Source;
use crate::Result;

/// A structured SELECT over a single [`Source`].
///
/// Nothing here is SQL yet; a renderer turns it into a parameterized
/// statement and the in-memory store evaluates it directly.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub source: Source,
    /// Selected columns; empty means `*`.
    pub columns: Vec<String>,
    pub conditions: Vec<Condition>,
    pub order: OrderSpec,
    pub pagination: Pagination,
    pub distinct: bool,
}

impl SelectQuery {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            columns: Vec::new(),
            conditions: Vec::new(),
            order: OrderSpec::default(),
            pagination: Pagination::default(),
            distinct: false,
        }
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Appends every entry of `filters` as an AND-ed condition.
    pub fn filter(mut self, filters: &FilterMap) -> Self {
        self.conditions.extend(filters.to_conditions());
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn order_by(mut self, order: OrderSpec) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.pagination.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.pagination.offset = Some(offset);
        self
    }

    pub fn paginate(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    /// Copy of this query without ordering or pagination, as used for counting.
    pub fn unpaginated(&self) -> Self {
        Self {
            source: self.source.clone(),
            columns: self.columns.clone(),
            conditions: self.conditions.clone(),
            order: OrderSpec::default(),
            pagination: Pagination::default(),
            distinct: self.distinct,
        }
    }

    /// Validates every identifier, operand and the pagination window.
    pub fn validate(&self) -> Result<()> {
        for column in &self.columns {
            self.source.check_column(column)?;
        }
        for condition in &self.conditions {
            condition.validate(&self.source)?;
        }
        for (column, _) in self.order.iter() {
            self.source.check_column(column)?;
        }
        self.pagination.validate()
    }

    pub fn order_columns(&self) -> impl Iterator<Item = (&str, OrderDirection)> {
        self.order.iter()
    }
}
