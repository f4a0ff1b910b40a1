//! Ordering and pagination.

use crate::{FinderError, Result};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// Ordered list of `(column, direction)` pairs; declaration order is kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderSpec {
    columns: Vec<(String, OrderDirection)>,
}

impl OrderSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asc(mut self, column: impl Into<String>) -> Self {
        self.columns.push((column.into(), OrderDirection::Asc));
        self
    }

    pub fn desc(mut self, column: impl Into<String>) -> Self {
        self.columns.push((column.into(), OrderDirection::Desc));
        self
    }

    pub fn then(mut self, column: impl Into<String>, direction: OrderDirection) -> Self {
        self.columns.push((column.into(), direction));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, OrderDirection)> {
        self.columns.iter().map(|(c, d)| (c.as_str(), *d))
    }
}

/// Limit/offset window over an ordered result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self { limit, offset }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(limit) = self.limit {
            if limit < 0 {
                return Err(FinderError::invalid(format!(
                    "limit must not be negative (got {})",
                    limit
                )));
            }
        }
        if let Some(offset) = self.offset {
            if offset < 0 {
                return Err(FinderError::invalid(format!(
                    "offset must not be negative (got {})",
                    offset
                )));
            }
        }
        Ok(())
    }

    /// Applies the window to an already ordered list.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let skip = self.offset.unwrap_or(0).max(0) as usize;
        let iter = items.into_iter().skip(skip);
        match self.limit {
            Some(limit) => iter.take(limit.max(0) as usize).collect(),
            None => iter.collect(),
        }
    }
}
