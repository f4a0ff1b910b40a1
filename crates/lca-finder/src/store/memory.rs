//! In-process store evaluating the condition tree directly.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::RecordStore;
use crate::query::{Condition, OrderDirection, SelectQuery, Statement};
use crate::{Record, Result, StoreError, StoreErrorKind, Value};

/// Thread-safe in-memory tables with call-count instrumentation.
///
/// Hand-written statements cannot be evaluated; their results are
/// registered up front with [`with_sql_result`](Self::with_sql_result) and
/// every executed statement is recorded for inspection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Record>>>,
    sql_results: RwLock<HashMap<String, Vec<Record>>>,
    executed: RwLock<Vec<Statement>>,
    failure: RwLock<Option<StoreError>>,
    calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a table.
    pub fn with_table(self, name: impl Into<String>, rows: Vec<Record>) -> Self {
        self.insert_table(name, rows);
        self
    }

    pub fn insert_table(&self, name: impl Into<String>, rows: Vec<Record>) {
        self.tables.write().insert(name.into(), rows);
    }

    /// Registers the rows returned for a hand-written statement.
    pub fn with_sql_result(self, sql: impl Into<String>, rows: Vec<Record>) -> Self {
        self.sql_results.write().insert(sql.into(), rows);
        self
    }

    /// Makes every subsequent call fail with `error`.
    pub fn fail_with(&self, error: StoreError) {
        *self.failure.write() = Some(error);
    }

    pub fn clear_failure(&self) {
        *self.failure.write() = None;
    }

    /// Number of store calls issued so far.
    pub fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    /// Hand-written statements executed so far, oldest first.
    pub fn executed_statements(&self) -> Vec<Statement> {
        self.executed.read().clone()
    }

    fn begin_call(&self) -> Result<()> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        match self.failure.read().as_ref() {
            Some(err) => Err(err.clone().into()),
            None => Ok(()),
        }
    }

    fn matching_rows(&self, query: &SelectQuery) -> Result<Vec<Record>> {
        let tables = self.tables.read();
        let rows = tables.get(query.source.name()).ok_or_else(|| {
            StoreError::new(
                StoreErrorKind::Execution,
                format!("relation \"{}\" does not exist", query.source.name()),
            )
        })?;
        check_columns(query, rows)?;

        Ok(rows
            .iter()
            .filter(|row| query.conditions.iter().all(|c| matches(c, row)))
            .cloned()
            .collect())
    }

    fn project_distinct(query: &SelectQuery, rows: Vec<Record>) -> Vec<Record> {
        let rows: Vec<Record> = if query.columns.is_empty() {
            rows
        } else {
            rows.iter().map(|r| r.project(&query.columns)).collect()
        };

        if !query.distinct {
            return rows;
        }

        let mut unique: Vec<Record> = Vec::with_capacity(rows.len());
        for row in rows {
            if !unique.contains(&row) {
                unique.push(row);
            }
        }
        unique
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch(&self, query: &SelectQuery) -> Result<Vec<Record>> {
        self.begin_call()?;

        let mut rows = self.matching_rows(query)?;
        let order: Vec<(&str, OrderDirection)> = query.order_columns().collect();
        if !order.is_empty() {
            rows.sort_by(|a, b| compare_rows(a, b, &order));
        }

        let rows = Self::project_distinct(query, rows);
        let rows = query.pagination.apply(rows);
        debug!(source = %query.source, rows = rows.len(), "Memory fetch");
        Ok(rows)
    }

    async fn count(&self, query: &SelectQuery) -> Result<i64> {
        self.begin_call()?;

        let rows = self.matching_rows(query)?;
        Ok(Self::project_distinct(query, rows).len() as i64)
    }

    async fn fetch_raw(&self, statement: &Statement) -> Result<Vec<Record>> {
        self.begin_call()?;

        self.executed.write().push(statement.clone());
        let rows = self
            .sql_results
            .read()
            .get(&statement.sql)
            .cloned()
            .unwrap_or_default();
        debug!(sql = %statement.preview(), rows = rows.len(), "Memory raw fetch");
        Ok(rows)
    }
}

/// Referenced columns must exist, as PostgreSQL reports with SQLSTATE
/// 42703. A table without rows accepts any column.
fn check_columns(query: &SelectQuery, rows: &[Record]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let known: HashSet<&str> = rows.iter().flat_map(|row| row.columns()).collect();

    let mut referenced: Vec<&str> = query.columns.iter().map(String::as_str).collect();
    referenced.extend(query.order_columns().map(|(column, _)| column));
    for condition in &query.conditions {
        collect_columns(condition, &mut referenced);
    }

    match referenced.into_iter().find(|column| !known.contains(column)) {
        Some(column) => Err(StoreError::new(
            StoreErrorKind::Execution,
            format!("column \"{}\" does not exist", column),
        )
        .into()),
        None => Ok(()),
    }
}

fn collect_columns<'a>(condition: &'a Condition, out: &mut Vec<&'a str>) {
    match condition {
        Condition::All(conditions) => {
            for condition in conditions {
                collect_columns(condition, out);
            }
        }
        leaf => out.extend(leaf.column()),
    }
}

fn column<'a>(row: &'a Record, name: &str) -> &'a Value {
    row.get(name).unwrap_or(&Value::Null)
}

fn array_contains(haystack: &[Value], needle: &Value) -> bool {
    haystack.iter().any(|v| v.sql_eq(needle))
}

fn matches(condition: &Condition, row: &Record) -> bool {
    match condition {
        Condition::Equals { column: c, value } => column(row, c).sql_eq(value),
        Condition::NotEquals { column: c, value } => {
            let v = column(row, c);
            !v.is_null() && !v.sql_eq(value)
        }
        Condition::IsNull { column: c } => column(row, c).is_null(),
        Condition::IsNotNull { column: c } => !column(row, c).is_null(),
        Condition::In { column: c, values } => array_contains(values, column(row, c)),
        Condition::Contains { column: c, needle } => column(row, c)
            .as_str()
            .is_some_and(|text| ilike(text, &format!("%{}%", needle))),
        Condition::NotContains { column: c, needle } => column(row, c)
            .as_str()
            .is_some_and(|text| !ilike(text, &format!("%{}%", needle))),
        Condition::ArraySubsetOf { column: c, values } => column(row, c)
            .as_array()
            .is_some_and(|arr| values.iter().all(|v| array_contains(arr, v))),
        Condition::ArrayNotSubsetOf { column: c, values } => column(row, c)
            .as_array()
            .is_some_and(|arr| !values.iter().all(|v| array_contains(arr, v))),
        Condition::ArrayOverlaps { column: c, values } => column(row, c)
            .as_array()
            .is_some_and(|arr| values.iter().any(|v| array_contains(arr, v))),
        Condition::AnyEquals { column: c, value } => column(row, c)
            .as_array()
            .is_some_and(|arr| array_contains(arr, value)),
        Condition::All(conditions) => conditions.iter().all(|cond| matches(cond, row)),
    }
}

/// PostgreSQL default null placement: last for ASC, first for DESC.
fn compare_rows(a: &Record, b: &Record, order: &[(&str, OrderDirection)]) -> Ordering {
    for (col, dir) in order {
        let (va, vb) = (column(a, col), column(b, col));
        let ord = match (va.is_null(), vb.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => va.sql_cmp(vb).unwrap_or(Ordering::Equal),
        };
        let ord = match dir {
            OrderDirection::Asc => ord,
            OrderDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Case-insensitive LIKE: `%` matches any run, `_` one character, `\` escapes.
pub(crate) fn ilike(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    like_match(&text, &pattern)
}

fn like_match(text: &[char], pattern: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('%', rest)) => (0..=text.len()).any(|skip| like_match(&text[skip..], rest)),
        Some(('_', rest)) => !text.is_empty() && like_match(&text[1..], rest),
        Some(('\\', rest)) if !rest.is_empty() => {
            text.first() == Some(&rest[0]) && like_match(&text[1..], &rest[1..])
        }
        Some((ch, rest)) => text.first() == Some(ch) && like_match(&text[1..], rest),
    }
}
