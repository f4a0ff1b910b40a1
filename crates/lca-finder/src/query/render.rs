//! Backend-specific rendering of [`SelectQuery`] into parameterized SQL.

use super::helpers::{quote_identifier, validate_identifier};
use super::{Condition, OrderSpec, Pagination, SelectQuery};
use crate::{FinderError, Result, Value};

/// A rendered SQL statement with positional parameters (`$1..$n`).
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// First 100 characters of the SQL, for logs.
    pub fn preview(&self) -> String {
        self.sql.chars().take(100).collect()
    }
}

/// Turns structured queries into statements for one SQL dialect.
pub trait Renderer: Send + Sync {
    fn render_select(&self, query: &SelectQuery) -> Result<Statement>;

    fn render_count(&self, query: &SelectQuery) -> Result<Statement>;
}

/// PostgreSQL renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgRenderer;

impl PgRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Renders AND-ed conditions with placeholders numbered from `first_index`.
    ///
    /// Used by callers that splice conditions into hand-written SQL after
    /// their own `$1..$(first_index - 1)` parameters.
    pub fn render_conditions(
        &self,
        conditions: &[Condition],
        first_index: usize,
    ) -> Result<(String, Vec<Value>)> {
        if first_index == 0 {
            return Err(FinderError::invalid("Placeholder numbering starts at 1"));
        }
        let mut writer = ParamWriter::new(first_index - 1);
        let parts = conditions
            .iter()
            .map(|c| writer.condition(c))
            .collect::<Result<Vec<_>>>()?;
        Ok((parts.join(" AND "), writer.params))
    }

    /// Renders ` ORDER BY .. LIMIT $n OFFSET $m` for hand-written SQL, with
    /// placeholders numbered from `first_index`. Empty when there is
    /// neither ordering nor a window.
    pub fn render_tail(
        &self,
        order: &OrderSpec,
        page: &Pagination,
        first_index: usize,
    ) -> Result<(String, Vec<Value>)> {
        if first_index == 0 {
            return Err(FinderError::invalid("Placeholder numbering starts at 1"));
        }
        page.validate()?;
        for (column, _) in order.iter() {
            validate_identifier(column)?;
        }
        let mut writer = ParamWriter::new(first_index - 1);
        let sql = writer.tail(order, page);
        Ok((sql, writer.params))
    }

    fn from_where(&self, query: &SelectQuery, writer: &mut ParamWriter) -> Result<String> {
        let mut sql = String::from(" FROM ");
        sql.push_str(&query.source.quoted());

        if !query.conditions.is_empty() {
            let parts = query
                .conditions
                .iter()
                .map(|c| writer.condition(c))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" WHERE ");
            sql.push_str(&parts.join(" AND "));
        }

        Ok(sql)
    }

    fn projection(query: &SelectQuery) -> String {
        let mut sql = String::from("SELECT ");
        if query.distinct {
            sql.push_str("DISTINCT ");
        }
        if query.columns.is_empty() {
            sql.push('*');
        } else {
            let cols: Vec<String> = query.columns.iter().map(|c| quote_identifier(c)).collect();
            sql.push_str(&cols.join(", "));
        }
        sql
    }
}

impl Renderer for PgRenderer {
    fn render_select(&self, query: &SelectQuery) -> Result<Statement> {
        query.validate()?;

        let mut writer = ParamWriter::new(0);
        let mut sql = Self::projection(query);
        sql.push_str(&self.from_where(query, &mut writer)?);
        sql.push_str(&writer.tail(&query.order, &query.pagination));

        Ok(Statement::new(sql, writer.params))
    }

    fn render_count(&self, query: &SelectQuery) -> Result<Statement> {
        let query = query.unpaginated();
        query.validate()?;

        let mut writer = ParamWriter::new(0);
        let sql = if query.distinct {
            let mut inner = Self::projection(&query);
            inner.push_str(&self.from_where(&query, &mut writer)?);
            format!("SELECT COUNT(*) FROM ({}) AS \"distinct_rows\"", inner)
        } else {
            format!("SELECT COUNT(*){}", self.from_where(&query, &mut writer)?)
        };

        Ok(Statement::new(sql, writer.params))
    }
}

/// Collects bound parameters and hands out their placeholder numbers.
struct ParamWriter {
    offset: usize,
    params: Vec<Value>,
}

impl ParamWriter {
    fn new(offset: usize) -> Self {
        Self {
            offset,
            params: Vec::new(),
        }
    }

    fn push(&mut self, value: Value) -> usize {
        self.params.push(value);
        self.offset + self.params.len()
    }

    fn tail(&mut self, order: &OrderSpec, page: &Pagination) -> String {
        let mut sql = String::new();
        if !order.is_empty() {
            let parts: Vec<String> = order
                .iter()
                .map(|(col, dir)| format!("{} {}", quote_identifier(col), dir.to_sql()))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&parts.join(", "));
        }
        if let Some(limit) = page.limit {
            let idx = self.push(Value::BigInt(limit));
            sql.push_str(&format!(" LIMIT ${}", idx));
        }
        if let Some(offset) = page.offset {
            let idx = self.push(Value::BigInt(offset));
            sql.push_str(&format!(" OFFSET ${}", idx));
        }
        sql
    }

    fn array(&mut self, values: &[Value]) -> Result<String> {
        let array = Value::Array(values.to_vec());
        let cast = array.pg_array_cast().ok_or_else(|| {
            FinderError::invalid("Array operand must hold elements of a single scalar type")
        })?;
        let idx = self.push(array);
        Ok(format!("${}::{}", idx, cast))
    }

    fn condition(&mut self, condition: &Condition) -> Result<String> {
        if let Some(column) = condition.column() {
            validate_identifier(column)?;
        }

        let sql = match condition {
            Condition::Equals { column, value } => {
                let idx = self.push(value.clone());
                format!("{} = ${}", quote_identifier(column), idx)
            }
            Condition::NotEquals { column, value } => {
                let idx = self.push(value.clone());
                format!("{} != ${}", quote_identifier(column), idx)
            }
            Condition::IsNull { column } => format!("{} IS NULL", quote_identifier(column)),
            Condition::IsNotNull { column } => format!("{} IS NOT NULL", quote_identifier(column)),
            Condition::In { column, values } => {
                if values.is_empty() {
                    return Err(FinderError::invalid(format!(
                        "IN list for '{}' cannot be empty",
                        column
                    )));
                }
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| format!("${}", self.push(v.clone())))
                    .collect();
                format!("{} IN ({})", quote_identifier(column), placeholders.join(", "))
            }
            Condition::Contains { column, needle } => {
                let idx = self.push(Value::String(format!("%{}%", needle)));
                format!("{} ILIKE ${}", quote_identifier(column), idx)
            }
            Condition::NotContains { column, needle } => {
                let idx = self.push(Value::String(format!("%{}%", needle)));
                format!("{} NOT ILIKE ${}", quote_identifier(column), idx)
            }
            Condition::ArraySubsetOf { column, values } => {
                let param = self.array(values)?;
                format!("{} <@ {}", param, quote_identifier(column))
            }
            Condition::ArrayNotSubsetOf { column, values } => {
                let param = self.array(values)?;
                format!("NOT ({} <@ {})", param, quote_identifier(column))
            }
            Condition::ArrayOverlaps { column, values } => {
                let param = self.array(values)?;
                format!("{} && {}", param, quote_identifier(column))
            }
            Condition::AnyEquals { column, value } => {
                let idx = self.push(value.clone());
                format!("${} = ANY({})", idx, quote_identifier(column))
            }
            Condition::All(conditions) => {
                if conditions.is_empty() {
                    return Err(FinderError::invalid("Condition group cannot be empty"));
                }
                let parts = conditions
                    .iter()
                    .map(|c| self.condition(c))
                    .collect::<Result<Vec<_>>>()?;
                format!("({})", parts.join(" AND "))
            }
        };
        Ok(sql)
    }
}
