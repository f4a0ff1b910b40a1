//! Entity finders over the fixed LCA tables and views.
//!
//! Every set wraps a [`TableSet`], which pins a [`Finder`] to one source with
//! its declared columns and provides the generic `find`/`count`. Sets whose
//! queries need joins or aggregation build their SQL by hand with
//! [`Clauses`], which keeps the `$n` numbering of conditions, raw clauses
//! and the ORDER BY/LIMIT tail in one sequence.

use crate::finder::{FindRequest, Finder};
use crate::query::{Condition, FilterMap, OrderSpec, Pagination, PgRenderer};
use crate::source::Source;
use crate::{Result, ResultSet, Value};

mod benchmark_threshold;
mod cache_indicator;
mod life_cycle_effect;
mod process;
mod process_config;
mod process_config_sanity;
mod process_config_search;

pub use benchmark_threshold::BenchmarkThresholdSet;
pub use cache_indicator::CacheIndicatorSet;
pub use life_cycle_effect::LifeCycleEffectSet;
pub use process::ProcessSet;
pub use process_config::{CategoryQuery, ProcessConfigSet};
pub use process_config_sanity::ProcessConfigSanitySet;
pub use process_config_search::{FinalEnergyQuery, KeywordQuery, ProcessConfigSearchSet};

/// A finder bound to a single table or view.
#[derive(Debug, Clone)]
pub struct TableSet {
    finder: Finder,
    source: Source,
    bypass_cache: bool,
}

impl TableSet {
    /// Binds `finder` to `name`; filter keys and order columns outside
    /// `columns` are rejected before any query is issued.
    pub fn new(finder: Finder, name: &str, columns: &[&str]) -> Result<Self> {
        Ok(Self {
            finder,
            source: Source::with_columns(name, columns.iter().copied())?,
            bypass_cache: false,
        })
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn finder(&self) -> &Finder {
        &self.finder
    }

    /// Skip the result cache for every call made through this set.
    pub fn bypass_cache(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }

    pub fn is_bypassing_cache(&self) -> bool {
        self.bypass_cache
    }

    /// A request over this source carrying `filters` and the cache policy.
    pub fn request(&self, filters: FilterMap) -> FindRequest {
        FindRequest::new(self.source.clone())
            .filters(filters)
            .bypass_cache(self.bypass_cache)
    }

    pub async fn find(
        &self,
        filters: FilterMap,
        order: OrderSpec,
        page: Pagination,
    ) -> Result<ResultSet> {
        let mut request = self.request(filters).order_by(order);
        request.limit = page.limit;
        request.offset = page.offset;
        self.finder.find(&request).await
    }

    pub async fn count(&self, filters: FilterMap) -> Result<i64> {
        self.finder.count(&self.request(filters)).await
    }

    /// Hand-written SQL reading this source and every one of `joined`.
    pub async fn find_by_sql(
        &self,
        joined: &[&Source],
        sql: &str,
        params: Vec<Value>,
    ) -> Result<ResultSet> {
        self.finder
            .find_by_sql(&self.sources(joined), sql, params, self.bypass_cache)
            .await
    }

    pub async fn count_by_sql(
        &self,
        joined: &[&Source],
        sql: &str,
        params: Vec<Value>,
    ) -> Result<i64> {
        self.finder
            .count_by_sql(&self.sources(joined), sql, params, self.bypass_cache)
            .await
    }

    fn sources(&self, joined: &[&Source]) -> Vec<Source> {
        std::iter::once(&self.source)
            .chain(joined.iter().copied())
            .cloned()
            .collect()
    }
}

/// Checks `order` against `source`, prefixing every column with `alias.`
/// when one is given.
pub(crate) fn checked_order(
    source: &Source,
    order: &OrderSpec,
    alias: Option<&str>,
) -> Result<OrderSpec> {
    let mut checked = OrderSpec::new();
    for (column, direction) in order.iter() {
        source.check_column(column)?;
        checked = match alias {
            Some(alias) => checked.then(format!("{}.{}", alias, column), direction),
            None => checked.then(column, direction),
        };
    }
    Ok(checked)
}

/// Checks `filters` against `source`, prefixing every column with `alias.`
/// when one is given.
pub(crate) fn checked_filters(
    source: &Source,
    filters: &FilterMap,
    alias: Option<&str>,
) -> Result<Vec<Condition>> {
    filters
        .to_conditions()
        .into_iter()
        .map(|condition| {
            condition.validate(source)?;
            Ok(match alias {
                Some(alias) => condition.qualified(alias),
                None => condition,
            })
        })
        .collect()
}

/// WHERE clauses and bound parameters of a hand-written statement.
///
/// Placeholders are numbered in binding order, so conditions, raw clauses
/// and the tail can be mixed freely.
#[derive(Debug, Default)]
pub(crate) struct Clauses {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl Clauses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `value` and returns its placeholder.
    pub fn bind(&mut self, value: impl Into<Value>) -> String {
        self.params.push(value.into());
        format!("${}", self.params.len())
    }

    pub fn push(&mut self, clause: impl Into<String>) {
        self.clauses.push(clause.into());
    }

    /// Appends `conditions` numbered after the parameters bound so far.
    pub fn conditions(&mut self, conditions: &[Condition]) -> Result<()> {
        if conditions.is_empty() {
            return Ok(());
        }
        let (sql, params) = PgRenderer.render_conditions(conditions, self.params.len() + 1)?;
        self.params.extend(params);
        self.clauses.push(sql);
        Ok(())
    }

    /// ` WHERE a AND b`, or nothing without clauses.
    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    /// ` AND a AND b` for statements that already have a WHERE.
    pub fn and_sql(&self) -> String {
        self.clauses.iter().map(|c| format!(" AND {}", c)).collect()
    }

    /// ORDER BY and LIMIT/OFFSET bound after everything else.
    pub fn tail(&mut self, order: &OrderSpec, page: &Pagination) -> Result<String> {
        let (sql, params) = PgRenderer.render_tail(order, page, self.params.len() + 1)?;
        self.params.extend(params);
        Ok(sql)
    }

    pub fn into_params(self) -> Vec<Value> {
        self.params
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use crate::{Finder, MemoryStore, Statement};

    pub fn finder(store: &Arc<MemoryStore>) -> Finder {
        Finder::new(store.clone())
    }

    /// The only hand-written statement executed so far.
    pub fn single_statement(store: &MemoryStore) -> Statement {
        let executed = store.executed_statements();
        assert_eq!(executed.len(), 1, "expected exactly one statement");
        executed[0].clone()
    }

    /// Collapses runs of whitespace so multi-line SQL compares on one line.
    pub fn squash(sql: &str) -> String {
        sql.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::MemoryStore;

    #[test]
    fn test_clauses_number_in_binding_order() {
        let mut clauses = Clauses::new();
        let id = clauses.bind(12);
        clauses.push(format!("p.process_category_node_id = {}", id));
        clauses
            .conditions(&[Condition::equals("p.is_reference", true)])
            .unwrap();
        let tail = clauses
            .tail(&OrderSpec::new().asc("p.name"), &Pagination::new(Some(5), None))
            .unwrap();

        assert_eq!(
            clauses.where_sql(),
            " WHERE p.process_category_node_id = $1 AND \"p\".\"is_reference\" = $2"
        );
        assert_eq!(tail, " ORDER BY \"p\".\"name\" ASC LIMIT $3");
        assert_eq!(
            clauses.into_params(),
            vec![Value::Int(12), Value::Bool(true), Value::BigInt(5)]
        );
    }

    #[test]
    fn test_empty_clauses() {
        let mut clauses = Clauses::new();
        clauses.conditions(&[]).unwrap();
        assert_eq!(clauses.where_sql(), "");
        assert_eq!(clauses.and_sql(), "");
        assert!(clauses.into_params().is_empty());
    }

    #[tokio::test]
    async fn test_declared_columns_guard_find_and_count() {
        let store = Arc::new(MemoryStore::new());
        let set = TableSet::new(testing::finder(&store), "elca.things", &["id", "name"]).unwrap();

        let err = set
            .find(
                FilterMap::new().with("colour", "red"),
                OrderSpec::new(),
                Pagination::default(),
            )
            .await
            .unwrap_err();
        assert!(err.is_invalid_query());
        let err = set
            .find(FilterMap::new(), OrderSpec::new().asc("colour"), Pagination::default())
            .await
            .unwrap_err();
        assert!(err.is_invalid_query());
        assert!(set.count(FilterMap::new().with("colour", "red")).await.is_err());
        assert_eq!(store.calls(), 0);
    }
}
