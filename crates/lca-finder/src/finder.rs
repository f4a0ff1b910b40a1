//! The dynamic finder.
//!
//! [`Finder`] turns a [`FindRequest`] into a validated [`SelectQuery`],
//! consults the optional read-through cache and otherwise asks its
//! [`RecordStore`]. Validation always runs first: an invalid request never
//! reaches the cache or the store.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::cache::{CacheKey, CachedValue, InMemoryQueryCache, QueryCache, QueryKind};
use crate::config::FinderConfig;
use crate::connection::{Connection, DatabaseConfig};
use crate::query::{
    check_placeholders, Condition, FilterMap, KeywordSearch, OrderSpec, Pagination, PgRenderer,
    Renderer, SelectQuery, Statement,
};
use crate::source::Source;
use crate::store::{PgStore, RecordStore};
use crate::{EmptyInput, FinderError, Result, ResultSet, Value};

/// Everything a `find` or `count` call needs.
#[derive(Debug, Clone, PartialEq)]
pub struct FindRequest {
    pub source: Source,
    pub filters: FilterMap,
    /// Extra conditions AND-ed after the filters.
    pub conditions: Vec<Condition>,
    pub order: OrderSpec,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub distinct: bool,
    /// Selected columns; empty means all.
    pub columns: Vec<String>,
    /// Skip both cache read and cache write.
    pub bypass_cache: bool,
}

impl FindRequest {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            filters: FilterMap::new(),
            conditions: Vec::new(),
            order: OrderSpec::new(),
            limit: None,
            offset: None,
            distinct: false,
            columns: Vec::new(),
            bypass_cache: false,
        }
    }

    pub fn filters(mut self, filters: FilterMap) -> Self {
        self.filters = filters;
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
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn bypass_cache(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }

    /// The structured query this request describes.
    pub fn to_query(&self) -> SelectQuery {
        let mut query = SelectQuery::new(self.source.clone())
            .select(self.columns.iter().cloned())
            .filter(&self.filters)
            .order_by(self.order.clone())
            .paginate(Pagination::new(self.limit, self.offset))
            .distinct(self.distinct);
        query.conditions.extend(self.conditions.iter().cloned());
        query
    }
}

/// Parameterized finder over a [`RecordStore`] with an optional cache.
#[derive(Clone)]
pub struct Finder {
    store: Arc<dyn RecordStore>,
    cache: Option<Arc<dyn QueryCache>>,
    renderer: PgRenderer,
}

impl std::fmt::Debug for Finder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Finder")
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl Finder {
    /// Finder without a cache.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            cache: None,
            renderer: PgRenderer,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn QueryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Finder with the in-memory cache configured by `config`.
    pub fn from_config(store: Arc<dyn RecordStore>, config: &FinderConfig) -> Self {
        let finder = Self::new(store);
        if !config.cache_enabled {
            return finder;
        }

        let mut cache = match config.cache_ttl() {
            Some(ttl) => InMemoryQueryCache::with_ttl(ttl),
            None => InMemoryQueryCache::new(),
        };
        if let Some(max) = config.cache_max_entries {
            cache = cache.max_entries(max);
        }
        finder.with_cache(Arc::new(cache))
    }

    /// Connects to PostgreSQL and builds a finder over a [`PgStore`].
    pub async fn connect(database: &DatabaseConfig, config: &FinderConfig) -> Result<Self> {
        let connection = Connection::from_config(database).await?;
        let store = PgStore::new(&connection).with_slow_query_threshold(config.slow_query_threshold_ms);
        Ok(Self::from_config(Arc::new(store), config))
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Records matching `request`, in its order and pagination window.
    #[instrument(skip(self, request), fields(source = %request.source, filters = request.filters.len(), bypass_cache = request.bypass_cache))]
    pub async fn find(&self, request: &FindRequest) -> Result<ResultSet> {
        let query = request.to_query();
        let statement = self.renderer.render_select(&query)?;
        let key = CacheKey::new(QueryKind::Find, query.source.name(), &statement);

        if !request.bypass_cache {
            if let Some(CachedValue::Rows(rows)) = self.cached(&key).await {
                return Ok(rows);
            }
        }

        let rows = ResultSet::new(self.store.fetch(&query).await?);

        if !request.bypass_cache {
            self.remember(key, CachedValue::Rows(rows.clone())).await;
        }
        Ok(rows)
    }

    /// Number of records matching `request`; order and pagination are ignored.
    #[instrument(skip(self, request), fields(source = %request.source, filters = request.filters.len(), bypass_cache = request.bypass_cache))]
    pub async fn count(&self, request: &FindRequest) -> Result<i64> {
        let query = request.to_query().unpaginated();
        let statement = self.renderer.render_count(&query)?;
        let key = CacheKey::new(QueryKind::Count, query.source.name(), &statement);

        if !request.bypass_cache {
            if let Some(CachedValue::Count(count)) = self.cached(&key).await {
                return Ok(count);
            }
        }

        let count = self.store.count(&query).await?;

        if !request.bypass_cache {
            self.remember(key, CachedValue::Count(count)).await;
        }
        Ok(count)
    }

    /// Runs hand-written SQL with positional `$n` parameters.
    ///
    /// The placeholders used must be exactly `$1..$n` for `n` parameters.
    /// `sources` lists every table or view the statement reads; the cached
    /// result is dropped when any of them is invalidated.
    #[instrument(skip(self, sources, sql, params), fields(sources = %source_names(sources), params = params.len(), bypass_cache = bypass_cache))]
    pub async fn find_by_sql(
        &self,
        sources: &[Source],
        sql: &str,
        params: Vec<Value>,
        bypass_cache: bool,
    ) -> Result<ResultSet> {
        if sources.is_empty() {
            return Err(FinderError::invalid(
                "Hand-written SQL must name at least one source",
            ));
        }
        check_placeholders(sql, params.len())?;
        let statement = Statement::new(sql, params);
        let names: Vec<&str> = sources.iter().map(Source::name).collect();
        let key = CacheKey::joined(QueryKind::Sql, &names, &statement);

        if !bypass_cache {
            if let Some(CachedValue::Rows(rows)) = self.cached(&key).await {
                return Ok(rows);
            }
        }

        let rows = ResultSet::new(self.store.fetch_raw(&statement).await?);

        if !bypass_cache {
            self.remember(key, CachedValue::Rows(rows.clone())).await;
        }
        Ok(rows)
    }

    /// Hand-written counting SQL; reads the first column of the first row.
    ///
    /// No rows count as zero.
    #[instrument(skip(self, sources, sql, params), fields(sources = %source_names(sources), params = params.len(), bypass_cache = bypass_cache))]
    pub async fn count_by_sql(
        &self,
        sources: &[Source],
        sql: &str,
        params: Vec<Value>,
        bypass_cache: bool,
    ) -> Result<i64> {
        let rows = self.find_by_sql(sources, sql, params, bypass_cache).await?;
        let Some(row) = rows.first() else {
            return Ok(0);
        };
        let count = row
            .columns()
            .next()
            .and_then(|col| row.get(col))
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                FinderError::Serialization("Count query did not return an integer column".to_string())
            });
        count
    }

    /// Keyword search: every usable token must be contained in the field.
    ///
    /// Without usable tokens the result is empty and the store is not asked.
    #[instrument(skip(self, search, request), fields(source = %request.source, field = search.field()))]
    pub async fn search(&self, search: &KeywordSearch, request: FindRequest) -> Result<ResultSet> {
        let Some(condition) = search.to_condition() else {
            debug!("No usable keywords");
            return Ok(ResultSet::empty(EmptyInput::NoKeywords));
        };
        self.find(&request.condition(condition)).await
    }

    /// Drops every cached result of `source`.
    pub async fn invalidate_source(&self, source: &Source) -> Result<usize> {
        match &self.cache {
            Some(cache) => cache.invalidate_source(source.name()).await,
            None => Ok(0),
        }
    }

    async fn cached(&self, key: &CacheKey) -> Option<CachedValue> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(Some(value)) => {
                debug!(key = key.digest(), "Cache hit");
                Some(value)
            }
            Ok(None) => {
                debug!(key = key.digest(), "Cache miss");
                None
            }
            Err(e) => {
                warn!(key = key.digest(), error = %e, "Cache read failed");
                None
            }
        }
    }

    async fn remember(&self, key: CacheKey, value: CachedValue) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(e) = cache.put(key, value).await {
            warn!(error = %e, "Cache write failed");
        }
    }
}

fn source_names(sources: &[Source]) -> String {
    sources
        .iter()
        .map(Source::name)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::{Record, StoreError, StoreErrorKind};
    use tokio_test::{assert_err, assert_ok};

    fn process(id: i32, name: &str, category: &str, phases: &[&str]) -> Record {
        Record::from_pairs([
            ("id", Value::Int(id)),
            ("name", Value::from(name)),
            ("category", Value::from(category)),
            ("phases", Value::from(phases.to_vec())),
        ])
    }

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new().with_table(
            "processes",
            vec![
                process(1, "Spruce plank", "wood", &["A1-3", "C3"]),
                process(2, "Reinforcing steel", "metal", &["A1-3", "D"]),
                process(3, "Oak beam", "wood", &["A1-3"]),
                process(4, "Concrete C30", "mineral", &["A1-3", "C4"]),
                process(5, "Larch cladding", "wood", &["A1-3", "C3", "D"]),
            ],
        ))
    }

    fn processes() -> FindRequest {
        FindRequest::new(Source::new("processes").unwrap())
    }

    fn ids(rows: &ResultSet) -> Vec<i64> {
        rows.iter().filter_map(|r| r.get_i64("id")).collect()
    }

    #[tokio::test]
    async fn test_find_and_count_by_equality() {
        let store = store();
        let finder = Finder::new(store.clone());
        let request = processes().filters(FilterMap::new().with("category", "wood"));

        let rows = finder.find(&request).await.unwrap();
        assert_eq!(ids(&rows), vec![1, 3, 5]);
        assert!(rows.iter().all(|r| r.get_str("category") == Some("wood")));
        assert_eq!(finder.count(&request).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_ordered_page() {
        let finder = Finder::new(store());
        let request = processes()
            .order_by(OrderSpec::new().asc("name"))
            .limit(2)
            .offset(1);

        let rows = finder.find(&request).await.unwrap();
        let names: Vec<_> = rows.iter().filter_map(|r| r.get_str("name")).collect();
        // Concrete, Larch, Oak, Reinforcing, Spruce
        assert_eq!(names, vec!["Larch cladding", "Oak beam"]);
    }

    #[tokio::test]
    async fn test_page_past_end_is_empty() {
        let finder = Finder::new(store());
        let rows = finder.find(&processes().limit(10).offset(5)).await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(rows.empty_reason(), None);

        let rows = finder.find(&processes().limit(10).offset(3)).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_count_ignores_pagination() {
        let finder = Finder::new(store());
        let request = processes()
            .filters(FilterMap::new().with("category", "wood"))
            .order_by(OrderSpec::new().desc("name"))
            .limit(1)
            .offset(1);

        let unpaged = FindRequest {
            limit: None,
            offset: None,
            ..request.clone()
        };
        let all = finder.find(&unpaged).await.unwrap();
        assert_eq!(finder.count(&request).await.unwrap(), all.len() as i64);
    }

    #[tokio::test]
    async fn test_count_without_filters_is_total() {
        let finder = Finder::new(store());
        assert_eq!(finder.count(&processes()).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_negative_pagination_never_reaches_store() {
        let store = store();
        let finder = Finder::new(store.clone());

        let err = finder.find(&processes().limit(-1)).await.unwrap_err();
        assert!(err.is_invalid_query());
        let err = finder.find(&processes().offset(-5)).await.unwrap_err();
        assert!(err.is_invalid_query());
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_filter_key_never_reaches_store() {
        let store = store();
        let finder = Finder::new(store.clone());
        let request = processes().filters(FilterMap::new().with("name; DROP TABLE x", "a"));

        assert_err!(finder.find(&request).await);
        assert_err!(finder.count(&request).await);
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_undeclared_column_is_invalid() {
        let store = store();
        let finder = Finder::new(store.clone());
        let source = Source::with_columns("processes", ["id", "name"]).unwrap();
        let request = FindRequest::new(source).filters(FilterMap::new().with("category", "wood"));

        let err = finder.find(&request).await.unwrap_err();
        assert!(matches!(err, FinderError::InvalidQuery(_)));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_keywords_skip_store() {
        let store = store();
        let finder = Finder::new(store.clone());

        for input in ["", "   ", " ' "] {
            let rows = finder
                .search(&KeywordSearch::parse("name", input), processes())
                .await
                .unwrap();
            assert!(rows.is_empty());
            assert_eq!(rows.empty_reason(), Some(EmptyInput::NoKeywords));
        }
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_keywords_are_and_combined() {
        let finder = Finder::new(store());
        let rows = finder
            .search(&KeywordSearch::parse("name", "PLANK spruce"), processes())
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![1]);

        let rows = finder
            .search(&KeywordSearch::parse("name", "r*e"), processes())
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![1, 2, 4]);
    }

    #[tokio::test]
    async fn test_empty_input_is_not_invalid_query() {
        let finder = Finder::new(store());
        let empty = assert_ok!(finder.search(&KeywordSearch::new("name", Vec::<String>::new()), processes()).await);
        assert!(empty.empty_reason().is_some());

        let invalid = assert_err!(finder.find(&processes().limit(-1)).await);
        assert!(invalid.is_invalid_query());
    }

    #[tokio::test]
    async fn test_array_exclusion() {
        let finder = Finder::new(store());
        let request = processes()
            .condition(Condition::array_not_subset_of("phases", ["C3"]))
            .condition(Condition::array_not_subset_of("phases", ["D"]));

        let rows = finder.find(&request).await.unwrap();
        assert_eq!(ids(&rows), vec![3, 4]);
        for row in &rows {
            let phases = row.get("phases").and_then(Value::as_array).unwrap();
            assert!(!phases.iter().any(|p| p.as_str() == Some("C3") || p.as_str() == Some("D")));
        }
    }

    #[tokio::test]
    async fn test_array_inclusion() {
        let finder = Finder::new(store());
        let request = processes().filters(FilterMap::new().with(
            "phases",
            crate::FilterValue::SubsetOf(vec![Value::from("C3"), Value::from("D")]),
        ));
        assert_eq!(ids(&finder.find(&request).await.unwrap()), vec![5]);
    }

    #[tokio::test]
    async fn test_cache_hit_and_bypass() {
        let store = store();
        let finder = Finder::from_config(store.clone(), &FinderConfig::default());
        let request = processes().filters(FilterMap::new().with("category", "wood"));

        let first = finder.find(&request).await.unwrap();
        let second = finder.find(&request).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.calls(), 1);

        finder.find(&request.clone().bypass_cache(true)).await.unwrap();
        assert_eq!(store.calls(), 2);

        finder.count(&request).await.unwrap();
        finder.count(&request).await.unwrap();
        assert_eq!(store.calls(), 3);
    }

    #[tokio::test]
    async fn test_bypass_does_not_populate_cache() {
        let store = store();
        let finder = Finder::from_config(store.clone(), &FinderConfig::default());
        let request = processes();

        finder.find(&request.clone().bypass_cache(true)).await.unwrap();
        finder.find(&request).await.unwrap();
        assert_eq!(store.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_source() {
        let store = store();
        let finder = Finder::from_config(store.clone(), &FinderConfig::default());
        let request = processes();

        finder.find(&request).await.unwrap();
        assert_eq!(finder.invalidate_source(&request.source).await.unwrap(), 1);
        finder.find(&request).await.unwrap();
        assert_eq!(store.calls(), 2);
    }

    #[tokio::test]
    async fn test_store_errors_propagate_and_are_not_cached() {
        let store = store();
        let finder = Finder::from_config(store.clone(), &FinderConfig::default());
        store.fail_with(StoreError::new(StoreErrorKind::Connectivity, "connection refused"));

        let err = finder.find(&processes()).await.unwrap_err();
        assert_eq!(
            err.as_store_error().map(|e| e.kind()),
            Some(StoreErrorKind::Connectivity)
        );
        assert_eq!(store.calls(), 1);

        store.clear_failure();
        assert_eq!(finder.find(&processes()).await.unwrap().len(), 5);
        assert_eq!(store.calls(), 2);
    }

    #[tokio::test]
    async fn test_find_by_sql() {
        let sql = "SELECT id FROM processes WHERE category = $1";
        let store = Arc::new(
            MemoryStore::new().with_sql_result(sql, vec![Record::from_pairs([("id", 7)])]),
        );
        let finder = Finder::from_config(store.clone(), &FinderConfig::default());
        let sources = [Source::new("processes").unwrap()];

        let rows = finder
            .find_by_sql(&sources, sql, vec![Value::from("wood")], false)
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![7]);
        finder
            .find_by_sql(&sources, sql, vec![Value::from("wood")], false)
            .await
            .unwrap();
        assert_eq!(store.calls(), 1);

        let executed = store.executed_statements();
        assert_eq!(executed[0].params, vec![Value::from("wood")]);
    }

    #[tokio::test]
    async fn test_find_by_sql_placeholder_mismatch() {
        let store = Arc::new(MemoryStore::new());
        let finder = Finder::new(store.clone());
        let sources = [Source::new("processes").unwrap()];

        let err = finder
            .find_by_sql(&sources, "SELECT * FROM processes WHERE id = $1", vec![], false)
            .await
            .unwrap_err();
        assert!(err.is_invalid_query());

        let err = finder
            .find_by_sql(
                &sources,
                "SELECT * FROM processes WHERE id = $2",
                vec![Value::Int(1), Value::Int(2)],
                false,
            )
            .await
            .unwrap_err();
        assert!(err.is_invalid_query());

        let err = finder
            .find_by_sql(&[], "SELECT 1", vec![], false)
            .await
            .unwrap_err();
        assert!(err.is_invalid_query());
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_joined_sql_invalidated_by_each_source() {
        let sql = "SELECT p.id FROM processes p JOIN assignments a ON a.process_id = p.id";
        let store = Arc::new(
            MemoryStore::new().with_sql_result(sql, vec![Record::from_pairs([("id", 7)])]),
        );
        let finder = Finder::from_config(store.clone(), &FinderConfig::default());
        let processes = Source::new("processes").unwrap();
        let assignments = Source::new("assignments").unwrap();
        let sources = [processes.clone(), assignments.clone()];

        finder.find_by_sql(&sources, sql, vec![], false).await.unwrap();
        finder.find_by_sql(&sources, sql, vec![], false).await.unwrap();
        assert_eq!(store.calls(), 1);

        assert_eq!(finder.invalidate_source(&assignments).await.unwrap(), 1);
        finder.find_by_sql(&sources, sql, vec![], false).await.unwrap();
        assert_eq!(store.calls(), 2);

        assert_eq!(finder.invalidate_source(&processes).await.unwrap(), 1);
        finder.find_by_sql(&sources, sql, vec![], false).await.unwrap();
        assert_eq!(store.calls(), 3);
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_count_by_sql_span_fields() {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let sql = "SELECT count(*) FROM processes p JOIN assignments a ON a.process_id = p.id \
                   WHERE p.id = $1";
        let store = Arc::new(
            MemoryStore::new().with_sql_result(sql, vec![Record::from_pairs([("count", 1i64)])]),
        );
        let finder = Finder::new(store);
        let sources = [
            Source::new("processes").unwrap(),
            Source::new("assignments").unwrap(),
        ];

        assert_eq!(
            finder
                .count_by_sql(&sources, sql, vec![Value::from(7)], true)
                .await
                .unwrap(),
            1
        );

        let output = String::from_utf8(log.0.lock().clone()).unwrap();
        assert!(output.contains("count_by_sql"), "{}", output);
        assert!(output.contains("sources=processes,assignments"), "{}", output);
        assert!(output.contains("params=1"), "{}", output);
        assert!(output.contains("bypass_cache=true"), "{}", output);
    }

    #[tokio::test]
    async fn test_count_by_sql() {
        let sql = "SELECT count(*) AS counter FROM processes";
        let store = Arc::new(
            MemoryStore::new().with_sql_result(sql, vec![Record::from_pairs([("counter", 42i64)])]),
        );
        let finder = Finder::new(store);
        let sources = [Source::new("processes").unwrap()];

        assert_eq!(finder.count_by_sql(&sources, sql, vec![], false).await.unwrap(), 42);
        assert_eq!(
            finder
                .count_by_sql(&sources, "SELECT 1 WHERE false", vec![], false)
                .await
                .unwrap(),
            0
        );
    }
}
