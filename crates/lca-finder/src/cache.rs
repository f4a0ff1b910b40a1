//! Read-through result cache.
//!
//! Keys are SHA-256 digests over the query kind, the sources and the
//! rendered statement, so two calls share an entry exactly when they would
//! send the same SQL with the same parameters. Entries are tagged with
//! every source they read for source-wide invalidation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::query::Statement;
use crate::{Result, ResultSet};

/// What a cached call returned.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Rows(ResultSet),
    Count(i64),
}

/// Kind of finder call a key was computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Find,
    Count,
    Sql,
}

impl QueryKind {
    fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Find => "find",
            QueryKind::Count => "count",
            QueryKind::Sql => "sql",
        }
    }
}

/// Cache key: hex digest plus every source the statement reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    digest: String,
    sources: Vec<String>,
}

impl CacheKey {
    pub fn new(kind: QueryKind, source: &str, statement: &Statement) -> Self {
        Self::joined(kind, &[source], statement)
    }

    /// Key for a statement reading several sources; invalidating any one
    /// of them evicts the entry.
    pub fn joined(kind: QueryKind, sources: &[&str], statement: &Statement) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_str().as_bytes());
        for source in sources {
            hasher.update([0u8]);
            hasher.update(source.as_bytes());
        }
        hasher.update([1u8]);
        hasher.update(statement.sql.as_bytes());
        for param in &statement.params {
            hasher.update([0u8]);
            hasher.update(param.fingerprint().as_bytes());
        }

        let digest = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<String>();

        Self {
            digest,
            sources: sources.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }
}

/// Storage backend for cached finder results.
#[async_trait]
pub trait QueryCache: Send + Sync + 'static {
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedValue>>;

    async fn put(&self, key: CacheKey, value: CachedValue) -> Result<()>;

    async fn invalidate(&self, key: &CacheKey) -> Result<()>;

    /// Drops every entry reading `source`; returns how many were removed.
    async fn invalidate_source(&self, source: &str) -> Result<usize>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    sources: Vec<String>,
    value: CachedValue,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory cache (thread-safe, per process).
#[derive(Debug, Clone)]
pub struct InMemoryQueryCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    ttl: Option<Duration>,
    max_entries: Option<usize>,
}

impl InMemoryQueryCache {
    /// Creates an unbounded cache without expiry.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl: None,
            max_entries: None,
        }
    }

    /// Create with a time-to-live for all entries
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::new()
        }
    }

    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    /// Number of entries (including expired ones not yet evicted).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes expired entries; returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(removed = removed, "Cleaned up expired cache entries");
        }
        removed
    }

    fn make_room(&self) {
        let Some(max) = self.max_entries else {
            return;
        };
        if self.entries.len() < max {
            return;
        }
        self.cleanup();
        if self.entries.len() < max {
            return;
        }
        // Still full: evict the entry closest to expiry (or any entry without TTL)
        let victim = self
            .entries
            .iter()
            .min_by_key(|e| e.value().expires_at)
            .map(|e| e.key().clone());
        if let Some(key) = victim {
            self.entries.remove(&key);
        }
    }
}

impl Default for InMemoryQueryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryCache for InMemoryQueryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedValue>> {
        let Some(entry) = self.entries.get(key.digest()) else {
            return Ok(None);
        };
        if entry.is_expired() {
            drop(entry);
            self.entries.remove(key.digest());
            return Ok(None);
        }
        Ok(Some(entry.value().value.clone()))
    }

    async fn put(&self, key: CacheKey, value: CachedValue) -> Result<()> {
        if self.max_entries == Some(0) {
            return Ok(());
        }
        self.make_room();
        let entry = CacheEntry {
            sources: key.sources,
            value,
            expires_at: self.ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.insert(key.digest, entry);
        Ok(())
    }

    async fn invalidate(&self, key: &CacheKey) -> Result<()> {
        self.entries.remove(key.digest());
        Ok(())
    }

    async fn invalidate_source(&self, source: &str) -> Result<usize> {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.sources.iter().any(|s| s == source));
        let removed = before.saturating_sub(self.entries.len());
        tracing::debug!(source = source, removed = removed, "Invalidated cached results");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    fn statement(value: &str) -> Statement {
        Statement::new(
            "SELECT * FROM \"processes\" WHERE \"category\" = $1",
            vec![Value::from(value)],
        )
    }

    #[test]
    fn test_key_depends_on_every_part() {
        let base = CacheKey::new(QueryKind::Find, "processes", &statement("wood"));
        assert_eq!(base, CacheKey::new(QueryKind::Find, "processes", &statement("wood")));
        assert_ne!(base, CacheKey::new(QueryKind::Count, "processes", &statement("wood")));
        assert_ne!(base, CacheKey::new(QueryKind::Find, "materials", &statement("wood")));
        assert_ne!(base, CacheKey::new(QueryKind::Find, "processes", &statement("steel")));
        assert_eq!(base.digest().len(), 64);
    }

    #[test]
    fn test_key_distinguishes_param_types() {
        let a = CacheKey::new(QueryKind::Sql, "t", &Statement::new("SELECT $1", vec![Value::Int(1)]));
        let b = CacheKey::new(QueryKind::Sql, "t", &Statement::new("SELECT $1", vec![Value::from("1")]));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_put_get_invalidate() {
        let cache = InMemoryQueryCache::new();
        let key = CacheKey::new(QueryKind::Count, "processes", &statement("wood"));

        assert_eq!(cache.get(&key).await.unwrap(), None);
        cache.put(key.clone(), CachedValue::Count(3)).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(CachedValue::Count(3)));

        cache.invalidate(&key).await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_source() {
        let cache = InMemoryQueryCache::new();
        let a = CacheKey::new(QueryKind::Count, "processes", &statement("wood"));
        let b = CacheKey::new(QueryKind::Count, "processes", &statement("steel"));
        let c = CacheKey::new(QueryKind::Count, "materials", &statement("wood"));
        for key in [a, b, c.clone()] {
            cache.put(key, CachedValue::Count(1)).await.unwrap();
        }

        assert_eq!(cache.invalidate_source("processes").await.unwrap(), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&c).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_joined_entry_evicted_by_any_source() {
        let cache = InMemoryQueryCache::new();
        let joined = CacheKey::joined(
            QueryKind::Sql,
            &["elca.process_configs", "elca.process_assignments_v"],
            &statement("wood"),
        );
        assert_eq!(joined.sources().len(), 2);
        assert_ne!(
            joined,
            CacheKey::new(QueryKind::Sql, "elca.process_configs", &statement("wood"))
        );

        cache.put(joined.clone(), CachedValue::Count(1)).await.unwrap();
        assert_eq!(cache.invalidate_source("elca.processes").await.unwrap(), 0);
        assert_eq!(
            cache.invalidate_source("elca.process_assignments_v").await.unwrap(),
            1
        );
        assert_eq!(cache.get(&joined).await.unwrap(), None);

        cache.put(joined.clone(), CachedValue::Count(1)).await.unwrap();
        assert_eq!(cache.invalidate_source("elca.process_configs").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() {
        let cache = InMemoryQueryCache::with_ttl(Duration::from_millis(10));
        let key = CacheKey::new(QueryKind::Count, "processes", &statement("wood"));
        cache.put(key.clone(), CachedValue::Count(3)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get(&key).await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_max_entries_bound() {
        let cache = InMemoryQueryCache::new().max_entries(2);
        for name in ["a", "b", "c", "d"] {
            let key = CacheKey::new(QueryKind::Count, "processes", &statement(name));
            cache.put(key, CachedValue::Count(1)).await.unwrap();
        }
        assert_eq!(cache.len(), 2);
    }
}
