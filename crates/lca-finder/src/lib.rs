//! Parameterized dynamic finder for the LCA relational store.
//!
//! This crate retrieves records from the life-cycle-assessment PostgreSQL
//! database by structured criteria instead of hand-concatenated SQL:
//!
//! - Filters, ordering and pagination are described as data
//!   ([`FilterMap`], [`OrderSpec`], [`Pagination`])
//! - Conditions form a typed tree ([`Condition`]) rendered by a
//!   backend-specific [`Renderer`] into a [`Statement`] with bound parameters
//! - Invalid requests fail with [`FinderError::InvalidQuery`] before any
//!   store or cache access
//! - Results may be served from a read-through [`QueryCache`]
//!
//! # Architecture
//!
//! ```text
//!   Entity sets (sets::ProcessConfigSet, ...)
//!           |
//!        Finder  ----  QueryCache (InMemoryQueryCache)
//!           |
//!     RecordStore (PgStore | MemoryStore)
//!           |
//!         SQLx (PostgreSQL driver)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use lca_finder::{DatabaseConfig, FilterMap, FindRequest, Finder, FinderConfig, OrderSpec, Source};
//!
//! # async fn example() -> lca_finder::Result<()> {
//! let finder = Finder::connect(&DatabaseConfig::from_env()?, &FinderConfig::from_env()?).await?;
//!
//! let request = FindRequest::new(Source::new("elca.process_configs")?)
//!     .filters(FilterMap::new().with("process_category_node_id", 42))
//!     .order_by(OrderSpec::new().asc("name"))
//!     .limit(20);
//!
//! let rows = finder.find(&request).await?;
//! let total = finder.count(&request).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Empty inputs
//!
//! Some inputs can never match anything, e.g. a keyword search without
//! keywords. These return an empty [`ResultSet`] whose
//! [`empty_reason`](ResultSet::empty_reason) names the [`EmptyInput`], and
//! no statement is issued. They are not errors.

pub mod cache;
pub mod config;
pub mod connection;
pub mod finder;
pub mod query;
pub mod record;
pub mod sets;
pub mod source;
pub mod store;
pub mod types;

pub use lca_common::{FinderError, Result, StoreError, StoreErrorKind};

pub use cache::{CacheKey, CachedValue, InMemoryQueryCache, QueryCache, QueryKind};
pub use config::FinderConfig;
pub use connection::{Connection, DatabaseConfig, PoolConfig};
pub use finder::{FindRequest, Finder};
pub use query::{
    Condition, FilterMap, FilterValue, KeywordSearch, OrderDirection, OrderSpec, Pagination,
    PgRenderer, Renderer, SelectQuery, Statement,
};
pub use record::{EmptyInput, Record, ResultSet};
pub use sets::{
    BenchmarkThresholdSet, CacheIndicatorSet, CategoryQuery, FinalEnergyQuery, KeywordQuery,
    LifeCycleEffectSet, ProcessConfigSanitySet, ProcessConfigSearchSet, ProcessConfigSet,
    ProcessSet,
};
pub use source::Source;
pub use store::{MemoryStore, PgStore, RecordStore};
pub use types::Value;
