//! Record stores: the backing collaborators a finder reads from.
//!
//! [`PgStore`] renders queries to PostgreSQL and executes them through a
//! sqlx pool. [`MemoryStore`] evaluates the same condition tree over
//! in-process tables and counts every call, which makes "no store call was
//! issued" observable in tests.

use async_trait::async_trait;

use crate::query::{SelectQuery, Statement};
use crate::{Record, Result};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Read access to a relational store.
///
/// Implementations report backend failures as
/// [`FinderError::Store`](crate::FinderError::Store) and never retry them.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Fetch the rows selected by `query`, in the query's order.
    async fn fetch(&self, query: &SelectQuery) -> Result<Vec<Record>>;

    /// Count the rows matching `query` (ordering and pagination ignored).
    async fn count(&self, query: &SelectQuery) -> Result<i64>;

    /// Execute a hand-written, already parameterized statement.
    async fn fetch_raw(&self, statement: &Statement) -> Result<Vec<Record>>;
}
