//! sqlx-backed store.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPool};
use tracing::{debug, instrument, warn};

use super::RecordStore;
use crate::connection::Connection;
use crate::query::{PgRenderer, Renderer, SelectQuery, Statement};
use crate::{FinderError, Record, Result};

/// Executes rendered statements against a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    renderer: PgRenderer,
    slow_query_threshold_ms: u64,
}

impl PgStore {
    pub fn new(connection: &Connection) -> Self {
        Self::from_pool(connection.pool().clone())
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            renderer: PgRenderer,
            slow_query_threshold_ms: 1000,
        }
    }

    pub fn with_slow_query_threshold(mut self, threshold_ms: u64) -> Self {
        self.slow_query_threshold_ms = threshold_ms;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn arguments(statement: &Statement) -> Result<PgArguments> {
        let mut args = PgArguments::default();
        for param in &statement.params {
            param.bind_to_arguments(&mut args)?;
        }
        Ok(args)
    }

    async fn run(&self, statement: &Statement) -> Result<Vec<Record>> {
        let args = Self::arguments(statement)?;
        let start = Instant::now();

        let rows = sqlx::query_with(&statement.sql, args)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.failed(statement, start.elapsed(), e))?;

        self.log_query_completion(statement, start.elapsed(), rows.len());
        rows.iter().map(Record::from_sqlx).collect()
    }

    fn failed(&self, statement: &Statement, elapsed: Duration, err: sqlx::Error) -> FinderError {
        let err = FinderError::from(err);
        warn!(
            sql = %statement.preview(),
            elapsed_ms = elapsed.as_millis() as u64,
            error = %err,
            "Query failed"
        );
        err
    }

    fn log_query_completion(&self, statement: &Statement, elapsed: Duration, rows: usize) {
        let elapsed_ms = elapsed.as_millis() as u64;

        if elapsed_ms >= self.slow_query_threshold_ms {
            warn!(
                sql = %statement.preview(),
                elapsed_ms = elapsed_ms,
                threshold_ms = self.slow_query_threshold_ms,
                rows = rows,
                "Slow query detected"
            );
        } else {
            debug!(
                sql = %statement.preview(),
                elapsed_ms = elapsed_ms,
                rows = rows,
                "Query completed"
            );
        }
    }
}

#[async_trait]
impl RecordStore for PgStore {
    #[instrument(skip(self, query), fields(source = %query.source))]
    async fn fetch(&self, query: &SelectQuery) -> Result<Vec<Record>> {
        let statement = self.renderer.render_select(query)?;
        self.run(&statement).await
    }

    #[instrument(skip(self, query), fields(source = %query.source))]
    async fn count(&self, query: &SelectQuery) -> Result<i64> {
        let statement = self.renderer.render_count(query)?;
        let args = Self::arguments(&statement)?;
        let start = Instant::now();

        let count: i64 = sqlx::query_scalar_with(&statement.sql, args)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| self.failed(&statement, start.elapsed(), e))?;

        self.log_query_completion(&statement, start.elapsed(), 1);
        Ok(count)
    }

    #[instrument(skip(self, statement), fields(sql_preview = %statement.preview()))]
    async fn fetch_raw(&self, statement: &Statement) -> Result<Vec<Record>> {
        self.run(statement).await
    }
}
