//! Benchmark thresholds.

use super::TableSet;
use crate::finder::Finder;
use crate::query::{FilterMap, OrderSpec, Pagination};
use crate::{Result, ResultSet};

pub const BENCHMARK_THRESHOLDS: &str = "elca.benchmark_thresholds";
/// Thresholds joined with their indicator ident
pub const BENCHMARK_THRESHOLDS_VIEW: &str = "elca.benchmark_thresholds_v";

pub const BENCHMARK_THRESHOLD_COLUMNS: &[&str] =
    &["id", "benchmark_version_id", "indicator_id", "score", "value"];

#[derive(Debug, Clone)]
pub struct BenchmarkThresholdSet {
    table: TableSet,
    view: TableSet,
}

impl BenchmarkThresholdSet {
    pub fn new(finder: Finder) -> Result<Self> {
        let mut view_columns = BENCHMARK_THRESHOLD_COLUMNS.to_vec();
        view_columns.push("indicator_ident");

        Ok(Self {
            table: TableSet::new(finder.clone(), BENCHMARK_THRESHOLDS, BENCHMARK_THRESHOLD_COLUMNS)?,
            view: TableSet::new(finder, BENCHMARK_THRESHOLDS_VIEW, &view_columns)?,
        })
    }

    pub fn bypass_cache(self, bypass: bool) -> Self {
        Self {
            table: self.table.bypass_cache(bypass),
            view: self.view.bypass_cache(bypass),
        }
    }

    pub async fn find(
        &self,
        filters: FilterMap,
        order: OrderSpec,
        page: Pagination,
    ) -> Result<ResultSet> {
        self.table.find(filters, order, page).await
    }

    /// Like [`find`](Self::find), with the `indicator_ident` column available.
    pub async fn find_with_ident(
        &self,
        filters: FilterMap,
        order: OrderSpec,
        page: Pagination,
    ) -> Result<ResultSet> {
        self.view.find(filters, order, page).await
    }

    pub async fn count(&self, filters: FilterMap) -> Result<i64> {
        self.table.count(filters).await
    }

    pub async fn find_by_version_id_and_indicator_id(
        &self,
        version_id: i32,
        indicator_id: Option<i32>,
        order: OrderSpec,
        page: Pagination,
    ) -> Result<ResultSet> {
        let mut filters = FilterMap::new().with("benchmark_version_id", version_id);
        if let Some(id) = indicator_id {
            filters.insert("indicator_id", id);
        }
        self.find(filters, order, page).await
    }

    pub async fn find_by_version_id_and_indicator_ident(
        &self,
        version_id: i32,
        indicator_ident: Option<&str>,
        order: OrderSpec,
        page: Pagination,
    ) -> Result<ResultSet> {
        let mut filters = FilterMap::new().with("benchmark_version_id", version_id);
        if let Some(ident) = indicator_ident.filter(|i| !i.is_empty()) {
            filters.insert("indicator_ident", ident);
        }
        self.find_with_ident(filters, order, page).await
    }
}
