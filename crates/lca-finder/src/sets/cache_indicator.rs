//! Cached indicator values.

use super::TableSet;
use crate::finder::Finder;
use crate::query::{FilterMap, OrderSpec, Pagination};
use crate::source::Source;
use crate::{Result, ResultSet, Value};

pub const CACHE_INDICATORS: &str = "elca_cache.indicators";
/// Cached indicators with project and item context
pub const CACHE_INDICATORS_VIEW: &str = "elca_cache.indicators_v";
pub const INDICATORS: &str = "elca.indicators";

pub const CACHE_INDICATOR_COLUMNS: &[&str] = &[
    "item_id",
    "life_cycle_ident",
    "indicator_id",
    "process_id",
    "value",
    "ratio",
    "is_partial",
];

/// Life-cycle ident of the aggregated total
const LIFE_CYCLE_TOTAL: &str = "total";
/// Production modules that may be stored separately instead of as A1-3
const PRODUCTION_MODULES: [&str; 3] = ["A1", "A2", "A3"];
/// Global warming potential
const INDICATOR_GWP: &str = "gwp";
/// Cache item type of project variant totals
const ITEM_TYPE_PROJECT_VARIANT: &str = "Elca\\Db\\ElcaCacheProjectVariant";

#[derive(Debug, Clone)]
pub struct CacheIndicatorSet {
    table: TableSet,
    view: Source,
    indicators: Source,
}

impl CacheIndicatorSet {
    pub fn new(finder: Finder) -> Result<Self> {
        Ok(Self {
            table: TableSet::new(finder, CACHE_INDICATORS, CACHE_INDICATOR_COLUMNS)?,
            view: Source::new(CACHE_INDICATORS_VIEW)?,
            indicators: Source::new(INDICATORS)?,
        })
    }

    pub fn bypass_cache(self, bypass: bool) -> Self {
        Self {
            table: self.table.bypass_cache(bypass),
            ..self
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

    pub async fn count(&self, filters: FilterMap) -> Result<i64> {
        self.table.count(filters).await
    }

    /// Non-zero when some item of the project has more than one GWP total.
    pub async fn count_duplicate_totals(&self, project_id: i32) -> Result<i64> {
        if project_id == 0 {
            return Ok(0);
        }

        let sql = format!(
            "SELECT count(*) AS counter FROM {} ci \
             JOIN {} i ON i.id = ci.indicator_id \
             WHERE ci.life_cycle_ident = $1 AND i.ident = $2 AND ci.project_id = $3 \
             GROUP BY ci.item_id, ci.life_cycle_ident \
             HAVING count(*) > 1 \
             LIMIT 1",
            self.view.quoted(),
            self.indicators.quoted()
        );
        self.table
            .count_by_sql(
                &[&self.view, &self.indicators],
                &sql,
                vec![
                    Value::from(LIFE_CYCLE_TOTAL),
                    Value::from(INDICATOR_GWP),
                    Value::Int(project_id),
                ],
            )
            .await
    }

    /// Number of complete GWP project-variant totals of the project stored
    /// per production module (A1, A2 or A3) rather than as A1-3.
    pub async fn count_a1_a2_or_a3_totals(&self, project_id: i32) -> Result<i64> {
        if project_id == 0 {
            return Ok(0);
        }

        let sql = format!(
            "SELECT count(*) AS counter FROM {} ci \
             JOIN {} i ON i.id = ci.indicator_id \
             WHERE ci.life_cycle_ident IN ($1, $2, $3) \
             AND ci.type = $4 AND i.ident = $5 \
             AND ci.is_partial = false AND ci.project_id = $6",
            self.view.quoted(),
            self.indicators.quoted()
        );
        let mut params: Vec<Value> = PRODUCTION_MODULES.iter().map(|m| Value::from(*m)).collect();
        params.extend([
            Value::from(ITEM_TYPE_PROJECT_VARIANT),
            Value::from(INDICATOR_GWP),
            Value::Int(project_id),
        ]);
        self.table
            .count_by_sql(&[&self.view, &self.indicators], &sql, params)
            .await
    }
}
