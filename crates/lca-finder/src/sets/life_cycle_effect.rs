//! Life-cycle effect totals of the report cache.

use tracing::instrument;

use super::TableSet;
use crate::finder::Finder;
use crate::query::{FilterMap, FilterValue, OrderSpec, Pagination};
use crate::{EmptyInput, Result, ResultSet, Value};

pub const REPORT_LIFE_CYCLE_EFFECTS_VIEW: &str = "elca_cache.report_life_cycle_effects_v";

pub const LIFE_CYCLE_EFFECT_COLUMNS: &[&str] = &[
    "project_variant_id",
    "indicator_id",
    "name",
    "ident",
    "unit",
    "is_hidden",
    "indicator_p_order",
    "life_cycle_ident",
    "life_cycle_name",
    "life_cycle_phase",
    "life_cycle_p_order",
    "value",
];

#[derive(Debug, Clone)]
pub struct LifeCycleEffectSet {
    view: TableSet,
}

impl LifeCycleEffectSet {
    pub fn new(finder: Finder) -> Result<Self> {
        Ok(Self {
            view: TableSet::new(finder, REPORT_LIFE_CYCLE_EFFECTS_VIEW, LIFE_CYCLE_EFFECT_COLUMNS)?,
        })
    }

    pub fn bypass_cache(self, bypass: bool) -> Self {
        Self {
            view: self.view.bypass_cache(bypass),
        }
    }

    /// Total effects of a project variant for the given life-cycle idents,
    /// in life-cycle then indicator order.
    #[instrument(skip(self, idents), fields(idents = idents.len()))]
    pub async fn find_total_effects_per_life_cycle_filtered<S: AsRef<str>>(
        &self,
        project_variant_id: i32,
        idents: &[S],
    ) -> Result<ResultSet> {
        if idents.is_empty() {
            return Ok(ResultSet::empty(EmptyInput::NoIdents));
        }

        let idents = idents.iter().map(|i| Value::from(i.as_ref())).collect();
        let filters = FilterMap::new()
            .with("project_variant_id", project_variant_id)
            .with("ident", FilterValue::In(idents));
        let order = OrderSpec::new()
            .asc("life_cycle_p_order")
            .asc("indicator_p_order");

        self.view.find(filters, order, Pagination::default()).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::sets::testing::finder;
    use crate::{MemoryStore, PgRenderer, Record, Renderer};

    fn effect(variant: i32, ident: &str, lc_order: i32, indicator_order: i32) -> Record {
        Record::from_pairs([
            ("project_variant_id", Value::Int(variant)),
            ("ident", Value::from(ident)),
            ("life_cycle_p_order", Value::Int(lc_order)),
            ("indicator_p_order", Value::Int(indicator_order)),
        ])
    }

    #[tokio::test]
    async fn test_filtered_and_ordered() {
        let store = Arc::new(MemoryStore::new().with_table(
            REPORT_LIFE_CYCLE_EFFECTS_VIEW,
            vec![
                effect(1, "C3", 30, 2),
                effect(1, "A1-3", 10, 2),
                effect(1, "A1-3", 10, 1),
                effect(1, "D", 40, 1),
                effect(2, "A1-3", 10, 1),
            ],
        ));
        let set = LifeCycleEffectSet::new(finder(&store)).unwrap();

        let rows = set
            .find_total_effects_per_life_cycle_filtered(1, &["A1-3", "C3"])
            .await
            .unwrap();
        let order: Vec<_> = rows
            .iter()
            .map(|r| (r.get_str("ident").unwrap().to_string(), r.get_i64("indicator_p_order").unwrap()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("A1-3".to_string(), 1),
                ("A1-3".to_string(), 2),
                ("C3".to_string(), 2),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_idents() {
        let store = Arc::new(MemoryStore::new());
        let set = LifeCycleEffectSet::new(finder(&store)).unwrap();

        let rows = set
            .find_total_effects_per_life_cycle_filtered::<&str>(1, &[])
            .await
            .unwrap();
        assert_eq!(rows.empty_reason(), Some(EmptyInput::NoIdents));
        assert_eq!(store.calls(), 0);
    }

    #[test]
    fn test_each_ident_is_bound() {
        let set = LifeCycleEffectSet::new(Finder::new(Arc::new(MemoryStore::new()))).unwrap();
        let request = set
            .view
            .request(FilterMap::new().with(
                "ident",
                FilterValue::In(vec![Value::from("A1-3"), Value::from("C3"), Value::from("D")]),
            ));
        let statement = PgRenderer.render_select(&request.to_query()).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT * FROM \"elca_cache\".\"report_life_cycle_effects_v\" WHERE \"ident\" IN ($1, $2, $3)"
        );
        assert_eq!(statement.params.len(), 3);
    }
}
