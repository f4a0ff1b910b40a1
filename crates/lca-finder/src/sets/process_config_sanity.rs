//! Sanity-check findings on process configurations.

use tracing::instrument;

use super::process_config::{PROCESS_ASSIGNMENTS_VIEW, PROCESS_CONFIGS, PROCESS_DBS};
use super::TableSet;
use crate::finder::Finder;
use crate::source::Source;
use crate::{Result, ResultSet};

pub const PROCESS_CONFIG_SANITIES: &str = "elca.process_config_sanities";
pub const PROCESS_CATEGORIES: &str = "elca.process_categories";

pub const PROCESS_CONFIG_SANITY_COLUMNS: &[&str] = &[
    "id",
    "process_config_id",
    "status",
    "process_db_id",
    "details",
    "is_false_positive",
    "created",
    "modified",
];

/// Finder for `elca.process_config_sanities`.
///
/// Each row combines a finding with its configuration, category reference
/// number and database name, plus two aggregated arrays: `epd_types` (EPD
/// types of the production phase) and `epd_modules` (life-cycle modules).
#[derive(Debug, Clone)]
pub struct ProcessConfigSanitySet {
    table: TableSet,
    process_configs: Source,
    categories: Source,
    assignments: Source,
    process_dbs: Source,
}

impl ProcessConfigSanitySet {
    pub fn new(finder: Finder) -> Result<Self> {
        Ok(Self {
            table: TableSet::new(finder, PROCESS_CONFIG_SANITIES, PROCESS_CONFIG_SANITY_COLUMNS)?,
            process_configs: Source::new(PROCESS_CONFIGS)?,
            categories: Source::new(PROCESS_CATEGORIES)?,
            assignments: Source::new(PROCESS_ASSIGNMENTS_VIEW)?,
            process_dbs: Source::new(PROCESS_DBS)?,
        })
    }

    pub fn bypass_cache(self, bypass: bool) -> Self {
        Self {
            table: self.table.bypass_cache(bypass),
            ..self
        }
    }

    /// All findings, newest database first. False positives are left out
    /// unless `include_false_positives` is set.
    #[instrument(skip(self))]
    pub async fn find(&self, include_false_positives: bool) -> Result<ResultSet> {
        let filter = if include_false_positives {
            ""
        } else {
            " WHERE s.is_false_positive = false"
        };

        let sql = format!(
            "SELECT pc.id AS process_config_id, c.ref_num, pc.name, d.name AS process_db_name, \
             s.id, s.status, s.is_false_positive, pc.is_reference, \
             array_agg(DISTINCT p.epd_type) FILTER (WHERE p.epd_type IS NOT NULL AND p.life_cycle_phase = 'prod') AS epd_types, \
             array_agg(DISTINCT p.life_cycle_name) AS epd_modules \
             FROM {} s \
             JOIN {} pc ON pc.id = s.process_config_id \
             JOIN {} c ON c.node_id = pc.process_category_node_id \
             LEFT JOIN {} p ON p.process_config_id = pc.id \
             AND (s.process_db_id IS NULL OR s.process_db_id = p.process_db_id) \
             LEFT JOIN {} d ON d.id = s.process_db_id{} \
             GROUP BY pc.id, c.ref_num, pc.name, d.name, s.id, s.status, s.is_false_positive \
             ORDER BY d.name DESC, c.ref_num, pc.name, s.id",
            self.table.source().quoted(),
            self.process_configs.quoted(),
            self.categories.quoted(),
            self.assignments.quoted(),
            self.process_dbs.quoted(),
            filter
        );
        let joined = [
            &self.process_configs,
            &self.categories,
            &self.assignments,
            &self.process_dbs,
        ];
        self.table.find_by_sql(&joined, &sql, Vec::new()).await
    }
}
