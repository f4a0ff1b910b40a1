//! Processes and their assignments to process configurations.

use super::process_config::PROCESS_ASSIGNMENTS_VIEW;
use super::TableSet;
use crate::finder::Finder;
use crate::query::{FilterMap, FilterValue, OrderSpec, Pagination};
use crate::{EmptyInput, Result, ResultSet, Value};

pub const PROCESSES: &str = "elca.processes";
/// Processes with their configuration assignment and life-cycle names
pub const PROCESSES_VIEW: &str = "elca.processes_v";

pub const PROCESS_COLUMNS: &[&str] = &[
    "id",
    "process_db_id",
    "process_category_node_id",
    "name",
    "name_orig",
    "uuid",
    "version",
    "date_of_last_revision",
    "life_cycle_ident",
    "ref_value",
    "ref_unit",
    "scenario_id",
    "description",
    "epd_type",
    "created",
    "modified",
];

/// Assignment columns both views add to [`PROCESS_COLUMNS`]
const ASSIGNMENT_COLUMNS: &[&str] = &[
    "process_life_cycle_assignment_id",
    "process_config_id",
    "ratio",
    "life_cycle_name",
    "life_cycle_phase",
    "process_category_node_name",
];

fn view_columns(extra: &[&'static str]) -> Vec<&'static str> {
    PROCESS_COLUMNS
        .iter()
        .chain(ASSIGNMENT_COLUMNS)
        .chain(extra)
        .copied()
        .collect()
}

/// Finder for `elca.processes`, with the extended and assignment views.
#[derive(Debug, Clone)]
pub struct ProcessSet {
    table: TableSet,
    extended: TableSet,
    assignments: TableSet,
}

impl ProcessSet {
    pub fn new(finder: Finder) -> Result<Self> {
        Ok(Self {
            table: TableSet::new(finder.clone(), PROCESSES, PROCESS_COLUMNS)?,
            extended: TableSet::new(finder.clone(), PROCESSES_VIEW, &view_columns(&[]))?,
            assignments: TableSet::new(
                finder,
                PROCESS_ASSIGNMENTS_VIEW,
                &view_columns(&["geographical_representativeness"]),
            )?,
        })
    }

    pub fn bypass_cache(self, bypass: bool) -> Self {
        Self {
            table: self.table.bypass_cache(bypass),
            extended: self.extended.bypass_cache(bypass),
            assignments: self.assignments.bypass_cache(bypass),
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

    /// Like [`find`](Self::find), over `elca.processes_v` with the
    /// assignment columns available.
    pub async fn find_extended(
        &self,
        filters: FilterMap,
        order: OrderSpec,
        page: Pagination,
    ) -> Result<ResultSet> {
        self.extended.find(filters, order, page).await
    }

    /// Assignments of one configuration; `filters` narrows them further.
    pub async fn find_by_process_config_id(
        &self,
        process_config_id: i32,
        mut filters: FilterMap,
        order: OrderSpec,
    ) -> Result<ResultSet> {
        if process_config_id == 0 {
            return Ok(ResultSet::empty(EmptyInput::MissingKey));
        }
        filters.insert("process_config_id", process_config_id);
        self.assignments.find(filters, order, Pagination::default()).await
    }

    pub async fn count_by_process_config_id(
        &self,
        process_config_id: i32,
        mut filters: FilterMap,
    ) -> Result<i64> {
        filters.insert("process_config_id", process_config_id);
        self.assignments.count(filters).await
    }

    /// Assignments of a configuration in one database covering any of
    /// `phases`. Without phases nothing can match.
    pub async fn count_by_process_db_and_config_and_phases<S: AsRef<str>>(
        &self,
        process_db_id: i32,
        process_config_id: i32,
        phases: &[S],
    ) -> Result<i64> {
        if phases.is_empty() {
            return Ok(0);
        }
        let phases = phases.iter().map(|p| Value::from(p.as_ref())).collect();
        let filters = FilterMap::new()
            .with("process_db_id", process_db_id)
            .with("process_config_id", process_config_id)
            .with("life_cycle_phase", FilterValue::In(phases));
        self.assignments.count(filters).await
    }
}
