//! Keyword search over process configurations.

use tracing::instrument;

use super::process_config::{ELEMENTS, ELEMENT_COMPONENTS, PROCESS_ASSIGNMENTS_VIEW, PROCESS_DBS};
use super::{Clauses, TableSet};
use crate::finder::Finder;
use crate::query::{Condition, KeywordSearch};
use crate::source::Source;
use crate::{EmptyInput, Result, ResultSet};

pub const PROCESS_CONFIG_SEARCH_VIEW: &str = "elca.process_config_search_v";
pub const PROCESS_CONVERSIONS: &str = "elca.process_conversions";
pub const PROCESS_CONFIG_ATTRIBUTES: &str = "elca.process_config_attributes";

/// Columns of the search view the queries rely on
pub const PROCESS_CONFIG_SEARCH_COLUMNS: &[&str] = &[
    "id",
    "name",
    "process_category_node_id",
    "process_category_node_name",
    "is_reference",
    "is_stale",
    "process_db_ids",
    "epd_types",
];

/// Attribute marking configurations that operate as an energy supply
const ATTRIBUTE_OP_AS_SUPPLY: &str = "op.asSupply";

/// Criteria for [`ProcessConfigSearchSet::find_by_keywords`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordQuery {
    pub keywords: Vec<String>,
    /// Input unit; a comma separated value matches any of the listed units.
    pub in_unit: Option<String>,
    pub reference_only: bool,
    /// Process databases; a configuration matches when it has data in any of them.
    pub process_db_ids: Vec<i32>,
    pub epd_sub_type: Option<String>,
    /// EPD types the configuration must all provide.
    pub required_epd_types: Vec<String>,
    /// EPD types the configuration must not provide, one check per type.
    pub excluded_epd_types: Vec<String>,
    /// Only configurations used by elements of this project variant.
    pub project_variant_id: Option<i32>,
}

impl KeywordQuery {
    pub fn new(keywords: &str) -> Self {
        Self {
            keywords: keywords.split_whitespace().map(String::from).collect(),
            ..Default::default()
        }
    }

    pub fn in_unit(mut self, unit: impl Into<String>) -> Self {
        self.in_unit = Some(unit.into());
        self
    }

    pub fn reference_only(mut self, reference_only: bool) -> Self {
        self.reference_only = reference_only;
        self
    }

    pub fn process_db_ids(mut self, ids: impl IntoIterator<Item = i32>) -> Self {
        self.process_db_ids = ids.into_iter().collect();
        self
    }

    pub fn epd_sub_type(mut self, epd_type: impl Into<String>) -> Self {
        self.epd_sub_type = Some(epd_type.into());
        self
    }

    pub fn require_epd_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_epd_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude_epd_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_epd_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn project_variant_id(mut self, id: i32) -> Self {
        self.project_variant_id = Some(id);
        self
    }

    fn unit_condition(&self) -> Option<Condition> {
        let unit = self.in_unit.as_deref()?.trim();
        if unit.is_empty() {
            return None;
        }
        if unit.contains(',') {
            let units: Vec<&str> = unit
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .collect();
            if units.is_empty() {
                return None;
            }
            Some(Condition::is_in("c.in_unit", units))
        } else {
            Some(Condition::equals("c.in_unit", unit))
        }
    }

    fn conditions(&self) -> Option<Vec<Condition>> {
        let mut conditions = vec![KeywordSearch::new("p.name", self.keywords.iter().cloned()).to_condition()?];

        if let Some(unit) = self.unit_condition() {
            conditions.push(unit);
        }
        if self.reference_only {
            conditions.push(Condition::equals("p.is_reference", true));
        }
        if !self.process_db_ids.is_empty() {
            conditions.push(Condition::array_overlaps(
                "p.process_db_ids",
                self.process_db_ids.iter().copied(),
            ));
        }
        if let Some(epd_type) = &self.epd_sub_type {
            conditions.push(Condition::any_equals("p.epd_types", epd_type.as_str()));
        }
        if !self.required_epd_types.is_empty() {
            conditions.push(Condition::array_subset_of(
                "p.epd_types",
                self.required_epd_types.iter().cloned(),
            ));
        }
        for excluded in &self.excluded_epd_types {
            conditions.push(Condition::array_not_subset_of(
                "p.epd_types",
                [excluded.as_str()],
            ));
        }
        Some(conditions)
    }
}

/// Criteria for [`ProcessConfigSearchSet::find_final_energy_supplies_by_keywords`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinalEnergyQuery {
    pub keywords: Vec<String>,
    pub in_unit: Option<String>,
    pub reference_only: bool,
    /// Only configurations with data in an active process database.
    pub active_processes_only: bool,
}

impl FinalEnergyQuery {
    pub fn new(keywords: &str) -> Self {
        Self {
            keywords: keywords.split_whitespace().map(String::from).collect(),
            ..Default::default()
        }
    }

    pub fn in_unit(mut self, unit: impl Into<String>) -> Self {
        self.in_unit = Some(unit.into());
        self
    }

    pub fn reference_only(mut self, reference_only: bool) -> Self {
        self.reference_only = reference_only;
        self
    }

    pub fn active_processes_only(mut self, active_processes_only: bool) -> Self {
        self.active_processes_only = active_processes_only;
        self
    }
}

/// Finder for `elca.process_config_search_v`.
#[derive(Debug, Clone)]
pub struct ProcessConfigSearchSet {
    view: TableSet,
    conversions: Source,
    attributes: Source,
    element_components: Source,
    elements: Source,
    assignments: Source,
    process_dbs: Source,
}

impl ProcessConfigSearchSet {
    pub fn new(finder: Finder) -> Result<Self> {
        Ok(Self {
            view: TableSet::new(finder, PROCESS_CONFIG_SEARCH_VIEW, PROCESS_CONFIG_SEARCH_COLUMNS)?,
            conversions: Source::new(PROCESS_CONVERSIONS)?,
            attributes: Source::new(PROCESS_CONFIG_ATTRIBUTES)?,
            element_components: Source::new(ELEMENT_COMPONENTS)?,
            elements: Source::new(ELEMENTS)?,
            assignments: Source::new(PROCESS_ASSIGNMENTS_VIEW)?,
            process_dbs: Source::new(PROCESS_DBS)?,
        })
    }

    pub fn bypass_cache(self, bypass: bool) -> Self {
        Self {
            view: self.view.bypass_cache(bypass),
            ..self
        }
    }

    /// Configurations whose name contains every keyword, ordered by
    /// category and name.
    #[instrument(skip(self, query), fields(keywords = query.keywords.len()))]
    pub async fn find_by_keywords(&self, query: &KeywordQuery) -> Result<ResultSet> {
        let Some(conditions) = query.conditions() else {
            return Ok(ResultSet::empty(EmptyInput::NoKeywords));
        };
        let mut clauses = Clauses::new();
        clauses.conditions(&conditions)?;
        let mut joined = vec![&self.conversions];

        if let Some(variant_id) = query.project_variant_id {
            let param = clauses.bind(variant_id);
            clauses.push(format!(
                "EXISTS (SELECT x.id FROM {} x JOIN {} y ON y.id = x.element_id \
                 WHERE x.process_config_id = p.id AND y.project_variant_id = {})",
                self.element_components.quoted(),
                self.elements.quoted(),
                param
            ));
            joined.extend([&self.element_components, &self.elements]);
        }

        let sql = format!(
            "SELECT DISTINCT p.* FROM {} p \
             JOIN {} c ON p.id = c.process_config_id{} \
             ORDER BY p.process_category_node_name, p.name",
            self.view.source().quoted(),
            self.conversions.quoted(),
            clauses.where_sql()
        );
        self.view
            .find_by_sql(&joined, &sql, clauses.into_params())
            .await
    }

    /// Configurations flagged as energy supply whose name contains every
    /// keyword, ordered by category and name.
    #[instrument(skip(self, query), fields(keywords = query.keywords.len()))]
    pub async fn find_final_energy_supplies_by_keywords(
        &self,
        query: &FinalEnergyQuery,
    ) -> Result<ResultSet> {
        let Some(keywords) = KeywordSearch::new("p.name", query.keywords.iter().cloned()).to_condition()
        else {
            return Ok(ResultSet::empty(EmptyInput::NoKeywords));
        };

        let mut clauses = Clauses::new();
        let supply = clauses.bind(ATTRIBUTE_OP_AS_SUPPLY);
        let mut conditions = vec![keywords];
        if let Some(unit) = query.in_unit.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            conditions.push(Condition::equals("c.in_unit", unit));
        }
        clauses.conditions(&conditions)?;
        if query.reference_only {
            clauses.push("p.is_reference = true");
        }

        let mut joined = vec![&self.attributes, &self.conversions];
        if query.active_processes_only {
            clauses.push(format!(
                "EXISTS (SELECT x.id FROM {} x JOIN {} d ON d.id = x.process_db_id \
                 WHERE x.process_config_id = p.id AND d.is_active)",
                self.assignments.quoted(),
                self.process_dbs.quoted()
            ));
            joined.extend([&self.assignments, &self.process_dbs]);
        }

        let sql = format!(
            "SELECT DISTINCT p.* FROM {} p \
             JOIN {} pca ON p.id = pca.process_config_id AND pca.ident = {} AND pca.numeric_value = 1 \
             JOIN {} c ON p.id = c.process_config_id{} \
             ORDER BY p.process_category_node_name, p.name",
            self.view.source().quoted(),
            self.attributes.quoted(),
            supply,
            self.conversions.quoted(),
            clauses.where_sql()
        );
        self.view
            .find_by_sql(&joined, &sql, clauses.into_params())
            .await
    }
}
