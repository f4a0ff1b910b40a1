//! Process configurations.

use tracing::instrument;
use uuid::Uuid;

use super::{checked_filters, checked_order, Clauses, TableSet};
use crate::finder::Finder;
use crate::query::{Condition, FilterMap, KeywordSearch, OrderSpec, Pagination};
use crate::source::Source;
use crate::{EmptyInput, FinderError, Result, ResultSet};

/// Process configuration table
pub const PROCESS_CONFIGS: &str = "elca.process_configs";
/// View with the denormalised full-text `search_vector` column
pub const EXTENDED_SEARCH_VIEW: &str = "elca.process_configs_extended_search_v";
/// Processes assigned to configurations, one row per life-cycle module
pub const PROCESS_ASSIGNMENTS_VIEW: &str = "elca.process_assignments_v";
pub const PROCESS_DBS: &str = "elca.process_dbs";
/// Configurations with the databases and EPD types of their production data
pub const PROCESS_CONFIG_PROCESS_DBS_VIEW: &str = "elca.process_config_process_dbs_view";
/// Configurations with the databases and EPD types of any phase
pub const ALL_PROCESS_CONFIG_PROCESS_DBS_VIEW: &str = "elca.all_process_config_process_dbs_view";
pub const PROCESS_CONVERSIONS_VIEW: &str = "elca.process_conversions_v";
pub const PROCESS_LIFE_CYCLE_ASSIGNMENTS: &str = "elca.process_life_cycle_assignments";
pub const ELEMENT_COMPONENTS: &str = "elca.element_components";
pub const ELEMENTS: &str = "elca.elements";
pub const COMPOSITE_ELEMENTS: &str = "elca.composite_elements";

pub const PROCESS_CONFIG_COLUMNS: &[&str] = &[
    "id",
    "name",
    "process_category_node_id",
    "description",
    "avg_life_time",
    "min_life_time",
    "max_life_time",
    "life_time_info",
    "avg_life_time_info",
    "min_life_time_info",
    "max_life_time_info",
    "density",
    "thermal_conductivity",
    "thermal_resistance",
    "is_reference",
    "f_hs_hi",
    "waste_code",
    "waste_code_suffix",
    "lambda_value",
    "element_group_a",
    "element_group_b",
    "default_size",
    "element_district_heating",
    "element_refrigerant",
    "element_flammable",
    "uuid",
    "svg_pattern_id",
    "is_stale",
    "created",
    "modified",
];

/// Criteria for [`ProcessConfigSet::find_by_process_category_node_id`].
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryQuery {
    pub process_category_node_id: i32,
    /// Unit on either side of a conversion; a comma separated value matches
    /// any of the listed units.
    pub unit: Option<String>,
    pub reference_only: bool,
    /// Process databases; a configuration matches when it has data in any of them.
    pub process_db_ids: Vec<i32>,
    pub include_stale: bool,
    /// Only configurations used by elements of this project variant.
    pub project_variant_id: Option<i32>,
    pub epd_sub_type: Option<String>,
    /// Look only at production data (the default); otherwise every phase.
    pub only_prod_configs: bool,
}

impl CategoryQuery {
    pub fn new(process_category_node_id: i32) -> Self {
        Self {
            process_category_node_id,
            unit: None,
            reference_only: false,
            process_db_ids: Vec::new(),
            include_stale: false,
            project_variant_id: None,
            epd_sub_type: None,
            only_prod_configs: true,
        }
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
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

    pub fn include_stale(mut self, include_stale: bool) -> Self {
        self.include_stale = include_stale;
        self
    }

    pub fn project_variant_id(mut self, id: i32) -> Self {
        self.project_variant_id = Some(id);
        self
    }

    pub fn epd_sub_type(mut self, epd_type: impl Into<String>) -> Self {
        self.epd_sub_type = Some(epd_type.into());
        self
    }

    pub fn only_prod_configs(mut self, only_prod_configs: bool) -> Self {
        self.only_prod_configs = only_prod_configs;
        self
    }

    fn units(&self) -> Vec<&str> {
        self.unit
            .as_deref()
            .map(|unit| {
                unit.split(',')
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Finder for `elca.process_configs`.
#[derive(Debug, Clone)]
pub struct ProcessConfigSet {
    table: TableSet,
    extended: TableSet,
    assignments: Source,
    process_dbs: Source,
    prod_process_dbs: Source,
    all_process_dbs: Source,
    conversions: Source,
    life_cycle_assignments: Source,
    element_components: Source,
    elements: Source,
    composite_elements: Source,
}

impl ProcessConfigSet {
    pub fn new(finder: Finder) -> Result<Self> {
        let mut extended_columns = PROCESS_CONFIG_COLUMNS.to_vec();
        extended_columns.push("search_vector");

        Ok(Self {
            table: TableSet::new(finder.clone(), PROCESS_CONFIGS, PROCESS_CONFIG_COLUMNS)?,
            extended: TableSet::new(finder, EXTENDED_SEARCH_VIEW, &extended_columns)?,
            assignments: Source::new(PROCESS_ASSIGNMENTS_VIEW)?,
            process_dbs: Source::new(PROCESS_DBS)?,
            prod_process_dbs: Source::new(PROCESS_CONFIG_PROCESS_DBS_VIEW)?,
            all_process_dbs: Source::new(ALL_PROCESS_CONFIG_PROCESS_DBS_VIEW)?,
            conversions: Source::new(PROCESS_CONVERSIONS_VIEW)?,
            life_cycle_assignments: Source::new(PROCESS_LIFE_CYCLE_ASSIGNMENTS)?,
            element_components: Source::new(ELEMENT_COMPONENTS)?,
            elements: Source::new(ELEMENTS)?,
            composite_elements: Source::new(COMPOSITE_ELEMENTS)?,
        })
    }

    pub fn bypass_cache(self, bypass: bool) -> Self {
        Self {
            table: self.table.bypass_cache(bypass),
            extended: self.extended.bypass_cache(bypass),
            ..self
        }
    }

    pub fn source(&self) -> &Source {
        self.table.source()
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

    /// Configurations that a process with `uuid` is assigned to, optionally
    /// restricted to one life-cycle phase.
    #[instrument(skip(self, order))]
    pub async fn find_by_process_uuid(
        &self,
        uuid: &str,
        lc_phase: Option<&str>,
        order: OrderSpec,
        page: Pagination,
    ) -> Result<ResultSet> {
        let uuid = uuid.trim();
        if uuid.is_empty() {
            return Ok(ResultSet::empty(EmptyInput::MissingKey));
        }
        let uuid = Uuid::parse_str(uuid)
            .map_err(|e| FinderError::invalid(format!("Invalid process uuid '{}': {}", uuid, e)))?;
        let order = checked_order(self.source(), &order, Some("pc"))?;

        let mut conditions = vec![Condition::equals("plca.uuid", uuid)];
        if let Some(phase) = non_empty(lc_phase) {
            conditions.push(Condition::equals("plca.life_cycle_phase", phase));
        }
        let mut clauses = Clauses::new();
        clauses.conditions(&conditions)?;
        let tail = clauses.tail(&order, &page)?;

        let sql = format!(
            "SELECT DISTINCT pc.* FROM {} pc \
             JOIN {} plca ON plca.process_config_id = pc.id{}{}",
            self.source().quoted(),
            self.assignments.quoted(),
            clauses.where_sql(),
            tail
        );
        self.table
            .find_by_sql(&[&self.assignments], &sql, clauses.into_params())
            .await
    }

    /// Configurations that the process assignment `process_id` belongs to.
    #[instrument(skip(self, order))]
    pub async fn find_by_process_id(
        &self,
        process_id: i32,
        order: OrderSpec,
        page: Pagination,
    ) -> Result<ResultSet> {
        if process_id == 0 {
            return Ok(ResultSet::empty(EmptyInput::MissingKey));
        }
        let order = checked_order(self.source(), &order, Some("pc"))?;

        let mut clauses = Clauses::new();
        clauses.conditions(&[Condition::equals("plca.id", process_id)])?;
        let tail = clauses.tail(&order, &page)?;

        let sql = format!(
            "SELECT DISTINCT pc.* FROM {} pc \
             JOIN {} plca ON plca.process_config_id = pc.id{}{}",
            self.source().quoted(),
            self.assignments.quoted(),
            clauses.where_sql(),
            tail
        );
        self.table
            .find_by_sql(&[&self.assignments], &sql, clauses.into_params())
            .await
    }

    /// Configurations that a process named `name` is assigned to.
    ///
    /// `epd_sub_type` also admits assignments without an EPD type, and
    /// `geographical_representativeness` only applies to databases that are
    /// EN 15804 compliant.
    #[instrument(skip(self, order))]
    pub async fn find_by_process_name(
        &self,
        name: &str,
        lc_phase: Option<&str>,
        epd_sub_type: Option<&str>,
        geographical_representativeness: Option<&str>,
        order: OrderSpec,
        page: Pagination,
    ) -> Result<ResultSet> {
        if name.trim().is_empty() {
            return Ok(ResultSet::empty(EmptyInput::MissingKey));
        }
        let order = checked_order(self.source(), &order, Some("pc"))?;

        let mut conditions = vec![Condition::equals("plca.name", name)];
        if let Some(phase) = non_empty(lc_phase) {
            conditions.push(Condition::equals("plca.life_cycle_phase", phase));
        }
        let mut clauses = Clauses::new();
        clauses.conditions(&conditions)?;

        if let Some(epd_type) = non_empty(epd_sub_type) {
            let param = clauses.bind(epd_type);
            clauses.push(format!(
                "(plca.epd_type = {} OR plca.epd_type IS NULL)",
                param
            ));
        }
        if let Some(geo) = non_empty(geographical_representativeness) {
            let param = clauses.bind(geo);
            clauses.push(format!(
                "(db.is_en15804_compliant = false OR plca.geographical_representativeness = {})",
                param
            ));
        }
        let tail = clauses.tail(&order, &page)?;

        let sql = format!(
            "SELECT DISTINCT pc.* FROM {} pc \
             JOIN {} plca ON plca.process_config_id = pc.id \
             JOIN {} db ON db.id = plca.process_db_id{}{}",
            self.source().quoted(),
            self.assignments.quoted(),
            self.process_dbs.quoted(),
            clauses.where_sql(),
            tail
        );
        self.table
            .find_by_sql(
                &[&self.assignments, &self.process_dbs],
                &sql,
                clauses.into_params(),
            )
            .await
    }

    /// Configurations of one category that have a conversion for the
    /// requested unit in one of their databases.
    ///
    /// Stale configurations are left out unless asked for.
    #[instrument(skip(self, query, order), fields(category = query.process_category_node_id))]
    pub async fn find_by_process_category_node_id(
        &self,
        query: &CategoryQuery,
        order: OrderSpec,
    ) -> Result<ResultSet> {
        if query.process_category_node_id == 0 {
            return Ok(ResultSet::empty(EmptyInput::MissingKey));
        }
        let order = checked_order(self.source(), &order, Some("p"))?;
        let view = if query.only_prod_configs {
            &self.prod_process_dbs
        } else {
            &self.all_process_dbs
        };
        let mut joined = vec![view, &self.conversions];

        let mut clauses = Clauses::new();
        let category = clauses.bind(query.process_category_node_id);
        clauses.push(format!("p.process_category_node_id = {}", category));

        match query.units().as_slice() {
            [] => {}
            [unit] => {
                let param = clauses.bind(*unit);
                clauses.push(format!("{} IN (c.in_unit, c.out_unit)", param));
            }
            units => {
                let params: Vec<String> = units.iter().map(|u| clauses.bind(*u)).collect();
                let list = params.join(", ");
                clauses.push(format!(
                    "(c.in_unit IN ({}) OR c.out_unit IN ({}))",
                    list, list
                ));
            }
        }
        if query.reference_only {
            clauses.push("p.is_reference = true");
        }

        let mut conditions = Vec::new();
        if !query.process_db_ids.is_empty() {
            conditions.push(Condition::array_overlaps(
                "p.process_db_ids",
                query.process_db_ids.iter().copied(),
            ));
        }
        clauses.conditions(&conditions)?;

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
        if let Some(epd_type) = non_empty(query.epd_sub_type.as_deref()) {
            clauses.conditions(&[Condition::any_equals("p.epd_types", epd_type)])?;
        }
        if !query.include_stale {
            clauses.push("p.is_stale = false");
        }
        let tail = clauses.tail(&order, &Pagination::default())?;

        let sql = format!(
            "SELECT DISTINCT p.* FROM {} p \
             JOIN {} c ON p.id = c.process_config_id AND c.process_db_id = ANY(p.process_db_ids){}{}",
            view.quoted(),
            self.conversions.quoted(),
            clauses.where_sql(),
            tail
        );
        self.table
            .find_by_sql(&joined, &sql, clauses.into_params())
            .await
    }

    /// Configurations used by the components of one element.
    #[instrument(skip(self, order))]
    pub async fn find_by_element_id(
        &self,
        element_id: i32,
        order: OrderSpec,
        page: Pagination,
    ) -> Result<ResultSet> {
        if element_id == 0 {
            return Ok(ResultSet::empty(EmptyInput::MissingKey));
        }
        let order = checked_order(self.source(), &order, Some("p"))?;

        let mut clauses = Clauses::new();
        let element = clauses.bind(element_id);
        clauses.push(format!("c.element_id = {}", element));
        let tail = clauses.tail(&order, &page)?;

        let sql = format!(
            "SELECT DISTINCT p.* FROM {} c \
             JOIN {} p ON p.id = c.process_config_id{}{}",
            self.element_components.quoted(),
            self.source().quoted(),
            clauses.where_sql(),
            tail
        );
        self.table
            .find_by_sql(&[&self.element_components], &sql, clauses.into_params())
            .await
    }

    /// Configurations used by any element of a composite element.
    #[instrument(skip(self, order))]
    pub async fn find_by_composite_element_id(
        &self,
        composite_element_id: i32,
        order: OrderSpec,
        page: Pagination,
    ) -> Result<ResultSet> {
        if composite_element_id == 0 {
            return Ok(ResultSet::empty(EmptyInput::MissingKey));
        }
        let order = checked_order(self.source(), &order, Some("p"))?;

        let mut clauses = Clauses::new();
        let composite = clauses.bind(composite_element_id);
        clauses.push(format!("a.composite_element_id = {}", composite));
        let tail = clauses.tail(&order, &page)?;

        let sql = format!(
            "SELECT DISTINCT p.* FROM {} a \
             JOIN {} e ON e.id = a.element_id \
             JOIN {} c ON e.id = c.element_id \
             JOIN {} p ON p.id = c.process_config_id{}{}",
            self.composite_elements.quoted(),
            self.elements.quoted(),
            self.element_components.quoted(),
            self.source().quoted(),
            clauses.where_sql(),
            tail
        );
        self.table
            .find_by_sql(
                &[&self.composite_elements, &self.elements, &self.element_components],
                &sql,
                clauses.into_params(),
            )
            .await
    }

    /// Most recently changed configurations first, unless `order` says
    /// otherwise.
    #[instrument(skip(self, filters, order), fields(filters = filters.len()))]
    pub async fn find_last_modified(
        &self,
        filters: FilterMap,
        order: OrderSpec,
        limit: Option<i64>,
    ) -> Result<ResultSet> {
        let conditions = checked_filters(self.source(), &filters, None)?;
        let order = checked_order(self.source(), &order, None)?;

        let mut clauses = Clauses::new();
        clauses.conditions(&conditions)?;
        let mut tail = String::new();
        if order.is_empty() {
            tail.push_str(" ORDER BY coalesce(modified, created) DESC");
        }
        tail.push_str(&clauses.tail(&order, &Pagination::new(limit, None))?);

        let sql = format!(
            "SELECT * FROM {}{}{}",
            self.source().quoted(),
            clauses.where_sql(),
            tail
        );
        self.table.find_by_sql(&[], &sql, clauses.into_params()).await
    }

    /// Configurations never edited after creation and without any process
    /// assignment.
    #[instrument(skip(self, filters, order), fields(filters = filters.len()))]
    pub async fn find_stale_without_assignments(
        &self,
        filters: FilterMap,
        order: OrderSpec,
        page: Pagination,
    ) -> Result<ResultSet> {
        let conditions = checked_filters(self.source(), &filters, Some("pc"))?;
        let order = checked_order(self.source(), &order, Some("pc"))?;

        let mut clauses = Clauses::new();
        clauses.push("(pc.modified IS NULL OR pc.modified - pc.created < '5 minutes')");
        clauses.push("a.id IS NULL");
        clauses.conditions(&conditions)?;
        let tail = clauses.tail(&order, &page)?;

        let sql = format!(
            "SELECT pc.* FROM {} pc \
             LEFT JOIN {} a ON a.process_config_id = pc.id{}{}",
            self.source().quoted(),
            self.life_cycle_assignments.quoted(),
            clauses.where_sql(),
            tail
        );
        self.table
            .find_by_sql(&[&self.life_cycle_assignments], &sql, clauses.into_params())
            .await
    }

    /// Filtered search over the extended search view.
    ///
    /// Every keyword must occur in `search_vector`. Without keywords this is
    /// a plain filtered lookup.
    #[instrument(skip(self, filters, order), fields(filters = filters.len()))]
    pub async fn search_extended(
        &self,
        keywords: &str,
        filters: FilterMap,
        order: OrderSpec,
        page: Pagination,
    ) -> Result<ResultSet> {
        let mut request = self.extended.request(filters).order_by(order).distinct(true);
        request.limit = page.limit;
        request.offset = page.offset;

        if let Some(condition) = KeywordSearch::parse("search_vector", keywords).to_condition() {
            request = request.condition(condition);
        }
        self.extended.finder().find(&request).await
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
