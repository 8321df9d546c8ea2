//! Capability probing and query planning.
//!
//! The planner splits an abstract [`Query`] into a [`NativeQuery`] handed to the backend
//! and an ordered list of [`ResidualStep`]s applied locally to the backend's result.
//! Pushdown is best effort but never changes results:
//!
//! - a filter is pushed only if the backend accepts its operator; the rest are evaluated
//!   locally as a conjunction
//! - ordering is pushed only if the backend orders natively
//! - first-row/max-rows are pushed only if every filter and the ordering were pushed,
//!   since a backend limit applied before a local filter or sort would drop rows
//! - a native count is used only when every filter was pushed; otherwise the result is
//!   materialized and counted locally (see [`DataContextConfig::allow_count_materialization`])
//!
//! [`DataContextConfig::allow_count_materialization`]: crate::config::DataContextConfig

use std::fmt;
use std::sync::Arc;

use super::{FilterItem, OperatorType, OrderByItem, Query, SelectItem};
use crate::config::DataContextConfig;
use crate::data::{
    DataSet, DataSetHeader, FilteredDataSet, FirstRowDataSet, InMemoryDataSet, MaxRowsDataSet,
    OrderedDataSet, ProjectedDataSet,
};
use crate::error::{DataError, DataResult};
use crate::schema::{Column, Schema, Table, Value};

/// Every filter operator the query model knows.
pub const ALL_FILTER_OPS: &[OperatorType] = &[
    OperatorType::Equal,
    OperatorType::NotEqual,
    OperatorType::LessThan,
    OperatorType::LessThanOrEqual,
    OperatorType::GreaterThan,
    OperatorType::GreaterThanOrEqual,
    OperatorType::In,
    OperatorType::Like,
];

pub const EQUALITY_FILTER_OPS: &[OperatorType] = &[OperatorType::Equal];

/// Static declaration of what a backend executes natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub native_filter_ops: &'static [OperatorType],
    pub native_order_by: bool,
    pub native_max_rows: bool,
    pub native_count: bool,
    pub create_table: bool,
    pub drop_table: bool,
    pub insert: bool,
    pub delete: bool,
}

impl Capabilities {
    /// A backend that can only scan.
    pub const NONE: Capabilities = Capabilities {
        native_filter_ops: &[],
        native_order_by: false,
        native_max_rows: false,
        native_count: false,
        create_table: false,
        drop_table: false,
        insert: false,
        delete: false,
    };

    pub const ALL: Capabilities = Capabilities {
        native_filter_ops: ALL_FILTER_OPS,
        native_order_by: true,
        native_max_rows: true,
        native_count: true,
        create_table: true,
        drop_table: true,
        insert: true,
        delete: true,
    };

    pub const fn with_filter_ops(mut self, ops: &'static [OperatorType]) -> Self {
        self.native_filter_ops = ops;
        self
    }

    pub const fn with_order_by(mut self, supported: bool) -> Self {
        self.native_order_by = supported;
        self
    }

    pub const fn with_max_rows(mut self, supported: bool) -> Self {
        self.native_max_rows = supported;
        self
    }

    pub const fn with_count(mut self, supported: bool) -> Self {
        self.native_count = supported;
        self
    }

    /// Toggle every mutation capability at once.
    pub const fn with_mutations(mut self, supported: bool) -> Self {
        self.create_table = supported;
        self.drop_table = supported;
        self.insert = supported;
        self.delete = supported;
        self
    }

    pub const fn with_drop_table(mut self, supported: bool) -> Self {
        self.drop_table = supported;
        self
    }

    pub fn supports_native_filter(&self, op: OperatorType) -> bool {
        self.native_filter_ops.contains(&op)
    }

    pub fn supports_native_order_by(&self) -> bool {
        self.native_order_by
    }

    pub fn supports_native_max_rows(&self) -> bool {
        self.native_max_rows
    }

    pub fn supports_native_count(&self) -> bool {
        self.native_count
    }

    pub fn supports_create_table(&self) -> bool {
        self.create_table
    }

    pub fn supports_drop_table(&self) -> bool {
        self.drop_table
    }

    pub fn supports_insert(&self) -> bool {
        self.insert
    }

    pub fn supports_delete(&self) -> bool {
        self.delete
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities::NONE
    }
}

/// Pure metadata query answered by each backend. Must not perform I/O.
pub trait CapabilityProbe {
    fn capabilities(&self) -> Capabilities;

    /// Whether this particular predicate can be evaluated natively. Backends with
    /// per-column restrictions (e.g. only key columns are filterable) override this.
    fn can_push_filter(&self, filter: &FilterItem) -> bool {
        self.capabilities().supports_native_filter(filter.operator())
    }
}

impl CapabilityProbe for Capabilities {
    fn capabilities(&self) -> Capabilities {
        *self
    }
}

/// The part of a query sent to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeQuery {
    pub table: Table,
    /// Columns to fetch, in header order.
    pub columns: Vec<Column>,
    pub filters: Vec<FilterItem>,
    pub order_by: Vec<OrderByItem>,
    pub first_row: Option<usize>,
    pub max_rows: Option<usize>,
    /// Only the number of matching rows is requested.
    pub count_only: bool,
    /// Page size for backends that scroll.
    pub page_size: Option<usize>,
}

/// A postprocessing step applied locally, in list order.
#[derive(Debug, Clone, PartialEq)]
pub enum ResidualStep {
    Filter(Vec<FilterItem>),
    Sort(Vec<OrderByItem>),
    /// Materialize every row and report the number of rows as a single value.
    Count,
    Skip(usize),
    Truncate(usize),
    Project(Vec<SelectItem>),
}

impl fmt::Display for ResidualStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResidualStep::Filter(filters) => {
                let parts: Vec<String> = filters.iter().map(ToString::to_string).collect();
                write!(f, "Filter({})", parts.join(" AND "))
            }
            ResidualStep::Sort(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|i| format!("{} {}", i.column().name(), if i.is_ascending() { "ASC" } else { "DESC" }))
                    .collect();
                write!(f, "Sort({})", parts.join(", "))
            }
            ResidualStep::Count => f.write_str("Count"),
            ResidualStep::Skip(n) => write!(f, "Skip({})", n),
            ResidualStep::Truncate(n) => write!(f, "Truncate({})", n),
            ResidualStep::Project(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "Project({})", parts.join(", "))
            }
        }
    }
}

/// Native fragment plus residual steps for one query.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    native: NativeQuery,
    residual: Vec<ResidualStep>,
    native_header: Arc<DataSetHeader>,
    header: Arc<DataSetHeader>,
}

impl QueryPlan {
    pub fn native(&self) -> &NativeQuery {
        &self.native
    }

    pub fn residual(&self) -> &[ResidualStep] {
        &self.residual
    }

    /// Header of the rows the backend returns.
    pub fn native_header(&self) -> &Arc<DataSetHeader> {
        &self.native_header
    }

    /// Header of the rows the caller receives.
    pub fn header(&self) -> &Arc<DataSetHeader> {
        &self.header
    }

    pub fn is_fully_pushed(&self) -> bool {
        self.residual.is_empty()
    }

    pub fn materializes_count(&self) -> bool {
        self.residual.contains(&ResidualStep::Count)
    }

    /// Wrap the backend's data set with the residual steps.
    pub fn apply(&self, native: Box<dyn DataSet>, config: &DataContextConfig) -> DataResult<Box<dyn DataSet>> {
        let mut current = native;
        for step in &self.residual {
            current = match step {
                ResidualStep::Filter(filters) => Box::new(FilteredDataSet::new(current, filters.clone())?),
                ResidualStep::Sort(items) => Box::new(OrderedDataSet::new(current, items, config.sort_buffer_limit)?),
                ResidualStep::Count => Box::new(count_rows(current)?),
                ResidualStep::Skip(n) => Box::new(FirstRowDataSet::new(current, *n)),
                ResidualStep::Truncate(n) => Box::new(MaxRowsDataSet::new(current, *n)),
                ResidualStep::Project(items) => Box::new(ProjectedDataSet::new(current, items.clone())?),
            };
        }
        Ok(current)
    }
}

fn count_rows(mut inner: Box<dyn DataSet>) -> DataResult<InMemoryDataSet> {
    let mut count: i64 = 0;
    let drained = loop {
        match inner.next() {
            Ok(true) => count += 1,
            Ok(false) => break Ok(()),
            Err(e) => break Err(e),
        }
    };
    inner.close();
    drained?;
    InMemoryDataSet::single_value(count_header(), Value::BigInt(count))
}

pub(crate) fn count_header() -> Arc<DataSetHeader> {
    Arc::new(DataSetHeader::new(vec![SelectItem::count_all()]))
}

pub struct QueryPlanner<'a> {
    probe: &'a dyn CapabilityProbe,
    config: &'a DataContextConfig,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(probe: &'a dyn CapabilityProbe, config: &'a DataContextConfig) -> Self {
        Self { probe, config }
    }

    /// Validate the query against the schema and split it. Fails before any I/O.
    pub fn plan(&self, schema: &Schema, query: &Query) -> DataResult<QueryPlan> {
        let table = schema.require_table(query.table().name())?;
        validate(table, query)?;

        let caps = self.probe.capabilities();
        let (pushed_filters, residual_filters): (Vec<FilterItem>, Vec<FilterItem>) = query
            .filters()
            .iter()
            .cloned()
            .partition(|f| self.probe.can_push_filter(f));
        let all_filters_pushed = residual_filters.is_empty();

        let plan = if query.is_count_query() {
            self.plan_count(table, query, pushed_filters, residual_filters, caps)?
        } else {
            self.plan_rows(table, query, pushed_filters, residual_filters, caps)
        };

        tracing::debug!(
            table = %table.name(),
            pushed_filters = plan.native.filters.len(),
            native_order_by = !plan.native.order_by.is_empty(),
            native_limit = plan.native.max_rows.is_some() || plan.native.first_row.is_some(),
            native_count = plan.native.count_only,
            all_filters_pushed,
            residual = %plan.residual.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> "),
            "Planned query"
        );
        Ok(plan)
    }

    fn plan_count(
        &self,
        table: &Table,
        query: &Query,
        pushed_filters: Vec<FilterItem>,
        residual_filters: Vec<FilterItem>,
        caps: Capabilities,
    ) -> DataResult<QueryPlan> {
        let header = count_header();
        let mut residual = Vec::new();

        let native = if caps.supports_native_count() && residual_filters.is_empty() {
            NativeQuery {
                table: table.clone(),
                columns: Vec::new(),
                filters: pushed_filters,
                order_by: Vec::new(),
                first_row: None,
                max_rows: None,
                count_only: true,
                page_size: None,
            }
        } else {
            if !self.config.allow_count_materialization {
                return Err(DataError::unsupported(format!(
                    "Counting rows of '{}' requires materializing the full result",
                    table.name()
                )));
            }
            tracing::warn!(
                table = %table.name(),
                residual_filters = residual_filters.len(),
                "Backend cannot count natively; materializing the full result to count rows"
            );

            let mut columns: Vec<Column> = Vec::new();
            for filter in &residual_filters {
                push_unique(&mut columns, filter.column());
            }
            if columns.is_empty() {
                if let Some(first) = table.primary_keys().next().or_else(|| table.columns().first()) {
                    columns.push(first.clone());
                }
            }
            if !residual_filters.is_empty() {
                residual.push(ResidualStep::Filter(residual_filters));
            }
            residual.push(ResidualStep::Count);

            NativeQuery {
                table: table.clone(),
                columns,
                filters: pushed_filters,
                order_by: Vec::new(),
                first_row: None,
                max_rows: None,
                count_only: false,
                page_size: Some(self.config.scroll.page_size),
            }
        };

        // Offset and limit apply to the single count row
        if let Some(first) = query.first_row_offset().filter(|n| *n > 0) {
            residual.push(ResidualStep::Skip(first));
        }
        if let Some(max) = query.max_rows_limit() {
            residual.push(ResidualStep::Truncate(max));
        }

        let native_header = if native.count_only {
            header.clone()
        } else {
            Arc::new(DataSetHeader::from_columns(&native.columns))
        };
        Ok(QueryPlan {
            native,
            residual,
            native_header,
            header,
        })
    }

    fn plan_rows(
        &self,
        table: &Table,
        query: &Query,
        pushed_filters: Vec<FilterItem>,
        residual_filters: Vec<FilterItem>,
        caps: Capabilities,
    ) -> QueryPlan {
        let order_by = query.order_by_items();
        let order_pushed = order_by.is_empty() || caps.supports_native_order_by();
        let limit_requested = query.first_row_offset().is_some() || query.max_rows_limit().is_some();
        let limit_pushed =
            limit_requested && caps.supports_native_max_rows() && residual_filters.is_empty() && order_pushed;

        let mut columns: Vec<Column> = Vec::new();
        for item in query.select_items() {
            if let Some(column) = item.column() {
                push_unique(&mut columns, column);
            }
        }
        for filter in &residual_filters {
            push_unique(&mut columns, filter.column());
        }
        if !order_pushed {
            for item in order_by {
                push_unique(&mut columns, item.column());
            }
        }

        let mut residual = Vec::new();
        if !residual_filters.is_empty() {
            residual.push(ResidualStep::Filter(residual_filters));
        }
        if !order_pushed {
            residual.push(ResidualStep::Sort(order_by.to_vec()));
        }
        if !limit_pushed {
            if let Some(first) = query.first_row_offset().filter(|n| *n > 0) {
                residual.push(ResidualStep::Skip(first));
            }
            if let Some(max) = query.max_rows_limit() {
                residual.push(ResidualStep::Truncate(max));
            }
        }
        // Rows must line up with the select list, repeats and order included
        let aligned = columns.len() == query.select_items().len()
            && query
                .select_items()
                .iter()
                .zip(&columns)
                .all(|(item, column)| item.column() == Some(column));
        if !aligned {
            residual.push(ResidualStep::Project(query.select_items().to_vec()));
        }

        let native_header = Arc::new(DataSetHeader::from_columns(&columns));
        let header = Arc::new(DataSetHeader::new(query.select_items().to_vec()));
        QueryPlan {
            native: NativeQuery {
                table: table.clone(),
                columns,
                filters: pushed_filters,
                order_by: if order_pushed { order_by.to_vec() } else { Vec::new() },
                first_row: if limit_pushed { query.first_row_offset() } else { None },
                max_rows: if limit_pushed { query.max_rows_limit() } else { None },
                count_only: false,
                page_size: Some(self.config.scroll.page_size),
            },
            residual,
            native_header,
            header,
        }
    }
}

fn push_unique(columns: &mut Vec<Column>, column: &Column) {
    if !columns.contains(column) {
        columns.push(column.clone());
    }
}

fn validate(table: &Table, query: &Query) -> DataResult<()> {
    if query.select_items().is_empty() {
        return Err(DataError::invalid("Query selects nothing"));
    }

    let has_aggregate = query.select_items().iter().any(SelectItem::is_aggregate);
    if has_aggregate && !query.is_count_query() {
        return Err(DataError::invalid(
            "Only a single COUNT(*) is supported as an aggregate select",
        ));
    }

    let referenced = query
        .select_items()
        .iter()
        .filter_map(SelectItem::column)
        .chain(query.filters().iter().map(FilterItem::column))
        .chain(query.order_by_items().iter().map(OrderByItem::column));
    for column in referenced {
        if !table.contains_column(column) {
            return Err(DataError::ColumnNotFound {
                table: table.name().to_string(),
                column: column.name().to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Operand;
    use crate::schema::ColumnType;

    fn schema() -> Schema {
        let songs = Table::new("ks", "songs")
            .with_column(Column::new("songs", "id", ColumnType::Uuid).with_primary_key(true))
            .unwrap()
            .with_column(Column::new("songs", "title", ColumnType::String))
            .unwrap()
            .with_column(Column::new("songs", "position", ColumnType::Integer))
            .unwrap();
        Schema::new("ks").with_table(songs).unwrap()
    }

    fn col(schema: &Schema, name: &str) -> Column {
        schema.table_by_name("songs").unwrap().column_by_name(name).unwrap().clone()
    }

    fn query(schema: &Schema) -> Query {
        Query::from_table(schema.table_by_name("songs").unwrap().clone())
    }

    #[test]
    fn test_fully_pushed() {
        let s = schema();
        let q = query(&s)
            .select(col(&s, "title"))
            .filter(FilterItem::new(col(&s, "position"), OperatorType::GreaterThan, 1).unwrap())
            .order_by(OrderByItem::asc(col(&s, "title")))
            .first_row(1)
            .max_rows(2);
        let config = DataContextConfig::default();
        let plan = QueryPlanner::new(&Capabilities::ALL, &config).plan(&s, &q).unwrap();

        assert!(plan.is_fully_pushed());
        assert_eq!(plan.native().filters.len(), 1);
        assert_eq!(plan.native().first_row, Some(1));
        assert_eq!(plan.native().max_rows, Some(2));
        assert_eq!(plan.native().columns, vec![col(&s, "title")]);
    }

    #[test]
    fn test_residual_filter_blocks_limit_pushdown() {
        let s = schema();
        let caps = Capabilities::ALL.with_filter_ops(EQUALITY_FILTER_OPS);
        let q = query(&s)
            .select(col(&s, "title"))
            .filter(FilterItem::new(col(&s, "title"), OperatorType::Equal, "a").unwrap())
            .filter(FilterItem::new(col(&s, "position"), OperatorType::LessThan, 3).unwrap())
            .max_rows(5);
        let config = DataContextConfig::default();
        let plan = QueryPlanner::new(&caps, &config).plan(&s, &q).unwrap();

        assert_eq!(plan.native().filters.len(), 1);
        assert_eq!(plan.native().max_rows, None);
        assert_eq!(plan.native().columns, vec![col(&s, "title"), col(&s, "position")]);
        assert_eq!(plan.residual().len(), 3);
        assert!(matches!(plan.residual()[0], ResidualStep::Filter(ref f) if f.len() == 1));
        assert_eq!(plan.residual()[1], ResidualStep::Truncate(5));
        assert_eq!(plan.residual()[2], ResidualStep::Project(vec![col(&s, "title").into()]));
        assert_eq!(plan.header().size(), 1);
    }

    #[test]
    fn test_residual_sort_blocks_limit_pushdown() {
        let s = schema();
        let caps = Capabilities::ALL.with_order_by(false);
        let q = query(&s)
            .select(col(&s, "id"))
            .order_by(OrderByItem::desc(col(&s, "position")))
            .first_row(2)
            .max_rows(1);
        let config = DataContextConfig::default();
        let plan = QueryPlanner::new(&caps, &config).plan(&s, &q).unwrap();

        assert!(plan.native().order_by.is_empty());
        assert_eq!(plan.native().max_rows, None);
        let steps: Vec<String> = plan.residual().iter().map(ToString::to_string).collect();
        assert_eq!(steps, vec!["Sort(position DESC)", "Skip(2)", "Truncate(1)", "Project(id)"]);
    }

    #[test]
    fn test_repeated_and_reordered_select_items_are_projected() {
        let s = schema();
        let config = DataContextConfig::default();
        let q = query(&s).select(col(&s, "title")).select(col(&s, "title"));
        let plan = QueryPlanner::new(&Capabilities::ALL, &config).plan(&s, &q).unwrap();
        assert_eq!(plan.native().columns, vec![col(&s, "title")]);
        assert_eq!(
            plan.residual().to_vec(),
            vec![ResidualStep::Project(vec![col(&s, "title").into(), col(&s, "title").into()])]
        );
        assert_eq!(plan.header().size(), 2);

        // A residual sort on a selected column needs no projection
        let q = query(&s)
            .select(col(&s, "position"))
            .select(col(&s, "title"))
            .order_by(OrderByItem::asc(col(&s, "title")));
        let plan = QueryPlanner::new(&Capabilities::NONE, &config).plan(&s, &q).unwrap();
        assert_eq!(plan.native().columns, vec![col(&s, "position"), col(&s, "title")]);
        let steps: Vec<String> = plan.residual().iter().map(ToString::to_string).collect();
        assert_eq!(steps, vec!["Sort(title ASC)"]);

        let q = query(&s).select(col(&s, "title")).select(col(&s, "position"));
        let plan = QueryPlanner::new(&Capabilities::ALL, &config).plan(&s, &q).unwrap();
        assert!(plan.residual().is_empty());
    }

    #[test]
    fn test_count_paths() {
        let s = schema();
        let config = DataContextConfig::default();
        let q = query(&s).select_count();

        let plan = QueryPlanner::new(&Capabilities::ALL, &config).plan(&s, &q).unwrap();
        assert!(plan.native().count_only);
        assert!(!plan.materializes_count());

        let plan = QueryPlanner::new(&Capabilities::NONE, &config).plan(&s, &q).unwrap();
        assert!(!plan.native().count_only);
        assert!(plan.materializes_count());
        assert_eq!(plan.native().columns, vec![col(&s, "id")]);

        // A residual filter forces materialization even when counting is native
        let caps = Capabilities::ALL.with_filter_ops(&[]);
        let q = query(&s)
            .select_count()
            .filter(FilterItem::new(col(&s, "title"), OperatorType::In, Operand::list(["a", "b"])).unwrap());
        let plan = QueryPlanner::new(&caps, &config).plan(&s, &q).unwrap();
        assert!(plan.materializes_count());
        assert_eq!(plan.native().columns, vec![col(&s, "title")]);
    }

    #[test]
    fn test_count_materialization_can_be_disabled() {
        let s = schema();
        let config = DataContextConfig {
            allow_count_materialization: false,
            ..Default::default()
        };
        let err = QueryPlanner::new(&Capabilities::NONE, &config)
            .plan(&s, &query(&s).select_count())
            .unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_plan_errors() {
        let s = schema();
        let config = DataContextConfig::default();
        let planner = QueryPlanner::new(&Capabilities::ALL, &config);

        let err = planner.plan(&s, &query(&s)).unwrap_err();
        assert!(err.is_plan_error());

        let foreign = Column::new("songs", "lyrics", ColumnType::String);
        let err = planner.plan(&s, &query(&s).select(foreign)).unwrap_err();
        assert!(matches!(err, DataError::ColumnNotFound { ref column, .. } if column == "lyrics"));

        let err = planner
            .plan(&s, &query(&s).select(col(&s, "id")).select_count())
            .unwrap_err();
        assert!(err.is_plan_error());

        let missing = Query::from_table(Table::new("ks", "albums")).select_count();
        assert!(matches!(planner.plan(&s, &missing), Err(DataError::TableNotFound(_))));
    }
}
