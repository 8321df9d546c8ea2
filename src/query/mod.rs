//! Abstract query model.
//!
//! Queries are built against resolved schema objects; the planner decides which parts
//! are executed by the backend and which are postprocessed locally.

mod builder;
mod eval;
pub mod planner;

pub use builder::QueryBuilder;
pub use planner::{
    CapabilityProbe, Capabilities, NativeQuery, QueryPlan, QueryPlanner, ResidualStep,
};

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DataError, DataResult};
use crate::schema::{Column, Table, Value};

/// Comparison operators usable in filter predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatorType {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    In,
    Like,
}

impl OperatorType {
    pub fn is_range(self) -> bool {
        matches!(
            self,
            OperatorType::LessThan
                | OperatorType::LessThanOrEqual
                | OperatorType::GreaterThan
                | OperatorType::GreaterThanOrEqual
        )
    }
}

impl fmt::Display for OperatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            OperatorType::Equal => "=",
            OperatorType::NotEqual => "<>",
            OperatorType::LessThan => "<",
            OperatorType::LessThanOrEqual => "<=",
            OperatorType::GreaterThan => ">",
            OperatorType::GreaterThanOrEqual => ">=",
            OperatorType::In => "IN",
            OperatorType::Like => "LIKE",
        };
        f.write_str(symbol)
    }
}

/// Right-hand side of a filter predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    List(Vec<Value>),
}

impl Operand {
    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Operand::List(values.into_iter().map(Into::into).collect())
    }
}

impl<V: Into<Value>> From<V> for Operand {
    fn from(value: V) -> Self {
        Operand::Value(value.into())
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Value(Value::String(s)) => write!(f, "'{}'", s),
            Operand::Value(v) => write!(f, "{}", v),
            Operand::List(values) => {
                f.write_str("(")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", Operand::Value(v.clone()))?;
                }
                f.write_str(")")
            }
        }
    }
}

/// A single predicate `column <op> operand`. A query's filters form a conjunction.
#[derive(Debug, Clone)]
pub struct FilterItem {
    column: Column,
    operator: OperatorType,
    operand: Operand,
    pattern: Option<Regex>,
}

impl FilterItem {
    /// Build a predicate, rejecting malformed operator/operand combinations.
    pub fn new(column: Column, operator: OperatorType, operand: impl Into<Operand>) -> DataResult<Self> {
        let operand = operand.into();
        let pattern = match (operator, &operand) {
            (OperatorType::In, Operand::List(_)) => None,
            (OperatorType::In, Operand::Value(_)) => {
                return Err(DataError::invalid(format!(
                    "IN on column '{}' requires a list operand",
                    column.name()
                )));
            }
            (_, Operand::List(_)) => {
                return Err(DataError::invalid(format!(
                    "Operator {} on column '{}' does not accept a list operand",
                    operator,
                    column.name()
                )));
            }
            (OperatorType::Like, Operand::Value(Value::String(p))) => Some(
                eval::like_to_regex(p)
                    .map_err(|e| DataError::invalid(format!("Invalid LIKE pattern '{}': {}", p, e)))?,
            ),
            (OperatorType::Like, Operand::Value(_)) => {
                return Err(DataError::invalid(format!(
                    "LIKE on column '{}' requires a string pattern",
                    column.name()
                )));
            }
            (op, Operand::Value(Value::Null)) if op.is_range() => {
                return Err(DataError::invalid(format!(
                    "Operator {} on column '{}' cannot compare against null",
                    op,
                    column.name()
                )));
            }
            _ => None,
        };

        Ok(Self {
            column,
            operator,
            operand,
            pattern,
        })
    }

    pub fn column(&self) -> &Column {
        &self.column
    }

    pub fn operator(&self) -> OperatorType {
        self.operator
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    /// Evaluate the predicate against the column's value in a row.
    pub fn evaluate(&self, value: &Value) -> bool {
        eval::evaluate(self.operator, value, &self.operand, self.pattern.as_ref())
    }
}

impl PartialEq for FilterItem {
    fn eq(&self, other: &Self) -> bool {
        self.column == other.column && self.operator == other.operator && self.operand == other.operand
    }
}

impl fmt::Display for FilterItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column.name(), self.operator, self.operand)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateFunction {
    Count,
}

/// An item of the select list: a column, or an aggregate over one (`None` = `*`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SelectItem {
    Column(Column),
    Aggregate {
        function: AggregateFunction,
        column: Option<Column>,
    },
}

impl SelectItem {
    pub fn count_all() -> Self {
        SelectItem::Aggregate {
            function: AggregateFunction::Count,
            column: None,
        }
    }

    pub fn column(&self) -> Option<&Column> {
        match self {
            SelectItem::Column(c) => Some(c),
            SelectItem::Aggregate { column, .. } => column.as_ref(),
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, SelectItem::Aggregate { .. })
    }
}

impl From<Column> for SelectItem {
    fn from(column: Column) -> Self {
        SelectItem::Column(column)
    }
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectItem::Column(c) => f.write_str(c.name()),
            SelectItem::Aggregate { function, column } => {
                let name = match function {
                    AggregateFunction::Count => "COUNT",
                };
                match column {
                    Some(c) => write!(f, "{}({})", name, c.name()),
                    None => write!(f, "{}(*)", name),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderByItem {
    column: Column,
    ascending: bool,
}

impl OrderByItem {
    pub fn asc(column: Column) -> Self {
        Self {
            column,
            ascending: true,
        }
    }

    pub fn desc(column: Column) -> Self {
        Self {
            column,
            ascending: false,
        }
    }

    pub fn column(&self) -> &Column {
        &self.column
    }

    pub fn is_ascending(&self) -> bool {
        self.ascending
    }
}

/// Abstract single-table query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    table: Table,
    select: Vec<SelectItem>,
    filters: Vec<FilterItem>,
    order_by: Vec<OrderByItem>,
    first_row: Option<usize>,
    max_rows: Option<usize>,
}

impl Query {
    pub fn from_table(table: Table) -> Self {
        Self {
            table,
            select: Vec::new(),
            filters: Vec::new(),
            order_by: Vec::new(),
            first_row: None,
            max_rows: None,
        }
    }

    pub fn select(mut self, item: impl Into<SelectItem>) -> Self {
        self.select.push(item.into());
        self
    }

    pub fn select_all(mut self) -> Self {
        let columns: Vec<SelectItem> = self.table.columns().iter().cloned().map(SelectItem::Column).collect();
        self.select.extend(columns);
        self
    }

    pub fn select_count(mut self) -> Self {
        self.select.push(SelectItem::count_all());
        self
    }

    pub fn filter(mut self, filter: FilterItem) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, item: OrderByItem) -> Self {
        self.order_by.push(item);
        self
    }

    /// Skip the first `n` rows (0-based offset).
    pub fn first_row(mut self, n: usize) -> Self {
        self.first_row = Some(n);
        self
    }

    pub fn max_rows(mut self, n: usize) -> Self {
        self.max_rows = Some(n);
        self
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn select_items(&self) -> &[SelectItem] {
        &self.select
    }

    pub fn filters(&self) -> &[FilterItem] {
        &self.filters
    }

    pub fn order_by_items(&self) -> &[OrderByItem] {
        &self.order_by
    }

    pub fn first_row_offset(&self) -> Option<usize> {
        self.first_row
    }

    pub fn max_rows_limit(&self) -> Option<usize> {
        self.max_rows
    }

    /// True when the select list is exactly one `COUNT(*)`.
    pub fn is_count_query(&self) -> bool {
        matches!(
            self.select.as_slice(),
            [SelectItem::Aggregate {
                function: AggregateFunction::Count,
                column: None
            }]
        )
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        for (i, item) in self.select.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", item)?;
        }
        write!(f, " FROM {}", self.table.name())?;
        for (i, filter) in self.filters.iter().enumerate() {
            f.write_str(if i == 0 { " WHERE " } else { " AND " })?;
            write!(f, "{}", filter)?;
        }
        for (i, item) in self.order_by.iter().enumerate() {
            f.write_str(if i == 0 { " ORDER BY " } else { ", " })?;
            write!(f, "{} {}", item.column.name(), if item.ascending { "ASC" } else { "DESC" })?;
        }
        if let Some(first) = self.first_row {
            write!(f, " OFFSET {}", first)?;
        }
        if let Some(max) = self.max_rows {
            write!(f, " LIMIT {}", max)?;
        }
        Ok(())
    }
}
