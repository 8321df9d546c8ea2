use super::{FilterItem, Operand, OperatorType, OrderByItem, Query, SelectItem};
use crate::backend::Backend;
use crate::context::DataContext;
use crate::data::DataSet;
use crate::error::{DataError, DataResult};

#[derive(Debug, Clone)]
enum SelectSpec {
    Column(String),
    All,
    Count,
}

/// Fluent query construction by name.
///
/// Names are resolved against the context schema in [`build`](Self::build), so an
/// unknown table or column fails there, before anything reaches the backend.
pub struct QueryBuilder<'a, B: Backend> {
    context: &'a DataContext<B>,
    table: Option<String>,
    select: Vec<SelectSpec>,
    filters: Vec<(String, OperatorType, Operand)>,
    order_by: Vec<(String, bool)>,
    first_row: Option<usize>,
    max_rows: Option<usize>,
}

impl<'a, B: Backend> QueryBuilder<'a, B> {
    pub(crate) fn new(context: &'a DataContext<B>) -> Self {
        Self {
            context,
            table: None,
            select: Vec::new(),
            filters: Vec::new(),
            order_by: Vec::new(),
            first_row: None,
            max_rows: None,
        }
    }

    pub fn from(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn select(mut self, column: &str) -> Self {
        self.select.push(SelectSpec::Column(column.to_string()));
        self
    }

    pub fn select_all(mut self) -> Self {
        self.select.push(SelectSpec::All);
        self
    }

    pub fn select_count(mut self) -> Self {
        self.select.push(SelectSpec::Count);
        self
    }

    pub fn filter(mut self, column: &str, operator: OperatorType, operand: impl Into<Operand>) -> Self {
        self.filters.push((column.to_string(), operator, operand.into()));
        self
    }

    pub fn where_eq(self, column: &str, operand: impl Into<Operand>) -> Self {
        self.filter(column, OperatorType::Equal, operand)
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.order_by.push((column.to_string(), true));
        self
    }

    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.order_by.push((column.to_string(), false));
        self
    }

    pub fn first_row(mut self, n: usize) -> Self {
        self.first_row = Some(n);
        self
    }

    pub fn max_rows(mut self, n: usize) -> Self {
        self.max_rows = Some(n);
        self
    }

    pub fn build(&self) -> DataResult<Query> {
        let name = self
            .table
            .as_deref()
            .ok_or_else(|| DataError::invalid("Query has no FROM table"))?;
        let table = self.context.table(name)?;

        let mut query = Query::from_table(table.clone());
        for spec in &self.select {
            query = match spec {
                SelectSpec::Column(c) => query.select(SelectItem::Column(table.require_column(c)?.clone())),
                SelectSpec::All => query.select_all(),
                SelectSpec::Count => query.select_count(),
            };
        }
        for (column, operator, operand) in &self.filters {
            let column = table.require_column(column)?.clone();
            query = query.filter(FilterItem::new(column, *operator, operand.clone())?);
        }
        for (column, ascending) in &self.order_by {
            let column = table.require_column(column)?.clone();
            query = query.order_by(if *ascending {
                OrderByItem::asc(column)
            } else {
                OrderByItem::desc(column)
            });
        }
        if let Some(n) = self.first_row {
            query = query.first_row(n);
        }
        if let Some(n) = self.max_rows {
            query = query.max_rows(n);
        }
        Ok(query)
    }

    /// Build and execute. The caller must close the returned data set.
    pub fn execute(&self) -> DataResult<Box<dyn DataSet>> {
        let query = self.build()?;
        self.context.execute_query(&query)
    }
}
