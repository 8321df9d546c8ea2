//! Mutation builders.
//!
//! Builders are requested from an [`UpdateContext`] by capability; a denied capability
//! fails at request time, before any backend call. A builder only accumulates intent.
//! `execute()` validates it, issues the single backend call and reports every failure.
//! The backend's update-finished hook runs once after the whole batch passed to
//! [`DataContext::execute_update`] succeeds.

mod create;
mod delete;
mod drop;
mod insert;

pub use create::TableCreationBuilder;
pub use delete::RowDeletionBuilder;
pub use drop::TableDropBuilder;
pub use insert::RowInsertionBuilder;

use std::cell::Cell;

use serde_json::{Map, Value as JsonValue};

use crate::backend::Backend;
use crate::context::DataContext;
use crate::data::{encode_value, Row};
use crate::error::{DataError, DataResult};
use crate::query::FilterItem;
use crate::schema::{Column, Table, Value};

/// Intent to create a table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableCreation {
    pub table: Table,
}

/// Intent to insert one row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowInsertion {
    pub table: Table,
    pub values: Vec<(Column, Value)>,
}

impl RowInsertion {
    pub fn value_of(&self, column: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(c, _)| c.name() == column)
            .map(|(_, v)| v)
    }

    /// The row as a JSON document keyed by column name.
    pub fn to_document(&self) -> JsonValue {
        let map: Map<String, JsonValue> = self
            .values
            .iter()
            .map(|(c, v)| (c.name().to_string(), encode_value(v)))
            .collect();
        JsonValue::Object(map)
    }
}

/// Intent to delete every row matching all filters. No filters deletes every row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowDeletion {
    pub table: Table,
    pub filters: Vec<FilterItem>,
}

impl RowDeletion {
    pub fn matches(&self, row: &Row) -> bool {
        self.filters
            .iter()
            .all(|f| row.get_column(f.column()).is_some_and(|v| f.evaluate(v)))
    }
}

/// Scope of one mutation batch.
pub struct UpdateContext<'a, B: Backend> {
    context: &'a DataContext<B>,
    executed: Cell<usize>,
}

impl<'a, B: Backend> UpdateContext<'a, B> {
    pub(crate) fn new(context: &'a DataContext<B>) -> Self {
        Self {
            context,
            executed: Cell::new(0),
        }
    }

    pub fn is_create_table_supported(&self) -> bool {
        self.context.backend().capabilities().supports_create_table()
    }

    pub fn is_drop_table_supported(&self) -> bool {
        self.context.backend().capabilities().supports_drop_table()
    }

    pub fn is_insert_supported(&self) -> bool {
        self.context.backend().capabilities().supports_insert()
    }

    pub fn is_delete_supported(&self) -> bool {
        self.context.backend().capabilities().supports_delete()
    }

    pub fn create_table(&self, name: &str) -> DataResult<TableCreationBuilder<'_, 'a, B>> {
        if !self.is_create_table_supported() {
            return Err(self.denied("create table"));
        }
        Ok(TableCreationBuilder::new(self, name))
    }

    pub fn drop_table(&self, name: &str) -> DataResult<TableDropBuilder<'_, 'a, B>> {
        if !self.is_drop_table_supported() {
            return Err(self.denied("drop table"));
        }
        let table = self.context.table(name)?;
        Ok(TableDropBuilder::new(self, table))
    }

    pub fn insert_into(&self, table: &str) -> DataResult<RowInsertionBuilder<'_, 'a, B>> {
        if !self.is_insert_supported() {
            return Err(self.denied("insert"));
        }
        let table = self.context.table(table)?;
        Ok(RowInsertionBuilder::new(self, table))
    }

    pub fn delete_from(&self, table: &str) -> DataResult<RowDeletionBuilder<'_, 'a, B>> {
        if !self.is_delete_supported() {
            return Err(self.denied("delete"));
        }
        let table = self.context.table(table)?;
        Ok(RowDeletionBuilder::new(self, table))
    }

    /// Number of mutations executed so far in this batch.
    pub fn executed(&self) -> usize {
        self.executed.get()
    }

    pub(crate) fn context(&self) -> &'a DataContext<B> {
        self.context
    }

    pub(crate) fn record_executed(&self) {
        self.executed.set(self.executed.get() + 1);
    }

    fn denied(&self, what: &str) -> DataError {
        DataError::unsupported(format!(
            "Backend '{}' does not support {}",
            self.context.backend().name(),
            what
        ))
    }
}
