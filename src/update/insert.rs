use super::{RowInsertion, UpdateContext};
use crate::backend::Backend;
use crate::error::{DataError, DataResult};
use crate::schema::{Column, Table, Value};

/// Accumulates the values of one row to insert.
pub struct RowInsertionBuilder<'u, 'a, B: Backend> {
    update: &'u UpdateContext<'a, B>,
    table: Table,
    values: Vec<(String, Value)>,
}

impl<'u, 'a, B: Backend> RowInsertionBuilder<'u, 'a, B> {
    pub(super) fn new(update: &'u UpdateContext<'a, B>, table: Table) -> Self {
        Self {
            update,
            table,
            values: Vec::new(),
        }
    }

    /// Set a column value. A later value for the same column replaces the earlier one.
    pub fn value(mut self, column: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        match self.values.iter_mut().find(|(name, _)| name == column) {
            Some(slot) => slot.1 = value,
            None => self.values.push((column.to_string(), value)),
        }
        self
    }

    /// Resolve and type-check the accumulated values.
    pub fn to_insertion(&self) -> DataResult<RowInsertion> {
        let mut values: Vec<(Column, Value)> = Vec::with_capacity(self.values.len());
        for (name, value) in &self.values {
            let column = self.table.require_column(name)?;
            if !value.conforms_to(column.column_type()) {
                return Err(DataError::invalid(format!(
                    "Value {} does not conform to column '{}' of type {}",
                    value,
                    column.name(),
                    column.column_type()
                )));
            }
            values.push((column.clone(), value.clone()));
        }

        for column in self.table.columns() {
            if column.is_nullable() {
                continue;
            }
            let present = values.iter().any(|(c, v)| c == column && !v.is_null());
            if !present && !is_generated(column) {
                return Err(DataError::invalid(format!(
                    "Column '{}' of table '{}' requires a value",
                    column.name(),
                    self.table.name()
                )));
            }
        }

        Ok(RowInsertion {
            table: self.table.clone(),
            values,
        })
    }

    pub fn execute(self) -> DataResult<()> {
        let insertion = self.to_insertion()?;
        let context = self.update.context();
        context.backend().insert(&insertion)?;
        self.update.record_executed();

        tracing::debug!(
            backend = %context.backend().name(),
            table = %self.table.name(),
            values = insertion.values.len(),
            "Inserted row"
        );
        Ok(())
    }
}

/// Document identifiers are assigned by the store when absent.
fn is_generated(column: &Column) -> bool {
    column.is_primary_key() && column.name() == crate::schema::DOCUMENT_ID_COLUMN
}
