use super::{RowDeletion, UpdateContext};
use crate::backend::Backend;
use crate::error::DataResult;
use crate::query::{FilterItem, Operand, OperatorType};
use crate::schema::Table;

/// Accumulates the predicates selecting the rows to delete.
pub struct RowDeletionBuilder<'u, 'a, B: Backend> {
    update: &'u UpdateContext<'a, B>,
    table: Table,
    predicates: Vec<(String, OperatorType, Operand)>,
}

impl<'u, 'a, B: Backend> RowDeletionBuilder<'u, 'a, B> {
    pub(super) fn new(update: &'u UpdateContext<'a, B>, table: Table) -> Self {
        Self {
            update,
            table,
            predicates: Vec::new(),
        }
    }

    pub fn where_(mut self, column: &str, operator: OperatorType, operand: impl Into<Operand>) -> Self {
        self.predicates.push((column.to_string(), operator, operand.into()));
        self
    }

    pub fn to_deletion(&self) -> DataResult<RowDeletion> {
        let filters = self
            .predicates
            .iter()
            .map(|(name, op, operand)| {
                let column = self.table.require_column(name)?;
                FilterItem::new(column.clone(), *op, operand.clone())
            })
            .collect::<DataResult<Vec<_>>>()?;
        Ok(RowDeletion {
            table: self.table.clone(),
            filters,
        })
    }

    /// Delete the matching rows and return how many were removed.
    pub fn execute(self) -> DataResult<u64> {
        let deletion = self.to_deletion()?;
        let context = self.update.context();
        let deleted = context.backend().delete(&deletion)?;
        self.update.record_executed();

        tracing::debug!(
            backend = %context.backend().name(),
            table = %self.table.name(),
            predicates = deletion.filters.len(),
            deleted,
            "Deleted rows"
        );
        Ok(deleted)
    }
}
