use super::UpdateContext;
use crate::backend::Backend;
use crate::error::DataResult;
use crate::schema::Table;

pub struct TableDropBuilder<'u, 'a, B: Backend> {
    update: &'u UpdateContext<'a, B>,
    table: Table,
}

impl<'u, 'a, B: Backend> TableDropBuilder<'u, 'a, B> {
    pub(super) fn new(update: &'u UpdateContext<'a, B>, table: Table) -> Self {
        Self { update, table }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Drop the table; it leaves the context schema once the backend confirms.
    pub fn execute(self) -> DataResult<()> {
        let context = self.update.context();
        context.backend().drop_table(&self.table)?;
        context.unregister_table(self.table.name());
        self.update.record_executed();

        tracing::info!(
            backend = %context.backend().name(),
            table = %self.table.name(),
            "Dropped table"
        );
        Ok(())
    }
}
