use super::{TableCreation, UpdateContext};
use crate::backend::Backend;
use crate::error::{DataError, DataResult};
use crate::schema::{Column, ColumnType, Table};

#[derive(Debug)]
struct ColumnSpec {
    name: String,
    column_type: ColumnType,
    nullable: bool,
    primary_key: bool,
}

/// Accumulates the columns of a table to create.
///
/// `of_type`, `nullable` and `primary_key` apply to the column most recently added with
/// `with_column`. Columns default to nullable strings.
pub struct TableCreationBuilder<'u, 'a, B: Backend> {
    update: &'u UpdateContext<'a, B>,
    name: String,
    columns: Vec<ColumnSpec>,
    misuse: Option<String>,
}

impl<'u, 'a, B: Backend> TableCreationBuilder<'u, 'a, B> {
    pub(super) fn new(update: &'u UpdateContext<'a, B>, name: &str) -> Self {
        Self {
            update,
            name: name.to_string(),
            columns: Vec::new(),
            misuse: None,
        }
    }

    pub fn with_column(mut self, name: &str) -> Self {
        self.columns.push(ColumnSpec {
            name: name.to_string(),
            column_type: ColumnType::String,
            nullable: true,
            primary_key: false,
        });
        self
    }

    pub fn of_type(self, column_type: ColumnType) -> Self {
        self.modify("of_type", |c| c.column_type = column_type)
    }

    pub fn nullable(self, nullable: bool) -> Self {
        self.modify("nullable", |c| c.nullable = nullable)
    }

    pub fn primary_key(self) -> Self {
        self.modify("primary_key", |c| {
            c.primary_key = true;
            c.nullable = false;
        })
    }

    fn modify(mut self, what: &str, f: impl FnOnce(&mut ColumnSpec)) -> Self {
        match self.columns.last_mut() {
            Some(column) => f(column),
            None => {
                self.misuse
                    .get_or_insert_with(|| format!("{}() called before with_column()", what));
            }
        }
        self
    }

    /// Build the table definition without executing.
    pub fn to_table(&self) -> DataResult<Table> {
        if let Some(misuse) = &self.misuse {
            return Err(DataError::invalid(misuse.clone()));
        }
        if self.name.trim().is_empty() {
            return Err(DataError::invalid("Table name must not be empty"));
        }
        if self.columns.is_empty() {
            return Err(DataError::invalid(format!("Table '{}' has no columns", self.name)));
        }

        let schema = self.update.context().default_schema_name();
        let mut table = Table::new(schema, self.name.clone());
        for spec in &self.columns {
            let column = Column::new(&self.name, spec.name.clone(), spec.column_type)
                .with_nullable(spec.nullable)
                .with_primary_key(spec.primary_key);
            table.add_column(column)?;
        }
        Ok(table)
    }

    /// Create the table and add it to the context schema.
    pub fn execute(self) -> DataResult<Table> {
        let table = self.to_table()?;
        let context = self.update.context();
        if context.contains_table(table.name()) {
            return Err(DataError::invalid(format!("Table '{}' already exists", table.name())));
        }

        let creation = TableCreation { table };
        context.backend().create_table(&creation)?;
        context.register_table(creation.table.clone())?;
        self.update.record_executed();

        tracing::info!(
            backend = %context.backend().name(),
            table = %creation.table.name(),
            columns = creation.table.columns().len(),
            "Created table"
        );
        Ok(creation.table)
    }
}
