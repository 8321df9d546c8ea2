//! Schema model: schemas, tables and columns discovered from a backend.
//!
//! A schema is built once per [`DataContext`](crate::DataContext) and is only changed
//! afterwards by table creation/drop through the update protocol.

mod infer;
mod types;

pub use infer::{TableDef, DOCUMENT_ID_COLUMN};
pub use types::{ColumnType, Value};

pub(crate) use types::parse_timestamp;

use serde::{Deserialize, Serialize};

use crate::error::{DataError, DataResult};

/// Column of a table. Its type is fixed once discovered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    name: String,
    table: String,
    column_type: ColumnType,
    nullable: bool,
    primary_key: bool,
}

impl Column {
    pub fn new(table: impl Into<String>, name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            column_type,
            nullable: true,
            primary_key: false,
        }
    }

    pub fn with_primary_key(mut self, primary_key: bool) -> Self {
        self.primary_key = primary_key;
        if primary_key {
            self.nullable = false;
        }
        self
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    name: String,
    schema: String,
    columns: Vec<Column>,
}

impl Table {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
            columns: Vec::new(),
        }
    }

    /// Append a column, rebinding it to this table. Duplicate names are rejected.
    pub fn add_column(&mut self, column: Column) -> DataResult<()> {
        if self.columns.iter().any(|c| c.name == column.name) {
            return Err(DataError::invalid(format!(
                "Column '{}' already defined in table '{}'",
                column.name, self.name
            )));
        }
        self.columns.push(Column {
            table: self.name.clone(),
            ..column
        });
        Ok(())
    }

    pub fn with_column(mut self, column: Column) -> DataResult<Self> {
        self.add_column(column)?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema_name(&self) -> &str {
        &self.schema
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Exact match first, then a case-insensitive match.
    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .or_else(|| self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name)))
    }

    /// Resolve a column or fail with a plan error.
    pub fn require_column(&self, name: &str) -> DataResult<&Column> {
        self.column_by_name(name)
            .ok_or_else(|| DataError::ColumnNotFound {
                table: self.name.clone(),
                column: name.to_string(),
            })
    }

    pub fn contains_column(&self, column: &Column) -> bool {
        column.table == self.name && self.columns.iter().any(|c| c == column)
    }

    pub fn primary_keys(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.primary_key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    name: String,
    tables: Vec<Table>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn table_by_name(&self, name: &str) -> Option<&Table> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .or_else(|| self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name)))
    }

    pub fn require_table(&self, name: &str) -> DataResult<&Table> {
        self.table_by_name(name)
            .ok_or_else(|| DataError::TableNotFound(name.to_string()))
    }

    /// Add a table; names are unique within a schema.
    pub fn add_table(&mut self, table: Table) -> DataResult<()> {
        if self.tables.iter().any(|t| t.name == table.name) {
            return Err(DataError::invalid(format!(
                "Table '{}' already exists in schema '{}'",
                table.name, self.name
            )));
        }
        self.tables.push(Table {
            schema: self.name.clone(),
            ..table
        });
        Ok(())
    }

    pub fn with_table(mut self, table: Table) -> DataResult<Self> {
        self.add_table(table)?;
        Ok(self)
    }

    pub(crate) fn remove_table(&mut self, name: &str) -> Option<Table> {
        let idx = self.tables.iter().position(|t| t.name == name)?;
        Some(self.tables.remove(idx))
    }
}
