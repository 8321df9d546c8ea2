//! Table definitions for stores without a fixed schema.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::{Column, ColumnType, Table};
use crate::error::DataResult;

/// Name of the property holding a document's native identifier.
pub const DOCUMENT_ID_COLUMN: &str = "_id";

/// Plain description of a table: name plus ordered columns and their types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<(String, ColumnType)>,
    #[serde(default)]
    pub primary_keys: Vec<String>,
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_keys: Vec::new(),
        }
    }

    pub fn column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push((name.into(), column_type));
        self
    }

    pub fn primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_keys.push(name.into());
        self
    }

    /// Detect a table definition from sampled documents.
    ///
    /// Keys are taken in sorted order within a document and in first-seen order
    /// across documents; a column's type is taken from its first non-null value
    /// (string when every sample is null). A document identifier column is added
    /// first when the store reports one. Returns `None` when there is nothing to
    /// sample from.
    pub fn from_documents<'a, I>(name: impl Into<String>, documents: I, with_id: bool) -> Option<Self>
    where
        I: IntoIterator<Item = &'a JsonValue>,
    {
        let mut def = TableDef::new(name);
        let mut untyped: Vec<String> = Vec::new();
        let mut sampled = 0usize;

        if with_id {
            def = def
                .column(DOCUMENT_ID_COLUMN, ColumnType::String)
                .primary_key(DOCUMENT_ID_COLUMN);
        }

        for document in documents {
            sampled += 1;
            let Some(fields) = document.as_object() else {
                continue;
            };
            for (property, value) in fields {
                if property == DOCUMENT_ID_COLUMN && with_id {
                    continue;
                }
                let known = def.columns.iter().any(|(n, _)| n == property);
                match ColumnType::infer_from_json(value) {
                    Some(column_type) if !known => {
                        def.columns.push((property.clone(), column_type));
                        untyped.retain(|n| n != property);
                    }
                    Some(column_type) => {
                        if let Some(pos) = untyped.iter().position(|n| n == property) {
                            untyped.remove(pos);
                            if let Some(entry) = def.columns.iter_mut().find(|(n, _)| n == property) {
                                entry.1 = column_type;
                            }
                        }
                    }
                    None if !known => {
                        def.columns.push((property.clone(), ColumnType::String));
                        untyped.push(property.clone());
                    }
                    None => {}
                }
            }
        }

        if sampled == 0 {
            return None;
        }
        Some(def)
    }

    /// Materialize the definition as a schema table.
    pub fn to_table(&self, schema: &str) -> DataResult<Table> {
        let mut table = Table::new(schema, self.name.clone());
        for (name, column_type) in &self.columns {
            let is_pk = self.primary_keys.iter().any(|pk| pk == name);
            table.add_column(Column::new(&self.name, name.clone(), *column_type).with_primary_key(is_pk))?;
        }
        Ok(table)
    }
}
