//! Cursor engine.
//!
//! A [`DataSet`] is a single-pass cursor over rows that share one header. Backends hand
//! back raw cursors or scrollable pages; residual query steps are layered on top as
//! decorators, each owning exactly one inner data set:
//!
//! ```text
//! Projected -> MaxRows -> FirstRow -> Ordered -> Filtered -> RawCursor | Scrolling
//! ```
//!
//! Lifecycle: `Open -> (Open | Exhausted) -> Closed`. Exhaustion is terminal and
//! `close()` is idempotent. Callers are expected to close every data set they obtain
//! (or use [`DataContext::with_query`](crate::DataContext::with_query)); dropping an
//! unclosed data set closes it and logs a warning.

mod decode;
mod filtered;
mod in_memory;
mod lifecycle;
mod max_rows;
mod ordered;
mod projected;
mod raw;
mod scroll;

pub use decode::{decode_value, encode_value, DefaultRowTranslator, RowTranslator};
pub use filtered::FilteredDataSet;
pub use in_memory::InMemoryDataSet;
pub use lifecycle::CursorState;
pub use max_rows::{FirstRowDataSet, MaxRowsDataSet};
pub use ordered::OrderedDataSet;
pub use projected::ProjectedDataSet;
pub use raw::{RawCursor, RawCursorDataSet, RawRecord, VecRawCursor};
pub use scroll::{ContinuationToken, PageSource, RawPage, ScrollingDataSet};


use std::fmt;
use std::sync::Arc;

use crate::error::{DataError, DataResult};
use crate::query::SelectItem;
use crate::schema::{Column, Value};

/// Ordered, immutable select items shared by every row of a data set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSetHeader {
    items: Vec<SelectItem>,
}

impl DataSetHeader {
    pub fn new(items: Vec<SelectItem>) -> Self {
        Self { items }
    }

    pub fn from_columns<'a, I>(columns: I) -> Self
    where
        I: IntoIterator<Item = &'a Column>,
    {
        Self {
            items: columns.into_iter().cloned().map(SelectItem::Column).collect(),
        }
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[SelectItem] {
        &self.items
    }

    pub fn item(&self, index: usize) -> Option<&SelectItem> {
        self.items.get(index)
    }

    pub fn index_of(&self, item: &SelectItem) -> Option<usize> {
        self.items.iter().position(|i| i == item)
    }

    pub fn index_of_column(&self, column: &Column) -> Option<usize> {
        self.items
            .iter()
            .position(|i| matches!(i, SelectItem::Column(c) if c == column))
    }

    pub(crate) fn require_column(&self, column: &Column) -> DataResult<usize> {
        self.index_of_column(column).ok_or_else(|| {
            DataError::invalid(format!(
                "Column '{}' is not part of the data set header",
                column.name()
            ))
        })
    }
}

/// Fixed-length row aligned 1:1 with its header.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    header: Arc<DataSetHeader>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(header: Arc<DataSetHeader>, values: Vec<Value>) -> DataResult<Self> {
        if values.len() != header.size() {
            return Err(DataError::invalid(format!(
                "Row has {} values but header has {} items",
                values.len(),
                header.size()
            )));
        }
        Ok(Self { header, values })
    }

    pub fn header(&self) -> &Arc<DataSetHeader> {
        &self.header
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get(&self, item: &SelectItem) -> Option<&Value> {
        self.header.index_of(item).and_then(|i| self.values.get(i))
    }

    pub fn get_column(&self, column: &Column) -> Option<&Value> {
        self.header.index_of_column(column).and_then(|i| self.values.get(i))
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Row[values=[")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", value)?;
        }
        f.write_str("]]")
    }
}

/// Single-pass, stateful cursor over query result rows.
pub trait DataSet: Send {
    fn header(&self) -> &Arc<DataSetHeader>;

    /// Advance to the next row. `Ok(false)` means exhausted, and stays so.
    fn next(&mut self) -> DataResult<bool>;

    /// Current row; `None` before the first advance and after exhaustion or close.
    fn row(&self) -> Option<&Row>;

    /// Release every native resource this data set owns. Idempotent, never fails.
    fn close(&mut self);

    fn state(&self) -> CursorState;

    fn is_closed(&self) -> bool {
        self.state() == CursorState::Closed
    }

    /// Drain all remaining rows, then close.
    fn to_rows(&mut self) -> DataResult<Vec<Row>> {
        let mut rows = Vec::new();
        let outcome = loop {
            match self.next() {
                Ok(true) => {
                    if let Some(row) = self.row() {
                        rows.push(row.clone());
                    }
                }
                Ok(false) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.close();
        outcome.map(|_| rows)
    }

    /// Drain all remaining rows as plain value vectors, then close.
    fn to_value_rows(&mut self) -> DataResult<Vec<Vec<Value>>> {
        Ok(self.to_rows()?.into_iter().map(Row::into_values).collect())
    }
}

impl fmt::Debug for dyn DataSet + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSet")
            .field("header", self.header())
            .field("state", &self.state())
            .finish()
    }
}

impl<'a> dyn DataSet + 'a {
    /// Iterate the remaining rows. The data set is not closed by the iterator.
    pub fn rows(&mut self) -> Rows<'_, 'a> {
        Rows { data_set: self }
    }
}

/// Iterator over the rows of a borrowed data set.
pub struct Rows<'s, 'a> {
    data_set: &'s mut (dyn DataSet + 'a),
}

impl Iterator for Rows<'_, '_> {
    type Item = DataResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.data_set.next() {
            Ok(true) => self.data_set.row().cloned().map(Ok),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
