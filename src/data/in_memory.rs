use std::sync::Arc;

use super::lifecycle::Lifecycle;
use super::{CursorState, DataSet, DataSetHeader, Row};
use crate::error::DataResult;
use crate::schema::Value;

/// Data set replaying rows that are already in memory. Owns no native resources.
pub struct InMemoryDataSet {
    header: Arc<DataSetHeader>,
    rows: std::vec::IntoIter<Row>,
    row: Option<Row>,
    lifecycle: Lifecycle,
}

impl InMemoryDataSet {
    pub fn new(header: Arc<DataSetHeader>, rows: Vec<Row>) -> Self {
        Self {
            header,
            rows: rows.into_iter(),
            row: None,
            lifecycle: Lifecycle::new(),
        }
    }

    /// One-row, one-column result, as produced by count queries.
    pub fn single_value(header: Arc<DataSetHeader>, value: Value) -> DataResult<Self> {
        let row = Row::new(header.clone(), vec![value])?;
        Ok(Self::new(header, vec![row]))
    }
}

impl DataSet for InMemoryDataSet {
    fn header(&self) -> &Arc<DataSetHeader> {
        &self.header
    }

    fn next(&mut self) -> DataResult<bool> {
        if self.lifecycle.is_done() {
            return Ok(false);
        }
        self.row = self.rows.next();
        if self.row.is_none() {
            self.lifecycle.mark_exhausted();
        }
        Ok(self.row.is_some())
    }

    fn row(&self) -> Option<&Row> {
        self.row.as_ref()
    }

    fn close(&mut self) {
        if self.lifecycle.begin_close() {
            self.row = None;
            self.rows = Vec::new().into_iter();
        }
    }

    fn state(&self) -> CursorState {
        self.lifecycle.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SelectItem;

    #[test]
    fn test_single_value() {
        let header = Arc::new(DataSetHeader::new(vec![SelectItem::count_all()]));
        let mut ds = InMemoryDataSet::single_value(header, Value::BigInt(3)).unwrap();
        let rows = ds.to_rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].to_string(), "Row[values=[3]]");
        assert_eq!(ds.state(), CursorState::Closed);
    }
}
