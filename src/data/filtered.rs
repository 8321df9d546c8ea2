use std::sync::Arc;

use super::lifecycle::{warn_abandoned, Lifecycle};
use super::{CursorState, DataSet, DataSetHeader, Row};
use crate::error::DataResult;
use crate::query::FilterItem;

/// Passes through only the rows satisfying every filter.
pub struct FilteredDataSet {
    inner: Box<dyn DataSet>,
    filters: Vec<(usize, FilterItem)>,
    lifecycle: Lifecycle,
}

impl FilteredDataSet {
    /// Fails when a filter column is not part of the inner header.
    pub fn new(inner: Box<dyn DataSet>, filters: Vec<FilterItem>) -> DataResult<Self> {
        let filters = filters
            .into_iter()
            .map(|f| Ok((inner.header().require_column(f.column())?, f)))
            .collect::<DataResult<Vec<_>>>()?;
        Ok(Self {
            inner,
            filters,
            lifecycle: Lifecycle::new(),
        })
    }

    fn accepts(&self, row: &Row) -> bool {
        self.filters
            .iter()
            .all(|(index, filter)| row.value(*index).is_some_and(|v| filter.evaluate(v)))
    }
}

impl DataSet for FilteredDataSet {
    fn header(&self) -> &Arc<DataSetHeader> {
        self.inner.header()
    }

    fn next(&mut self) -> DataResult<bool> {
        if self.lifecycle.is_done() {
            return Ok(false);
        }
        loop {
            match self.inner.next() {
                Ok(true) => {
                    if self.inner.row().is_some_and(|row| self.accepts(row)) {
                        return Ok(true);
                    }
                }
                Ok(false) => {
                    self.lifecycle.mark_exhausted();
                    return Ok(false);
                }
                Err(e) => {
                    self.close();
                    return Err(e);
                }
            }
        }
    }

    fn row(&self) -> Option<&Row> {
        if self.lifecycle.is_done() {
            return None;
        }
        self.inner.row()
    }

    fn close(&mut self) {
        if self.lifecycle.begin_close() {
            self.inner.close();
        }
    }

    fn state(&self) -> CursorState {
        self.lifecycle.state()
    }
}

impl Drop for FilteredDataSet {
    fn drop(&mut self) {
        if !self.lifecycle.is_closed() {
            warn_abandoned("FilteredDataSet");
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::InMemoryDataSet;
    use crate::query::OperatorType;
    use crate::schema::{Column, ColumnType, Value};

    fn songs() -> (Column, Column, Box<dyn DataSet>) {
        let title = Column::new("songs", "title", ColumnType::String);
        let hit = Column::new("songs", "hit", ColumnType::Boolean);
        let header = Arc::new(DataSetHeader::from_columns([&title, &hit]));
        let rows = [("My first song", true), ("My second song", false), ("My third song", true)]
            .into_iter()
            .map(|(t, h)| Row::new(header.clone(), vec![Value::from(t), Value::from(h)]).unwrap())
            .collect();
        (title, hit, Box::new(InMemoryDataSet::new(header, rows)))
    }

    #[test]
    fn test_keeps_matching_rows_in_order() {
        let (title, hit, inner) = songs();
        let filter = FilterItem::new(hit, OperatorType::Equal, true).unwrap();
        let mut ds = FilteredDataSet::new(inner, vec![filter]).unwrap();

        let titles: Vec<Value> = ds
            .to_rows()
            .unwrap()
            .iter()
            .map(|r| r.get_column(&title).cloned().unwrap())
            .collect();
        assert_eq!(titles, vec![Value::from("My first song"), Value::from("My third song")]);
        assert!(ds.is_closed());
    }

    #[test]
    fn test_unknown_filter_column() {
        let (_, _, inner) = songs();
        let other = Column::new("songs", "position", ColumnType::Integer);
        let filter = FilterItem::new(other, OperatorType::Equal, 1).unwrap();
        assert!(FilteredDataSet::new(inner, vec![filter]).is_err());
    }

    #[test]
    fn test_no_match_exhausts() {
        let (title, _, inner) = songs();
        let filter = FilterItem::new(title, OperatorType::Like, "Your%").unwrap();
        let mut ds = FilteredDataSet::new(inner, vec![filter]).unwrap();
        assert!(!ds.next().unwrap());
        assert_eq!(ds.state(), CursorState::Exhausted);
        ds.close();
    }
}
