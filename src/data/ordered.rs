use std::cmp::Ordering;
use std::sync::Arc;

use super::lifecycle::{warn_abandoned, Lifecycle};
use super::{CursorState, DataSet, DataSetHeader, Row};
use crate::error::{DataError, DataResult};
use crate::query::OrderByItem;

/// Sorts the inner data set locally.
///
/// The first advance drains and closes the inner data set, buffering every row, then
/// rows are replayed in order. The sort is stable; nulls sort first in ascending order.
pub struct OrderedDataSet {
    header: Arc<DataSetHeader>,
    inner: Option<Box<dyn DataSet>>,
    keys: Vec<(usize, bool)>,
    buffer_limit: Option<usize>,
    sorted: std::vec::IntoIter<Row>,
    row: Option<Row>,
    lifecycle: Lifecycle,
}

impl OrderedDataSet {
    pub fn new(inner: Box<dyn DataSet>, order_by: &[OrderByItem], buffer_limit: Option<usize>) -> DataResult<Self> {
        let keys = order_by
            .iter()
            .map(|item| Ok((inner.header().require_column(item.column())?, item.is_ascending())))
            .collect::<DataResult<Vec<_>>>()?;
        Ok(Self {
            header: inner.header().clone(),
            inner: Some(inner),
            keys,
            buffer_limit,
            sorted: Vec::new().into_iter(),
            row: None,
            lifecycle: Lifecycle::new(),
        })
    }

    fn fill(&mut self, mut inner: Box<dyn DataSet>) -> DataResult<()> {
        let mut rows = Vec::new();
        let drained = loop {
            match inner.next() {
                Ok(true) => {
                    if let Some(row) = inner.row() {
                        rows.push(row.clone());
                    }
                    if let Some(limit) = self.buffer_limit {
                        if rows.len() > limit {
                            break Err(DataError::unsupported(format!(
                                "Sorting more than {} rows locally",
                                limit
                            )));
                        }
                    }
                }
                Ok(false) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        inner.close();
        drained?;

        let keys = &self.keys;
        rows.sort_by(|a, b| compare_rows(a, b, keys));
        self.sorted = rows.into_iter();
        Ok(())
    }

    fn advance(&mut self) -> DataResult<bool> {
        if let Some(inner) = self.inner.take() {
            self.fill(inner)?;
        }
        self.row = self.sorted.next();
        Ok(self.row.is_some())
    }
}

fn compare_rows(a: &Row, b: &Row, keys: &[(usize, bool)]) -> Ordering {
    for &(index, ascending) in keys {
        let ordering = match (a.value(index), b.value(index)) {
            (Some(x), Some(y)) => x.sort_compare(y),
            _ => Ordering::Equal,
        };
        let ordering = if ascending { ordering } else { ordering.reverse() };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

impl DataSet for OrderedDataSet {
    fn header(&self) -> &Arc<DataSetHeader> {
        &self.header
    }

    fn next(&mut self) -> DataResult<bool> {
        if self.lifecycle.is_done() {
            return Ok(false);
        }
        match self.advance() {
            Ok(true) => Ok(true),
            Ok(false) => {
                self.lifecycle.mark_exhausted();
                Ok(false)
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    fn row(&self) -> Option<&Row> {
        self.row.as_ref()
    }

    fn close(&mut self) {
        if !self.lifecycle.begin_close() {
            return;
        }
        self.row = None;
        self.sorted = Vec::new().into_iter();
        if let Some(mut inner) = self.inner.take() {
            inner.close();
        }
    }

    fn state(&self) -> CursorState {
        self.lifecycle.state()
    }
}

impl Drop for OrderedDataSet {
    fn drop(&mut self) {
        if !self.lifecycle.is_closed() {
            warn_abandoned("OrderedDataSet");
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::InMemoryDataSet;
    use crate::schema::{Column, ColumnType, Value};

    fn columns() -> (Column, Column) {
        (
            Column::new("songs", "title", ColumnType::String),
            Column::new("songs", "position", ColumnType::Integer),
        )
    }

    fn data(rows: &[(&str, Option<i32>)]) -> Box<dyn DataSet> {
        let (title, position) = columns();
        let header = Arc::new(DataSetHeader::from_columns([&title, &position]));
        let rows = rows
            .iter()
            .map(|(t, p)| Row::new(header.clone(), vec![Value::from(*t), Value::from(*p)]).unwrap())
            .collect();
        Box::new(InMemoryDataSet::new(header, rows))
    }

    fn titles(ds: &mut dyn DataSet) -> Vec<String> {
        ds.to_rows()
            .unwrap()
            .iter()
            .map(|r| r.value(0).and_then(Value::as_str).unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_descending_with_nulls() {
        let (_, position) = columns();
        let inner = data(&[("a", Some(2)), ("b", None), ("c", Some(3))]);
        let mut ds = OrderedDataSet::new(inner, &[OrderByItem::desc(position.clone())], None).unwrap();
        assert_eq!(titles(&mut ds), vec!["c", "a", "b"]);

        let inner = data(&[("a", Some(2)), ("b", None), ("c", Some(3))]);
        let mut ds = OrderedDataSet::new(inner, &[OrderByItem::asc(position)], None).unwrap();
        assert_eq!(titles(&mut ds), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_stable_multi_key() {
        let (title, position) = columns();
        let inner = data(&[("b", Some(1)), ("a", Some(1)), ("c", Some(0)), ("a", Some(0))]);
        let mut ds = OrderedDataSet::new(
            inner,
            &[OrderByItem::asc(position.clone()), OrderByItem::asc(title)],
            None,
        )
        .unwrap();
        assert_eq!(titles(&mut ds), vec!["a", "c", "a", "b"]);

        let inner = data(&[("x", Some(1)), ("y", Some(1)), ("z", Some(1))]);
        let mut ds = OrderedDataSet::new(inner, &[OrderByItem::desc(position)], None).unwrap();
        assert_eq!(titles(&mut ds), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_buffer_limit() {
        let (_, position) = columns();
        let inner = data(&[("a", Some(1)), ("b", Some(2)), ("c", Some(3))]);
        let mut ds = OrderedDataSet::new(inner, &[OrderByItem::asc(position)], Some(2)).unwrap();
        let err = ds.next().unwrap_err();
        assert!(err.is_unsupported());
        assert!(ds.is_closed());
    }
}
