use std::sync::Arc;

use super::lifecycle::{warn_abandoned, Lifecycle};
use super::{CursorState, DataSet, DataSetHeader, Row};
use crate::error::{DataError, DataResult};
use crate::query::SelectItem;
use crate::schema::Value;

/// Narrows rows of the inner data set to a subset of its select items.
pub struct ProjectedDataSet {
    inner: Box<dyn DataSet>,
    header: Arc<DataSetHeader>,
    indices: Vec<usize>,
    row: Option<Row>,
    lifecycle: Lifecycle,
}

impl ProjectedDataSet {
    pub fn new(inner: Box<dyn DataSet>, items: Vec<SelectItem>) -> DataResult<Self> {
        let indices = items
            .iter()
            .map(|item| match item {
                SelectItem::Column(c) => inner.header().require_column(c),
                other => inner.header().index_of(other).ok_or_else(|| {
                    DataError::invalid(format!(
                        "'{}' is not part of the data set header",
                        other
                    ))
                }),
            })
            .collect::<DataResult<Vec<_>>>()?;
        Ok(Self {
            inner,
            header: Arc::new(DataSetHeader::new(items)),
            indices,
            row: None,
            lifecycle: Lifecycle::new(),
        })
    }

    fn project(&self, row: &Row) -> DataResult<Row> {
        let values = self
            .indices
            .iter()
            .map(|&i| row.value(i).cloned().unwrap_or(Value::Null))
            .collect();
        Row::new(self.header.clone(), values)
    }
}

impl DataSet for ProjectedDataSet {
    fn header(&self) -> &Arc<DataSetHeader> {
        &self.header
    }

    fn next(&mut self) -> DataResult<bool> {
        if self.lifecycle.is_done() {
            return Ok(false);
        }
        let outcome = match self.inner.next() {
            Ok(true) => match self.inner.row() {
                Some(row) => self.project(row).map(Some),
                None => Ok(None),
            },
            Ok(false) => Ok(None),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(Some(row)) => {
                self.row = Some(row);
                Ok(true)
            }
            Ok(None) => {
                self.row = None;
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
        if self.lifecycle.begin_close() {
            self.row = None;
            self.inner.close();
        }
    }

    fn state(&self) -> CursorState {
        self.lifecycle.state()
    }
}

impl Drop for ProjectedDataSet {
    fn drop(&mut self) {
        if !self.lifecycle.is_closed() {
            warn_abandoned("ProjectedDataSet");
            self.close();
        }
    }
}
