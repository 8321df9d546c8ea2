use std::sync::Arc;

use super::lifecycle::{warn_abandoned, Lifecycle};
use super::{CursorState, DataSet, DataSetHeader, Row};
use crate::error::DataResult;

/// Yields at most `max_rows` rows. The inner data set is closed as soon as the limit
/// is reached, so no further native reads happen.
pub struct MaxRowsDataSet {
    inner: Box<dyn DataSet>,
    max_rows: usize,
    returned: usize,
    lifecycle: Lifecycle,
}

impl MaxRowsDataSet {
    pub fn new(inner: Box<dyn DataSet>, max_rows: usize) -> Self {
        Self {
            inner,
            max_rows,
            returned: 0,
            lifecycle: Lifecycle::new(),
        }
    }
}

impl DataSet for MaxRowsDataSet {
    fn header(&self) -> &Arc<DataSetHeader> {
        self.inner.header()
    }

    fn next(&mut self) -> DataResult<bool> {
        if self.lifecycle.is_done() {
            return Ok(false);
        }
        if self.returned >= self.max_rows {
            self.inner.close();
            self.lifecycle.mark_exhausted();
            return Ok(false);
        }
        match self.inner.next() {
            Ok(true) => {
                self.returned += 1;
                Ok(true)
            }
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

impl Drop for MaxRowsDataSet {
    fn drop(&mut self) {
        if !self.lifecycle.is_closed() {
            warn_abandoned("MaxRowsDataSet");
            self.close();
        }
    }
}

/// Skips the first `offset` rows of the inner data set.
pub struct FirstRowDataSet {
    inner: Box<dyn DataSet>,
    offset: usize,
    skipped: bool,
    lifecycle: Lifecycle,
}

impl FirstRowDataSet {
    pub fn new(inner: Box<dyn DataSet>, offset: usize) -> Self {
        Self {
            inner,
            offset,
            skipped: false,
            lifecycle: Lifecycle::new(),
        }
    }

    fn advance(&mut self) -> DataResult<bool> {
        if !self.skipped {
            self.skipped = true;
            for _ in 0..self.offset {
                if !self.inner.next()? {
                    return Ok(false);
                }
            }
        }
        self.inner.next()
    }
}

impl DataSet for FirstRowDataSet {
    fn header(&self) -> &Arc<DataSetHeader> {
        self.inner.header()
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
        if self.lifecycle.is_done() || !self.skipped {
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

impl Drop for FirstRowDataSet {
    fn drop(&mut self) {
        if !self.lifecycle.is_closed() {
            warn_abandoned("FirstRowDataSet");
            self.close();
        }
    }
}
