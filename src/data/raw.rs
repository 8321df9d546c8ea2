use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::decode::null_field;
use super::lifecycle::{warn_abandoned, Lifecycle};
use super::{CursorState, DataSet, DataSetHeader, Row, RowTranslator};
use crate::error::DataResult;

/// A record as returned by a backend, before typed decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Native identifier (document id, node id), when the store has one.
    #[serde(default)]
    pub id: Option<String>,
    pub source: JsonValue,
}

impl RawRecord {
    pub fn new(source: JsonValue) -> Self {
        Self { id: None, source }
    }

    pub fn with_id(id: impl Into<String>, source: JsonValue) -> Self {
        Self {
            id: Some(id.into()),
            source,
        }
    }

    /// Field by name; missing fields read as null.
    pub fn field(&self, name: &str) -> &JsonValue {
        match self.source.get(name) {
            Some(value) => value,
            None => null_field(),
        }
    }
}

/// Forward-only native cursor owned by exactly one data set.
pub trait RawCursor: Send {
    /// Move to the next record. `Ok(false)` at the end of the result.
    fn advance(&mut self) -> DataResult<bool>;

    fn current(&self) -> Option<&RawRecord>;

    /// Release the native handle. Called at most once.
    fn release(&mut self) -> DataResult<()>;
}

/// Raw cursor over records already fetched into memory.
#[derive(Debug, Default)]
pub struct VecRawCursor {
    records: std::vec::IntoIter<RawRecord>,
    current: Option<RawRecord>,
}

impl VecRawCursor {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self {
            records: records.into_iter(),
            current: None,
        }
    }
}

impl RawCursor for VecRawCursor {
    fn advance(&mut self) -> DataResult<bool> {
        self.current = self.records.next();
        Ok(self.current.is_some())
    }

    fn current(&self) -> Option<&RawRecord> {
        self.current.as_ref()
    }

    fn release(&mut self) -> DataResult<()> {
        self.current = None;
        Ok(())
    }
}

/// Data set over a native cursor; each record is translated into a row on advance.
pub struct RawCursorDataSet {
    header: Arc<DataSetHeader>,
    cursor: Box<dyn RawCursor>,
    translator: Arc<dyn RowTranslator>,
    row: Option<Row>,
    lifecycle: Lifecycle,
}

impl RawCursorDataSet {
    pub fn new(
        header: Arc<DataSetHeader>,
        cursor: Box<dyn RawCursor>,
        translator: Arc<dyn RowTranslator>,
    ) -> Self {
        Self {
            header,
            cursor,
            translator,
            row: None,
            lifecycle: Lifecycle::new(),
        }
    }

    fn advance(&mut self) -> DataResult<bool> {
        if !self.cursor.advance()? {
            self.row = None;
            self.lifecycle.mark_exhausted();
            return Ok(false);
        }
        self.row = match self.cursor.current() {
            Some(raw) => Some(self.translator.translate_row(raw, &self.header)?),
            None => None,
        };
        if self.row.is_none() {
            self.lifecycle.mark_exhausted();
        }
        Ok(self.row.is_some())
    }
}

impl DataSet for RawCursorDataSet {
    fn header(&self) -> &Arc<DataSetHeader> {
        &self.header
    }

    fn next(&mut self) -> DataResult<bool> {
        if self.lifecycle.is_done() {
            return Ok(false);
        }
        match self.advance() {
            Ok(more) => Ok(more),
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
        if let Err(e) = self.cursor.release() {
            tracing::warn!(error = %e, "Failed to release native cursor");
        }
    }

    fn state(&self) -> CursorState {
        self.lifecycle.state()
    }
}

impl Drop for RawCursorDataSet {
    fn drop(&mut self) {
        if !self.lifecycle.is_closed() {
            warn_abandoned("RawCursorDataSet");
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DefaultRowTranslator;
    use crate::error::DataError;
    use crate::schema::{Column, ColumnType, Value};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCursor {
        inner: VecRawCursor,
        releases: Arc<AtomicUsize>,
        fail_at: Option<usize>,
        advanced: usize,
    }

    impl RawCursor for CountingCursor {
        fn advance(&mut self) -> DataResult<bool> {
            self.advanced += 1;
            if self.fail_at == Some(self.advanced) {
                return Err(DataError::backend_message("connection reset"));
            }
            self.inner.advance()
        }

        fn current(&self) -> Option<&RawRecord> {
            self.inner.current()
        }

        fn release(&mut self) -> DataResult<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn data_set(fail_at: Option<usize>) -> (RawCursorDataSet, Arc<AtomicUsize>) {
        let title = Column::new("songs", "title", ColumnType::String);
        let header = Arc::new(DataSetHeader::from_columns([&title]));
        let records = vec![
            RawRecord::new(json!({"title": "My first song"})),
            RawRecord::new(json!({"title": "My second song"})),
        ];
        let releases = Arc::new(AtomicUsize::new(0));
        let cursor = CountingCursor {
            inner: VecRawCursor::new(records),
            releases: releases.clone(),
            fail_at,
            advanced: 0,
        };
        let ds = RawCursorDataSet::new(header, Box::new(cursor), Arc::new(DefaultRowTranslator));
        (ds, releases)
    }

    #[test]
    fn test_exhaustion_is_terminal() {
        let (mut ds, releases) = data_set(None);
        assert!(ds.next().unwrap());
        assert_eq!(ds.row().unwrap().value(0), Some(&Value::from("My first song")));
        assert!(ds.next().unwrap());
        assert!(!ds.next().unwrap());
        assert_eq!(ds.state(), CursorState::Exhausted);
        assert!(ds.row().is_none());
        assert!(!ds.next().unwrap());

        ds.close();
        ds.close();
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_advance_error_closes() {
        let (mut ds, releases) = data_set(Some(2));
        assert!(ds.next().unwrap());
        assert!(ds.next().is_err());
        assert_eq!(ds.state(), CursorState::Closed);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert!(!ds.next().unwrap());
    }

    #[test]
    fn test_drop_releases_cursor() {
        let (ds, releases) = data_set(None);
        drop(ds);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_field_reads_null() {
        let raw = RawRecord::new(json!({"a": 1}));
        assert!(raw.field("b").is_null());
        assert_eq!(raw.field("a"), &json!(1));
    }
}
