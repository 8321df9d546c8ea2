//! Scroll-style pagination exposed as one continuous data set.
//!
//! A backend returns the first page together with a continuation token. The adapter
//! hands out rows from the buffered page and only requests the next page once the
//! buffer is drained; an empty page or a missing token ends the result. The timeout
//! supplied at construction is forwarded on every continuation so the server-side
//! lease stays alive while rows are consumed.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::lifecycle::{warn_abandoned, Lifecycle};
use super::{CursorState, DataSet, DataSetHeader, RawRecord, Row, RowTranslator};
use crate::config::ScrollConfig;
use crate::error::DataResult;

/// Opaque handle to a server-side scroll lease.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContinuationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of raw records plus the token for the following page, if any.
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    pub records: Vec<RawRecord>,
    pub next_token: Option<ContinuationToken>,
}

impl RawPage {
    pub fn new(records: Vec<RawRecord>, next_token: Option<ContinuationToken>) -> Self {
        Self { records, next_token }
    }

    pub fn last(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            next_token: None,
        }
    }
}

/// Backend side of a scroll: fetch the next page, release the lease.
pub trait PageSource: Send {
    fn continue_paged(&mut self, token: &ContinuationToken, keep_alive: Duration) -> DataResult<RawPage>;

    fn release(&mut self, token: &ContinuationToken) -> DataResult<()>;
}

pub struct ScrollingDataSet {
    header: Arc<DataSetHeader>,
    buffer: VecDeque<RawRecord>,
    token: Option<ContinuationToken>,
    source: Box<dyn PageSource>,
    translator: Arc<dyn RowTranslator>,
    keep_alive: Duration,
    row: Option<Row>,
    continuations: usize,
    lifecycle: Lifecycle,
}

impl ScrollingDataSet {
    pub fn new(
        header: Arc<DataSetHeader>,
        first_page: RawPage,
        source: Box<dyn PageSource>,
        translator: Arc<dyn RowTranslator>,
        config: ScrollConfig,
    ) -> Self {
        Self {
            header,
            buffer: first_page.records.into(),
            token: first_page.next_token,
            source,
            translator,
            keep_alive: config.timeout(),
            row: None,
            continuations: 0,
            lifecycle: Lifecycle::new(),
        }
    }

    /// Number of continuation requests issued so far.
    pub fn continuations(&self) -> usize {
        self.continuations
    }

    fn exhaust(&mut self) -> DataResult<bool> {
        self.row = None;
        self.lifecycle.mark_exhausted();
        Ok(false)
    }

    fn advance(&mut self) -> DataResult<bool> {
        loop {
            if let Some(raw) = self.buffer.pop_front() {
                self.row = Some(self.translator.translate_row(&raw, &self.header)?);
                return Ok(true);
            }

            let token = match self.token.take() {
                Some(token) => token,
                None => return self.exhaust(),
            };

            self.continuations += 1;
            tracing::debug!(
                token = %token,
                continuation = self.continuations,
                "Requesting next scroll page"
            );
            // Keep the token while the request is in flight so close() can release it
            self.token = Some(token.clone());
            let page = self.source.continue_paged(&token, self.keep_alive)?;
            self.token = page.next_token;

            if page.records.is_empty() {
                return self.exhaust();
            }
            self.buffer = page.records.into();
        }
    }
}

impl DataSet for ScrollingDataSet {
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
        self.buffer.clear();
        if let Some(token) = self.token.take() {
            if let Err(e) = self.source.release(&token) {
                tracing::warn!(token = %token, error = %e, "Failed to release scroll lease");
            }
        }
    }

    fn state(&self) -> CursorState {
        self.lifecycle.state()
    }
}

impl Drop for ScrollingDataSet {
    fn drop(&mut self) {
        if !self.lifecycle.is_closed() {
            warn_abandoned("ScrollingDataSet");
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
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Calls {
        keep_alives: Vec<Duration>,
        released: Vec<String>,
    }

    struct Pages {
        pages: VecDeque<DataResult<RawPage>>,
        calls: Arc<Mutex<Calls>>,
        fail_release: bool,
    }

    impl PageSource for Pages {
        fn continue_paged(&mut self, _token: &ContinuationToken, keep_alive: Duration) -> DataResult<RawPage> {
            self.calls.lock().keep_alives.push(keep_alive);
            self.pages.pop_front().unwrap_or_else(|| Ok(RawPage::default()))
        }

        fn release(&mut self, token: &ContinuationToken) -> DataResult<()> {
            self.calls.lock().released.push(token.to_string());
            if self.fail_release {
                return Err(DataError::backend_message("scroll already expired"));
            }
            Ok(())
        }
    }

    fn records(range: std::ops::Range<i64>) -> Vec<RawRecord> {
        range.map(|n| RawRecord::new(json!({ "n": n }))).collect()
    }

    fn token(s: &str) -> Option<ContinuationToken> {
        Some(ContinuationToken::new(s))
    }

    fn scrolling(
        first: RawPage,
        rest: Vec<DataResult<RawPage>>,
        fail_release: bool,
    ) -> (ScrollingDataSet, Arc<Mutex<Calls>>) {
        let n = Column::new("t", "n", ColumnType::BigInt);
        let header = Arc::new(DataSetHeader::from_columns([&n]));
        let calls = Arc::new(Mutex::new(Calls::default()));
        let source = Pages {
            pages: rest.into(),
            calls: calls.clone(),
            fail_release,
        };
        let config = ScrollConfig {
            timeout_secs: 7,
            page_size: 2,
        };
        let ds = ScrollingDataSet::new(header, first, Box::new(source), Arc::new(DefaultRowTranslator), config);
        (ds, calls)
    }

    #[test]
    fn test_pages_are_fetched_lazily() {
        let (mut ds, calls) = scrolling(
            RawPage::new(records(0..2), token("s1")),
            vec![
                Ok(RawPage::new(records(2..4), token("s2"))),
                Ok(RawPage::new(records(4..5), token("s3"))),
                Ok(RawPage::new(Vec::new(), token("s4"))),
            ],
            false,
        );

        assert!(ds.next().unwrap());
        assert!(ds.next().unwrap());
        assert_eq!(ds.continuations(), 0);
        assert!(ds.next().unwrap());
        assert_eq!(ds.continuations(), 1);
        assert_eq!(ds.row().unwrap().value(0), Some(&Value::BigInt(2)));

        let mut seen = 3;
        while ds.next().unwrap() {
            seen += 1;
        }
        assert_eq!(seen, 5);
        assert_eq!(ds.continuations(), 3);
        assert_eq!(ds.state(), CursorState::Exhausted);
        assert!(calls.lock().keep_alives.iter().all(|d| *d == Duration::from_secs(7)));

        // The empty page still carried a lease; close releases it
        ds.close();
        assert_eq!(calls.lock().released, vec!["s4".to_string()]);
    }

    #[test]
    fn test_single_page_without_token() {
        let (mut ds, calls) = scrolling(RawPage::last(records(0..1)), Vec::new(), false);
        assert!(ds.next().unwrap());
        assert!(!ds.next().unwrap());
        assert_eq!(ds.continuations(), 0);
        ds.close();
        assert!(calls.lock().released.is_empty());
    }

    #[test]
    fn test_empty_first_page_with_token() {
        let (mut ds, _) = scrolling(
            RawPage::new(Vec::new(), token("s1")),
            vec![Ok(RawPage::last(records(0..2)))],
            false,
        );
        assert!(ds.next().unwrap());
        assert_eq!(ds.continuations(), 1);

        let (mut ds, _) = scrolling(RawPage::new(Vec::new(), token("s1")), vec![Ok(RawPage::default())], false);
        assert!(!ds.next().unwrap());
        assert!(!ds.next().unwrap());
        assert_eq!(ds.continuations(), 1);
        ds.close();
    }

    #[test]
    fn test_close_midway_releases_once_and_tolerates_failure() {
        let (mut ds, calls) = scrolling(
            RawPage::new(records(0..2), token("s1")),
            vec![Ok(RawPage::new(records(2..4), token("s2")))],
            true,
        );
        assert!(ds.next().unwrap());
        ds.close();
        ds.close();
        assert_eq!(calls.lock().released, vec!["s1".to_string()]);
        assert!(!ds.next().unwrap());
        assert!(ds.row().is_none());
    }

    #[test]
    fn test_continuation_failure_closes() {
        let (mut ds, calls) = scrolling(
            RawPage::new(records(0..1), token("s1")),
            vec![Err(DataError::backend_message("timeout"))],
            false,
        );
        assert!(ds.next().unwrap());
        let err = ds.next().unwrap_err();
        assert!(err.is_backend_error());
        assert_eq!(ds.state(), CursorState::Closed);
        assert_eq!(calls.lock().released, vec!["s1".to_string()]);
    }
}
