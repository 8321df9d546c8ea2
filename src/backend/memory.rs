//! Reference backend keeping raw JSON documents in memory.
//!
//! Capabilities are configurable so every pushdown/residual combination can be exercised;
//! scrolling is simulated with lease tokens, and every backend round trip is counted.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use super::{Backend, NativeResult};
use crate::data::{
    ContinuationToken, DataSetHeader, DefaultRowTranslator, PageSource, RawCursor, RawPage,
    RawRecord, Row, RowTranslator, VecRawCursor,
};
use crate::error::{DataError, DataResult};
use crate::query::{Capabilities, CapabilityProbe, NativeQuery};
use crate::schema::{Schema, Table, TableDef, Value, DOCUMENT_ID_COLUMN};
use crate::update::{RowDeletion, RowInsertion, TableCreation};

const DEFAULT_PAGE_SIZE: usize = 100;

/// Snapshot of backend round trips.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub discoveries: usize,
    pub native_queries: usize,
    pub native_counts: usize,
    pub continuations: usize,
    pub releases: usize,
    pub mutations: usize,
    pub refreshes: usize,
}

impl CallCounts {
    /// Every call that would cross the network on a real store.
    pub fn total(&self) -> usize {
        self.discoveries
            + self.native_queries
            + self.native_counts
            + self.continuations
            + self.releases
            + self.mutations
            + self.refreshes
    }
}

#[derive(Debug, Default)]
struct CallStats {
    discoveries: AtomicUsize,
    native_queries: AtomicUsize,
    native_counts: AtomicUsize,
    continuations: AtomicUsize,
    releases: AtomicUsize,
    mutations: AtomicUsize,
    refreshes: AtomicUsize,
}

impl CallStats {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CallCounts {
        CallCounts {
            discoveries: self.discoveries.load(Ordering::Relaxed),
            native_queries: self.native_queries.load(Ordering::Relaxed),
            native_counts: self.native_counts.load(Ordering::Relaxed),
            continuations: self.continuations.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            mutations: self.mutations.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryTable {
    /// Explicit definition; inferred from the documents at discovery when absent.
    def: Option<TableDef>,
    documents: Vec<RawRecord>,
}

type ScrollMap = HashMap<String, VecDeque<Vec<RawRecord>>>;

pub struct InMemoryBackend {
    name: String,
    schema_name: String,
    capabilities: Capabilities,
    scrolling: bool,
    tables: RwLock<BTreeMap<String, MemoryTable>>,
    scrolls: Arc<Mutex<ScrollMap>>,
    open_cursors: Arc<AtomicUsize>,
    fail_continuations: Arc<AtomicBool>,
    stats: Arc<CallStats>,
}

impl InMemoryBackend {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            schema_name: name.clone(),
            name,
            capabilities: Capabilities::NONE,
            scrolling: false,
            tables: RwLock::new(BTreeMap::new()),
            scrolls: Arc::new(Mutex::new(HashMap::new())),
            open_cursors: Arc::new(AtomicUsize::new(0)),
            fail_continuations: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(CallStats::default()),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Return results as scroll pages of the planned page size.
    pub fn with_scrolling(mut self) -> Self {
        self.scrolling = true;
        self
    }

    pub fn with_schema_name(mut self, schema_name: impl Into<String>) -> Self {
        self.schema_name = schema_name.into();
        self
    }

    /// Add a table with an explicit definition.
    pub fn with_table(self, def: TableDef, documents: impl IntoIterator<Item = RawRecord>) -> Self {
        self.tables.write().insert(
            def.name.clone(),
            MemoryTable {
                def: Some(def),
                documents: documents.into_iter().collect(),
            },
        );
        self
    }

    /// Add schema-less documents; columns are detected from them at discovery.
    pub fn with_documents(self, table: impl Into<String>, documents: impl IntoIterator<Item = RawRecord>) -> Self {
        self.tables.write().insert(
            table.into(),
            MemoryTable {
                def: None,
                documents: documents.into_iter().collect(),
            },
        );
        self
    }

    /// Make every scroll continuation fail, as if leases had expired.
    pub fn fail_continuations(&self, fail: bool) {
        self.fail_continuations.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> CallCounts {
        self.stats.snapshot()
    }

    /// Scroll leases not yet released or completed.
    pub fn open_scrolls(&self) -> usize {
        self.scrolls.lock().len()
    }

    /// Native cursors handed out and not yet released.
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    pub fn documents(&self, table: &str) -> Vec<RawRecord> {
        self.tables
            .read()
            .get(table)
            .map(|t| t.documents.clone())
            .unwrap_or_default()
    }

    /// Rows of `table` matching the pushed filters, ordered and limited as requested.
    fn select(&self, query: &NativeQuery) -> DataResult<Vec<RawRecord>> {
        let documents = {
            let tables = self.tables.read();
            let stored = tables
                .get(query.table.name())
                .ok_or_else(|| DataError::backend_message(format!("Unknown table '{}'", query.table.name())))?;
            stored.documents.clone()
        };

        let header = Arc::new(DataSetHeader::from_columns(query.table.columns()));
        let translator = DefaultRowTranslator;
        let mut matched: Vec<(Row, RawRecord)> = Vec::new();
        for record in documents {
            let row = translator.translate_row(&record, &header)?;
            let keep = query
                .filters
                .iter()
                .all(|f| row.get_column(f.column()).is_some_and(|v| f.evaluate(v)));
            if keep {
                matched.push((row, record));
            }
        }

        if !query.order_by.is_empty() {
            matched.sort_by(|(a, _), (b, _)| {
                for item in &query.order_by {
                    let ordering = match (a.get_column(item.column()), b.get_column(item.column())) {
                        (Some(x), Some(y)) => x.sort_compare(y),
                        _ => std::cmp::Ordering::Equal,
                    };
                    let ordering = if item.is_ascending() { ordering } else { ordering.reverse() };
                    if ordering != std::cmp::Ordering::Equal {
                        return ordering;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        let offset = query.first_row.unwrap_or(0);
        let limit = query.max_rows.unwrap_or(usize::MAX);
        Ok(matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(_, record)| record)
            .collect())
    }

    fn open_scroll(&self, records: Vec<RawRecord>, page_size: usize) -> NativeResult {
        let mut pages: VecDeque<Vec<RawRecord>> = records
            .chunks(page_size.max(1))
            .map(|chunk| chunk.to_vec())
            .collect();
        let first = pages.pop_front().unwrap_or_default();

        let next_token = if pages.is_empty() {
            None
        } else {
            let token = Uuid::new_v4().to_string();
            self.scrolls.lock().insert(token.clone(), pages);
            Some(ContinuationToken::new(token))
        };

        NativeResult::Paged {
            first: RawPage::new(first, next_token),
            source: Box::new(MemoryScroll {
                scrolls: self.scrolls.clone(),
                fail: self.fail_continuations.clone(),
                stats: self.stats.clone(),
            }),
        }
    }
}

impl CapabilityProbe for InMemoryBackend {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

impl Backend for InMemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn discover_schema(&self) -> DataResult<Schema> {
        CallStats::bump(&self.stats.discoveries);
        let tables = self.tables.read();
        let mut schema = Schema::new(self.schema_name.clone());
        for (name, stored) in tables.iter() {
            let def = match &stored.def {
                Some(def) => def.clone(),
                None => {
                    let with_id = stored.documents.iter().any(|d| d.id.is_some());
                    match TableDef::from_documents(name.clone(), stored.documents.iter().map(|d| &d.source), with_id) {
                        Some(def) => def,
                        None => {
                            tracing::debug!(table = %name, "Skipping table without documents");
                            continue;
                        }
                    }
                }
            };
            schema.add_table(def.to_table(&self.schema_name)?)?;
        }
        Ok(schema)
    }

    fn execute_native(&self, query: &NativeQuery) -> DataResult<NativeResult> {
        CallStats::bump(&self.stats.native_queries);
        let records = self.select(query)?;
        if self.scrolling {
            return Ok(self.open_scroll(records, query.page_size.unwrap_or(DEFAULT_PAGE_SIZE)));
        }
        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        Ok(NativeResult::Cursor(Box::new(MemoryCursor {
            inner: VecRawCursor::new(records),
            open_cursors: self.open_cursors.clone(),
            stats: self.stats.clone(),
        })))
    }

    fn count_native(&self, query: &NativeQuery) -> DataResult<u64> {
        CallStats::bump(&self.stats.native_counts);
        Ok(self.select(query)?.len() as u64)
    }

    fn create_table(&self, creation: &TableCreation) -> DataResult<()> {
        CallStats::bump(&self.stats.mutations);
        let mut tables = self.tables.write();
        let table = &creation.table;
        if tables.contains_key(table.name()) {
            return Err(DataError::backend_message(format!("Table '{}' already exists", table.name())));
        }
        tables.insert(
            table.name().to_string(),
            MemoryTable {
                def: Some(table_def(table)),
                documents: Vec::new(),
            },
        );
        Ok(())
    }

    fn drop_table(&self, table: &Table) -> DataResult<()> {
        CallStats::bump(&self.stats.mutations);
        self.tables
            .write()
            .remove(table.name())
            .map(|_| ())
            .ok_or_else(|| DataError::backend_message(format!("Unknown table '{}'", table.name())))
    }

    fn insert(&self, insertion: &RowInsertion) -> DataResult<()> {
        CallStats::bump(&self.stats.mutations);
        let mut tables = self.tables.write();
        let stored = tables
            .get_mut(insertion.table.name())
            .ok_or_else(|| DataError::backend_message(format!("Unknown table '{}'", insertion.table.name())))?;

        let mut document = insertion.to_document();
        let id = match insertion.value_of(DOCUMENT_ID_COLUMN) {
            Some(Value::Null) | None if insertion.table.column_by_name(DOCUMENT_ID_COLUMN).is_some() => {
                Some(Uuid::now_v7().to_string())
            }
            Some(value) if !value.is_null() => Some(value.to_string()),
            _ => None,
        };
        if let Some(object) = document.as_object_mut() {
            object.remove(DOCUMENT_ID_COLUMN);
        }
        stored.documents.push(RawRecord { id, source: document });
        Ok(())
    }

    fn delete(&self, deletion: &RowDeletion) -> DataResult<u64> {
        CallStats::bump(&self.stats.mutations);
        let mut tables = self.tables.write();
        let stored = tables
            .get_mut(deletion.table.name())
            .ok_or_else(|| DataError::backend_message(format!("Unknown table '{}'", deletion.table.name())))?;

        let header = Arc::new(DataSetHeader::from_columns(deletion.table.columns()));
        let translator = DefaultRowTranslator;
        let mut kept = Vec::with_capacity(stored.documents.len());
        let mut deleted = 0u64;
        for record in stored.documents.drain(..) {
            let row = translator.translate_row(&record, &header)?;
            if deletion.matches(&row) {
                deleted += 1;
            } else {
                kept.push(record);
            }
        }
        stored.documents = kept;
        Ok(deleted)
    }

    fn on_update_finished(&self) -> DataResult<()> {
        CallStats::bump(&self.stats.refreshes);
        Ok(())
    }
}

fn table_def(table: &Table) -> TableDef {
    let mut def = TableDef::new(table.name());
    for column in table.columns() {
        def = def.column(column.name(), column.column_type());
        if column.is_primary_key() {
            def = def.primary_key(column.name());
        }
    }
    def
}

struct MemoryCursor {
    inner: VecRawCursor,
    open_cursors: Arc<AtomicUsize>,
    stats: Arc<CallStats>,
}

impl RawCursor for MemoryCursor {
    fn advance(&mut self) -> DataResult<bool> {
        self.inner.advance()
    }

    fn current(&self) -> Option<&RawRecord> {
        self.inner.current()
    }

    fn release(&mut self) -> DataResult<()> {
        CallStats::bump(&self.stats.releases);
        self.open_cursors.fetch_sub(1, Ordering::SeqCst);
        self.inner.release()
    }
}

struct MemoryScroll {
    scrolls: Arc<Mutex<ScrollMap>>,
    fail: Arc<AtomicBool>,
    stats: Arc<CallStats>,
}

impl PageSource for MemoryScroll {
    fn continue_paged(&mut self, token: &ContinuationToken, _keep_alive: Duration) -> DataResult<RawPage> {
        CallStats::bump(&self.stats.continuations);
        if self.fail.load(Ordering::SeqCst) {
            return Err(DataError::backend_message(format!("Scroll '{}' has expired", token)));
        }

        let mut scrolls = self.scrolls.lock();
        let pages = scrolls
            .get_mut(token.as_str())
            .ok_or_else(|| DataError::backend_message(format!("No scroll with id '{}'", token)))?;
        let page = pages.pop_front().unwrap_or_default();
        if pages.is_empty() {
            scrolls.remove(token.as_str());
            return Ok(RawPage::last(page));
        }
        Ok(RawPage::new(page, Some(token.clone())))
    }

    fn release(&mut self, token: &ContinuationToken) -> DataResult<()> {
        CallStats::bump(&self.stats.releases);
        self.scrolls
            .lock()
            .remove(token.as_str())
            .map(|_| ())
            .ok_or_else(|| DataError::backend_message(format!("No scroll with id '{}'", token)))
    }
}
