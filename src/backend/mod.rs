//! Interface between the core and concrete store adapters.
//!
//! Wire protocols live entirely behind [`Backend`]; the core only hands over planned
//! native fragments and translated mutation intents.

mod memory;

pub use memory::{CallCounts, InMemoryBackend};

use std::sync::Arc;

use crate::data::{DefaultRowTranslator, PageSource, RawCursor, RawPage, RawRecord, RowTranslator};
use crate::error::{DataError, DataResult};
use crate::query::{CapabilityProbe, NativeQuery};
use crate::schema::{Schema, Table};
use crate::update::{RowDeletion, RowInsertion, TableCreation};

/// Shape of a backend's answer to a native query.
pub enum NativeResult {
    /// Forward-only native cursor.
    Cursor(Box<dyn RawCursor>),
    /// First page of a scroll plus the source of further pages.
    Paged {
        first: RawPage,
        source: Box<dyn PageSource>,
    },
    /// Records fetched eagerly in one response.
    Records(Vec<RawRecord>),
}

impl std::fmt::Debug for NativeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NativeResult::Cursor(_) => f.write_str("NativeResult::Cursor"),
            NativeResult::Paged { first, .. } => f
                .debug_struct("NativeResult::Paged")
                .field("first_page_rows", &first.records.len())
                .field("next_token", &first.next_token)
                .finish(),
            NativeResult::Records(records) => write!(f, "NativeResult::Records({})", records.len()),
        }
    }
}

/// A store adapter. Every method is a blocking call; failures are reported as
/// [`DataError::Backend`] carrying the client library's error as source.
pub trait Backend: CapabilityProbe + Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Discover tables and columns. Called once per context and on refresh.
    fn discover_schema(&self) -> DataResult<Schema>;

    fn execute_native(&self, query: &NativeQuery) -> DataResult<NativeResult>;

    /// Count matching rows natively. Only called when the capabilities declare it.
    fn count_native(&self, _query: &NativeQuery) -> DataResult<u64> {
        Err(DataError::unsupported(format!("{}: native count", self.name())))
    }

    fn translator(&self) -> Arc<dyn RowTranslator> {
        Arc::new(DefaultRowTranslator)
    }

    fn create_table(&self, _creation: &TableCreation) -> DataResult<()> {
        Err(DataError::unsupported(format!("{}: create table", self.name())))
    }

    fn drop_table(&self, _table: &Table) -> DataResult<()> {
        Err(DataError::unsupported(format!("{}: drop table", self.name())))
    }

    fn insert(&self, _insertion: &RowInsertion) -> DataResult<()> {
        Err(DataError::unsupported(format!("{}: insert", self.name())))
    }

    /// Returns the number of deleted rows.
    fn delete(&self, _deletion: &RowDeletion) -> DataResult<u64> {
        Err(DataError::unsupported(format!("{}: delete", self.name())))
    }

    /// Make the effects of a finished mutation batch visible to subsequent reads.
    fn on_update_finished(&self) -> DataResult<()> {
        Ok(())
    }
}
