use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::{Backend, NativeResult};
use crate::config::DataContextConfig;
use crate::data::{
    DataSet, InMemoryDataSet, RawCursorDataSet, ScrollingDataSet, VecRawCursor,
};
use crate::error::{DataError, DataResult};
use crate::query::{Query, QueryBuilder, QueryPlan, QueryPlanner};
use crate::schema::{Schema, Table, Value};
use crate::update::UpdateContext;

/// Entry point over one backend: schema discovery, query planning and execution, and
/// mutation batches.
///
/// The schema is discovered once at construction and cached; it changes only through
/// [`refresh_schema`](Self::refresh_schema) and the table create/drop builders.
pub struct DataContext<B: Backend> {
    backend: Arc<B>,
    schema: RwLock<Schema>,
    config: DataContextConfig,
}

impl<B: Backend> DataContext<B> {
    pub fn new(backend: B) -> DataResult<Self> {
        Self::with_config(backend, DataContextConfig::default())
    }

    pub fn with_config(backend: B, config: DataContextConfig) -> DataResult<Self> {
        config.validate()?;
        let schema = backend.discover_schema()?;
        tracing::info!(
            backend = %backend.name(),
            schema = %schema.name(),
            tables = schema.tables().len(),
            "Discovered schema"
        );
        Ok(Self {
            backend: Arc::new(backend),
            schema: RwLock::new(schema),
            config,
        })
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn config(&self) -> &DataContextConfig {
        &self.config
    }

    /// Snapshot of the cached schema.
    pub fn default_schema(&self) -> Schema {
        self.schema.read().clone()
    }

    pub fn default_schema_name(&self) -> String {
        self.schema.read().name().to_string()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.schema
            .read()
            .table_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn table(&self, name: &str) -> DataResult<Table> {
        self.schema.read().require_table(name).cloned()
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.schema.read().table_by_name(name).is_some()
    }

    /// Re-run schema discovery against the backend.
    pub fn refresh_schema(&self) -> DataResult<()> {
        let schema = self.backend.discover_schema()?;
        tracing::debug!(
            backend = %self.backend.name(),
            tables = schema.tables().len(),
            "Refreshed schema"
        );
        *self.schema.write() = schema;
        Ok(())
    }

    pub fn query(&self) -> QueryBuilder<'_, B> {
        QueryBuilder::new(self)
    }

    /// Validate and split a query without executing it.
    pub fn plan(&self, query: &Query) -> DataResult<QueryPlan> {
        let schema = self.schema.read();
        QueryPlanner::new(self.backend.as_ref(), &self.config).plan(&schema, query)
    }

    /// Plan and execute a query. The caller owns the returned data set and must close it.
    pub fn execute_query(&self, query: &Query) -> DataResult<Box<dyn DataSet>> {
        let plan = self.plan(query)?;
        tracing::debug!(backend = %self.backend.name(), query = %query, "Executing query");

        let native = plan.native();
        let header = plan.native_header().clone();
        let data_set: Box<dyn DataSet> = if native.count_only {
            let count = self.backend.count_native(native)?;
            let count = i64::try_from(count)
                .map_err(|_| DataError::TypeError(format!("Row count {} exceeds bigint range", count)))?;
            Box::new(InMemoryDataSet::single_value(header, Value::BigInt(count))?)
        } else {
            let translator = self.backend.translator();
            match self.backend.execute_native(native)? {
                NativeResult::Cursor(cursor) => Box::new(RawCursorDataSet::new(header, cursor, translator)),
                NativeResult::Paged { first, source } => Box::new(ScrollingDataSet::new(
                    header,
                    first,
                    source,
                    translator,
                    self.config.scroll,
                )),
                NativeResult::Records(records) => Box::new(RawCursorDataSet::new(
                    header,
                    Box::new(VecRawCursor::new(records)),
                    translator,
                )),
            }
        };

        plan.apply(data_set, &self.config)
    }

    /// Execute a query and hand the data set to `f`; it is closed on every exit path.
    pub fn with_query<T, F>(&self, query: &Query, f: F) -> DataResult<T>
    where
        F: FnOnce(&mut dyn DataSet) -> DataResult<T>,
    {
        let mut data_set = self.execute_query(query)?;
        let result = f(data_set.as_mut());
        data_set.close();
        result
    }

    pub fn is_create_table_supported(&self) -> bool {
        self.backend.capabilities().supports_create_table()
    }

    pub fn is_drop_table_supported(&self) -> bool {
        self.backend.capabilities().supports_drop_table()
    }

    pub fn is_insert_supported(&self) -> bool {
        self.backend.capabilities().supports_insert()
    }

    pub fn is_delete_supported(&self) -> bool {
        self.backend.capabilities().supports_delete()
    }

    /// Run a batch of mutations. After the batch succeeds the backend's update-finished
    /// hook runs once; a failing hook is logged and does not fail the batch.
    pub fn execute_update<T, F>(&self, batch: F) -> DataResult<T>
    where
        F: FnOnce(&UpdateContext<'_, B>) -> DataResult<T>,
    {
        let update = UpdateContext::new(self);
        let result = batch(&update)?;

        if let Err(e) = self.backend.on_update_finished() {
            tracing::warn!(
                backend = %self.backend.name(),
                mutations = update.executed(),
                error = %e,
                "Update-finished hook failed"
            );
        }
        Ok(result)
    }

    pub(crate) fn register_table(&self, table: Table) -> DataResult<()> {
        self.schema.write().add_table(table)
    }

    pub(crate) fn unregister_table(&self, name: &str) {
        self.schema.write().remove_table(name);
    }
}
