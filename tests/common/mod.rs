//! Common test utilities
//!
//! Provides shared helpers for:
//! - Installing a tracing subscriber once per test binary
//! - Building the seeded "songs"/"counter" backend and a context over it

#![allow(dead_code)]

use polystore::data::RawRecord;
use polystore::{Capabilities, ColumnType, DataContext, DataContextConfig, InMemoryBackend, TableDef};
use serde_json::json;
use tracing_subscriber::EnvFilter;

pub const FIRST_SONG: &str = "756716f7-2e54-4715-9f00-91dcbea6cf51";
pub const SECOND_SONG: &str = "756716f7-2e54-4715-9f00-91dcbea6cf52";
pub const THIRD_SONG: &str = "756716f7-2e54-4715-9f00-91dcbea6cf53";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn native_def(name: &str, columns: &[(&str, &str)], primary_key: &str) -> TableDef {
    columns
        .iter()
        .fold(TableDef::new(name), |def, (column, native_type)| {
            def.column(*column, ColumnType::from_native_name(native_type))
        })
        .primary_key(primary_key)
}

pub fn songs_def() -> TableDef {
    native_def(
        "songs",
        &[
            ("id", "uuid"),
            ("title", "text"),
            ("hit", "boolean"),
            ("duration", "float"),
            ("position", "int"),
            ("creationtime", "timestamp"),
        ],
        "id",
    )
}

/// Stored out of id order so that ordering is observable.
pub fn song_documents() -> Vec<RawRecord> {
    vec![
        RawRecord::new(json!({
            "id": THIRD_SONG, "title": "My third song", "hit": true,
            "duration": 3.15, "position": 3, "creationtime": "2013-01-04T16:00:00Z"
        })),
        RawRecord::new(json!({
            "id": FIRST_SONG, "title": "My first song", "hit": false,
            "duration": 2.55, "position": 1, "creationtime": "2013-01-04T15:55:51Z"
        })),
        RawRecord::new(json!({
            "id": SECOND_SONG, "title": "My second song", "hit": true,
            "duration": 4.0, "position": 2, "creationtime": "2013-01-04T15:58:00Z"
        })),
    ]
}

pub fn counter_def() -> TableDef {
    native_def(
        "counter",
        &[("counter_value", "counter"), ("url_name", "varchar")],
        "url_name",
    )
}

pub fn counter_documents() -> Vec<RawRecord> {
    vec![
        RawRecord::new(json!({"counter_value": 1, "url_name": "/index.html"})),
        RawRecord::new(json!({"counter_value": 12, "url_name": "/about.html"})),
    ]
}

pub fn songs_backend(capabilities: Capabilities) -> InMemoryBackend {
    InMemoryBackend::new("ks")
        .with_capabilities(capabilities)
        .with_table(songs_def(), song_documents())
        .with_table(counter_def(), counter_documents())
}

pub fn songs_context(capabilities: Capabilities) -> DataContext<InMemoryBackend> {
    init_tracing();
    DataContext::new(songs_backend(capabilities)).expect("Failed to create data context")
}

pub fn songs_context_with(backend: InMemoryBackend, config: DataContextConfig) -> DataContext<InMemoryBackend> {
    init_tracing();
    DataContext::with_config(backend, config).expect("Failed to create data context")
}
