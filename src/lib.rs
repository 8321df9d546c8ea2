pub mod backend;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod query;
pub mod resource;
pub mod schema;
pub mod update;

pub use backend::{Backend, InMemoryBackend, NativeResult};
pub use config::{DataContextConfig, ScrollConfig};
pub use context::DataContext;
pub use data::{CursorState, DataSet, DataSetHeader, Row};
pub use error::{DataError, DataResult};
pub use query::{
    Capabilities, CapabilityProbe, FilterItem, Operand, OperatorType, OrderByItem, Query, QueryPlan,
    ResidualStep, SelectItem,
};
pub use resource::{LocalFileSystemConnector, RemoteResource, ResourceUrl};
pub use schema::{Column, ColumnType, Schema, Table, TableDef, Value};
pub use update::UpdateContext;
