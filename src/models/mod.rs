//! Data models for the diagnostics toolkit.

pub mod connection;
pub mod encoding;
pub mod query;
pub mod repair;
pub mod schema;

pub use connection::{ConnectionConfig, ConnectionConfigError, DatabaseType};
pub use encoding::{EncodingIssue, ExpectedScript, ScanRequest, SuspectedCause};
pub use query::{
    ColumnDescriptor, DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROW_LIMIT, MAX_QUERY_TIMEOUT_SECS,
    MAX_ROW_LIMIT, QueryParam, QueryRequest, QueryResult,
};
pub use repair::{
    Check, CheckReport, Expectation, RepairOutcome, RepairResult, RepairScript, RepairState,
    ScriptSource,
};
pub use schema::{ColumnSpec, DeltaKind, KeyRole, SchemaDelta, SchemaSnapshot};
