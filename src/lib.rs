//! Database Diagnostics & Repair Toolkit
//!
//! This library provides a disciplined diagnostic/repair surface for
//! relational databases (SQLite, PostgreSQL, MySQL): leased connection
//! pooling, parameterized query execution, schema snapshotting and diffing,
//! text-encoding corruption scans, and verified idempotent repair scripts.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod report;
pub mod tools;

pub use config::Config;
pub use db::{DiagnosticPool, PooledConnection, QueryExecutor, SchemaIntrospector};
pub use error::{ToolkitError, ToolkitResult};
pub use report::{ConsoleSink, JsonLinesSink, ReportSink};
pub use tools::{EncodingScanner, RepairLedger, RepairRunner};
