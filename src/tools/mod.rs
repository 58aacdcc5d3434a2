//! Diagnostic and repair operations built on the database layer.

pub mod format;
pub mod repair;
pub mod scan;

pub use format::OutputFormat;
pub use repair::{RepairLedger, RepairRunner};
pub use scan::{EncodingScanner, ScanPage, classify_text};
