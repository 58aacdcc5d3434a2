//! Repair-script data models.
//!
//! A repair script pairs SQL with two checks: a precondition that makes
//! re-application safe (the desired end state already holds, so skip) and a
//! verification that confirms the end state after execution. Execution
//! success alone never counts as overall success.

use crate::models::query::QueryResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::PathBuf;

/// Where the script body comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptSource {
    /// SQL text supplied inline.
    Inline(String),
    /// Path to a version-controlled SQL file; the file system is an external
    /// collaborator providing raw text.
    File(PathBuf),
}

/// What a check's query result must look like for the check to pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Expectation {
    /// The query returns no rows.
    NoRows,
    /// The query returns exactly this many rows.
    RowCount(u64),
    /// The first column of the first row equals this value.
    ScalarEquals(JsonValue),
}

impl Expectation {
    /// Evaluate this expectation against a query result.
    ///
    /// Returns whether it passed plus a description of what was observed,
    /// kept regardless of outcome so operators can inspect actual vs
    /// expected state.
    pub fn evaluate(&self, result: &QueryResult) -> (bool, String) {
        match self {
            Self::NoRows => {
                let observed = format!("{} row(s)", result.row_count());
                (result.rows.is_empty(), observed)
            }
            Self::RowCount(n) => {
                let observed = format!("{} row(s)", result.row_count());
                (result.row_count() as u64 == *n, observed)
            }
            Self::ScalarEquals(expected) => match result.scalar() {
                Some(actual) => (actual == expected, actual.to_string()),
                None => (false, "no rows".to_string()),
            },
        }
    }

    /// Human-readable description of the expected outcome.
    pub fn describe(&self) -> String {
        match self {
            Self::NoRows => "no rows".to_string(),
            Self::RowCount(n) => format!("{} row(s)", n),
            Self::ScalarEquals(v) => format!("scalar {}", v),
        }
    }
}

/// A read-only query plus the outcome that makes it pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Check {
    pub sql: String,
    pub expect: Expectation,
}

impl Check {
    /// Create a new check.
    pub fn new(sql: impl Into<String>, expect: Expectation) -> Self {
        Self {
            sql: sql.into(),
            expect,
        }
    }
}

/// A named, idempotent repair or restore script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairScript {
    pub id: String,
    pub source: ScriptSource,
    /// Idempotency predicate: when this check already passes, the desired end
    /// state holds and the script is skipped without touching the database.
    pub precondition: Check,
    /// Postcondition verification, run after execution on every applied run.
    pub verification: Check,
}

impl RepairScript {
    /// Create a script with an inline SQL body.
    pub fn inline(
        id: impl Into<String>,
        sql: impl Into<String>,
        precondition: Check,
        verification: Check,
    ) -> Self {
        Self {
            id: id.into(),
            source: ScriptSource::Inline(sql.into()),
            precondition,
            verification,
        }
    }

    /// Create a script whose body is loaded from a file.
    pub fn from_file(
        id: impl Into<String>,
        path: impl Into<PathBuf>,
        precondition: Check,
        verification: Check,
    ) -> Self {
        Self {
            id: id.into(),
            source: ScriptSource::File(path.into()),
            precondition,
            verification,
        }
    }

    /// Load the SQL body, reading the file for file-backed scripts.
    pub fn load_body(&self) -> std::io::Result<String> {
        match &self.source {
            ScriptSource::Inline(sql) => Ok(sql.clone()),
            ScriptSource::File(path) => std::fs::read_to_string(path),
        }
    }
}

/// Final disposition of one repair run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairOutcome {
    /// Executed and verified.
    Applied,
    /// Precondition already satisfied; nothing touched.
    Skipped,
    /// Execution halted or verification did not match.
    Failed,
}

impl std::fmt::Display for RepairOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Applied => write!(f, "applied"),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Live state of a repair run, logged at each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairState {
    Pending,
    CheckingPrecondition,
    Executing,
    Verifying,
    Applied,
    Skipped,
    Failed,
}

impl std::fmt::Display for RepairState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::CheckingPrecondition => "checking_precondition",
            Self::Executing => "executing",
            Self::Verifying => "verifying",
            Self::Applied => "applied",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of one check evaluation, archived with the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    pub sql: String,
    pub expected: String,
    pub observed: String,
    pub passed: bool,
}

/// Archived record of one repair run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairResult {
    pub script_id: String,
    pub run_id: String,
    pub outcome: RepairOutcome,
    pub rows_affected: u64,
    pub statements_total: usize,
    /// Statements applied before a halt; equals `statements_total` on
    /// success. Partial application is recorded, never rolled back.
    pub statements_applied: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precondition: Option<CheckReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<CheckReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RepairResult {
    /// Whether the run left the database in the desired end state.
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, RepairOutcome::Applied | RepairOutcome::Skipped)
    }
}
