//! Repair script application.
//!
//! The runner walks one script through a fixed state machine:
//!
//! ```text
//! Pending -> CheckingPrecondition -> Executing -> Verifying -> Applied
//!                     |                  |            |
//!                     v                  v            v
//!                  Skipped            Failed        Failed
//! ```
//!
//! The precondition is the idempotency predicate: when the desired end state
//! already holds the run is `Skipped` without touching the database.
//! Statements are applied sequentially and halt on first failure, recording
//! the partial-application point; DDL-mixed scripts are not reliably
//! transactional, so no automatic rollback is attempted. After execution the
//! verification query must confirm the end state - the driver's error
//! channel alone is not trusted, and execution success without verification
//! is still `Failed`.

use crate::db::executor::{QueryExecutor, split_script};
use crate::db::pool::{DiagnosticPool, PooledConnection};
use crate::error::{ToolkitError, ToolkitResult};
use crate::models::repair::{
    Check, CheckReport, RepairOutcome, RepairResult, RepairScript, RepairState,
};
use crate::models::QueryRequest;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Archive of every repair run this process has performed.
#[derive(Debug, Default)]
pub struct RepairLedger {
    records: Mutex<Vec<RepairResult>>,
}

impl RepairLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Archive one run.
    pub fn record(&self, result: RepairResult) {
        self.records
            .lock()
            .expect("repair ledger poisoned")
            .push(result);
    }

    /// All archived runs, oldest first.
    pub fn history(&self) -> Vec<RepairResult> {
        self.records
            .lock()
            .expect("repair ledger poisoned")
            .clone()
    }

    /// The most recent run of a given script, if any.
    pub fn last(&self, script_id: &str) -> Option<RepairResult> {
        self.records
            .lock()
            .expect("repair ledger poisoned")
            .iter()
            .rev()
            .find(|r| r.script_id == script_id)
            .cloned()
    }
}

/// Applies repair scripts as single logical units with verification.
pub struct RepairRunner {
    executor: QueryExecutor,
    ledger: Arc<RepairLedger>,
}

impl RepairRunner {
    /// Create a runner with a fresh ledger.
    pub fn new() -> Self {
        Self {
            executor: QueryExecutor::new(),
            ledger: Arc::new(RepairLedger::new()),
        }
    }

    /// Create a runner sharing an existing ledger.
    pub fn with_ledger(ledger: Arc<RepairLedger>) -> Self {
        Self {
            executor: QueryExecutor::new(),
            ledger,
        }
    }

    /// The ledger this runner archives results into.
    pub fn ledger(&self) -> &Arc<RepairLedger> {
        &self.ledger
    }

    /// Apply a repair script and archive the outcome.
    ///
    /// Returns `Err` only for infrastructure problems (pool, script loading,
    /// validation); execution and verification failures are `Failed` results,
    /// the intended output of a repair run that did not reach its end state.
    pub async fn apply(
        &self,
        pool: &DiagnosticPool,
        script: &RepairScript,
    ) -> ToolkitResult<RepairResult> {
        if !pool.writable() {
            return Err(ToolkitError::invalid_input(format!(
                "Repair '{}' requires a writable connection; reconnect with writable=true",
                script.id
            )));
        }

        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let mut conn = pool.acquire().await?;

        transition(&script.id, RepairState::Pending, RepairState::CheckingPrecondition);
        let precondition = self.run_check(&mut conn, &script.precondition).await?;

        if precondition.passed {
            transition(&script.id, RepairState::CheckingPrecondition, RepairState::Skipped);
            let result = RepairResult {
                script_id: script.id.clone(),
                run_id,
                outcome: RepairOutcome::Skipped,
                rows_affected: 0,
                statements_total: 0,
                statements_applied: 0,
                precondition: Some(precondition),
                verification: None,
                started_at,
                finished_at: Utc::now(),
                error: None,
            };
            info!(script_id = %script.id, "Repair skipped - end state already holds");
            self.ledger.record(result.clone());
            return Ok(result);
        }

        // Validation up front: a script that does not parse never reaches the
        // database.
        let body = script.load_body()?;
        let statements = split_script(&body, pool.db_type())?;
        if statements.len() > 1 && !pool.multi_statement() {
            return Err(ToolkitError::invalid_input(format!(
                "Repair '{}' has {} statements but the connection does not permit multi-statement scripts",
                script.id,
                statements.len()
            )));
        }

        transition(&script.id, RepairState::CheckingPrecondition, RepairState::Executing);

        let mut rows_affected = 0u64;
        let mut statements_applied = 0usize;
        let mut execution_error: Option<ToolkitError> = None;

        for (index, statement) in statements.iter().enumerate() {
            match self.executor.execute_statement(&mut conn, statement, None).await {
                Ok(affected) => {
                    rows_affected += affected;
                    statements_applied += 1;
                }
                Err(e) => {
                    execution_error = Some(ToolkitError::repair_execution(
                        &script.id,
                        index,
                        e.to_string(),
                    ));
                    break;
                }
            }
        }

        if let Some(error) = execution_error {
            transition(&script.id, RepairState::Executing, RepairState::Failed);
            warn!(
                script_id = %script.id,
                statements_applied,
                statements_total = statements.len(),
                error = %error,
                "Repair halted - partial application recorded, no rollback attempted"
            );
            let result = RepairResult {
                script_id: script.id.clone(),
                run_id,
                outcome: RepairOutcome::Failed,
                rows_affected,
                statements_total: statements.len(),
                statements_applied,
                precondition: Some(precondition),
                verification: None,
                started_at,
                finished_at: Utc::now(),
                error: Some(error.to_string()),
            };
            self.ledger.record(result.clone());
            return Ok(result);
        }

        transition(&script.id, RepairState::Executing, RepairState::Verifying);
        let verification = self.run_check(&mut conn, &script.verification).await?;

        let result = if verification.passed {
            transition(&script.id, RepairState::Verifying, RepairState::Applied);
            info!(
                script_id = %script.id,
                rows_affected,
                "Repair applied and verified"
            );
            RepairResult {
                script_id: script.id.clone(),
                run_id,
                outcome: RepairOutcome::Applied,
                rows_affected,
                statements_total: statements.len(),
                statements_applied,
                precondition: Some(precondition),
                verification: Some(verification),
                started_at,
                finished_at: Utc::now(),
                error: None,
            }
        } else {
            transition(&script.id, RepairState::Verifying, RepairState::Failed);
            let error = ToolkitError::repair_verification(
                &script.id,
                &verification.expected,
                &verification.observed,
            );
            warn!(
                script_id = %script.id,
                expected = %verification.expected,
                observed = %verification.observed,
                "Repair executed without error but verification did not match"
            );
            RepairResult {
                script_id: script.id.clone(),
                run_id,
                outcome: RepairOutcome::Failed,
                rows_affected,
                statements_total: statements.len(),
                statements_applied,
                precondition: Some(precondition),
                verification: Some(verification),
                started_at,
                finished_at: Utc::now(),
                error: Some(error.to_string()),
            }
        };

        self.ledger.record(result.clone());
        Ok(result)
    }

    /// Run a read-only check and evaluate its expectation.
    async fn run_check(
        &self,
        conn: &mut PooledConnection,
        check: &Check,
    ) -> ToolkitResult<CheckReport> {
        let request = QueryRequest::new(&check.sql);
        let result = self.executor.execute(conn, &request).await?;
        let (passed, observed) = check.expect.evaluate(&result);

        Ok(CheckReport {
            sql: check.sql.clone(),
            expected: check.expect.describe(),
            observed,
            passed,
        })
    }
}

impl Default for RepairRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn transition(script_id: &str, from: RepairState, to: RepairState) {
    debug!(script_id = %script_id, from = %from, to = %to, "Repair state transition");
}
