//! Encoding diagnostics.
//!
//! Scans text columns for byte sequences inconsistent with the column's
//! declared character set and reports them as `EncodingIssue` evidence
//! records with a hex dump of the stored bytes. The scanner never writes;
//! deciding the correct decode/re-encode transform is the operator's (or a
//! repair script's) job.
//!
//! Scans run in primary-key-ordered batches, so a scan is lazy, bounded by
//! the batch size, and restartable from a cursor.

use crate::db::pool::{DiagnosticPool, PooledConnection};
use crate::db::QueryExecutor;
use crate::db::schema::{SchemaIntrospector, quote_identifier, validate_identifier};
use crate::error::{ToolkitError, ToolkitResult};
use crate::models::{
    DatabaseType, EncodingIssue, ExpectedScript, QueryParam, QueryRequest, ScanRequest,
    SchemaSnapshot, SuspectedCause,
};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

/// One batch of scan output.
#[derive(Debug)]
pub struct ScanPage {
    pub issues: Vec<EncodingIssue>,
    /// Primary-key value to resume after, present while rows remain.
    pub next_cursor: Option<JsonValue>,
    pub rows_scanned: usize,
}

/// Scanner for mis-encoded text in a single column.
pub struct EncodingScanner {
    executor: QueryExecutor,
    batch_size: u32,
}

impl EncodingScanner {
    /// Create a scanner with the default batch size.
    pub fn new() -> Self {
        Self {
            executor: QueryExecutor::new(),
            batch_size: crate::config::DEFAULT_SCAN_BATCH_SIZE,
        }
    }

    /// Create a scanner with a custom batch size.
    pub fn with_batch_size(batch_size: u32) -> Self {
        Self {
            executor: QueryExecutor::new(),
            batch_size: batch_size.max(1),
        }
    }

    /// Scan the whole column, batch by batch, and collect every issue.
    ///
    /// Acquires one connection from the pool for the duration of the scan.
    pub async fn scan(
        &self,
        pool: &DiagnosticPool,
        request: &ScanRequest,
    ) -> ToolkitResult<Vec<EncodingIssue>> {
        let mut conn = pool.acquire().await?;
        let snapshot =
            SchemaIntrospector::snapshot(&mut conn, &request.table, request.schema.as_deref())
                .await?;
        let expected = self.resolve_expected(request, &snapshot)?;

        let mut issues = Vec::new();
        let mut cursor = request.resume_after.clone();
        let mut total_rows = 0usize;

        loop {
            let page = self
                .scan_batch(&mut conn, request, &snapshot, expected, cursor.take())
                .await?;
            total_rows += page.rows_scanned;
            issues.extend(page.issues);

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        info!(
            table = %request.table,
            column = %request.column,
            rows = total_rows,
            issues = issues.len(),
            "Encoding scan complete"
        );
        Ok(issues)
    }

    /// Scan a single batch; callers drive the cursor for restartable scans.
    pub async fn scan_page(
        &self,
        conn: &mut PooledConnection,
        request: &ScanRequest,
    ) -> ToolkitResult<ScanPage> {
        let snapshot =
            SchemaIntrospector::snapshot(conn, &request.table, request.schema.as_deref()).await?;
        let expected = self.resolve_expected(request, &snapshot)?;
        self.scan_batch(conn, request, &snapshot, expected, request.resume_after.clone())
            .await
    }

    /// Decide which script family the column should hold.
    fn resolve_expected(
        &self,
        request: &ScanRequest,
        snapshot: &SchemaSnapshot,
    ) -> ToolkitResult<ExpectedScript> {
        if let Some(expected) = request.expected {
            return Ok(expected);
        }

        snapshot
            .column(&request.column)
            .and_then(|c| c.character_set.as_deref())
            .and_then(ExpectedScript::from_charset)
            .ok_or_else(|| {
                ToolkitError::invalid_input(format!(
                    "Cannot derive the expected script for column '{}' from its character set; pass one explicitly",
                    request.column
                ))
            })
    }

    async fn scan_batch(
        &self,
        conn: &mut PooledConnection,
        request: &ScanRequest,
        snapshot: &SchemaSnapshot,
        expected: ExpectedScript,
        cursor: Option<JsonValue>,
    ) -> ToolkitResult<ScanPage> {
        validate_identifier(&request.column)?;
        if snapshot.column(&request.column).is_none() {
            return Err(ToolkitError::schema(
                format!(
                    "Column '{}' not found in table '{}'",
                    request.column, request.table
                ),
                request.column.clone(),
            ));
        }

        let db_type = conn.db_type();
        let batch = request.batch_size.unwrap_or(self.batch_size).max(1);

        match snapshot.primary_key() {
            Some(pk) => {
                let pk_name = pk.name.clone();
                self.scan_keyset_batch(conn, request, db_type, &pk_name, expected, cursor, batch)
                    .await
            }
            // Without a primary key there is no stable cursor; fall back to a
            // single ordered pass with ordinal row identifiers.
            None => self.scan_ordinal(conn, request, db_type, expected).await,
        }
    }

    async fn scan_keyset_batch(
        &self,
        conn: &mut PooledConnection,
        request: &ScanRequest,
        db_type: DatabaseType,
        pk_name: &str,
        expected: ExpectedScript,
        cursor: Option<JsonValue>,
        batch: u32,
    ) -> ToolkitResult<ScanPage> {
        let table = qualified_table(db_type, request)?;
        let pk_ident = quote_identifier(db_type, pk_name);
        let col_ident = quote_identifier(db_type, &request.column);
        let placeholder = match db_type {
            DatabaseType::PostgreSQL => "$1",
            _ => "?",
        };

        let sql = match &cursor {
            Some(_) => format!(
                "SELECT {pk}, {col} FROM {table} WHERE {pk} > {ph} ORDER BY {pk} LIMIT {batch}",
                pk = pk_ident,
                col = col_ident,
                table = table,
                ph = placeholder,
                batch = batch,
            ),
            None => format!(
                "SELECT {pk}, {col} FROM {table} ORDER BY {pk} LIMIT {batch}",
                pk = pk_ident,
                col = col_ident,
                table = table,
                batch = batch,
            ),
        };

        let mut query = QueryRequest::new(sql).with_limit(batch);
        if let Some(cursor) = &cursor {
            query = query.with_param(cursor_param(cursor)?);
        }

        let result = self.executor.execute(conn, &query).await?;
        let rows_scanned = result.row_count();

        let mut issues = Vec::new();
        let mut last_pk: Option<JsonValue> = None;
        for row in &result.rows {
            let row_id = row.get(pk_name).cloned().unwrap_or(JsonValue::Null);
            last_pk = Some(row_id.clone());

            let Some(text) = row.get(&request.column).and_then(|v| v.as_str()) else {
                continue; // null or non-text value
            };
            if text.is_empty() {
                continue;
            }
            if let Some(cause) = classify_text(text, expected) {
                issues.push(EncodingIssue::new(
                    &request.table,
                    &request.column,
                    row_id,
                    text,
                    cause,
                ));
            }
        }

        debug!(
            table = %request.table,
            column = %request.column,
            rows = rows_scanned,
            flagged = issues.len(),
            "Scanned batch"
        );

        let next_cursor = if rows_scanned == batch as usize {
            last_pk
        } else {
            None
        };

        Ok(ScanPage {
            issues,
            next_cursor,
            rows_scanned,
        })
    }

    async fn scan_ordinal(
        &self,
        conn: &mut PooledConnection,
        request: &ScanRequest,
        db_type: DatabaseType,
        expected: ExpectedScript,
    ) -> ToolkitResult<ScanPage> {
        let table = qualified_table(db_type, request)?;
        let col_ident = quote_identifier(db_type, &request.column);
        let sql = format!(
            "SELECT {col} FROM {table} ORDER BY {col}",
            col = col_ident,
            table = table,
        );

        let query = QueryRequest::new(sql).with_limit(crate::models::MAX_ROW_LIMIT);
        let result = self.executor.execute(conn, &query).await?;
        let rows_scanned = result.row_count();

        let mut issues = Vec::new();
        for (ordinal, row) in result.rows.iter().enumerate() {
            let Some(text) = row.get(&request.column).and_then(|v| v.as_str()) else {
                continue;
            };
            if text.is_empty() {
                continue;
            }
            if let Some(cause) = classify_text(text, expected) {
                issues.push(EncodingIssue::new(
                    &request.table,
                    &request.column,
                    JsonValue::from(ordinal as u64 + 1),
                    text,
                    cause,
                ));
            }
        }

        Ok(ScanPage {
            issues,
            next_cursor: None,
            rows_scanned,
        })
    }
}

impl Default for EncodingScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn qualified_table(db_type: DatabaseType, request: &ScanRequest) -> ToolkitResult<String> {
    validate_identifier(&request.table)?;
    match &request.schema {
        Some(schema) => {
            validate_identifier(schema)?;
            Ok(format!(
                "{}.{}",
                quote_identifier(db_type, schema),
                quote_identifier(db_type, &request.table)
            ))
        }
        None => Ok(quote_identifier(db_type, &request.table)),
    }
}

fn cursor_param(cursor: &JsonValue) -> ToolkitResult<QueryParam> {
    match cursor {
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(QueryParam::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(QueryParam::Float(f))
            } else {
                Err(ToolkitError::invalid_input("Unsupported cursor number"))
            }
        }
        JsonValue::String(s) => Ok(QueryParam::String(s.clone())),
        other => Err(ToolkitError::invalid_input(format!(
            "Unsupported cursor value: {}",
            other
        ))),
    }
}

/// Classify one stored value against the script family its column declares.
///
/// Returns the suspected cause, or `None` when the value is consistent.
pub fn classify_text(value: &str, expected: ExpectedScript) -> Option<SuspectedCause> {
    if value.contains('\u{FFFD}') {
        return Some(SuspectedCause::LossyDecode);
    }
    if looks_double_encoded(value) {
        return Some(SuspectedCause::DoubleEncodedUtf8);
    }

    let has_hebrew = value
        .chars()
        .any(|c| ('\u{0590}'..='\u{05FF}').contains(&c));

    match expected {
        ExpectedScript::Latin => has_hebrew.then_some(SuspectedCause::HebrewInLatinColumn),
        ExpectedScript::Hebrew => {
            let has_latin_letters = value.chars().any(|c| c.is_ascii_alphabetic());
            (!has_hebrew && has_latin_letters).then_some(SuspectedCause::LatinInHebrewColumn)
        }
    }
}

/// UTF-8 multi-byte sequences decoded once too often as Latin-1 leave a
/// signature: a lead-byte codepoint (U+00C2..U+00DF) directly followed by a
/// continuation-byte codepoint (U+0080..U+00BF). Hebrew mojibake shows up as
/// U+00D6/U+00D7 pairs, accented Latin as U+00C3 pairs.
fn looks_double_encoded(value: &str) -> bool {
    let mut prev: Option<char> = None;
    for c in value.chars() {
        if let Some(p) = prev {
            if ('\u{00C2}'..='\u{00DF}').contains(&p) && ('\u{0080}'..='\u{00BF}').contains(&c) {
                return true;
            }
        }
        prev = Some(c);
    }
    false
}
