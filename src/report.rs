//! Report sinks.
//!
//! The toolkit emits structured records; a sink decides presentation. The
//! core never prints on its own - every diagnostic result flows through a
//! `ReportSink`, whether that is a human-readable console table or a
//! line-delimited JSON file another tool consumes.

use crate::error::{ToolkitError, ToolkitResult};
use crate::models::{EncodingIssue, QueryResult, RepairResult, SchemaDelta};
use crate::tools::format::{ColumnHeader, OutputFormat, format_as_markdown, format_as_table};
use serde_json::Value as JsonValue;
use std::io::Write;

/// Write-only receiver for structured diagnostic output.
pub trait ReportSink {
    fn emit_query(&mut self, result: &QueryResult) -> ToolkitResult<()>;
    fn emit_schema_deltas(&mut self, table: &str, deltas: &[SchemaDelta]) -> ToolkitResult<()>;
    fn emit_encoding_issues(&mut self, issues: &[EncodingIssue]) -> ToolkitResult<()>;
    fn emit_repair(&mut self, result: &RepairResult) -> ToolkitResult<()>;
}

/// Human-oriented sink rendering tables, markdown, or JSON to a writer.
pub struct ConsoleSink<W: Write> {
    writer: W,
    format: OutputFormat,
}

impl ConsoleSink<std::io::Stdout> {
    /// Create a sink writing to stdout.
    pub fn stdout(format: OutputFormat) -> Self {
        Self {
            writer: std::io::stdout(),
            format,
        }
    }
}

impl<W: Write> ConsoleSink<W> {
    /// Create a sink writing to the given writer.
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self { writer, format }
    }

    fn emit_tabular(
        &mut self,
        columns: &[ColumnHeader],
        rows: &[serde_json::Map<String, JsonValue>],
        trailer: &str,
        json: &JsonValue,
    ) -> ToolkitResult<()> {
        match self.format {
            OutputFormat::Table => {
                let rendered = format_as_table(columns, rows, trailer);
                self.writer.write_all(rendered.as_bytes())?;
            }
            OutputFormat::Markdown => {
                let rendered = format_as_markdown(columns, rows, trailer);
                self.writer.write_all(rendered.as_bytes())?;
            }
            OutputFormat::Json => {
                let rendered = serde_json::to_string_pretty(json)
                    .map_err(|e| ToolkitError::internal(e.to_string()))?;
                writeln!(self.writer, "{}", rendered)?;
            }
            OutputFormat::Jsonl => {
                let rendered = serde_json::to_string(json)
                    .map_err(|e| ToolkitError::internal(e.to_string()))?;
                writeln!(self.writer, "{}", rendered)?;
            }
        }
        Ok(())
    }
}

impl<W: Write> ReportSink for ConsoleSink<W> {
    fn emit_query(&mut self, result: &QueryResult) -> ToolkitResult<()> {
        let columns: Vec<ColumnHeader> = result
            .columns
            .iter()
            .map(|c| ColumnHeader::new(&c.name))
            .collect();
        let trailer = format!(
            "{} row(s) in set ({:.2} sec){}",
            result.row_count(),
            result.execution_time_ms as f64 / 1000.0,
            if result.truncated { " [truncated]" } else { "" }
        );
        let json = serde_json::to_value(result)
            .map_err(|e| ToolkitError::internal(e.to_string()))?;
        self.emit_tabular(&columns, &result.rows, &trailer, &json)
    }

    fn emit_schema_deltas(&mut self, table: &str, deltas: &[SchemaDelta]) -> ToolkitResult<()> {
        let columns = vec![
            ColumnHeader::new("kind"),
            ColumnHeader::new("column"),
            ColumnHeader::new("detail"),
        ];
        let rows: Vec<serde_json::Map<String, JsonValue>> = deltas
            .iter()
            .map(|d| {
                let mut row = serde_json::Map::new();
                row.insert("kind".to_string(), serde_json::to_value(d.kind).unwrap_or_default());
                row.insert("column".to_string(), JsonValue::String(d.column.clone()));
                row.insert("detail".to_string(), JsonValue::String(d.detail.clone()));
                row
            })
            .collect();
        let trailer = if deltas.is_empty() {
            format!("schema of '{}' matches", table)
        } else {
            format!("{} delta(s) for '{}'", deltas.len(), table)
        };
        let json = serde_json::json!({ "table": table, "deltas": deltas });
        self.emit_tabular(&columns, &rows, &trailer, &json)
    }

    fn emit_encoding_issues(&mut self, issues: &[EncodingIssue]) -> ToolkitResult<()> {
        let columns = vec![
            ColumnHeader::new("row_id"),
            ColumnHeader::new("cause"),
            ColumnHeader::new("value"),
            ColumnHeader::new("raw_hex"),
        ];
        let rows: Vec<serde_json::Map<String, JsonValue>> = issues
            .iter()
            .map(|i| {
                let mut row = serde_json::Map::new();
                row.insert("row_id".to_string(), i.row_id.clone());
                row.insert("cause".to_string(), JsonValue::String(i.cause.to_string()));
                row.insert("value".to_string(), JsonValue::String(i.value.clone()));
                row.insert("raw_hex".to_string(), JsonValue::String(i.raw_hex.clone()));
                row
            })
            .collect();
        let trailer = match issues.first() {
            Some(first) => format!(
                "{} issue(s) in {}.{}",
                issues.len(),
                first.table,
                first.column
            ),
            None => "no encoding issues found".to_string(),
        };
        let json = serde_json::json!({ "issues": issues });
        self.emit_tabular(&columns, &rows, &trailer, &json)
    }

    fn emit_repair(&mut self, result: &RepairResult) -> ToolkitResult<()> {
        match self.format {
            OutputFormat::Json | OutputFormat::Jsonl => {
                let json = serde_json::to_value(result)
                    .map_err(|e| ToolkitError::internal(e.to_string()))?;
                self.emit_tabular(&[], &[], "", &json)
            }
            _ => {
                writeln!(
                    self.writer,
                    "repair '{}' [{}]: {} ({} of {} statement(s), {} row(s) affected)",
                    result.script_id,
                    result.run_id,
                    result.outcome,
                    result.statements_applied,
                    result.statements_total,
                    result.rows_affected,
                )?;
                if let Some(verification) = &result.verification {
                    writeln!(
                        self.writer,
                        "  verification: expected {}, observed {}",
                        verification.expected, verification.observed
                    )?;
                }
                if let Some(error) = &result.error {
                    writeln!(self.writer, "  error: {}", error)?;
                }
                Ok(())
            }
        }
    }
}

/// Machine-oriented sink writing one JSON object per record.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    /// Create a sink writing line-delimited JSON to the given writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    fn emit_record(&mut self, kind: &str, payload: JsonValue) -> ToolkitResult<()> {
        let record = serde_json::json!({ "kind": kind, "payload": payload });
        let line =
            serde_json::to_string(&record).map_err(|e| ToolkitError::internal(e.to_string()))?;
        writeln!(self.writer, "{}", line)?;
        Ok(())
    }
}

impl<W: Write> ReportSink for JsonLinesSink<W> {
    fn emit_query(&mut self, result: &QueryResult) -> ToolkitResult<()> {
        let payload =
            serde_json::to_value(result).map_err(|e| ToolkitError::internal(e.to_string()))?;
        self.emit_record("query_result", payload)
    }

    fn emit_schema_deltas(&mut self, table: &str, deltas: &[SchemaDelta]) -> ToolkitResult<()> {
        self.emit_record(
            "schema_deltas",
            serde_json::json!({ "table": table, "deltas": deltas }),
        )
    }

    fn emit_encoding_issues(&mut self, issues: &[EncodingIssue]) -> ToolkitResult<()> {
        self.emit_record("encoding_issues", serde_json::json!({ "issues": issues }))
    }

    fn emit_repair(&mut self, result: &RepairResult) -> ToolkitResult<()> {
        let payload =
            serde_json::to_value(result).map_err(|e| ToolkitError::internal(e.to_string()))?;
        self.emit_record("repair_result", payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnDescriptor, DeltaKind, SuspectedCause};

    fn sample_query_result() -> QueryResult {
        let mut row = serde_json::Map::new();
        row.insert("name".to_string(), serde_json::json!("shahed"));
        QueryResult {
            columns: vec![ColumnDescriptor::new("name", "TEXT")],
            rows: vec![row],
            rows_affected: None,
            truncated: false,
            execution_time_ms: 12,
        }
    }

    #[test]
    fn test_console_sink_table_output() {
        let mut buf = Vec::new();
        {
            let mut sink = ConsoleSink::new(&mut buf, OutputFormat::Table);
            sink.emit_query(&sample_query_result()).unwrap();
        }
        let out = String::from_utf8(buf).unwrap();
        assert!(out.contains("| shahed |"));
        assert!(out.contains("1 row(s) in set"));
    }

    #[test]
    fn test_console_sink_json_output() {
        let mut buf = Vec::new();
        {
            let mut sink = ConsoleSink::new(&mut buf, OutputFormat::Json);
            sink.emit_query(&sample_query_result()).unwrap();
        }
        let out = String::from_utf8(buf).unwrap();
        let parsed: JsonValue = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["rows"][0]["name"], "shahed");
    }

    #[test]
    fn test_jsonl_sink_wraps_records() {
        let mut buf = Vec::new();
        {
            let mut sink = JsonLinesSink::new(&mut buf);
            sink.emit_schema_deltas("missiles", &[]).unwrap();
            sink.emit_encoding_issues(&[EncodingIssue::new(
                "missiles",
                "name",
                serde_json::json!(1),
                "\u{05E9}",
                SuspectedCause::HebrewInLatinColumn,
            )])
            .unwrap();
        }
        let out = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: JsonValue = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["kind"], "schema_deltas");
        let second: JsonValue = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["kind"], "encoding_issues");
        assert_eq!(second["payload"]["issues"][0]["raw_hex"], "d7 a9");
    }

    #[test]
    fn test_console_sink_deltas_trailer() {
        let mut buf = Vec::new();
        {
            let mut sink = ConsoleSink::new(&mut buf, OutputFormat::Table);
            let deltas = vec![SchemaDelta {
                kind: DeltaKind::Removed,
                column: "mass_kg".to_string(),
                changed_fields: Vec::new(),
                detail: "expected column is missing".to_string(),
            }];
            sink.emit_schema_deltas("missiles", &deltas).unwrap();
        }
        let out = String::from_utf8(buf).unwrap();
        assert!(out.contains("removed"));
        assert!(out.contains("1 delta(s) for 'missiles'"));
    }
}
