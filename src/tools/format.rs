//! Output formatting utilities.
//!
//! Shared output format types and rendering functions used by the console
//! sink for tabular data.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use unicode_width::UnicodeWidthStr;

/// Output format for diagnostic results.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// ASCII table format (like MySQL CLI)
    #[default]
    Table,
    /// Pretty-printed JSON
    Json,
    /// One JSON object per line
    Jsonl,
    /// Markdown table format
    Markdown,
}

#[derive(Debug, Clone)]
pub struct ColumnHeader {
    pub name: String,
}

impl ColumnHeader {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Array(arr) => serde_json::to_string(arr).unwrap_or_default(),
        JsonValue::Object(obj) => serde_json::to_string(obj).unwrap_or_default(),
    }
}

pub fn format_as_table(
    columns: &[ColumnHeader],
    rows: &[serde_json::Map<String, JsonValue>],
    trailer: &str,
) -> String {
    if columns.is_empty() {
        return "Empty set\n".to_string();
    }

    let mut widths: Vec<usize> = columns.iter().map(|c| c.name.width()).collect();
    for row in rows {
        for (i, col) in columns.iter().enumerate() {
            if let Some(value) = row.get(&col.name) {
                let val_width = format_value(value).width();
                widths[i] = widths[i].max(val_width);
            }
        }
    }

    let mut output = String::new();
    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    output.push_str(&separator);
    let header: String = columns
        .iter()
        .zip(&widths)
        .map(|(col, w)| format!("| {:^width$} ", col.name, width = w))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);
    output.push_str(&separator);

    for row in rows {
        let row_str: String = columns
            .iter()
            .zip(&widths)
            .map(|(col, w)| {
                let value = row.get(&col.name).cloned().unwrap_or(JsonValue::Null);
                let formatted = format_value(&value);
                if matches!(value, JsonValue::Number(_)) {
                    format!("| {:>width$} ", formatted, width = w)
                } else {
                    format!("| {:<width$} ", formatted, width = w)
                }
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&row_str);
    }

    output.push_str(&separator);
    if !trailer.is_empty() {
        output.push_str(trailer);
        output.push('\n');
    }

    output
}

pub fn format_as_markdown(
    columns: &[ColumnHeader],
    rows: &[serde_json::Map<String, JsonValue>],
    trailer: &str,
) -> String {
    if columns.is_empty() {
        return "*Empty set*\n".to_string();
    }

    let mut output = String::new();

    let header: String = columns
        .iter()
        .map(|c| format!("| {} ", c.name))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);

    let sep: String = columns.iter().map(|_| "|---").collect::<String>() + "|\n";
    output.push_str(&sep);

    for row in rows {
        let row_str: String = columns
            .iter()
            .map(|col| {
                let value = row.get(&col.name).cloned().unwrap_or(JsonValue::Null);
                format!("| {} ", format_value(&value))
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&row_str);
    }

    if !trailer.is_empty() {
        output.push_str(&format!("\n*{}*\n", trailer));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rows() -> (Vec<ColumnHeader>, Vec<serde_json::Map<String, JsonValue>>) {
        let columns = vec![ColumnHeader::new("name"), ColumnHeader::new("range_km")];
        let mut row = serde_json::Map::new();
        row.insert("name".to_string(), serde_json::json!("shahed"));
        row.insert("range_km".to_string(), serde_json::json!(2500));
        (columns, vec![row])
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&JsonValue::Null), "NULL");
        assert_eq!(format_value(&serde_json::json!(3.5)), "3.5");
        assert_eq!(format_value(&serde_json::json!("x")), "x");
    }

    #[test]
    fn test_format_as_table() {
        let (columns, rows) = sample_rows();
        let table = format_as_table(&columns, &rows, "1 row in set");
        assert!(table.contains("| shahed"));
        assert!(table.contains("range_km"));
        assert!(table.contains("1 row in set"));
        // Numbers are right-aligned
        assert!(table.contains(" 2500 |"));
    }

    #[test]
    fn test_format_as_table_empty() {
        let table = format_as_table(&[], &[], "");
        assert!(table.contains("Empty set"));
    }

    #[test]
    fn test_format_as_markdown() {
        let (columns, rows) = sample_rows();
        let md = format_as_markdown(&columns, &rows, "1 row");
        assert!(md.starts_with("| name "));
        assert!(md.contains("|---|---|"));
        assert!(md.contains("| shahed "));
    }
}
