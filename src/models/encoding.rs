//! Encoding-diagnostic data models.
//!
//! Evidence records for text values whose byte representation is inconsistent
//! with the column's declared character set. These are findings, never
//! mutations: the scanner reports, an operator (or a repair script) decides.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Script family a column is expected to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExpectedScript {
    /// Latin letters plus ASCII punctuation and digits
    Latin,
    /// Hebrew block (U+0590..U+05FF)
    Hebrew,
}

impl ExpectedScript {
    /// Derive the expected script from a MySQL character-set name, when the
    /// name implies one.
    pub fn from_charset(charset: &str) -> Option<Self> {
        match charset.to_lowercase().as_str() {
            "hebrew" => Some(Self::Hebrew),
            "latin1" | "latin2" | "ascii" => Some(Self::Latin),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExpectedScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Latin => write!(f, "latin"),
            Self::Hebrew => write!(f, "hebrew"),
        }
    }
}

/// Why a value was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspectedCause {
    /// Hebrew-block codepoints in a column expected to hold Latin text
    HebrewInLatinColumn,
    /// Latin-only text in a column expected to hold Hebrew
    LatinInHebrewColumn,
    /// UTF-8 byte pairs decoded once too often as Latin-1 (mojibake)
    DoubleEncodedUtf8,
    /// Replacement characters left behind by a lossy decode
    LossyDecode,
}

impl std::fmt::Display for SuspectedCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HebrewInLatinColumn => write!(f, "hebrew_in_latin_column"),
            Self::LatinInHebrewColumn => write!(f, "latin_in_hebrew_column"),
            Self::DoubleEncodedUtf8 => write!(f, "double_encoded_utf8"),
            Self::LossyDecode => write!(f, "lossy_decode"),
        }
    }
}

/// Read-only evidence record for one suspect value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingIssue {
    pub table: String,
    pub column: String,
    /// Primary-key value of the offending row, or its ordinal position when
    /// the table has no primary key.
    pub row_id: JsonValue,
    /// The stored value as decoded text.
    pub value: String,
    /// Hex dump of the stored bytes, the raw evidence for deciding a
    /// decode/re-encode transform.
    pub raw_hex: String,
    pub cause: SuspectedCause,
}

impl EncodingIssue {
    /// Create a new issue, capturing the value's bytes as hex evidence.
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        row_id: JsonValue,
        value: impl Into<String>,
        cause: SuspectedCause,
    ) -> Self {
        let value = value.into();
        let raw_hex = to_hex(value.as_bytes());
        Self {
            table: table.into(),
            column: column.into(),
            row_id,
            value,
            raw_hex,
            cause,
        }
    }
}

/// Render bytes as space-separated lowercase hex pairs.
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Parameters for one column scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub table: String,
    pub column: String,
    /// Script family the column should hold. When absent the scanner derives
    /// it from the column's declared character set, where the backend reports
    /// one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<ExpectedScript>,
    /// PostgreSQL/MySQL schema qualifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Rows fetched per batch; bounded memory regardless of table size.
    #[serde(default)]
    pub batch_size: Option<u32>,
    /// Resume a previous scan after this primary-key value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_after: Option<JsonValue>,
}

impl ScanRequest {
    /// Create a new scan request.
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            expected: None,
            schema: None,
            batch_size: None,
            resume_after: None,
        }
    }

    /// Set the expected script explicitly instead of deriving it from the
    /// column's character set.
    pub fn with_expected(mut self, expected: ExpectedScript) -> Self {
        self.expected = Some(expected);
        self
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Resume after a previously seen primary-key value.
    pub fn with_resume_after(mut self, cursor: JsonValue) -> Self {
        self.resume_after = Some(cursor);
        self
    }
}
