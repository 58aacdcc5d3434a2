//! Schema-related data models.
//!
//! This module defines the point-in-time schema snapshot and the pure
//! snapshot comparison that backs schema drift reports.

use serde::{Deserialize, Serialize};

/// Role a column plays in the table's keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyRole {
    #[default]
    None,
    Primary,
    Unique,
    /// Part of a non-unique index
    Index,
}

impl std::fmt::Display for KeyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Primary => write!(f, "primary"),
            Self::Unique => write!(f, "unique"),
            Self::Index => write!(f, "index"),
        }
    }
}

/// Definition of one column inside a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    /// Full type as reported by the database (e.g., `varchar(30)`)
    pub data_type: String,
    pub nullable: bool,
    #[serde(default)]
    pub key_role: KeyRole,
    /// MySQL only; drives the encoding scanner's expected-script default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_set: Option<String>,
}

impl ColumnSpec {
    /// Create a new column spec.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            key_role: KeyRole::None,
            character_set: None,
        }
    }

    /// Set the key role.
    pub fn with_key_role(mut self, key_role: KeyRole) -> Self {
        self.key_role = key_role;
        self
    }

    /// Set the character set (MySQL only).
    pub fn with_character_set(mut self, charset: impl Into<String>) -> Self {
        self.character_set = Some(charset.into());
        self
    }
}

/// Point-in-time, immutable read of one table's schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub table: String,
    /// Columns in ordinal position order.
    pub columns: Vec<ColumnSpec>,
}

impl SchemaSnapshot {
    /// Create a new snapshot.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
        }
    }

    /// Add a column.
    pub fn with_column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The first primary-key column, if the table has one.
    pub fn primary_key(&self) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.key_role == KeyRole::Primary)
    }

    /// Compare this snapshot (the expected shape) against an observed one.
    ///
    /// Column names are visited in expected order first, then any columns
    /// unique to `actual` in their own order. A name present on only one side
    /// emits `Removed`/`Added`; a name on both sides has its type, nullability
    /// and key role compared, and any mismatch emits a single `Changed` delta
    /// listing the differing fields.
    pub fn diff(&self, actual: &SchemaSnapshot) -> Vec<SchemaDelta> {
        let mut deltas = Vec::new();

        for expected_col in &self.columns {
            match actual.column(&expected_col.name) {
                None => deltas.push(SchemaDelta::removed(&expected_col.name)),
                Some(actual_col) => {
                    if let Some(delta) = compare_columns(expected_col, actual_col) {
                        deltas.push(delta);
                    }
                }
            }
        }

        for actual_col in &actual.columns {
            if self.column(&actual_col.name).is_none() {
                deltas.push(SchemaDelta::added(&actual_col.name, actual_col));
            }
        }

        deltas
    }
}

/// Normalize a database type name so an expected snapshot authored against
/// one backend's spelling still compares against another's.
pub fn normalize_type_name(type_name: &str) -> String {
    let lower = type_name.to_lowercase();

    match lower.as_str() {
        "int4" | "integer" | "int" => "integer".to_string(),
        "int8" | "bigint" | "bigserial" => "bigint".to_string(),
        "int2" | "smallint" => "smallint".to_string(),
        "varchar" | "character varying" | "text" | "string" => "text".to_string(),
        "char" | "character" | "bpchar" => "char".to_string(),
        "bool" | "boolean" => "boolean".to_string(),
        "float4" | "real" | "float" => "real".to_string(),
        "float8" | "double precision" | "double" => "double".to_string(),
        "bytea" | "blob" | "binary" | "varbinary" => "binary".to_string(),
        "timestamp" | "timestamptz" | "datetime" => "timestamp".to_string(),
        "json" | "jsonb" => "json".to_string(),
        _ => lower,
    }
}

/// Compare one column present in both snapshots.
fn compare_columns(expected: &ColumnSpec, actual: &ColumnSpec) -> Option<SchemaDelta> {
    let mut changed_fields = Vec::new();
    let mut details = Vec::new();

    if normalize_type_name(&expected.data_type) != normalize_type_name(&actual.data_type) {
        changed_fields.push("data_type".to_string());
        details.push(format!(
            "data_type: {} vs {}",
            expected.data_type, actual.data_type
        ));
    }
    if expected.nullable != actual.nullable {
        changed_fields.push("nullable".to_string());
        details.push(format!(
            "nullable: {} vs {}",
            expected.nullable, actual.nullable
        ));
    }
    if expected.key_role != actual.key_role {
        changed_fields.push("key_role".to_string());
        details.push(format!(
            "key_role: {} vs {}",
            expected.key_role, actual.key_role
        ));
    }

    if changed_fields.is_empty() {
        None
    } else {
        Some(SchemaDelta {
            kind: DeltaKind::Changed,
            column: expected.name.clone(),
            changed_fields,
            detail: details.join("; "),
        })
    }
}

/// Kind of difference between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    /// Present only in the observed snapshot
    Added,
    /// Present only in the expected snapshot
    Removed,
    Changed,
}

/// One difference between an expected and an observed snapshot.
///
/// Deltas are findings, not errors: a diagnostic run that produces them has
/// succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDelta {
    pub kind: DeltaKind,
    pub column: String,
    /// Field names that differ; empty for added/removed columns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_fields: Vec<String>,
    pub detail: String,
}

impl SchemaDelta {
    fn added(column: &str, spec: &ColumnSpec) -> Self {
        Self {
            kind: DeltaKind::Added,
            column: column.to_string(),
            changed_fields: Vec::new(),
            detail: format!(
                "unexpected column: {} {}{}",
                spec.name,
                spec.data_type,
                if spec.nullable { "" } else { " NOT NULL" }
            ),
        }
    }

    fn removed(column: &str) -> Self {
        Self {
            kind: DeltaKind::Removed,
            column: column.to_string(),
            changed_fields: Vec::new(),
            detail: "expected column is missing".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missiles_snapshot() -> SchemaSnapshot {
        SchemaSnapshot::new("missiles")
            .with_column(
                ColumnSpec::new("id", "INTEGER", false).with_key_role(KeyRole::Primary),
            )
            .with_column(ColumnSpec::new("name", "TEXT", false))
            .with_column(ColumnSpec::new("type", "TEXT", true))
            .with_column(ColumnSpec::new("mass_kg", "REAL", true))
    }

    #[test]
    fn test_diff_reflexive() {
        let snap = missiles_snapshot();
        assert!(snap.diff(&snap).is_empty());
    }

    #[test]
    fn test_diff_detects_missing_and_extra_columns() {
        let expected = missiles_snapshot();
        let mut actual = missiles_snapshot();
        actual.columns.retain(|c| c.name != "mass_kg");
        actual
            .columns
            .push(ColumnSpec::new("warhead_kg", "REAL", true));

        let deltas = expected.diff(&actual);
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].kind, DeltaKind::Removed);
        assert_eq!(deltas[0].column, "mass_kg");
        assert_eq!(deltas[1].kind, DeltaKind::Added);
        assert_eq!(deltas[1].column, "warhead_kg");
    }

    #[test]
    fn test_diff_reports_changed_fields() {
        let expected = missiles_snapshot();
        let mut actual = missiles_snapshot();
        actual.columns[2].data_type = "VARCHAR(40)".to_string();
        actual.columns[2].nullable = false;

        let deltas = expected.diff(&actual);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].kind, DeltaKind::Changed);
        assert_eq!(deltas[0].column, "type");
        assert_eq!(deltas[0].changed_fields, vec!["data_type", "nullable"]);
        assert!(deltas[0].detail.contains("VARCHAR(40)"));
    }

    #[test]
    fn test_diff_type_comparison_is_normalized() {
        let expected =
            SchemaSnapshot::new("missiles").with_column(ColumnSpec::new("name", "text", false));
        let actual =
            SchemaSnapshot::new("missiles").with_column(ColumnSpec::new("name", "TEXT", false));
        assert!(expected.diff(&actual).is_empty());

        // Cross-backend spellings of the same type do not count as drift.
        let expected =
            SchemaSnapshot::new("missiles").with_column(ColumnSpec::new("id", "INT4", false));
        let actual =
            SchemaSnapshot::new("missiles").with_column(ColumnSpec::new("id", "integer", false));
        assert!(expected.diff(&actual).is_empty());
    }

    #[test]
    fn test_normalize_type_name() {
        assert_eq!(normalize_type_name("INT4"), "integer");
        assert_eq!(normalize_type_name("VARCHAR"), "text");
        assert_eq!(normalize_type_name("FLOAT8"), "double");
        assert_eq!(normalize_type_name("BYTEA"), "binary");
        assert_eq!(normalize_type_name("varchar(40)"), "varchar(40)");
    }

    #[test]
    fn test_diff_symmetry() {
        let a = missiles_snapshot();
        let mut b = missiles_snapshot();
        b.columns.retain(|c| c.name != "name");
        b.columns.push(ColumnSpec::new("range_km", "REAL", true));
        b.columns[1].nullable = false; // "type"

        let forward = a.diff(&b);
        let backward = b.diff(&a);
        assert_eq!(forward.len(), backward.len());

        for fwd in &forward {
            let mirrored_kind = match fwd.kind {
                DeltaKind::Added => DeltaKind::Removed,
                DeltaKind::Removed => DeltaKind::Added,
                DeltaKind::Changed => DeltaKind::Changed,
            };
            let back = backward
                .iter()
                .find(|d| d.column == fwd.column)
                .expect("column present in both directions");
            assert_eq!(back.kind, mirrored_kind);
            if fwd.kind == DeltaKind::Changed {
                assert_eq!(back.changed_fields, fwd.changed_fields);
            }
        }
    }

    #[test]
    fn test_primary_key_lookup() {
        let snap = missiles_snapshot();
        assert_eq!(snap.primary_key().map(|c| c.name.as_str()), Some("id"));

        let no_pk = SchemaSnapshot::new("notes").with_column(ColumnSpec::new("body", "TEXT", true));
        assert!(no_pk.primary_key().is_none());
    }

    #[test]
    fn test_snapshot_round_trips_through_json() {
        let snap = missiles_snapshot();
        let json = serde_json::to_string(&snap).unwrap();
        let back: SchemaSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.columns.len(), snap.columns.len());
        assert_eq!(back.primary_key().map(|c| c.name.as_str()), Some("id"));
    }
}
