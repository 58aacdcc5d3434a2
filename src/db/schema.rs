//! Schema introspection.
//!
//! Retrieves table definitions as ordered `SchemaSnapshot`s and compares two
//! snapshots. Strictly read/compare: nothing in this module mutates schema.
//!
//! SQL queries live in the `queries` submodule with constants per database
//! type; database-specific implementations are in their respective
//! submodules, each providing the same interface.

use crate::db::pool::{DbConn, PooledConnection};
use crate::error::{ToolkitError, ToolkitResult};
use crate::models::{ColumnSpec, DatabaseType, KeyRole, SchemaDelta, SchemaSnapshot};
use tracing::debug;

/// Check that a name is usable as a SQL identifier.
///
/// Table and column names cannot be bound as parameters, so anything
/// interpolated into SQL text must pass this first.
pub fn validate_identifier(name: &str) -> ToolkitResult<()> {
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let tail_ok = name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if head_ok && tail_ok {
        Ok(())
    } else {
        Err(ToolkitError::invalid_input(format!(
            "Invalid identifier '{}': identifiers must match [A-Za-z_][A-Za-z0-9_]*",
            name
        )))
    }
}

/// Quote a validated identifier for the given backend.
pub fn quote_identifier(db_type: DatabaseType, name: &str) -> String {
    match db_type {
        DatabaseType::MySQL => format!("`{}`", name),
        DatabaseType::PostgreSQL | DatabaseType::SQLite => format!("\"{}\"", name),
    }
}

/// Schema inspector for table introspection and snapshot comparison.
pub struct SchemaIntrospector;

impl SchemaIntrospector {
    /// Read a table's schema as an ordered snapshot.
    pub async fn snapshot(
        conn: &mut PooledConnection,
        table: &str,
        schema: Option<&str>,
    ) -> ToolkitResult<SchemaSnapshot> {
        validate_identifier(table)?;
        if let Some(s) = schema {
            validate_identifier(s)?;
        }

        let snapshot = match conn.conn_mut() {
            DbConn::Postgres(c) => postgres::snapshot(c, table, schema).await?,
            DbConn::MySql(c) => mysql::snapshot(c, table, schema).await?,
            DbConn::SQLite(c) => sqlite::snapshot(c, table).await?,
        };

        if snapshot.columns.is_empty() {
            return Err(ToolkitError::schema(
                format!("Table '{}' not found", table),
                table.to_string(),
            ));
        }

        debug!(
            table = table,
            columns = snapshot.columns.len(),
            "Captured schema snapshot"
        );
        Ok(snapshot)
    }

    /// Compare an expected snapshot against an observed one.
    ///
    /// Deltas are findings, not errors; an empty sequence means the schemas
    /// match.
    pub fn diff(expected: &SchemaSnapshot, actual: &SchemaSnapshot) -> Vec<SchemaDelta> {
        expected.diff(actual)
    }
}

mod queries {
    pub mod postgres {
        pub const COLUMNS: &str = r#"
        SELECT
            c.column_name,
            c.data_type,
            c.is_nullable
        FROM information_schema.columns c
        WHERE c.table_name = $1 AND c.table_schema = $2
        ORDER BY c.ordinal_position
        "#;

        pub const KEY_COLUMNS: &str = r#"
        SELECT
            kcu.column_name,
            tc.constraint_type
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
        WHERE tc.table_name = $1
        AND tc.table_schema = $2
        AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE')
        "#;
    }

    pub mod mysql {
        pub const COLUMNS: &str = r#"
        SELECT
            CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
            CONVERT(COLUMN_TYPE USING utf8) AS COLUMN_TYPE,
            CONVERT(IS_NULLABLE USING utf8) AS IS_NULLABLE,
            CONVERT(COLUMN_KEY USING utf8) AS COLUMN_KEY,
            CONVERT(CHARACTER_SET_NAME USING utf8) AS CHARACTER_SET_NAME
        FROM information_schema.columns
        WHERE TABLE_NAME = ? AND TABLE_SCHEMA = COALESCE(?, DATABASE())
        ORDER BY ORDINAL_POSITION
        "#;
    }
}

mod postgres {
    use super::*;
    use sqlx::{PgConnection, Row};
    use std::collections::HashMap;

    pub async fn snapshot(
        conn: &mut PgConnection,
        table: &str,
        schema: Option<&str>,
    ) -> ToolkitResult<SchemaSnapshot> {
        let schema_name = schema.unwrap_or("public");

        let key_rows = sqlx::query(queries::postgres::KEY_COLUMNS)
            .bind(table)
            .bind(schema_name)
            .fetch_all(&mut *conn)
            .await?;

        let mut key_roles: HashMap<String, KeyRole> = HashMap::new();
        for row in &key_rows {
            let column: String = row.get("column_name");
            let constraint: String = row.get("constraint_type");
            let role = if constraint == "PRIMARY KEY" {
                KeyRole::Primary
            } else {
                KeyRole::Unique
            };
            // Primary wins when a column is in both a PK and a unique constraint.
            let entry = key_roles.entry(column).or_insert(role);
            if role == KeyRole::Primary {
                *entry = KeyRole::Primary;
            }
        }

        let rows = sqlx::query(queries::postgres::COLUMNS)
            .bind(table)
            .bind(schema_name)
            .fetch_all(&mut *conn)
            .await?;

        let mut snapshot = SchemaSnapshot::new(table);
        for row in &rows {
            let name: String = row.get("column_name");
            let data_type: String = row.get("data_type");
            let nullable: String = row.get("is_nullable");
            let key_role = key_roles.get(&name).copied().unwrap_or_default();

            snapshot.columns.push(
                ColumnSpec::new(&name, &data_type, nullable == "YES").with_key_role(key_role),
            );
        }
        Ok(snapshot)
    }
}

mod mysql {
    use super::*;
    use sqlx::{MySqlConnection, Row};

    /// information_schema may hand back VARBINARY depending on charset
    /// configuration, so string columns are read with a byte fallback.
    fn get_string(row: &sqlx::mysql::MySqlRow, column: &str) -> String {
        row.try_get::<String, _>(column)
            .ok()
            .or_else(|| {
                row.try_get::<Vec<u8>, _>(column)
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
            .unwrap_or_default()
    }

    fn get_optional_string(row: &sqlx::mysql::MySqlRow, column: &str) -> Option<String> {
        row.try_get::<Option<String>, _>(column)
            .ok()
            .flatten()
            .or_else(|| {
                row.try_get::<Option<Vec<u8>>, _>(column)
                    .ok()
                    .flatten()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
    }

    pub async fn snapshot(
        conn: &mut MySqlConnection,
        table: &str,
        schema: Option<&str>,
    ) -> ToolkitResult<SchemaSnapshot> {
        let rows = sqlx::query(queries::mysql::COLUMNS)
            .bind(table)
            .bind(schema)
            .fetch_all(&mut *conn)
            .await?;

        let mut snapshot = SchemaSnapshot::new(table);
        for row in &rows {
            let name = get_string(row, "COLUMN_NAME");
            let data_type = get_string(row, "COLUMN_TYPE");
            let nullable = get_string(row, "IS_NULLABLE");
            let key_role = match get_string(row, "COLUMN_KEY").as_str() {
                "PRI" => KeyRole::Primary,
                "UNI" => KeyRole::Unique,
                "MUL" => KeyRole::Index,
                _ => KeyRole::None,
            };

            let mut col =
                ColumnSpec::new(&name, &data_type, nullable == "YES").with_key_role(key_role);
            if let Some(charset) = get_optional_string(row, "CHARACTER_SET_NAME") {
                if !charset.is_empty() {
                    col = col.with_character_set(charset);
                }
            }
            snapshot.columns.push(col);
        }
        Ok(snapshot)
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Row, SqliteConnection};

    pub async fn snapshot(conn: &mut SqliteConnection, table: &str) -> ToolkitResult<SchemaSnapshot> {
        // PRAGMA arguments cannot be bound; `table` was validated upstream.
        let pragma = format!("PRAGMA table_info('{}')", table);
        let rows = sqlx::query(&pragma).fetch_all(&mut *conn).await?;

        let mut snapshot = SchemaSnapshot::new(table);
        for row in &rows {
            let name: String = row.get("name");
            let data_type: String = row.get("type");
            let notnull: i32 = row.get("notnull");
            let pk: i32 = row.get("pk");

            let key_role = if pk > 0 { KeyRole::Primary } else { KeyRole::None };
            snapshot.columns.push(
                ColumnSpec::new(&name, &data_type, notnull == 0).with_key_role(key_role),
            );
        }

        apply_index_roles(conn, table, &mut snapshot).await;
        Ok(snapshot)
    }

    /// Upgrade key roles from the table's index list. Primary stays primary;
    /// a single-column unique index marks its column unique; everything else
    /// indexed gets the index role.
    async fn apply_index_roles(
        conn: &mut SqliteConnection,
        table: &str,
        snapshot: &mut SchemaSnapshot,
    ) {
        let idx_query = format!("PRAGMA index_list('{}')", table);
        let idx_list = sqlx::query(&idx_query)
            .fetch_all(&mut *conn)
            .await
            .unwrap_or_default();

        for idx_row in &idx_list {
            let idx_name: String = idx_row.get("name");
            let is_unique: i32 = idx_row.get("unique");
            let origin: String = idx_row.try_get("origin").unwrap_or_default();
            if origin == "pk" {
                continue;
            }

            let info_query = format!("PRAGMA index_info('{}')", idx_name);
            let columns: Vec<String> = sqlx::query(&info_query)
                .fetch_all(&mut *conn)
                .await
                .unwrap_or_default()
                .iter()
                .map(|row| row.get("name"))
                .collect();

            let role = if is_unique != 0 && columns.len() == 1 {
                KeyRole::Unique
            } else {
                KeyRole::Index
            };

            for col_name in &columns {
                if let Some(col) = snapshot
                    .columns
                    .iter_mut()
                    .find(|c| &c.name == col_name && c.key_role == KeyRole::None)
                {
                    col.key_role = role;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("missiles").is_ok());
        assert!(validate_identifier("_scratch").is_ok());
        assert!(validate_identifier("col_2").is_ok());

        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("2fast").is_err());
        assert!(validate_identifier("name; DROP TABLE x").is_err());
        assert!(validate_identifier("na me").is_err());
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier(DatabaseType::MySQL, "missiles"), "`missiles`");
        assert_eq!(
            quote_identifier(DatabaseType::PostgreSQL, "missiles"),
            "\"missiles\""
        );
        assert_eq!(
            quote_identifier(DatabaseType::SQLite, "missiles"),
            "\"missiles\""
        );
    }
}
