//! Database schema and migrations.
//!
//! The record tables are generated from the column contract in
//! [`crate::model::schema`]; only the feedback table is local to SQLite.

use crate::model::schema::{FieldMode, FieldType, TableSchema, ALL_TABLES};
use anyhow::{Context, Result};
use rusqlite::Connection;

/// SQLite column type for a contract field type.
pub fn sql_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::String | FieldType::Timestamp | FieldType::Json => "TEXT",
        FieldType::Float => "REAL",
        FieldType::Integer => "INTEGER",
    }
}

/// `CREATE TABLE` statement for a table schema. The first column is the key.
pub fn create_table_sql(table: &TableSchema) -> String {
    let columns: Vec<String> = table
        .fields
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let mut col = format!("{} {}", field.name, sql_type(field.field_type));
            if field.mode == FieldMode::Required {
                col.push_str(" NOT NULL");
            }
            if i == 0 {
                col.push_str(" PRIMARY KEY");
            }
            col
        })
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        table.table,
        columns.join(",\n    ")
    )
}

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for table in ALL_TABLES {
        conn.execute(&create_table_sql(table), [])
            .with_context(|| format!("failed to create table {}", table.table))?;
    }

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS feedback (
            id INTEGER PRIMARY KEY,
            anomaly_id TEXT NOT NULL,
            is_false_positive INTEGER NOT NULL,
            notes TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_feedback_created ON feedback(created_at);
        CREATE INDEX IF NOT EXISTS idx_analyses_anomaly ON analyses(anomaly_id);
        CREATE INDEX IF NOT EXISTS idx_baselines_metric ON baselines(metric_name, calculated_at);

        INSERT OR IGNORE INTO schema_version (version) VALUES (1);",
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::schema::{ANALYSIS_TABLE_SCHEMA, BASELINE_TABLE_SCHEMA};

    #[test]
    fn test_migrate_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        for table in ["anomalies", "analyses", "baselines", "feedback"] {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .unwrap();
            assert_eq!(count, 0);
        }
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap(); // Should not error
    }

    #[test]
    fn test_columns_follow_the_contract() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let mut stmt = conn
            .prepare("SELECT name, type, \"notnull\", pk FROM pragma_table_info('baselines')")
            .unwrap();
        let cols: Vec<(String, String, i64, i64)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(cols.len(), BASELINE_TABLE_SCHEMA.fields.len());
        assert_eq!(cols[0], ("baseline_id".to_string(), "TEXT".to_string(), 1, 1));
        assert_eq!(cols[2], ("mean".to_string(), "REAL".to_string(), 1, 0));
        assert_eq!(cols[10], ("lookback_days".to_string(), "INTEGER".to_string(), 1, 0));
        assert_eq!(cols[13], ("notes".to_string(), "TEXT".to_string(), 0, 0));
    }

    #[test]
    fn test_create_table_sql() {
        let sql = create_table_sql(&ANALYSIS_TABLE_SCHEMA);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS analyses ("));
        assert!(sql.contains("analysis_id TEXT NOT NULL PRIMARY KEY"));
        assert!(sql.contains("contributing_factors TEXT,"));
        assert!(sql.contains("analysis_duration_ms INTEGER NOT NULL"));
    }
}
