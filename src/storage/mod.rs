//! SQLite storage layer -- schema-driven persistence of anomalies, analyses,
//! baselines and operator feedback.

pub mod schema;

use crate::engine::BaselineSource;
use crate::model::schema::{
    FieldMode, FieldSchema, FieldType, TableSchema, ANALYSIS_TABLE_SCHEMA, ANOMALY_TABLE_SCHEMA,
    BASELINE_TABLE_SCHEMA,
};
use crate::model::{Anomaly, AnomalyAnalysis, BaselineStats};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::path::Path;
use uuid::Uuid;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &str) -> Result<Pool> {
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create database directory {}", parent.display()))?;
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// Persistence collaborator used by the orchestrator and the health surface.
///
/// Calls block; async callers run them on the blocking pool.
pub trait AnalysisStore: Send + Sync {
    /// Store the analysis and the anomaly it owns. Returns the new analysis ID.
    fn save_analysis(&self, analysis: &AnomalyAnalysis) -> Result<String>;

    fn record_feedback(&self, anomaly_id: &str, is_false_positive: bool, notes: Option<&str>) -> Result<()>;

    /// Share of feedback within the window flagged as false positive; `None` without feedback.
    fn false_positive_rate(&self, window_days: u32) -> Result<Option<f64>>;

    /// Round-trip to the backend.
    fn ping(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self> {
        Ok(Self {
            pool: open_pool(path)?,
        })
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn save_anomaly(&self, anomaly: &Anomaly) -> Result<()> {
        let conn = self.pool.get()?;
        upsert(&conn, &ANOMALY_TABLE_SCHEMA, &anomaly.to_row())?;
        Ok(())
    }

    pub fn save_baseline(&self, baseline: &BaselineStats) -> Result<()> {
        let conn = self.pool.get()?;
        upsert(&conn, &BASELINE_TABLE_SCHEMA, &baseline.to_row())
            .with_context(|| format!("failed to save baseline {}", baseline.baseline_id))?;
        Ok(())
    }
}

impl AnalysisStore for SqliteStore {
    fn save_analysis(&self, analysis: &AnomalyAnalysis) -> Result<String> {
        let analysis_id = format!("analysis-{}", Uuid::new_v4());
        let row = analysis.to_row(&analysis_id)?;

        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        upsert(&tx, &ANOMALY_TABLE_SCHEMA, &analysis.anomaly.to_row())?;
        insert(&tx, &ANALYSIS_TABLE_SCHEMA, &row)?;
        tx.commit()?;

        Ok(analysis_id)
    }

    fn record_feedback(&self, anomaly_id: &str, is_false_positive: bool, notes: Option<&str>) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO feedback (anomaly_id, is_false_positive, notes) VALUES (?1, ?2, ?3)",
            params![anomaly_id, is_false_positive, notes],
        )
        .context("Failed to insert feedback")?;
        Ok(())
    }

    fn false_positive_rate(&self, window_days: u32) -> Result<Option<f64>> {
        let conn = self.pool.get()?;
        let (total, false_positives): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(is_false_positive), 0) FROM feedback
             WHERE created_at >= datetime('now', ?1)",
            params![format!("-{window_days} days")],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        if total == 0 {
            return Ok(None);
        }
        Ok(Some(false_positives as f64 / total as f64))
    }

    fn ping(&self) -> Result<()> {
        let conn = self.pool.get().context("Failed to get DB connection")?;
        let _: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
        Ok(())
    }
}

impl BaselineSource for SqliteStore {
    fn latest_baseline(&self, metric_name: &str) -> Result<Option<BaselineStats>> {
        let conn = self.pool.get()?;
        let baseline = conn
            .query_row(
                "SELECT baseline_id, metric_name, mean, std_dev, min_value, max_value,
                        p50, p95, p99, calculated_at, lookback_days, sample_count,
                        data_source, notes
                 FROM baselines WHERE metric_name = ?1
                 ORDER BY calculated_at DESC LIMIT 1",
                params![metric_name],
                |row| {
                    let calculated_at: String = row.get(9)?;
                    let calculated_at = DateTime::parse_from_rfc3339(&calculated_at)
                        .map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e))
                        })?
                        .with_timezone(&Utc);

                    Ok(BaselineStats {
                        baseline_id: row.get(0)?,
                        metric_name: row.get(1)?,
                        mean: row.get(2)?,
                        std_dev: row.get(3)?,
                        min_value: row.get(4)?,
                        max_value: row.get(5)?,
                        p50: row.get(6)?,
                        p95: row.get(7)?,
                        p99: row.get(8)?,
                        calculated_at,
                        lookback_days: row.get(10)?,
                        sample_count: row.get::<_, i64>(11)? as u64,
                        data_source: row.get(12)?,
                        notes: row.get(13)?,
                    })
                },
            )
            .optional()?;
        Ok(baseline)
    }
}

// ---------------------------------------------------------------------------
// Schema-driven row binding
// ---------------------------------------------------------------------------

fn insert(conn: &Connection, table: &TableSchema, row: &Map<String, Value>) -> Result<()> {
    write_row(conn, "INSERT", table, row)
}

fn upsert(conn: &Connection, table: &TableSchema, row: &Map<String, Value>) -> Result<()> {
    write_row(conn, "INSERT OR REPLACE", table, row)
}

fn write_row(conn: &Connection, verb: &str, table: &TableSchema, row: &Map<String, Value>) -> Result<()> {
    let values = bind_row(table, row)?;
    let columns: Vec<&str> = table.fields.iter().map(|f| f.name).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "{verb} INTO {} ({}) VALUES ({})",
        table.table,
        columns.join(", "),
        placeholders.join(", ")
    );
    conn.execute(&sql, rusqlite::params_from_iter(values))
        .with_context(|| format!("failed to write row into {}", table.table))?;
    Ok(())
}

/// Bind `row` to the table's columns in schema order.
///
/// Keys outside the schema are ignored. A missing or null value is an error
/// for REQUIRED columns and SQL NULL for NULLABLE ones.
pub fn bind_row(table: &TableSchema, row: &Map<String, Value>) -> Result<Vec<SqlValue>> {
    table
        .fields
        .iter()
        .map(|field| match (row.get(field.name).filter(|v| !v.is_null()), field.mode) {
            (None, FieldMode::Required) => {
                bail!("column {}.{} is required", table.table, field.name)
            }
            (None, FieldMode::Nullable) => Ok(SqlValue::Null),
            (Some(v), _) => to_sql(table, field, v),
        })
        .collect()
}

fn to_sql(table: &TableSchema, field: &FieldSchema, v: &Value) -> Result<SqlValue> {
    let mismatch = || {
        anyhow::anyhow!(
            "column {}.{} expects {:?}, got {}",
            table.table,
            field.name,
            field.field_type,
            v
        )
    };
    Ok(match field.field_type {
        FieldType::String | FieldType::Timestamp => {
            SqlValue::Text(v.as_str().ok_or_else(mismatch)?.to_string())
        }
        FieldType::Float => SqlValue::Real(v.as_f64().ok_or_else(mismatch)?),
        FieldType::Integer => SqlValue::Integer(v.as_i64().ok_or_else(mismatch)?),
        FieldType::Json => SqlValue::Text(serde_json::to_string(v)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::analysis::tests::sample_analysis;
    use crate::model::anomaly::tests::sample_anomaly;
    use crate::model::baseline::tests::sample_baseline;
    use chrono::Duration;
    use serde_json::json;

    fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("gateway.db");
        let store = SqliteStore::open(path.to_str().unwrap()).unwrap();
        (dir, store)
    }

    fn count(store: &SqliteStore, table: &str) -> i64 {
        store
            .pool()
            .get()
            .unwrap()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_save_analysis_writes_both_records() {
        let (_dir, store) = temp_store();
        let analysis = sample_analysis();

        let id = store.save_analysis(&analysis).unwrap();
        assert!(id.starts_with("analysis-"));
        assert_eq!(count(&store, "anomalies"), 1);
        assert_eq!(count(&store, "analyses"), 1);

        // Re-analysis of the same anomaly keeps one anomaly row.
        store.save_analysis(&analysis).unwrap();
        assert_eq!(count(&store, "anomalies"), 1);
        assert_eq!(count(&store, "analyses"), 2);

        let conn = store.pool().get().unwrap();
        let (recs, factors): (String, Option<String>) = conn
            .query_row(
                "SELECT recommendations, contributing_factors FROM analyses WHERE analysis_id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        let recs: Value = serde_json::from_str(&recs).unwrap();
        assert_eq!(recs[0]["priority"], "high");
        assert_eq!(factors.as_deref(), Some("[\"Retry storm\"]"));
    }

    #[test]
    fn test_save_anomaly_is_keyed_by_id() {
        let (_dir, store) = temp_store();
        let anomaly = sample_anomaly();

        store.save_anomaly(&anomaly).unwrap();
        store.save_anomaly(&anomaly).unwrap();
        assert_eq!(count(&store, "anomalies"), 1);

        let conn = store.pool().get().unwrap();
        let (detected_at, severity, resources): (String, String, String) = conn
            .query_row(
                "SELECT detected_at, severity, affected_resources FROM anomalies WHERE anomaly_id = ?1",
                params![anomaly.anomaly_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(detected_at, "2024-12-16T14:05:30+00:00");
        assert_eq!(severity, "high");
        assert_eq!(resources, "[\"service-a\",\"service-b\"]");
    }

    #[test]
    fn test_baseline_roundtrip_picks_latest() {
        let (_dir, store) = temp_store();
        let older = sample_baseline();
        let newer = BaselineStats {
            baseline_id: "baseline-error_rate-20241216".into(),
            calculated_at: older.calculated_at + Duration::days(1),
            notes: Some("post-migration".into()),
            ..older.clone()
        };
        store.save_baseline(&newer).unwrap();
        store.save_baseline(&older).unwrap();

        let found = store.latest_baseline("error_rate").unwrap().unwrap();
        assert_eq!(found, newer);
        assert!(store.latest_baseline("cpu_utilization").unwrap().is_none());
    }

    #[test]
    fn test_false_positive_rate() {
        let (_dir, store) = temp_store();
        assert_eq!(store.false_positive_rate(30).unwrap(), None);

        store.record_feedback("anom_1", true, Some("maintenance window")).unwrap();
        store.record_feedback("anom_2", false, None).unwrap();
        store.record_feedback("anom_3", false, None).unwrap();
        store.record_feedback("anom_4", false, None).unwrap();
        assert_eq!(store.false_positive_rate(30).unwrap(), Some(0.25));

        // Feedback outside the window is not counted.
        store
            .pool()
            .get()
            .unwrap()
            .execute(
                "INSERT INTO feedback (anomaly_id, is_false_positive, created_at)
                 VALUES ('old', 1, datetime('now', '-90 days'))",
                [],
            )
            .unwrap();
        assert_eq!(store.false_positive_rate(30).unwrap(), Some(0.25));
        assert_eq!(store.false_positive_rate(365).unwrap(), Some(0.4));
    }

    #[test]
    fn test_ping() {
        let (_dir, store) = temp_store();
        store.ping().unwrap();
    }

    #[test]
    fn test_bind_row_enforces_required_columns() {
        let mut row = sample_baseline().to_row();
        row.insert("mean".into(), Value::Null);
        let err = bind_row(&BASELINE_TABLE_SCHEMA, &row).unwrap_err();
        assert!(err.to_string().contains("baselines.mean is required"));

        let mut row = sample_baseline().to_row();
        row.insert("lookback_days".into(), json!("thirty"));
        assert!(bind_row(&BASELINE_TABLE_SCHEMA, &row).is_err());

        let values = bind_row(&BASELINE_TABLE_SCHEMA, &sample_baseline().to_row()).unwrap();
        assert_eq!(values.len(), 14);
        assert_eq!(values[13], SqlValue::Null);
    }
}
