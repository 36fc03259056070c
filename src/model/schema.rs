//! Tabular schemas for the Anomaly, Analysis and Baseline tables.
//!
//! These are the column contract any persistence backend must honor. The
//! SQLite store derives its DDL from them (see `storage::schema`).

use serde::Serialize;

/// Primitive column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    String,
    Timestamp,
    /// Double precision.
    Float,
    Integer,
    /// Free-form JSON document (nested mappings and sequences).
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    Required,
    Nullable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSchema {
    pub name: &'static str,
    pub field_type: FieldType,
    pub mode: FieldMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub table: &'static str,
    pub fields: &'static [FieldSchema],
}

impl TableSchema {
    /// The first column, used as the row key.
    pub fn key(&self) -> &'static FieldSchema {
        &self.fields[0]
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }
}

const fn col(name: &'static str, field_type: FieldType, mode: FieldMode) -> FieldSchema {
    FieldSchema { name, field_type, mode }
}

use FieldMode::{Nullable, Required};
use FieldType::{Float, Integer, Json, String as Str, Timestamp};

pub const ANOMALY_TABLE_SCHEMA: TableSchema = TableSchema {
    table: "anomalies",
    fields: &[
        col("anomaly_id", Str, Required),
        col("detected_at", Timestamp, Required),
        col("metric_name", Str, Required),
        col("metric_type", Str, Required),
        col("current_value", Float, Required),
        col("baseline_value", Float, Required),
        col("deviation_sigma", Float, Required),
        col("deviation_percentage", Float, Required),
        col("anomaly_type", Str, Required),
        col("severity", Str, Required),
        col("confidence", Float, Required),
        col("affected_resources", Json, Nullable),
        col("related_metrics", Json, Nullable),
        col("metadata", Json, Nullable),
    ],
};

pub const ANALYSIS_TABLE_SCHEMA: TableSchema = TableSchema {
    table: "analyses",
    fields: &[
        col("analysis_id", Str, Required),
        col("anomaly_id", Str, Required),
        col("analyzed_at", Timestamp, Required),
        col("root_cause", Str, Required),
        col("contributing_factors", Json, Nullable),
        col("confidence", Float, Required),
        col("recommendations", Json, Required),
        col("ai_model_used", Str, Required),
        col("analysis_duration_ms", Integer, Required),
    ],
};

pub const BASELINE_TABLE_SCHEMA: TableSchema = TableSchema {
    table: "baselines",
    fields: &[
        col("baseline_id", Str, Required),
        col("metric_name", Str, Required),
        col("mean", Float, Required),
        col("std_dev", Float, Required),
        col("min_value", Float, Required),
        col("max_value", Float, Required),
        col("p50", Float, Required),
        col("p95", Float, Required),
        col("p99", Float, Required),
        col("calculated_at", Timestamp, Required),
        col("lookback_days", Integer, Required),
        col("sample_count", Integer, Required),
        col("data_source", Str, Required),
        col("notes", Str, Nullable),
    ],
};

pub const ALL_TABLES: [&TableSchema; 3] = [
    &ANOMALY_TABLE_SCHEMA,
    &ANALYSIS_TABLE_SCHEMA,
    &BASELINE_TABLE_SCHEMA,
];

/// Look a schema up by its short name (`anomaly`, `analysis`, `baseline`).
pub fn by_name(name: &str) -> Option<&'static TableSchema> {
    match name {
        "anomaly" | "anomalies" => Some(&ANOMALY_TABLE_SCHEMA),
        "analysis" | "analyses" => Some(&ANALYSIS_TABLE_SCHEMA),
        "baseline" | "baselines" => Some(&BASELINE_TABLE_SCHEMA),
        _ => None,
    }
}
