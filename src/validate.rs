//! Request validation and normalization.
//!
//! Turns an untrusted JSON mapping into an [`Anomaly`]. Pure: no I/O, no
//! logging, no configuration.

use crate::model::anomaly::DEFAULT_CONFIDENCE;
use crate::model::{Anomaly, AnomalyType, Severity};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Keys every inbound anomaly must carry, in reporting order.
pub const REQUIRED_FIELDS: [&str; 10] = [
    "anomaly_id",
    "detected_at",
    "metric_name",
    "metric_type",
    "current_value",
    "baseline_value",
    "deviation_sigma",
    "deviation_percentage",
    "anomaly_type",
    "severity",
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing required fields: {}", .missing.join(", "))]
    MissingFields { missing: Vec<&'static str> },

    #[error("invalid timestamp for '{field}': {value} is not ISO-8601")]
    InvalidTimestamp { field: String, value: String },

    #[error("invalid numeric value for '{field}': {value}")]
    InvalidNumericField { field: String, value: String },

    #[error("invalid value {value} for '{field}', expected one of: {expected}")]
    InvalidEnumValue {
        field: &'static str,
        value: String,
        expected: String,
    },

    #[error("invalid value for '{field}': expected {expected}, got {value}")]
    InvalidFieldType {
        field: String,
        expected: &'static str,
        value: String,
    },
}

impl ValidationError {
    /// Name of the offending field, when the error concerns a single one.
    pub fn field(&self) -> Option<&str> {
        match self {
            ValidationError::MissingFields { .. } => None,
            ValidationError::InvalidTimestamp { field, .. }
            | ValidationError::InvalidNumericField { field, .. }
            | ValidationError::InvalidFieldType { field, .. } => Some(field.as_str()),
            ValidationError::InvalidEnumValue { field, .. } => Some(*field),
        }
    }
}

/// Validate `raw` and build the typed anomaly it describes.
pub fn normalize(raw: &Map<String, Value>) -> Result<Anomaly, ValidationError> {
    let missing: Vec<&'static str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|key| !raw.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingFields { missing });
    }

    let anomaly_id = text(raw, "anomaly_id")?;
    let metric_name = text(raw, "metric_name")?;
    let metric_type = text(raw, "metric_type")?;

    let detected_at = timestamp("detected_at", &raw["detected_at"])?;

    let current_value = number("current_value", &raw["current_value"])?;
    let baseline_value = number("baseline_value", &raw["baseline_value"])?;
    let deviation_sigma = number("deviation_sigma", &raw["deviation_sigma"])?;
    let deviation_percentage = number("deviation_percentage", &raw["deviation_percentage"])?;

    let anomaly_type: AnomalyType = enumeration(raw, "anomaly_type")?;
    let severity: Severity = enumeration(raw, "severity")?;

    let confidence = match optional(raw, "confidence") {
        Some(v) => number("confidence", v)?,
        None => DEFAULT_CONFIDENCE,
    };

    let affected_resources = match optional(raw, "affected_resources") {
        Some(Value::Array(items)) => items.clone(),
        Some(other) => return Err(wrong_type("affected_resources", "array", other)),
        None => Vec::new(),
    };

    let mut time_window = BTreeMap::new();
    if let Some(v) = optional(raw, "time_window") {
        for (name, ts) in object("time_window", v)? {
            let field = format!("time_window.{name}");
            time_window.insert(name.clone(), timestamp(&field, ts)?);
        }
    }

    let mut related_metrics = BTreeMap::new();
    if let Some(v) = optional(raw, "related_metrics") {
        for (name, value) in object("related_metrics", v)? {
            let field = format!("related_metrics.{name}");
            related_metrics.insert(name.clone(), number(&field, value)?);
        }
    }

    let metadata = match optional(raw, "metadata") {
        Some(v) => object("metadata", v)?.clone(),
        None => Map::new(),
    };

    Ok(Anomaly {
        anomaly_id,
        detected_at,
        metric_name,
        metric_type,
        current_value,
        baseline_value,
        deviation_sigma,
        deviation_percentage,
        anomaly_type,
        severity,
        confidence,
        affected_resources,
        time_window,
        related_metrics,
        metadata,
    })
}

impl TryFrom<&Map<String, Value>> for Anomaly {
    type Error = ValidationError;

    fn try_from(raw: &Map<String, Value>) -> Result<Self, Self::Error> {
        normalize(raw)
    }
}

/// Parse an ISO-8601 timestamp.
///
/// Accepts RFC 3339 (including a trailing `Z`), a space instead of `T`, and
/// offset-less forms, which are read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M%:z"] {
        if let Ok(ts) = DateTime::parse_from_str(raw, fmt) {
            return Some(ts);
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc().fixed_offset());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Optional keys: an explicit `null` counts as absent.
fn optional<'a>(raw: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    raw.get(key).filter(|v| !v.is_null())
}

fn text(raw: &Map<String, Value>, key: &'static str) -> Result<String, ValidationError> {
    match &raw[key] {
        Value::String(s) => Ok(s.clone()),
        other => Err(wrong_type(key, "string", other)),
    }
}

fn timestamp(field: &str, v: &Value) -> Result<DateTime<FixedOffset>, ValidationError> {
    v.as_str()
        .and_then(parse_timestamp)
        .ok_or_else(|| ValidationError::InvalidTimestamp {
            field: field.to_string(),
            value: v.to_string(),
        })
}

/// Coerce a JSON number or numeric string to a finite `f64`.
fn number(field: &str, v: &Value) -> Result<f64, ValidationError> {
    let parsed = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(x) if x.is_finite() => Ok(x),
        _ => Err(ValidationError::InvalidNumericField {
            field: field.to_string(),
            value: v.to_string(),
        }),
    }
}

fn enumeration<T>(raw: &Map<String, Value>, key: &'static str) -> Result<T, ValidationError>
where
    T: std::str::FromStr<Err = crate::model::UnknownVariant>,
{
    let v = &raw[key];
    let Some(s) = v.as_str() else {
        return Err(ValidationError::InvalidEnumValue {
            field: key,
            value: v.to_string(),
            expected: expected_values(key),
        });
    };
    s.parse::<T>().map_err(|e| ValidationError::InvalidEnumValue {
        field: key,
        value: v.to_string(),
        expected: e.expected,
    })
}

fn expected_values(key: &str) -> String {
    let all: Vec<&str> = match key {
        "anomaly_type" => AnomalyType::ALL.iter().map(|t| t.as_str()).collect(),
        _ => Severity::ALL.iter().map(|s| s.as_str()).collect(),
    };
    all.join(", ")
}

fn object<'a>(field: &str, v: &'a Value) -> Result<&'a Map<String, Value>, ValidationError> {
    v.as_object().ok_or_else(|| wrong_type(field, "object", v))
}

fn wrong_type(field: &str, expected: &'static str, v: &Value) -> ValidationError {
    ValidationError::InvalidFieldType {
        field: field.to_string(),
        expected,
        value: v.to_string(),
    }
}
