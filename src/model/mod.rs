//! Domain model -- anomalies, analyses, baselines and their persisted schemas.
//!
//! Every record here is built once (by the validator, the analysis engine or
//! the baseline producer) and never mutated afterwards. The serde
//! representation of each record is its canonical dictionary form: the keys
//! and nesting match the public JSON contract exactly.

pub mod analysis;
pub mod anomaly;
pub mod baseline;
pub mod schema;

pub use self::analysis::{AnomalyAnalysis, HumanReadableSummary, Recommendation, RootCause};
pub use self::anomaly::Anomaly;
pub use self::baseline::BaselineStats;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Returned when a string does not name a member of one of the closed enums.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}', expected one of: {expected}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
    pub expected: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str, all: &[&'static str]) -> Self {
        Self {
            kind,
            value: value.to_string(),
            expected: all.join(", "),
        }
    }
}

// ---------------------------------------------------------------------------
// AnomalyType
// ---------------------------------------------------------------------------

/// What kind of problem the deviation points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    /// System instability, failures, errors.
    Stability,
    /// Slow responses, degraded throughput.
    Performance,
    /// Financial waste, over-provisioning.
    Cost,
    /// CPU, memory or disk pressure.
    Resource,
    Unknown,
}

impl AnomalyType {
    pub const ALL: [AnomalyType; 5] = [
        AnomalyType::Stability,
        AnomalyType::Performance,
        AnomalyType::Cost,
        AnomalyType::Resource,
        AnomalyType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::Stability => "stability",
            AnomalyType::Performance => "performance",
            AnomalyType::Cost => "cost",
            AnomalyType::Resource => "resource",
            AnomalyType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnomalyType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("anomaly type", s, &Self::ALL.map(|t| t.as_str())))
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// How urgently the anomaly needs attention.
/// Unordered; variants are declared most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Immediate action required.
    Critical,
    /// Action required soon.
    High,
    /// Should be addressed.
    Medium,
    /// Monitor.
    Low,
    /// Informational.
    Info,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("severity", s, &Self::ALL.map(|v| v.as_str())))
    }
}

// ---------------------------------------------------------------------------
// Priority / RiskLevel
// ---------------------------------------------------------------------------

/// Priority of a recommendation. Declaration order is sort order: most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    /// Priority a first-line fix should get for an anomaly of this severity.
    pub fn for_severity(severity: Severity) -> Self {
        match severity {
            Severity::Critical => Priority::Critical,
            Severity::High => Priority::High,
            Severity::Medium => Priority::Medium,
            Severity::Low | Severity::Info => Priority::Low,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("priority", s, &Self::ALL.map(|p| p.as_str())))
    }
}

/// Risk of carrying out a recommendation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 3] = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("risk level", s, &Self::ALL.map(|r| r.as_str())))
    }
}
