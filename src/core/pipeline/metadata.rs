//! Per-family result facts attached to successful steps.

use crate::core::table::DataType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata produced by a successful step, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepMetadata {
    Rows(RowFacts),
    Columns(ColumnFacts),
    Values(ValueFacts),
    Conversion(ConversionFacts),
    Derived(DerivedFacts),
    Reshape(ReshapeFacts),
    Join(JoinFacts),
    Quality(QualityReport),
}

impl StepMetadata {
    pub fn kind(&self) -> &'static str {
        match self {
            StepMetadata::Rows(_) => "rows",
            StepMetadata::Columns(_) => "columns",
            StepMetadata::Values(_) => "values",
            StepMetadata::Conversion(_) => "conversion",
            StepMetadata::Derived(_) => "derived",
            StepMetadata::Reshape(_) => "reshape",
            StepMetadata::Join(_) => "join",
            StepMetadata::Quality(_) => "quality",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFacts {
    pub rows_before: usize,
    pub rows_after: usize,
    pub rows_removed: usize,
}

impl RowFacts {
    pub fn new(rows_before: usize, rows_after: usize) -> Self {
        Self {
            rows_before,
            rows_after,
            rows_removed: rows_before.saturating_sub(rows_after),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rename {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnFacts {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub renamed: Vec<Rename>,
    pub columns_after: Vec<String>,
}

/// Cell-level edits within existing columns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValueFacts {
    pub columns: Vec<String>,
    pub values_changed: usize,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub changes_by_column: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub changes_by_target: BTreeMap<String, usize>,
    pub nulls_introduced: usize,
}

impl ValueFacts {
    pub fn record(&mut self, column: &str, changed: usize) {
        if !self.columns.iter().any(|c| c == column) {
            self.columns.push(column.to_string());
        }
        self.values_changed += changed;
        *self.changes_by_column.entry(column.to_string()).or_insert(0) += changed;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionFacts {
    pub column: String,
    pub from_type: DataType,
    pub to_type: DataType,
    pub values_converted: usize,
    pub nulls_introduced: usize,
}

/// A column computed from other columns (dates, arithmetic, windows).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedFacts {
    pub column: String,
    pub source_columns: Vec<String>,
    pub rows: usize,
    pub nulls_produced: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partitions: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReshapeFacts {
    pub rows_before: usize,
    pub rows_after: usize,
    pub columns_before: usize,
    pub columns_after: usize,
    pub groups: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinFacts {
    pub left_rows: usize,
    pub right_rows: usize,
    pub matched_rows: usize,
    pub unmatched_left: usize,
    pub unmatched_right: usize,
    pub rows_after: usize,
}

/// Drift severity. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl Severity {
    /// Bands for ratio based checks: <=5% low, <=20% medium, above that high.
    pub fn from_ratio(detected: bool, ratio: f64) -> Self {
        if !detected {
            Severity::None
        } else if ratio <= 0.05 {
            Severity::Low
        } else if ratio <= 0.20 {
            Severity::Medium
        } else {
            Severity::High
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl QualityIssue {
    pub fn new<K: Into<String>, D: Into<String>>(kind: K, column: Option<&str>, detail: D) -> Self {
        Self {
            kind: kind.into(),
            column: column.map(str::to_string),
            detail: detail.into(),
            count: None,
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }
}

/// Read-only diagnostic produced by data-quality checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub check: String,
    pub drift_detected: bool,
    pub severity: Severity,
    pub issues: Vec<QualityIssue>,
    #[serde(default)]
    pub statistics: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag_column: Option<String>,
}
