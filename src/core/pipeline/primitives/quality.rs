//! Read-only data-quality checks.
//!
//! Checks never edit cells. The only change they may make is appending a
//! boolean flag column when the caller names one.

use super::build_column;
use crate::core::error::AppError;
use crate::core::pipeline::metadata::{QualityIssue, QualityReport, Severity, StepMetadata};
use crate::core::pipeline::params::{self, OneOrMany};
use crate::core::pipeline::primitive::{
    ParamKind, ParamSpec, PrimitiveDefinition, StepOutput, TypedPrimitive,
};
use crate::core::table::{parse_iso_datetime, Column, DataType, Table, Value, ValueKey};
use crate::core::types::PrimitiveCategory;
use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;

const CATEGORY: PrimitiveCategory = PrimitiveCategory::DataQuality;

/// Distinct invalid values listed in a single issue before truncating.
const MAX_LISTED_VALUES: usize = 5;

fn report(check: &str, severity: Severity) -> QualityReport {
    QualityReport {
        check: check.to_string(),
        drift_detected: severity != Severity::None,
        severity,
        issues: Vec::new(),
        statistics: BTreeMap::new(),
        flag_column: None,
    }
}

fn check_flag_column(table: &Table, flag_column: Option<&String>) -> Result<(), AppError> {
    match flag_column {
        Some(name) => params::require_output_name(table, "flag_column", name, None),
        None => Ok(()),
    }
}

/// Shared outcome of the per-cell validity checks.
struct CellAudit {
    checked: usize,
    nulls: usize,
    invalid: Vec<bool>,
    invalid_values: IndexMap<ValueKey, (Value, usize)>,
}

impl CellAudit {
    fn run(column: &Column, mut is_valid: impl FnMut(&Value) -> bool) -> Self {
        let mut audit = CellAudit {
            checked: 0,
            nulls: 0,
            invalid: Vec::with_capacity(column.len()),
            invalid_values: IndexMap::new(),
        };
        for value in column.values() {
            if value.is_null() {
                audit.nulls += 1;
                audit.invalid.push(false);
                continue;
            }
            audit.checked += 1;
            let ok = is_valid(value);
            if !ok {
                audit
                    .invalid_values
                    .entry(value.key())
                    .or_insert_with(|| (value.clone(), 0))
                    .1 += 1;
            }
            audit.invalid.push(!ok);
        }
        audit
    }

    fn invalid_count(&self) -> usize {
        self.invalid.iter().filter(|i| **i).count()
    }

    fn ratio(&self) -> f64 {
        if self.checked == 0 {
            0.0
        } else {
            self.invalid_count() as f64 / self.checked as f64
        }
    }

    fn into_output(
        self,
        table: &Table,
        check: &str,
        column: &str,
        issue_kind: &str,
        max_invalid_ratio: f64,
        flag_column: Option<String>,
    ) -> Result<StepOutput, AppError> {
        let ratio = self.ratio();
        let invalid = self.invalid_count();
        let detected = invalid > 0 && ratio > max_invalid_ratio;
        let mut quality = report(check, Severity::from_ratio(detected, ratio));
        if invalid > 0 {
            let listed: Vec<String> = self
                .invalid_values
                .values()
                .take(MAX_LISTED_VALUES)
                .map(|(value, count)| format!("'{}' ({})", value, count))
                .collect();
            let more = self.invalid_values.len().saturating_sub(MAX_LISTED_VALUES);
            let mut detail = format!("{} invalid values: {}", invalid, listed.join(", "));
            if more > 0 {
                detail.push_str(&format!(" and {} more", more));
            }
            quality
                .issues
                .push(QualityIssue::new(issue_kind, Some(column), detail).with_count(invalid));
        }
        quality.statistics.insert("checked".into(), self.checked as f64);
        quality.statistics.insert("nulls".into(), self.nulls as f64);
        quality.statistics.insert("invalid".into(), invalid as f64);
        quality.statistics.insert("invalid_ratio".into(), ratio);
        quality
            .statistics
            .insert("distinct_invalid".into(), self.invalid_values.len() as f64);

        let output = match flag_column {
            Some(name) => {
                let flags = self.invalid.into_iter().map(Value::Bool).collect();
                let column = build_column(&name, DataType::Boolean, flags)?;
                quality.flag_column = Some(name.clone());
                table.with_column(&name, column).map_err(|e| e.into_execution())?
            }
            None => table.clone(),
        };
        Ok(StepOutput::new(output, StepMetadata::Quality(quality)))
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectSchemaDriftParams {
    #[serde(default)]
    expected_columns: Option<Vec<String>>,
    #[serde(default)]
    expected_types: Option<IndexMap<String, String>>,
    #[serde(default = "params::default_true")]
    allow_extra: bool,
}

impl DetectSchemaDriftParams {
    fn expected(&self) -> Result<IndexMap<String, Option<DataType>>, AppError> {
        let mut expected: IndexMap<String, Option<DataType>> = IndexMap::new();
        for name in self.expected_columns.iter().flatten() {
            expected.insert(name.clone(), None);
        }
        for (name, raw) in self.expected_types.iter().flatten() {
            let dtype: DataType = raw.parse().map_err(|reason: String| {
                AppError::parameter("expected_types", format!("column '{}': {}", name, reason))
            })?;
            expected.insert(name.clone(), Some(dtype));
        }
        Ok(expected)
    }
}

pub struct DetectSchemaDrift;

impl TypedPrimitive for DetectSchemaDrift {
    type Params = DetectSchemaDriftParams;
    const NAME: &'static str = "detect_schema_drift";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Compare the table's columns and types with an expected schema. Severity is high when an expected column is missing, medium on a type mismatch, low on unexpected columns when extras are not allowed, otherwise none.",
        )
        .param(ParamSpec::optional("expected_columns", ParamKind::Columns, "Columns that must be present"))
        .param(ParamSpec::optional("expected_types", ParamKind::Mapping, "Expected type per column"))
        .param(
            ParamSpec::optional("allow_extra", ParamKind::Boolean, "Accept columns that are not expected")
                .default_value("true"),
        )
        .example(
            "Make sure the export still has id, email and signup_date",
            json!({"expected_columns": ["id", "email", "signup_date"]}),
        )
        .example(
            "Check that amount is a float and created_at a datetime",
            json!({"expected_types": {"amount": "float", "created_at": "datetime"}}),
        )
        .example(
            "Flag any column we did not agree on",
            json!({"expected_columns": ["id", "name"], "allow_extra": false}),
        )
    }

    fn check(&self, params: &DetectSchemaDriftParams, _table: &Table) -> Result<(), AppError> {
        if params.expected_columns.is_none() && params.expected_types.is_none() {
            return Err(AppError::parameter(
                "expected_columns",
                "give expected_columns, expected_types or both",
            ));
        }
        params.expected().map(|_| ())
    }

    fn apply(&self, table: &Table, params: DetectSchemaDriftParams) -> Result<StepOutput, AppError> {
        let expected = params.expected()?;
        let mut issues = Vec::new();
        let mut missing = 0usize;
        let mut mismatched = 0usize;
        for (name, dtype) in &expected {
            match table.column(name) {
                None => {
                    missing += 1;
                    issues.push(QualityIssue::new(
                        "missing_column",
                        Some(name.as_str()),
                        format!("expected column '{}' is missing", name),
                    ));
                }
                Some(column) => {
                    let actual = column.dtype();
                    if let Some(want) = dtype {
                        // an all-null column carries no type evidence
                        if actual != *want && actual != DataType::Null {
                            mismatched += 1;
                            issues.push(QualityIssue::new(
                                "type_mismatch",
                                Some(name.as_str()),
                                format!("expected {} but found {}", want, actual),
                            ));
                        }
                    }
                }
            }
        }
        let extras: Vec<&str> = table
            .column_names()
            .into_iter()
            .filter(|name| !expected.contains_key(*name))
            .collect();
        if !params.allow_extra {
            for name in &extras {
                issues.push(QualityIssue::new(
                    "unexpected_column",
                    Some(*name),
                    format!("column '{}' is not in the expected schema", name),
                ));
            }
        }

        let severity = if missing > 0 {
            Severity::High
        } else if mismatched > 0 {
            Severity::Medium
        } else if !params.allow_extra && !extras.is_empty() {
            Severity::Low
        } else {
            Severity::None
        };
        let mut quality = report(Self::NAME, severity);
        quality.issues = issues;
        quality.statistics.insert("expected_columns".into(), expected.len() as f64);
        quality.statistics.insert("actual_columns".into(), table.column_count() as f64);
        quality.statistics.insert("missing_columns".into(), missing as f64);
        quality.statistics.insert("type_mismatches".into(), mismatched as f64);
        quality.statistics.insert("unexpected_columns".into(), extras.len() as f64);
        Ok(StepOutput::new(table.clone(), StepMetadata::Quality(quality)))
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckEnumValuesParams {
    column: String,
    allowed: Vec<JsonValue>,
    #[serde(default = "params::default_true")]
    case_sensitive: bool,
    #[serde(default)]
    max_invalid_ratio: f64,
    #[serde(default)]
    flag_column: Option<String>,
}

impl CheckEnumValuesParams {
    fn allowed_keys(&self, dtype: DataType) -> Result<IndexSet<ValueKey>, AppError> {
        self.allowed
            .iter()
            .map(|raw| {
                let value = params::literal("allowed", raw, dtype)?;
                Ok(self.fold(&value).key())
            })
            .collect()
    }

    fn fold(&self, value: &Value) -> Value {
        match value {
            Value::Str(text) if !self.case_sensitive => Value::Str(text.to_lowercase()),
            other => other.clone(),
        }
    }
}

pub struct CheckEnumValues;

impl TypedPrimitive for CheckEnumValues {
    type Params = CheckEnumValuesParams;
    const NAME: &'static str = "check_enum_values";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Report values outside an allowed set. Nulls are not checked. Drift is detected when the invalid share of non-null values exceeds max_invalid_ratio; severity follows that share.",
        )
        .param(ParamSpec::required("column", ParamKind::Column, "Column to check"))
        .param(ParamSpec::required("allowed", ParamKind::Values, "Allowed values"))
        .param(
            ParamSpec::optional("case_sensitive", ParamKind::Boolean, "Compare text exactly")
                .default_value("true"),
        )
        .param(
            ParamSpec::optional("max_invalid_ratio", ParamKind::Number, "Tolerated share of invalid values, 0..1")
                .default_value("0.0"),
        )
        .param(ParamSpec::optional("flag_column", ParamKind::Column, "Boolean column marking invalid rows"))
        .example(
            "Status must be active, paused or closed",
            json!({"column": "status", "allowed": ["active", "paused", "closed"]}),
        )
        .example(
            "Country codes from the supported list, ignoring case",
            json!({"column": "country", "allowed": ["US", "FR", "DE"], "case_sensitive": false, "flag_column": "bad_country"}),
        )
        .example(
            "Ratings 1 to 5, tolerate 1% noise",
            json!({"column": "rating", "allowed": [1, 2, 3, 4, 5], "max_invalid_ratio": 0.01}),
        )
    }

    fn check(&self, params: &CheckEnumValuesParams, table: &Table) -> Result<(), AppError> {
        let column = params::require_column(table, "column", &params.column)?;
        params::require_non_empty("allowed", &params.allowed)?;
        params.allowed_keys(column.dtype())?;
        params::require_range("max_invalid_ratio", params.max_invalid_ratio, 0.0, 1.0)?;
        check_flag_column(table, params.flag_column.as_ref())
    }

    fn apply(&self, table: &Table, params: CheckEnumValuesParams) -> Result<StepOutput, AppError> {
        let column = params::require_column(table, "column", &params.column)?;
        let allowed = params.allowed_keys(column.dtype())?;
        let audit = CellAudit::run(column, |value| allowed.contains(&params.fold(value).key()));
        audit.into_output(
            table,
            Self::NAME,
            &params.column,
            "invalid_value",
            params.max_invalid_ratio,
            params.flag_column.clone(),
        )
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    Email,
    Phone,
    PostalCode,
    Numeric,
    IsoDate,
    Custom,
}

impl FormatKind {
    fn builtin_pattern(self) -> Option<&'static str> {
        match self {
            FormatKind::Email => Some(r"^[^\s@]+@[^\s@]+\.[^\s@]+$"),
            FormatKind::Phone => Some(r"^\+?[0-9][0-9 ().-]{5,}[0-9]$"),
            FormatKind::PostalCode => Some(r"^[A-Za-z0-9][A-Za-z0-9 -]{1,8}[A-Za-z0-9]$"),
            FormatKind::Numeric => Some(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$"),
            FormatKind::IsoDate => Some(r"^\d{4}-\d{2}-\d{2}([T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?)?$"),
            FormatKind::Custom => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidateFormatParams {
    column: String,
    format: FormatKind,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    max_invalid_ratio: f64,
    #[serde(default)]
    flag_column: Option<String>,
}

impl ValidateFormatParams {
    fn regex(&self) -> Result<Regex, AppError> {
        let pattern = match (self.format, &self.pattern) {
            (FormatKind::Custom, Some(pattern)) => pattern.as_str(),
            (FormatKind::Custom, None) => {
                return Err(AppError::parameter("pattern", "required when format is custom"));
            }
            (_, Some(_)) => {
                return Err(AppError::parameter("pattern", "only allowed when format is custom"));
            }
            (kind, None) => kind.builtin_pattern().unwrap_or_default(),
        };
        Regex::new(pattern).map_err(|e| AppError::parameter("pattern", e.to_string()))
    }
}

pub struct ValidateFormat;

impl TypedPrimitive for ValidateFormat {
    type Params = ValidateFormatParams;
    const NAME: &'static str = "validate_format";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Report text values that do not match a format. Built-in formats: email, phone, postal_code, numeric, iso_date (must also be a real calendar date); custom takes a regex. Nulls are not checked.",
        )
        .param(ParamSpec::required("column", ParamKind::Column, "Text column to check"))
        .param(ParamSpec::required(
            "format",
            ParamKind::Choice(vec!["email", "phone", "postal_code", "numeric", "iso_date", "custom"]),
            "Expected format",
        ))
        .param(ParamSpec::optional("pattern", ParamKind::String, "Regex for the custom format"))
        .param(
            ParamSpec::optional("max_invalid_ratio", ParamKind::Number, "Tolerated share of invalid values, 0..1")
                .default_value("0.0"),
        )
        .param(ParamSpec::optional("flag_column", ParamKind::Column, "Boolean column marking invalid rows"))
        .example("Check customer emails", json!({"column": "email", "format": "email"}))
        .example(
            "Phone numbers, mark the bad ones",
            json!({"column": "phone", "format": "phone", "flag_column": "bad_phone"}),
        )
        .example(
            "SKUs look like ABC-1234",
            json!({"column": "sku", "format": "custom", "pattern": "^[A-Z]{3}-\\d{4}$"}),
        )
        .example(
            "Order dates are ISO dates, allow 5% bad rows",
            json!({"column": "order_date", "format": "iso_date", "max_invalid_ratio": 0.05}),
        )
    }

    fn check(&self, params: &ValidateFormatParams, table: &Table) -> Result<(), AppError> {
        params::require_string(table, "column", &params.column)?;
        params.regex()?;
        params::require_range("max_invalid_ratio", params.max_invalid_ratio, 0.0, 1.0)?;
        check_flag_column(table, params.flag_column.as_ref())
    }

    fn apply(&self, table: &Table, params: ValidateFormatParams) -> Result<StepOutput, AppError> {
        let column = params::require_column(table, "column", &params.column)?;
        let regex = params.regex()?;
        let iso = params.format == FormatKind::IsoDate;
        let audit = CellAudit::run(column, |value| {
            let text = value.as_str().unwrap_or_default();
            regex.is_match(text) && (!iso || parse_iso_datetime(text).is_some())
        });
        audit.into_output(
            table,
            Self::NAME,
            &params.column,
            "invalid_format",
            params.max_invalid_ratio,
            params.flag_column.clone(),
        )
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Baseline {
    #[serde(default)]
    mean: Option<f64>,
    #[serde(default)]
    std: Option<f64>,
    #[serde(default)]
    null_rate: Option<f64>,
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectDistributionDriftParams {
    column: String,
    baseline: Baseline,
    threshold: f64,
}

pub struct DetectDistributionDrift;

impl TypedPrimitive for DetectDistributionDrift {
    type Params = DetectDistributionDriftParams;
    const NAME: &'static str = "detect_distribution_drift";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Compare a numeric column with baseline statistics. Metrics: mean_shift (|mean change| / baseline std, or relative change without std), null_rate_shift (absolute), range_violation (share of values outside baseline min..max). Drift when any metric exceeds the threshold; severity uses the largest metric with the ratio bands.",
        )
        .param(ParamSpec::required("column", ParamKind::Column, "Numeric column"))
        .param(ParamSpec::required(
            "baseline",
            ParamKind::Object,
            "Reference statistics: any of mean, std, null_rate, min, max",
        ))
        .param(ParamSpec::required("threshold", ParamKind::Number, "Largest acceptable metric value"))
        .example(
            "Has the average order value moved more than half a std?",
            json!({"column": "order_value", "baseline": {"mean": 52.0, "std": 12.5}, "threshold": 0.5}),
        )
        .example(
            "Watch the share of missing ages",
            json!({"column": "age", "baseline": {"null_rate": 0.02}, "threshold": 0.05}),
        )
        .example(
            "Temperatures outside the historical range",
            json!({"column": "temp", "baseline": {"min": -20, "max": 45}, "threshold": 0.01}),
        )
    }

    fn check(&self, params: &DetectDistributionDriftParams, table: &Table) -> Result<(), AppError> {
        params::require_numeric(table, "column", &params.column)?;
        let b = &params.baseline;
        if [b.mean, b.std, b.null_rate, b.min, b.max].iter().all(Option::is_none) {
            return Err(AppError::parameter("baseline", "needs at least one statistic"));
        }
        if b.std.is_some_and(|s| s < 0.0) {
            return Err(AppError::parameter("baseline", "std cannot be negative"));
        }
        if let Some(rate) = b.null_rate {
            params::require_range("baseline", rate, 0.0, 1.0)?;
        }
        if let (Some(min), Some(max)) = (b.min, b.max) {
            if min > max {
                return Err(AppError::parameter("baseline", "min is above max"));
            }
        }
        if !params.threshold.is_finite() || params.threshold < 0.0 {
            return Err(AppError::parameter("threshold", "must be a non-negative number"));
        }
        Ok(())
    }

    fn apply(&self, table: &Table, params: DetectDistributionDriftParams) -> Result<StepOutput, AppError> {
        let column = params::require_column(table, "column", &params.column)?;
        let numbers: Vec<f64> = column.values().iter().filter_map(Value::as_f64).collect();
        let rows = column.len();
        let baseline = &params.baseline;

        let mut statistics = BTreeMap::new();
        let mut metrics: Vec<(&str, f64)> = Vec::new();
        let current_mean = super::types::mean(&numbers);
        if let Some(mean) = current_mean {
            statistics.insert("current_mean".to_string(), mean);
        }
        let null_rate = if rows == 0 {
            0.0
        } else {
            (rows - numbers.len()) as f64 / rows as f64
        };
        statistics.insert("current_null_rate".to_string(), null_rate);

        if let (Some(expected), Some(current)) = (baseline.mean, current_mean) {
            let delta = (current - expected).abs();
            let shift = match baseline.std {
                Some(std) if std > 0.0 => delta / std,
                _ if expected != 0.0 => delta / expected.abs(),
                _ => delta,
            };
            metrics.push(("mean_shift", shift));
        }
        if let Some(expected) = baseline.null_rate {
            metrics.push(("null_rate_shift", (null_rate - expected).abs()));
        }
        if (baseline.min.is_some() || baseline.max.is_some()) && !numbers.is_empty() {
            let outside = numbers
                .iter()
                .filter(|v| baseline.min.is_some_and(|m| **v < m) || baseline.max.is_some_and(|m| **v > m))
                .count();
            metrics.push(("range_violation", outside as f64 / numbers.len() as f64));
        }

        let mut issues = Vec::new();
        let mut worst = 0f64;
        for (name, value) in &metrics {
            statistics.insert(name.to_string(), *value);
            if *value > params.threshold {
                worst = worst.max(*value);
                issues.push(QualityIssue::new(
                    *name,
                    Some(params.column.as_str()),
                    format!("{} {:.4} exceeds threshold {}", name, value, params.threshold),
                ));
            }
        }
        let detected = !issues.is_empty();
        let mut quality = report(Self::NAME, Severity::from_ratio(detected, worst));
        quality.issues = issues;
        quality.statistics = statistics;
        Ok(StepOutput::new(table.clone(), StepMetadata::Quality(quality)))
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileColumnsParams {
    #[serde(default)]
    columns: Option<OneOrMany>,
}

pub struct ProfileColumns;

impl TypedPrimitive for ProfileColumns {
    type Params = ProfileColumnsParams;
    const NAME: &'static str = "profile_columns";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Summarize columns without changing them: null and distinct counts for every column, min, max and mean for numeric ones. Statistics are keyed \"<column>.<stat>\".",
        )
        .param(
            ParamSpec::optional("columns", ParamKind::Columns, "Columns to profile")
                .default_value("all columns"),
        )
        .example("Profile the whole table", json!({}))
        .example("How complete are email and phone?", json!({"columns": ["email", "phone"]}))
        .example("Range and mean of the price column", json!({"columns": "price"}))
    }

    fn check(&self, params: &ProfileColumnsParams, table: &Table) -> Result<(), AppError> {
        if let Some(columns) = &params.columns {
            let columns = columns.clone().into_vec();
            params::require_non_empty("columns", &columns)?;
            params::require_columns(table, "columns", &columns)?;
        }
        Ok(())
    }

    fn apply(&self, table: &Table, params: ProfileColumnsParams) -> Result<StepOutput, AppError> {
        let names: Vec<String> = match params.columns {
            Some(columns) => columns.into_vec(),
            None => table.column_names().into_iter().map(str::to_string).collect(),
        };
        let mut quality = report(Self::NAME, Severity::None);
        quality.statistics.insert("rows".into(), table.row_count() as f64);
        for name in &names {
            let column = params::require_column(table, "columns", name)?;
            let distinct: IndexSet<ValueKey> = column
                .values()
                .iter()
                .filter(|v| !v.is_null())
                .map(Value::key)
                .collect();
            let stats = &mut quality.statistics;
            stats.insert(format!("{}.null_count", name), column.null_count() as f64);
            stats.insert(format!("{}.distinct_count", name), distinct.len() as f64);
            if column.dtype().is_numeric() {
                let numbers: Vec<f64> = column.values().iter().filter_map(Value::as_f64).collect();
                if let Some(mean) = super::types::mean(&numbers) {
                    let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
                    let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    stats.insert(format!("{}.min", name), min);
                    stats.insert(format!("{}.max", name), max);
                    stats.insert(format!("{}.mean", name), mean);
                }
            }
            if column.null_count() == column.len() && !column.is_empty() {
                quality.issues.push(QualityIssue::new(
                    "all_null",
                    Some(name.as_str()),
                    format!("column '{}' has no values", name),
                ));
            }
        }
        Ok(StepOutput::new(table.clone(), StepMetadata::Quality(quality)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::primitives::testing::{fail, run, table};
    use crate::core::types::ErrorCategory;

    fn quality(output: &StepOutput) -> &QualityReport {
        match &output.metadata {
            StepMetadata::Quality(report) => report,
            other => panic!("unexpected metadata {:?}", other),
        }
    }

    fn customers() -> Table {
        table(json!([
            {"id": 1, "email": "ann@example.com", "status": "active", "age": 30},
            {"id": 2, "email": "not-an-email", "status": "Active", "age": null},
            {"id": 3, "email": null, "status": "closed", "age": 50},
            {"id": 4, "email": "bo@example.org", "status": "gone", "age": 40}
        ]))
    }

    #[test]
    fn test_schema_drift_missing_column_is_high() {
        let input = customers();
        let out = run(
            DetectSchemaDrift,
            &input,
            json!({"expected_columns": ["id", "phone"], "expected_types": {"age": "string"}}),
        );
        let report = quality(&out);
        assert!(report.drift_detected);
        assert_eq!(report.severity, Severity::High);
        assert_eq!(report.issues.len(), 2);
        assert_eq!(out.table, input);
    }

    #[test]
    fn test_schema_drift_extra_columns() {
        let allowed = run(DetectSchemaDrift, &customers(), json!({"expected_columns": ["id"]}));
        assert_eq!(quality(&allowed).severity, Severity::None);
        let strict = run(
            DetectSchemaDrift,
            &customers(),
            json!({"expected_columns": ["id"], "allow_extra": false}),
        );
        assert_eq!(quality(&strict).severity, Severity::Low);
        assert_eq!(quality(&strict).statistics["unexpected_columns"], 3.0);
    }

    #[test]
    fn test_enum_values_case_and_flag() {
        let out = run(
            CheckEnumValues,
            &customers(),
            json!({"column": "status", "allowed": ["active", "closed"], "flag_column": "bad_status"}),
        );
        let report = quality(&out);
        assert_eq!(report.statistics["invalid"], 2.0);
        assert_eq!(report.severity, Severity::High);
        assert_eq!(report.flag_column.as_deref(), Some("bad_status"));
        assert_eq!(out.table.cell("bad_status", 1), Some(&Value::Bool(true)));

        let folded = run(
            CheckEnumValues,
            &customers(),
            json!({"column": "status", "allowed": ["active", "closed"], "case_sensitive": false, "max_invalid_ratio": 0.25}),
        );
        assert!(!quality(&folded).drift_detected);
        assert_eq!(folded.table, customers());
    }

    #[test]
    fn test_validate_email_skips_nulls() {
        let out = run(ValidateFormat, &customers(), json!({"column": "email", "format": "email"}));
        let report = quality(&out);
        assert_eq!(report.statistics["checked"], 3.0);
        assert_eq!(report.statistics["invalid"], 1.0);
        assert_eq!(report.issues[0].count, Some(1));
    }

    #[test]
    fn test_validate_custom_requires_pattern() {
        let err = fail(ValidateFormat, &customers(), json!({"column": "email", "format": "custom"}));
        assert_eq!(err.category, ErrorCategory::ParameterError);
        let err = fail(ValidateFormat, &customers(), json!({"column": "age", "format": "numeric"}));
        assert_eq!(err.category, ErrorCategory::ParameterError);
    }

    #[test]
    fn test_iso_date_rejects_impossible_dates() {
        let input = table(json!([{"d": "2024-02-30"}, {"d": "2024-02-28"}]));
        let out = run(ValidateFormat, &input, json!({"column": "d", "format": "iso_date"}));
        assert_eq!(quality(&out).statistics["invalid"], 1.0);
    }

    #[test]
    fn test_distribution_drift_mean_shift() {
        let out = run(
            DetectDistributionDrift,
            &customers(),
            json!({"column": "age", "baseline": {"mean": 30.0, "std": 5.0, "null_rate": 0.25}, "threshold": 1.0}),
        );
        let report = quality(&out);
        assert_eq!(report.statistics["mean_shift"], 2.0);
        assert_eq!(report.statistics["null_rate_shift"], 0.0);
        assert!(report.drift_detected);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.severity, Severity::High);
    }

    #[test]
    fn test_distribution_within_threshold() {
        let out = run(
            DetectDistributionDrift,
            &customers(),
            json!({"column": "age", "baseline": {"min": 0, "max": 120}, "threshold": 0.0}),
        );
        assert!(!quality(&out).drift_detected);
        assert_eq!(quality(&out).severity, Severity::None);
    }

    #[test]
    fn test_profile_columns() {
        let out = run(ProfileColumns, &customers(), json!({}));
        let stats = &quality(&out).statistics;
        assert_eq!(stats["age.null_count"], 1.0);
        assert_eq!(stats["age.mean"], 40.0);
        assert_eq!(stats["status.distinct_count"], 4.0);
        assert_eq!(out.table, customers());
    }
}
