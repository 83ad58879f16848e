use super::{build_column, count_new_nulls, finite, put_column};
use crate::core::error::AppError;
use crate::core::pipeline::metadata::{ConversionFacts, StepMetadata, ValueFacts};
use crate::core::pipeline::params::{self, OnError};
use crate::core::pipeline::primitive::{
    ParamKind, ParamSpec, PrimitiveDefinition, StepOutput, TypedPrimitive,
};
use crate::core::table::{DataType, Table, Value, ValueKey};
use crate::core::types::PrimitiveCategory;
use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::fmt::Write as _;

const CATEGORY: PrimitiveCategory = PrimitiveCategory::TypeCoercion;

/// Failure to convert one cell; carries row and value context.
pub(crate) fn conversion_error(column: &str, row: usize, value: &Value, target: &str) -> AppError {
    AppError::execution(format!(
        "row {}: value '{}' in column '{}' cannot be converted to {}",
        row, value, column, target
    ))
    .with_row(row)
    .with_context("column", column)
    .with_context("value", value.to_string())
}

fn conversion_output(
    table: &Table,
    column: &str,
    to_type: DataType,
    values: Vec<Value>,
) -> Result<StepOutput, AppError> {
    let source = params::require_column(table, "column", column)?;
    let facts = ConversionFacts {
        column: column.to_string(),
        from_type: source.dtype(),
        to_type,
        values_converted: values.iter().filter(|v| !v.is_null()).count(),
        nulls_introduced: count_new_nulls(source.values(), &values),
    };
    let rebuilt = build_column(column, to_type, values)?;
    let output = put_column(table, column, rebuilt)?;
    Ok(StepOutput::new(output, StepMetadata::Conversion(facts)))
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangeColumnTypeParams {
    column: String,
    to_type: String,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    on_error: OnError,
}

impl ChangeColumnTypeParams {
    fn target(&self) -> Result<DataType, AppError> {
        let dtype: DataType = self
            .to_type
            .parse()
            .map_err(|reason: String| AppError::parameter("to_type", reason))?;
        if dtype == DataType::Null {
            return Err(AppError::parameter("to_type", "cannot convert a column to null"));
        }
        Ok(dtype)
    }
}

fn convert_cell(value: &Value, target: DataType, format: Option<&str>) -> Option<Value> {
    match (value, target) {
        (Value::Null, _) => Some(Value::Null),
        (Value::DateTime(dt), DataType::String) => match format {
            Some(fmt) => format_datetime(dt, fmt).map(Value::Str),
            None => Some(Value::Str(value.to_string())),
        },
        (Value::Str(text), DataType::Datetime) => match format {
            Some(fmt) => parse_with_format(text.trim(), fmt).map(Value::DateTime),
            None => value.coerce_to(target).ok(),
        },
        (Value::Bool(flag), DataType::Integer) => Some(Value::Int(i64::from(*flag))),
        (Value::Bool(flag), DataType::Float) => Some(Value::Float(if *flag { 1.0 } else { 0.0 })),
        (Value::Int(n), DataType::Boolean) => match n {
            0 => Some(Value::Bool(false)),
            1 => Some(Value::Bool(true)),
            _ => None,
        },
        _ => value.coerce_to(target).ok(),
    }
}

/// Reject strftime strings chrono cannot render.
pub(crate) fn validate_format(key: &str, format: &str) -> Result<(), AppError> {
    if format.is_empty() {
        return Err(AppError::parameter(key, "format must not be empty"));
    }
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(AppError::parameter(
            key,
            format!("'{}' is not a valid strftime format", format),
        ));
    }
    Ok(())
}

pub(crate) fn format_datetime(value: &NaiveDateTime, format: &str) -> Option<String> {
    let mut out = String::new();
    write!(out, "{}", value.format(format)).ok()?;
    Some(out)
}

/// Parse with an explicit chrono format; date-only formats yield midnight.
pub(crate) fn parse_with_format(text: &str, format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, format).ok().or_else(|| {
        NaiveDate::parse_from_str(text, format)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    })
}

pub struct ChangeColumnType;

impl TypedPrimitive for ChangeColumnType {
    type Params = ChangeColumnTypeParams;
    const NAME: &'static str = "change_column_type";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Convert a column to another type. Stops at the first value that cannot be converted unless on_error is null.",
        )
        .param(ParamSpec::required("column", ParamKind::Column, "Column to convert"))
        .param(ParamSpec::required(
            "to_type",
            ParamKind::Choice(vec!["string", "integer", "float", "boolean", "datetime"]),
            "Target type",
        ))
        .param(ParamSpec::optional(
            "format",
            ParamKind::String,
            "strftime format used for datetime parsing or formatting",
        ))
        .param(
            ParamSpec::optional(
                "on_error",
                ParamKind::Choice(vec!["fail", "null"]),
                "What to do with values that cannot be converted",
            )
            .default_value("fail"),
        )
        .example(
            "Make the quantity column an integer",
            json!({"column": "quantity", "to_type": "integer"}),
        )
        .example(
            "Convert price to a decimal number and blank out anything invalid",
            json!({"column": "price", "to_type": "float", "on_error": "null"}),
        )
        .example(
            "Treat order_date as a date in day/month/year format",
            json!({"column": "order_date", "to_type": "datetime", "format": "%d/%m/%Y"}),
        )
        .example("Turn zip codes into text", json!({"column": "zip", "to_type": "string"}))
    }

    fn check(&self, params: &ChangeColumnTypeParams, table: &Table) -> Result<(), AppError> {
        params::require_column(table, "column", &params.column)?;
        if let Some(format) = &params.format {
            validate_format("format", format)?;
        }
        params.target().map(|_| ())
    }

    fn apply(&self, table: &Table, params: ChangeColumnTypeParams) -> Result<StepOutput, AppError> {
        let target = params.target()?;
        let source = params::require_column(table, "column", &params.column)?;
        let mut values = Vec::with_capacity(source.len());
        for (row, value) in source.values().iter().enumerate() {
            match convert_cell(value, target, params.format.as_deref()) {
                Some(converted) => values.push(converted),
                None => match params.on_error {
                    OnError::Fail => {
                        return Err(conversion_error(&params.column, row, value, target.as_str()))
                    }
                    OnError::Null => values.push(Value::Null),
                },
            }
        }
        conversion_output(table, &params.column, target, values)
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillStrategy {
    Value,
    Mean,
    Median,
    Mode,
    Forward,
    Backward,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FillMissingParams {
    column: String,
    strategy: FillStrategy,
    #[serde(default)]
    value: Option<JsonValue>,
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub(crate) fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some(sorted[mid - 1] / 2.0 + sorted[mid] / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Most frequent non-null value; ties go to the smallest value.
pub(crate) fn mode(values: &[Value]) -> Option<Value> {
    let mut counts: HashMap<ValueKey, (usize, &Value)> = HashMap::new();
    for value in values.iter().filter(|v| !v.is_null()) {
        counts.entry(value.key()).or_insert((0, value)).0 += 1;
    }
    counts
        .into_values()
        .max_by(|(count_a, a), (count_b, b)| count_a.cmp(count_b).then_with(|| b.total_cmp(a)))
        .map(|(_, value)| value.clone())
}

pub struct FillMissing;

impl TypedPrimitive for FillMissing {
    type Params = FillMissingParams;
    const NAME: &'static str = "fill_missing";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Fill null cells with a constant, a column statistic, or the neighbouring value. Mean and median turn integer columns into floats.",
        )
        .param(ParamSpec::required("column", ParamKind::Column, "Column to fill"))
        .param(ParamSpec::required(
            "strategy",
            ParamKind::Choice(vec!["value", "mean", "median", "mode", "forward", "backward"]),
            "How replacement values are chosen",
        ))
        .param(ParamSpec::optional(
            "value",
            ParamKind::Value,
            "Replacement value; required when strategy is value",
        ))
        .example(
            "Fill blank regions with 'Unknown'",
            json!({"column": "region", "strategy": "value", "value": "Unknown"}),
        )
        .example(
            "Replace missing ages with the average age",
            json!({"column": "age", "strategy": "mean"}),
        )
        .example(
            "Carry the last known price forward",
            json!({"column": "price", "strategy": "forward"}),
        )
        .example(
            "Use the most common category where it is missing",
            json!({"column": "category", "strategy": "mode"}),
        )
    }

    fn check(&self, params: &FillMissingParams, table: &Table) -> Result<(), AppError> {
        let column = params::require_column(table, "column", &params.column)?;
        match (params.strategy, &params.value) {
            (FillStrategy::Value, None) => {
                return Err(AppError::parameter("value", "is required when strategy is value"))
            }
            (FillStrategy::Value, Some(raw)) => {
                if params::literal("value", raw, column.dtype())?.is_null() {
                    return Err(AppError::parameter("value", "must not be null"));
                }
            }
            (_, Some(_)) => {
                return Err(AppError::parameter(
                    "value",
                    "is only used when strategy is value",
                ))
            }
            (_, None) => {}
        }
        if matches!(params.strategy, FillStrategy::Mean | FillStrategy::Median) {
            params::require_numeric(table, "column", &params.column)?;
        }
        Ok(())
    }

    fn apply(&self, table: &Table, params: FillMissingParams) -> Result<StepOutput, AppError> {
        let source = params::require_column(table, "column", &params.column)?;
        let numbers: Vec<f64> = source.values().iter().filter_map(Value::as_f64).collect();
        let no_values = || {
            AppError::execution(format!(
                "column '{}' has no non-null values to compute a fill value from",
                params.column
            ))
            .with_context("column", params.column.as_str())
        };
        let mut dtype = source.dtype();
        let filled: Vec<Value> = match params.strategy {
            FillStrategy::Value => {
                let raw = params
                    .value
                    .as_ref()
                    .ok_or_else(|| AppError::parameter("value", "is required when strategy is value"))?;
                let fill = params::literal("value", raw, dtype)?;
                if dtype == DataType::Null {
                    dtype = fill.dtype();
                }
                fill_constant(source.values(), &fill)
            }
            FillStrategy::Mean | FillStrategy::Median => {
                let stat = if params.strategy == FillStrategy::Mean {
                    mean(&numbers)
                } else {
                    median(&numbers)
                }
                .ok_or_else(no_values)?;
                let fill = finite(stat).map_err(|reason| {
                    AppError::execution(format!(
                        "fill value for column '{}' failed: {}",
                        params.column, reason
                    ))
                    .with_context("column", params.column.as_str())
                })?;
                dtype = DataType::Float;
                fill_constant(source.values(), &fill)
            }
            FillStrategy::Mode => {
                let fill = mode(source.values()).ok_or_else(no_values)?;
                fill_constant(source.values(), &fill)
            }
            FillStrategy::Forward => carry(source.values().iter()),
            FillStrategy::Backward => {
                let mut values = carry(source.values().iter().rev());
                values.reverse();
                values
            }
        };
        let mut facts = ValueFacts::default();
        let filled_count = source
            .values()
            .iter()
            .zip(&filled)
            .filter(|(before, after)| before.is_null() && !after.is_null())
            .count();
        facts.record(&params.column, filled_count);
        let rebuilt = build_column(&params.column, dtype, filled)?;
        let output = put_column(table, &params.column, rebuilt)?;
        Ok(StepOutput::new(output, StepMetadata::Values(facts)))
    }
}

fn fill_constant(values: &[Value], fill: &Value) -> Vec<Value> {
    values
        .iter()
        .map(|v| if v.is_null() { fill.clone() } else { v.clone() })
        .collect()
}

fn carry<'a, I: Iterator<Item = &'a Value>>(values: I) -> Vec<Value> {
    let mut last = Value::Null;
    values
        .map(|value| {
            if value.is_null() {
                last.clone()
            } else {
                last = value.clone();
                value.clone()
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------

fn default_strip() -> String {
    "$,% ".to_string()
}

fn default_decimal() -> String {
    ".".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParseNumericParams {
    column: String,
    #[serde(default = "default_strip")]
    strip: String,
    #[serde(default = "default_decimal")]
    decimal: String,
}

impl ParseNumericParams {
    fn decimal_char(&self) -> Result<char, AppError> {
        let mut chars = self.decimal.chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) => {
                if self.strip.contains(ch) {
                    Err(AppError::parameter(
                        "decimal",
                        format!("'{}' is also listed in strip; remove it from strip", ch),
                    ))
                } else {
                    Ok(ch)
                }
            }
            _ => Err(AppError::parameter("decimal", "must be a single character")),
        }
    }
}

pub struct ParseNumeric;

impl TypedPrimitive for ParseNumeric {
    type Params = ParseNumericParams;
    const NAME: &'static str = "parse_numeric";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Turn formatted numbers such as \"$1,234.50\" or \"12 %\" into floats. Cells that are empty after stripping become null.",
        )
        .param(ParamSpec::required("column", ParamKind::Column, "Text column"))
        .param(
            ParamSpec::optional("strip", ParamKind::String, "Characters removed before parsing")
                .default_value("\"$,% \""),
        )
        .param(
            ParamSpec::optional("decimal", ParamKind::String, "Decimal separator")
                .default_value("\".\""),
        )
        .example("Convert the revenue strings like $1,200 to numbers", json!({"column": "revenue"}))
        .example(
            "Parse European prices that use a comma for decimals",
            json!({"column": "price_eur", "strip": "€. ", "decimal": ","}),
        )
        .example(
            "Read the discount percentages as numbers",
            json!({"column": "discount", "strip": "% "}),
        )
    }

    fn check(&self, params: &ParseNumericParams, table: &Table) -> Result<(), AppError> {
        params::require_string(table, "column", &params.column)?;
        params.decimal_char().map(|_| ())
    }

    fn apply(&self, table: &Table, params: ParseNumericParams) -> Result<StepOutput, AppError> {
        let decimal = params.decimal_char()?;
        let source = params::require_column(table, "column", &params.column)?;
        let mut values = Vec::with_capacity(source.len());
        for (row, value) in source.values().iter().enumerate() {
            let Some(text) = value.as_str() else {
                values.push(Value::Null);
                continue;
            };
            let cleaned: String = text
                .chars()
                .filter(|ch| !params.strip.contains(*ch))
                .map(|ch| if ch == decimal { '.' } else { ch })
                .collect();
            let cleaned = cleaned.trim();
            if cleaned.is_empty() {
                values.push(Value::Null);
                continue;
            }
            match cleaned.parse::<f64>() {
                Ok(number) if number.is_finite() => values.push(Value::Float(number)),
                _ => return Err(conversion_error(&params.column, row, value, "float")),
            }
        }
        conversion_output(table, &params.column, DataType::Float, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::primitives::testing::{fail, records, run, table};
    use crate::core::types::ErrorCategory;

    #[test]
    fn test_change_type_strict_names_row() {
        let input = table(json!([{"qty": "1"}, {"qty": "two"}]));
        let err = fail(ChangeColumnType, &input, json!({"column": "qty", "to_type": "integer"}));
        assert_eq!(err.category, ErrorCategory::ExecutionError);
        assert_eq!(err.context.get("row"), Some(&"1".to_string()));
        assert!(err.message.contains("two"));
    }

    #[test]
    fn test_change_type_lenient_nulls() {
        let input = table(json!([{"qty": "1"}, {"qty": "two"}]));
        let out = run(
            ChangeColumnType,
            &input,
            json!({"column": "qty", "to_type": "int", "on_error": "null"}),
        );
        assert_eq!(records(&out.table), json!([{"qty": 1}, {"qty": null}]));
        match out.metadata {
            StepMetadata::Conversion(facts) => {
                assert_eq!(facts.nulls_introduced, 1);
                assert_eq!(facts.from_type, DataType::String);
                assert_eq!(facts.to_type, DataType::Integer);
            }
            other => panic!("unexpected metadata {:?}", other),
        }
    }

    #[test]
    fn test_change_type_float_out_of_integer_range() {
        let input = table(json!([{"x": 1.0}, {"x": 1e20}]));
        let err = fail(ChangeColumnType, &input, json!({"column": "x", "to_type": "integer"}));
        assert_eq!(err.category, ErrorCategory::ExecutionError);
        assert_eq!(err.context.get("row"), Some(&"1".to_string()));

        let out = run(
            ChangeColumnType,
            &input,
            json!({"column": "x", "to_type": "integer", "on_error": "null"}),
        );
        assert_eq!(records(&out.table), json!([{"x": 1}, {"x": null}]));
    }

    #[test]
    fn test_fill_mean_overflow_is_execution_error() {
        let input = table(json!([{"x": 1.7e308}, {"x": 1.7e308}, {"x": null}]));
        let err = fail(FillMissing, &input, json!({"column": "x", "strategy": "mean"}));
        assert_eq!(err.category, ErrorCategory::ExecutionError);
    }

    #[test]
    fn test_change_type_with_date_format() {
        let input = table(json!([{"d": "31/01/2024"}]));
        let out = run(
            ChangeColumnType,
            &input,
            json!({"column": "d", "to_type": "datetime", "format": "%d/%m/%Y"}),
        );
        assert_eq!(records(&out.table)[0]["d"], json!("2024-01-31T00:00:00"));
    }

    #[test]
    fn test_fill_mean_makes_float() {
        let input = table(json!([{"age": 10}, {"age": null}, {"age": 21}]));
        let out = run(FillMissing, &input, json!({"column": "age", "strategy": "mean"}));
        assert_eq!(out.table.column("age").unwrap().dtype(), DataType::Float);
        assert_eq!(out.table.cell("age", 1), Some(&Value::Float(15.5)));
    }

    #[test]
    fn test_fill_mode_tie_takes_smallest() {
        let input = table(json!([{"c": "b"}, {"c": "a"}, {"c": null}, {"c": "b"}, {"c": "a"}]));
        let out = run(FillMissing, &input, json!({"column": "c", "strategy": "mode"}));
        assert_eq!(out.table.cell("c", 2), Some(&Value::str("a")));
    }

    #[test]
    fn test_fill_forward_and_backward() {
        let input = table(json!([{"p": null}, {"p": 1}, {"p": null}, {"p": 3}, {"p": null}]));
        let forward = run(FillMissing, &input, json!({"column": "p", "strategy": "forward"}));
        assert_eq!(
            records(&forward.table),
            json!([{"p": null}, {"p": 1}, {"p": 1}, {"p": 3}, {"p": 3}])
        );
        let backward = run(FillMissing, &input, json!({"column": "p", "strategy": "backward"}));
        assert_eq!(
            records(&backward.table),
            json!([{"p": 1}, {"p": 1}, {"p": 3}, {"p": 3}, {"p": null}])
        );
    }

    #[test]
    fn test_fill_value_requires_value() {
        let input = table(json!([{"p": null}]));
        let err = fail(FillMissing, &input, json!({"column": "p", "strategy": "value"}));
        assert_eq!(err.context.get("parameter"), Some(&"value".to_string()));
    }

    #[test]
    fn test_parse_numeric_currency() {
        let input = table(json!([{"r": "$1,234.50"}, {"r": " "}, {"r": "-3"}]));
        let out = run(ParseNumeric, &input, json!({"column": "r"}));
        assert_eq!(records(&out.table), json!([{"r": 1234.5}, {"r": null}, {"r": -3.0}]));
    }

    #[test]
    fn test_parse_numeric_comma_decimal() {
        let input = table(json!([{"r": "1.234,5"}]));
        let out = run(ParseNumeric, &input, json!({"column": "r", "strip": ". ", "decimal": ","}));
        assert_eq!(out.table.cell("r", 0), Some(&Value::Float(1234.5)));
    }

    #[test]
    fn test_parse_numeric_garbage_is_execution_error() {
        let input = table(json!([{"r": "abc"}]));
        let err = fail(ParseNumeric, &input, json!({"column": "r"}));
        assert_eq!(err.category, ErrorCategory::ExecutionError);
    }
}
