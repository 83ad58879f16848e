use super::{build_column, count_changes, finite, put_column};
use crate::core::error::AppError;
use crate::core::pipeline::metadata::{DerivedFacts, StepMetadata, ValueFacts};
use crate::core::pipeline::params::{self, OneOrMany};
use crate::core::pipeline::primitive::{
    ParamKind, ParamSpec, PrimitiveDefinition, StepOutput, TypedPrimitive,
};
use crate::core::table::{whole_to_i64, DataType, Table, Value};
use crate::core::types::PrimitiveCategory;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

const CATEGORY: PrimitiveCategory = PrimitiveCategory::NumericWindow;

/// Sample standard deviation (n - 1); `None` with fewer than two values.
pub(crate) fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

fn round_half_away(value: f64, decimals: i32) -> f64 {
    if decimals < 0 {
        let factor = 10f64.powi(-decimals);
        return (value / factor).round() * factor;
    }
    let scaled = value * 10f64.powi(decimals);
    if !scaled.is_finite() {
        // Magnitudes this large carry no fractional digits.
        return value;
    }
    scaled.round() / 10f64.powi(decimals)
}

/// Round an integer to a negative number of decimals in the integer domain.
fn round_int_half_away(value: i64, decimals: i32) -> Option<i64> {
    if decimals >= 0 {
        return Some(value);
    }
    let factor = 10i64.checked_pow(decimals.unsigned_abs())?;
    let remainder = value % factor;
    let base = value - remainder;
    if remainder.abs() * 2 >= factor {
        base.checked_add(factor * remainder.signum())
    } else {
        Some(base)
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoundNumbersParams {
    columns: OneOrMany,
    #[serde(default)]
    decimals: i32,
}

pub struct RoundNumbers;

impl TypedPrimitive for RoundNumbers {
    type Params = RoundNumbersParams;
    const NAME: &'static str = "round_numbers";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Round numeric columns to a number of decimals, halves away from zero. Negative decimals round to tens, hundreds and so on.",
        )
        .param(ParamSpec::required("columns", ParamKind::Columns, "Numeric column or columns"))
        .param(
            ParamSpec::optional("decimals", ParamKind::Integer, "Digits after the decimal point")
                .default_value("0"),
        )
        .example("Round prices to cents", json!({"columns": ["price"], "decimals": 2}))
        .example("Round the score to a whole number", json!({"columns": "score"}))
        .example(
            "Round revenue and cost to the nearest thousand",
            json!({"columns": ["revenue", "cost"], "decimals": -3}),
        )
    }

    fn check(&self, params: &RoundNumbersParams, table: &Table) -> Result<(), AppError> {
        let columns = params.columns.clone().into_vec();
        params::require_non_empty("columns", &columns)?;
        for column in &columns {
            params::require_numeric(table, "columns", column)?;
        }
        params::require_range("decimals", f64::from(params.decimals), -15.0, 15.0)
    }

    fn apply(&self, table: &Table, params: RoundNumbersParams) -> Result<StepOutput, AppError> {
        let mut output = table.clone();
        let mut facts = ValueFacts::default();
        for column in params.columns.into_vec() {
            let source = params::require_column(table, "columns", &column)?;
            let mut values = Vec::with_capacity(source.len());
            for (row, value) in source.values().iter().enumerate() {
                let fail = |reason: String| {
                    AppError::execution(format!(
                        "row {}: rounding {} to {} decimals failed: {}",
                        row, value, params.decimals, reason
                    ))
                    .with_row(row)
                    .with_context("column", column.as_str())
                };
                let rounded = match value {
                    Value::Float(v) => {
                        finite(round_half_away(*v, params.decimals)).map_err(fail)?
                    }
                    Value::Int(v) => round_int_half_away(*v, params.decimals)
                        .map(Value::Int)
                        .ok_or_else(|| fail("result does not fit an integer column".to_string()))?,
                    other => other.clone(),
                };
                values.push(rounded);
            }
            facts.record(&column, count_changes(source.values(), &values));
            let rebuilt = build_column(&column, source.dtype(), values)?;
            output = put_column(&output, &column, rebuilt)?;
        }
        Ok(StepOutput::new(output, StepMetadata::Values(facts)))
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClipValuesParams {
    column: String,
    #[serde(default)]
    lower: Option<f64>,
    #[serde(default)]
    upper: Option<f64>,
}

pub struct ClipValues;

impl TypedPrimitive for ClipValues {
    type Params = ClipValuesParams;
    const NAME: &'static str = "clip_values";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Cap numeric values at a lower and/or upper bound.",
        )
        .param(ParamSpec::required("column", ParamKind::Column, "Numeric column"))
        .param(ParamSpec::optional("lower", ParamKind::Number, "Smallest allowed value"))
        .param(ParamSpec::optional("upper", ParamKind::Number, "Largest allowed value"))
        .example("Cap discounts at 50", json!({"column": "discount", "upper": 50}))
        .example("No negative quantities", json!({"column": "quantity", "lower": 0}))
        .example(
            "Keep percentages between 0 and 100",
            json!({"column": "pct", "lower": 0, "upper": 100}),
        )
    }

    fn check(&self, params: &ClipValuesParams, table: &Table) -> Result<(), AppError> {
        let dtype = params::require_numeric(table, "column", &params.column)?;
        match (params.lower, params.upper) {
            (None, None) => {
                return Err(AppError::parameter("lower", "give lower, upper or both"));
            }
            (Some(lower), Some(upper)) if lower > upper => {
                return Err(AppError::parameter(
                    "lower",
                    format!("lower bound {} is above upper bound {}", lower, upper),
                ));
            }
            _ => {}
        }
        for (key, bound) in [("lower", params.lower), ("upper", params.upper)] {
            if let Some(bound) = bound {
                if !bound.is_finite() {
                    return Err(AppError::parameter(key, "must be a finite number"));
                }
                if dtype == DataType::Integer && whole_to_i64(bound).is_none() {
                    return Err(AppError::parameter(
                        key,
                        "must be a whole number within the integer range for an integer column",
                    ));
                }
            }
        }
        Ok(())
    }

    fn apply(&self, table: &Table, params: ClipValuesParams) -> Result<StepOutput, AppError> {
        let source = params::require_column(table, "column", &params.column)?;
        let int_bound = |key: &str, bound: Option<f64>| -> Result<Option<i64>, AppError> {
            bound
                .map(|b| {
                    whole_to_i64(b).ok_or_else(|| {
                        AppError::parameter(key, "must be a whole number within the integer range")
                    })
                })
                .transpose()
        };
        let (int_lower, int_upper) = if source.dtype() == DataType::Integer {
            (int_bound("lower", params.lower)?, int_bound("upper", params.upper)?)
        } else {
            (None, None)
        };
        let clip = |v: f64| {
            let v = params.lower.map_or(v, |lower| v.max(lower));
            params.upper.map_or(v, |upper| v.min(upper))
        };
        let values: Vec<Value> = source
            .values()
            .iter()
            .map(|value| match value {
                Value::Int(v) => {
                    let v = int_lower.map_or(*v, |lower| (*v).max(lower));
                    Value::Int(int_upper.map_or(v, |upper| v.min(upper)))
                }
                Value::Float(v) => Value::Float(clip(*v)),
                other => other.clone(),
            })
            .collect();
        let mut facts = ValueFacts::default();
        facts.record(&params.column, count_changes(source.values(), &values));
        let rebuilt = build_column(&params.column, source.dtype(), values)?;
        let output = put_column(table, &params.column, rebuilt)?;
        Ok(StepOutput::new(output, StepMetadata::Values(facts)))
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOperator {
    #[default]
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
}

impl ArithmeticOperator {
    fn symbol(self) -> &'static str {
        match self {
            ArithmeticOperator::Add => "+",
            ArithmeticOperator::Subtract => "-",
            ArithmeticOperator::Multiply => "*",
            ArithmeticOperator::Divide => "/",
            ArithmeticOperator::Modulo => "%",
            ArithmeticOperator::Power => "^",
        }
    }

    fn integers(self, a: i64, b: i64) -> Result<Option<i64>, &'static str> {
        match self {
            ArithmeticOperator::Add => Ok(a.checked_add(b)),
            ArithmeticOperator::Subtract => Ok(a.checked_sub(b)),
            ArithmeticOperator::Multiply => Ok(a.checked_mul(b)),
            ArithmeticOperator::Modulo if b == 0 => Err("modulo by zero"),
            ArithmeticOperator::Modulo => Ok(a.checked_rem(b)),
            ArithmeticOperator::Power => Ok(u32::try_from(b).ok().and_then(|e| a.checked_pow(e))),
            ArithmeticOperator::Divide => Ok(None),
        }
    }

    fn floats(self, a: f64, b: f64) -> Result<f64, &'static str> {
        match self {
            ArithmeticOperator::Add => Ok(a + b),
            ArithmeticOperator::Subtract => Ok(a - b),
            ArithmeticOperator::Multiply => Ok(a * b),
            ArithmeticOperator::Divide if b == 0.0 => Err("division by zero"),
            ArithmeticOperator::Divide => Ok(a / b),
            ArithmeticOperator::Modulo if b == 0.0 => Err("modulo by zero"),
            ArithmeticOperator::Modulo => Ok(a % b),
            ArithmeticOperator::Power => Ok(a.powf(b)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalculateColumnParams {
    into: String,
    left: String,
    #[serde(default)]
    operator: ArithmeticOperator,
    #[serde(default)]
    right_column: Option<String>,
    #[serde(default)]
    right_value: Option<JsonValue>,
}

enum RightOperand<'a> {
    Column(&'a crate::core::table::Column),
    Constant(Value),
}

impl CalculateColumnParams {
    fn right<'a>(&self, table: &'a Table) -> Result<RightOperand<'a>, AppError> {
        match (&self.right_column, &self.right_value) {
            (Some(column), None) => {
                params::require_numeric(table, "right_column", column)?;
                Ok(RightOperand::Column(params::require_column(table, "right_column", column)?))
            }
            (None, Some(raw)) => {
                let value = Value::from_json(raw)
                    .map_err(|reason| AppError::parameter("right_value", reason))?;
                if value.as_f64().is_none() {
                    return Err(AppError::parameter("right_value", "must be a number"));
                }
                Ok(RightOperand::Constant(value))
            }
            (Some(_), Some(_)) => Err(AppError::parameter(
                "right_column",
                "give either right_column or right_value, not both",
            )),
            (None, None) => Err(AppError::parameter(
                "right_column",
                "one of right_column or right_value is required",
            )),
        }
    }
}

pub struct CalculateColumn;

impl TypedPrimitive for CalculateColumn {
    type Params = CalculateColumnParams;
    const NAME: &'static str = "calculate_column";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Compute a new column from a numeric column and either another numeric column or a constant. Nulls propagate; dividing by zero fails.",
        )
        .param(ParamSpec::required("into", ParamKind::Column, "Output column"))
        .param(ParamSpec::required("left", ParamKind::Column, "Left operand column"))
        .param(
            ParamSpec::optional(
                "operator",
                ParamKind::Choice(vec!["add", "subtract", "multiply", "divide", "modulo", "power"]),
                "Arithmetic operator",
            )
            .default_value("add"),
        )
        .param(ParamSpec::optional("right_column", ParamKind::Column, "Right operand column"))
        .param(ParamSpec::optional("right_value", ParamKind::Number, "Right operand constant"))
        .example(
            "Total is price times quantity",
            json!({"into": "total", "left": "price", "operator": "multiply", "right_column": "quantity"}),
        )
        .example(
            "Add 8% tax to the amount",
            json!({"into": "amount_with_tax", "left": "amount", "operator": "multiply", "right_value": 1.08}),
        )
        .example(
            "Profit is revenue minus cost",
            json!({"into": "profit", "left": "revenue", "operator": "subtract", "right_column": "cost"}),
        )
        .example(
            "Average price per unit",
            json!({"into": "unit_price", "left": "total", "operator": "divide", "right_column": "units"}),
        )
    }

    fn check(&self, params: &CalculateColumnParams, table: &Table) -> Result<(), AppError> {
        params::require_numeric(table, "left", &params.left)?;
        params.right(table)?;
        params::require_output_name(table, "into", &params.into, Some(params.left.as_str()))
    }

    fn apply(&self, table: &Table, params: CalculateColumnParams) -> Result<StepOutput, AppError> {
        let left = params::require_column(table, "left", &params.left)?;
        let right = params.right(table)?;
        let op = params.operator;
        let int_result = op != ArithmeticOperator::Divide
            && left.dtype() == DataType::Integer
            && match &right {
                RightOperand::Column(c) => c.dtype() == DataType::Integer,
                RightOperand::Constant(v) => matches!(v, Value::Int(_)),
            };

        let mut values = Vec::with_capacity(table.row_count());
        for row in 0..table.row_count() {
            let a = left.get(row);
            let b = match &right {
                RightOperand::Column(c) => c.get(row),
                RightOperand::Constant(v) => v,
            };
            if a.is_null() || b.is_null() {
                values.push(Value::Null);
                continue;
            }
            let fail = |reason: &str| {
                AppError::execution(format!(
                    "row {}: {} in {} {} {}",
                    row,
                    reason,
                    a,
                    op.symbol(),
                    b
                ))
                .with_row(row)
                .with_context("column", params.left.as_str())
            };
            let integer = match (int_result, a, b) {
                (true, Value::Int(x), Value::Int(y)) => op.integers(*x, *y).map_err(fail)?,
                _ => None,
            };
            let value = match integer {
                Some(n) => Value::Int(n),
                None => {
                    let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                    let result = op.floats(x, y).map_err(fail)?;
                    if !result.is_finite() {
                        return Err(fail("result is not a finite number"));
                    }
                    if int_result {
                        return Err(fail("result does not fit an integer column"));
                    }
                    Value::Float(result)
                }
            };
            values.push(value);
        }

        let dtype = if int_result { DataType::Integer } else { DataType::Float };
        let mut sources = vec![params.left.clone()];
        if let Some(column) = &params.right_column {
            sources.push(column.clone());
        }
        let facts = DerivedFacts {
            column: params.into.clone(),
            source_columns: sources,
            rows: values.len(),
            nulls_produced: values.iter().filter(|v| v.is_null()).count(),
            partitions: None,
        };
        let column = build_column(&params.into, dtype, values)?;
        let output = put_column(table, &params.into, column)?;
        Ok(StepOutput::new(output, StepMetadata::Derived(facts)))
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeMethod {
    #[default]
    MinMax,
    ZScore,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NormalizeColumnParams {
    column: String,
    #[serde(default)]
    method: NormalizeMethod,
    #[serde(default)]
    into: Option<String>,
}

pub struct NormalizeColumn;

impl TypedPrimitive for NormalizeColumn {
    type Params = NormalizeColumnParams;
    const NAME: &'static str = "normalize_column";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Rescale a numeric column to 0..1 (min_max) or to standard scores (z_score, sample standard deviation). Constant columns fail.",
        )
        .param(ParamSpec::required("column", ParamKind::Column, "Numeric column"))
        .param(
            ParamSpec::optional(
                "method",
                ParamKind::Choice(vec!["min_max", "z_score"]),
                "Scaling method",
            )
            .default_value("min_max"),
        )
        .param(
            ParamSpec::optional("into", ParamKind::Column, "Output column")
                .default_value("{column}"),
        )
        .example("Scale the scores between 0 and 1", json!({"column": "score"}))
        .example(
            "Standardize income into z-scores in a new column",
            json!({"column": "income", "method": "z_score", "into": "income_z"}),
        )
        .example(
            "Min-max normalize the ratings",
            json!({"column": "rating", "method": "min_max"}),
        )
    }

    fn check(&self, params: &NormalizeColumnParams, table: &Table) -> Result<(), AppError> {
        params::require_numeric(table, "column", &params.column)?;
        if let Some(into) = &params.into {
            params::require_output_name(table, "into", into, Some(params.column.as_str()))?;
        }
        Ok(())
    }

    fn apply(&self, table: &Table, params: NormalizeColumnParams) -> Result<StepOutput, AppError> {
        let source = params::require_column(table, "column", &params.column)?;
        let numbers: Vec<f64> = source.values().iter().filter_map(Value::as_f64).collect();
        let constant = || {
            AppError::execution(format!(
                "column '{}' is constant or empty and cannot be normalized",
                params.column
            ))
            .with_context("column", params.column.as_str())
        };
        let (offset, scale) = match params.method {
            NormalizeMethod::MinMax => {
                let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
                let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                if numbers.is_empty() || max <= min {
                    return Err(constant());
                }
                (min, max - min)
            }
            NormalizeMethod::ZScore => {
                let mean = numbers.iter().sum::<f64>() / numbers.len().max(1) as f64;
                match sample_std(&numbers) {
                    Some(std) if std > 0.0 => (mean, std),
                    _ => return Err(constant()),
                }
            }
        };
        if !offset.is_finite() || !scale.is_finite() {
            return Err(AppError::execution(format!(
                "column '{}' spans a range too large to normalize",
                params.column
            ))
            .with_context("column", params.column.as_str()));
        }
        let mut values = Vec::with_capacity(source.len());
        for (row, value) in source.values().iter().enumerate() {
            let scaled = match value.as_f64() {
                Some(x) => finite((x - offset) / scale).map_err(|reason| {
                    AppError::execution(format!("row {}: {}", row, reason))
                        .with_row(row)
                        .with_context("column", params.column.as_str())
                })?,
                None => Value::Null,
            };
            values.push(scaled);
        }
        let into = params.into.clone().unwrap_or_else(|| params.column.clone());
        let facts = DerivedFacts {
            column: into.clone(),
            source_columns: vec![params.column.clone()],
            rows: values.len(),
            nulls_produced: values.iter().filter(|v| v.is_null()).count(),
            partitions: None,
        };
        let column = build_column(&into, DataType::Float, values)?;
        let output = put_column(table, &into, column)?;
        Ok(StepOutput::new(output, StepMetadata::Derived(facts)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::primitives::testing::{fail, records, run, table};
    use crate::core::types::ErrorCategory;

    fn sales() -> Table {
        table(json!([
            {"price": 2.5, "qty": 4, "name": "a"},
            {"price": -1.25, "qty": 0, "name": "b"},
            {"price": null, "qty": 3, "name": "c"}
        ]))
    }

    #[test]
    fn test_round_half_away_from_zero() {
        let out = run(RoundNumbers, &sales(), json!({"columns": "price", "decimals": 0}));
        let rows = records(&out.table);
        assert_eq!(rows[0]["price"], json!(3.0));
        assert_eq!(rows[1]["price"], json!(-1.0));
        let out = run(RoundNumbers, &sales(), json!({"columns": ["price"], "decimals": 1}));
        assert_eq!(records(&out.table)[1]["price"], json!(-1.3));
    }

    #[test]
    fn test_round_text_column_is_parameter_error() {
        let err = fail(RoundNumbers, &sales(), json!({"columns": ["name"]}));
        assert_eq!(err.category, ErrorCategory::ParameterError);
    }

    #[test]
    fn test_clip_bounds() {
        let out = run(ClipValues, &sales(), json!({"column": "qty", "lower": 1, "upper": 3}));
        assert_eq!(records(&out.table), json!([
            {"price": 2.5, "qty": 3, "name": "a"},
            {"price": -1.25, "qty": 1, "name": "b"},
            {"price": null, "qty": 3, "name": "c"}
        ]));
        let err = fail(ClipValues, &sales(), json!({"column": "qty", "lower": 5, "upper": 1}));
        assert_eq!(err.category, ErrorCategory::ParameterError);
    }

    #[test]
    fn test_calculate_multiply_propagates_null() {
        let out = run(
            CalculateColumn,
            &sales(),
            json!({"into": "total", "left": "price", "operator": "multiply", "right_column": "qty"}),
        );
        let rows = records(&out.table);
        assert_eq!(rows[0]["total"], json!(10.0));
        assert_eq!(rows[2]["total"], json!(null));
    }

    #[test]
    fn test_calculate_integer_stays_integer() {
        let out = run(
            CalculateColumn,
            &sales(),
            json!({"into": "double", "left": "qty", "operator": "multiply", "right_value": 2}),
        );
        assert_eq!(out.table.column("double").unwrap().dtype(), DataType::Integer);
        assert_eq!(out.table.cell("double", 0), Some(&Value::Int(8)));
    }

    #[test]
    fn test_calculate_division_by_zero_names_row() {
        let err = fail(
            CalculateColumn,
            &sales(),
            json!({"into": "ratio", "left": "price", "operator": "divide", "right_column": "qty"}),
        );
        assert_eq!(err.category, ErrorCategory::ExecutionError);
        assert_eq!(err.context.get("row"), Some(&"1".to_string()));
    }

    #[test]
    fn test_normalize_min_max() {
        let out = run(NormalizeColumn, &sales(), json!({"column": "qty", "into": "qty_norm"}));
        let rows = records(&out.table);
        assert_eq!(rows[0]["qty_norm"], json!(1.0));
        assert_eq!(rows[1]["qty_norm"], json!(0.0));
        assert_eq!(rows[2]["qty_norm"], json!(0.75));
    }

    #[test]
    fn test_normalize_constant_fails() {
        let input = table(json!([{"x": 1}, {"x": 1}]));
        let err = fail(NormalizeColumn, &input, json!({"column": "x", "method": "z_score"}));
        assert_eq!(err.category, ErrorCategory::ExecutionError);
    }

    fn values_changed(out: &StepOutput) -> usize {
        match &out.metadata {
            StepMetadata::Values(facts) => {
                assert_eq!(facts.nulls_introduced, 0);
                facts.values_changed
            }
            other => panic!("unexpected metadata {:?}", other),
        }
    }

    #[test]
    fn test_round_huge_float_keeps_value() {
        let input = table(json!([{"x": 1e300}, {"x": 0.125}]));
        let out = run(RoundNumbers, &input, json!({"columns": ["x"], "decimals": 15}));
        assert_eq!(out.table.cell("x", 0), Some(&Value::Float(1e300)));
        assert_eq!(out.table.cell("x", 1), Some(&Value::Float(0.125)));
        assert_eq!(values_changed(&out), 0);
    }

    #[test]
    fn test_round_integers_stay_exact() {
        let input = table(json!([{"x": 9007199254740993i64}, {"x": 25}, {"x": -25}, {"x": 24}]));
        let out = run(RoundNumbers, &input, json!({"columns": "x", "decimals": -1}));
        let cells: Vec<Value> = out.table.column("x").unwrap().values().to_vec();
        assert_eq!(
            cells,
            vec![
                Value::Int(9007199254740990),
                Value::Int(30),
                Value::Int(-30),
                Value::Int(20)
            ]
        );
    }

    #[test]
    fn test_round_integer_overflow_is_execution_error() {
        let input = table(json!([{"x": 1}, {"x": i64::MAX}]));
        let err = fail(RoundNumbers, &input, json!({"columns": "x", "decimals": -1}));
        assert_eq!(err.category, ErrorCategory::ExecutionError);
        assert_eq!(err.context.get("row"), Some(&"1".to_string()));
    }

    #[test]
    fn test_clip_large_integers_stay_exact() {
        let input = table(json!([{"x": 9007199254740993i64}, {"x": -3}]));
        let out = run(ClipValues, &input, json!({"column": "x", "lower": 0}));
        assert_eq!(out.table.cell("x", 0), Some(&Value::Int(9007199254740993)));
        assert_eq!(out.table.cell("x", 1), Some(&Value::Int(0)));
        assert_eq!(values_changed(&out), 1);
    }

    #[test]
    fn test_clip_integer_bound_outside_range_is_parameter_error() {
        let input = table(json!([{"x": 1}]));
        let err = fail(ClipValues, &input, json!({"column": "x", "lower": 1e20}));
        assert_eq!(err.category, ErrorCategory::ParameterError);
    }

    #[test]
    fn test_normalize_overflowing_range_is_execution_error() {
        let input = table(json!([{"x": -1e308}, {"x": 1e308}]));
        let err = fail(NormalizeColumn, &input, json!({"column": "x"}));
        assert_eq!(err.category, ErrorCategory::ExecutionError);
    }
}
