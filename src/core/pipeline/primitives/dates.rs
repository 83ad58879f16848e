use super::types::{conversion_error, format_datetime, parse_with_format, validate_format};
use super::{build_column, count_new_nulls, put_column};
use crate::core::error::AppError;
use crate::core::pipeline::metadata::{ConversionFacts, DerivedFacts, StepMetadata};
use crate::core::pipeline::params::{self, OnError};
use crate::core::pipeline::primitive::{
    ParamKind, ParamSpec, PrimitiveDefinition, StepOutput, TypedPrimitive,
};
use crate::core::table::{DataType, Table, Value};
use crate::core::types::PrimitiveCategory;
use chrono::{Datelike, Months, NaiveDateTime, TimeDelta, Timelike};
use serde::Deserialize;
use serde_json::json;

const CATEGORY: PrimitiveCategory = PrimitiveCategory::DateArithmetic;

fn derived_output(
    table: &Table,
    into: &str,
    dtype: DataType,
    sources: &[&str],
    values: Vec<Value>,
) -> Result<StepOutput, AppError> {
    let facts = DerivedFacts {
        column: into.to_string(),
        source_columns: sources.iter().map(|s| s.to_string()).collect(),
        rows: values.len(),
        nulls_produced: values.iter().filter(|v| v.is_null()).count(),
        partitions: None,
    };
    let column = build_column(into, dtype, values)?;
    let output = put_column(table, into, column)?;
    Ok(StepOutput::new(output, StepMetadata::Derived(facts)))
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParseDatesParams {
    column: String,
    formats: Vec<String>,
    #[serde(default)]
    on_error: OnError,
}

enum Parsed {
    Missing,
    Date(NaiveDateTime),
    NoMatch,
    Ambiguous(NaiveDateTime, NaiveDateTime),
}

fn parse_candidates(text: &str, formats: &[String]) -> Parsed {
    let text = text.trim();
    if text.is_empty() {
        return Parsed::Missing;
    }
    let mut found: Option<NaiveDateTime> = None;
    for format in formats {
        if let Some(parsed) = parse_with_format(text, format) {
            match found {
                Some(previous) if previous != parsed => return Parsed::Ambiguous(previous, parsed),
                _ => found = Some(parsed),
            }
        }
    }
    found.map_or(Parsed::NoMatch, Parsed::Date)
}

pub struct ParseDates;

impl TypedPrimitive for ParseDates {
    type Params = ParseDatesParams;
    const NAME: &'static str = "parse_dates";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Parse a text column into datetimes trying every listed format. A value that two formats read differently is ambiguous and fails. Blank cells become null.",
        )
        .param(ParamSpec::required("column", ParamKind::Column, "Text column"))
        .param(ParamSpec::required(
            "formats",
            ParamKind::Values,
            "strftime formats, e.g. %Y-%m-%d",
        ))
        .param(
            ParamSpec::optional(
                "on_error",
                ParamKind::Choice(vec!["fail", "null"]),
                "What to do with unparseable or ambiguous values",
            )
            .default_value("fail"),
        )
        .example(
            "Read the signup column as ISO dates",
            json!({"column": "signup", "formats": ["%Y-%m-%d"]}),
        )
        .example(
            "Parse order dates written either as 2024-01-31 or 31.01.2024",
            json!({"column": "order_date", "formats": ["%Y-%m-%d", "%d.%m.%Y"]}),
        )
        .example(
            "Convert timestamps like 2024-01-31 14:05, blanking anything unreadable",
            json!({"column": "created", "formats": ["%Y-%m-%d %H:%M"], "on_error": "null"}),
        )
    }

    fn check(&self, params: &ParseDatesParams, table: &Table) -> Result<(), AppError> {
        params::require_string(table, "column", &params.column)?;
        params::require_non_empty("formats", &params.formats)?;
        for format in &params.formats {
            validate_format("formats", format)?;
        }
        Ok(())
    }

    fn apply(&self, table: &Table, params: ParseDatesParams) -> Result<StepOutput, AppError> {
        let source = params::require_column(table, "column", &params.column)?;
        let mut values = Vec::with_capacity(source.len());
        for (row, value) in source.values().iter().enumerate() {
            let Some(text) = value.as_str() else {
                values.push(Value::Null);
                continue;
            };
            let outcome = parse_candidates(text, &params.formats);
            let failure = match outcome {
                Parsed::Missing => {
                    values.push(Value::Null);
                    continue;
                }
                Parsed::Date(parsed) => {
                    values.push(Value::DateTime(parsed));
                    continue;
                }
                Parsed::NoMatch => conversion_error(&params.column, row, value, "datetime")
                    .with_context("formats", params.formats.join(", ")),
                Parsed::Ambiguous(first, second) => AppError::execution(format!(
                    "row {}: value '{}' in column '{}' is ambiguous ({} or {})",
                    row, text, params.column, first, second
                ))
                .with_row(row)
                .with_context("column", params.column.as_str())
                .with_context("value", text),
            };
            match params.on_error {
                OnError::Fail => return Err(failure),
                OnError::Null => values.push(Value::Null),
            }
        }
        let facts = ConversionFacts {
            column: params.column.clone(),
            from_type: source.dtype(),
            to_type: DataType::Datetime,
            values_converted: values.iter().filter(|v| !v.is_null()).count(),
            nulls_introduced: count_new_nulls(source.values(), &values),
        };
        let column = build_column(&params.column, DataType::Datetime, values)?;
        let output = put_column(table, &params.column, column)?;
        Ok(StepOutput::new(output, StepMetadata::Conversion(facts)))
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePart {
    Year,
    Quarter,
    Month,
    Week,
    Day,
    Weekday,
    DayOfYear,
    Hour,
    Minute,
    Second,
}

impl DatePart {
    fn as_str(self) -> &'static str {
        match self {
            DatePart::Year => "year",
            DatePart::Quarter => "quarter",
            DatePart::Month => "month",
            DatePart::Week => "week",
            DatePart::Day => "day",
            DatePart::Weekday => "weekday",
            DatePart::DayOfYear => "day_of_year",
            DatePart::Hour => "hour",
            DatePart::Minute => "minute",
            DatePart::Second => "second",
        }
    }

    /// ISO week numbers; weekday is 1 (Monday) through 7 (Sunday).
    fn extract(self, value: &NaiveDateTime) -> i64 {
        match self {
            DatePart::Year => i64::from(value.year()),
            DatePart::Quarter => i64::from((value.month() - 1) / 3 + 1),
            DatePart::Month => i64::from(value.month()),
            DatePart::Week => i64::from(value.iso_week().week()),
            DatePart::Day => i64::from(value.day()),
            DatePart::Weekday => i64::from(value.weekday().number_from_monday()),
            DatePart::DayOfYear => i64::from(value.ordinal()),
            DatePart::Hour => i64::from(value.hour()),
            DatePart::Minute => i64::from(value.minute()),
            DatePart::Second => i64::from(value.second()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractDatePartParams {
    column: String,
    part: DatePart,
    #[serde(default)]
    into: Option<String>,
}

impl ExtractDatePartParams {
    fn target(&self) -> String {
        self.into
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.column, self.part.as_str()))
    }
}

pub struct ExtractDatePart;

impl TypedPrimitive for ExtractDatePart {
    type Params = ExtractDatePartParams;
    const NAME: &'static str = "extract_date_part";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Extract a calendar component of a datetime column as an integer column. Weeks are ISO weeks; weekday runs from 1 (Monday) to 7.",
        )
        .param(ParamSpec::required("column", ParamKind::Column, "Datetime column"))
        .param(ParamSpec::required(
            "part",
            ParamKind::Choice(vec![
                "year", "quarter", "month", "week", "day", "weekday", "day_of_year", "hour",
                "minute", "second",
            ]),
            "Component to extract",
        ))
        .param(
            ParamSpec::optional("into", ParamKind::Column, "Output column")
                .default_value("{column}_{part}"),
        )
        .example("Get the year of each order", json!({"column": "order_date", "part": "year"}))
        .example(
            "Add the sales quarter as a column called quarter",
            json!({"column": "sold_at", "part": "quarter", "into": "quarter"}),
        )
        .example(
            "Which day of the week did each ticket come in",
            json!({"column": "opened_at", "part": "weekday"}),
        )
    }

    fn check(&self, params: &ExtractDatePartParams, table: &Table) -> Result<(), AppError> {
        params::require_datetime(table, "column", &params.column)?;
        params::require_output_name(table, "into", &params.target(), Some(params.column.as_str()))
    }

    fn apply(&self, table: &Table, params: ExtractDatePartParams) -> Result<StepOutput, AppError> {
        let source = params::require_column(table, "column", &params.column)?;
        let values = source
            .values()
            .iter()
            .map(|v| match v.as_datetime() {
                Some(dt) => Value::Int(params.part.extract(&dt)),
                None => Value::Null,
            })
            .collect();
        derived_output(
            table,
            &params.target(),
            DataType::Integer,
            &[params.column.as_str()],
            values,
        )
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShiftDateParams {
    column: String,
    amount: i64,
    unit: ShiftUnit,
    #[serde(default)]
    into: Option<String>,
}

fn shift(value: NaiveDateTime, amount: i64, unit: ShiftUnit) -> Option<NaiveDateTime> {
    let by_months = |months: i64| {
        let magnitude = u32::try_from(months.unsigned_abs()).ok()?;
        if months >= 0 {
            value.checked_add_months(Months::new(magnitude))
        } else {
            value.checked_sub_months(Months::new(magnitude))
        }
    };
    let by_seconds = |factor: i64| {
        let seconds = amount.checked_mul(factor)?;
        value.checked_add_signed(TimeDelta::try_seconds(seconds)?)
    };
    match unit {
        ShiftUnit::Seconds => by_seconds(1),
        ShiftUnit::Minutes => by_seconds(60),
        ShiftUnit::Hours => by_seconds(3_600),
        ShiftUnit::Days => by_seconds(86_400),
        ShiftUnit::Weeks => by_seconds(604_800),
        ShiftUnit::Months => by_months(amount),
        ShiftUnit::Years => by_months(amount.checked_mul(12)?),
    }
}

pub struct ShiftDate;

impl TypedPrimitive for ShiftDate {
    type Params = ShiftDateParams;
    const NAME: &'static str = "shift_date";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Move datetimes forwards or backwards by a fixed amount. Month and year shifts clamp to the last day of the month.",
        )
        .param(ParamSpec::required("column", ParamKind::Column, "Datetime column"))
        .param(ParamSpec::required("amount", ParamKind::Integer, "Signed amount"))
        .param(ParamSpec::required(
            "unit",
            ParamKind::Choice(vec!["seconds", "minutes", "hours", "days", "weeks", "months", "years"]),
            "Unit of amount",
        ))
        .param(
            ParamSpec::optional("into", ParamKind::Column, "Output column")
                .default_value("{column}"),
        )
        .example(
            "Add 30 days to the invoice date to get the due date",
            json!({"column": "invoice_date", "amount": 30, "unit": "days", "into": "due_date"}),
        )
        .example(
            "Move every timestamp back one hour",
            json!({"column": "logged_at", "amount": -1, "unit": "hours"}),
        )
        .example(
            "Renewal is one year after the start date",
            json!({"column": "start_date", "amount": 1, "unit": "years", "into": "renewal_date"}),
        )
    }

    fn check(&self, params: &ShiftDateParams, table: &Table) -> Result<(), AppError> {
        params::require_datetime(table, "column", &params.column)?;
        if let Some(into) = &params.into {
            params::require_output_name(table, "into", into, Some(params.column.as_str()))?;
        }
        Ok(())
    }

    fn apply(&self, table: &Table, params: ShiftDateParams) -> Result<StepOutput, AppError> {
        let source = params::require_column(table, "column", &params.column)?;
        let mut values = Vec::with_capacity(source.len());
        for (row, value) in source.values().iter().enumerate() {
            let Some(dt) = value.as_datetime() else {
                values.push(Value::Null);
                continue;
            };
            let shifted = shift(dt, params.amount, params.unit).ok_or_else(|| {
                AppError::execution(format!(
                    "row {}: shifting '{}' by {} {:?} leaves the supported date range",
                    row, value, params.amount, params.unit
                ))
                .with_row(row)
                .with_context("column", params.column.as_str())
            })?;
            values.push(Value::DateTime(shifted));
        }
        let into = params.into.clone().unwrap_or_else(|| params.column.clone());
        derived_output(table, &into, DataType::Datetime, &[params.column.as_str()], values)
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl DifferenceUnit {
    fn seconds(self) -> i64 {
        match self {
            DifferenceUnit::Seconds => 1,
            DifferenceUnit::Minutes => 60,
            DifferenceUnit::Hours => 3_600,
            DifferenceUnit::Days => 86_400,
            DifferenceUnit::Weeks => 604_800,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DateDifferenceParams {
    start: String,
    end: String,
    unit: DifferenceUnit,
    into: String,
}

pub struct DateDifference;

impl TypedPrimitive for DateDifference {
    type Params = DateDifferenceParams;
    const NAME: &'static str = "date_difference";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Whole units elapsed from start to end (end minus start, truncated toward zero) as a new integer column.",
        )
        .param(ParamSpec::required("start", ParamKind::Column, "Earlier datetime column"))
        .param(ParamSpec::required("end", ParamKind::Column, "Later datetime column"))
        .param(ParamSpec::required(
            "unit",
            ParamKind::Choice(vec!["seconds", "minutes", "hours", "days", "weeks"]),
            "Unit of the result",
        ))
        .param(ParamSpec::required("into", ParamKind::Column, "Output column"))
        .example(
            "How many days between order and delivery",
            json!({"start": "ordered_at", "end": "delivered_at", "unit": "days", "into": "delivery_days"}),
        )
        .example(
            "Compute ticket resolution time in hours",
            json!({"start": "opened_at", "end": "closed_at", "unit": "hours", "into": "hours_open"}),
        )
        .example(
            "Account age in weeks as of the last login",
            json!({"start": "created_at", "end": "last_login", "unit": "weeks", "into": "age_weeks"}),
        )
    }

    fn check(&self, params: &DateDifferenceParams, table: &Table) -> Result<(), AppError> {
        params::require_datetime(table, "start", &params.start)?;
        params::require_datetime(table, "end", &params.end)?;
        params::require_output_name(table, "into", &params.into, None)
    }

    fn apply(&self, table: &Table, params: DateDifferenceParams) -> Result<StepOutput, AppError> {
        let start = params::require_column(table, "start", &params.start)?;
        let end = params::require_column(table, "end", &params.end)?;
        let values = (0..table.row_count())
            .map(|row| match (start.get(row).as_datetime(), end.get(row).as_datetime()) {
                (Some(a), Some(b)) => {
                    Value::Int((b - a).num_seconds() / params.unit.seconds())
                }
                _ => Value::Null,
            })
            .collect();
        derived_output(
            table,
            &params.into,
            DataType::Integer,
            &[params.start.as_str(), params.end.as_str()],
            values,
        )
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormatDatesParams {
    column: String,
    format: String,
    #[serde(default)]
    into: Option<String>,
}

pub struct FormatDates;

impl TypedPrimitive for FormatDates {
    type Params = FormatDatesParams;
    const NAME: &'static str = "format_dates";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Render a datetime column as text using a strftime format.",
        )
        .param(ParamSpec::required("column", ParamKind::Column, "Datetime column"))
        .param(ParamSpec::required("format", ParamKind::String, "strftime format"))
        .param(
            ParamSpec::optional("into", ParamKind::Column, "Output column")
                .default_value("{column}"),
        )
        .example(
            "Show the order date as 31/01/2024",
            json!({"column": "order_date", "format": "%d/%m/%Y"}),
        )
        .example(
            "Make a year-month label from the invoice date",
            json!({"column": "invoice_date", "format": "%Y-%m", "into": "period"}),
        )
        .example(
            "Write the timestamp with the month name",
            json!({"column": "created_at", "format": "%B %d, %Y", "into": "created_label"}),
        )
    }

    fn check(&self, params: &FormatDatesParams, table: &Table) -> Result<(), AppError> {
        params::require_datetime(table, "column", &params.column)?;
        validate_format("format", &params.format)?;
        if let Some(into) = &params.into {
            params::require_output_name(table, "into", into, Some(params.column.as_str()))?;
        }
        Ok(())
    }

    fn apply(&self, table: &Table, params: FormatDatesParams) -> Result<StepOutput, AppError> {
        let source = params::require_column(table, "column", &params.column)?;
        let mut values = Vec::with_capacity(source.len());
        for (row, value) in source.values().iter().enumerate() {
            match value.as_datetime() {
                Some(dt) => {
                    let text = format_datetime(&dt, &params.format)
                        .ok_or_else(|| conversion_error(&params.column, row, value, "string"))?;
                    values.push(Value::Str(text));
                }
                None => values.push(Value::Null),
            }
        }
        let into = params.into.clone().unwrap_or_else(|| params.column.clone());
        derived_output(table, &into, DataType::String, &[params.column.as_str()], values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::primitives::testing::{fail, records, run, table};
    use crate::core::types::ErrorCategory;

    fn dated() -> Table {
        Table::from_json(&json!({
            "columns": [
                {"name": "start", "dtype": "datetime", "values": ["2024-01-31T10:00:00", "2024-03-01T00:00:00", null]},
                {"name": "end", "dtype": "datetime", "values": ["2024-02-02T09:00:00", "2024-02-28T00:00:00", "2024-01-01T00:00:00"]}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_dates_multiple_formats() {
        let input = table(json!([{"d": "2024-01-31"}, {"d": "31.01.2024"}, {"d": ""}]));
        let out = run(
            ParseDates,
            &input,
            json!({"column": "d", "formats": ["%Y-%m-%d", "%d.%m.%Y"]}),
        );
        let rows = records(&out.table);
        assert_eq!(rows[0]["d"], rows[1]["d"]);
        assert_eq!(rows[2]["d"], json!(null));
    }

    #[test]
    fn test_parse_dates_ambiguous_fails() {
        let input = table(json!([{"d": "01/02/2024"}]));
        let err = fail(
            ParseDates,
            &input,
            json!({"column": "d", "formats": ["%d/%m/%Y", "%m/%d/%Y"]}),
        );
        assert_eq!(err.category, ErrorCategory::ExecutionError);
        assert!(err.message.contains("ambiguous"));
    }

    #[test]
    fn test_parse_dates_same_result_is_not_ambiguous() {
        let input = table(json!([{"d": "05/05/2024"}]));
        let out = run(
            ParseDates,
            &input,
            json!({"column": "d", "formats": ["%d/%m/%Y", "%m/%d/%Y"]}),
        );
        assert_eq!(records(&out.table)[0]["d"], json!("2024-05-05T00:00:00"));
    }

    #[test]
    fn test_extract_parts() {
        let out = run(ExtractDatePart, &dated(), json!({"column": "start", "part": "quarter"}));
        let rows = records(&out.table);
        assert_eq!(rows[0]["start_quarter"], json!(1));
        assert_eq!(rows[2]["start_quarter"], json!(null));
        let out = run(ExtractDatePart, &dated(), json!({"column": "start", "part": "weekday"}));
        // 2024-01-31 was a Wednesday
        assert_eq!(records(&out.table)[0]["start_weekday"], json!(3));
    }

    #[test]
    fn test_shift_months_clamps_to_month_end() {
        let out = run(
            ShiftDate,
            &dated(),
            json!({"column": "start", "amount": 1, "unit": "months", "into": "next"}),
        );
        assert_eq!(records(&out.table)[0]["next"], json!("2024-02-29T10:00:00"));
    }

    #[test]
    fn test_difference_truncates_toward_zero() {
        let out = run(
            DateDifference,
            &dated(),
            json!({"start": "start", "end": "end", "unit": "days", "into": "days"}),
        );
        let rows = records(&out.table);
        assert_eq!(rows[0]["days"], json!(1));
        assert_eq!(rows[1]["days"], json!(-2));
        assert_eq!(rows[2]["days"], json!(null));
    }

    #[test]
    fn test_format_dates() {
        let out = run(FormatDates, &dated(), json!({"column": "end", "format": "%Y-%m"}));
        assert_eq!(records(&out.table)[0]["end"], json!("2024-02"));
    }

    #[test]
    fn test_format_rejects_bad_specifier() {
        let err = fail(FormatDates, &dated(), json!({"column": "end", "format": "%Q"}));
        assert_eq!(err.category, ErrorCategory::ParameterError);
    }

    #[test]
    fn test_date_primitive_on_text_column_is_parameter_error() {
        let input = table(json!([{"d": "2024-01-01"}]));
        let err = fail(ExtractDatePart, &input, json!({"column": "d", "part": "year"}));
        assert_eq!(err.category, ErrorCategory::ParameterError);
    }
}
