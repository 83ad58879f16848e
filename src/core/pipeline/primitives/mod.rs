//! The built-in primitive catalog, one module per category.

pub mod columns;
pub mod dates;
pub mod joins;
pub mod numeric;
pub mod quality;
pub mod reshape;
pub mod rows;
pub mod text;
pub mod types;
pub mod window;

use crate::core::error::AppError;
use crate::core::pipeline::registry::RegistryBuilder;
use crate::core::table::{Column, DataType, Table, Value};
use std::cmp::Ordering;

/// Register every built-in primitive.
pub fn register_builtins(builder: &mut RegistryBuilder) -> Result<(), AppError> {
    builder
        .register(rows::FilterRows)?
        .register(rows::RemoveDuplicates)?
        .register(rows::DropMissing)?
        .register(rows::SortRows)?
        .register(rows::LimitRows)?
        .register(rows::SampleRows)?;

    builder
        .register(columns::SelectColumns)?
        .register(columns::DropColumns)?
        .register(columns::RenameColumns)?
        .register(columns::SplitColumn)?
        .register(columns::MergeColumns)?
        .register(columns::AddConstantColumn)?;

    builder
        .register(text::TrimWhitespace)?
        .register(text::ChangeTextCasing)?
        .register(text::StandardizeValues)?
        .register(text::ReplaceText)?
        .register(text::ExtractPattern)?;

    builder
        .register(types::ChangeColumnType)?
        .register(types::FillMissing)?
        .register(types::ParseNumeric)?;

    builder
        .register(dates::ParseDates)?
        .register(dates::ExtractDatePart)?
        .register(dates::ShiftDate)?
        .register(dates::DateDifference)?
        .register(dates::FormatDates)?;

    builder
        .register(numeric::RoundNumbers)?
        .register(numeric::ClipValues)?
        .register(numeric::CalculateColumn)?
        .register(numeric::NormalizeColumn)?;

    builder
        .register(window::Rank)?
        .register(window::DenseRank)?
        .register(window::PercentRank)?
        .register(window::Ntile)?
        .register(window::Lag)?
        .register(window::Lead)?
        .register(window::MovingAverage)?
        .register(window::RunningTotal)?
        .register(window::FirstValue)?;

    builder
        .register(reshape::Aggregate)?
        .register(reshape::PivotTable)?
        .register(reshape::Unpivot)?;

    builder
        .register(joins::JoinTables)?
        .register(joins::Lookup)?
        .register(joins::UnionTables)?;

    builder
        .register(quality::DetectSchemaDrift)?
        .register(quality::CheckEnumValues)?
        .register(quality::ValidateFormat)?
        .register(quality::DetectDistributionDrift)?
        .register(quality::ProfileColumns)?;

    Ok(())
}

/// Build a column from computed values; a type clash here is a data problem.
pub(crate) fn build_column(name: &str, dtype: DataType, values: Vec<Value>) -> Result<Column, AppError> {
    Column::new(name, dtype, values).map_err(|e| e.into_execution())
}

/// Replace or append `name` in a copy of `table`.
pub(crate) fn put_column(table: &Table, name: &str, column: Column) -> Result<Table, AppError> {
    table.with_column(name, column).map_err(|e| e.into_execution())
}

/// Wrap a computed float. NaN and infinities are rejected, never stored as null.
pub(crate) fn finite(value: f64) -> Result<Value, String> {
    if value.is_finite() {
        Ok(Value::Float(value))
    } else {
        Err(format!("result {} is not a finite number", value))
    }
}

/// Order two cells for sorting; nulls go to one end regardless of direction.
pub(crate) fn compare_cells(a: &Value, b: &Value, descending: bool, nulls_last: bool) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => {
            if nulls_last {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (false, true) => {
            if nulls_last {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (false, false) => {
            let ordering = a.total_cmp(b);
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        }
    }
}

/// Count positions where two equally long value slices differ.
pub(crate) fn count_changes(before: &[Value], after: &[Value]) -> usize {
    before.iter().zip(after).filter(|(a, b)| a != b).count()
}

/// Count cells that were non-null before and null after.
pub(crate) fn count_new_nulls(before: &[Value], after: &[Value]) -> usize {
    before
        .iter()
        .zip(after)
        .filter(|(a, b)| !a.is_null() && b.is_null())
        .count()
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::core::pipeline::primitive::{Primitive, StepOutput};
    use crate::core::error::AppError;
    use crate::core::table::Table;
    use serde_json::Value as JsonValue;

    pub fn table(records: JsonValue) -> Table {
        Table::from_json(&records).expect("valid test table")
    }

    pub fn run<P: Primitive>(primitive: P, input: &Table, params: JsonValue) -> StepOutput {
        primitive
            .execute(input, &params)
            .unwrap_or_else(|err| panic!("{} failed: {}", primitive.name(), err))
    }

    pub fn fail<P: Primitive>(primitive: P, input: &Table, params: JsonValue) -> AppError {
        match primitive.execute(input, &params) {
            Ok(_) => panic!("{} unexpectedly succeeded", primitive.name()),
            Err(err) => err,
        }
    }

    pub fn records(table: &Table) -> JsonValue {
        JsonValue::Array(
            table
                .to_records()
                .into_iter()
                .map(JsonValue::Object)
                .collect(),
        )
    }
}
