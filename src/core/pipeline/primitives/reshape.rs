use super::numeric::sample_std;
use super::types::{mean, median};
use super::{build_column, compare_cells, finite};
use crate::core::error::AppError;
use crate::core::pipeline::metadata::{ReshapeFacts, StepMetadata};
use crate::core::pipeline::params::{self, OneOrMany};
use crate::core::pipeline::primitive::{
    ParamKind, ParamSpec, PrimitiveDefinition, StepOutput, TypedPrimitive,
};
use crate::core::table::{Column, DataType, Table, Value, ValueKey};
use crate::core::types::PrimitiveCategory;
use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;

const CATEGORY: PrimitiveCategory = PrimitiveCategory::GroupingReshaping;

const FUNCTIONS: [&str; 10] = [
    "sum",
    "mean",
    "median",
    "min",
    "max",
    "count",
    "count_distinct",
    "first",
    "last",
    "std",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggFunction {
    Sum,
    Mean,
    Median,
    Min,
    Max,
    Count,
    CountDistinct,
    First,
    Last,
    Std,
}

impl AggFunction {
    fn as_str(self) -> &'static str {
        match self {
            AggFunction::Sum => "sum",
            AggFunction::Mean => "mean",
            AggFunction::Median => "median",
            AggFunction::Min => "min",
            AggFunction::Max => "max",
            AggFunction::Count => "count",
            AggFunction::CountDistinct => "count_distinct",
            AggFunction::First => "first",
            AggFunction::Last => "last",
            AggFunction::Std => "std",
        }
    }

    fn needs_numeric(self) -> bool {
        matches!(
            self,
            AggFunction::Sum | AggFunction::Mean | AggFunction::Median | AggFunction::Std
        )
    }

    fn output_type(self, input: DataType) -> DataType {
        match self {
            AggFunction::Count | AggFunction::CountDistinct => DataType::Integer,
            AggFunction::Mean | AggFunction::Median | AggFunction::Std => DataType::Float,
            AggFunction::Sum if input == DataType::Integer => DataType::Integer,
            AggFunction::Sum => DataType::Float,
            AggFunction::Min | AggFunction::Max | AggFunction::First | AggFunction::Last => input,
        }
    }

    fn check(self, table: &Table, key: &str, column: &str) -> Result<(), AppError> {
        if self.needs_numeric() {
            params::require_numeric(table, key, column)?;
        } else {
            params::require_column(table, key, column)?;
        }
        Ok(())
    }

    /// Reduce the cells of one group. Nulls are ignored; an all-null group
    /// yields null (count functions yield 0).
    fn reduce(self, column: &Column, rows: &[usize]) -> Result<Value, String> {
        let present: Vec<&Value> = rows
            .iter()
            .map(|row| column.get(*row))
            .filter(|v| !v.is_null())
            .collect();
        let numbers = || present.iter().filter_map(|v| v.as_f64()).collect::<Vec<f64>>();
        let value = match self {
            AggFunction::Count => Value::Int(present.len() as i64),
            AggFunction::CountDistinct => {
                let distinct: IndexSet<ValueKey> = present.iter().map(|v| v.key()).collect();
                Value::Int(distinct.len() as i64)
            }
            _ if present.is_empty() => Value::Null,
            AggFunction::Sum if column.dtype() == DataType::Integer => {
                let mut total = 0i64;
                for value in &present {
                    if let Value::Int(v) = value {
                        total = total
                            .checked_add(*v)
                            .ok_or_else(|| "integer sum overflows".to_string())?;
                    }
                }
                Value::Int(total)
            }
            AggFunction::Sum => finite(numbers().iter().sum())?,
            AggFunction::Mean => mean(&numbers()).map_or(Ok(Value::Null), finite)?,
            AggFunction::Median => median(&numbers()).map_or(Ok(Value::Null), finite)?,
            AggFunction::Std => sample_std(&numbers()).map_or(Ok(Value::Null), finite)?,
            AggFunction::Min => present
                .iter()
                .copied()
                .min_by(|a, b| a.total_cmp(b))
                .cloned()
                .unwrap_or(Value::Null),
            AggFunction::Max => present
                .iter()
                .copied()
                .max_by(|a, b| a.total_cmp(b))
                .cloned()
                .unwrap_or(Value::Null),
            AggFunction::First => present.first().map_or(Value::Null, |v| (*v).clone()),
            AggFunction::Last => present.last().map_or(Value::Null, |v| (*v).clone()),
        };
        Ok(value)
    }
}

/// Row groups keyed by `columns`, sorted by key with nulls last.
struct Groups {
    keys: Vec<Vec<Value>>,
    rows: Vec<Vec<usize>>,
}

impl Groups {
    fn build(table: &Table, columns: &[&Column]) -> Self {
        let mut index: IndexMap<Vec<ValueKey>, (Vec<Value>, Vec<usize>)> = IndexMap::new();
        for row in 0..table.row_count() {
            let key: Vec<ValueKey> = columns.iter().map(|c| c.get(row).key()).collect();
            index
                .entry(key)
                .or_insert_with(|| (columns.iter().map(|c| c.get(row).clone()).collect(), Vec::new()))
                .1
                .push(row);
        }
        let mut entries: Vec<(Vec<Value>, Vec<usize>)> = index.into_values().collect();
        entries.sort_by(|(a, _), (b, _)| {
            a.iter()
                .zip(b)
                .map(|(x, y)| compare_cells(x, y, false, true))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let (keys, rows) = entries.into_iter().unzip();
        Self { keys, rows }
    }

    fn len(&self) -> usize {
        self.keys.len()
    }

    fn key_columns(&self, names: &[String], sources: &[&Column]) -> Result<Vec<(String, Column)>, AppError> {
        names
            .iter()
            .zip(sources)
            .enumerate()
            .map(|(i, (name, source))| {
                let values = self.keys.iter().map(|key| key[i].clone()).collect();
                Ok((name.clone(), build_column(name, source.dtype(), values)?))
            })
            .collect()
    }
}

fn lookup_columns<'a>(table: &'a Table, key: &str, names: &[String]) -> Result<Vec<&'a Column>, AppError> {
    names
        .iter()
        .map(|name| params::require_column(table, key, name))
        .collect()
}

fn reshape_output(table: &Table, output: Table, groups: usize) -> StepOutput {
    let facts = ReshapeFacts {
        rows_before: table.row_count(),
        rows_after: output.row_count(),
        columns_before: table.column_count(),
        columns_after: output.column_count(),
        groups,
    };
    StepOutput::new(output, StepMetadata::Reshape(facts))
}

fn reduce_error(function: AggFunction, column: &str, reason: String) -> AppError {
    AppError::execution(format!("{} of '{}' failed: {}", function.as_str(), column, reason))
        .with_context("column", column)
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregationSpec {
    column: String,
    function: AggFunction,
    #[serde(default)]
    into: Option<String>,
}

impl AggregationSpec {
    fn output_name(&self) -> String {
        self.into
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.column, self.function.as_str()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregateParams {
    #[serde(default)]
    group_by: Vec<String>,
    aggregations: Vec<AggregationSpec>,
}

pub struct Aggregate;

impl TypedPrimitive for Aggregate {
    type Params = AggregateParams;
    const NAME: &'static str = "aggregate";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Group rows and compute aggregations per group. Output has the group columns followed by one column per aggregation, groups sorted by key with null keys last. Columns not listed are dropped.",
        )
        .param(
            ParamSpec::optional("group_by", ParamKind::Columns, "Grouping columns; empty aggregates the whole table")
                .default_value("[]"),
        )
        .param(ParamSpec::required(
            "aggregations",
            ParamKind::Object,
            "List of {column, function, into?}; functions: sum, mean, median, min, max, count, count_distinct, first, last, std",
        ))
        .example(
            "Total revenue per region",
            json!({"group_by": ["region"], "aggregations": [{"column": "revenue", "function": "sum", "into": "total_revenue"}]}),
        )
        .example(
            "Order count and average basket per customer",
            json!({"group_by": ["customer_id"], "aggregations": [
                {"column": "order_id", "function": "count", "into": "orders"},
                {"column": "amount", "function": "mean", "into": "avg_amount"}
            ]}),
        )
        .example(
            "Distinct products sold per store and month",
            json!({"group_by": ["store", "month"], "aggregations": [{"column": "sku", "function": "count_distinct"}]}),
        )
        .example(
            "Overall min and max price",
            json!({"aggregations": [
                {"column": "price", "function": "min"},
                {"column": "price", "function": "max"}
            ]}),
        )
    }

    fn check(&self, params: &AggregateParams, table: &Table) -> Result<(), AppError> {
        params::require_non_empty("aggregations", &params.aggregations)?;
        params::require_columns(table, "group_by", &params.group_by)?;
        params::require_distinct("group_by", &params.group_by)?;
        for spec in &params.aggregations {
            spec.function.check(table, "aggregations", &spec.column)?;
        }
        let mut names = params.group_by.clone();
        names.extend(params.aggregations.iter().map(AggregationSpec::output_name));
        params::require_distinct("aggregations", &names)
    }

    fn apply(&self, table: &Table, params: AggregateParams) -> Result<StepOutput, AppError> {
        let key_sources = lookup_columns(table, "group_by", &params.group_by)?;
        let groups = if params.group_by.is_empty() {
            // one group over every row, none for an empty table
            let rows: Vec<usize> = (0..table.row_count()).collect();
            Groups {
                keys: if rows.is_empty() { vec![] } else { vec![vec![]] },
                rows: if rows.is_empty() { vec![] } else { vec![rows] },
            }
        } else {
            Groups::build(table, &key_sources)
        };

        let mut columns = groups.key_columns(&params.group_by, &key_sources)?;
        for spec in &params.aggregations {
            let source = params::require_column(table, "aggregations", &spec.column)?;
            let values = groups
                .rows
                .iter()
                .map(|rows| spec.function.reduce(source, rows))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|reason| reduce_error(spec.function, &spec.column, reason))?;
            let name = spec.output_name();
            let column = build_column(&name, spec.function.output_type(source.dtype()), values)?;
            columns.push((name, column));
        }
        let output = Table::new(columns).map_err(|e| e.into_execution())?;
        Ok(reshape_output(table, output, groups.len()))
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PivotTableParams {
    index: OneOrMany,
    columns: String,
    values: String,
    aggfunc: AggFunction,
    #[serde(default)]
    fill_value: Option<JsonValue>,
}

pub struct PivotTable;

impl TypedPrimitive for PivotTable {
    type Params = PivotTableParams;
    const NAME: &'static str = "pivot_table";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Spread the distinct values of one column into new columns (sorted, named by their text form) and fill each cell with an aggregation of the values column. Rows with a null pivot key are skipped.",
        )
        .param(ParamSpec::required("index", ParamKind::Columns, "Columns that identify output rows"))
        .param(ParamSpec::required("columns", ParamKind::Column, "Column whose values become new columns"))
        .param(ParamSpec::required("values", ParamKind::Column, "Column aggregated into the cells"))
        .param(ParamSpec::required("aggfunc", ParamKind::Choice(FUNCTIONS.to_vec()), "Aggregation for each cell"))
        .param(ParamSpec::optional("fill_value", ParamKind::Value, "Value for missing combinations"))
        .example(
            "Monthly revenue per region as columns",
            json!({"index": "region", "columns": "month", "values": "revenue", "aggfunc": "sum", "fill_value": 0}),
        )
        .example(
            "Average score per student and subject",
            json!({"index": ["student"], "columns": "subject", "values": "score", "aggfunc": "mean"}),
        )
        .example(
            "Latest status per ticket and stage",
            json!({"index": ["ticket_id"], "columns": "stage", "values": "status", "aggfunc": "last"}),
        )
    }

    fn check(&self, params: &PivotTableParams, table: &Table) -> Result<(), AppError> {
        let index = params.index.clone().into_vec();
        params::require_non_empty("index", &index)?;
        params::require_columns(table, "index", &index)?;
        params::require_column(table, "columns", &params.columns)?;
        params.aggfunc.check(table, "values", &params.values)?;
        let mut used = index.clone();
        used.push(params.columns.clone());
        used.push(params.values.clone());
        params::require_distinct("index", &used)?;
        if let Some(raw) = &params.fill_value {
            let source = params::require_column(table, "values", &params.values)?;
            params::literal("fill_value", raw, params.aggfunc.output_type(source.dtype()))?;
        }
        Ok(())
    }

    fn apply(&self, table: &Table, params: PivotTableParams) -> Result<StepOutput, AppError> {
        let index = params.index.clone().into_vec();
        let index_sources = lookup_columns(table, "index", &index)?;
        let pivot = params::require_column(table, "columns", &params.columns)?;
        let source = params::require_column(table, "values", &params.values)?;
        let dtype = params.aggfunc.output_type(source.dtype());
        let fill = match &params.fill_value {
            Some(raw) => params::literal("fill_value", raw, dtype)?,
            None => Value::Null,
        };

        let groups = Groups::build(table, &index_sources);
        let mut pivot_keys: Vec<Value> = Vec::new();
        let mut seen: IndexSet<ValueKey> = IndexSet::new();
        for value in pivot.values() {
            if !value.is_null() && seen.insert(value.key()) {
                pivot_keys.push(value.clone());
            }
        }
        pivot_keys.sort_by(|a, b| a.total_cmp(b));
        let key_position: HashMap<ValueKey, usize> = pivot_keys
            .iter()
            .enumerate()
            .map(|(i, v)| (v.key(), i))
            .collect();

        let mut cells: Vec<Vec<Vec<usize>>> = vec![vec![Vec::new(); pivot_keys.len()]; groups.len()];
        for (group, rows) in groups.rows.iter().enumerate() {
            for &row in rows {
                if let Some(&position) = key_position.get(&pivot.get(row).key()) {
                    cells[group][position].push(row);
                }
            }
        }

        let mut columns = groups.key_columns(&index, &index_sources)?;
        for (position, key) in pivot_keys.iter().enumerate() {
            let name = key.to_string();
            if columns.iter().any(|(existing, _)| *existing == name) {
                return Err(AppError::execution(format!(
                    "pivot value '{}' collides with an existing output column",
                    name
                ))
                .with_context("column", params.columns.as_str()));
            }
            let mut values = Vec::with_capacity(groups.len());
            for group_cells in &cells {
                let rows = &group_cells[position];
                let value = if rows.is_empty() {
                    fill.clone()
                } else {
                    params
                        .aggfunc
                        .reduce(source, rows)
                        .map_err(|reason| reduce_error(params.aggfunc, &params.values, reason))?
                };
                values.push(value);
            }
            columns.push((name.clone(), build_column(&name, dtype, values)?));
        }
        let output = Table::new(columns).map_err(|e| e.into_execution())?;
        Ok(reshape_output(table, output, groups.len()))
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnpivotParams {
    #[serde(default)]
    id_columns: Vec<String>,
    value_columns: Vec<String>,
    #[serde(default = "default_var_name")]
    var_name: String,
    #[serde(default = "default_value_name")]
    value_name: String,
    #[serde(default)]
    drop_nulls: bool,
}

fn default_var_name() -> String {
    "variable".to_string()
}

fn default_value_name() -> String {
    "value".to_string()
}

impl UnpivotParams {
    fn value_type(&self, table: &Table) -> Result<DataType, AppError> {
        let mut dtype = DataType::Null;
        for name in &self.value_columns {
            let column = params::require_column(table, "value_columns", name)?;
            dtype = dtype.unify(column.dtype()).ok_or_else(|| {
                AppError::parameter(
                    "value_columns",
                    format!(
                        "column '{}' has type {} which does not combine with {}",
                        name,
                        column.dtype(),
                        dtype
                    ),
                )
            })?;
        }
        Ok(dtype)
    }
}

pub struct Unpivot;

impl TypedPrimitive for Unpivot {
    type Params = UnpivotParams;
    const NAME: &'static str = "unpivot";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Turn value columns into rows of (id columns, variable, value). Rows come out column by column: every row for the first value column, then the next.",
        )
        .param(
            ParamSpec::optional("id_columns", ParamKind::Columns, "Columns repeated on every output row")
                .default_value("[]"),
        )
        .param(ParamSpec::required("value_columns", ParamKind::Columns, "Columns folded into rows"))
        .param(
            ParamSpec::optional("var_name", ParamKind::String, "Name of the column holding former column names")
                .default_value("variable"),
        )
        .param(
            ParamSpec::optional("value_name", ParamKind::String, "Name of the column holding the values")
                .default_value("value"),
        )
        .param(
            ParamSpec::optional("drop_nulls", ParamKind::Boolean, "Skip cells that are null")
                .default_value("false"),
        )
        .example(
            "Turn quarter columns into rows",
            json!({"id_columns": ["product"], "value_columns": ["q1", "q2", "q3", "q4"], "var_name": "quarter", "value_name": "sales"}),
        )
        .example(
            "Long format of survey answers, skipping blanks",
            json!({"id_columns": ["respondent"], "value_columns": ["answer_1", "answer_2"], "drop_nulls": true}),
        )
        .example(
            "Stack min and max temperature",
            json!({"id_columns": ["city", "date"], "value_columns": ["min_temp", "max_temp"], "var_name": "measure"}),
        )
    }

    fn check(&self, params: &UnpivotParams, table: &Table) -> Result<(), AppError> {
        params::require_non_empty("value_columns", &params.value_columns)?;
        params::require_columns(table, "id_columns", &params.id_columns)?;
        let mut all = params.id_columns.clone();
        all.extend(params.value_columns.iter().cloned());
        params::require_distinct("value_columns", &all)?;
        params.value_type(table)?;
        let mut outputs = params.id_columns.clone();
        outputs.push(params.var_name.clone());
        outputs.push(params.value_name.clone());
        params::require_distinct("var_name", &outputs)
    }

    fn apply(&self, table: &Table, params: UnpivotParams) -> Result<StepOutput, AppError> {
        let dtype = params.value_type(table)?;
        let id_sources = lookup_columns(table, "id_columns", &params.id_columns)?;
        let mut picks: Vec<usize> = Vec::new();
        let mut variables: Vec<Value> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        for name in &params.value_columns {
            let column = params::require_column(table, "value_columns", name)?;
            for row in 0..table.row_count() {
                let value = column.get(row);
                if params.drop_nulls && value.is_null() {
                    continue;
                }
                picks.push(row);
                variables.push(Value::str(name.as_str()));
                values.push(value.clone());
            }
        }

        let mut columns: Vec<(String, Column)> = params
            .id_columns
            .iter()
            .zip(&id_sources)
            .map(|(name, source)| (name.clone(), source.take(&picks)))
            .collect();
        columns.push((
            params.var_name.clone(),
            build_column(&params.var_name, DataType::String, variables)?,
        ));
        columns.push((
            params.value_name.clone(),
            build_column(&params.value_name, dtype, values)?,
        ));
        let output = Table::new(columns).map_err(|e| e.into_execution())?;
        Ok(reshape_output(table, output, params.value_columns.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::primitives::testing::{fail, records, run, table};
    use crate::core::types::ErrorCategory;

    fn sales() -> Table {
        table(json!([
            {"region": "west", "month": "feb", "amount": 5},
            {"region": "east", "month": "jan", "amount": 10},
            {"region": "west", "month": "jan", "amount": 3},
            {"region": null, "month": "jan", "amount": 1},
            {"region": "east", "month": "jan", "amount": 4}
        ]))
    }

    #[test]
    fn test_aggregate_sorts_groups_nulls_last() {
        let out = run(
            Aggregate,
            &sales(),
            json!({"group_by": ["region"], "aggregations": [
                {"column": "amount", "function": "sum", "into": "total"},
                {"column": "amount", "function": "count"}
            ]}),
        );
        assert_eq!(
            records(&out.table),
            json!([
                {"region": "east", "total": 14, "amount_count": 2},
                {"region": "west", "total": 8, "amount_count": 2},
                {"region": null, "total": 1, "amount_count": 1}
            ])
        );
        match out.metadata {
            StepMetadata::Reshape(facts) => {
                assert_eq!(facts.groups, 3);
                assert_eq!(facts.rows_before, 5);
                assert_eq!(facts.rows_after, 3);
            }
            other => panic!("unexpected metadata {:?}", other),
        }
    }

    #[test]
    fn test_aggregate_mean_and_std() {
        let input = table(json!([{"g": 1, "v": 2}, {"g": 1, "v": 4}, {"g": 2, "v": 9}]));
        let out = run(
            Aggregate,
            &input,
            json!({"group_by": ["g"], "aggregations": [
                {"column": "v", "function": "mean"},
                {"column": "v", "function": "std"}
            ]}),
        );
        let rows = records(&out.table);
        assert_eq!(rows[0]["v_mean"], json!(3.0));
        assert_eq!(rows[0]["v_std"], json!(std::f64::consts::SQRT_2));
        assert_eq!(rows[1]["v_std"], json!(null));
    }

    #[test]
    fn test_aggregate_numeric_function_on_text_is_parameter_error() {
        let err = fail(
            Aggregate,
            &sales(),
            json!({"group_by": ["region"], "aggregations": [{"column": "month", "function": "sum"}]}),
        );
        assert_eq!(err.category, ErrorCategory::ParameterError);
    }

    #[test]
    fn test_aggregate_float_overflow_is_execution_error() {
        let input = table(json!([
            {"k": "a", "x": 1.7e308},
            {"k": "a", "x": 1.7e308}
        ]));
        let err = fail(
            Aggregate,
            &input,
            json!({"group_by": ["k"], "aggregations": [{"column": "x", "function": "sum"}]}),
        );
        assert_eq!(err.category, ErrorCategory::ExecutionError);
        assert_eq!(err.context.get("column"), Some(&"x".to_string()));

        let err = fail(
            Aggregate,
            &input,
            json!({"group_by": ["k"], "aggregations": [{"column": "x", "function": "mean"}]}),
        );
        assert_eq!(err.category, ErrorCategory::ExecutionError);
    }

    #[test]
    fn test_pivot_float_overflow_is_execution_error() {
        let input = table(json!([
            {"k": "a", "m": "jan", "x": 1.7e308},
            {"k": "a", "m": "jan", "x": 1.7e308}
        ]));
        let err = fail(
            PivotTable,
            &input,
            json!({"index": "k", "columns": "m", "values": "x", "aggfunc": "sum"}),
        );
        assert_eq!(err.category, ErrorCategory::ExecutionError);
    }

    #[test]
    fn test_pivot_fills_missing_combinations() {
        let out = run(
            PivotTable,
            &sales(),
            json!({"index": "region", "columns": "month", "values": "amount", "aggfunc": "sum", "fill_value": 0}),
        );
        assert_eq!(
            records(&out.table),
            json!([
                {"region": "east", "feb": 0, "jan": 14},
                {"region": "west", "feb": 5, "jan": 3},
                {"region": null, "feb": 0, "jan": 1}
            ])
        );
    }

    #[test]
    fn test_unpivot_is_column_major() {
        let input = table(json!([{"id": 1, "a": 10, "b": null}, {"id": 2, "a": 20, "b": 2.5}]));
        let out = run(Unpivot, &input, json!({"id_columns": ["id"], "value_columns": ["a", "b"]}));
        assert_eq!(
            records(&out.table),
            json!([
                {"id": 1, "variable": "a", "value": 10.0},
                {"id": 2, "variable": "a", "value": 20.0},
                {"id": 1, "variable": "b", "value": null},
                {"id": 2, "variable": "b", "value": 2.5}
            ])
        );
        let dropped = run(
            Unpivot,
            &input,
            json!({"id_columns": ["id"], "value_columns": ["a", "b"], "drop_nulls": true}),
        );
        assert_eq!(dropped.table.row_count(), 3);
    }

    #[test]
    fn test_unpivot_mixed_types_is_parameter_error() {
        let err = fail(
            Unpivot,
            &sales(),
            json!({"id_columns": ["region"], "value_columns": ["month", "amount"]}),
        );
        assert_eq!(err.category, ErrorCategory::ParameterError);
    }

    #[test]
    fn test_unpivot_then_pivot_restores_cells() {
        let wide = table(json!([{"k": "x", "a": 1, "b": 2}, {"k": "y", "a": 3, "b": 4}]));
        let long = run(Unpivot, &wide, json!({"id_columns": ["k"], "value_columns": ["a", "b"]}));
        let back = run(
            PivotTable,
            &long.table,
            json!({"index": "k", "columns": "variable", "values": "value", "aggfunc": "first"}),
        );
        assert_eq!(back.table, wide);
    }
}
