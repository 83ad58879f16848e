use super::build_column;
use crate::core::error::AppError;
use crate::core::pipeline::metadata::{ColumnFacts, Rename, StepMetadata};
use crate::core::pipeline::params::{self, default_true};
use crate::core::pipeline::primitive::{
    ParamKind, ParamSpec, PrimitiveDefinition, StepOutput, TypedPrimitive,
};
use crate::core::table::{Column, DataType, Table, Value};
use crate::core::types::PrimitiveCategory;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

const CATEGORY: PrimitiveCategory = PrimitiveCategory::ColumnReshaping;

/// Column-level diff between two tables; renamed pairs are not counted as added/removed.
fn column_output(before: &Table, after: Table, renamed: Vec<Rename>) -> StepOutput {
    let added = after
        .column_names()
        .into_iter()
        .filter(|name| !before.has_column(name) && !renamed.iter().any(|r| r.to == *name))
        .map(str::to_string)
        .collect();
    let removed = before
        .column_names()
        .into_iter()
        .filter(|name| !after.has_column(name) && !renamed.iter().any(|r| r.from == *name))
        .map(str::to_string)
        .collect();
    let facts = ColumnFacts {
        added,
        removed,
        renamed,
        columns_after: after.column_names().into_iter().map(str::to_string).collect(),
    };
    StepOutput::new(after, StepMetadata::Columns(facts))
}

fn entries(table: &Table) -> Vec<(String, Column)> {
    table
        .columns()
        .map(|(name, column)| (name.clone(), column.clone()))
        .collect()
}

fn rebuild(table: &Table, entries: Vec<(String, Column)>) -> Result<Table, AppError> {
    Table::with_row_count(entries, table.row_count()).map_err(|e| e.into_execution())
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnListParams {
    columns: Vec<String>,
}

pub struct SelectColumns;

impl TypedPrimitive for SelectColumns {
    type Params = ColumnListParams;
    const NAME: &'static str = "select_columns";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Keep only the listed columns, in the listed order.",
        )
        .param(ParamSpec::required("columns", ParamKind::Columns, "Columns to keep"))
        .example(
            "Only keep the name and email columns",
            json!({"columns": ["name", "email"]}),
        )
        .example(
            "Reorder columns to id, date, amount",
            json!({"columns": ["id", "date", "amount"]}),
        )
        .example("I just need the sku column", json!({"columns": ["sku"]}))
    }

    fn check(&self, params: &ColumnListParams, table: &Table) -> Result<(), AppError> {
        params::require_non_empty("columns", &params.columns)?;
        params::require_distinct("columns", &params.columns)?;
        params::require_columns(table, "columns", &params.columns)
    }

    fn apply(&self, table: &Table, params: ColumnListParams) -> Result<StepOutput, AppError> {
        let output = table.select(&params.columns).map_err(|e| e.into_execution())?;
        Ok(column_output(table, output, Vec::new()))
    }
}

pub struct DropColumns;

impl TypedPrimitive for DropColumns {
    type Params = ColumnListParams;
    const NAME: &'static str = "drop_columns";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(Self::NAME, CATEGORY, "Remove the listed columns.")
            .param(ParamSpec::required("columns", ParamKind::Columns, "Columns to remove"))
            .example("Delete the notes column", json!({"columns": ["notes"]}))
            .example(
                "Drop the internal id and created_by fields",
                json!({"columns": ["internal_id", "created_by"]}),
            )
            .example(
                "Get rid of the temporary helper columns",
                json!({"columns": ["tmp_1", "tmp_2"]}),
            )
    }

    fn check(&self, params: &ColumnListParams, table: &Table) -> Result<(), AppError> {
        params::require_non_empty("columns", &params.columns)?;
        params::require_columns(table, "columns", &params.columns)
    }

    fn apply(&self, table: &Table, params: ColumnListParams) -> Result<StepOutput, AppError> {
        let output = table.without_columns(&params.columns);
        Ok(column_output(table, output, Vec::new()))
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenameColumnsParams {
    mapping: IndexMap<String, String>,
}

pub struct RenameColumns;

impl TypedPrimitive for RenameColumns {
    type Params = RenameColumnsParams;
    const NAME: &'static str = "rename_columns";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Rename columns. All renames apply at once, so names can be swapped.",
        )
        .param(ParamSpec::required(
            "mapping",
            ParamKind::Mapping,
            "Old name to new name",
        ))
        .example(
            "Rename cust_nm to customer_name",
            json!({"mapping": {"cust_nm": "customer_name"}}),
        )
        .example(
            "Call the columns first and last instead of fname and lname",
            json!({"mapping": {"fname": "first", "lname": "last"}}),
        )
        .example(
            "Swap the labels of columns a and b",
            json!({"mapping": {"a": "b", "b": "a"}}),
        )
    }

    fn check(&self, params: &RenameColumnsParams, table: &Table) -> Result<(), AppError> {
        if params.mapping.is_empty() {
            return Err(AppError::parameter("mapping", "must contain at least one entry"));
        }
        let targets: Vec<String> = params.mapping.values().cloned().collect();
        params::require_distinct("mapping", &targets)?;
        for (from, to) in &params.mapping {
            params::require_column(table, "mapping", from)?;
            if to.trim().is_empty() {
                return Err(AppError::parameter("mapping", format!("new name for '{}' is empty", from)));
            }
            if table.has_column(to) && !params.mapping.contains_key(to) {
                return Err(AppError::parameter(
                    "mapping",
                    format!("cannot rename '{}' to '{}': column already exists", from, to),
                ));
            }
        }
        Ok(())
    }

    fn apply(&self, table: &Table, params: RenameColumnsParams) -> Result<StepOutput, AppError> {
        let renamed_entries = table
            .columns()
            .map(|(name, column)| {
                let target = params.mapping.get(name).unwrap_or(name);
                (target.clone(), column.clone())
            })
            .collect();
        let output = rebuild(table, renamed_entries)?;
        let renamed = params
            .mapping
            .iter()
            .filter(|(from, to)| from != to)
            .map(|(from, to)| Rename {
                from: from.clone(),
                to: to.clone(),
            })
            .collect();
        Ok(column_output(table, output, renamed))
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SplitColumnParams {
    column: String,
    delimiter: String,
    into: Vec<String>,
    #[serde(default)]
    keep_original: bool,
}

pub struct SplitColumn;

impl TypedPrimitive for SplitColumn {
    type Params = SplitColumnParams;
    const NAME: &'static str = "split_column";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Split a text column on a delimiter into several columns. The last column keeps any remainder; missing parts are null.",
        )
        .param(ParamSpec::required("column", ParamKind::Column, "Text column to split"))
        .param(ParamSpec::required("delimiter", ParamKind::String, "Separator text"))
        .param(ParamSpec::required("into", ParamKind::Columns, "Names of the new columns"))
        .param(
            ParamSpec::optional("keep_original", ParamKind::Boolean, "Keep the source column")
                .default_value("false"),
        )
        .example(
            "Split full_name into first and last name",
            json!({"column": "full_name", "delimiter": " ", "into": ["first_name", "last_name"]}),
        )
        .example(
            "Break the address on commas into street, city and state",
            json!({"column": "address", "delimiter": ",", "into": ["street", "city", "state"]}),
        )
        .example(
            "Split the sku at the dash into prefix and number but keep the sku",
            json!({"column": "sku", "delimiter": "-", "into": ["sku_prefix", "sku_number"], "keep_original": true}),
        )
    }

    fn check(&self, params: &SplitColumnParams, table: &Table) -> Result<(), AppError> {
        params::require_string(table, "column", &params.column)?;
        if params.delimiter.is_empty() {
            return Err(AppError::parameter("delimiter", "must not be empty"));
        }
        params::require_non_empty("into", &params.into)?;
        params::require_distinct("into", &params.into)?;
        let replaces = (!params.keep_original).then_some(params.column.as_str());
        for name in &params.into {
            params::require_output_name(table, "into", name, replaces)?;
        }
        Ok(())
    }

    fn apply(&self, table: &Table, params: SplitColumnParams) -> Result<StepOutput, AppError> {
        let source = params::require_column(table, "column", &params.column)?;
        let parts = params.into.len();
        let mut split: Vec<Vec<Value>> = vec![Vec::with_capacity(table.row_count()); parts];
        for value in source.values() {
            let pieces: Vec<&str> = match value.as_str() {
                Some(text) => text.splitn(parts, params.delimiter.as_str()).collect(),
                None => Vec::new(),
            };
            for (index, slot) in split.iter_mut().enumerate() {
                slot.push(pieces.get(index).map(|p| Value::str(*p)).unwrap_or(Value::Null));
            }
        }

        let position = table.column_index(&params.column).unwrap_or(0);
        let mut columns = entries(table);
        let insert_at = if params.keep_original {
            position + 1
        } else {
            columns.remove(position);
            position
        };
        for (offset, (name, values)) in params.into.iter().zip(split).enumerate() {
            let column = build_column(name, DataType::String, values)?;
            columns.insert(insert_at + offset, (name.clone(), column));
        }
        let output = rebuild(table, columns)?;
        Ok(column_output(table, output, Vec::new()))
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeColumnsParams {
    columns: Vec<String>,
    into: String,
    #[serde(default)]
    separator: String,
    #[serde(default = "default_true")]
    skip_nulls: bool,
    #[serde(default = "default_true")]
    keep_original: bool,
}

pub struct MergeColumns;

impl TypedPrimitive for MergeColumns {
    type Params = MergeColumnsParams;
    const NAME: &'static str = "merge_columns";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Concatenate the text form of several columns into one string column. Without skip_nulls any null part makes the result null.",
        )
        .param(ParamSpec::required("columns", ParamKind::Columns, "Columns to join, in order"))
        .param(ParamSpec::required("into", ParamKind::Column, "Name of the merged column"))
        .param(
            ParamSpec::optional("separator", ParamKind::String, "Text placed between parts")
                .default_value("\"\""),
        )
        .param(
            ParamSpec::optional("skip_nulls", ParamKind::Boolean, "Leave out null parts")
                .default_value("true"),
        )
        .param(
            ParamSpec::optional("keep_original", ParamKind::Boolean, "Keep the source columns")
                .default_value("true"),
        )
        .example(
            "Combine first and last name into full_name with a space",
            json!({"columns": ["first_name", "last_name"], "into": "full_name", "separator": " "}),
        )
        .example(
            "Join city, state and zip into one address field and drop the parts",
            json!({"columns": ["city", "state", "zip"], "into": "location", "separator": ", ", "keep_original": false}),
        )
        .example(
            "Build a key from year and month",
            json!({"columns": ["year", "month"], "into": "period", "separator": "-"}),
        )
    }

    fn check(&self, params: &MergeColumnsParams, table: &Table) -> Result<(), AppError> {
        params::require_non_empty("columns", &params.columns)?;
        params::require_distinct("columns", &params.columns)?;
        params::require_columns(table, "columns", &params.columns)?;
        let replaces = if !params.keep_original && params.columns.contains(&params.into) {
            Some(params.into.as_str())
        } else {
            None
        };
        params::require_output_name(table, "into", &params.into, replaces)
    }

    fn apply(&self, table: &Table, params: MergeColumnsParams) -> Result<StepOutput, AppError> {
        let sources: Vec<&Column> = params
            .columns
            .iter()
            .map(|name| params::require_column(table, "columns", name))
            .collect::<Result<_, _>>()?;
        let mut merged = Vec::with_capacity(table.row_count());
        for row in 0..table.row_count() {
            let cells: Vec<&Value> = sources.iter().map(|c| c.get(row)).collect();
            let value = if params.skip_nulls {
                let parts: Vec<String> = cells
                    .iter()
                    .filter(|v| !v.is_null())
                    .map(|v| v.to_string())
                    .collect();
                if parts.is_empty() {
                    Value::Null
                } else {
                    Value::Str(parts.join(&params.separator))
                }
            } else if cells.iter().any(|v| v.is_null()) {
                Value::Null
            } else {
                Value::Str(
                    cells
                        .iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join(&params.separator),
                )
            };
            merged.push(value);
        }
        let column = build_column(&params.into, DataType::String, merged)?;

        let output = if params.keep_original {
            super::put_column(table, &params.into, column)?
        } else {
            let position = params
                .columns
                .iter()
                .filter_map(|name| table.column_index(name))
                .min()
                .unwrap_or(0);
            let mut columns = entries(table);
            columns.insert(position, (params.into.clone(), column));
            let mut seen_merged = false;
            columns.retain(|(name, _)| {
                if *name == params.into && !seen_merged {
                    seen_merged = true;
                    return true;
                }
                !params.columns.contains(name)
            });
            rebuild(table, columns)?
        };
        Ok(column_output(table, output, Vec::new()))
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddConstantColumnParams {
    name: String,
    value: JsonValue,
}

pub struct AddConstantColumn;

impl TypedPrimitive for AddConstantColumn {
    type Params = AddConstantColumnParams;
    const NAME: &'static str = "add_constant_column";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Append a column holding the same value on every row.",
        )
        .param(ParamSpec::required("name", ParamKind::Column, "Name of the new column"))
        .param(ParamSpec::required("value", ParamKind::Value, "Value for every row"))
        .example(
            "Add a source column set to 'crm'",
            json!({"name": "source", "value": "crm"}),
        )
        .example(
            "Tag every row with batch number 7",
            json!({"name": "batch", "value": 7}),
        )
        .example(
            "Add an is_active flag that is true everywhere",
            json!({"name": "is_active", "value": true}),
        )
    }

    fn check(&self, params: &AddConstantColumnParams, table: &Table) -> Result<(), AppError> {
        params::require_output_name(table, "name", &params.name, None)?;
        Value::from_json(&params.value)
            .map(|_| ())
            .map_err(|reason| AppError::parameter("value", reason))
    }

    fn apply(&self, table: &Table, params: AddConstantColumnParams) -> Result<StepOutput, AppError> {
        let value =
            Value::from_json(&params.value).map_err(|reason| AppError::parameter("value", reason))?;
        let dtype = value.dtype();
        let column = build_column(&params.name, dtype, vec![value; table.row_count()])?;
        let output = super::put_column(table, &params.name, column)?;
        Ok(column_output(table, output, Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::primitives::testing::{fail, records, run, table};
    use crate::core::types::ErrorCategory;

    fn people() -> Table {
        table(json!([
            {"id": 1, "full_name": "Ada Lovelace", "city": "London"},
            {"id": 2, "full_name": "Grace", "city": null},
            {"id": 3, "full_name": null, "city": "Paris"}
        ]))
    }

    #[test]
    fn test_select_reorders() {
        let out = run(SelectColumns, &people(), json!({"columns": ["city", "id"]}));
        assert_eq!(out.table.column_names(), vec!["city", "id"]);
        match out.metadata {
            StepMetadata::Columns(facts) => assert_eq!(facts.removed, vec!["full_name"]),
            other => panic!("unexpected metadata {:?}", other),
        }
    }

    #[test]
    fn test_drop_unknown_column_fails() {
        let err = fail(DropColumns, &people(), json!({"columns": ["nope"]}));
        assert_eq!(err.category, ErrorCategory::ParameterError);
    }

    #[test]
    fn test_rename_swap_is_simultaneous() {
        let out = run(
            RenameColumns,
            &people(),
            json!({"mapping": {"id": "city", "city": "id"}}),
        );
        assert_eq!(out.table.column_names(), vec!["city", "full_name", "id"]);
        assert_eq!(out.table.cell("city", 0), Some(&Value::Int(1)));
    }

    #[test]
    fn test_rename_onto_existing_column_fails() {
        let err = fail(RenameColumns, &people(), json!({"mapping": {"id": "city"}}));
        assert_eq!(err.category, ErrorCategory::ParameterError);
    }

    #[test]
    fn test_split_places_parts_at_source_position() {
        let out = run(
            SplitColumn,
            &people(),
            json!({"column": "full_name", "delimiter": " ", "into": ["first", "last"]}),
        );
        assert_eq!(out.table.column_names(), vec!["id", "first", "last", "city"]);
        let rows = records(&out.table);
        assert_eq!(rows[0]["last"], json!("Lovelace"));
        assert_eq!(rows[1]["last"], json!(null));
        assert_eq!(rows[2]["first"], json!(null));
    }

    #[test]
    fn test_merge_skips_nulls() {
        let out = run(
            MergeColumns,
            &people(),
            json!({"columns": ["full_name", "city"], "into": "label", "separator": " / "}),
        );
        let rows = records(&out.table);
        assert_eq!(rows[0]["label"], json!("Ada Lovelace / London"));
        assert_eq!(rows[1]["label"], json!("Grace"));
    }

    #[test]
    fn test_merge_without_keep_original_replaces_sources() {
        let out = run(
            MergeColumns,
            &people(),
            json!({"columns": ["full_name", "city"], "into": "label", "keep_original": false, "skip_nulls": false}),
        );
        assert_eq!(out.table.column_names(), vec!["id", "label"]);
        assert_eq!(records(&out.table)[1]["label"], json!(null));
    }

    #[test]
    fn test_add_constant_column() {
        let out = run(AddConstantColumn, &people(), json!({"name": "batch", "value": 7}));
        assert_eq!(out.table.column("batch").unwrap().dtype(), DataType::Integer);
        assert_eq!(out.table.cell("batch", 2), Some(&Value::Int(7)));
    }
}
