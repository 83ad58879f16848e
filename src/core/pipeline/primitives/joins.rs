use super::build_column;
use crate::core::error::AppError;
use crate::core::pipeline::metadata::{JoinFacts, StepMetadata};
use crate::core::pipeline::params;
use crate::core::pipeline::primitive::{
    ParamKind, ParamSpec, PrimitiveDefinition, StepOutput, TypedPrimitive,
};
use crate::core::table::{Column, DataType, Table, Value, ValueKey};
use crate::core::types::PrimitiveCategory;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

const CATEGORY: PrimitiveCategory = PrimitiveCategory::Joins;

/// Right-table rows by key. Rows with any null key cell are left out so they never match.
fn index_rows(columns: &[&Column], rows: usize) -> IndexMap<Vec<ValueKey>, Vec<usize>> {
    let mut index: IndexMap<Vec<ValueKey>, Vec<usize>> = IndexMap::new();
    for row in 0..rows {
        if columns.iter().any(|c| c.get(row).is_null()) {
            continue;
        }
        let key = columns.iter().map(|c| c.get(row).key()).collect();
        index.entry(key).or_default().push(row);
    }
    index
}

fn row_key(columns: &[&Column], row: usize) -> Option<Vec<ValueKey>> {
    if columns.iter().any(|c| c.get(row).is_null()) {
        return None;
    }
    Some(columns.iter().map(|c| c.get(row).key()).collect())
}

fn key_types_match(left: DataType, right: DataType) -> bool {
    left.unify(right).is_some()
}

fn join_output(output: Table, facts: JoinFacts) -> StepOutput {
    StepOutput::new(output, StepMetadata::Join(facts))
}

// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum JoinKey {
    Same(String),
    Pair { left: String, right: String },
}

impl JoinKey {
    fn left(&self) -> &str {
        match self {
            JoinKey::Same(name) => name,
            JoinKey::Pair { left, .. } => left,
        }
    }

    fn right(&self) -> &str {
        match self {
            JoinKey::Same(name) => name,
            JoinKey::Pair { right, .. } => right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinHow {
    Inner,
    Left,
    Right,
    Outer,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinTablesParams {
    right: Table,
    on: Vec<JoinKey>,
    how: JoinHow,
    #[serde(default = "default_suffix")]
    suffix: String,
}

fn default_suffix() -> String {
    "_right".to_string()
}

/// Where each output column of a join comes from.
enum Slot<'a> {
    Left(&'a Column),
    /// Key column shared by both sides; unmatched right rows take the right value.
    Merged(&'a Column, &'a Column),
    Right(&'a Column),
}

impl JoinTablesParams {
    fn layout<'a>(&'a self, table: &'a Table) -> Result<Vec<(String, Slot<'a>)>, AppError> {
        let merged: HashMap<&str, &str> = self
            .on
            .iter()
            .filter(|key| key.left() == key.right())
            .map(|key| (key.left(), key.right()))
            .collect();
        let mut layout = Vec::new();
        for (name, column) in table.columns() {
            let slot = match merged.get(name.as_str()) {
                Some(right) => Slot::Merged(column, params::require_column(&self.right, "on", right)?),
                None => Slot::Left(column),
            };
            layout.push((name.clone(), slot));
        }
        for (name, column) in self.right.columns() {
            if merged.contains_key(name.as_str()) {
                continue;
            }
            let output = if table.has_column(name) {
                format!("{}{}", name, self.suffix)
            } else {
                name.clone()
            };
            if layout.iter().any(|(existing, _)| *existing == output) {
                return Err(AppError::parameter(
                    "suffix",
                    format!("right column '{}' would be written as '{}', which already exists", name, output),
                ));
            }
            layout.push((output, Slot::Right(column)));
        }
        Ok(layout)
    }
}

pub struct JoinTables;

impl TypedPrimitive for JoinTables {
    type Params = JoinTablesParams;
    const NAME: &'static str = "join_tables";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Join the current table with another table on key columns. Null keys never match. Right columns that clash with left names get the suffix; keys with the same name on both sides appear once.",
        )
        .param(ParamSpec::required("right", ParamKind::Table, "Table to join with"))
        .param(ParamSpec::required(
            "on",
            ParamKind::Object,
            "Key pairs: a column name shared by both tables, or {left, right}",
        ))
        .param(ParamSpec::required(
            "how",
            ParamKind::Choice(vec!["inner", "left", "right", "outer"]),
            "Which unmatched rows to keep",
        ))
        .param(
            ParamSpec::optional("suffix", ParamKind::String, "Suffix for clashing right column names")
                .default_value("_right"),
        )
        .example(
            "Attach customer details to orders",
            json!({"right": [{"customer_id": 1, "name": "Ann"}], "on": ["customer_id"], "how": "left"}),
        )
        .example(
            "Keep only orders with a known product",
            json!({"right": [{"sku": "A1", "title": "Lamp"}], "on": [{"left": "product_sku", "right": "sku"}], "how": "inner"}),
        )
        .example(
            "Full outer join of this year's and last year's totals",
            json!({"right": [{"region": "west", "total": 10}], "on": ["region"], "how": "outer", "suffix": "_last_year"}),
        )
    }

    fn check(&self, params: &JoinTablesParams, table: &Table) -> Result<(), AppError> {
        params::require_non_empty("on", &params.on)?;
        for key in &params.on {
            let left = params::require_column(table, "on", key.left())?;
            let right = params::require_column(&params.right, "on", key.right())?;
            if !key_types_match(left.dtype(), right.dtype()) {
                return Err(AppError::parameter(
                    "on",
                    format!(
                        "key '{}' is {} but right key '{}' is {}",
                        key.left(),
                        left.dtype(),
                        key.right(),
                        right.dtype()
                    ),
                ));
            }
        }
        let lefts: Vec<String> = params.on.iter().map(|k| k.left().to_string()).collect();
        params::require_distinct("on", &lefts)?;
        params.layout(table).map(|_| ())
    }

    fn apply(&self, table: &Table, params: JoinTablesParams) -> Result<StepOutput, AppError> {
        let left_keys = params
            .on
            .iter()
            .map(|k| params::require_column(table, "on", k.left()))
            .collect::<Result<Vec<_>, _>>()?;
        let right_keys = params
            .on
            .iter()
            .map(|k| params::require_column(&params.right, "on", k.right()))
            .collect::<Result<Vec<_>, _>>()?;
        let index = index_rows(&right_keys, params.right.row_count());

        let mut pairs: Vec<(Option<usize>, Option<usize>)> = Vec::new();
        let mut right_matched = vec![false; params.right.row_count()];
        let mut unmatched_left = 0;
        for row in 0..table.row_count() {
            let matches = row_key(&left_keys, row).and_then(|key| index.get(&key));
            match matches {
                Some(rows) => {
                    for &r in rows {
                        right_matched[r] = true;
                        pairs.push((Some(row), Some(r)));
                    }
                }
                None => {
                    unmatched_left += 1;
                    if matches!(params.how, JoinHow::Left | JoinHow::Outer) {
                        pairs.push((Some(row), None));
                    }
                }
            }
        }
        let matched_rows = pairs.iter().filter(|(l, r)| l.is_some() && r.is_some()).count();
        let unmatched_right = right_matched.iter().filter(|m| !**m).count();
        if matches!(params.how, JoinHow::Right | JoinHow::Outer) {
            for (r, matched) in right_matched.iter().enumerate() {
                if !matched {
                    pairs.push((None, Some(r)));
                }
            }
        }

        let left_rows: Vec<Option<usize>> = pairs.iter().map(|(l, _)| *l).collect();
        let right_rows: Vec<Option<usize>> = pairs.iter().map(|(_, r)| *r).collect();
        let mut columns = Vec::new();
        for (name, slot) in params.layout(table)? {
            let column = match slot {
                Slot::Left(column) => column.take_optional(&left_rows),
                Slot::Right(column) => column.take_optional(&right_rows),
                Slot::Merged(left, right) => {
                    let dtype = left.dtype().unify(right.dtype()).unwrap_or(left.dtype());
                    let values = pairs
                        .iter()
                        .map(|pair| match pair {
                            (Some(l), _) => left.get(*l).clone(),
                            (None, Some(r)) => right.get(*r).clone(),
                            (None, None) => Value::Null,
                        })
                        .collect();
                    build_column(&name, dtype, values)?
                }
            };
            columns.push((name, column));
        }
        let output = Table::with_row_count(columns, pairs.len()).map_err(|e| e.into_execution())?;
        let facts = JoinFacts {
            left_rows: table.row_count(),
            right_rows: params.right.row_count(),
            matched_rows,
            unmatched_left,
            unmatched_right,
            rows_after: output.row_count(),
        };
        Ok(join_output(output, facts))
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupHow {
    Left,
    Inner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDuplicate {
    #[default]
    Fail,
    First,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LookupParams {
    right: Table,
    left_on: String,
    right_on: String,
    columns: Vec<String>,
    how: LookupHow,
    #[serde(default)]
    on_duplicate: OnDuplicate,
}

pub struct Lookup;

impl TypedPrimitive for Lookup {
    type Params = LookupParams;
    const NAME: &'static str = "lookup";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Bring columns from a reference table by matching one key. Each row matches at most one reference row; duplicate reference keys fail unless on_duplicate is first.",
        )
        .param(ParamSpec::required("right", ParamKind::Table, "Reference table"))
        .param(ParamSpec::required("left_on", ParamKind::Column, "Key column in the current table"))
        .param(ParamSpec::required("right_on", ParamKind::Column, "Key column in the reference table"))
        .param(ParamSpec::required("columns", ParamKind::Columns, "Reference columns to bring over"))
        .param(ParamSpec::required(
            "how",
            ParamKind::Choice(vec!["left", "inner"]),
            "Keep (left) or drop (inner) rows without a match",
        ))
        .param(
            ParamSpec::optional(
                "on_duplicate",
                ParamKind::Choice(vec!["fail", "first"]),
                "What to do when a reference key repeats",
            )
            .default_value("fail"),
        )
        .example(
            "Look up the country name for each country code",
            json!({"right": [{"code": "FR", "country": "France"}], "left_on": "country_code", "right_on": "code", "columns": ["country"], "how": "left"}),
        )
        .example(
            "Add list price from the price sheet, dropping unknown products",
            json!({"right": [{"sku": "A1", "list_price": 9.5}], "left_on": "sku", "right_on": "sku", "columns": ["list_price"], "how": "inner"}),
        )
        .example(
            "Attach manager names, taking the first entry for repeated ids",
            json!({"right": [{"id": 7, "manager": "Lee"}], "left_on": "manager_id", "right_on": "id", "columns": ["manager"], "how": "left", "on_duplicate": "first"}),
        )
    }

    fn check(&self, params: &LookupParams, table: &Table) -> Result<(), AppError> {
        let left = params::require_column(table, "left_on", &params.left_on)?;
        let right = params::require_column(&params.right, "right_on", &params.right_on)?;
        if !key_types_match(left.dtype(), right.dtype()) {
            return Err(AppError::parameter(
                "right_on",
                format!("key types differ: {} and {}", left.dtype(), right.dtype()),
            ));
        }
        params::require_non_empty("columns", &params.columns)?;
        params::require_distinct("columns", &params.columns)?;
        params::require_columns(&params.right, "columns", &params.columns)?;
        for name in &params.columns {
            params::require_output_name(table, "columns", name, None)?;
        }
        Ok(())
    }

    fn apply(&self, table: &Table, params: LookupParams) -> Result<StepOutput, AppError> {
        let left_key = params::require_column(table, "left_on", &params.left_on)?;
        let right_key = params::require_column(&params.right, "right_on", &params.right_on)?;
        let index = index_rows(&[right_key], params.right.row_count());
        if params.on_duplicate == OnDuplicate::Fail {
            if let Some((_, rows)) = index.iter().find(|(_, rows)| rows.len() > 1) {
                let key = right_key.get(rows[0]);
                return Err(AppError::execution(format!(
                    "reference key '{}' appears {} times in '{}'",
                    key,
                    rows.len(),
                    params.right_on
                ))
                .with_context("column", params.right_on.as_str())
                .with_context("value", key.to_string())
                .with_suggestion("Deduplicate the reference table or set on_duplicate to first"));
            }
        }

        let mut kept: Vec<usize> = Vec::new();
        let mut picks: Vec<Option<usize>> = Vec::new();
        let mut right_matched = vec![false; params.right.row_count()];
        for row in 0..table.row_count() {
            let hit = row_key(&[left_key], row)
                .and_then(|key| index.get(&key))
                .and_then(|rows| rows.first().copied());
            if let Some(r) = hit {
                right_matched[r] = true;
            }
            if hit.is_some() || params.how == LookupHow::Left {
                kept.push(row);
                picks.push(hit);
            }
        }
        let matched_rows = picks.iter().filter(|p| p.is_some()).count();
        let mut output = table.take_rows(&kept);
        for name in &params.columns {
            let source = params::require_column(&params.right, "columns", name)?;
            output = output
                .with_column(name, source.take_optional(&picks))
                .map_err(|e| e.into_execution())?;
        }
        let facts = JoinFacts {
            left_rows: table.row_count(),
            right_rows: params.right.row_count(),
            matched_rows,
            unmatched_left: table.row_count() - matched_rows,
            unmatched_right: right_matched.iter().filter(|m| !**m).count(),
            rows_after: output.row_count(),
        };
        Ok(join_output(output, facts))
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnMismatch {
    Fail,
    AlignByName,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnionTablesParams {
    tables: Vec<Table>,
    on_mismatch: OnMismatch,
    #[serde(default)]
    source_column: Option<String>,
}

pub struct UnionTables;

impl TypedPrimitive for UnionTables {
    type Params = UnionTablesParams;
    const NAME: &'static str = "union_tables";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Append the rows of other tables below the current one. Integer and float columns combine into float; other type conflicts fail. The optional source column numbers each row's table, 0 for the current one.",
        )
        .param(ParamSpec::required("tables", ParamKind::Tables, "Tables to append, in order"))
        .param(ParamSpec::required(
            "on_mismatch",
            ParamKind::Choice(vec!["fail", "align_by_name"]),
            "Require identical columns, or align by name and fill gaps with null",
        ))
        .param(ParamSpec::optional("source_column", ParamKind::Column, "Column recording which table a row came from"))
        .example(
            "Stack February orders under January's",
            json!({"tables": [[{"order_id": 9, "amount": 12.5}]], "on_mismatch": "fail"}),
        )
        .example(
            "Combine exports whose columns differ",
            json!({"tables": [[{"id": 1, "email": "a@x.io"}]], "on_mismatch": "align_by_name"}),
        )
        .example(
            "Union regional files and remember the source",
            json!({"tables": [[{"id": 2}], [{"id": 3}]], "on_mismatch": "align_by_name", "source_column": "source"}),
        )
    }

    fn check(&self, params: &UnionTablesParams, table: &Table) -> Result<(), AppError> {
        params::require_non_empty("tables", &params.tables)?;
        if params.on_mismatch == OnMismatch::Fail {
            let expected = table.column_names();
            for (i, other) in params.tables.iter().enumerate() {
                if other.column_names() != expected {
                    return Err(AppError::parameter(
                        "tables",
                        format!(
                            "table {} has columns [{}] but the current table has [{}]",
                            i + 1,
                            other.column_names().join(", "),
                            expected.join(", ")
                        ),
                    )
                    .with_suggestion("Use on_mismatch: align_by_name to union by column name"));
                }
            }
        }
        if let Some(name) = &params.source_column {
            let taken = table.has_column(name) || params.tables.iter().any(|t| t.has_column(name));
            if taken {
                return Err(AppError::parameter(
                    "source_column",
                    format!("column '{}' already exists", name),
                ));
            }
        }
        Ok(())
    }

    fn apply(&self, table: &Table, params: UnionTablesParams) -> Result<StepOutput, AppError> {
        let parts: Vec<&Table> = std::iter::once(table).chain(params.tables.iter()).collect();
        let mut names: Vec<String> = Vec::new();
        for part in &parts {
            for name in part.column_names() {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }

        let mut columns = Vec::with_capacity(names.len() + 1);
        for name in &names {
            let mut dtype = DataType::Null;
            for part in &parts {
                if let Some(column) = part.column(name) {
                    dtype = dtype.unify(column.dtype()).ok_or_else(|| {
                        AppError::execution(format!(
                            "column '{}' is {} in one table and {} in another",
                            name,
                            dtype,
                            column.dtype()
                        ))
                        .with_context("column", name.as_str())
                    })?;
                }
            }
            let mut values = Vec::new();
            for part in &parts {
                match part.column(name) {
                    Some(column) => values.extend(column.values().iter().cloned()),
                    None => values.extend(std::iter::repeat(Value::Null).take(part.row_count())),
                }
            }
            columns.push((name.clone(), build_column(name, dtype, values)?));
        }
        if let Some(name) = &params.source_column {
            let values = parts
                .iter()
                .enumerate()
                .flat_map(|(i, part)| std::iter::repeat(Value::Int(i as i64)).take(part.row_count()))
                .collect();
            columns.push((name.clone(), build_column(name, DataType::Integer, values)?));
        }
        let total: usize = parts.iter().map(|p| p.row_count()).sum();
        let output = Table::with_row_count(columns, total).map_err(|e| e.into_execution())?;
        let facts = JoinFacts {
            left_rows: table.row_count(),
            right_rows: total - table.row_count(),
            matched_rows: 0,
            unmatched_left: 0,
            unmatched_right: 0,
            rows_after: output.row_count(),
        };
        Ok(join_output(output, facts))
    }
}
