use super::compare_cells;
use crate::core::error::AppError;
use crate::core::pipeline::metadata::{RowFacts, StepMetadata};
use crate::core::pipeline::params::{self, default_true};
use crate::core::pipeline::primitive::{
    ParamKind, ParamSpec, PrimitiveDefinition, StepOutput, TypedPrimitive,
};
use crate::core::table::{Table, Value, ValueKey};
use crate::core::types::PrimitiveCategory;
use rand::rngs::StdRng;
use rand::SeedableRng;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;

const CATEGORY: PrimitiveCategory = PrimitiveCategory::RowSelection;

fn rows_output(table: &Table, kept: &[usize]) -> StepOutput {
    let output = table.take_rows(kept);
    let facts = RowFacts::new(table.row_count(), output.row_count());
    StepOutput::new(output, StepMetadata::Rows(facts))
}

// ---------------------------------------------------------------------------
// filter_rows

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    Contains,
    StartsWith,
    EndsWith,
    Matches,
    In,
    NotIn,
    IsNull,
    NotNull,
}

impl FilterOperator {
    fn is_text(self) -> bool {
        matches!(
            self,
            FilterOperator::Contains
                | FilterOperator::StartsWith
                | FilterOperator::EndsWith
                | FilterOperator::Matches
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterRowsParams {
    column: String,
    operator: FilterOperator,
    #[serde(default)]
    value: Option<JsonValue>,
    #[serde(default = "default_true")]
    case_sensitive: bool,
}

enum Matcher {
    IsNull,
    NotNull,
    Compare(FilterOperator, Value),
    Set { members: Vec<ValueKey>, negate: bool },
    Text(FilterOperator, String),
    Pattern(Regex),
}

struct Predicate {
    matcher: Matcher,
    case_sensitive: bool,
}

impl Predicate {
    fn compile(params: &FilterRowsParams, table: &Table) -> Result<Self, AppError> {
        let column = params::require_column(table, "column", &params.column)?;
        let dtype = column.dtype();
        if params.operator.is_text() {
            params::require_string(table, "column", &params.column)?;
        }
        let op = params.operator;
        let fold = |v: Value| fold_case(v, params.case_sensitive);
        let matcher = match op {
            FilterOperator::IsNull | FilterOperator::NotNull => {
                if params.value.is_some() {
                    return Err(AppError::parameter(
                        "value",
                        "must be omitted for is_null and not_null",
                    ));
                }
                if op == FilterOperator::IsNull {
                    Matcher::IsNull
                } else {
                    Matcher::NotNull
                }
            }
            _ => {
                let raw = params.value.as_ref().ok_or_else(|| {
                    AppError::parameter("value", "is required for this operator")
                })?;
                match op {
                    FilterOperator::In | FilterOperator::NotIn => {
                        let items = raw.as_array().ok_or_else(|| {
                            AppError::parameter("value", "must be an array for in and not_in")
                        })?;
                        let mut members = Vec::with_capacity(items.len());
                        for item in items {
                            members.push(fold(params::literal("value", item, dtype)?).key());
                        }
                        Matcher::Set {
                            members,
                            negate: op == FilterOperator::NotIn,
                        }
                    }
                    FilterOperator::Matches => {
                        let pattern = raw.as_str().ok_or_else(|| {
                            AppError::parameter("value", "must be a regex string")
                        })?;
                        let regex = RegexBuilder::new(pattern)
                            .case_insensitive(!params.case_sensitive)
                            .build()
                            .map_err(|e| {
                                AppError::parameter("value", format!("invalid regex: {}", e))
                            })?;
                        Matcher::Pattern(regex)
                    }
                    _ if op.is_text() => {
                        let needle = raw
                            .as_str()
                            .ok_or_else(|| AppError::parameter("value", "must be a string"))?;
                        Matcher::Text(op, fold_str(needle, params.case_sensitive))
                    }
                    _ => {
                        if raw.is_array() {
                            return Err(AppError::parameter(
                                "value",
                                "lists are only accepted by in and not_in",
                            ));
                        }
                        let literal = params::literal("value", raw, dtype)?;
                        if literal.is_null() {
                            return Err(AppError::parameter(
                                "value",
                                "use is_null or not_null to test for missing values",
                            ));
                        }
                        Matcher::Compare(op, fold(literal))
                    }
                }
            }
        };
        Ok(Self {
            matcher,
            case_sensitive: params.case_sensitive,
        })
    }

    fn matches(&self, cell: &Value) -> bool {
        if cell.is_null() {
            return matches!(self.matcher, Matcher::IsNull);
        }
        let cell = fold_case(cell.clone(), self.case_sensitive);
        match &self.matcher {
            Matcher::IsNull => false,
            Matcher::NotNull => true,
            Matcher::Set { members, negate } => members.contains(&cell.key()) != *negate,
            Matcher::Pattern(regex) => cell.as_str().map_or(false, |s| regex.is_match(s)),
            Matcher::Text(op, needle) => {
                let Some(text) = cell.as_str() else {
                    return false;
                };
                match op {
                    FilterOperator::Contains => text.contains(needle.as_str()),
                    FilterOperator::StartsWith => text.starts_with(needle.as_str()),
                    FilterOperator::EndsWith => text.ends_with(needle.as_str()),
                    _ => false,
                }
            }
            Matcher::Compare(op, target) => {
                let ordering = cell.total_cmp(target);
                match op {
                    FilterOperator::Equals => cell.key() == target.key(),
                    FilterOperator::NotEquals => cell.key() != target.key(),
                    FilterOperator::GreaterThan => ordering.is_gt(),
                    FilterOperator::GreaterOrEqual => ordering.is_ge(),
                    FilterOperator::LessThan => ordering.is_lt(),
                    FilterOperator::LessOrEqual => ordering.is_le(),
                    _ => false,
                }
            }
        }
    }
}

fn fold_str(text: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        text.to_string()
    } else {
        text.to_lowercase()
    }
}

fn fold_case(value: Value, case_sensitive: bool) -> Value {
    match value {
        Value::Str(s) if !case_sensitive => Value::Str(s.to_lowercase()),
        other => other,
    }
}

pub struct FilterRows;

impl TypedPrimitive for FilterRows {
    type Params = FilterRowsParams;
    const NAME: &'static str = "filter_rows";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Keep only the rows whose value in a column satisfies a condition. Null cells only match is_null.",
        )
        .param(ParamSpec::required("column", ParamKind::Column, "Column to test"))
        .param(ParamSpec::required(
            "operator",
            ParamKind::Choice(vec![
                "equals", "not_equals", "greater_than", "greater_or_equal", "less_than",
                "less_or_equal", "contains", "starts_with", "ends_with", "matches", "in",
                "not_in", "is_null", "not_null",
            ]),
            "Comparison to apply",
        ))
        .param(ParamSpec::optional(
            "value",
            ParamKind::Value,
            "Comparison value; a list for in/not_in, a regex for matches, omitted for null checks",
        ))
        .param(
            ParamSpec::optional("case_sensitive", ParamKind::Boolean, "Compare text exactly")
                .default_value("true"),
        )
        .example(
            "Only keep orders that are still open",
            json!({"column": "status", "operator": "equals", "value": "open"}),
        )
        .example(
            "Show rows where the amount is over 100",
            json!({"column": "amount", "operator": "greater_than", "value": 100}),
        )
        .example(
            "Remove rows without an email address",
            json!({"column": "email", "operator": "not_null"}),
        )
        .example(
            "Keep customers from Canada or Mexico",
            json!({"column": "country", "operator": "in", "value": ["CA", "MX"]}),
        )
        .example(
            "Find company names containing 'inc', ignoring case",
            json!({"column": "company", "operator": "contains", "value": "inc", "case_sensitive": false}),
        )
    }

    fn check(&self, params: &FilterRowsParams, table: &Table) -> Result<(), AppError> {
        Predicate::compile(params, table).map(|_| ())
    }

    fn apply(&self, table: &Table, params: FilterRowsParams) -> Result<StepOutput, AppError> {
        let predicate = Predicate::compile(&params, table)?;
        let column = params::require_column(table, "column", &params.column)?;
        let kept: Vec<usize> = (0..table.row_count())
            .filter(|&row| predicate.matches(column.get(row)))
            .collect();
        Ok(rows_output(table, &kept))
    }
}

// ---------------------------------------------------------------------------
// remove_duplicates

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Keep {
    #[default]
    First,
    Last,
    None,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoveDuplicatesParams {
    #[serde(default)]
    subset: Option<Vec<String>>,
    #[serde(default)]
    keep: Keep,
}

pub struct RemoveDuplicates;

impl TypedPrimitive for RemoveDuplicates {
    type Params = RemoveDuplicatesParams;
    const NAME: &'static str = "remove_duplicates";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Remove rows that repeat the values of earlier (or later) rows. Survivors keep their order.",
        )
        .param(ParamSpec::optional(
            "subset",
            ParamKind::Columns,
            "Columns that identify a duplicate; all columns when omitted",
        ))
        .param(
            ParamSpec::optional(
                "keep",
                ParamKind::Choice(vec!["first", "last", "none"]),
                "Which occurrence survives",
            )
            .default_value("first"),
        )
        .example("Remove exact duplicate rows", json!({}))
        .example(
            "Deduplicate customers by email, keeping the first one",
            json!({"subset": ["email"], "keep": "first"}),
        )
        .example(
            "Keep only the latest record for each order id",
            json!({"subset": ["order_id"], "keep": "last"}),
        )
        .example(
            "Drop every row whose id appears more than once",
            json!({"subset": ["id"], "keep": "none"}),
        )
    }

    fn check(&self, params: &RemoveDuplicatesParams, table: &Table) -> Result<(), AppError> {
        if let Some(subset) = &params.subset {
            params::require_non_empty("subset", subset)?;
            params::require_columns(table, "subset", subset)?;
        }
        Ok(())
    }

    fn apply(&self, table: &Table, params: RemoveDuplicatesParams) -> Result<StepOutput, AppError> {
        let subset: Vec<String> = match params.subset {
            Some(subset) => subset,
            None => table.column_names().into_iter().map(str::to_string).collect(),
        };
        let columns: Vec<_> = subset.iter().filter_map(|name| table.column(name)).collect();
        let keys: Vec<Vec<ValueKey>> = (0..table.row_count())
            .map(|row| columns.iter().map(|c| c.get(row).key()).collect())
            .collect();

        // first index, last index, occurrences
        let mut seen: HashMap<&[ValueKey], (usize, usize, usize)> = HashMap::new();
        for (row, key) in keys.iter().enumerate() {
            seen.entry(key.as_slice())
                .and_modify(|slot| {
                    slot.1 = row;
                    slot.2 += 1;
                })
                .or_insert((row, row, 1));
        }
        let kept: Vec<usize> = keys
            .iter()
            .enumerate()
            .filter(|(row, key)| {
                let (first, last, count) = seen[key.as_slice()];
                match params.keep {
                    Keep::First => first == *row,
                    Keep::Last => last == *row,
                    Keep::None => count == 1,
                }
            })
            .map(|(row, _)| row)
            .collect();
        Ok(rows_output(table, &kept))
    }
}

// ---------------------------------------------------------------------------
// drop_missing

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum How {
    #[default]
    Any,
    All,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DropMissingParams {
    #[serde(default)]
    columns: Option<Vec<String>>,
    #[serde(default)]
    how: How,
}

pub struct DropMissing;

impl TypedPrimitive for DropMissing {
    type Params = DropMissingParams;
    const NAME: &'static str = "drop_missing";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Drop rows with missing values in the given columns.",
        )
        .param(ParamSpec::optional(
            "columns",
            ParamKind::Columns,
            "Columns to inspect; all columns when omitted",
        ))
        .param(
            ParamSpec::optional(
                "how",
                ParamKind::Choice(vec!["any", "all"]),
                "Drop when any or when all inspected cells are null",
            )
            .default_value("any"),
        )
        .example("Drop any row with a blank cell", json!({}))
        .example(
            "Remove rows missing a phone number",
            json!({"columns": ["phone"]}),
        )
        .example(
            "Drop rows where both email and phone are empty",
            json!({"columns": ["email", "phone"], "how": "all"}),
        )
    }

    fn check(&self, params: &DropMissingParams, table: &Table) -> Result<(), AppError> {
        if let Some(columns) = &params.columns {
            params::require_non_empty("columns", columns)?;
            params::require_columns(table, "columns", columns)?;
        }
        Ok(())
    }

    fn apply(&self, table: &Table, params: DropMissingParams) -> Result<StepOutput, AppError> {
        let names: Vec<String> = match params.columns {
            Some(columns) => columns,
            None => table.column_names().into_iter().map(str::to_string).collect(),
        };
        let columns: Vec<_> = names.iter().filter_map(|name| table.column(name)).collect();
        let kept: Vec<usize> = (0..table.row_count())
            .filter(|&row| {
                if columns.is_empty() {
                    return true;
                }
                let missing = columns.iter().filter(|c| c.get(row).is_null()).count();
                match params.how {
                    How::Any => missing == 0,
                    How::All => missing < columns.len(),
                }
            })
            .collect();
        Ok(rows_output(table, &kept))
    }
}

// ---------------------------------------------------------------------------
// sort_rows

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SortKey {
    Name(String),
    Spec(SortKeySpec),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SortKeySpec {
    column: String,
    #[serde(default)]
    descending: bool,
}

impl SortKey {
    fn column(&self) -> &str {
        match self {
            SortKey::Name(name) => name,
            SortKey::Spec(spec) => &spec.column,
        }
    }

    fn descending(&self) -> bool {
        match self {
            SortKey::Name(_) => false,
            SortKey::Spec(spec) => spec.descending,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SortRowsParams {
    by: Vec<SortKey>,
    #[serde(default = "default_true")]
    nulls_last: bool,
}

pub struct SortRows;

impl TypedPrimitive for SortRows {
    type Params = SortRowsParams;
    const NAME: &'static str = "sort_rows";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Stable sort by one or more columns, each ascending or descending.",
        )
        .param(ParamSpec::required(
            "by",
            ParamKind::Columns,
            "Sort keys: column names or {column, descending} objects",
        ))
        .param(
            ParamSpec::optional("nulls_last", ParamKind::Boolean, "Place nulls after values")
                .default_value("true"),
        )
        .example("Sort by last name", json!({"by": ["last_name"]}))
        .example(
            "Show the most expensive products first",
            json!({"by": [{"column": "price", "descending": true}]}),
        )
        .example(
            "Order by region, then by revenue from high to low",
            json!({"by": ["region", {"column": "revenue", "descending": true}]}),
        )
        .example(
            "Sort by signup date with missing dates on top",
            json!({"by": ["signup_date"], "nulls_last": false}),
        )
    }

    fn check(&self, params: &SortRowsParams, table: &Table) -> Result<(), AppError> {
        params::require_non_empty("by", &params.by)?;
        for key in &params.by {
            params::require_column(table, "by", key.column())?;
        }
        Ok(())
    }

    fn apply(&self, table: &Table, params: SortRowsParams) -> Result<StepOutput, AppError> {
        let keys: Vec<_> = params
            .by
            .iter()
            .map(|key| {
                params::require_column(table, "by", key.column()).map(|c| (c, key.descending()))
            })
            .collect::<Result<_, _>>()?;
        let mut order: Vec<usize> = (0..table.row_count()).collect();
        order.sort_by(|&a, &b| {
            keys.iter()
                .map(|(column, descending)| {
                    compare_cells(column.get(a), column.get(b), *descending, params.nulls_last)
                })
                .find(|ordering| ordering.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(rows_output(table, &order))
    }
}

// ---------------------------------------------------------------------------
// limit_rows

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitFrom {
    #[default]
    Head,
    Tail,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitRowsParams {
    count: usize,
    #[serde(default)]
    from: LimitFrom,
}

pub struct LimitRows;

impl TypedPrimitive for LimitRows {
    type Params = LimitRowsParams;
    const NAME: &'static str = "limit_rows";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Keep the first or last N rows.",
        )
        .param(ParamSpec::required("count", ParamKind::Integer, "Number of rows to keep"))
        .param(
            ParamSpec::optional("from", ParamKind::Choice(vec!["head", "tail"]), "Which end")
                .default_value("head"),
        )
        .example("Show the first 10 rows", json!({"count": 10}))
        .example("Keep only the last 5 records", json!({"count": 5, "from": "tail"}))
        .example("Take the top 3 after sorting", json!({"count": 3, "from": "head"}))
    }

    fn check(&self, _params: &LimitRowsParams, _table: &Table) -> Result<(), AppError> {
        Ok(())
    }

    fn apply(&self, table: &Table, params: LimitRowsParams) -> Result<StepOutput, AppError> {
        let rows = table.row_count();
        let count = params.count.min(rows);
        let kept: Vec<usize> = match params.from {
            LimitFrom::Head => (0..count).collect(),
            LimitFrom::Tail => (rows - count..rows).collect(),
        };
        Ok(rows_output(table, &kept))
    }
}

// ---------------------------------------------------------------------------
// sample_rows

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SampleRowsParams {
    #[serde(default)]
    count: Option<usize>,
    #[serde(default)]
    fraction: Option<f64>,
    seed: u64,
}

pub struct SampleRows;

impl SampleRows {
    fn sample_size(params: &SampleRowsParams, rows: usize) -> Result<usize, AppError> {
        match (params.count, params.fraction) {
            (Some(count), None) => Ok(count.min(rows)),
            (None, Some(fraction)) => {
                params::require_range("fraction", fraction, 0.0, 1.0)?;
                Ok(((rows as f64) * fraction).round() as usize)
            }
            (Some(_), Some(_)) => Err(AppError::parameter(
                "count",
                "give either count or fraction, not both",
            )),
            (None, None) => Err(AppError::parameter(
                "count",
                "one of count or fraction is required",
            )),
        }
    }
}

impl TypedPrimitive for SampleRows {
    type Params = SampleRowsParams;
    const NAME: &'static str = "sample_rows";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Reproducible random sample of rows. Sampled rows keep their original order.",
        )
        .param(ParamSpec::optional("count", ParamKind::Integer, "Number of rows to sample"))
        .param(ParamSpec::optional(
            "fraction",
            ParamKind::Number,
            "Share of rows to sample, between 0 and 1",
        ))
        .param(ParamSpec::required("seed", ParamKind::Integer, "Random seed"))
        .example("Pick 100 random rows", json!({"count": 100, "seed": 42}))
        .example("Sample 10% of the data", json!({"fraction": 0.1, "seed": 7}))
        .example(
            "Give me a random half of the customers, reproducibly",
            json!({"fraction": 0.5, "seed": 2024}),
        )
    }

    fn check(&self, params: &SampleRowsParams, table: &Table) -> Result<(), AppError> {
        Self::sample_size(params, table.row_count()).map(|_| ())
    }

    fn apply(&self, table: &Table, params: SampleRowsParams) -> Result<StepOutput, AppError> {
        let rows = table.row_count();
        let amount = Self::sample_size(&params, rows)?;
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut kept = rand::seq::index::sample(&mut rng, rows, amount).into_vec();
        kept.sort_unstable();
        Ok(rows_output(table, &kept))
    }
}
