//! Window functions over ordered partitions.
//!
//! Every window function orders rows inside each partition by `order_by`
//! (ties keep input order, nulls sort last) and writes one value per row.
//! The output table keeps the input row order.

use super::{build_column, compare_cells, finite, put_column};
use crate::core::error::AppError;
use crate::core::pipeline::metadata::{DerivedFacts, StepMetadata};
use crate::core::pipeline::params;
use crate::core::pipeline::primitive::{
    ParamKind, ParamSpec, PrimitiveDefinition, StepOutput, TypedPrimitive,
};
use crate::core::table::{DataType, Table, Value, ValueKey};
use crate::core::types::PrimitiveCategory;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::cmp::Ordering;

const CATEGORY: PrimitiveCategory = PrimitiveCategory::NumericWindow;

struct Frame<'a> {
    order_by: &'a str,
    descending: bool,
    partition_by: &'a [String],
}

impl Frame<'_> {
    fn check(&self, table: &Table) -> Result<(), AppError> {
        params::require_column(table, "order_by", self.order_by)?;
        params::require_columns(table, "partition_by", self.partition_by)?;
        params::require_distinct("partition_by", self.partition_by)
    }

    /// Row indices per partition, each list in window order.
    fn partitions(&self, table: &Table) -> Result<Vec<Vec<usize>>, AppError> {
        let order = params::require_column(table, "order_by", self.order_by)?;
        let keys = self
            .partition_by
            .iter()
            .map(|name| params::require_column(table, "partition_by", name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut groups: IndexMap<Vec<ValueKey>, Vec<usize>> = IndexMap::new();
        for row in 0..table.row_count() {
            let key = keys.iter().map(|c| c.get(row).key()).collect();
            groups.entry(key).or_default().push(row);
        }
        Ok(groups
            .into_values()
            .map(|mut rows| {
                rows.sort_by(|a, b| {
                    compare_cells(order.get(*a), order.get(*b), self.descending, true)
                });
                rows
            })
            .collect())
    }

    fn sources(&self, column: Option<&str>) -> Vec<String> {
        let mut sources = Vec::new();
        if let Some(column) = column {
            sources.push(column.to_string());
        }
        sources.push(self.order_by.to_string());
        for name in self.partition_by {
            if !sources.contains(name) {
                sources.push(name.clone());
            }
        }
        sources
    }
}

fn window_output(
    table: &Table,
    into: &str,
    dtype: DataType,
    values: Vec<Value>,
    sources: Vec<String>,
    partitions: usize,
) -> Result<StepOutput, AppError> {
    let facts = DerivedFacts {
        column: into.to_string(),
        source_columns: sources,
        rows: values.len(),
        nulls_produced: values.iter().filter(|v| v.is_null()).count(),
        partitions: Some(partitions),
    };
    let column = build_column(into, dtype, values)?;
    let output = put_column(table, into, column)?;
    Ok(StepOutput::new(output, StepMetadata::Derived(facts)))
}

fn frame_params(definition: PrimitiveDefinition, into_default: &'static str) -> PrimitiveDefinition {
    definition
        .param(ParamSpec::required("order_by", ParamKind::Column, "Column that orders rows in each window"))
        .param(
            ParamSpec::optional("descending", ParamKind::Boolean, "Order from largest to smallest")
                .default_value("false"),
        )
        .param(
            ParamSpec::optional("partition_by", ParamKind::Columns, "Columns that split rows into independent windows")
                .default_value("[]"),
        )
        .param(ParamSpec::optional("into", ParamKind::Column, "Output column").default_value(into_default))
}

// ---------------------------------------------------------------------------
// rank, dense_rank, percent_rank

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RankingParams {
    order_by: String,
    #[serde(default)]
    descending: bool,
    #[serde(default)]
    partition_by: Vec<String>,
    #[serde(default)]
    into: Option<String>,
}

impl RankingParams {
    fn frame(&self) -> Frame<'_> {
        Frame {
            order_by: &self.order_by,
            descending: self.descending,
            partition_by: &self.partition_by,
        }
    }
}

#[derive(Clone, Copy)]
enum RankStyle {
    Gaps,
    Dense,
    Percent,
}

impl RankStyle {
    fn default_into(self) -> &'static str {
        match self {
            RankStyle::Gaps => "rank",
            RankStyle::Dense => "dense_rank",
            RankStyle::Percent => "percent_rank",
        }
    }
}

fn check_ranking(params: &RankingParams, table: &Table, style: RankStyle) -> Result<(), AppError> {
    params.frame().check(table)?;
    let into = params.into.as_deref().unwrap_or(style.default_into());
    params::require_output_name(table, "into", into, None)
}

fn apply_ranking(table: &Table, params: RankingParams, style: RankStyle) -> Result<StepOutput, AppError> {
    let frame = params.frame();
    let order = params::require_column(table, "order_by", &params.order_by)?;
    let partitions = frame.partitions(table)?;
    let mut values = vec![Value::Null; table.row_count()];
    for rows in &partitions {
        let mut rank = 0usize;
        let mut dense = 0usize;
        for (position, &row) in rows.iter().enumerate() {
            let tied = position > 0
                && compare_cells(order.get(rows[position - 1]), order.get(row), false, true)
                    == Ordering::Equal;
            if !tied {
                rank = position + 1;
                dense += 1;
            }
            values[row] = match style {
                RankStyle::Gaps => Value::Int(rank as i64),
                RankStyle::Dense => Value::Int(dense as i64),
                RankStyle::Percent if rows.len() > 1 => {
                    Value::Float((rank - 1) as f64 / (rows.len() - 1) as f64)
                }
                RankStyle::Percent => Value::Float(0.0),
            };
        }
    }
    let dtype = match style {
        RankStyle::Percent => DataType::Float,
        _ => DataType::Integer,
    };
    let into = params.into.clone().unwrap_or_else(|| style.default_into().to_string());
    window_output(table, &into, dtype, values, frame.sources(None), partitions.len())
}

pub struct Rank;

impl TypedPrimitive for Rank {
    type Params = RankingParams;
    const NAME: &'static str = "rank";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        frame_params(
            PrimitiveDefinition::new(
                Self::NAME,
                CATEGORY,
                "Rank rows within each partition; tied rows share a rank and leave gaps (1, 1, 3).",
            ),
            "rank",
        )
        .example(
            "Rank salespeople by revenue, highest first",
            json!({"order_by": "revenue", "descending": true}),
        )
        .example(
            "Rank products by price within each category",
            json!({"order_by": "price", "partition_by": ["category"], "into": "price_rank"}),
        )
        .example(
            "Rank runners by finish time in each race",
            json!({"order_by": "finish_time", "partition_by": ["race"]}),
        )
    }

    fn check(&self, params: &RankingParams, table: &Table) -> Result<(), AppError> {
        check_ranking(params, table, RankStyle::Gaps)
    }

    fn apply(&self, table: &Table, params: RankingParams) -> Result<StepOutput, AppError> {
        apply_ranking(table, params, RankStyle::Gaps)
    }
}

pub struct DenseRank;

impl TypedPrimitive for DenseRank {
    type Params = RankingParams;
    const NAME: &'static str = "dense_rank";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        frame_params(
            PrimitiveDefinition::new(
                Self::NAME,
                CATEGORY,
                "Rank rows within each partition without gaps after ties (1, 1, 2).",
            ),
            "dense_rank",
        )
        .example(
            "Dense rank of scores, best first",
            json!({"order_by": "score", "descending": true}),
        )
        .example(
            "Dense rank order dates per customer",
            json!({"order_by": "order_date", "partition_by": ["customer_id"], "into": "order_seq"}),
        )
        .example("Number price levels from cheapest", json!({"order_by": "price"}))
    }

    fn check(&self, params: &RankingParams, table: &Table) -> Result<(), AppError> {
        check_ranking(params, table, RankStyle::Dense)
    }

    fn apply(&self, table: &Table, params: RankingParams) -> Result<StepOutput, AppError> {
        apply_ranking(table, params, RankStyle::Dense)
    }
}

pub struct PercentRank;

impl TypedPrimitive for PercentRank {
    type Params = RankingParams;
    const NAME: &'static str = "percent_rank";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        frame_params(
            PrimitiveDefinition::new(
                Self::NAME,
                CATEGORY,
                "Relative rank (rank - 1) / (rows - 1) in 0..1; a single-row partition gets 0.",
            ),
            "percent_rank",
        )
        .example("Percentile position of each salary", json!({"order_by": "salary"}))
        .example(
            "Relative standing of scores within each class",
            json!({"order_by": "score", "partition_by": ["class"], "descending": true}),
        )
        .example(
            "Percent rank of delivery times",
            json!({"order_by": "delivery_days", "into": "delivery_pct"}),
        )
    }

    fn check(&self, params: &RankingParams, table: &Table) -> Result<(), AppError> {
        check_ranking(params, table, RankStyle::Percent)
    }

    fn apply(&self, table: &Table, params: RankingParams) -> Result<StepOutput, AppError> {
        apply_ranking(table, params, RankStyle::Percent)
    }
}

// ---------------------------------------------------------------------------
// ntile

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NtileParams {
    order_by: String,
    #[serde(default)]
    descending: bool,
    #[serde(default)]
    partition_by: Vec<String>,
    #[serde(default)]
    into: Option<String>,
    buckets: usize,
}

pub struct Ntile;

impl TypedPrimitive for Ntile {
    type Params = NtileParams;
    const NAME: &'static str = "ntile";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        frame_params(
            PrimitiveDefinition::new(
                Self::NAME,
                CATEGORY,
                "Split each ordered partition into buckets numbered from 1; earlier buckets take the extra rows.",
            ),
            "ntile",
        )
        .param(ParamSpec::required("buckets", ParamKind::Integer, "Number of buckets, at least 1"))
        .example(
            "Split customers into spending quartiles",
            json!({"order_by": "total_spend", "buckets": 4, "into": "quartile"}),
        )
        .example(
            "Deciles of test scores per school",
            json!({"order_by": "score", "partition_by": ["school"], "buckets": 10}),
        )
        .example(
            "Top and bottom half by revenue",
            json!({"order_by": "revenue", "descending": true, "buckets": 2}),
        )
    }

    fn check(&self, params: &NtileParams, table: &Table) -> Result<(), AppError> {
        if params.buckets == 0 {
            return Err(AppError::parameter("buckets", "must be at least 1"));
        }
        self.frame(params).check(table)?;
        let into = params.into.as_deref().unwrap_or("ntile");
        params::require_output_name(table, "into", into, None)
    }

    fn apply(&self, table: &Table, params: NtileParams) -> Result<StepOutput, AppError> {
        let frame = self.frame(&params);
        let partitions = frame.partitions(table)?;
        let mut values = vec![Value::Null; table.row_count()];
        for rows in &partitions {
            let size = rows.len() / params.buckets;
            let extra = rows.len() % params.buckets;
            let mut bucket = 1usize;
            let mut filled = 0usize;
            for &row in rows {
                let capacity = size + usize::from(bucket <= extra);
                if filled == capacity {
                    bucket += 1;
                    filled = 0;
                }
                values[row] = Value::Int(bucket as i64);
                filled += 1;
            }
        }
        let into = params.into.clone().unwrap_or_else(|| "ntile".to_string());
        window_output(table, &into, DataType::Integer, values, frame.sources(None), partitions.len())
    }
}

impl Ntile {
    fn frame<'a>(&self, params: &'a NtileParams) -> Frame<'a> {
        Frame {
            order_by: &params.order_by,
            descending: params.descending,
            partition_by: &params.partition_by,
        }
    }
}

// ---------------------------------------------------------------------------
// lag, lead

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OffsetParams {
    column: String,
    order_by: String,
    #[serde(default)]
    descending: bool,
    #[serde(default)]
    partition_by: Vec<String>,
    #[serde(default)]
    into: Option<String>,
    #[serde(default = "default_offset")]
    offset: usize,
    #[serde(default)]
    default: Option<JsonValue>,
}

fn default_offset() -> usize {
    1
}

impl OffsetParams {
    fn frame(&self) -> Frame<'_> {
        Frame {
            order_by: &self.order_by,
            descending: self.descending,
            partition_by: &self.partition_by,
        }
    }

    fn into_name(&self, suffix: &str) -> String {
        self.into
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.column, suffix))
    }

    fn fallback(&self, dtype: DataType) -> Result<Value, AppError> {
        match &self.default {
            Some(raw) => params::literal("default", raw, dtype),
            None => Ok(Value::Null),
        }
    }

    fn check(&self, table: &Table, suffix: &str) -> Result<(), AppError> {
        if self.offset == 0 {
            return Err(AppError::parameter("offset", "must be at least 1"));
        }
        let source = params::require_column(table, "column", &self.column)?;
        self.frame().check(table)?;
        self.fallback(source.dtype())?;
        params::require_output_name(table, "into", &self.into_name(suffix), Some(self.column.as_str()))
    }

    /// Shift values along each partition; `forward` reads rows after the current one.
    fn shift(&self, table: &Table, suffix: &str, forward: bool) -> Result<StepOutput, AppError> {
        let source = params::require_column(table, "column", &self.column)?;
        let fallback = self.fallback(source.dtype())?;
        let frame = self.frame();
        let partitions = frame.partitions(table)?;
        let mut values = vec![Value::Null; table.row_count()];
        for rows in &partitions {
            for (position, &row) in rows.iter().enumerate() {
                let target = if forward {
                    position.checked_add(self.offset).filter(|t| *t < rows.len())
                } else {
                    position.checked_sub(self.offset)
                };
                values[row] = match target {
                    Some(t) => source.get(rows[t]).clone(),
                    None => fallback.clone(),
                };
            }
        }
        let into = self.into_name(suffix);
        window_output(
            table,
            &into,
            source.dtype(),
            values,
            frame.sources(Some(&self.column)),
            partitions.len(),
        )
    }
}

pub struct Lag;

impl TypedPrimitive for Lag {
    type Params = OffsetParams;
    const NAME: &'static str = "lag";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        frame_params(
            PrimitiveDefinition::new(
                Self::NAME,
                CATEGORY,
                "Value of a column from an earlier row in the window; rows without one get the default (or null).",
            ),
            "{column}_lag",
        )
        .param(ParamSpec::required("column", ParamKind::Column, "Column to read from"))
        .param(
            ParamSpec::optional("offset", ParamKind::Integer, "How many rows back, at least 1")
                .default_value("1"),
        )
        .param(ParamSpec::optional("default", ParamKind::Value, "Value when no earlier row exists"))
        .example(
            "Previous month's sales",
            json!({"column": "sales", "order_by": "month", "into": "prev_sales"}),
        )
        .example(
            "Each customer's previous order amount",
            json!({"column": "amount", "order_by": "order_date", "partition_by": ["customer_id"]}),
        )
        .example(
            "Price two days earlier, zero when unknown",
            json!({"column": "price", "order_by": "day", "offset": 2, "default": 0}),
        )
    }

    fn check(&self, params: &OffsetParams, table: &Table) -> Result<(), AppError> {
        params.check(table, "lag")
    }

    fn apply(&self, table: &Table, params: OffsetParams) -> Result<StepOutput, AppError> {
        params.shift(table, "lag", false)
    }
}

pub struct Lead;

impl TypedPrimitive for Lead {
    type Params = OffsetParams;
    const NAME: &'static str = "lead";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        frame_params(
            PrimitiveDefinition::new(
                Self::NAME,
                CATEGORY,
                "Value of a column from a later row in the window; rows without one get the default (or null).",
            ),
            "{column}_lead",
        )
        .param(ParamSpec::required("column", ParamKind::Column, "Column to read from"))
        .param(
            ParamSpec::optional("offset", ParamKind::Integer, "How many rows ahead, at least 1")
                .default_value("1"),
        )
        .param(ParamSpec::optional("default", ParamKind::Value, "Value when no later row exists"))
        .example(
            "Next visit date for each patient",
            json!({"column": "visit_date", "order_by": "visit_date", "partition_by": ["patient_id"], "into": "next_visit"}),
        )
        .example(
            "Next quarter's revenue",
            json!({"column": "revenue", "order_by": "quarter"}),
        )
        .example(
            "Score three rounds later, -1 if none",
            json!({"column": "score", "order_by": "round", "offset": 3, "default": -1}),
        )
    }

    fn check(&self, params: &OffsetParams, table: &Table) -> Result<(), AppError> {
        params.check(table, "lead")
    }

    fn apply(&self, table: &Table, params: OffsetParams) -> Result<StepOutput, AppError> {
        params.shift(table, "lead", true)
    }
}

// ---------------------------------------------------------------------------
// moving_average

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MovingAverageParams {
    column: String,
    order_by: String,
    #[serde(default)]
    descending: bool,
    #[serde(default)]
    partition_by: Vec<String>,
    #[serde(default)]
    into: Option<String>,
    window: usize,
    #[serde(default = "default_offset")]
    min_periods: usize,
}

impl MovingAverageParams {
    fn frame(&self) -> Frame<'_> {
        Frame {
            order_by: &self.order_by,
            descending: self.descending,
            partition_by: &self.partition_by,
        }
    }

    fn into_name(&self) -> String {
        self.into
            .clone()
            .unwrap_or_else(|| format!("{}_moving_avg", self.column))
    }
}

pub struct MovingAverage;

impl TypedPrimitive for MovingAverage {
    type Params = MovingAverageParams;
    const NAME: &'static str = "moving_average";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        frame_params(
            PrimitiveDefinition::new(
                Self::NAME,
                CATEGORY,
                "Trailing average over the current row and the rows before it. Nulls are skipped; fewer than min_periods values gives null.",
            ),
            "{column}_moving_avg",
        )
        .param(ParamSpec::required("column", ParamKind::Column, "Numeric column to average"))
        .param(ParamSpec::required("window", ParamKind::Integer, "Rows in the window, at least 1"))
        .param(
            ParamSpec::optional("min_periods", ParamKind::Integer, "Values needed before an average is produced")
                .default_value("1"),
        )
        .example(
            "7-day moving average of visits",
            json!({"column": "visits", "order_by": "date", "window": 7}),
        )
        .example(
            "3-month rolling revenue per region, full windows only",
            json!({"column": "revenue", "order_by": "month", "partition_by": ["region"], "window": 3, "min_periods": 3}),
        )
        .example(
            "Smooth temperature readings over 5 samples",
            json!({"column": "temp", "order_by": "ts", "window": 5, "into": "temp_smooth"}),
        )
    }

    fn check(&self, params: &MovingAverageParams, table: &Table) -> Result<(), AppError> {
        if params.window == 0 {
            return Err(AppError::parameter("window", "must be at least 1"));
        }
        if params.min_periods == 0 || params.min_periods > params.window {
            return Err(AppError::parameter(
                "min_periods",
                format!("must be between 1 and window ({})", params.window),
            ));
        }
        params::require_numeric(table, "column", &params.column)?;
        params.frame().check(table)?;
        params::require_output_name(table, "into", &params.into_name(), Some(params.column.as_str()))
    }

    fn apply(&self, table: &Table, params: MovingAverageParams) -> Result<StepOutput, AppError> {
        let source = params::require_column(table, "column", &params.column)?;
        let frame = params.frame();
        let partitions = frame.partitions(table)?;
        let mut values = vec![Value::Null; table.row_count()];
        for rows in &partitions {
            for (position, &row) in rows.iter().enumerate() {
                let start = (position + 1).saturating_sub(params.window);
                let window: Vec<f64> = rows[start..=position]
                    .iter()
                    .filter_map(|r| source.get(*r).as_f64())
                    .collect();
                if window.len() >= params.min_periods {
                    let average = window.iter().sum::<f64>() / window.len() as f64;
                    values[row] = finite(average).map_err(|reason| {
                        AppError::execution(format!(
                            "row {}: moving average of '{}' failed: {}",
                            row, params.column, reason
                        ))
                        .with_row(row)
                    })?;
                }
            }
        }
        let into = params.into_name();
        window_output(
            table,
            &into,
            DataType::Float,
            values,
            frame.sources(Some(&params.column)),
            partitions.len(),
        )
    }
}

// ---------------------------------------------------------------------------
// running_total, first_value

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnWindowParams {
    column: String,
    order_by: String,
    #[serde(default)]
    descending: bool,
    #[serde(default)]
    partition_by: Vec<String>,
    #[serde(default)]
    into: Option<String>,
}

impl ColumnWindowParams {
    fn frame(&self) -> Frame<'_> {
        Frame {
            order_by: &self.order_by,
            descending: self.descending,
            partition_by: &self.partition_by,
        }
    }

    fn into_name(&self, suffix: &str) -> String {
        self.into
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.column, suffix))
    }
}

pub struct RunningTotal;

impl TypedPrimitive for RunningTotal {
    type Params = ColumnWindowParams;
    const NAME: &'static str = "running_total";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        frame_params(
            PrimitiveDefinition::new(
                Self::NAME,
                CATEGORY,
                "Cumulative sum in window order. Null cells stay null and do not add to the total.",
            ),
            "{column}_running_total",
        )
        .param(ParamSpec::required("column", ParamKind::Column, "Numeric column to sum"))
        .example(
            "Cumulative sales by day",
            json!({"column": "sales", "order_by": "date"}),
        )
        .example(
            "Account balance from transactions per account",
            json!({"column": "amount", "order_by": "posted_at", "partition_by": ["account"], "into": "balance"}),
        )
        .example(
            "Running count of signups by week",
            json!({"column": "signups", "order_by": "week"}),
        )
    }

    fn check(&self, params: &ColumnWindowParams, table: &Table) -> Result<(), AppError> {
        params::require_numeric(table, "column", &params.column)?;
        params.frame().check(table)?;
        let into = params.into_name("running_total");
        params::require_output_name(table, "into", &into, Some(params.column.as_str()))
    }

    fn apply(&self, table: &Table, params: ColumnWindowParams) -> Result<StepOutput, AppError> {
        let source = params::require_column(table, "column", &params.column)?;
        let integer = source.dtype() == DataType::Integer;
        let frame = params.frame();
        let partitions = frame.partitions(table)?;
        let mut values = vec![Value::Null; table.row_count()];
        for rows in &partitions {
            let mut int_total = 0i64;
            let mut float_total = 0f64;
            for &row in rows {
                values[row] = match source.get(row) {
                    Value::Int(v) if integer => {
                        int_total = int_total.checked_add(*v).ok_or_else(|| {
                            AppError::execution(format!(
                                "row {}: running total of '{}' overflows",
                                row, params.column
                            ))
                            .with_row(row)
                        })?;
                        Value::Int(int_total)
                    }
                    Value::Null => Value::Null,
                    other => {
                        float_total += other.as_f64().unwrap_or(0.0);
                        finite(float_total).map_err(|reason| {
                            AppError::execution(format!(
                                "row {}: running total of '{}' failed: {}",
                                row, params.column, reason
                            ))
                            .with_row(row)
                        })?
                    }
                };
            }
        }
        let dtype = if integer { DataType::Integer } else { DataType::Float };
        let into = params.into_name("running_total");
        window_output(
            table,
            &into,
            dtype,
            values,
            frame.sources(Some(&params.column)),
            partitions.len(),
        )
    }
}

pub struct FirstValue;

impl TypedPrimitive for FirstValue {
    type Params = ColumnWindowParams;
    const NAME: &'static str = "first_value";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        frame_params(
            PrimitiveDefinition::new(
                Self::NAME,
                CATEGORY,
                "Value of a column from the first row of each window, repeated on every row.",
            ),
            "{column}_first",
        )
        .param(ParamSpec::required("column", ParamKind::Column, "Column to read from"))
        .example(
            "First purchase date per customer",
            json!({"column": "order_date", "order_by": "order_date", "partition_by": ["customer_id"], "into": "first_order"}),
        )
        .example(
            "Opening price of each trading day",
            json!({"column": "price", "order_by": "ts", "partition_by": ["day"]}),
        )
        .example(
            "Top scorer's name on every row",
            json!({"column": "name", "order_by": "score", "descending": true}),
        )
    }

    fn check(&self, params: &ColumnWindowParams, table: &Table) -> Result<(), AppError> {
        params::require_column(table, "column", &params.column)?;
        params.frame().check(table)?;
        let into = params.into_name("first");
        params::require_output_name(table, "into", &into, Some(params.column.as_str()))
    }

    fn apply(&self, table: &Table, params: ColumnWindowParams) -> Result<StepOutput, AppError> {
        let source = params::require_column(table, "column", &params.column)?;
        let frame = params.frame();
        let partitions = frame.partitions(table)?;
        let mut values = vec![Value::Null; table.row_count()];
        for rows in &partitions {
            if let Some(&first) = rows.first() {
                let value = source.get(first);
                for &row in rows {
                    values[row] = value.clone();
                }
            }
        }
        let into = params.into_name("first");
        window_output(
            table,
            &into,
            source.dtype(),
            values,
            frame.sources(Some(&params.column)),
            partitions.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::primitives::testing::{fail, run, table};
    use crate::core::types::ErrorCategory;

    fn scores() -> Table {
        table(json!([
            {"team": "a", "score": 10},
            {"team": "b", "score": 7},
            {"team": "a", "score": 12},
            {"team": "a", "score": 10},
            {"team": "b", "score": null}
        ]))
    }

    fn column_of(output: &StepOutput, name: &str) -> Vec<Value> {
        output.table.column(name).unwrap().values().to_vec()
    }

    #[test]
    fn test_rank_ties_share_and_leave_gaps() {
        let out = run(Rank, &scores(), json!({"order_by": "score"}));
        // the null score sorts last, after 12
        let expected: Vec<Value> = [2, 1, 4, 2, 5].iter().map(|v| Value::Int(*v)).collect();
        assert_eq!(column_of(&out, "rank"), expected);
    }

    #[test]
    fn test_dense_rank_per_partition() {
        let out = run(DenseRank, &scores(), json!({"order_by": "score", "partition_by": ["team"]}));
        assert_eq!(
            column_of(&out, "dense_rank"),
            vec![Value::Int(1), Value::Int(1), Value::Int(2), Value::Int(1), Value::Int(2)]
        );
        match out.metadata {
            StepMetadata::Derived(facts) => assert_eq!(facts.partitions, Some(2)),
            other => panic!("unexpected metadata {:?}", other),
        }
    }

    #[test]
    fn test_percent_rank_single_row_partition_is_zero() {
        let input = table(json!([{"g": "x", "v": 1}, {"g": "y", "v": 2}, {"g": "y", "v": 3}]));
        let out = run(PercentRank, &input, json!({"order_by": "v", "partition_by": ["g"]}));
        assert_eq!(
            column_of(&out, "percent_rank"),
            vec![Value::Float(0.0), Value::Float(0.0), Value::Float(1.0)]
        );
    }

    #[test]
    fn test_ntile_front_loads_extra_rows() {
        let input = table(json!([{"v": 1}, {"v": 2}, {"v": 3}, {"v": 4}, {"v": 5}]));
        let out = run(Ntile, &input, json!({"order_by": "v", "buckets": 2}));
        assert_eq!(
            column_of(&out, "ntile"),
            vec![Value::Int(1), Value::Int(1), Value::Int(1), Value::Int(2), Value::Int(2)]
        );
        let err = fail(Ntile, &input, json!({"order_by": "v", "buckets": 0}));
        assert_eq!(err.category, ErrorCategory::ParameterError);
    }

    #[test]
    fn test_lag_and_lead_keep_input_order() {
        let input = table(json!([{"t": 3, "v": 30}, {"t": 1, "v": 10}, {"t": 2, "v": 20}]));
        let lag = run(Lag, &input, json!({"column": "v", "order_by": "t", "default": 0}));
        assert_eq!(
            column_of(&lag, "v_lag"),
            vec![Value::Int(20), Value::Int(0), Value::Int(10)]
        );
        let lead = run(Lead, &input, json!({"column": "v", "order_by": "t"}));
        assert_eq!(
            column_of(&lead, "v_lead"),
            vec![Value::Null, Value::Int(20), Value::Int(30)]
        );
    }

    #[test]
    fn test_moving_average_respects_min_periods() {
        let input = table(json!([{"t": 1, "v": 2}, {"t": 2, "v": 4}, {"t": 3, "v": 6}]));
        let out = run(
            MovingAverage,
            &input,
            json!({"column": "v", "order_by": "t", "window": 2, "min_periods": 2}),
        );
        assert_eq!(
            column_of(&out, "v_moving_avg"),
            vec![Value::Null, Value::Float(3.0), Value::Float(5.0)]
        );
    }

    #[test]
    fn test_running_total_float_overflow_names_row() {
        let input = table(json!([{"t": 1, "v": 1.7e308}, {"t": 2, "v": 1.7e308}]));
        let err = fail(RunningTotal, &input, json!({"column": "v", "order_by": "t"}));
        assert_eq!(err.category, ErrorCategory::ExecutionError);
        assert_eq!(err.context.get("row"), Some(&"1".to_string()));
    }

    #[test]
    fn test_running_total_skips_nulls() {
        let out = run(
            RunningTotal,
            &scores(),
            json!({"column": "score", "order_by": "score", "partition_by": ["team"]}),
        );
        assert_eq!(
            column_of(&out, "score_running_total"),
            vec![Value::Int(10), Value::Int(7), Value::Int(32), Value::Int(20), Value::Null]
        );
    }

    #[test]
    fn test_first_value_and_rerun_is_stable() {
        let params = json!({"column": "score", "order_by": "score", "descending": true, "partition_by": ["team"]});
        let first = run(FirstValue, &scores(), params.clone());
        let second = run(FirstValue, &scores(), params);
        assert_eq!(first.table, second.table);
        assert_eq!(
            column_of(&first, "score_first"),
            vec![Value::Int(12), Value::Int(7), Value::Int(12), Value::Int(12), Value::Int(7)]
        );
    }

    #[test]
    fn test_window_output_collision_is_parameter_error() {
        let err = fail(Rank, &scores(), json!({"order_by": "score", "into": "team"}));
        assert_eq!(err.category, ErrorCategory::ParameterError);
    }
}
