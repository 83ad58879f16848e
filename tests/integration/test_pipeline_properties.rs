use serde_json::{json, Value as JsonValue};
use tidyflow::core::pipeline::{Engine, ExecutionResult, Pipeline, Registry, StepMetadata};
use tidyflow::core::table::Table;

fn engine() -> Engine {
    Engine::new(Registry::builtin().unwrap())
}

fn pipeline(steps: JsonValue) -> Pipeline {
    serde_json::from_value(steps).unwrap()
}

fn sales() -> Table {
    Table::from_json(&json!([
        {"region": "west", "month": "jan", "rep": " Ann ", "revenue": 120},
        {"region": "east", "month": "jan", "rep": "bob", "revenue": 90},
        {"region": "west", "month": "feb", "rep": "Ann", "revenue": 60},
        {"region": "east", "month": "feb", "rep": " cy", "revenue": 200},
        {"region": "west", "month": "jan", "rep": "Dee ", "revenue": 30},
        {"region": "north", "month": "feb", "rep": "eve", "revenue": null},
        {"region": "north", "month": "jan", "rep": "fay", "revenue": 75}
    ]))
    .unwrap()
}

fn metadata(result: &ExecutionResult) -> Vec<StepMetadata> {
    result.metadata().into_iter().cloned().collect()
}

#[test]
fn test_execution_is_deterministic() {
    let steps = pipeline(json!([
        {"op": "trim_whitespace", "params": {}},
        {"op": "sample_rows", "params": {"fraction": 0.8, "seed": 11}},
        {"op": "rank", "params": {"order_by": "revenue", "descending": true, "partition_by": ["region"]}},
        {"op": "moving_average", "params": {"column": "revenue", "order_by": "month", "window": 2}},
        {"op": "profile_columns", "params": {}},
        {"op": "aggregate", "params": {"group_by": ["region"], "aggregations": [
            {"column": "revenue", "function": "sum"},
            {"column": "rep", "function": "count_distinct"}
        ]}}
    ]));

    let first = engine().execute(&sales(), &steps);
    let second = engine().execute(&sales(), &steps);

    assert!(first.success, "{:?}", first.error);
    assert_eq!(first.table, second.table);
    assert_eq!(first.table.fingerprint(), second.table.fingerprint());
    assert_eq!(metadata(&first), metadata(&second));
}

#[test]
fn test_fail_fast_containment_at_every_position() {
    let good = vec![
        json!({"op": "trim_whitespace", "params": {"columns": ["rep"]}}),
        json!({"op": "filter_rows", "params": {"column": "revenue", "operator": "not_null"}}),
        json!({"op": "sort_rows", "params": {"by": ["region", "month"]}}),
        json!({"op": "limit_rows", "params": {"count": 4}}),
    ];
    let bad = json!({"op": "select_columns", "params": {"columns": ["does_not_exist"]}});

    for k in 0..=good.len() {
        let mut steps: Vec<JsonValue> = good[..k].to_vec();
        steps.push(bad.clone());
        steps.extend(good[k..].iter().cloned());

        let result = engine().execute(&sales(), &pipeline(JsonValue::Array(steps)));
        let prefix = engine().execute(&sales(), &pipeline(JsonValue::Array(good[..k].to_vec())));

        assert!(!result.success);
        assert_eq!(result.steps.len(), k + 1, "failing at {}", k);
        assert_eq!(result.error_step, Some(k));
        assert!(result.steps[..k].iter().all(|step| step.is_success()));
        assert_eq!(result.table, prefix.table, "carried table at {}", k);
    }
}

#[test]
fn test_pivot_then_unpivot_reproduces_grouped_totals() {
    let totals_steps = pipeline(json!([
        {"op": "aggregate", "params": {"group_by": ["region", "month"], "aggregations": [
            {"column": "revenue", "function": "sum", "into": "revenue"}
        ]}},
        {"op": "sort_rows", "params": {"by": ["region", "month"]}}
    ]));
    let round_trip_steps = pipeline(json!([
        {"op": "pivot_table", "params": {
            "index": "region", "columns": "month", "values": "revenue", "aggfunc": "sum"
        }},
        {"op": "unpivot", "params": {
            "id_columns": ["region"], "value_columns": ["feb", "jan"],
            "var_name": "month", "value_name": "revenue"
        }},
        {"op": "sort_rows", "params": {"by": ["region", "month"]}}
    ]));

    let totals = engine().execute(&sales(), &totals_steps);
    let round_trip = engine().execute(&sales(), &round_trip_steps);

    assert!(totals.success, "{:?}", totals.error);
    assert!(round_trip.success, "{:?}", round_trip.error);
    assert_eq!(round_trip.table, totals.table);
}

#[test]
fn test_pivot_fill_value_stands_in_for_absent_combinations() {
    let input = Table::from_json(&json!([
        {"region": "west", "month": "jan", "revenue": 10},
        {"region": "east", "month": "feb", "revenue": 5}
    ]))
    .unwrap();
    let steps = pipeline(json!([
        {"op": "pivot_table", "params": {
            "index": "region", "columns": "month", "values": "revenue",
            "aggfunc": "sum", "fill_value": 0
        }},
        {"op": "unpivot", "params": {
            "id_columns": ["region"], "value_columns": ["feb", "jan"],
            "var_name": "month", "value_name": "revenue"
        }},
        {"op": "filter_rows", "params": {"column": "revenue", "operator": "not_equals", "value": 0}},
        {"op": "sort_rows", "params": {"by": ["region"]}}
    ]));

    let result = engine().execute(&input, &steps);

    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        serde_json::to_value(result.table.to_records()).unwrap(),
        json!([
            {"region": "east", "month": "feb", "revenue": 5},
            {"region": "west", "month": "jan", "revenue": 10}
        ])
    );
}

#[test]
fn test_trim_and_casing_are_idempotent() {
    for step in [
        json!({"op": "trim_whitespace", "params": {}}),
        json!({"op": "trim_whitespace", "params": {"columns": ["rep"], "collapse_internal": true}}),
        json!({"op": "change_text_casing", "params": {"column": "rep", "case": "upper"}}),
        json!({"op": "change_text_casing", "params": {"column": "rep", "case": "title"}}),
    ] {
        let once = engine().execute(&sales(), &pipeline(json!([step.clone()])));
        let twice = engine().execute(&sales(), &pipeline(json!([step.clone(), step.clone()])));
        assert!(once.success && twice.success);
        assert_eq!(once.table, twice.table, "{}", step);
    }
}

#[test]
fn test_window_results_are_stable_and_partition_local() {
    let steps = pipeline(json!([
        {"op": "dense_rank", "params": {"order_by": "revenue", "partition_by": ["region"]}},
        {"op": "running_total", "params": {"column": "revenue", "order_by": "month", "partition_by": ["region"]}}
    ]));
    let west_only = pipeline(json!([
        {"op": "filter_rows", "params": {"column": "region", "operator": "equals", "value": "west"}},
        {"op": "dense_rank", "params": {"order_by": "revenue", "partition_by": ["region"]}},
        {"op": "running_total", "params": {"column": "revenue", "order_by": "month", "partition_by": ["region"]}}
    ]));

    let full = engine().execute(&sales(), &steps);
    let again = engine().execute(&sales(), &steps);
    let west = engine().execute(&sales(), &west_only);

    assert!(full.success && west.success);
    assert_eq!(full.table, again.table);

    let west_from_full: Vec<JsonValue> = full
        .table
        .to_records()
        .into_iter()
        .filter(|row| row["region"] == json!("west"))
        .map(JsonValue::Object)
        .collect();
    let west_alone: Vec<JsonValue> = west
        .table
        .to_records()
        .into_iter()
        .map(JsonValue::Object)
        .collect();
    assert_eq!(west_from_full, west_alone);
}
