use serde_json::{json, Value as JsonValue};
use tidyflow::core::pipeline::{Engine, Pipeline, Registry, StepMetadata};
use tidyflow::core::table::{Table, Value};
use tidyflow::core::types::{ErrorCategory, ExecutionStatus};

fn engine() -> Engine {
    Engine::new(Registry::builtin().unwrap())
}

fn table(records: JsonValue) -> Table {
    Table::from_json(&records).unwrap()
}

fn pipeline(steps: JsonValue) -> Pipeline {
    serde_json::from_value(steps).unwrap()
}

#[test]
fn test_dedup_scenario() {
    let input = table(json!([{"id": 1}, {"id": 2}, {"id": 1}]));
    let steps = pipeline(json!([{"op": "remove_duplicates", "params": {"subset": ["id"]}}]));

    let result = engine().execute(&input, &steps);

    assert!(result.success);
    assert_eq!(result.table.row_count(), 2);
    assert_eq!(result.status, ExecutionStatus::Completed);
    match result.steps[0].metadata() {
        Some(StepMetadata::Rows(facts)) => {
            assert_eq!(facts.rows_before, 3);
            assert_eq!(facts.rows_after, 2);
            assert_eq!(facts.rows_removed, 1);
        }
        other => panic!("unexpected metadata {:?}", other),
    }
}

#[test]
fn test_invalid_column_scenario() {
    let input = table(json!([{"name": "ann"}]));
    let steps = pipeline(json!([
        {"op": "change_text_casing", "params": {"column": "missing_col", "case": "title"}}
    ]));

    let result = engine().execute(&input, &steps);

    assert!(!result.success);
    assert_eq!(result.error_step, Some(0));
    assert_eq!(result.steps.len(), 1);
    let error = result.error.unwrap();
    assert_eq!(error.category, ErrorCategory::ParameterError);
    assert!(error.message.contains("missing_col"));
    assert_eq!(result.table, input);
}

#[test]
fn test_chained_fail_fast_scenario() {
    let input = table(json!([
        {"name": "  Ann  ", "age": 31},
        {"name": "Bob ", "age": 40}
    ]));
    let steps = pipeline(json!([
        {"op": "trim_whitespace", "params": {"columns": ["name"]}},
        {"op": "change_column_type", "params": {"column": "name", "to_type": "integer"}}
    ]));

    let result = engine().execute(&input, &steps);

    assert!(!result.success);
    assert_eq!(result.steps.len(), 2);
    assert!(result.steps[0].is_success());
    assert!(!result.steps[1].is_success());
    assert_eq!(result.error_step, Some(1));
    assert_eq!(result.status, ExecutionStatus::Halted(1));

    let trimmed = engine().execute(
        &input,
        &pipeline(json!([{"op": "trim_whitespace", "params": {"columns": ["name"]}}])),
    );
    assert_eq!(result.table, trimmed.table);
    assert_eq!(result.table.cell("name", 0), Some(&Value::str("Ann")));
    assert_eq!(result.table.cell("age", 1), Some(&Value::Int(40)));
}

#[test]
fn test_unknown_operation_is_reported_at_its_index() {
    let input = table(json!([{"a": 1}]));
    let steps = pipeline(json!([
        {"op": "limit_rows", "params": {"count": 1}},
        {"op": "limit_rows", "params": {"count": 1}},
        {"op": "make_it_pretty", "params": {}}
    ]));

    let result = engine().execute(&input, &steps);

    assert_eq!(result.error_step, Some(2));
    assert_eq!(result.steps.len(), 3);
    let error = result.error.unwrap();
    assert_eq!(error.category, ErrorCategory::UnknownOperationError);
    assert_eq!(error.context.get("operation"), Some(&"make_it_pretty".to_string()));
}

#[test]
fn test_malformed_params_fail_before_touching_the_table() {
    let input = table(json!([{"a": 1}, {"a": 2}]));
    let steps = pipeline(json!([{"op": "limit_rows", "params": {"count": "two"}}]));

    let result = engine().execute(&input, &steps);

    let error = result.error.unwrap();
    assert_eq!(error.category, ErrorCategory::ParameterError);
    assert_eq!(result.table, input);
}

#[test]
fn test_cleaning_pipeline_end_to_end() {
    let input = table(json!([
        {"customer": " ann lee ", "state": "Calif.", "amount": "$1,200.50", "signup": "2024-01-31"},
        {"customer": "BOB RAY", "state": "California", "amount": "$80", "signup": "2024-02-15"},
        {"customer": "cy wu", "state": "N.Y.", "amount": null, "signup": "2024-03-01"}
    ]));
    let steps = pipeline(json!([
        {"op": "trim_whitespace", "params": {}},
        {"op": "change_text_casing", "params": {"column": "customer", "case": "title"}},
        {"op": "standardize_values", "params": {"column": "state", "mapping": {"CA": ["California", "Calif."], "NY": ["N.Y."]}}},
        {"op": "parse_numeric", "params": {"column": "amount"}},
        {"op": "fill_missing", "params": {"column": "amount", "strategy": "value", "value": 0}},
        {"op": "parse_dates", "params": {"column": "signup", "formats": ["%Y-%m-%d"]}},
        {"op": "extract_date_part", "params": {"column": "signup", "part": "month", "into": "signup_month"}},
        {"op": "sort_rows", "params": {"by": [{"column": "amount", "descending": true}]}}
    ]));

    let result = engine().execute(&input, &steps);

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.steps.len(), 8);
    let records = result.table.to_records();
    assert_eq!(records[0]["customer"], json!("Ann Lee"));
    assert_eq!(records[0]["state"], json!("CA"));
    assert_eq!(records[0]["amount"], json!(1200.5));
    assert_eq!(records[0]["signup_month"], json!(1));
    assert_eq!(records[1]["customer"], json!("Bob Ray"));
    assert_eq!(records[2]["state"], json!("NY"));
    assert_eq!(records[2]["amount"], json!(0.0));
}

#[test]
fn test_join_reports_unmatched_rows() {
    let orders = table(json!([
        {"order_id": 10, "customer_id": 1},
        {"order_id": 11, "customer_id": 2},
        {"order_id": 12, "customer_id": 3}
    ]));
    let steps = pipeline(json!([{
        "op": "join_tables",
        "params": {
            "right": [
                {"customer_id": 1, "name": "Ann"},
                {"customer_id": 2, "name": "Bob"},
                {"customer_id": 4, "name": "Dee"}
            ],
            "on": ["customer_id"],
            "how": "left"
        }
    }]));

    let result = engine().execute(&orders, &steps);

    assert!(result.success, "{:?}", result.error);
    match result.steps[0].metadata() {
        Some(StepMetadata::Join(facts)) => {
            assert_eq!(facts.matched_rows, 2);
            assert_eq!(facts.unmatched_left, 1);
            assert_eq!(facts.unmatched_right, 1);
            assert_eq!(facts.rows_after, 3);
        }
        other => panic!("unexpected metadata {:?}", other),
    }
    assert_eq!(result.table.cell("name", 2), Some(&Value::Null));
}

#[test]
fn test_quality_checks_never_mutate_the_table() {
    let input = table(json!([
        {"status": "active", "email": "a@example.com", "score": 10.0},
        {"status": "paused", "email": "not-an-email", "score": 12.0},
        {"status": "deleted", "email": "c@example.com", "score": 95.0}
    ]));
    let steps = pipeline(json!([
        {"op": "detect_schema_drift", "params": {"expected_columns": ["status", "email", "signup"]}},
        {"op": "check_enum_values", "params": {"column": "status", "allowed": ["active", "paused"]}},
        {"op": "validate_format", "params": {"column": "email", "format": "email"}},
        {"op": "detect_distribution_drift", "params": {"column": "score", "baseline": {"mean": 11.0, "std": 1.0}, "threshold": 2.0}},
        {"op": "profile_columns", "params": {}}
    ]));

    let result = engine().execute(&input, &steps);

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.table, input);
    let detected: Vec<bool> = result
        .metadata()
        .into_iter()
        .map(|metadata| match metadata {
            StepMetadata::Quality(report) => report.drift_detected,
            other => panic!("unexpected metadata {:?}", other),
        })
        .collect();
    assert_eq!(detected, vec![true, true, true, true, false]);
}

#[test]
fn test_result_json_shape() {
    let input = table(json!([{"a": 1}, {"a": 2}]));
    let steps = pipeline(json!([
        {"op": "limit_rows", "params": {"count": 1}},
        {"op": "drop_columns", "params": {"columns": ["nope"]}}
    ]));

    let result = engine().execute(&input, &steps);
    let encoded = serde_json::to_value(&result).unwrap();

    assert_eq!(encoded["success"], json!(false));
    assert_eq!(encoded["error_step"], json!(1));
    assert_eq!(encoded["table"]["row_count"], json!(1));
    assert_eq!(encoded["table"]["columns"][0]["name"], json!("a"));
    assert_eq!(encoded["steps"][0]["status"], json!("success"));
    assert_eq!(encoded["steps"][1]["status"], json!("failed"));
    assert_eq!(encoded["steps"][1]["error"]["category"], json!("ParameterError"));
    assert_eq!(encoded["error"]["code"], json!("PIPE-PARAM-001"));
}
