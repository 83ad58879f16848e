use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value as JsonValue};
use std::fs;
use tempfile::TempDir;

fn tidyflow(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tidyflow").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("RUST_LOG")
        .env("TIDYFLOW_LOG_CONSOLE", "none");
    cmd
}

fn write_inputs(dir: &TempDir, pipeline_name: &str, pipeline: &str) {
    fs::write(
        dir.path().join("orders.json"),
        json!([
            {"id": 1, "status": " open "},
            {"id": 2, "status": "closed"},
            {"id": 1, "status": " open "}
        ])
        .to_string(),
    )
    .unwrap();
    fs::write(dir.path().join(pipeline_name), pipeline).unwrap();
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    tidyflow(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("COMMANDS"))
        .stdout(predicate::str::contains("describe"))
        .stdout(predicate::str::contains("examples"));
}

#[test]
fn test_run_yaml_pipeline_prints_result() {
    let dir = TempDir::new().unwrap();
    write_inputs(
        &dir,
        "clean.yaml",
        "- op: remove_duplicates\n  params:\n    subset: [id]\n- op: trim_whitespace\n",
    );

    let output = tidyflow(&dir)
        .args(["run", "--table", "orders.json", "--pipeline", "clean.yaml"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let result: JsonValue = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["success"], json!(true));
    assert_eq!(result["table"]["row_count"], json!(2));
    assert_eq!(result["steps"].as_array().unwrap().len(), 2);
}

#[test]
fn test_halted_pipeline_exits_with_two_and_writes_output_file() {
    let dir = TempDir::new().unwrap();
    write_inputs(
        &dir,
        "bad.json",
        &json!([
            {"op": "trim_whitespace", "params": {"columns": ["status"]}},
            {"op": "change_column_type", "params": {"column": "status", "to_type": "integer"}}
        ])
        .to_string(),
    );

    tidyflow(&dir)
        .args([
            "run",
            "--table",
            "orders.json",
            "--pipeline",
            "bad.json",
            "--output",
            "result.json",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("step 1"));

    let result: JsonValue =
        serde_json::from_str(&fs::read_to_string(dir.path().join("result.json")).unwrap()).unwrap();
    assert_eq!(result["success"], json!(false));
    assert_eq!(result["error_step"], json!(1));
    assert_eq!(result["error"]["category"], json!("ExecutionError"));
}

#[test]
fn test_missing_table_is_a_host_error() {
    let dir = TempDir::new().unwrap();
    write_inputs(&dir, "p.json", "[]");

    tidyflow(&dir)
        .args(["run", "--table", "nope.json", "--pipeline", "p.json"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("nope.json"));
}

#[test]
fn test_explicit_config_is_applied() {
    let dir = TempDir::new().unwrap();
    write_inputs(
        &dir,
        "p.json",
        &json!([
            {"op": "limit_rows", "params": {"count": 2}},
            {"op": "limit_rows", "params": {"count": 1}}
        ])
        .to_string(),
    );
    fs::write(dir.path().join("strict.toml"), "[engine]\nmax_pipeline_steps = 1\n").unwrap();

    tidyflow(&dir)
        .args([
            "run",
            "--table",
            "orders.json",
            "--pipeline",
            "p.json",
            "--config",
            "strict.toml",
        ])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("configured maximum of 1 steps"));
}

#[test]
fn test_list_filters_by_category() {
    let dir = TempDir::new().unwrap();
    tidyflow(&dir)
        .args(["list", "--category", "joins"])
        .assert()
        .success()
        .stdout(predicate::str::contains("join_tables"))
        .stdout(predicate::str::contains("union_tables"))
        .stdout(predicate::str::contains("filter_rows").not());
}

#[test]
fn test_describe_known_and_unknown_primitives() {
    let dir = TempDir::new().unwrap();
    let output = tidyflow(&dir).args(["describe", "ntile"]).output().unwrap();
    assert!(output.status.success());
    let definition: JsonValue = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(definition["name"], json!("ntile"));
    assert_eq!(definition["category"], json!("numeric_window"));

    tidyflow(&dir)
        .args(["describe", "teleport"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("teleport"));
}

#[test]
fn test_docs_and_examples() {
    let dir = TempDir::new().unwrap();
    tidyflow(&dir)
        .arg("docs")
        .assert()
        .success()
        .stdout(predicate::str::contains("### `pivot_table`"));

    let output = tidyflow(&dir).arg("examples").output().unwrap();
    let prompts: JsonValue = serde_json::from_slice(&output.stdout).unwrap();
    assert!(prompts.as_array().unwrap().len() >= 49 * 3);
}
