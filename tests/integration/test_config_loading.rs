use serde_json::json;
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;
use tidyflow::core::config::{ConfigLoader, CONFIG_FILE_NAME};
use tidyflow::core::pipeline::{Engine, Pipeline, Registry};
use tidyflow::core::table::Table;
use tidyflow::core::types::ErrorCategory;
use tidyflow::logging::{ConsoleOutput, LoggingConfig};

fn clear_tidyflow_env() {
    for v in &[
        "TIDYFLOW_ENGINE_SLOW_STEP_WARN_MS",
        "TIDYFLOW_ENGINE_LOG_STEP_METADATA",
        "TIDYFLOW_ENGINE_MAX_PIPELINE_STEPS",
        "TIDYFLOW_LOG_LEVEL",
        "TIDYFLOW_LOG_CONSOLE",
        "TIDYFLOW_LOG_FILE",
    ] {
        env::remove_var(v);
    }
}

/// One file feeds both the engine and the logging sections.
#[test]
#[serial]
fn test_single_file_configures_engine_and_logging() {
    clear_tidyflow_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(CONFIG_FILE_NAME);
    fs::write(
        &path,
        r#"
[engine]
slow_step_warn_ms = 5
log_step_metadata = true
max_pipeline_steps = 2

[logging]
default_level = "warn"
console_output = "stdout"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_explicit(&path).unwrap();
    let logging = LoggingConfig::load(Some(&path)).unwrap();

    assert_eq!(config.engine.slow_step_warn_ms, 5);
    assert!(config.engine.log_step_metadata);
    assert_eq!(config.engine.max_pipeline_steps, 2);
    assert_eq!(logging.default_level, "warn");
    assert_eq!(logging.console_output, ConsoleOutput::Stdout);
    assert!(logging.log_file.is_none());
}

#[test]
#[serial]
fn test_step_cap_from_config_halts_long_pipelines() {
    clear_tidyflow_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join(CONFIG_FILE_NAME),
        "[engine]\nmax_pipeline_steps = 2\n",
    )
    .unwrap();

    let config = ConfigLoader::load_from_dir(temp_dir.path()).unwrap();
    let engine = Engine::with_config(Registry::builtin().unwrap(), config.engine);
    let input = Table::from_json(&json!([{"n": 3}, {"n": 1}, {"n": 2}])).unwrap();
    let pipeline: Pipeline = serde_json::from_value(json!([
        {"op": "sort_rows", "params": {"by": ["n"]}},
        {"op": "limit_rows", "params": {"count": 2}},
        {"op": "limit_rows", "params": {"count": 1}}
    ]))
    .unwrap();

    let result = engine.execute(&input, &pipeline);

    assert_eq!(result.error_step, Some(2));
    assert_eq!(result.table.row_count(), 2);
    assert_eq!(result.error.unwrap().category, ErrorCategory::ParameterError);
}

#[test]
#[serial]
fn test_env_overrides_win_over_file() {
    clear_tidyflow_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join(CONFIG_FILE_NAME),
        "[engine]\nslow_step_warn_ms = 5\n\n[logging]\ndefault_level = \"warn\"\n",
    )
    .unwrap();

    env::set_var("TIDYFLOW_ENGINE_SLOW_STEP_WARN_MS", "900");
    env::set_var("TIDYFLOW_LOG_LEVEL", "debug");
    env::set_var("TIDYFLOW_LOG_FILE", temp_dir.path().join("run.log"));

    let config = ConfigLoader::load_from_dir(temp_dir.path()).unwrap();
    let logging = LoggingConfig::load(Some(&temp_dir.path().join(CONFIG_FILE_NAME))).unwrap();
    clear_tidyflow_env();

    assert_eq!(config.engine.slow_step_warn_ms, 900);
    assert_eq!(logging.default_level, "debug");
    assert_eq!(logging.log_file, Some(temp_dir.path().join("run.log")));
}

#[test]
#[serial]
fn test_invalid_values_are_rejected() {
    clear_tidyflow_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(CONFIG_FILE_NAME);

    fs::write(&path, "[engine]\nmax_pipeline_steps = 0\n").unwrap();
    let err = ConfigLoader::load_explicit(&path).unwrap_err();
    assert_eq!(err.category, ErrorCategory::ConfigError);

    fs::write(&path, "[engine]\nmax_pipeline_steps = \"many\"\n").unwrap();
    let err = ConfigLoader::load_explicit(&path).unwrap_err();
    assert_eq!(err.category, ErrorCategory::ConfigError);

    fs::write(&path, "[logging]\nconsole_output = \"syslog\"\n").unwrap();
    assert!(LoggingConfig::load(Some(&path)).is_err());
}
