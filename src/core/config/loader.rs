#![allow(clippy::result_large_err)]

use super::{ConfigValidator, TidyflowConfig, CONFIG_FILE_NAME};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::env;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config from `dir/tidyflow.toml`, falling back to defaults when the
    /// file does not exist. Environment variables override file values.
    pub fn load_from_dir(dir: &Path) -> Result<TidyflowConfig, AppError> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        let config_file = Self::load_from_file(&config_path)?;
        Self::finish(config_file.unwrap_or_default())
    }

    /// Load config from an explicitly requested file, which must exist.
    pub fn load_explicit(path: &Path) -> Result<TidyflowConfig, AppError> {
        match Self::load_from_file(path)? {
            Some(config) => Self::finish(config),
            None => Err(AppError::new(
                ErrorCategory::IoError,
                format!("config file {} does not exist", path.display()),
            )
            .with_context("path", path.display().to_string())),
        }
    }

    /// Load config from a specific file path.
    /// Returns Ok(None) if the file doesn't exist.
    pub fn load_from_file(path: &Path) -> Result<Option<TidyflowConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::with_source(
                ErrorCategory::IoError,
                format!("Failed to read config file {}", path.display()),
                Box::new(e),
            )
        })?;

        let config: TidyflowConfig = toml::from_str(&content).map_err(|e| {
            AppError::with_source(
                ErrorCategory::ConfigError,
                format!("Failed to parse config file {}", path.display()),
                Box::new(e),
            )
            .with_context("path", path.display().to_string())
        })?;

        Ok(Some(config))
    }

    fn finish(mut config: TidyflowConfig) -> Result<TidyflowConfig, AppError> {
        Self::apply_env_overrides(&mut config);
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply environment variable overrides. Unparseable values are ignored.
    fn apply_env_overrides(config: &mut TidyflowConfig) {
        if let Ok(raw) = env::var("TIDYFLOW_ENGINE_SLOW_STEP_WARN_MS") {
            if let Ok(value) = raw.trim().parse::<u64>() {
                config.engine.slow_step_warn_ms = value;
            }
        }

        if let Ok(raw) = env::var("TIDYFLOW_ENGINE_LOG_STEP_METADATA") {
            if let Ok(value) = raw.trim().parse::<bool>() {
                config.engine.log_step_metadata = value;
            }
        }

        if let Ok(raw) = env::var("TIDYFLOW_ENGINE_MAX_PIPELINE_STEPS") {
            if let Ok(value) = raw.trim().parse::<usize>() {
                config.engine.max_pipeline_steps = value;
            }
        }
    }

    /// Get documentation for supported environment variables
    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "TIDYFLOW_ENGINE_SLOW_STEP_WARN_MS - Warn when a step takes longer than this (default: 500)",
            "TIDYFLOW_ENGINE_LOG_STEP_METADATA - Log step metadata at debug level (true/false, default: false)",
            "TIDYFLOW_ENGINE_MAX_PIPELINE_STEPS - Longest pipeline accepted (default: 1000)",
            "TIDYFLOW_LOG_LEVEL - Tracing directive used when RUST_LOG is unset (default: info)",
            "TIDYFLOW_LOG_CONSOLE - Console log sink: stdout, stderr or none (default: stderr)",
            "TIDYFLOW_LOG_FILE - Also write logs to this file",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_tidyflow_env() {
        for v in &[
            "TIDYFLOW_ENGINE_SLOW_STEP_WARN_MS",
            "TIDYFLOW_ENGINE_LOG_STEP_METADATA",
            "TIDYFLOW_ENGINE_MAX_PIPELINE_STEPS",
        ] {
            env::remove_var(v);
        }
    }

    #[test]
    #[serial]
    fn test_load_config_nonexistent() {
        clear_tidyflow_env();
        let temp_dir = TempDir::new().unwrap();
        let result = ConfigLoader::load_from_dir(temp_dir.path()).unwrap();
        assert_eq!(result, TidyflowConfig::default());
    }

    #[test]
    #[serial]
    fn test_load_config_valid() {
        clear_tidyflow_env();
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(CONFIG_FILE_NAME),
            r#"
[engine]
slow_step_warn_ms = 10
max_pipeline_steps = 3
"#,
        )
        .unwrap();

        let result = ConfigLoader::load_from_dir(temp_dir.path()).unwrap();
        assert_eq!(result.engine.slow_step_warn_ms, 10);
        assert_eq!(result.engine.max_pipeline_steps, 3);
        assert!(!result.engine.log_step_metadata);
    }

    #[test]
    #[serial]
    fn test_load_config_invalid_toml() {
        clear_tidyflow_env();
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "invalid toml {{").unwrap();

        let err = ConfigLoader::load_from_dir(temp_dir.path()).unwrap_err();
        assert_eq!(err.category, ErrorCategory::ConfigError);
        assert!(err.source.is_some());
        assert!(err.to_string().contains("Caused by"));
    }

    #[test]
    #[serial]
    fn test_explicit_missing_file_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = ConfigLoader::load_explicit(&temp_dir.path().join("missing.toml")).unwrap_err();
        assert_eq!(err.category, ErrorCategory::IoError);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_tidyflow_env();
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(CONFIG_FILE_NAME),
            r#"
[engine]
slow_step_warn_ms = 10
"#,
        )
        .unwrap();

        env::set_var("TIDYFLOW_ENGINE_SLOW_STEP_WARN_MS", "250");
        env::set_var("TIDYFLOW_ENGINE_LOG_STEP_METADATA", "true");

        let result = ConfigLoader::load_from_dir(temp_dir.path()).unwrap();
        assert_eq!(result.engine.slow_step_warn_ms, 250);
        assert!(result.engine.log_step_metadata);

        clear_tidyflow_env();
    }

    #[test]
    #[serial]
    fn test_invalid_env_var_values_are_ignored() {
        clear_tidyflow_env();
        let temp_dir = TempDir::new().unwrap();
        env::set_var("TIDYFLOW_ENGINE_MAX_PIPELINE_STEPS", "lots");
        env::set_var("TIDYFLOW_ENGINE_LOG_STEP_METADATA", "maybe");

        let result = ConfigLoader::load_from_dir(temp_dir.path()).unwrap();
        assert_eq!(result.engine.max_pipeline_steps, 1000);
        assert!(!result.engine.log_step_metadata);

        clear_tidyflow_env();
    }

    #[test]
    #[serial]
    fn test_env_override_is_validated() {
        clear_tidyflow_env();
        let temp_dir = TempDir::new().unwrap();
        env::set_var("TIDYFLOW_ENGINE_MAX_PIPELINE_STEPS", "0");

        let result = ConfigLoader::load_from_dir(temp_dir.path());
        clear_tidyflow_env();
        assert!(result.is_err());
    }

    #[test]
    fn test_env_var_documentation() {
        let docs = ConfigLoader::env_var_documentation();
        assert!(docs
            .iter()
            .any(|doc| doc.contains("TIDYFLOW_ENGINE_MAX_PIPELINE_STEPS")));
        assert!(docs.iter().any(|doc| doc.contains("TIDYFLOW_LOG_LEVEL")));
    }
}
