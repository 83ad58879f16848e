#![allow(clippy::result_large_err)]

use super::TidyflowConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;

pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration rules
    pub fn validate(config: &TidyflowConfig) -> Result<(), AppError> {
        if config.engine.max_pipeline_steps == 0 {
            return Err(AppError::new(
                ErrorCategory::ConfigError,
                "engine.max_pipeline_steps must be at least 1",
            )
            .with_context("key", "engine.max_pipeline_steps"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EngineConfig;

    #[test]
    fn test_validate_valid_config() {
        let config = TidyflowConfig::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_validate_zero_step_cap() {
        let config = TidyflowConfig {
            engine: EngineConfig {
                max_pipeline_steps: 0,
                ..Default::default()
            },
        };
        let result = ConfigValidator::validate(&config);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("max_pipeline_steps"));
    }
}
