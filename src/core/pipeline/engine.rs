#![allow(clippy::result_large_err)]

use crate::core::config::EngineConfig;
use crate::core::error::{AppError, ErrorSummary};
use crate::core::pipeline::metadata::StepMetadata;
use crate::core::pipeline::operation::{Operation, Pipeline};
use crate::core::pipeline::primitive::StepOutput;
use crate::core::pipeline::registry::Registry;
use crate::core::table::Table;
use crate::core::types::ExecutionStatus;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Outcome of one executed (or attempted) step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Success { metadata: StepMetadata },
    Failed { error: ErrorSummary },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_index: usize,
    pub operation: String,
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

impl StepResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, StepOutcome::Success { .. })
    }

    pub fn metadata(&self) -> Option<&StepMetadata> {
        match &self.outcome {
            StepOutcome::Success { metadata } => Some(metadata),
            StepOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorSummary> {
        match &self.outcome {
            StepOutcome::Success { .. } => None,
            StepOutcome::Failed { error } => Some(error),
        }
    }
}

/// Result of running a whole pipeline.
///
/// On failure `table` is the output of the last successful step (or the input when the
/// first step failed) and `steps` ends with the failing step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub table: Table,
    pub steps: Vec<StepResult>,
    pub error: Option<ErrorSummary>,
    pub error_step: Option<usize>,
    #[serde(rename = "total_duration_ms", with = "duration_ms")]
    pub total_duration: Duration,
    pub status: ExecutionStatus,
}

impl ExecutionResult {
    /// Metadata of every successful step, in order.
    pub fn metadata(&self) -> Vec<&StepMetadata> {
        self.steps.iter().filter_map(StepResult::metadata).collect()
    }
}

/// Sequential, fail-fast pipeline executor.
#[derive(Debug, Clone)]
pub struct Engine {
    registry: Registry,
    config: EngineConfig,
}

impl Engine {
    pub fn new(registry: Registry) -> Self {
        Self::with_config(registry, EngineConfig::default())
    }

    pub fn with_config(registry: Registry, config: EngineConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `pipeline` against `input`. Never mutates `input`; never panics on bad requests.
    pub fn execute(&self, input: &Table, pipeline: &Pipeline) -> ExecutionResult {
        let span = tracing::info_span!(
            "pipeline",
            steps = pipeline.len(),
            rows = input.row_count(),
            columns = input.column_count()
        );
        let _guard = span.enter();
        let started = Instant::now();
        let mut current = input.clone();
        let mut steps = Vec::with_capacity(pipeline.len());

        for (index, operation) in pipeline.iter().enumerate() {
            tracing::debug!(step = index, operation = %operation.name, "running step");
            let step_started = Instant::now();
            let outcome = self.run_step(index, operation, &current);
            let duration = step_started.elapsed();

            match outcome {
                Ok(output) => {
                    self.log_success(index, operation, &output, duration);
                    steps.push(StepResult {
                        step_index: index,
                        operation: operation.name.clone(),
                        duration,
                        outcome: StepOutcome::Success {
                            metadata: output.metadata,
                        },
                    });
                    current = output.table;
                }
                Err(mut error) => {
                    error.add_context("step_index", &index.to_string());
                    error.add_context("operation", &operation.name);
                    tracing::warn!(
                        step = index,
                        operation = %operation.name,
                        code = %error.code,
                        category = %error.category,
                        "pipeline halted: {}",
                        error.message
                    );
                    let summary = error.summary();
                    steps.push(StepResult {
                        step_index: index,
                        operation: operation.name.clone(),
                        duration,
                        outcome: StepOutcome::Failed {
                            error: summary.clone(),
                        },
                    });
                    return ExecutionResult {
                        success: false,
                        table: current,
                        steps,
                        error: Some(summary),
                        error_step: Some(index),
                        total_duration: started.elapsed(),
                        status: ExecutionStatus::Halted(index),
                    };
                }
            }
        }

        let total_duration = started.elapsed();
        tracing::info!(
            steps = steps.len(),
            rows = current.row_count(),
            duration_ms = total_duration.as_millis() as u64,
            "pipeline completed"
        );
        ExecutionResult {
            success: true,
            table: current,
            steps,
            error: None,
            error_step: None,
            total_duration,
            status: ExecutionStatus::Completed,
        }
    }

    fn run_step(
        &self,
        index: usize,
        operation: &Operation,
        table: &Table,
    ) -> Result<StepOutput, AppError> {
        if index >= self.config.max_pipeline_steps {
            return Err(AppError::parameter(
                "pipeline",
                format!(
                    "pipeline exceeds the configured maximum of {} steps",
                    self.config.max_pipeline_steps
                ),
            ));
        }
        let entry = self
            .registry
            .get(&operation.name)
            .ok_or_else(|| AppError::unknown_operation(&operation.name))?;
        let primitive = entry.implementation();
        primitive.validate(&operation.params, table)?;
        primitive.execute(table, &operation.params)
    }

    fn log_success(&self, index: usize, operation: &Operation, output: &StepOutput, duration: Duration) {
        let elapsed_ms = duration.as_millis() as u64;
        if elapsed_ms > self.config.slow_step_warn_ms {
            tracing::warn!(
                step = index,
                operation = %operation.name,
                duration_ms = elapsed_ms,
                threshold_ms = self.config.slow_step_warn_ms,
                "slow pipeline step"
            );
        }
        tracing::info!(
            step = index,
            operation = %operation.name,
            kind = output.metadata.kind(),
            rows = output.table.row_count(),
            columns = output.table.column_count(),
            duration_ms = elapsed_ms,
            "step completed"
        );
        if self.config.log_step_metadata {
            match serde_json::to_string(&output.metadata) {
                Ok(encoded) => tracing::debug!(step = index, metadata = %encoded, "step metadata"),
                Err(err) => tracing::debug!(step = index, "metadata not serializable: {}", err),
            }
        }
    }
}

/// Durations travel as fractional milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = f64::deserialize(deserializer)?;
        if !millis.is_finite() || millis < 0.0 {
            return Err(serde::de::Error::custom(format!(
                "invalid duration {} ms",
                millis
            )));
        }
        Ok(Duration::from_secs_f64(millis / 1000.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ErrorCategory;
    use serde_json::json;

    fn engine() -> Engine {
        Engine::new(Registry::builtin().unwrap())
    }

    fn orders() -> Table {
        Table::from_json(&json!([
            {"id": 1, "status": "open"},
            {"id": 2, "status": "closed"},
            {"id": 3, "status": "open"}
        ]))
        .unwrap()
    }

    #[test]
    fn test_empty_pipeline_returns_input() {
        let input = orders();
        let result = engine().execute(&input, &Pipeline::default());
        assert!(result.success);
        assert!(result.steps.is_empty());
        assert_eq!(result.table, input);
        assert_eq!(result.status, ExecutionStatus::Completed);
    }

    #[test]
    fn test_unknown_operation_halts_at_its_index() {
        let pipeline = Pipeline::default()
            .then("filter_rows", json!({"column": "status", "operator": "equals", "value": "open"}))
            .then("explode_everything", json!({}));
        let result = engine().execute(&orders(), &pipeline);
        assert!(!result.success);
        assert_eq!(result.error_step, Some(1));
        assert_eq!(result.steps.len(), 2);
        assert_eq!(result.table.row_count(), 2);
        let error = result.error.unwrap();
        assert_eq!(error.category, ErrorCategory::UnknownOperationError);
        assert_eq!(error.context.get("step_index"), Some(&"1".to_string()));
        assert_eq!(result.status, ExecutionStatus::Halted(1));
    }

    #[test]
    fn test_step_cap_is_enforced() {
        let config = EngineConfig {
            max_pipeline_steps: 1,
            ..EngineConfig::default()
        };
        let engine = Engine::with_config(Registry::builtin().unwrap(), config);
        let pipeline = Pipeline::default()
            .then("limit_rows", json!({"count": 2}))
            .then("limit_rows", json!({"count": 1}));
        let result = engine.execute(&orders(), &pipeline);
        assert_eq!(result.error_step, Some(1));
        let error = result.error.unwrap();
        assert_eq!(error.category, ErrorCategory::ParameterError);
        assert_eq!(error.context.get("parameter"), Some(&"pipeline".to_string()));
        assert_eq!(result.table.row_count(), 2);
    }

    #[test]
    fn test_result_serializes_with_flattened_status() {
        let pipeline = Pipeline::default().then("limit_rows", json!({"count": 1}));
        let result = engine().execute(&orders(), &pipeline);
        let encoded = serde_json::to_value(&result).unwrap();
        assert_eq!(encoded["success"], json!(true));
        assert_eq!(encoded["steps"][0]["status"], json!("success"));
        assert_eq!(encoded["steps"][0]["metadata"]["kind"], json!("rows"));
        assert!(encoded["steps"][0]["duration_ms"].is_number());
        assert!(encoded["total_duration_ms"].is_number());
        assert_eq!(encoded["error"], json!(null));
    }
}
