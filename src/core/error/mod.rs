use crate::core::types::{ErrorCategory, ErrorSeverity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CODE_UNKNOWN_OPERATION: &str = "PIPE-OP-001";
pub const CODE_PARAMETER: &str = "PIPE-PARAM-001";
pub const CODE_EXECUTION: &str = "PIPE-EXEC-001";
pub const CODE_DUPLICATE_NAME: &str = "PIPE-REG-001";
pub const CODE_DEFINITION: &str = "PIPE-REG-002";
pub const CODE_TABLE: &str = "PIPE-TABLE-001";
pub const CODE_CONFIG: &str = "PIPE-CFG-001";

#[derive(Debug)]
pub struct AppError {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub code: String,
    pub message: String,
    pub context: BTreeMap<String, String>,
    pub recovery_suggestions: Vec<String>,
    pub source: Option<anyhow::Error>,
}

impl AppError {
    pub fn new<T: Into<String>>(category: ErrorCategory, message: T) -> Self {
        let (severity, code) = match category {
            ErrorCategory::UnknownOperationError => (ErrorSeverity::Error, CODE_UNKNOWN_OPERATION),
            ErrorCategory::ParameterError => (ErrorSeverity::Error, CODE_PARAMETER),
            ErrorCategory::ExecutionError => (ErrorSeverity::Error, CODE_EXECUTION),
            ErrorCategory::DuplicateNameError => (ErrorSeverity::Fatal, CODE_DUPLICATE_NAME),
            ErrorCategory::DefinitionError => (ErrorSeverity::Fatal, CODE_DEFINITION),
            ErrorCategory::TableError => (ErrorSeverity::Error, CODE_TABLE),
            ErrorCategory::ConfigError => (ErrorSeverity::Fatal, CODE_CONFIG),
            ErrorCategory::SerializationError => (ErrorSeverity::Error, "PIPE-SER-001"),
            ErrorCategory::IoError => (ErrorSeverity::Error, "PIPE-IO-001"),
            ErrorCategory::InternalError => (ErrorSeverity::Error, "PIPE-INT-001"),
        };
        AppError {
            category,
            severity,
            code: code.to_string(),
            message: message.into(),
            context: BTreeMap::new(),
            recovery_suggestions: vec![],
            source: None,
        }
    }

    /// Operation name that is not present in the registry.
    pub fn unknown_operation(name: &str) -> Self {
        AppError::new(
            ErrorCategory::UnknownOperationError,
            format!("operation '{}' is not registered", name),
        )
        .with_context("operation", name)
        .with_suggestion("Use one of the names returned by list_primitives")
    }

    /// Invalid parameter; `key` names the offending parameter.
    pub fn parameter<K: Into<String>, T: Into<String>>(key: K, reason: T) -> Self {
        let key = key.into();
        let reason = reason.into();
        AppError::new(
            ErrorCategory::ParameterError,
            format!("invalid parameter '{}': {}", key, reason),
        )
        .with_context("parameter", key)
        .with_suggestion("Correct the operation parameters and resubmit the pipeline")
    }

    /// Data problem discovered while running a valid operation.
    pub fn execution<T: Into<String>>(message: T) -> Self {
        AppError::new(ErrorCategory::ExecutionError, message)
            .with_suggestion("Insert a cleaning step before this operation or relax its options")
    }

    pub fn duplicate_name(name: &str) -> Self {
        AppError::new(
            ErrorCategory::DuplicateNameError,
            format!("primitive '{}' is already registered", name),
        )
        .with_context("primitive", name)
    }

    pub fn definition<T: Into<String>>(name: &str, reason: T) -> Self {
        AppError::new(
            ErrorCategory::DefinitionError,
            format!("primitive '{}' has an invalid definition: {}", name, reason.into()),
        )
        .with_context("primitive", name)
    }

    pub fn with_source<T: Into<String>>(
        category: ErrorCategory,
        message: T,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        let mut error = AppError::new(category, message);
        error.source = Some(anyhow::anyhow!(source));
        error
    }

    pub fn with_context<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_row(self, row: usize) -> Self {
        self.with_context("row", row.to_string())
    }

    pub fn with_code<T: Into<String>>(mut self, code: T) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_suggestion<T: Into<String>>(mut self, suggestion: T) -> Self {
        self.recovery_suggestions.push(suggestion.into());
        self
    }

    pub fn add_context(&mut self, key: &str, value: &str) {
        self.context.insert(key.to_string(), value.to_string());
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    /// Serializable projection used in execution results.
    pub fn summary(&self) -> ErrorSummary {
        ErrorSummary {
            code: self.code.clone(),
            category: self.category,
            message: self.message.clone(),
            context: self.context.clone(),
            recovery_suggestions: self.recovery_suggestions.clone(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.category, self.message)?;
        if !self.context.is_empty() {
            write!(f, " (Context: {:?})", self.context)?;
        }
        if let Some(ref source) = self.source {
            write!(f, "\nCaused by: {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        let mut error = AppError::new(ErrorCategory::InternalError, e.to_string())
            .with_code("ANYHOW_ERROR")
            .with_suggestion("Check the error details");
        error.source = Some(e);
        error
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        let mut error = AppError::new(ErrorCategory::IoError, e.to_string())
            .with_code("IO_ERROR")
            .with_suggestion("Check file permissions and paths");
        error.source = Some(anyhow::anyhow!(e));
        error
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        let mut error = AppError::new(ErrorCategory::SerializationError, e.to_string());
        error.source = Some(anyhow::anyhow!(e));
        error
    }
}

/// Serializable error record attached to failed steps and execution results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub code: String,
    pub category: ErrorCategory,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recovery_suggestions: Vec<String>,
}

impl std::fmt::Display for ErrorSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.category, self.message)
    }
}

pub trait ErrorReporter {
    fn report_error(&self, error: &AppError);
    fn report_summary(&self, summary: &ErrorSummary, step_index: Option<usize>);
    fn report_warning(&self, message: &str, context: Option<String>);
}

pub struct DefaultErrorReporter;

impl DefaultErrorReporter {
    pub fn new() -> Self {
        DefaultErrorReporter
    }
}

impl Default for DefaultErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorReporter for DefaultErrorReporter {
    fn report_error(&self, error: &AppError) {
        eprintln!("[ERROR] {}: {}", error.code, error.message);
        if !error.context.is_empty() {
            eprintln!("  Context: {:?}", error.context);
        }
        for suggestion in &error.recovery_suggestions {
            eprintln!("  Hint: {}", suggestion);
        }
        if let Some(ref source) = error.source {
            eprintln!("  Caused by: {}", source);
        }
    }

    fn report_summary(&self, summary: &ErrorSummary, step_index: Option<usize>) {
        match step_index {
            Some(index) => eprintln!("[ERROR] step {}: {}", index, summary),
            None => eprintln!("[ERROR] {}", summary),
        }
        if !summary.context.is_empty() {
            eprintln!("  Context: {:?}", summary.context);
        }
        for suggestion in &summary.recovery_suggestions {
            eprintln!("  Hint: {}", suggestion);
        }
    }

    fn report_warning(&self, message: &str, context: Option<String>) {
        eprintln!("[WARNING] {}", message);
        if let Some(ref ctx) = context {
            eprintln!("  Context: {}", ctx);
        }
    }
}
