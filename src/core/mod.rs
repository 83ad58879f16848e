pub mod config;
pub mod error;
pub mod pipeline;
pub mod table;
pub mod types;

pub use config::{ConfigLoader, ConfigValidator, EngineConfig, TidyflowConfig};
pub use error::{AppError, DefaultErrorReporter, ErrorReporter, ErrorSummary};
pub use pipeline::{Engine, ExecutionResult, Operation, Pipeline, Registry, StepResult};
pub use table::{Column, DataType, Table, TableError, Value};
pub use types::*;
