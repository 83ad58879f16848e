use serde::{Deserialize, Serialize};

/// File looked up in the working directory when no `--config` is given.
pub const CONFIG_FILE_NAME: &str = "tidyflow.toml";

/// Main configuration loaded from tidyflow.toml. The `[logging]` table is
/// read separately by `crate::logging::config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TidyflowConfig {
    /// Engine configuration
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Steps slower than this are logged at warn level
    #[serde(default = "default_slow_step_warn_ms")]
    pub slow_step_warn_ms: u64,

    /// Log every step's metadata at debug level
    #[serde(default)]
    pub log_step_metadata: bool,

    /// Longest pipeline the engine will run
    #[serde(default = "default_max_pipeline_steps")]
    pub max_pipeline_steps: usize,
}

fn default_slow_step_warn_ms() -> u64 {
    500
}

fn default_max_pipeline_steps() -> usize {
    1000
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            slow_step_warn_ms: default_slow_step_warn_ms(),
            log_step_metadata: false,
            max_pipeline_steps: default_max_pipeline_steps(),
        }
    }
}


pub mod loader;
pub mod validation;

pub use loader::ConfigLoader;
pub use validation::ConfigValidator;
