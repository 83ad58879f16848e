//! tidyflow: deterministic, fail-fast transformation pipelines over in-memory tables.
//!
//! Build a [`Registry`](core::pipeline::Registry) (usually [`Registry::builtin`](core::pipeline::Registry::builtin)),
//! hand it to an [`Engine`](core::pipeline::Engine) and execute a
//! [`Pipeline`](core::pipeline::Pipeline) of `{op, params}` steps against a
//! [`Table`](core::table::Table).

pub mod cli;
pub mod core;
pub mod logging;
pub mod utils;

/// Current crate version string exposed for CLI and tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub type Result<T> = std::result::Result<T, anyhow::Error>;
