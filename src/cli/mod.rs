pub mod args;
pub mod commands;

pub use args::{DescribeArgs, ListArgs, RunArgs};
use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;

use crate::core::config::CONFIG_FILE_NAME;

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
COMMANDS:\n{subcommands}\n";

#[derive(Parser, Debug)]
#[command(name = "tidyflow")]
#[command(version = crate::VERSION)]
#[command(about = "Deterministic table transformation pipelines")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: browse primitives with list/describe, write a pipeline file, then run it against a table."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(
        about = "Execute a pipeline against a table",
        long_about = "Run applies each step in order and stops at the first failure. The execution result (final table, per-step metadata, error) is printed as JSON. Exits 2 when the pipeline halted.",
        after_help = "Example:\n    tidyflow run --table orders.json --pipeline clean.yaml --output result.json"
    )]
    Run(RunArgs),
    #[command(
        about = "List registered primitives",
        long_about = "List prints every registered primitive name with its category, sorted by name.",
        after_help = "Example:\n    tidyflow list --category joins"
    )]
    List(ListArgs),
    #[command(
        about = "Show one primitive's parameters and examples",
        long_about = "Describe prints the primitive definition (category, description, parameter contract, example prompts) as JSON.",
        after_help = "Example:\n    tidyflow describe pivot_table"
    )]
    Describe(DescribeArgs),
    #[command(
        about = "Print the Markdown reference for all primitives",
        after_help = "Example:\n    tidyflow docs > PRIMITIVES.md"
    )]
    Docs,
    #[command(
        about = "Print every example prompt with its expected params",
        after_help = "Example:\n    tidyflow examples > prompts.json"
    )]
    Examples,
}

impl Command {
    /// Config file consulted for this invocation: `--config` when given, else the
    /// working-directory default.
    pub fn config_file(&self) -> Option<PathBuf> {
        match self {
            Command::Run(args) if args.config.is_some() => args.config.clone(),
            _ => env::current_dir().ok().map(|cwd| cwd.join(CONFIG_FILE_NAME)),
        }
    }
}

/// Dispatch a parsed command; returns the process exit code.
pub fn run(args: Args) -> crate::Result<u8> {
    match args.command {
        Command::Run(run_args) => commands::run(run_args),
        Command::List(list_args) => commands::list(list_args),
        Command::Describe(describe_args) => commands::describe(describe_args),
        Command::Docs => commands::docs(),
        Command::Examples => commands::examples(),
    }
}
