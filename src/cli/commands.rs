use crate::{
    cli::args::{DescribeArgs, ListArgs, RunArgs},
    core::{
        config::{ConfigLoader, TidyflowConfig},
        error::{AppError, DefaultErrorReporter, ErrorReporter},
        pipeline::{Engine, Pipeline, Registry},
        table::Table,
    },
    utils::serialization::{FileSerializer, FileUtils, JsonSerializer, Serializer},
    Result,
};
use std::env;
use std::io::Write;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_HOST_ERROR: u8 = 1;
pub const EXIT_HALTED: u8 = 2;

pub fn run(args: RunArgs) -> Result<u8> {
    let config = load_config(&args)?;
    let table: Table = FileUtils.load_from_file(&args.table, &JsonSerializer)?;
    let pipeline: Pipeline = FileUtils.load_by_extension(&args.pipeline)?;
    tracing::info!(
        table = %args.table.display(),
        pipeline = %args.pipeline.display(),
        rows = table.row_count(),
        steps = pipeline.len(),
        "running pipeline"
    );

    let engine = Engine::with_config(Registry::builtin()?, config.engine);
    let result = engine.execute(&table, &pipeline);

    match &args.output {
        Some(path) => FileUtils.save_to_file(path, &result, &JsonSerializer)?,
        None => write_stdout(&JsonSerializer.serialize(&result)?)?,
    }

    match (&result.error, result.error_step) {
        (Some(summary), step) => {
            DefaultErrorReporter::new().report_summary(summary, step);
            Ok(EXIT_HALTED)
        }
        (None, _) => Ok(EXIT_SUCCESS),
    }
}

pub fn list(args: ListArgs) -> Result<u8> {
    let registry = Registry::builtin()?;
    let mut out = String::new();
    for name in registry.list(args.category) {
        if let Some(entry) = registry.get(name) {
            out.push_str(&format!("{:<28} {}\n", name, entry.category()));
        }
    }
    write_stdout(out.as_bytes())?;
    Ok(EXIT_SUCCESS)
}

pub fn describe(args: DescribeArgs) -> Result<u8> {
    let registry = Registry::builtin()?;
    let entry = registry
        .get(&args.name)
        .ok_or_else(|| AppError::unknown_operation(&args.name))?;
    write_stdout(&JsonSerializer.serialize(entry.definition())?)?;
    Ok(EXIT_SUCCESS)
}

pub fn docs() -> Result<u8> {
    let registry = Registry::builtin()?;
    write_stdout(registry.export_documentation().as_bytes())?;
    Ok(EXIT_SUCCESS)
}

pub fn examples() -> Result<u8> {
    let registry = Registry::builtin()?;
    write_stdout(&JsonSerializer.serialize(&registry.all_example_prompts())?)?;
    Ok(EXIT_SUCCESS)
}

fn load_config(args: &RunArgs) -> Result<TidyflowConfig> {
    let config = match &args.config {
        Some(path) => ConfigLoader::load_explicit(path)?,
        None => ConfigLoader::load_from_dir(&env::current_dir()?)?,
    };
    Ok(config)
}

fn write_stdout(bytes: &[u8]) -> Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(bytes)?;
    handle.flush()?;
    Ok(())
}
