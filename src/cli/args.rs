use crate::core::types::PrimitiveCategory;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Input table: a JSON array of records or an object of equal-length columns
    #[arg(long, value_name = "FILE")]
    pub table: PathBuf,

    /// Pipeline file: a JSON or YAML list of {op, params} steps
    #[arg(long, value_name = "FILE")]
    pub pipeline: PathBuf,

    /// Write the execution result here instead of stdout
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Config file (default: ./tidyflow.toml when present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only list primitives in this category (e.g. row_selection, joins)
    #[arg(long, value_name = "CATEGORY")]
    pub category: Option<PrimitiveCategory>,
}

#[derive(Args, Debug)]
pub struct DescribeArgs {
    /// Registered primitive name
    #[arg(value_name = "NAME")]
    pub name: String,
}
