use clap::Parser;
use std::process::ExitCode;
use tidyflow::cli::{self, commands::EXIT_HOST_ERROR, Args};
use tidyflow::logging::{self, LoggingConfig};

fn main() -> ExitCode {
    let args = Args::parse();

    let logging_config = match LoggingConfig::load(args.command.config_file().as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {:#}", err);
            return ExitCode::from(EXIT_HOST_ERROR);
        }
    };
    let _guard = match logging::init(&logging_config) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("warning: logging disabled: {:#}", err);
            None
        }
    };

    match cli::run(args) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("error: {:#}", err);
            ExitCode::from(EXIT_HOST_ERROR)
        }
    }
}
