//! wpstack CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Validation failure
//! - 5: Synthesis or output error

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, LogFormat};
use wp_config::ConfigError;
use wp_stack::StackError;

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const VALIDATION_FAILURE: u8 = 3;
    pub const SYNTH_ERROR: u8 = 5;
}

fn init_logging(cli: &Cli) {
    let level = cli.log_directive();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,wp_cli={level},wp_stack={level},wp_config={level},wp_graph={level}"
        ))
    });

    // Logs go to stderr so templates printed on stdout stay parseable.
    let registry = tracing_subscriber::registry().with(filter);
    let result = match cli.log_format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };

    if result.is_err() {
        // Logging already initialized, continue
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(ExitCodes::INVALID_ARGS)
            } else {
                ExitCode::from(ExitCodes::SUCCESS)
            };
        }
    };
    init_logging(&cli);

    match commands::synth::execute(&cli) {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(categorize_error(&e))
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    if let Some(err) = e.downcast_ref::<StackError>() {
        return if err.is_validation() {
            ExitCodes::VALIDATION_FAILURE
        } else {
            ExitCodes::SYNTH_ERROR
        };
    }
    if e.downcast_ref::<ConfigError>().is_some() {
        return ExitCodes::VALIDATION_FAILURE;
    }
    ExitCodes::GENERAL_ERROR
}
