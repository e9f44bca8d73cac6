//! CLI argument definitions.
//!
//! `wpstack` has a single entry point: synthesize the stacks for one
//! environment profile.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use wp_stack::OutputFormat;

pub mod synth;

/// Template encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Yaml,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => OutputFormat::Json,
            Format::Yaml => OutputFormat::Yaml,
        }
    }
}

/// Log line encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// wpstack - WordPress infrastructure synthesizer
#[derive(Parser, Debug)]
#[command(name = "wpstack")]
#[command(version, about = "wpstack - WordPress infrastructure synthesizer")]
#[command(long_about = r#"
wpstack builds the WordPress hosting infrastructure for one environment
and writes it as deployable stack templates plus a manifest.

PROFILES:
  dev   → serverless database, 1 NAT gateway
  prod  → provisioned database, 3 NAT gateways (one per zone)

An absent or unknown environment falls back to "dev".

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Validation failure
  5 - Synthesis or output error
"#)]
pub struct Cli {
    /// Environment profile to synthesize
    #[arg(short, long, env = "ENVIRONMENT_NAME")]
    pub environment: Option<String>,

    /// Directory the assembly is written to
    #[arg(short, long, default_value = wp_stack::pipeline::ASSEMBLY_DIR)]
    pub output: PathBuf,

    /// Build context of the WordPress container image
    #[arg(long, default_value = wp_stack::stack::DEFAULT_IMAGE_CONTEXT)]
    pub image_context: PathBuf,

    /// Template format
    #[arg(long, value_enum, default_value_t = Format::Json)]
    pub format: Format,

    /// Print the primary stack's template instead of writing the assembly
    #[arg(long)]
    pub stdout: bool,

    /// Enable verbose output
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Default log directive for this crate family.
    pub fn log_directive(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }
}
