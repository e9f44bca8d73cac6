//! Synth command - resolve a profile and emit its stacks.

use anyhow::{Context, Result};
use tracing::info;

use wp_config::ProfileCatalog;
use wp_stack::{synthesize, OutputFormat, SynthOptions};

use super::Cli;

pub fn execute(cli: &Cli) -> Result<()> {
    let catalog = ProfileCatalog::builtin().context("Built-in profiles failed validation")?;
    let profile = catalog.resolve(cli.environment.as_deref());
    info!("Using profile {} ({})", profile.name, profile.prefix());

    let options = SynthOptions {
        image_context: cli.image_context.clone(),
    };
    let assembly = synthesize(profile, &options)
        .with_context(|| format!("Synthesis of profile '{}' failed", profile.name))?;

    let format = OutputFormat::from(cli.format);
    if cli.stdout {
        let stack = assembly
            .primary()
            .context("Synthesis produced no stacks")?;
        println!("{}", format.render(&stack.template)?);
        return Ok(());
    }

    let written = assembly
        .write_to(&cli.output, format)
        .with_context(|| format!("Failed to write assembly to {}", cli.output.display()))?;

    if !cli.quiet {
        println!("✅ Synthesized {} stack(s) for '{}'", assembly.stacks.len(), profile.name);
        for path in &written {
            println!("   {}", path.display());
        }
    }
    Ok(())
}
