use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

use surveytab::cli::{Cli, Commands};
use surveytab::config::Scenario;
use surveytab::core::defaults::fallback_definitions;
use surveytab::engine::{CancellationGuard, Engine};
use surveytab::output::{render, OutputFormat};

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            scenario,
            format,
            output,
        } => run_scenario(&scenario, format, output.as_deref()),
        Commands::Window {
            average_id,
            reference,
        } => show_window(&average_id, reference),
    }
}

fn run_scenario(path: &Path, format: OutputFormat, output: Option<&Path>) -> Result<()> {
    let scenario = Scenario::from_path(path)?;
    let (configuration, answers, weightings) = scenario.build_sources()?;
    let engine = Engine::new(&configuration, &answers, &weightings);
    let tree = engine
        .calculate(&scenario.request, &CancellationGuard::new())
        .with_context(|| format!("scenario {} failed", path.display()))?;
    let rendered = render(&tree, format)?;
    write_output(&rendered, output)
}

fn show_window(average_id: &str, reference: chrono::NaiveDate) -> Result<()> {
    let definition = fallback_definitions()
        .into_iter()
        .find(|d| d.id == average_id)
        .with_context(|| format!("no built-in average named '{average_id}'"))?;
    let window = surveytab::period::resolve_window(&definition, reference, None)?;
    if window.is_empty() {
        println!("{}: empty window", definition.id);
    } else {
        println!("{}: {} .. {}", definition.id, window.start, window.end);
    }
    Ok(())
}

fn write_output(rendered: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("cannot write {}", path.display()))?;
        }
        None => println!("{rendered}"),
    }
    Ok(())
}
