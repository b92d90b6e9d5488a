//! Modcycle
//!
//! Builds module generations from a settings file and reports the result.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use modcycle::host::CycleHost;
use modcycle::module_runtime::Cycle;
use modcycle::script::default_engine;
use modcycle::settings::Settings;

/// Module registry host
#[derive(Parser, Debug)]
#[command(name = "modcycle")]
#[command(about = "Builds and publishes module generations", long_about = None)]
struct Args {
    /// Path to the settings file
    #[arg(short, long, default_value = "modcycle.toml")]
    config: PathBuf,

    /// Rebuild this many times after the first generation, re-reading the settings file
    #[arg(long, default_value = "0")]
    reload: u32,

    /// Print the module table of the published generation
    #[arg(long)]
    list: bool,

    /// Print the module table as JSON
    #[arg(long, requires = "list")]
    json: bool,
}

fn main() -> Result<()> {
    // Logs go to stderr so listings on stdout stay clean
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("modcycle=info,module_runtime=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    info!("Starting modcycle v{}", env!("CARGO_PKG_VERSION"));

    let settings = load_settings(&args.config)?;
    let engine = default_engine();
    info!("Init scripts run with {}", engine.name());

    let host = CycleHost::from_settings(&settings, engine)?;
    host.build(&settings)
        .context("Failed to build the initial generation")?;

    for attempt in 1..=args.reload {
        info!("Reload {} of {}", attempt, args.reload);
        let settings = match Settings::load(&args.config) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Reload skipped: {}", e);
                continue;
            }
        };
        if let Err(e) = host.build(&settings) {
            warn!("Reload failed: {}", e);
        }
    }

    let cycle = host.current().context("No generation published")?;
    if args.list {
        print_listing(&cycle, args.json)?;
    }

    Ok(())
}

fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        warn!("{} not found, using default settings", path.display());
        return Ok(Settings::default());
    }
    Settings::load(path).with_context(|| format!("Invalid settings file {}", path.display()))
}

fn print_listing(cycle: &Cycle, json: bool) -> Result<()> {
    let report = cycle.report();
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "generation {} ({} of {} modules)",
        report.generation,
        report.modules.len(),
        report.max_modules
    );
    println!("{:>4}  {:>5}  {:<8}  {:>4}  name", "pos", "index", "category", "slot");
    for (position, module) in report.modules.iter().enumerate() {
        let index = module.global_index.map_or_else(|| "-".to_string(), |i| i.to_string());
        let slot = module.category_slot.map_or_else(|| "-".to_string(), |s| s.to_string());
        println!(
            "{:>4}  {:>5}  {:<8}  {:>4}  {}",
            position,
            index,
            module.category.as_str(),
            slot,
            module.name
        );
    }
    for (category, count) in &report.slot_counts {
        println!("{} slots: {}", category, count);
    }
    Ok(())
}
