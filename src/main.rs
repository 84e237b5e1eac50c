use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use cvar_evolve::config::RunSettings;
use cvar_evolve::evolution::portfolio_evolution::optimize_portfolio;
use cvar_evolve::report::OptimizationReport;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let Some(run_file) = std::env::args_os().nth(1).map(PathBuf::from) else {
        bail!("usage: cvar-evolve <run.json>");
    };

    let settings = RunSettings::load(&run_file)
        .with_context(|| format!("Failed to load run file {}", run_file.display()))?;
    settings.validate().context("Invalid run file")?;

    let returns = Arc::new(
        settings
            .return_matrix()
            .context("Failed to build the return matrix")?,
    );
    let population = settings.population_config()?;
    let evolution = settings.evolution_config()?;

    let seed = settings.seed.unwrap_or_else(|| rand::thread_rng().gen());
    info!("Seeding the run with {}.", seed);
    let mut rng = StdRng::seed_from_u64(seed);

    let result = optimize_portfolio(&returns, &population, &evolution, &mut rng)
        .context("Optimization failed")?;
    let report = OptimizationReport::build(&result, evolution.threshold, &settings.report)
        .context("Failed to build the report")?
        .with_profile(settings.profile);
    info!(
        "Final value {:.2} from {:.2} invested.",
        report.final_value(),
        report.initial_capital
    );
    if let (Some(name), Some(value)) = (&report.benchmark, report.benchmark_final_value()) {
        info!("Benchmark {} ends at {:.2}.", name, value);
    }

    match &settings.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            serde_json::to_writer_pretty(file, &report)?;
            info!("Report written to {}.", path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            serde_json::to_writer_pretty(&mut handle, &report)?;
            writeln!(handle)?;
        }
    }
    Ok(())
}
