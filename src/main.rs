// Copyright 2024 Mikael Lund
//
// Licensed under the Apache license, version 2.0 (the "license");
// you may not use this file except in compliance with the license.
// You may obtain a copy of the license at
//
//     http://www.apache.org/licenses/license-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the license is distributed on an "as is" basis,
// without warranties or conditions of any kind, either express or implied.
// See the license for the specific language governing permissions and
// limitations under the license.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use forcecore::{
    config::BenchConfig, Backend, BackendKind, GpuContext, ParticleStore, VIRIAL_COMPONENTS,
};
use indicatif::ProgressIterator;
use serde::Serialize;
use std::{collections::BTreeMap, path::PathBuf, time::Instant};

#[macro_use]
extern crate log;

#[derive(Parser)]
#[command(version, about = "Force, energy and virial evaluation benchmarks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum Format {
    #[default]
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Time repeated force evaluations of a lattice system
    Bench {
        /// YAML configuration; built-in defaults if omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the backend of the configuration
        #[arg(short, long, value_enum)]
        backend: Option<BackendKind>,
        /// Override the number of steps
        #[arg(short, long)]
        steps: Option<usize>,
        /// Output format of the final energies and virials
        #[arg(short, long, value_enum, default_value_t = Format::Yaml)]
        format: Format,
    },
}

#[derive(Serialize)]
struct Report {
    backend: BackendKind,
    adapter: Option<String>,
    particles: usize,
    steps: usize,
    ms_per_step: f64,
    energy: f64,
    virial: BTreeMap<&'static str, f64>,
    computes: BTreeMap<String, forcecore::output::ForceSummary>,
}

fn do_bench(
    config: Option<PathBuf>,
    backend: Option<BackendKind>,
    steps: Option<usize>,
    format: Format,
) -> Result<()> {
    let mut config = match config {
        Some(path) => {
            info!("Reading configuration {}", path.display());
            BenchConfig::from_yaml_file(&path)?
        }
        None => BenchConfig::default(),
    };
    if let Some(kind) = backend {
        config.backend = kind;
    }
    if let Some(steps) = steps {
        config.steps = steps;
    }
    if config.backend == BackendKind::Gpu && !GpuContext::is_available() {
        anyhow::bail!("no GPU adapter available; use --backend cpu");
    }

    let backend = Backend::new(config.backend)?;
    let adapter = match &backend {
        Backend::Gpu(context) => Some(context.adapter_name().to_string()),
        Backend::Cpu => None,
    };
    let mut system = config.build_system(&backend)?;

    let start = Instant::now();
    for timestep in (0..config.steps as u64).progress_count(config.steps as u64) {
        system.step(timestep)?;
    }
    let elapsed = start.elapsed();
    info!("Finished {} steps in {:.2?}", config.steps, elapsed);

    let summary = system.summary();
    let report = Report {
        backend: config.backend,
        adapter,
        particles: system.particles.n_total(),
        steps: config.steps,
        ms_per_step: elapsed.as_secs_f64() * 1e3 / config.steps.max(1) as f64,
        energy: summary.energy,
        virial: VIRIAL_COMPONENTS.into_iter().zip(summary.virial).collect(),
        computes: system.summaries(),
    };
    match format {
        Format::Yaml => print!("{}", serde_yaml::to_string(&report)?),
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn do_main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    pretty_env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Bench {
            config,
            backend,
            steps,
            format,
        }) => do_bench(config, backend, steps, format)?,
        None => {
            anyhow::bail!("No command given");
        }
    };
    Ok(())
}

fn main() {
    if let Err(err) = do_main() {
        eprintln!("Error: {}", &err);
        std::process::exit(1);
    }
}
