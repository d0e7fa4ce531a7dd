//! bmi-runner: run a BMI model library from start to end time.
//!
//! ```text
//! bmi-runner <engine> <config> [--dt <step>] [--search-dir <dir>]...
//!            [--settings <file>] [--max-steps <n>] [-v]
//! ```
//!
//! `<engine>` is a library base name (searched for) or a path to the library.
//! Exit code 0 on success, 1 on any error.

mod commands;
mod run;

use std::process;

use anyhow::{Context, Result};
use bmi_runtime::{BmiSettings, ModelSession};
use tracing_subscriber::EnvFilter;

use commands::{build_cli, matches_to_args, RunnerArgs};

fn main() {
    let matches = build_cli().get_matches();
    let args = match matches_to_args(&matches) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    };

    init_logging(args.verbose);

    if let Err(e) = execute(&args) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(args: &RunnerArgs) -> Result<BmiSettings> {
    let mut settings = match &args.settings {
        Some(path) => BmiSettings::from_file(path)
            .with_context(|| format!("reading settings {}", path.display()))?,
        None => BmiSettings::load_or_default(".")?,
    };
    if !args.search_dirs.is_empty() {
        let mut dirs = args.search_dirs.clone();
        dirs.append(&mut settings.search_dirs);
        settings.search_dirs = dirs;
    }
    if let Some(dt) = args.dt {
        settings.time_step = dt;
    }
    if args.max_steps.is_some() {
        settings.max_steps = args.max_steps;
    }
    settings.validate()?;
    Ok(settings)
}

fn execute(args: &RunnerArgs) -> Result<()> {
    let settings = load_settings(args)?;
    let mut session = ModelSession::load_with_settings(&args.engine, &settings)
        .with_context(|| format!("loading model library {}", args.engine))?;
    run::run(&mut session, &args.config, settings.time_step, settings.max_steps)?;
    Ok(())
}
