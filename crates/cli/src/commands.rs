//! Clap command definition and argument extraction.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

/// Build the runner's command line.
pub fn build_cli() -> Command {
    Command::new("bmi-runner")
        .about("Run a BMI model from its start time to its end time")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("engine")
                .required(true)
                .help("Library name (e.g. model1) or full path (/usr/lib/libmodel1.so.5)"),
        )
        .arg(
            Arg::new("config")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Model configuration file passed to initialize"),
        )
        .arg(
            Arg::new("dt")
                .long("dt")
                .value_parser(value_parser!(f64))
                .allow_negative_numbers(true)
                .help("Step size per update (default: the model's own step)"),
        )
        .arg(
            Arg::new("search-dir")
                .long("search-dir")
                .value_parser(value_parser!(PathBuf))
                .action(ArgAction::Append)
                .help("Extra directory searched for the library (repeatable)"),
        )
        .arg(
            Arg::new("settings")
                .long("settings")
                .value_parser(value_parser!(PathBuf))
                .help("Settings file (default: ./bmi.toml if present)"),
        )
        .arg(
            Arg::new("max-steps")
                .long("max-steps")
                .value_parser(value_parser!(u64))
                .help("Fail if the end time is not reached within this many updates"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Debug-level logging"),
        )
}

/// Parsed runner arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerArgs {
    pub engine: String,
    pub config: PathBuf,
    pub dt: Option<f64>,
    pub search_dirs: Vec<PathBuf>,
    pub settings: Option<PathBuf>,
    pub max_steps: Option<u64>,
    pub verbose: bool,
}

/// Pull typed arguments out of the matches.
pub fn matches_to_args(matches: &ArgMatches) -> Result<RunnerArgs> {
    let engine = matches
        .get_one::<String>("engine")
        .cloned()
        .context("missing <engine>")?;
    let config = matches
        .get_one::<PathBuf>("config")
        .cloned()
        .context("missing <config>")?;
    let dt = matches.get_one::<f64>("dt").copied();
    if let Some(dt) = dt {
        if !dt.is_finite() || (dt <= 0.0 && dt != -1.0) {
            bail!("--dt must be positive or -1 (model default), got {}", dt);
        }
    }
    let max_steps = matches.get_one::<u64>("max-steps").copied();
    if max_steps == Some(0) {
        bail!("--max-steps must be at least 1");
    }

    Ok(RunnerArgs {
        engine,
        config,
        dt,
        search_dirs: matches
            .get_many::<PathBuf>("search-dir")
            .map(|dirs| dirs.cloned().collect())
            .unwrap_or_default(),
        settings: matches.get_one::<PathBuf>("settings").cloned(),
        max_steps,
        verbose: matches.get_flag("verbose"),
    })
}
