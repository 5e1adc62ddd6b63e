use std::path::PathBuf;

use clap::{Args, Command, FromArgMatches as _};
use log::LevelFilter;

use crate::context::Context;
use crate::error::EpisimError;
use crate::log::{set_log_level, set_module_filters};
use crate::mobility::ReplayMobility;
use crate::params::EpisimParams;
use crate::population::Population;
use crate::report::ReportOptions;
use crate::snapshot::Snapshot;

/// Default cli arguments for the episim runner
#[derive(Args, Debug)]
pub struct BaseArgs {
    /// Random seed
    #[arg(short, long, default_value = "0")]
    pub random_seed: u64,

    /// Path of the JSON parameter file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Path of the population CSV file
    #[arg(short, long)]
    pub population: PathBuf,

    /// Path of the container visits CSV file
    #[arg(short, long)]
    pub visits: PathBuf,

    /// Number of iterations (days) to simulate
    #[arg(short = 'n', long, default_value = "1")]
    pub iterations: i64,

    /// Directory for reports and snapshots
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Prefix of the report file names
    #[arg(long, default_value = "")]
    pub file_prefix: String,

    /// Replace existing report files
    #[arg(short, long)]
    pub force_overwrite: bool,

    /// Log level, e.g. `info`, or module filters such as `episim::seeding=debug,warn`
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Snapshot to resume the run from
    #[arg(long)]
    pub resume: Option<PathBuf>,
}

fn create_episim_cli() -> Command {
    let cli = Command::new("episim");
    BaseArgs::augment_args(cli)
}

/// Parses a log level specification: comma separated entries that are either a level, which
/// applies globally, or `module=level`.
///
/// # Errors
///
/// Returns an error if an entry is not a valid level.
pub fn parse_log_levels(
    spec: &str,
) -> Result<(Option<LevelFilter>, Vec<(String, LevelFilter)>), EpisimError> {
    let parse = |level: &str| {
        level
            .trim()
            .parse::<LevelFilter>()
            .map_err(|_| EpisimError::ConfigError(format!("Invalid log level `{level}`")))
    };
    let mut global = None;
    let mut modules = Vec::new();
    for entry in spec.split(',').filter(|entry| !entry.trim().is_empty()) {
        match entry.split_once('=') {
            Some((module, level)) => modules.push((module.trim().to_string(), parse(level)?)),
            None => global = Some(parse(entry)?),
        }
    }
    Ok((global, modules))
}

fn apply_log_levels(spec: &str) -> Result<(), EpisimError> {
    let (global, modules) = parse_log_levels(spec)?;
    if let Some(level) = global {
        set_log_level(level);
    }
    let filters: Vec<(&str, LevelFilter)> = modules
        .iter()
        .map(|(module, level)| (module.as_str(), *level))
        .collect();
    set_module_filters(&filters);
    Ok(())
}

/// Runs a simulation with the command line arguments of the process
///
/// # Errors
/// Returns an error if argument parsing or the run fails
pub fn run_with_args() -> Result<Context, Box<dyn std::error::Error + Send + Sync>> {
    let matches = create_episim_cli().get_matches();
    let args = BaseArgs::from_arg_matches(&matches)?;
    Ok(run(args)?)
}

/// Loads the inputs named by `args`, sets up or resumes the run and executes it.
///
/// # Errors
///
/// Returns an error if an input can't be loaded or an iteration fails.
pub fn run(args: BaseArgs) -> Result<Context, EpisimError> {
    if let Some(spec) = &args.log_level {
        apply_log_levels(spec)?;
    }

    let params = EpisimParams::load(&args.config)?;
    let population = Population::from_csv(&args.population)?;
    let types = params.container_types()?;
    let policy = params.policy(&types)?;
    let mut mobility = ReplayMobility::from_csv(&args.visits, &population, &types)?;

    let mut context = match &args.resume {
        Some(path) => Context::from_snapshot(params, population, policy, Snapshot::read(path)?)?,
        None => Context::new(params, population, policy, args.random_seed)?,
    };
    context.add_reports(
        ReportOptions::new(&args.output_dir)
            .with_prefix(&args.file_prefix)
            .with_overwrite(args.force_overwrite),
    )?;
    context.set_snapshot_directory(&args.output_dir);

    context.execute(args.iterations, &mut mobility)?;
    Ok(context)
}
