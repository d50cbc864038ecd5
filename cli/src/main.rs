//! optctl - quantum optimal-control engine CLI.
//!
//! One positional argument: the path to a `key=value` configuration file.
//! The `runtype` key inside that file selects which of the four branches
//! in [`run`] executes; there is no separate subcommand per runtype. Exit
//! code is 0 on success, non-zero on argument error or fatal solver
//! failure.

mod build;
mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::FmtSubscriber;

use optctl_config::{output, RunConfig, RunType};

/// optctl: quantum optimal-control engine.
#[derive(Parser)]
#[command(name = "optctl")]
#[command(author, version, about = "Quantum optimal-control engine: drives coupled anharmonic oscillators to a target gate/state via gradient-based pulse shaping", long_about = None)]
struct Cli {
    /// Path to the run configuration file.
    config: PathBuf,

    /// Suppress informational output.
    #[arg(long)]
    quiet: bool,
}

fn init_tracing(quiet: bool) {
    let level = if quiet { tracing::Level::WARN } else { tracing::Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).with_target(false).without_time().finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Directory the output files are written to: alongside the
/// config file, in a sibling directory named after its stem.
fn output_dir_for(config_path: &std::path::Path) -> PathBuf {
    let stem = config_path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "run".to_string());
    config_path.parent().unwrap_or_else(|| std::path::Path::new(".")).join(format!("{stem}_data"))
}

fn run(cfg: &RunConfig, outdir: &std::path::Path, quiet: bool) -> optctl_core::error::Result<()> {
    std::fs::create_dir_all(outdir)?;
    output::write_config_log(&run::config_log_path(outdir), cfg)?;

    match cfg.runtype {
        RunType::Simulation => run::run_simulation(cfg, outdir)?,
        RunType::Gradient => run::run_gradient(cfg, outdir)?,
        RunType::Optimization => run::run_optimization(cfg, outdir)?,
        RunType::Evalcontrols => run::run_evalcontrols(cfg, outdir)?,
    }

    if !quiet {
        println!("{} {:?} run complete; output written to {}", "optctl:".green().bold(), cfg.runtype, outdir.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    let cfg = match optctl_config::parse_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("{} {err}", "optctl: configuration error:".red().bold());
            return ExitCode::FAILURE;
        }
    };

    let outdir = output_dir_for(&cli.config);
    match run(&cfg, &outdir, cli.quiet) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err}", "optctl: run failed:".red().bold());
            ExitCode::FAILURE
        }
    }
}
