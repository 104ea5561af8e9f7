mod config;
mod daemon;
mod error;
mod executor;
mod modules;
mod resolve;
mod schedule;
mod scheduler;
mod timers;
mod watchdog;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::config::Config;
use crate::modules::ModuleRegistry;

/// Measurement agent: runs network tests on a schedule and supervises each run
#[derive(Parser, Debug)]
#[command(name = "measured", version, about)]
struct Cli {
    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daemon (default)
    Run,
    /// Print the effective configuration
    ShowConfig,
    /// List the available test modules
    Modules,
    /// Run one test, reading its invocation from stdin
    #[command(hide = true)]
    RunTest { module: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    logger::init_with_level(if cli.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO });

    match cli.command.unwrap_or(Command::Run) {
        Command::RunTest { module } => return Ok(modules::run_test(&ModuleRegistry::builtin(), &module).await),
        Command::Modules => {
            for module in ModuleRegistry::builtin().iter() {
                let max_targets = match module.max_targets() {
                    0 => "unlimited".to_string(),
                    n => n.to_string(),
                };
                println!(
                    "{:>5}  {:<12} targets: {:<10} max duration: {}s",
                    module.id(),
                    module.name(),
                    max_targets,
                    module.max_duration().as_secs()
                );
            }
        }
        Command::ShowConfig => {
            let config = Config::from_config(cli.config.as_ref())?;
            print!("{config}");
        }
        Command::Run => {
            let config = Config::from_config(cli.config.as_ref())?;
            daemon::run(config).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
