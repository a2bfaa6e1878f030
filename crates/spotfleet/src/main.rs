mod commands;
mod logging;
mod ssh;

use clap::{Parser, Subcommand};
use spotfleet_config::Config;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "spotfleet")]
#[command(
    about = "Keeps spot instance fleets at their desired size in the cheapest zone",
    long_about = None
)]
struct Cli {
    /// Configuration file (default: config.yaml, .spotfleet/config.yaml, ~/.config/spotfleet/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile every maintained fleet until interrupted (default)
    Run,
    /// Show the instances of every fleet
    List {
        /// Only show this fleet
        #[arg(short, long)]
        fleet: Option<String>,
    },
    /// Terminate fleet instances by ID
    Delete {
        /// Instance IDs (e.g. ins-abc123)
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Load and validate the configuration file
    Validate,
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run);

    let config_arg = cli.config.as_deref();

    match command {
        Commands::Version => {
            println!("spotfleet {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Validate => {
            let (path, config) = spotfleet_config::load(config_arg)?;
            commands::validate::handle(&path, &config)?;
        }
        Commands::Run => {
            let config = load_with_logging(config_arg)?;
            commands::run::handle(&config).await?;
        }
        Commands::List { fleet } => {
            let config = load_with_logging(config_arg)?;
            commands::list::handle(&config, fleet.as_deref()).await?;
        }
        Commands::Delete { ids } => {
            let config = load_with_logging(config_arg)?;
            commands::delete::handle(&config, &ids).await?;
        }
    }

    Ok(())
}

/// Load the configuration and install its log sinks
fn load_with_logging(path: Option<&Path>) -> anyhow::Result<Config> {
    let (path, config) = spotfleet_config::load(path)?;
    logging::init(&config.log);
    tracing::debug!(path = %path.display(), "Configuration loaded");
    Ok(config)
}
