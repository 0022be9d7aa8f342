use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use rebal::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Refresh price data and register today's allocations
    Sync {
        /// Skip the staleness gate
        #[arg(long)]
        force: bool,
    },
    /// Report whether a sync run is worth performing
    NeedsUpdate,
    /// Compute and register an allocation for one strategy
    Allocate {
        /// Strategy name or id
        #[arg(short, long)]
        strategy: String,
    },
    /// Show the most recent persisted allocation for a strategy
    Portfolio {
        /// Strategy name or id
        #[arg(short, long)]
        strategy: String,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List available strategies
    Strategies,
    /// Print chart-ready price series as JSON
    Chart {
        /// Emit raw closes instead of mean-normalized series
        #[arg(long)]
        no_scale: bool,
    },
}

impl From<Commands> for rebal::AppCommand {
    fn from(cmd: Commands) -> rebal::AppCommand {
        match cmd {
            Commands::Sync { force } => rebal::AppCommand::Sync { force },
            Commands::NeedsUpdate => rebal::AppCommand::NeedsUpdate,
            Commands::Allocate { strategy } => rebal::AppCommand::Allocate { strategy },
            Commands::Portfolio { strategy, json } => {
                rebal::AppCommand::Portfolio { strategy, json }
            }
            Commands::Strategies => rebal::AppCommand::Strategies,
            Commands::Chart { no_scale } => rebal::AppCommand::Chart { no_scale },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => rebal::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

fn setup() -> anyhow::Result<()> {
    use anyhow::Context;

    let path = rebal::config::AppConfig::default_config_path()?;

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let default_config = r#"---
# Spreadsheet facade evaluating the finance formulas.
sheet:
  base_url: "http://localhost:8099"
  sheet_name: "quotes"
  query_cell: "A1"
  poll_interval_ms: 100
  timeout_secs: 5

# Currency amount split across the portfolio per allocation run.
notional: 33333

# Omit to track the built-in index set.
# instruments:
#   - key: "sp500"
#     remote_search_term: "SPY"
#     display_keyword: "S&P 500"
"#;

    std::fs::write(&path, default_config)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}
