pub mod allocate;
pub mod chart;
pub mod cli;
pub mod core;
pub mod providers;
pub mod store;
pub mod sync;

pub use crate::core::config;

use crate::allocate::AllocationEngine;
use crate::core::config::AppConfig;
use crate::core::quote::SeriesFetcher;
use crate::providers::sheet::{PollPolicy, SheetCellClient, SheetSeriesFetcher};
use crate::store::{AllocationStore, PriceStore};
use crate::sync::SyncEngine;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub enum AppCommand {
    Sync { force: bool },
    NeedsUpdate,
    Allocate { strategy: String },
    Portfolio { strategy: String, json: bool },
    Strategies,
    Chart { no_scale: bool },
}

struct App {
    sync_engine: SyncEngine,
    allocation_engine: AllocationEngine,
    prices: Arc<dyn PriceStore>,
}

impl App {
    fn from_config(config: &AppConfig) -> Result<Self> {
        let catalog = config.catalog();

        let data_path = config.default_data_path()?;
        let (prices, allocations) = store::disk::open(&data_path)?;
        let prices: Arc<dyn PriceStore> = Arc::new(prices);
        let allocations: Arc<dyn AllocationStore> = Arc::new(allocations);

        let transport = Arc::new(SheetCellClient::new(
            &config.sheet.base_url,
            &config.sheet.sheet_name,
        )?);
        let policy = PollPolicy {
            interval: Duration::from_millis(config.sheet.poll_interval_ms),
            timeout: Duration::from_secs(config.sheet.timeout_secs),
        };
        let fetcher: Arc<dyn SeriesFetcher> = Arc::new(SheetSeriesFetcher::new(
            transport,
            &config.sheet.query_cell,
            policy,
        ));

        let sync_engine = SyncEngine::new(catalog.clone(), fetcher, Arc::clone(&prices));
        let allocation_engine = AllocationEngine::new(
            catalog,
            Arc::clone(&prices),
            allocations,
            config.notional,
        );

        Ok(App {
            sync_engine,
            allocation_engine,
            prices,
        })
    }
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("rebal starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let app = App::from_config(&config)?;
    let today = chrono::Local::now().date_naive();

    match command {
        AppCommand::Sync { force } => {
            cli::sync(&app.sync_engine, &app.allocation_engine, today, force).await
        }
        AppCommand::NeedsUpdate => {
            cli::needs_update(&app.sync_engine, today).await;
            Ok(())
        }
        AppCommand::Allocate { strategy } => {
            cli::allocate(&app.allocation_engine, &strategy, today).await
        }
        AppCommand::Portfolio { strategy, json } => {
            cli::portfolio(&app.allocation_engine, &strategy, json).await
        }
        AppCommand::Strategies => {
            cli::strategies();
            Ok(())
        }
        AppCommand::Chart { no_scale } => cli::chart(app.prices.as_ref(), !no_scale).await,
    }
}
