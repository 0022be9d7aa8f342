//! Command implementations behind the clap entrypoint

pub mod ui;

use crate::allocate::{AllocationEngine, AllocationLine};
use crate::chart::ChartData;
use crate::core::market::PriceMatrix;
use crate::core::strategy::Strategy;
use crate::store::PriceStore;
use crate::sync::{SyncEngine, SyncOutcome, SyncReport};
use anyhow::Result;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::warn;

/// Gate check, sync pass, then same-day registration of every
/// strategy's allocation.
pub async fn sync(
    sync_engine: &SyncEngine,
    allocation_engine: &AllocationEngine,
    today: NaiveDate,
    force: bool,
) -> Result<()> {
    if !force && !sync_engine.needs_update(today).await {
        println!("Price data is already up to date.");
        return Ok(());
    }

    let pb = ui::new_spinner("Syncing price data...");
    let report = sync_engine.run(today).await;
    pb.finish_and_clear();
    let report = report?;

    display_sync_report(&report);

    for strategy in Strategy::all() {
        if let Err(e) = allocation_engine.run(strategy, today).await {
            warn!("could not register {} allocation: {e}", strategy.name());
        }
    }
    Ok(())
}

fn display_sync_report(report: &SyncReport) {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Instrument"), ui::header_cell("Outcome")]);

    for entry in &report.outcomes {
        let (ok, text) = match &entry.outcome {
            SyncOutcome::Synced { points } => (true, format!("synced ({points} points)")),
            SyncOutcome::UpToDate => (true, "up to date".to_string()),
            SyncOutcome::Failed { reason } => (false, format!("failed: {reason}")),
        };
        table.add_row(vec![
            comfy_table::Cell::new(&entry.key),
            ui::outcome_cell(ok, text),
        ]);
    }
    println!("{table}");

    if report.pruned > 0 {
        println!("Pruned {} stale row(s).", report.pruned);
    }
}

/// Compute and register today's allocation, then render it.
pub async fn allocate(
    engine: &AllocationEngine,
    selector: &str,
    today: NaiveDate,
) -> Result<()> {
    let strategy = Strategy::from_selector(selector)?;
    let lines = engine.run(strategy, today).await?;
    display_allocation(strategy, &lines);
    Ok(())
}

fn display_allocation(strategy: Strategy, lines: &BTreeMap<String, AllocationLine>) {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Instrument"),
        ui::header_cell("Keyword"),
        ui::header_cell("Weight (%)"),
        ui::header_cell("Amount"),
    ]);

    let mut sorted: Vec<(&String, &AllocationLine)> = lines.iter().collect();
    sorted.sort_by(|a, b| b.1.amount.cmp(&a.1.amount));

    let mut total = 0;
    for (key, line) in sorted {
        total += line.amount;
        table.add_row(vec![
            comfy_table::Cell::new(key),
            ui::optional_cell(line.keyword.clone()),
            ui::amount_cell(format!("{:.2}", line.weight * 100.0)),
            ui::amount_cell(line.amount.to_string()),
        ]);
    }

    println!(
        "Strategy: {}\n\n{table}\n\n{}: {}",
        ui::style_text(strategy.name(), ui::StyleType::Title),
        ui::style_text("Total", ui::StyleType::TotalLabel),
        ui::style_text(&total.to_string(), ui::StyleType::TotalValue),
    );
}

/// Render the most recent persisted allocation for a strategy.
pub async fn portfolio(engine: &AllocationEngine, selector: &str, json: bool) -> Result<()> {
    let strategy = Strategy::from_selector(selector)?;
    let rows = engine.latest(strategy).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!(
            "No allocation recorded for '{}' yet. Run `rebal sync` first.",
            strategy.name()
        );
        return Ok(());
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("Instrument"),
        ui::header_cell("Weight (%)"),
        ui::header_cell("Amount"),
    ]);
    let mut total = 0;
    for row in &rows {
        total += row.weight_amount;
        table.add_row(vec![
            comfy_table::Cell::new(row.date.format("%Y-%m-%d").to_string()),
            comfy_table::Cell::new(&row.instrument_key),
            ui::amount_cell(row.weight_percent.to_string()),
            ui::amount_cell(row.weight_amount.to_string()),
        ]);
    }

    println!(
        "Strategy: {}\n\n{table}\n\n{}: {}",
        ui::style_text(strategy.name(), ui::StyleType::Title),
        ui::style_text("Total", ui::StyleType::TotalLabel),
        ui::style_text(&total.to_string(), ui::StyleType::TotalValue),
    );
    Ok(())
}

/// List the available strategies with their stable ids.
pub fn strategies() {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Id"), ui::header_cell("Name")]);
    for strategy in Strategy::all() {
        table.add_row(vec![
            ui::amount_cell(strategy.id().to_string()),
            comfy_table::Cell::new(strategy.name()),
        ]);
    }
    println!("{table}");
}

/// Print chart-ready JSON assembled from the price store.
pub async fn chart(prices: &dyn PriceStore, scaled: bool) -> Result<()> {
    let points = prices.all_points().await?;
    let matrix = PriceMatrix::from_points(&points);
    let chart = ChartData::from_matrix(&matrix, scaled);
    println!("{}", serde_json::to_string(&chart)?);
    Ok(())
}

/// Report whether a sync run is worth performing.
pub async fn needs_update(engine: &SyncEngine, today: NaiveDate) {
    println!("{}", engine.needs_update(today).await);
}
