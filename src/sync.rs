//! Reconciles the local price store against the remote quote source

use crate::core::catalog::InstrumentCatalog;
use crate::core::market::PricePoint;
use crate::core::quote::{FetchOutcome, SeriesFetcher};
use crate::store::PriceStore;
use anyhow::{Result, anyhow};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::sync::Arc;
use tracing::{debug, info, warn};

const BOOTSTRAP_WINDOW_DAYS: i64 = 365;

/// Weekend refreshes are pointless while Friday's close is still the
/// freshest data available.
const WEEKEND_GAP_DAYS: i64 = 3;

/// What happened to one instrument during a sync pass.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Points written (0 when the source legitimately had none).
    Synced { points: usize },
    /// Nothing to fetch; the store already covers the range.
    UpToDate,
    /// Fetch was unavailable; the instrument was skipped.
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct InstrumentSync {
    pub key: String,
    pub outcome: SyncOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub outcomes: Vec<InstrumentSync>,
    /// Stale rows removed at the end of a full rebuild.
    pub pruned: usize,
}

impl SyncReport {
    pub fn synced(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, SyncOutcome::Synced { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, SyncOutcome::Failed { .. }))
            .count()
    }

    pub fn points_written(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o.outcome {
                SyncOutcome::Synced { points } => points,
                _ => 0,
            })
            .sum()
    }
}

pub struct SyncEngine {
    catalog: InstrumentCatalog,
    fetcher: Arc<dyn SeriesFetcher>,
    prices: Arc<dyn PriceStore>,
}

impl SyncEngine {
    pub fn new(
        catalog: InstrumentCatalog,
        fetcher: Arc<dyn SeriesFetcher>,
        prices: Arc<dyn PriceStore>,
    ) -> Self {
        SyncEngine {
            catalog,
            fetcher,
            prices,
        }
    }

    /// Full rebuild when the store is empty, incremental refresh
    /// otherwise.
    pub async fn run(&self, today: NaiveDate) -> Result<SyncReport> {
        if self.prices.count().await? == 0 {
            info!("price store is empty, bootstrapping");
            self.bootstrap(today).await
        } else {
            self.update(today).await
        }
    }

    /// Fetch the trailing one-year window for every instrument and stamp
    /// each row with today's refresh marker. A failed instrument is
    /// skipped, not fatal. Rows left over from an aborted earlier
    /// rebuild (marker != today) are pruned afterwards.
    pub async fn bootstrap(&self, today: NaiveDate) -> Result<SyncReport> {
        let from = today - Duration::days(BOOTSTRAP_WINDOW_DAYS);
        let mut report = self.sync_range(from, today, today).await;
        report.pruned = self.prices.prune_not_refreshed_on(today).await?;
        info!(
            synced = report.synced(),
            failed = report.failed(),
            points = report.points_written(),
            pruned = report.pruned,
            "bootstrap finished"
        );
        Ok(report)
    }

    /// Fetch from the day after the latest stored observation through
    /// today. Existing rows are overwritten: remote data is
    /// authoritative on replay and backfill.
    pub async fn update(&self, today: NaiveDate) -> Result<SyncReport> {
        let latest = self
            .prices
            .latest_date()
            .await?
            .ok_or_else(|| anyhow!("price store is empty; bootstrap first"))?;
        let from = latest + Duration::days(1);

        if from > today {
            debug!("store already covers {today}, nothing to fetch");
            let outcomes = self
                .catalog
                .iter()
                .map(|i| InstrumentSync {
                    key: i.key.clone(),
                    outcome: SyncOutcome::UpToDate,
                })
                .collect();
            return Ok(SyncReport {
                outcomes,
                pruned: 0,
            });
        }

        let report = self.sync_range(from, today, today).await;
        info!(
            synced = report.synced(),
            failed = report.failed(),
            points = report.points_written(),
            "update finished"
        );
        Ok(report)
    }

    /// One fetch per catalog instrument over `from..=to`, merging every
    /// returned point with `refreshed` as the marker. Each point commits
    /// on its own; a bad point is logged and skipped.
    async fn sync_range(&self, from: NaiveDate, to: NaiveDate, refreshed: NaiveDate) -> SyncReport {
        let mut outcomes = Vec::with_capacity(self.catalog.len());

        for instrument in self.catalog.iter() {
            let outcome = match self
                .fetcher
                .fetch(&instrument.remote_search_term, from, to)
                .await
            {
                FetchOutcome::Unavailable { reason } => {
                    warn!("skipping '{}': {reason}", instrument.key);
                    SyncOutcome::Failed { reason }
                }
                FetchOutcome::Series(points) => {
                    let mut written = 0;
                    for point in &points {
                        let row = PricePoint {
                            date: point.date,
                            instrument_key: instrument.key.clone(),
                            close: point.close,
                            last_refreshed: refreshed,
                        };
                        match self.prices.upsert(&row).await {
                            Ok(()) => written += 1,
                            Err(e) => {
                                warn!(
                                    "failed to store ({}, {}): {e}",
                                    point.date, instrument.key
                                );
                            }
                        }
                    }
                    SyncOutcome::Synced { points: written }
                }
            };
            outcomes.push(InstrumentSync {
                key: instrument.key.clone(),
                outcome,
            });
        }

        SyncReport {
            outcomes,
            pruned: 0,
        }
    }

    /// The staleness gate consulted before scheduling a sync. Answers
    /// false when today's data is already in, false on weekends while
    /// Friday's close is still fresh, and false when the check itself
    /// fails -- repeated failures must not cascade into repeated
    /// destructive retries.
    pub async fn needs_update(&self, today: NaiveDate) -> bool {
        match self.evaluate_gate(today).await {
            Ok(needed) => needed,
            Err(e) => {
                warn!("staleness check failed ({e}); defaulting to no update");
                false
            }
        }
    }

    async fn evaluate_gate(&self, today: NaiveDate) -> Result<bool> {
        let Some(latest_refresh) = self.prices.latest_refresh().await? else {
            return Ok(true);
        };
        if latest_refresh == today {
            return Ok(false);
        }

        let Some(latest_date) = self.prices.latest_date().await? else {
            return Ok(true);
        };
        let gap = (today - latest_date).num_days();
        let is_weekend = matches!(today.weekday(), Weekday::Sat | Weekday::Sun);
        if is_weekend && gap < WEEKEND_GAP_DAYS {
            return Ok(false);
        }
        Ok(true)
    }
}
