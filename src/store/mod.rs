//! Durable stores for price rows and allocation results

pub mod disk;
pub mod memory;

use crate::core::market::{AllocationResult, PricePoint};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Close-price rows keyed by `(date, instrument_key)`. Every write is
/// committed on its own, so a failure partway through a batch leaves
/// earlier rows intact.
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Insert or overwrite the row at `(point.date, point.instrument_key)`.
    /// Remote data wins on conflict.
    async fn upsert(&self, point: &PricePoint) -> Result<()>;

    async fn get(&self, date: NaiveDate, instrument_key: &str) -> Result<Option<PricePoint>>;

    /// Most recent observation date across all rows.
    async fn latest_date(&self) -> Result<Option<NaiveDate>>;

    /// Most recent refresh marker across all rows.
    async fn latest_refresh(&self) -> Result<Option<NaiveDate>>;

    async fn all_points(&self) -> Result<Vec<PricePoint>>;

    async fn count(&self) -> Result<usize>;

    /// Delete rows whose refresh marker differs from `refreshed`,
    /// returning how many were removed. Used after a full rebuild to
    /// drop leftovers of an aborted earlier pass.
    async fn prune_not_refreshed_on(&self, refreshed: NaiveDate) -> Result<usize>;
}

/// Allocation rows keyed by `(date, instrument_key, strategy_id)`.
#[async_trait]
pub trait AllocationStore: Send + Sync {
    /// Insert only when no row exists for the composite key. Returns
    /// whether a row was written, making same-day re-runs observable
    /// no-ops.
    async fn insert_if_absent(&self, row: &AllocationResult) -> Result<bool>;

    /// All rows of the most recent date recorded for `strategy_id`,
    /// sorted by weight_amount descending.
    async fn latest_for(&self, strategy_id: u8) -> Result<Vec<AllocationResult>>;

    async fn count(&self) -> Result<usize>;
}

pub(crate) fn sort_by_amount_desc(rows: &mut [AllocationResult]) {
    rows.sort_by(|a, b| {
        b.weight_amount
            .cmp(&a.weight_amount)
            .then_with(|| a.instrument_key.cmp(&b.instrument_key))
    });
}
