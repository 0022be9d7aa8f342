use crate::core::market::{AllocationResult, PricePoint};
use crate::store::{AllocationStore, PriceStore, sort_by_amount_desc};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// In-memory price store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryPriceStore {
    rows: RwLock<BTreeMap<(NaiveDate, String), PricePoint>>,
}

impl MemoryPriceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PriceStore for MemoryPriceStore {
    async fn upsert(&self, point: &PricePoint) -> Result<()> {
        let mut rows = self.rows.write().unwrap();
        rows.insert((point.date, point.instrument_key.clone()), point.clone());
        Ok(())
    }

    async fn get(&self, date: NaiveDate, instrument_key: &str) -> Result<Option<PricePoint>> {
        let rows = self.rows.read().unwrap();
        Ok(rows.get(&(date, instrument_key.to_string())).cloned())
    }

    async fn latest_date(&self) -> Result<Option<NaiveDate>> {
        let rows = self.rows.read().unwrap();
        Ok(rows.keys().next_back().map(|(date, _)| *date))
    }

    async fn latest_refresh(&self) -> Result<Option<NaiveDate>> {
        let rows = self.rows.read().unwrap();
        Ok(rows.values().map(|p| p.last_refreshed).max())
    }

    async fn all_points(&self) -> Result<Vec<PricePoint>> {
        let rows = self.rows.read().unwrap();
        Ok(rows.values().cloned().collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.rows.read().unwrap().len())
    }

    async fn prune_not_refreshed_on(&self, refreshed: NaiveDate) -> Result<usize> {
        let mut rows = self.rows.write().unwrap();
        let before = rows.len();
        rows.retain(|_, point| point.last_refreshed == refreshed);
        Ok(before - rows.len())
    }
}

/// In-memory allocation store.
#[derive(Default)]
pub struct MemoryAllocationStore {
    rows: RwLock<BTreeMap<(NaiveDate, u8, String), AllocationResult>>,
}

impl MemoryAllocationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AllocationStore for MemoryAllocationStore {
    async fn insert_if_absent(&self, row: &AllocationResult) -> Result<bool> {
        let mut rows = self.rows.write().unwrap();
        let key = (row.date, row.strategy_id, row.instrument_key.clone());
        if rows.contains_key(&key) {
            return Ok(false);
        }
        rows.insert(key, row.clone());
        Ok(true)
    }

    async fn latest_for(&self, strategy_id: u8) -> Result<Vec<AllocationResult>> {
        let rows = self.rows.read().unwrap();
        let latest_date = rows
            .values()
            .filter(|r| r.strategy_id == strategy_id)
            .map(|r| r.date)
            .max();

        let mut result: Vec<AllocationResult> = match latest_date {
            Some(date) => rows
                .values()
                .filter(|r| r.strategy_id == strategy_id && r.date == date)
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        sort_by_amount_desc(&mut result);
        Ok(result)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.rows.read().unwrap().len())
    }
}
