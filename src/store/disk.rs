use crate::core::market::{AllocationResult, PricePoint};
use crate::store::{AllocationStore, PriceStore, sort_by_amount_desc};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle};
use std::path::Path;
use tracing::debug;

/// Opens the fjall keyspace with one partition per table.
pub fn open(path: &Path) -> Result<(DiskPriceStore, DiskAllocationStore)> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create data directory: {}", path.display()))?;

    let keyspace = fjall::Config::new(path.join("store")).open()?;
    let prices = keyspace.open_partition("prices", PartitionCreateOptions::default())?;
    let allocations = keyspace.open_partition("allocations", PartitionCreateOptions::default())?;

    Ok((
        DiskPriceStore {
            _keyspace: keyspace.clone(),
            partition: prices,
        },
        DiskAllocationStore {
            _keyspace: keyspace,
            partition: allocations,
        },
    ))
}

/// Price rows in a fjall partition. Keys are `"{date}/{instrument}"`,
/// so lexicographic order matches chronological order and the composite
/// identity is enforced by the key itself.
pub struct DiskPriceStore {
    _keyspace: Keyspace,
    partition: PartitionHandle,
}

fn price_key(date: NaiveDate, instrument_key: &str) -> String {
    format!("{}/{}", date.format("%Y-%m-%d"), instrument_key)
}

#[async_trait]
impl PriceStore for DiskPriceStore {
    async fn upsert(&self, point: &PricePoint) -> Result<()> {
        let key = price_key(point.date, &point.instrument_key);
        self.partition.insert(&key, serde_json::to_vec(point)?)?;
        debug!("price upsert {key}");
        Ok(())
    }

    async fn get(&self, date: NaiveDate, instrument_key: &str) -> Result<Option<PricePoint>> {
        match self.partition.get(price_key(date, instrument_key))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    async fn latest_date(&self) -> Result<Option<NaiveDate>> {
        match self.partition.last_key_value()? {
            Some((_, value)) => {
                let point: PricePoint = serde_json::from_slice(&value)?;
                Ok(Some(point.date))
            }
            None => Ok(None),
        }
    }

    async fn latest_refresh(&self) -> Result<Option<NaiveDate>> {
        let mut latest = None;
        for kv in self.partition.iter() {
            let (_, value) = kv?;
            let point: PricePoint = serde_json::from_slice(&value)?;
            if latest.is_none_or(|d| point.last_refreshed > d) {
                latest = Some(point.last_refreshed);
            }
        }
        Ok(latest)
    }

    async fn all_points(&self) -> Result<Vec<PricePoint>> {
        let mut points = Vec::new();
        for kv in self.partition.iter() {
            let (_, value) = kv?;
            points.push(serde_json::from_slice(&value)?);
        }
        Ok(points)
    }

    async fn count(&self) -> Result<usize> {
        let mut n = 0;
        for kv in self.partition.iter() {
            kv?;
            n += 1;
        }
        Ok(n)
    }

    async fn prune_not_refreshed_on(&self, refreshed: NaiveDate) -> Result<usize> {
        let mut stale_keys = Vec::new();
        for kv in self.partition.iter() {
            let (key, value) = kv?;
            let point: PricePoint = serde_json::from_slice(&value)?;
            if point.last_refreshed != refreshed {
                stale_keys.push(key);
            }
        }
        let removed = stale_keys.len();
        for key in stale_keys {
            self.partition.remove(key)?;
        }
        if removed > 0 {
            debug!("pruned {removed} stale price rows");
        }
        Ok(removed)
    }
}

/// Allocation rows in a fjall partition, keyed
/// `"{date}/{strategy_id:02}/{instrument}"`.
pub struct DiskAllocationStore {
    _keyspace: Keyspace,
    partition: PartitionHandle,
}

fn allocation_key(row: &AllocationResult) -> String {
    format!(
        "{}/{:02}/{}",
        row.date.format("%Y-%m-%d"),
        row.strategy_id,
        row.instrument_key
    )
}

#[async_trait]
impl AllocationStore for DiskAllocationStore {
    async fn insert_if_absent(&self, row: &AllocationResult) -> Result<bool> {
        let key = allocation_key(row);
        if self.partition.get(&key)?.is_some() {
            debug!("allocation {key} already registered");
            return Ok(false);
        }
        self.partition.insert(&key, serde_json::to_vec(row)?)?;
        Ok(true)
    }

    async fn latest_for(&self, strategy_id: u8) -> Result<Vec<AllocationResult>> {
        let mut rows: Vec<AllocationResult> = Vec::new();
        for kv in self.partition.iter() {
            let (_, value) = kv?;
            let row: AllocationResult = serde_json::from_slice(&value)?;
            if row.strategy_id == strategy_id {
                rows.push(row);
            }
        }

        let Some(latest_date) = rows.iter().map(|r| r.date).max() else {
            return Ok(Vec::new());
        };
        rows.retain(|r| r.date == latest_date);
        sort_by_amount_desc(&mut rows);
        Ok(rows)
    }

    async fn count(&self) -> Result<usize> {
        let mut n = 0;
        for kv in self.partition.iter() {
            kv?;
            n += 1;
        }
        Ok(n)
    }
}
