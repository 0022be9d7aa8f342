//! Turns strategy weights into a display-ready, persisted allocation

use crate::core::catalog::InstrumentCatalog;
use crate::core::error::AllocateError;
use crate::core::market::{AllocationResult, PriceMatrix};
use crate::core::strategy::Strategy;
use crate::store::{AllocationStore, PriceStore};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// One instrument's share of the allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationLine {
    /// Weight in `[0, 1]` as produced by the strategy.
    pub weight: f64,
    /// `round(notional * weight)` in currency units.
    pub amount: i64,
    /// Brokerage search keyword; `None` when the catalog has no entry.
    pub keyword: Option<String>,
}

pub struct AllocationEngine {
    catalog: InstrumentCatalog,
    prices: Arc<dyn PriceStore>,
    allocations: Arc<dyn AllocationStore>,
    notional: i64,
}

impl AllocationEngine {
    pub fn new(
        catalog: InstrumentCatalog,
        prices: Arc<dyn PriceStore>,
        allocations: Arc<dyn AllocationStore>,
        notional: i64,
    ) -> Self {
        AllocationEngine {
            catalog,
            prices,
            allocations,
            notional,
        }
    }

    /// Compute today's allocation under `strategy` and register one row
    /// per instrument. Registration is idempotent per
    /// `(date, instrument, strategy)`; a strategy failure propagates
    /// untouched -- no default allocation is substituted.
    pub async fn run(
        &self,
        strategy: Strategy,
        today: NaiveDate,
    ) -> Result<BTreeMap<String, AllocationLine>, AllocateError> {
        let points = self.prices.all_points().await?;
        let matrix = PriceMatrix::from_points(&points);
        let weights = strategy.calculate(&matrix)?;

        let mut lines = BTreeMap::new();
        for (key, weight) in weights {
            let amount = (self.notional as f64 * weight).round() as i64;
            let keyword = self
                .catalog
                .get(&key)
                .map(|i| i.display_keyword.clone());
            if keyword.is_none() {
                debug!("no catalog keyword for '{key}'");
            }

            let row = AllocationResult {
                date: today,
                instrument_key: key.clone(),
                strategy_id: strategy.id(),
                weight_percent: (weight * 100.0) as i64,
                weight_amount: amount,
            };
            // Each row commits on its own; a failed commit costs that
            // row only.
            match self.allocations.insert_if_absent(&row).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("allocation for ({today}, {key}) already registered")
                }
                Err(e) => warn!("failed to register allocation for '{key}': {e}"),
            }

            lines.insert(
                key,
                AllocationLine {
                    weight,
                    amount,
                    keyword,
                },
            );
        }
        Ok(lines)
    }

    /// The most recent persisted allocation for `strategy`, sorted by
    /// amount descending.
    pub async fn latest(
        &self,
        strategy: Strategy,
    ) -> Result<Vec<AllocationResult>, AllocateError> {
        Ok(self.allocations.latest_for(strategy.id()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::Instrument;
    use crate::core::market::PricePoint;
    use crate::store::memory::{MemoryAllocationStore, MemoryPriceStore};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn seeded_prices(keys: &[&str]) -> Arc<MemoryPriceStore> {
        let store = Arc::new(MemoryPriceStore::new());
        let start = date(2024, 1, 1);
        for i in 0..120u64 {
            let d = start + chrono::Duration::days(i as i64);
            for (k, key) in keys.iter().enumerate() {
                let wiggle = ((i % 5) as f64 - 2.0) * (k as f64 + 1.0) * 0.3;
                store
                    .upsert(&PricePoint {
                        date: d,
                        instrument_key: key.to_string(),
                        close: 100.0 * (k as f64 + 1.0) + i as f64 * 0.1 + wiggle,
                        last_refreshed: d,
                    })
                    .await
                    .unwrap();
            }
        }
        store
    }

    fn engine_with(
        catalog: InstrumentCatalog,
        prices: Arc<MemoryPriceStore>,
        allocations: Arc<MemoryAllocationStore>,
    ) -> AllocationEngine {
        AllocationEngine::new(catalog, prices, allocations, 33333)
    }

    #[tokio::test]
    async fn run_produces_amounts_from_the_notional() {
        let prices = seeded_prices(&["a", "b"]).await;
        let allocations = Arc::new(MemoryAllocationStore::new());
        let catalog = InstrumentCatalog::new(vec![
            Instrument::new("a", "SYM_A", "Alpha"),
            Instrument::new("b", "SYM_B", "Beta"),
        ]);
        let engine = engine_with(catalog, prices, Arc::clone(&allocations));

        let lines = engine
            .run(Strategy::MinVariance, date(2024, 5, 1))
            .await
            .unwrap();

        assert_eq!(lines.len(), 2);
        for line in lines.values() {
            assert!((0.0..=1.0).contains(&line.weight));
            assert_eq!(line.amount, (33333.0 * line.weight).round() as i64);
            assert!(line.keyword.is_some());
        }
    }

    #[tokio::test]
    async fn same_day_rerun_registers_no_duplicate_rows() {
        let prices = seeded_prices(&["a", "b"]).await;
        let allocations = Arc::new(MemoryAllocationStore::new());
        let catalog = InstrumentCatalog::new(vec![
            Instrument::new("a", "SYM_A", "Alpha"),
            Instrument::new("b", "SYM_B", "Beta"),
        ]);
        let engine = engine_with(catalog, prices, Arc::clone(&allocations));
        let today = date(2024, 5, 1);

        engine.run(Strategy::MinVariance, today).await.unwrap();
        engine.run(Strategy::MinVariance, today).await.unwrap();

        assert_eq!(allocations.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn strategies_coexist_per_day() {
        let prices = seeded_prices(&["a", "b"]).await;
        let allocations = Arc::new(MemoryAllocationStore::new());
        let catalog = InstrumentCatalog::new(vec![
            Instrument::new("a", "SYM_A", "Alpha"),
            Instrument::new("b", "SYM_B", "Beta"),
        ]);
        let engine = engine_with(catalog, prices, Arc::clone(&allocations));
        let today = date(2024, 5, 1);

        for strategy in Strategy::all() {
            engine.run(strategy, today).await.unwrap();
        }

        assert_eq!(allocations.count().await.unwrap(), 6);
        assert_eq!(engine.latest(Strategy::MaxSharpe).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_catalog_keyword_is_not_fatal() {
        let prices = seeded_prices(&["a", "mystery"]).await;
        let allocations = Arc::new(MemoryAllocationStore::new());
        // Catalog knows "a" but not "mystery".
        let catalog = InstrumentCatalog::new(vec![Instrument::new("a", "SYM_A", "Alpha")]);
        let engine = engine_with(catalog, prices, allocations);

        let lines = engine
            .run(Strategy::MinVariance, date(2024, 5, 1))
            .await
            .unwrap();

        assert!(lines["a"].keyword.is_some());
        assert!(lines["mystery"].keyword.is_none());
        assert!(lines["mystery"].amount >= 0);
    }

    #[tokio::test]
    async fn strategy_failure_propagates() {
        let prices = seeded_prices(&["a"]).await;
        let allocations = Arc::new(MemoryAllocationStore::new());
        let catalog = InstrumentCatalog::new(vec![Instrument::new("a", "SYM_A", "Alpha")]);
        let engine = engine_with(catalog, prices, Arc::clone(&allocations));

        let err = engine
            .run(Strategy::MinVariance, date(2024, 5, 1))
            .await
            .unwrap_err();

        assert!(matches!(err, AllocateError::TooFewInstruments { .. }));
        assert_eq!(allocations.count().await.unwrap(), 0);
    }
}
