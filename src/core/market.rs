//! Price rows and the date-indexed close matrix

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A single close observation as returned by the quote source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Durable close-price row. Identity is `(date, instrument_key)`;
/// `last_refreshed` records the day this row was last written or
/// confirmed, which is what the staleness gate looks at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub instrument_key: String,
    pub close: f64,
    pub last_refreshed: NaiveDate,
}

/// Persisted allocation row. Identity is `(date, instrument_key,
/// strategy_id)` so results of several strategies coexist per day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub date: NaiveDate,
    pub instrument_key: String,
    pub strategy_id: u8,
    pub weight_percent: i64,
    pub weight_amount: i64,
}

/// Close prices arranged as columns per instrument over a shared,
/// ascending date index. Cells are `None` where an instrument has no
/// observation for a date.
#[derive(Debug, Clone, Default)]
pub struct PriceMatrix {
    pub dates: Vec<NaiveDate>,
    pub columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl PriceMatrix {
    pub fn from_points(points: &[PricePoint]) -> Self {
        let dates: Vec<NaiveDate> = points
            .iter()
            .map(|p| p.date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let index: BTreeMap<NaiveDate, usize> =
            dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();

        let mut columns: BTreeMap<String, Vec<Option<f64>>> = BTreeMap::new();
        for point in points {
            let column = columns
                .entry(point.instrument_key.clone())
                .or_insert_with(|| vec![None; dates.len()]);
            column[index[&point.date]] = Some(point.close);
        }

        PriceMatrix { dates, columns }
    }

    pub fn instrument_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty() || self.columns.is_empty()
    }

    /// Daily simple returns per column, computed over consecutive
    /// present cells and aligned to the common tail length, matching
    /// the column order of `instrument_keys`.
    pub fn aligned_returns(&self) -> Vec<Vec<f64>> {
        let per_column: Vec<Vec<f64>> = self
            .columns
            .values()
            .map(|closes| {
                let present: Vec<f64> = closes.iter().flatten().copied().collect();
                let mut returns = Vec::with_capacity(present.len().saturating_sub(1));
                for w in present.windows(2) {
                    if w[0] > 0.0 {
                        returns.push(w[1] / w[0] - 1.0);
                    }
                }
                returns
            })
            .collect();

        let min_len = per_column.iter().map(|r| r.len()).min().unwrap_or(0);
        per_column
            .into_iter()
            .map(|r| r[r.len() - min_len..].to_vec())
            .collect()
    }

    pub fn instrument_keys(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }
}
