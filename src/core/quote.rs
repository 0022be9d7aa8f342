//! Fetch contract against the remote quote source

use crate::core::market::ClosePoint;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Outcome of a series fetch. `Unavailable` tags any transport, parse
/// or timeout failure so callers can tell it apart from a legitimately
/// empty series; `fetch` itself never returns `Err`.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Series(Vec<ClosePoint>),
    Unavailable { reason: String },
}

impl FetchOutcome {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        FetchOutcome::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, FetchOutcome::Unavailable { .. })
    }
}

#[async_trait]
pub trait SeriesFetcher: Send + Sync {
    /// Fetch daily closes for `search_term` over the inclusive range
    /// `from..=to`. A range with `from > to` is rejected without
    /// contacting the remote source.
    async fn fetch(&self, search_term: &str, from: NaiveDate, to: NaiveDate) -> FetchOutcome;
}
