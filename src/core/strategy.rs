//! The closed set of allocation strategies
//!
//! Three objectives behind one `calculate` entrypoint; dispatch is an
//! exhaustive match over the enum rather than trait objects since the
//! set is fixed.

use crate::core::error::AllocateError;
use crate::core::market::PriceMatrix;
use crate::core::optimize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Minimum aligned daily-return rows for a usable covariance estimate.
pub const MIN_OBSERVATIONS: usize = 20;

/// Annualized expected-return floor for the constrained variant.
pub const TARGET_RETURN: f64 = 0.10;

/// Annualized risk-free rate for the Sharpe objective.
pub const RISK_FREE_RATE: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Minimize variance subject to an expected-return floor.
    ConstrainedMinVariance,
    /// Minimize variance, unconstrained on return.
    MinVariance,
    /// Maximize the Sharpe ratio; falls back to minimum variance when
    /// the solve is infeasible.
    MaxSharpe,
}

impl Strategy {
    pub fn all() -> [Strategy; 3] {
        [
            Strategy::ConstrainedMinVariance,
            Strategy::MinVariance,
            Strategy::MaxSharpe,
        ]
    }

    pub fn id(&self) -> u8 {
        match self {
            Strategy::ConstrainedMinVariance => 0,
            Strategy::MinVariance => 1,
            Strategy::MaxSharpe => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::ConstrainedMinVariance => "efficient-return",
            Strategy::MinVariance => "min-volatility",
            Strategy::MaxSharpe => "max-sharpe",
        }
    }

    pub fn from_id(id: u8) -> Result<Strategy, AllocateError> {
        Strategy::all()
            .into_iter()
            .find(|s| s.id() == id)
            .ok_or_else(|| AllocateError::UnknownStrategy {
                selector: id.to_string(),
                known: Strategy::known_selectors(),
            })
    }

    /// Resolve a strategy from its name or numeric id.
    pub fn from_selector(selector: &str) -> Result<Strategy, AllocateError> {
        if let Some(s) = Strategy::all()
            .into_iter()
            .find(|s| s.name() == selector.to_lowercase())
        {
            return Ok(s);
        }
        if let Ok(id) = selector.parse::<u8>() {
            return Strategy::from_id(id);
        }
        Err(AllocateError::UnknownStrategy {
            selector: selector.to_string(),
            known: Strategy::known_selectors(),
        })
    }

    fn known_selectors() -> String {
        Strategy::all()
            .iter()
            .map(|s| format!("{} ({})", s.name(), s.id()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Compute target weights for the instruments in `matrix`. Weights
    /// are in `[0, 1]`; the solver tolerance means they need not sum to
    /// exactly 1.
    pub fn calculate(
        &self,
        matrix: &PriceMatrix,
    ) -> Result<BTreeMap<String, f64>, AllocateError> {
        let keys = matrix.instrument_keys();
        if keys.len() < 2 {
            return Err(AllocateError::TooFewInstruments {
                instruments: keys.len(),
            });
        }

        let returns = matrix.aligned_returns();
        let rows = returns.first().map(|r| r.len()).unwrap_or(0);
        if rows < MIN_OBSERVATIONS {
            return Err(AllocateError::InsufficientHistory {
                rows,
                min: MIN_OBSERVATIONS,
            });
        }

        let mu = optimize::mean_returns(&returns);
        let cov = optimize::sample_cov(&returns);
        debug!(strategy = self.name(), instruments = keys.len(), rows, "solving");

        let weights = match self {
            Strategy::ConstrainedMinVariance => {
                optimize::efficient_return(&mu, &cov, TARGET_RETURN)
            }
            Strategy::MinVariance => optimize::min_variance(&cov),
            Strategy::MaxSharpe => optimize::max_sharpe(&mu, &cov, RISK_FREE_RATE).or_else(|e| {
                warn!("max-sharpe solve failed ({e}), falling back to min-volatility");
                optimize::min_variance(&cov)
            }),
        }
        .map_err(|e| AllocateError::Computation(e.to_string()))?;

        Ok(keys.into_iter().zip(weights).collect())
    }
}
