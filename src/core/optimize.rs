//! Return/covariance estimation and the long-only weight solvers
//!
//! Weights live on the simplex via a softmax reparameterization, so the
//! solver itself is unconstrained Nelder-Mead.

use anyhow::{Result, anyhow};
use argmin::core::{CostFunction, Executor};
use argmin::solver::neldermead::NelderMead;

const TRADING_DAYS: f64 = 252.0;
const VOL_EPS: f64 = 1e-10;
const RETURN_PENALTY: f64 = 10.0;

fn sample_mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

/// Annualized mean of daily simple returns, one entry per series.
pub fn mean_returns(aligned_returns: &[Vec<f64>]) -> Vec<f64> {
    aligned_returns
        .iter()
        .map(|r| sample_mean(r) * TRADING_DAYS)
        .collect()
}

/// Annualized sample covariance (n-1 normalization) of daily returns.
pub fn sample_cov(aligned_returns: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = aligned_returns.len();
    let rows = aligned_returns.first().map(|r| r.len()).unwrap_or(0);
    let means: Vec<f64> = aligned_returns.iter().map(|r| sample_mean(r)).collect();

    let mut cov = vec![vec![0.0; n]; n];
    if rows < 2 {
        return cov;
    }

    for i in 0..n {
        for j in i..n {
            let mut acc = 0.0;
            for t in 0..rows {
                acc += (aligned_returns[i][t] - means[i]) * (aligned_returns[j][t] - means[j]);
            }
            let c = acc / (rows - 1) as f64 * TRADING_DAYS;
            cov[i][j] = c;
            cov[j][i] = c;
        }
    }

    cov
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn mat_vec_mul(mat: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    mat.iter()
        .map(|row| row.iter().zip(v.iter()).map(|(a, b)| a * b).sum())
        .collect()
}

fn softmax(x: &[f64]) -> Vec<f64> {
    let max_x = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = x.iter().map(|&v| (v - max_x).exp()).collect();
    let sum: f64 = exps.iter().sum();

    if sum < 1e-15 {
        vec![1.0 / x.len() as f64; x.len()]
    } else {
        exps.iter().map(|&e| e / sum).collect()
    }
}

fn portfolio_variance(w: &[f64], cov: &[Vec<f64>]) -> f64 {
    dot(w, &mat_vec_mul(cov, w))
}

fn unit_simplex(n: usize) -> Vec<Vec<f64>> {
    let x0 = vec![0.0; n];
    let mut simplex = Vec::with_capacity(n + 1);
    simplex.push(x0.clone());
    for i in 0..n {
        let mut point = x0.clone();
        point[i] = 1.0;
        simplex.push(point);
    }
    simplex
}

fn solve<C>(cost: C, n: usize) -> Result<Vec<f64>>
where
    C: CostFunction<Param = Vec<f64>, Output = f64>,
{
    let solver = NelderMead::new(unit_simplex(n))
        .with_sd_tolerance(1e-8)
        .map_err(|e| anyhow!("solver setup failed: {e}"))?;

    let res = Executor::new(cost, solver)
        .configure(|state| state.max_iters(5000))
        .run()
        .map_err(|e| anyhow!("solver run failed: {e}"))?;

    let best = res
        .state
        .best_param
        .ok_or_else(|| anyhow!("solver returned no solution"))?;
    let weights = softmax(&best);

    if weights.iter().any(|w| !w.is_finite()) {
        return Err(anyhow!("solver produced non-finite weights"));
    }
    Ok(weights)
}

/// Minimize portfolio variance, unconstrained on return.
pub fn min_variance(cov: &[Vec<f64>]) -> Result<Vec<f64>> {
    struct MinVarCost {
        cov: Vec<Vec<f64>>,
    }

    impl CostFunction for MinVarCost {
        type Param = Vec<f64>;
        type Output = f64;

        fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
            Ok(portfolio_variance(&softmax(x), &self.cov))
        }
    }

    solve(MinVarCost { cov: cov.to_vec() }, cov.len())
}

/// Minimize variance subject to an expected-return floor, enforced as a
/// quadratic penalty on the deviation from `target_return`.
pub fn efficient_return(mu: &[f64], cov: &[Vec<f64>], target_return: f64) -> Result<Vec<f64>> {
    struct EfficientReturnCost {
        mu: Vec<f64>,
        cov: Vec<Vec<f64>>,
        target_return: f64,
    }

    impl CostFunction for EfficientReturnCost {
        type Param = Vec<f64>;
        type Output = f64;

        fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
            let w = softmax(x);
            let shortfall = (dot(&w, &self.mu) - self.target_return).min(0.0);
            Ok(portfolio_variance(&w, &self.cov) + RETURN_PENALTY * shortfall * shortfall)
        }
    }

    solve(
        EfficientReturnCost {
            mu: mu.to_vec(),
            cov: cov.to_vec(),
            target_return,
        },
        mu.len(),
    )
}

/// Maximize `(expected return - risk_free) / volatility`. A covariance
/// too degenerate to yield a meaningful volatility is an error; callers
/// decide whether to fall back.
pub fn max_sharpe(mu: &[f64], cov: &[Vec<f64>], risk_free: f64) -> Result<Vec<f64>> {
    let n = mu.len();
    let equal = vec![1.0 / n as f64; n];
    if portfolio_variance(&equal, cov) < VOL_EPS {
        return Err(anyhow!("covariance is degenerate, Sharpe ratio undefined"));
    }

    struct NegSharpeCost {
        mu: Vec<f64>,
        cov: Vec<Vec<f64>>,
        risk_free: f64,
    }

    impl CostFunction for NegSharpeCost {
        type Param = Vec<f64>;
        type Output = f64;

        fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
            let w = softmax(x);
            let vol = portfolio_variance(&w, &self.cov).max(0.0).sqrt();
            if vol < VOL_EPS {
                return Ok(1e10);
            }
            Ok(-(dot(&w, &self.mu) - self.risk_free) / vol)
        }
    }

    let weights = solve(
        NegSharpeCost {
            mu: mu.to_vec(),
            cov: cov.to_vec(),
            risk_free,
        },
        n,
    )?;

    if portfolio_variance(&weights, cov).max(0.0).sqrt() < VOL_EPS {
        return Err(anyhow!("optimal portfolio has no volatility"));
    }
    Ok(weights)
}
