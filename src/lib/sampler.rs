//! The boundary to an external parallel-tempering sampler.
//!
//! This crate does not sample. It exposes models through [`LogPosterior`],
//! consumes any [`PosteriorSampler`] implementation, and turns the raw
//! [`SamplerRun`] it returns into summaries: posterior moments, model
//! evidence by thermodynamic integration, autocorrelation times and, for
//! null comparison, how often each network hypothesis was visited.

use rand::Rng;
use rand::distributions::Distribution;
use rand_distr::Beta;
use serde::{Serialize, Deserialize};
use std::f64::NEG_INFINITY;
use tracing::warn;

use crate::errors::*;
use crate::params::{model_index, Bounds, Layout, Priors, ALPHA_PRIOR_SHAPE};

/// Pure scoring functions over flat parameter vectors. Implementations must
/// be safe to call concurrently from many chains.
pub trait LogPosterior: Sync {
    fn dimension(&self) -> usize;

    fn log_likelihood(&self, params: &[f64]) -> f64;

    fn log_prior(&self, params: &[f64]) -> f64;

    /// Per-field bounds, in vector order.
    fn bounds(&self) -> Vec<Bounds>;

    /// Skips the likelihood when the prior already rejects `params`.
    fn log_posterior(&self, params: &[f64]) -> f64 {
        let lp = self.log_prior(params);
        if lp == NEG_INFINITY {
            NEG_INFINITY
        }
        else {
            lp + self.log_likelihood(params)
        }
    }
}

/// Inverse temperatures, hottest last; the first rung is always 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureLadder {
    pub betas: Vec<f64>,
}

impl TemperatureLadder {
    /// Ten rungs, log-spaced over `[10^-0.04, 1]`.
    pub fn parameter_estimation() -> Self {
        Self::from_log10_exponents(linspace(0.0, -0.04, 10))
    }

    /// Thirty rungs reaching down to 0.1, dense near 1, for comparing
    /// network hypotheses whose likelihoods differ sharply.
    pub fn null_comparison() -> Self {
        let mut exponents = linspace(0.0, -0.1, 20);
        exponents.extend(linspace(-0.12, -0.5, 5));
        exponents.extend(linspace(-0.5, -1.0, 5));
        Self::from_log10_exponents(exponents)
    }

    pub fn for_null_comparison(null_comparison: bool) -> Self {
        if null_comparison {
            Self::null_comparison()
        }
        else {
            Self::parameter_estimation()
        }
    }

    fn from_log10_exponents(mut exponents: Vec<f64>) -> Self {
        exponents.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        Self { betas: exponents.into_iter().map(|e| 10f64.powf(e)).collect() }
    }

    pub fn len(&self) -> usize {
        self.betas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.betas.is_empty()
    }
}

/// At least 20 walkers, and at least two per dimension.
pub fn walker_count(dimension: usize) -> usize {
    std::cmp::max(20, 2 * dimension)
}

/// Walker positions `[temperature][walker][field]`.
pub type Positions = Vec<Vec<Vec<f64>>>;

/// Raw output of a sampler, after its own burn-in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplerRun {
    pub betas: Vec<f64>,
    /// `[temperature][walker][step][field]`
    pub chain: Vec<Vec<Vec<Vec<f64>>>>,
    /// `[temperature][walker][step]`
    pub log_likelihoods: Vec<Vec<Vec<f64>>>,
    /// `[temperature][walker]`
    pub acceptance_fraction: Vec<Vec<f64>>,
}

pub trait PosteriorSampler {
    fn sample(
        &mut self,
        model: &dyn LogPosterior,
        ladder: &TemperatureLadder,
        initial: &Positions,
        iterations: usize,
    ) -> Result<SamplerRun>;
}

/// Starting positions drawn from the priors: uniform beta and gamma,
/// `1 - alpha` from the power-law prior, lag quantiles uniform on
/// `[0.001, 1)`, model quantile uniform on `[0.0001, 1)`.
pub fn initial_positions<R: Rng + ?Sized>(
    layout: Layout, priors: &Priors, n_temps: usize, n_walkers: usize, rng: &mut R
) -> Result<Positions> {
    let features = layout.features();
    let power_law = Beta::new(ALPHA_PRIOR_SHAPE, 1.0).map_err(
        |e| Error::InvalidPrior(format!("{:?}", e))
    )?;

    Ok((0..n_temps).map(|_| {
        (0..n_walkers).map(|_| {
            let mut position = vec![uniform(rng, priors.beta)];
            position.push(1.0 - power_law.sample(rng));
            if features.recovery {
                position.push(uniform(rng, priors.gamma_bounds()));
            }
            for _ in 0..layout.n_lags().unwrap_or(0) {
                position.push(uniform(rng, Bounds::new(0.001, 1.0)));
            }
            if features.null_comparison {
                position.push(uniform(rng, Bounds::new(0.0001, 1.0)));
            }
            position
        }).collect()
    }).collect())
}

fn uniform<R: Rng + ?Sized>(rng: &mut R, bounds: Bounds) -> f64 {
    if bounds.low < bounds.high {
        rng.gen_range(bounds.low, bounds.high)
    }
    else {
        bounds.low
    }
}

/// True when every starting walker has a finite prior and every walker of
/// the coldest temperature a finite likelihood.
pub fn check_initial_positions(model: &dyn LogPosterior, initial: &Positions) -> bool {
    let mut ok = true;
    for (temp, walkers) in initial.iter().enumerate() {
        for (walker, position) in walkers.iter().enumerate() {
            if model.log_prior(position) == NEG_INFINITY {
                warn!(temp, walker, "starting position has zero prior probability");
                ok = false;
            }
            else if temp == 0 && model.log_likelihood(position) == NEG_INFINITY {
                warn!(walker, "starting position has zero likelihood");
                ok = false;
            }
        }
    }
    ok
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub log_z: f64,
    /// Difference to the estimate from every other rung.
    pub error: f64,
}

/// Thermodynamic integration of the mean log-likelihood over the ladder.
/// Steps before `burn_in` and `-inf` likelihoods are ignored.
pub fn log_evidence(run: &SamplerRun, burn_in: usize) -> Evidence {
    let means: Vec<f64> = run.log_likelihoods.iter().map(|walkers| {
        let walker_means: Vec<f64> = walkers.iter().filter_map(|steps| {
            finite_mean(steps.iter().skip(burn_in).copied())
        }).collect();
        finite_mean(walker_means.into_iter()).unwrap_or(NEG_INFINITY)
    }).collect();

    let log_z = -trapezoid(&means, &run.betas);
    let half_means: Vec<f64> = means.iter().step_by(2).copied().collect();
    let half_betas: Vec<f64> = run.betas.iter().step_by(2).copied().collect();
    let log_z_half = -trapezoid(&half_means, &half_betas);

    Evidence { log_z, error: (log_z_half - log_z).abs() }
}

fn finite_mean<I: Iterator<Item = f64>>(values: I) -> Option<f64> {
    let (sum, n) = values.filter(|v| v.is_finite()).fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        None
    }
    else {
        Some(sum / n as f64)
    }
}

fn trapezoid(y: &[f64], x: &[f64]) -> f64 {
    y.windows(2).zip(x.windows(2)).map(|(y, x)| (x[1] - x[0]) * (y[0] + y[1]) / 2.0).sum()
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => (0..n).map(|i| start + (end - start) * i as f64 / (n - 1) as f64).collect(),
    }
}

/// Cold-chain samples after `burn_in`, one row per walker step.
pub fn flatten_with_burn(run: &SamplerRun, burn_in: usize) -> Vec<Vec<f64>> {
    run.chain.first().map(|walkers| {
        walkers.iter().flat_map(|steps| steps.iter().skip(burn_in).cloned()).collect()
    }).unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosteriorSummary {
    pub names: Vec<String>,
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

/// Per-field mean and population standard deviation, rounded to three
/// decimals.
pub fn summarize(samples: &[Vec<f64>], names: Vec<String>) -> PosteriorSummary {
    let n_fields = names.len();
    let n = samples.len() as f64;
    let mut mean = vec![0.0; n_fields];
    let mut std = vec![0.0; n_fields];
    if !samples.is_empty() {
        for field in 0..n_fields {
            let m = samples.iter().map(|s| s[field]).sum::<f64>() / n;
            let var = samples.iter().map(|s| (s[field] - m).powi(2)).sum::<f64>() / n;
            mean[field] = round3(m);
            std[field] = round3(var.sqrt());
        }
    }
    PosteriorSummary { names, mean, std }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

pub fn mean_acceptance_fraction(run: &SamplerRun) -> f64 {
    finite_mean(run.acceptance_fraction.iter().flatten().copied()).unwrap_or(0.0)
}

/// Integrated autocorrelation time with Sokal's adaptive window (`c` times
/// the running estimate). `None` if the series is too short for the window
/// to close or has no variance.
pub fn integrated_time(series: &[f64], c: f64) -> Option<f64> {
    let n = series.len();
    if n < 2 {
        return None;
    }
    let mean = series.iter().sum::<f64>() / n as f64;
    let centered: Vec<f64> = series.iter().map(|x| x - mean).collect();
    let c0: f64 = centered.iter().map(|x| x * x).sum::<f64>() / n as f64;
    if c0 == 0.0 {
        return None;
    }

    let mut tau = 1.0;
    for lag in 1..n {
        let ck: f64 = centered[..n - lag].iter().zip(&centered[lag..]).map(|(a, b)| a * b)
            .sum::<f64>() / n as f64;
        tau += 2.0 * ck / c0;
        if lag as f64 >= c * tau {
            return Some(tau);
        }
    }
    None
}

/// Longest integrated autocorrelation time over cold-chain walkers and fields.
pub fn max_integrated_time(run: &SamplerRun, burn_in: usize) -> Option<f64> {
    let walkers = run.chain.first()?;
    let mut longest: Option<f64> = None;
    for steps in walkers {
        let steps = steps.get(burn_in..).unwrap_or(&[]);
        let n_fields = steps.first().map(|s| s.len()).unwrap_or(0);
        for field in 0..n_fields {
            let series: Vec<f64> = steps.iter().map(|s| s[field]).collect();
            let tau = integrated_time(&series, 5.0)?;
            longest = Some(longest.map_or(tau, |l: f64| l.max(tau)));
        }
    }
    longest
}

/// How many cold-chain samples selected each network hypothesis.
pub fn model_visits(
    run: &SamplerRun, burn_in: usize, model_field: usize, n_networks: usize
) -> Vec<usize> {
    let mut visits = vec![0; n_networks];
    for sample in flatten_with_burn(run, burn_in) {
        if let Some(index) = sample.get(model_field).and_then(|q| model_index(*q, n_networks)) {
            visits[index] += 1;
        }
    }
    visits
}
