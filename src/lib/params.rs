//! Flat parameter vectors and their named views.
//!
//! The sampler works on plain `&[f64]` vectors laid out as
//! `[beta, alpha, (gamma), (diag_lag[0..n]), (model)]`; which optional fields
//! exist depends on the modeled features. A [`Layout`] is selected once from
//! the features and is the only place that knows the field offsets, so
//! decoding, encoding and the prior always agree.

use serde::{Serialize, Deserialize};
use std::f64::NEG_INFINITY;

use crate::errors::*;
use crate::imputation::discrete_uniform_quantile;

/// Smallest admissible diagnosis-lag or model-index quantile.
pub const MIN_QUANTILE: f64 = 1e-6;

/// Shape of the power-law prior on `1 - alpha`.
pub const ALPHA_PRIOR_SHAPE: f64 = 4.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFeatures {
    pub diagnosis_lag: bool,
    pub recovery: bool,
    pub null_comparison: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Transmission,
    Recovery,
    Lag { n_lags: usize },
    RecoveryLag { n_lags: usize },
    Null,
    RecoveryNull,
    LagNull { n_lags: usize },
    RecoveryLagNull { n_lags: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Parameters {
    Transmission { beta: f64, alpha: f64 },
    Recovery { beta: f64, alpha: f64, gamma: f64 },
    Lag { beta: f64, alpha: f64, diag_lag: Vec<f64> },
    RecoveryLag { beta: f64, alpha: f64, gamma: f64, diag_lag: Vec<f64> },
    Null { beta: f64, alpha: f64, model: f64 },
    RecoveryNull { beta: f64, alpha: f64, gamma: f64, model: f64 },
    LagNull { beta: f64, alpha: f64, diag_lag: Vec<f64>, model: f64 },
    RecoveryLagNull { beta: f64, alpha: f64, gamma: f64, diag_lag: Vec<f64>, model: f64 },
}

impl Layout {
    /// `n_lags` is the number of censored sick intervals with a lag
    /// parameter; it is ignored unless diagnosis lag is modeled.
    pub fn select(features: ModelFeatures, n_lags: usize) -> Self {
        match (features.recovery, features.diagnosis_lag, features.null_comparison) {
            (false, false, false) => Layout::Transmission,
            (true, false, false) => Layout::Recovery,
            (false, true, false) => Layout::Lag { n_lags },
            (true, true, false) => Layout::RecoveryLag { n_lags },
            (false, false, true) => Layout::Null,
            (true, false, true) => Layout::RecoveryNull,
            (false, true, true) => Layout::LagNull { n_lags },
            (true, true, true) => Layout::RecoveryLagNull { n_lags },
        }
    }

    pub fn features(&self) -> ModelFeatures {
        ModelFeatures {
            diagnosis_lag: self.n_lags().is_some(),
            recovery: match self {
                Layout::Recovery | Layout::RecoveryLag { .. }
                | Layout::RecoveryNull | Layout::RecoveryLagNull { .. } => true,
                _ => false,
            },
            null_comparison: match self {
                Layout::Null | Layout::RecoveryNull
                | Layout::LagNull { .. } | Layout::RecoveryLagNull { .. } => true,
                _ => false,
            },
        }
    }

    pub fn n_lags(&self) -> Option<usize> {
        match self {
            Layout::Lag { n_lags } | Layout::RecoveryLag { n_lags }
            | Layout::LagNull { n_lags } | Layout::RecoveryLagNull { n_lags } => Some(*n_lags),
            _ => None,
        }
    }

    pub fn dimension(&self) -> usize {
        let features = self.features();
        2 + features.recovery as usize
            + self.n_lags().unwrap_or(0)
            + features.null_comparison as usize
    }

    /// Field names in vector order, e.g. for posterior summaries.
    pub fn field_names(&self) -> Vec<String> {
        let features = self.features();
        let mut names = vec![String::from("beta"), String::from("alpha")];
        if features.recovery {
            names.push("gamma".into());
        }
        for i in 0..self.n_lags().unwrap_or(0) {
            names.push(format!("diag_lag[{}]", i));
        }
        if features.null_comparison {
            names.push("model".into());
        }
        names
    }

    pub fn decode(&self, v: &[f64]) -> Result<Parameters> {
        let expected = self.dimension();
        if v.len() != expected {
            return Err(Error::DimensionMismatch { expected, actual: v.len() });
        }

        let (beta, alpha) = (v[0], v[1]);
        let lags = |offset: usize, n: usize| v[offset..offset + n].to_vec();
        let last = v[expected - 1];

        Ok(match *self {
            Layout::Transmission => Parameters::Transmission { beta, alpha },
            Layout::Recovery => Parameters::Recovery { beta, alpha, gamma: v[2] },
            Layout::Lag { n_lags } => Parameters::Lag {
                beta, alpha, diag_lag: lags(2, n_lags),
            },
            Layout::RecoveryLag { n_lags } => Parameters::RecoveryLag {
                beta, alpha, gamma: v[2], diag_lag: lags(3, n_lags),
            },
            Layout::Null => Parameters::Null { beta, alpha, model: last },
            Layout::RecoveryNull => Parameters::RecoveryNull {
                beta, alpha, gamma: v[2], model: last,
            },
            Layout::LagNull { n_lags } => Parameters::LagNull {
                beta, alpha, diag_lag: lags(2, n_lags), model: last,
            },
            Layout::RecoveryLagNull { n_lags } => Parameters::RecoveryLagNull {
                beta, alpha, gamma: v[2], diag_lag: lags(3, n_lags), model: last,
            },
        })
    }

    /// Per-field sampler bounds in vector order.
    pub fn bounds(&self, priors: &Priors) -> Vec<Bounds> {
        let features = self.features();
        let mut bounds = vec![priors.beta, priors.alpha];
        if features.recovery {
            bounds.push(priors.gamma_bounds());
        }
        for _ in 0..self.n_lags().unwrap_or(0) {
            bounds.push(Bounds::QUANTILE);
        }
        if features.null_comparison {
            bounds.push(Bounds::QUANTILE);
        }
        bounds
    }
}

impl Parameters {
    pub fn beta(&self) -> f64 {
        match self {
            Parameters::Transmission { beta, .. }
            | Parameters::Recovery { beta, .. }
            | Parameters::Lag { beta, .. }
            | Parameters::RecoveryLag { beta, .. }
            | Parameters::Null { beta, .. }
            | Parameters::RecoveryNull { beta, .. }
            | Parameters::LagNull { beta, .. }
            | Parameters::RecoveryLagNull { beta, .. } => *beta,
        }
    }

    pub fn alpha(&self) -> f64 {
        match self {
            Parameters::Transmission { alpha, .. }
            | Parameters::Recovery { alpha, .. }
            | Parameters::Lag { alpha, .. }
            | Parameters::RecoveryLag { alpha, .. }
            | Parameters::Null { alpha, .. }
            | Parameters::RecoveryNull { alpha, .. }
            | Parameters::LagNull { alpha, .. }
            | Parameters::RecoveryLagNull { alpha, .. } => *alpha,
        }
    }

    pub fn gamma(&self) -> Option<f64> {
        match self {
            Parameters::Recovery { gamma, .. }
            | Parameters::RecoveryLag { gamma, .. }
            | Parameters::RecoveryNull { gamma, .. }
            | Parameters::RecoveryLagNull { gamma, .. } => Some(*gamma),
            _ => None,
        }
    }

    pub fn diag_lag(&self) -> Option<&[f64]> {
        match self {
            Parameters::Lag { diag_lag, .. }
            | Parameters::RecoveryLag { diag_lag, .. }
            | Parameters::LagNull { diag_lag, .. }
            | Parameters::RecoveryLagNull { diag_lag, .. } => Some(diag_lag),
            _ => None,
        }
    }

    pub fn model(&self) -> Option<f64> {
        match self {
            Parameters::Null { model, .. }
            | Parameters::RecoveryNull { model, .. }
            | Parameters::LagNull { model, .. }
            | Parameters::RecoveryLagNull { model, .. } => Some(*model),
            _ => None,
        }
    }

    pub fn layout(&self) -> Layout {
        let features = ModelFeatures {
            diagnosis_lag: self.diag_lag().is_some(),
            recovery: self.gamma().is_some(),
            null_comparison: self.model().is_some(),
        };
        Layout::select(features, self.diag_lag().map(|d| d.len()).unwrap_or(0))
    }

    pub fn encode(&self) -> Vec<f64> {
        let mut v = vec![self.beta(), self.alpha()];
        v.extend(self.gamma());
        if let Some(diag_lag) = self.diag_lag() {
            v.extend_from_slice(diag_lag);
        }
        v.extend(self.model());
        v
    }
}

/// Closed interval `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub low: f64,
    pub high: f64,
}

impl Bounds {
    pub const QUANTILE: Bounds = Bounds { low: MIN_QUANTILE, high: 1.0 };
    pub const UNIT: Bounds = Bounds { low: 0.0, high: 1.0 };

    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// False for NaN.
    pub fn contains(&self, x: f64) -> bool {
        x >= self.low && x <= self.high
    }
}

/// Uniform prior bounds. `gamma` defaults to the unit interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Priors {
    pub beta: Bounds,
    pub alpha: Bounds,
    pub gamma: Option<Bounds>,
}

impl Priors {
    pub fn gamma_bounds(&self) -> Bounds {
        self.gamma.unwrap_or(Bounds::UNIT)
    }
}

/// Log-density of the power-law distribution `a x^(a-1)` on `[0, 1]`.
pub fn power_law_log_pdf(x: f64, a: f64) -> f64 {
    if x >= 0.0 && x <= 1.0 {
        a.ln() + (a - 1.0) * x.ln()
    }
    else {
        NEG_INFINITY
    }
}

/// Hard bounds on every field; inside them, only `alpha` is shaped, by a
/// power law on `1 - alpha` favoring small background risk.
pub fn log_prior(v: &[f64], priors: &Priors, layout: Layout) -> f64 {
    let params = match layout.decode(v) {
        Ok(params) => params,
        Err(_) => return NEG_INFINITY,
    };

    if !priors.beta.contains(params.beta()) || !priors.alpha.contains(params.alpha()) {
        return NEG_INFINITY;
    }
    if let Some(gamma) = params.gamma() {
        if !priors.gamma_bounds().contains(gamma) {
            return NEG_INFINITY;
        }
    }
    if let Some(diag_lag) = params.diag_lag() {
        if !diag_lag.iter().all(|q| Bounds::QUANTILE.contains(*q)) {
            return NEG_INFINITY;
        }
    }
    if let Some(model) = params.model() {
        if !Bounds::QUANTILE.contains(model) {
            return NEG_INFINITY;
        }
    }

    power_law_log_pdf(1.0 - params.alpha(), ALPHA_PRIOR_SHAPE)
}

/// Network hypothesis selected by the model-index quantile.
pub fn model_index(q: f64, n_networks: usize) -> Option<usize> {
    discrete_uniform_quantile(q, n_networks)
}
