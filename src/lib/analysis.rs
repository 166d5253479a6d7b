//! Binds networks, health reports and priors into a scoring model, and runs
//! the two analysis stages against an external sampler.

use rand::Rng;
use serde::{Serialize, Deserialize};
use std::f64::NEG_INFINITY;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::diagnostics::DiagnosticSink;
use crate::errors::*;
use crate::hazard;
use crate::health::HealthTimeline;
use crate::imputation::{
    self, ContactDayList, Imputation, LagImputation, RecoveryBounds, RecoveryImputation,
};
use crate::network::{Day, NetworkSet, TemporalNetwork};
use crate::null_model::randomize;
use crate::params::{self, model_index, Bounds, Layout, ModelFeatures, Parameters, Priors};
use crate::sampler::*;

/// The NBDA posterior over one set of network hypotheses.
///
/// Everything derived from the inputs (seed date, candidate infection days,
/// recovery bounds) is computed once in [`NbdaModel::new`]; evaluations only
/// read it, so one model can be scored from many threads.
#[derive(Debug, Clone)]
pub struct NbdaModel {
    networks: NetworkSet,
    timeline: Arc<HealthTimeline>,
    seed_date: Day,
    time_max: Day,
    contact_days: Vec<ContactDayList>,
    recovery_bounds: Option<RecoveryBounds>,
    layout: Layout,
    priors: Priors,
}

impl NbdaModel {
    /// Fails if no seed date exists or, with diagnosis lag modeled, if some
    /// sick interval has no candidate infection day in some network.
    pub fn new(
        networks: NetworkSet,
        timeline: Arc<HealthTimeline>,
        features: ModelFeatures,
        priors: Priors,
    ) -> Result<Self> {
        let seed_date = imputation::find_seed_date(&timeline)?;
        let time_max = timeline.time_max();

        let contact_days = if features.diagnosis_lag {
            imputation::contact_days_for_set(&timeline, &networks, seed_date)?
        }
        else {
            Vec::new()
        };
        let n_lags = contact_days.first().map(|c| c.len()).unwrap_or(0);

        let recovery_bounds = if features.recovery {
            Some(imputation::recovery_bounds(&timeline, time_max))
        }
        else {
            None
        };

        let layout = Layout::select(features, n_lags);
        debug!(?layout, seed_date, time_max, n_networks = networks.len(), "built model");

        Ok(Self {
            networks, timeline, seed_date, time_max, contact_days, recovery_bounds, layout, priors,
        })
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn priors(&self) -> &Priors {
        &self.priors
    }

    pub fn networks(&self) -> &NetworkSet {
        &self.networks
    }

    pub fn timeline(&self) -> &HealthTimeline {
        &self.timeline
    }

    pub fn seed_date(&self) -> Day {
        self.seed_date
    }

    pub fn time_max(&self) -> Day {
        self.time_max
    }

    /// Candidate infection days in network `index`; empty when diagnosis lag
    /// is not modeled.
    pub fn contact_days(&self, index: usize) -> Option<&ContactDayList> {
        self.contact_days.get(index)
    }

    pub fn recovery_bounds(&self) -> Option<&RecoveryBounds> {
        self.recovery_bounds.as_ref()
    }

    /// Log-likelihood of decoded parameters. `-inf` if the model quantile
    /// selects no network or the imputation is infeasible.
    pub fn evaluate(&self, params: &Parameters) -> f64 {
        let index = match params.model() {
            Some(q) => match model_index(q, self.networks.len()) {
                Some(index) => index,
                None => return NEG_INFINITY,
            },
            None => 0,
        };
        let network = match self.networks.get(index) {
            Ok(network) => network,
            Err(_) => return NEG_INFINITY,
        };

        let lag = match params.diag_lag() {
            Some(quantiles) => match self.contact_days.get(index) {
                Some(contact_days) => Some(LagImputation { contact_days, quantiles }),
                None => return NEG_INFINITY,
            },
            None => None,
        };
        let recovery = match (params.gamma(), &self.recovery_bounds) {
            (Some(quantile), Some(bounds)) => Some(RecoveryImputation { bounds, quantile }),
            _ => None,
        };

        let (beta, alpha) = (params.beta(), params.alpha());
        if lag.is_none() && recovery.is_none() {
            let infections = imputation::reported_infections(&self.timeline);
            return hazard::log_likelihood(
                beta, alpha, &infections, &self.timeline, network, self.seed_date
            );
        }

        match imputation::impute(&self.timeline, self.seed_date, lag, recovery) {
            Imputation::Resolved(imputed) => hazard::log_likelihood(
                beta, alpha, &imputed.infections, &imputed.timeline, network, self.seed_date
            ),
            Imputation::Infeasible => NEG_INFINITY,
        }
    }
}

impl LogPosterior for NbdaModel {
    fn dimension(&self) -> usize {
        self.layout.dimension()
    }

    fn log_likelihood(&self, v: &[f64]) -> f64 {
        match self.layout.decode(v) {
            Ok(params) => self.evaluate(&params),
            Err(_) => NEG_INFINITY,
        }
    }

    fn log_prior(&self, v: &[f64]) -> f64 {
        params::log_prior(v, &self.priors, self.layout)
    }

    fn bounds(&self) -> Vec<Bounds> {
        self.layout.bounds(&self.priors)
    }
}

/// Options shared by both analysis stages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    pub diagnosis_lag: bool,
    pub recovery: bool,
    pub priors: Priors,
    pub iterations: usize,
    pub burn_in: usize,
    /// Randomized networks compared against the empirical one; no
    /// comparison stage runs if zero.
    pub null_networks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub summary: PosteriorSummary,
    pub evidence: Evidence,
    pub acceptance_fraction: f64,
    pub autocorrelation_time: Option<f64>,
    /// Cold-chain visits per network hypothesis, empirical first.
    pub model_visits: Option<Vec<usize>>,
    pub valid_start: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub estimation: StageReport,
    pub null_comparison: Option<StageReport>,
}

/// Samples `model` once and summarizes the run.
pub fn run_stage<S, R>(
    model: &NbdaModel, sampler: &mut S, settings: &AnalysisSettings, rng: &mut R
) -> Result<StageReport>
where
    S: PosteriorSampler + ?Sized,
    R: Rng + ?Sized,
{
    let layout = model.layout();
    let null_comparison = layout.features().null_comparison;
    let ladder = TemperatureLadder::for_null_comparison(null_comparison);
    let n_walkers = walker_count(layout.dimension());
    let initial = initial_positions(layout, model.priors(), ladder.len(), n_walkers, rng)?;

    let valid_start = check_initial_positions(model, &initial);
    if !valid_start {
        warn!("some starting positions are invalid");
    }

    info!(
        temperatures = ladder.len(), walkers = n_walkers,
        iterations = settings.iterations, "sampling"
    );
    let run = sampler.sample(model, &ladder, &initial, settings.iterations)?;

    let samples = flatten_with_burn(&run, settings.burn_in);
    let summary = summarize(&samples, layout.field_names());
    let evidence = log_evidence(&run, settings.burn_in);
    let acceptance_fraction = mean_acceptance_fraction(&run);
    let autocorrelation_time = max_integrated_time(&run, settings.burn_in);
    let visits = if null_comparison {
        Some(model_visits(&run, settings.burn_in, layout.dimension() - 1, model.networks().len()))
    }
    else {
        None
    };

    info!(
        log_z = evidence.log_z, error = evidence.error, acceptance_fraction,
        "stage finished"
    );
    Ok(StageReport {
        summary, evidence, acceptance_fraction, autocorrelation_time,
        model_visits: visits, valid_start,
    })
}

/// The empirical network followed by `n_null` randomized replicas.
pub fn null_network_set<R: Rng + ?Sized>(
    empirical: TemporalNetwork, n_null: usize, rng: &mut R, sink: &dyn DiagnosticSink
) -> Result<NetworkSet> {
    let mut networks = NetworkSet::new(empirical);
    for _ in 0..n_null {
        let null = randomize(networks.empirical(), rng, sink)?;
        let index = networks.push_null(null);
        debug!(index, "added null network");
    }
    Ok(networks)
}

/// Stage 1 estimates parameters on the empirical network alone. Stage 2, if
/// `settings.null_networks > 0`, adds randomized networks and a model-index
/// parameter choosing among them.
pub fn run_analysis<S, R>(
    empirical: TemporalNetwork,
    timeline: HealthTimeline,
    settings: &AnalysisSettings,
    sampler: &mut S,
    rng: &mut R,
    sink: &dyn DiagnosticSink,
) -> Result<AnalysisReport>
where
    S: PosteriorSampler + ?Sized,
    R: Rng + ?Sized,
{
    let timeline = Arc::new(timeline);
    let features = ModelFeatures {
        diagnosis_lag: settings.diagnosis_lag,
        recovery: settings.recovery,
        null_comparison: false,
    };

    info!("stage 1: parameter estimation");
    let model = NbdaModel::new(
        NetworkSet::new(empirical.clone()), timeline.clone(), features, settings.priors
    )?;
    let estimation = run_stage(&model, sampler, settings, rng)?;

    let null_comparison = if settings.null_networks > 0 {
        info!(null_networks = settings.null_networks, "stage 2: null comparison");
        let networks = null_network_set(empirical, settings.null_networks, rng, sink)?;
        let features = ModelFeatures { null_comparison: true, ..features };
        let model = NbdaModel::new(networks, timeline, features, settings.priors)?;
        Some(run_stage(&model, sampler, settings, rng)?)
    }
    else {
        None
    };

    Ok(AnalysisReport { estimation, null_comparison })
}
