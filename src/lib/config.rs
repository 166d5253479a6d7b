use serde::{Serialize, Deserialize};

use crate::errors::*;
use crate::params::{Bounds, ModelFeatures, Priors};

/// A run of the `nbda` tool, read as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Edge list CSV: `node_a,node_b,weight,timestep`.
    pub edge_path: String,
    /// Diagnosis CSV: `node_id,timestep,state`, state 0 healthy and 1 sick.
    pub health_path: String,
    /// Diagnoses of the simulated, fully observed process. Used only to
    /// report the true diagnosis-lag quantiles.
    pub true_health_path: Option<String>,

    /// Individuals to analyze; observations of other nodes are ignored.
    pub nodes: Vec<String>,

    #[serde(default)]
    pub normalize_edge_weight: bool,
    #[serde(default)]
    pub fill_gaps: bool,

    #[serde(default)]
    pub diagnosis_lag: bool,
    /// Bounds on the recovery quantile; recovery is modeled if present.
    pub recovery_prior: Option<Bounds>,
    pub priors: PriorConfig,

    /// Parameter values `[beta, alpha, (gamma)]` at which to report the
    /// log-likelihood. Lag quantiles are appended from the true health file.
    pub truth: Option<Vec<f64>>,

    #[serde(default)]
    pub null_networks: usize,
    pub rng_seed: Option<u64>,

    pub output_path: Option<String>,
    pub write_to_stdout: Option<bool>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriorConfig {
    pub beta: Bounds,
    pub alpha: Bounds,
}

impl RunConfig {
    pub fn from_json(json_data: &str) -> Result<Self> {
        let config: RunConfig = serde_json::from_str(json_data)?;
        Ok(config)
    }

    pub fn features(&self) -> ModelFeatures {
        ModelFeatures {
            diagnosis_lag: self.diagnosis_lag,
            recovery: self.recovery_prior.is_some(),
            null_comparison: false,
        }
    }

    pub fn priors(&self) -> Priors {
        Priors {
            beta: self.priors.beta,
            alpha: self.priors.alpha,
            gamma: self.recovery_prior,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn test_minimal_config() {
        let config = RunConfig::from_json(indoc!(r#"
            {
                "edge_path": "edges.csv",
                "health_path": "health.csv",
                "nodes": ["a", "b"],
                "priors": {
                    "beta": {"low": 0.0, "high": 10.0},
                    "alpha": {"low": 0.0, "high": 1.0}
                }
            }
        "#)).unwrap();

        assert_eq!(config.nodes, vec!["a", "b"]);
        assert!(!config.fill_gaps);
        assert_eq!(config.null_networks, 0);
        assert_eq!(config.features(), ModelFeatures::default());
        assert_eq!(config.priors().gamma_bounds(), Bounds::UNIT);
    }

    #[test]
    fn test_recovery_prior_enables_recovery() {
        let config = RunConfig::from_json(indoc!(r#"
            {
                "edge_path": "edges.csv",
                "health_path": "health.csv",
                "nodes": [],
                "diagnosis_lag": true,
                "recovery_prior": {"low": 0.2, "high": 0.8},
                "priors": {
                    "beta": {"low": 0.0, "high": 10.0},
                    "alpha": {"low": 0.0, "high": 1.0}
                },
                "truth": [0.5, 0.1, 0.4]
            }
        "#)).unwrap();

        let features = config.features();
        assert!(features.diagnosis_lag && features.recovery && !features.null_comparison);
        assert_eq!(config.priors().gamma, Some(Bounds::new(0.2, 0.8)));
    }

    #[test]
    fn test_invalid_json_is_reported() {
        match RunConfig::from_json("{ \"edge_path\": 3 }") {
            Err(Error::InvalidJson(e)) => assert_eq!(e.line, 1),
            other => panic!("unexpected result {:?}", other),
        }
    }
}
