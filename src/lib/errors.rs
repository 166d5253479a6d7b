use serde::{Serialize, Deserialize};
use thiserror::Error as ThisError;

use crate::health::HealthState;

pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors. Recoverable evaluation failures (out-of-bound parameters,
/// infeasible imputations) are reported as a `-inf` score instead.
#[derive(Debug, ThisError, Serialize, Deserialize)]
pub enum Error {
    #[error("invalid input path: {0}")]
    InvalidInputPath(String),

    #[error("invalid input file: {0}")]
    InvalidInputFile(String),

    #[error("failed to read input")]
    InputReadFailure,

    #[error("invalid JSON: {0:?}")]
    InvalidJson(JsonError),

    #[error("malformed record in {source_name} at line {line}: {description}")]
    MalformedRecord {
        source_name: String,
        line: u64,
        description: String,
    },

    #[error(
        "cannot pair {state:?} intervals for node {node}: \
        {n_starts} start candidates, {n_ends} end candidates ({reason})"
    )]
    IntervalPairing {
        node: String,
        state: HealthState,
        n_starts: usize,
        n_ends: usize,
        reason: String,
    },

    #[error("no sick observations: cannot determine a seed date")]
    MissingSeedDate,

    #[error("no diagnosis recorded for node {node} on infection day {day}")]
    MissingDiagnosis {
        node: String,
        day: i64,
    },

    #[error(
        "node {node} has no candidate infection days for sick interval ({start}, {end}) \
        in network {network}"
    )]
    NoContactDays {
        network: usize,
        node: String,
        start: i64,
        end: i64,
    },

    #[error("parameter vector has {actual} entries; layout expects {expected}")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
    },

    #[error("timestep {timestep} has no room for {needed} new edges ({available} free pairs)")]
    NetworkTooDense {
        timestep: i64,
        needed: usize,
        available: usize,
    },

    #[error("no network with index {0}")]
    UnknownNetwork(usize),

    #[error("invalid fraction {0}: must lie in [0, 1]")]
    InvalidFraction(f64),

    #[error("invalid prior distribution: {0}")]
    InvalidPrior(String),

    #[error("database error: {0}")]
    Database(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonError {
    pub description: String,
    pub category: String,
    pub line: usize,
    pub column: usize,
}

impl From<serde_json::error::Error> for Error {
    fn from(e: serde_json::error::Error) -> Self {
        Self::InvalidJson(JsonError {
            description: format!("{}", e),
            category: format!("{:?}", e.classify()),
            line: e.line(),
            column: e.column(),
        })
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(format!("{}", e))
    }
}
