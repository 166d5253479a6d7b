//! Discrete-time transmission hazard and its log-likelihood.
//!
//! On each day a healthy individual is infected with probability
//! `1 - exp(-(beta * pressure + alpha))`, where the pressure is the summed
//! weight of its contacts that were sick the day before. `beta` scales
//! network-mediated transmission, `alpha` is the background risk.

use std::f64::NEG_INFINITY;

use crate::health::{HealthState, HealthTimeline};
use crate::imputation::Infection;
use crate::network::{Day, TemporalNetwork};

/// Summed edge weight from `node` to neighbors sick on `day`.
pub fn infected_pressure(
    node: &str, day: Day, health: &HealthTimeline, network: &TemporalNetwork
) -> f64 {
    network.neighbors_with_weight(node, day).iter().filter(|(neighbor, _)| {
        health.is_sick_on(neighbor, day)
    }).map(|(_, w)| *w).sum()
}

/// Not clamped: parameters outside their bounds give values outside `[0, 1]`,
/// whose logarithm is NaN and rejects the evaluation.
pub fn daily_infection_prob(beta: f64, alpha: f64, pressure: f64) -> f64 {
    1.0 - (-(beta * pressure + alpha)).exp()
}

/// Pressure on `node` on the day before `day`, the exposure that can cause
/// an infection first counted on `day`.
fn prob_on(
    beta: f64, alpha: f64, node: &str, day: Day,
    health: &HealthTimeline, network: &TemporalNetwork,
) -> f64 {
    daily_infection_prob(beta, alpha, infected_pressure(node, day - 1, health, network))
}

/// Learning events (every infection not on `seed_date`) contribute `ln p`;
/// every day of every healthy interval contributes `ln(1 - p)`. Returns
/// exactly `-inf` if any term is `-inf` or NaN.
pub fn log_likelihood(
    beta: f64,
    alpha: f64,
    infections: &[Infection],
    health: &HealthTimeline,
    network: &TemporalNetwork,
    seed_date: Day,
) -> f64 {
    let mut learn = 0.0;
    for infection in infections.iter().filter(|i| i.day != seed_date) {
        learn += prob_on(beta, alpha, &infection.node, infection.day, health, network).ln();
    }

    let mut not_learn = 0.0;
    for (node, interval) in health.intervals_in(HealthState::Healthy) {
        for day in interval.days() {
            not_learn += (1.0 - prob_on(beta, alpha, node, day, health, network)).ln();
        }
    }

    let total = learn + not_learn;
    if total.is_nan() || total == NEG_INFINITY {
        NEG_INFINITY
    }
    else {
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::DiagnosisRecord;
    use crate::health::HealthState::*;
    use crate::network::EdgeRecord;

    fn two_node_setup() -> (TemporalNetwork, HealthTimeline) {
        let network = TemporalNetwork::build(&[
            EdgeRecord::new("a", "b", 1.0, 0),
            EdgeRecord::new("a", "b", 1.0, 1),
            EdgeRecord::new("a", "b", 1.0, 2),
        ], false);
        let timeline = HealthTimeline::extract(&[
            DiagnosisRecord::new("a", 0, Healthy),
            DiagnosisRecord::new("a", 1, Sick),
            DiagnosisRecord::new("b", 0, Healthy),
            DiagnosisRecord::new("b", 2, Healthy),
        ], &[String::from("a"), String::from("b")], true).unwrap();
        (network, timeline)
    }

    #[test]
    fn test_pressure_counts_only_sick_neighbors() {
        let (network, timeline) = two_node_setup();
        assert_eq!(infected_pressure("b", 0, &timeline, &network), 0.0);
        assert_eq!(infected_pressure("b", 1, &timeline, &network), 1.0);
        assert_eq!(infected_pressure("a", 1, &timeline, &network), 0.0);
        assert_eq!(infected_pressure("b", 5, &timeline, &network), 0.0);
    }

    #[test]
    fn test_daily_probability() {
        assert_eq!(daily_infection_prob(0.5, 0.0, 0.0), 0.0);
        assert!((daily_infection_prob(0.5, 0.1, 2.0) - (1.0 - (-1.1f64).exp())).abs() < 1e-12);
        assert!(daily_infection_prob(-1.0, 0.0, 1.0) < 0.0);
    }

    #[test]
    fn test_log_likelihood_terms() {
        let (network, timeline) = two_node_setup();
        let infections = vec![Infection { node: "a".into(), day: 1 }];
        let (beta, alpha) = (0.5, 0.1);

        // a infected on day 1 with no sick contacts on day 0;
        // a healthy on day 0; b healthy on days 0..=2 with a sick on day 1
        let expected = daily_infection_prob(beta, alpha, 0.0).ln()
            + (-alpha)
            + (-alpha) + (-alpha) + (-(beta + alpha));
        let ll = log_likelihood(beta, alpha, &infections, &timeline, &network, 0);
        assert!((ll - expected).abs() < 1e-12);

        // seed-date infections are not learning events
        let ll = log_likelihood(beta, alpha, &infections, &timeline, &network, 1);
        assert!((ll - (-4.0 * alpha - beta)).abs() < 1e-12);
    }

    #[test]
    fn test_zero_probability_is_negative_infinity() {
        let (network, timeline) = two_node_setup();
        let infections = vec![Infection { node: "a".into(), day: 1 }];
        let ll = log_likelihood(0.5, 0.0, &infections, &timeline, &network, 0);
        assert_eq!(ll, NEG_INFINITY);

        // negative background risk makes p < 0 and its logarithm NaN
        let ll = log_likelihood(0.5, -0.1, &infections, &timeline, &network, 0);
        assert_eq!(ll, NEG_INFINITY);
    }
}
