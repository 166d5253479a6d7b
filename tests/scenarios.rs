use nbdatools::analysis::NbdaModel;
use nbdatools::health::{DiagnosisRecord, HealthState::*, HealthTimeline};
use nbdatools::imputation::{self, Imputation, Infection, LagImputation};
use nbdatools::network::{EdgeRecord, NetworkSet, TemporalNetwork};
use nbdatools::params::{Bounds, ModelFeatures, Priors};
use nbdatools::sampler::LogPosterior;
use nbdatools::util::{read_diagnosis_records, read_edge_records};

use proptest::prelude::*;
use rand::seq::SliceRandom;
use rand_xoshiro::Xoshiro256PlusPlus;
use rand_xoshiro::rand_core::SeedableRng;
use std::f64::NEG_INFINITY;
use std::sync::Arc;

fn nodes(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn priors() -> Priors {
    Priors { beta: Bounds::new(0.0, 10.0), alpha: Bounds::new(0.0, 1.0), gamma: None }
}

fn model(
    edges: &[EdgeRecord], diagnoses: &[DiagnosisRecord], names: &[&str], features: ModelFeatures
) -> NbdaModel {
    let network = TemporalNetwork::build(edges, false);
    let timeline = HealthTimeline::extract(diagnoses, &nodes(names), true).unwrap();
    NbdaModel::new(NetworkSet::new(network), Arc::new(timeline), features, priors()).unwrap()
}

#[test]
fn two_nodes_with_seed_infection_only() {
    let edges = read_edge_records(
        "node_a,node_b,weight,timestep\na,b,1,0\na,b,1,1\na,b,1,2\n".as_bytes(), "edges"
    ).unwrap();
    let diagnoses = read_diagnosis_records(
        "node_id,timestep,state\na,2,1\nb,0,0\nb,1,0\nb,2,0\n".as_bytes(), "health"
    ).unwrap();
    let m = model(&edges, &diagnoses, &["a", "b"], ModelFeatures::default());

    assert_eq!(m.seed_date(), 2);
    let expected = 3.0 * (1.0 - (1.0 - (-0.1f64).exp())).ln();
    let ll = m.log_likelihood(&[0.5, 0.1]);
    assert!((ll - expected).abs() < 1e-12);
    assert!((ll - (-0.3)).abs() < 1e-12);
}

fn single_contact_day_setup() -> (Vec<EdgeRecord>, Vec<DiagnosisRecord>) {
    let edges = vec![
        EdgeRecord::new("a", "b", 1.0, 3),
        EdgeRecord::new("a", "c", 1.0, 0),
    ];
    let diagnoses = vec![
        DiagnosisRecord::new("a", 0, Sick),
        DiagnosisRecord::new("b", 0, Healthy),
        DiagnosisRecord::new("b", 5, Sick),
        DiagnosisRecord::new("c", 0, Healthy),
    ];
    (edges, diagnoses)
}

#[test]
fn single_contact_day_is_the_only_candidate() {
    let (edges, diagnoses) = single_contact_day_setup();
    let features = ModelFeatures { diagnosis_lag: true, ..ModelFeatures::default() };
    let m = model(&edges, &diagnoses, &["a", "b", "c"], features);

    let contact_days = m.contact_days(0).unwrap();
    assert_eq!(contact_days.values().cloned().collect::<Vec<_>>(), vec![vec![4]]);

    let ll = m.log_likelihood(&[0.5, 0.1, 1.0]);
    assert!(ll.is_finite());
    for q in &[1e-6, 0.01, 0.5, 0.99] {
        assert_eq!(m.log_likelihood(&[0.5, 0.1, *q]), ll);
    }
}

proptest! {
    #[test]
    fn any_lag_quantile_resolves_to_the_single_contact_day(q in 1e-12f64..=1.0) {
        let (edges, diagnoses) = single_contact_day_setup();
        let network = TemporalNetwork::build(&edges, false);
        let timeline = HealthTimeline::extract(&diagnoses, &nodes(&["a", "b", "c"]), true).unwrap();
        let contact_days = imputation::contact_days(&timeline, &network, 0, 0).unwrap();
        let quantiles = [q];
        let lag = LagImputation { contact_days: &contact_days, quantiles: &quantiles };

        match imputation::impute(&timeline, 0, Some(lag), None) {
            Imputation::Resolved(imputed) => {
                let expected = Infection { node: "b".into(), day: 4 };
                prop_assert!(imputed.infections.contains(&expected));
            },
            Imputation::Infeasible => prop_assert!(false, "quantile {} was infeasible", q),
        }
    }
}

#[test]
fn alpha_prior_bound() {
    let edges = vec![EdgeRecord::new("a", "b", 1.0, 0)];
    let diagnoses = vec![DiagnosisRecord::new("a", 0, Sick), DiagnosisRecord::new("b", 0, Healthy)];
    for low in &[0.0, 0.05] {
        let network = TemporalNetwork::build(&edges, false);
        let timeline = HealthTimeline::extract(&diagnoses, &nodes(&["a", "b"]), true).unwrap();
        let priors = Priors { alpha: Bounds::new(*low, 1.0), ..priors() };
        let m = NbdaModel::new(
            NetworkSet::new(network), Arc::new(timeline), ModelFeatures::default(), priors
        ).unwrap();

        assert!(m.log_prior(&[0.5, *low]).is_finite());
        assert_eq!(m.log_prior(&[0.5, *low - 1e-9]), NEG_INFINITY);
        assert_eq!(m.log_posterior(&[0.5, *low - 1e-9]), NEG_INFINITY);
    }
}

#[test]
fn likelihood_does_not_depend_on_record_order() {
    let mut edges = Vec::new();
    for t in 0..10 {
        edges.push(EdgeRecord::new("a", "b", 0.5, t));
        edges.push(EdgeRecord::new("b", "c", 0.25, t));
        if t % 2 == 0 {
            edges.push(EdgeRecord::new("c", "d", 1.0, t));
        }
    }
    let mut diagnoses = vec![
        DiagnosisRecord::new("a", 1, Sick),
        DiagnosisRecord::new("a", 6, Healthy),
        DiagnosisRecord::new("b", 0, Healthy),
        DiagnosisRecord::new("b", 4, Sick),
        DiagnosisRecord::new("b", 8, Healthy),
        DiagnosisRecord::new("c", 0, Healthy),
        DiagnosisRecord::new("c", 7, Sick),
        DiagnosisRecord::new("d", 0, Healthy),
        DiagnosisRecord::new("d", 9, Healthy),
    ];
    let names = ["a", "b", "c", "d"];
    let features = ModelFeatures { diagnosis_lag: true, recovery: true, null_comparison: false };
    let v = [0.8, 0.05, 0.9, 0.6, 0.3];

    let reference = model(&edges, &diagnoses, &names, features);
    assert_eq!(reference.layout().dimension(), v.len());
    let expected = reference.log_likelihood(&v);
    assert!(expected.is_finite());

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(11);
    for _ in 0..5 {
        edges.shuffle(&mut rng);
        diagnoses.shuffle(&mut rng);
        let mut shuffled_names = names.to_vec();
        shuffled_names.shuffle(&mut rng);
        let m = model(&edges, &diagnoses, &shuffled_names, features);
        assert_eq!(m.log_likelihood(&v), expected);
    }
}
