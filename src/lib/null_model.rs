//! Randomized network hypotheses.
//!
//! A null network keeps what the empirical network says about *how much*
//! contact happens at each timestep (node set, edge count, weight multiset)
//! and discards *who* contacts whom. If such a network explained the
//! infections as well as the empirical one, the contact structure carries no
//! evidence about transmission.

use rand::Rng;
use std::collections::BTreeMap;
use rand::seq::SliceRandom;
use rand::seq::index;
use tracing::{debug, info};

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::errors::*;
use crate::network::{Graph, TemporalNetwork};

/// Above this mean temporal Jaccard similarity a randomized network is
/// considered too close to the empirical one.
pub const MAX_NULL_JACCARD: f64 = 0.4;

/// `|E1 ∩ E2| / |E1 ∪ E2|` over unordered node pairs; 1 when both graphs
/// have no edges.
pub fn jaccard(g1: &Graph, g2: &Graph) -> f64 {
    let e1 = g1.edge_pairs();
    let e2 = g2.edge_pairs();
    let union = e1.union(&e2).count();
    if union == 0 {
        1.0
    }
    else {
        e1.intersection(&e2).count() as f64 / union as f64
    }
}

/// Jaccard similarity averaged over the timesteps of `n1` at which either
/// network has an edge. A timestep missing from `n2` compares against an
/// empty graph. 1 when no timestep has an edge in either network.
pub fn mean_jaccard(n1: &TemporalNetwork, n2: &TemporalNetwork) -> f64 {
    let empty = Graph::new();
    let scores: Vec<f64> = n1.graphs().filter_map(|(t, g1)| {
        let g2 = n2.graph(t).unwrap_or(&empty);
        if g1.edge_pairs().is_empty() && g2.edge_pairs().is_empty() {
            None
        }
        else {
            Some(jaccard(g1, g2))
        }
    }).collect();
    if scores.is_empty() {
        return 1.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

/// Rewires every edge of every timestep to a uniformly chosen node pair that
/// is adjacent in neither the original nor the new graph, then deals out the
/// original weights in shuffled order.
pub fn randomize<R: Rng + ?Sized>(
    network: &TemporalNetwork, rng: &mut R, sink: &dyn DiagnosticSink
) -> Result<TemporalNetwork> {
    let mut graphs = BTreeMap::new();
    for (t, g1) in network.graphs() {
        let nodes: Vec<&str> = g1.nodes().collect();
        let n_edges = g1.edge_count();
        let available = n_pairs(nodes.len()).saturating_sub(n_proper_edges(g1));
        if available < n_edges {
            return Err(Error::NetworkTooDense { timestep: t, needed: n_edges, available });
        }

        let mut weights = g1.weights();
        weights.shuffle(rng);

        let mut g2 = empty_like(g1);
        while let Some(weight) = weights.pop() {
            loop {
                let (a, b) = random_pair(&nodes, rng);
                if !(g2.has_edge(a, b) || g1.has_edge(a, b)) {
                    g2.add_edge(a, b, weight);
                    break;
                }
            }
        }
        graphs.insert(t, g2);
    }
    let randomized = TemporalNetwork::from_graphs(graphs);

    let similarity = mean_jaccard(network, &randomized);
    info!(mean_jaccard = similarity, "randomized network");
    if similarity > MAX_NULL_JACCARD {
        sink.report(Diagnostic::NullResemblesEmpirical { mean_jaccard: similarity });
    }
    Ok(randomized)
}

/// Keeps a random `1 - fraction` share of each timestep's edges with their
/// weights and rewires the rest to random pairs not yet in the new graph,
/// carrying the weights of the edges they replace.
pub fn permute<R: Rng + ?Sized>(
    network: &TemporalNetwork, fraction: f64, rng: &mut R
) -> Result<TemporalNetwork> {
    check_fraction(fraction)?;

    let mut graphs = BTreeMap::new();
    for (t, g1) in network.graphs() {
        let nodes: Vec<&str> = g1.nodes().collect();
        let mut edges = g1.edges();
        let n_swaps = (fraction * edges.len() as f64).floor() as usize;
        let n_keep = edges.len() - n_swaps;
        let available = n_pairs(nodes.len()).saturating_sub(n_keep);
        if available < n_swaps {
            return Err(Error::NetworkTooDense { timestep: t, needed: n_swaps, available });
        }

        edges.shuffle(rng);
        let mut g2 = empty_like(g1);
        for (a, b, w) in &edges[..n_keep] {
            g2.add_edge(a, b, *w);
        }
        for (_, _, weight) in &edges[n_keep..] {
            loop {
                let (a, b) = random_pair(&nodes, rng);
                if !g2.has_edge(a, b) {
                    g2.add_edge(a, b, *weight);
                    break;
                }
            }
        }
        debug!(timestep = t, kept = n_keep, rewired = n_swaps, "permuted timestep");
        graphs.insert(t, g2);
    }
    Ok(TemporalNetwork::from_graphs(graphs))
}

/// Removes `fraction` of all edges, spread evenly over timesteps (each
/// timestep loses the same number of randomly chosen edges, or all of them
/// if it has fewer).
pub fn delete_edges<R: Rng + ?Sized>(
    network: &TemporalNetwork, fraction: f64, rng: &mut R
) -> Result<TemporalNetwork> {
    check_fraction(fraction)?;
    if network.is_empty() {
        return Ok(TemporalNetwork::new());
    }

    let total_edges: usize = network.graphs().map(|(_, g)| g.edge_count()).sum();
    let to_delete = (fraction * total_edges as f64).floor() as usize;
    let per_timestep = to_delete / network.len();

    let mut graphs = BTreeMap::new();
    for (t, g1) in network.graphs() {
        let mut edges = g1.edges();
        edges.shuffle(rng);
        let mut g2 = empty_like(g1);
        for (a, b, w) in edges.iter().skip(per_timestep) {
            g2.add_edge(a, b, *w);
        }
        graphs.insert(t, g2);
    }
    let thinned = TemporalNetwork::from_graphs(graphs);
    info!(
        deleted = to_delete, per_timestep, mean_jaccard = mean_jaccard(network, &thinned),
        "deleted edges"
    );
    Ok(thinned)
}

fn check_fraction(fraction: f64) -> Result<()> {
    if fraction >= 0.0 && fraction <= 1.0 {
        Ok(())
    }
    else {
        Err(Error::InvalidFraction(fraction))
    }
}

fn empty_like(g: &Graph) -> Graph {
    let mut empty = Graph::new();
    for node in g.nodes() {
        empty.add_node(node);
    }
    empty
}

fn n_pairs(n_nodes: usize) -> usize {
    n_nodes * n_nodes.saturating_sub(1) / 2
}

fn n_proper_edges(g: &Graph) -> usize {
    g.edges().iter().filter(|(a, b, _)| a != b).count()
}

/// Two distinct nodes, uniformly. Callers guarantee at least two nodes.
fn random_pair<'a, R: Rng + ?Sized>(nodes: &[&'a str], rng: &mut R) -> (&'a str, &'a str) {
    let picked = index::sample(rng, nodes.len(), 2);
    (nodes[picked.index(0)], nodes[picked.index(1)])
}
