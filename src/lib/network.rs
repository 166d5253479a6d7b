//! Time-indexed weighted contact networks.

use serde::{Serialize, Deserialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use crate::errors::*;

pub type Day = i64;
pub type NodeId = String;

/// One contact: an undirected weighted edge present at a single timestep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub node_a: NodeId,
    pub node_b: NodeId,
    pub weight: f64,
    pub timestep: Day,
}

impl EdgeRecord {
    pub fn new(node_a: &str, node_b: &str, weight: f64, timestep: Day) -> Self {
        Self { node_a: node_a.into(), node_b: node_b.into(), weight, timestep }
    }
}

/// Undirected weighted graph for a single timestep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    adjacency: BTreeMap<NodeId, BTreeMap<NodeId, f64>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: &str) {
        if !self.adjacency.contains_key(node) {
            self.adjacency.insert(node.into(), BTreeMap::new());
        }
    }

    /// Inserts the edge, replacing the weight if it already exists.
    pub fn add_edge(&mut self, a: &str, b: &str, weight: f64) {
        self.adjacency.entry(a.into()).or_insert_with(BTreeMap::new).insert(b.into(), weight);
        self.adjacency.entry(b.into()).or_insert_with(BTreeMap::new).insert(a.into(), weight);
    }

    pub fn contains_node(&self, node: &str) -> bool {
        self.adjacency.contains_key(node)
    }

    pub fn has_edge(&self, a: &str, b: &str) -> bool {
        self.weight(a, b).is_some()
    }

    pub fn weight(&self, a: &str, b: &str) -> Option<f64> {
        self.adjacency.get(a).and_then(|nbrs| nbrs.get(b)).copied()
    }

    pub fn degree(&self, node: &str) -> usize {
        self.adjacency.get(node).map(|nbrs| nbrs.len()).unwrap_or(0)
    }

    pub fn neighbors<'a>(&'a self, node: &str) -> impl Iterator<Item = (&'a str, f64)> + 'a {
        self.adjacency.get(node).into_iter().flat_map(|nbrs| {
            nbrs.iter().map(|(n, w)| (n.as_str(), *w))
        })
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.adjacency.keys().map(|n| n.as_str())
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Each undirected edge once, as `(a, b, weight)` with `a <= b`.
    pub fn edges(&self) -> Vec<(&str, &str, f64)> {
        let mut edges = Vec::new();
        for (a, nbrs) in &self.adjacency {
            for (b, w) in nbrs {
                if a <= b {
                    edges.push((a.as_str(), b.as_str(), *w));
                }
            }
        }
        edges
    }

    pub fn edge_pairs(&self) -> BTreeSet<(&str, &str)> {
        self.edges().into_iter().map(|(a, b, _)| (a, b)).collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges().len()
    }

    pub fn weights(&self) -> Vec<f64> {
        self.edges().into_iter().map(|(_, _, w)| w).collect()
    }

    pub fn total_weight(&self) -> f64 {
        self.weights().iter().sum()
    }
}

/// Sequence of per-timestep contact graphs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemporalNetwork {
    graphs: BTreeMap<Day, Graph>,
}

impl TemporalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_graphs(graphs: BTreeMap<Day, Graph>) -> Self {
        Self { graphs }
    }

    /// Groups edge records by timestep. With `normalize`, every weight is
    /// divided by the total raw weight of its timestep; the result is then
    /// checked and any timestep not summing to one is reported.
    pub fn build(records: &[EdgeRecord], normalize: bool) -> Self {
        Self::build_with_sink(records, normalize, &TracingSink)
    }

    pub fn build_with_sink(
        records: &[EdgeRecord], normalize: bool, sink: &dyn DiagnosticSink
    ) -> Self {
        let mut total_weight: BTreeMap<Day, f64> = BTreeMap::new();
        if normalize {
            for record in records {
                *total_weight.entry(record.timestep).or_insert(0.0) += record.weight;
            }
        }

        let mut graphs: BTreeMap<Day, Graph> = BTreeMap::new();
        for record in records {
            let weight = if normalize {
                record.weight / total_weight[&record.timestep]
            }
            else {
                record.weight
            };
            graphs.entry(record.timestep).or_insert_with(Graph::new).add_edge(
                &record.node_a, &record.node_b, weight
            );
        }

        let network = Self { graphs };
        if normalize {
            network.check_edge_weights(sink);
        }
        network
    }

    /// Reports timesteps whose total weight, rounded to one decimal, is not 1.
    /// Returns whether all timesteps passed.
    pub fn check_edge_weights(&self, sink: &dyn DiagnosticSink) -> bool {
        let bad: Vec<Day> = self.graphs.iter().filter(|(_, g)| {
            (g.total_weight() * 10.0).round() / 10.0 != 1.0
        }).map(|(t, _)| *t).collect();

        if bad.is_empty() {
            true
        }
        else {
            sink.report(Diagnostic::UnnormalizedWeights { timesteps: bad });
            false
        }
    }

    pub fn graph(&self, t: Day) -> Option<&Graph> {
        self.graphs.get(&t)
    }

    pub fn graphs(&self) -> impl Iterator<Item = (Day, &Graph)> {
        self.graphs.iter().map(|(t, g)| (*t, g))
    }

    pub fn timesteps(&self) -> impl Iterator<Item = Day> + '_ {
        self.graphs.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    /// Zero when the node has no contacts at `t` or `t` is not a timestep.
    pub fn degree(&self, node: &str, t: Day) -> usize {
        self.graphs.get(&t).map(|g| g.degree(node)).unwrap_or(0)
    }

    pub fn neighbors_with_weight(&self, node: &str, t: Day) -> Vec<(&str, f64)> {
        self.graphs.get(&t).map(|g| g.neighbors(node).collect()).unwrap_or_default()
    }

    pub fn nodes_at(&self, t: Day) -> Vec<&str> {
        self.graphs.get(&t).map(|g| g.nodes().collect()).unwrap_or_default()
    }

    pub fn edge_count(&self, t: Day) -> usize {
        self.graphs.get(&t).map(|g| g.edge_count()).unwrap_or(0)
    }

    pub fn total_weight(&self, t: Day) -> f64 {
        self.graphs.get(&t).map(|g| g.total_weight()).unwrap_or(0.0)
    }

    /// Every edge weight over all timesteps, sorted ascending.
    pub fn sorted_weights(&self) -> Vec<f64> {
        let mut weights: Vec<f64> = self.graphs.values().flat_map(|g| g.weights()).collect();
        weights.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        weights
    }

    pub fn to_edge_records(&self) -> Vec<EdgeRecord> {
        self.graphs.iter().flat_map(|(t, g)| {
            g.edges().into_iter().map(move |(a, b, w)| EdgeRecord::new(a, b, w, *t))
        }).collect()
    }
}

/// The empirical network (index 0) followed by null hypotheses.
#[derive(Debug, Clone, Default)]
pub struct NetworkSet {
    networks: Vec<TemporalNetwork>,
}

impl NetworkSet {
    pub fn new(empirical: TemporalNetwork) -> Self {
        Self { networks: vec![empirical] }
    }

    pub fn push_null(&mut self, network: TemporalNetwork) -> usize {
        self.networks.push(network);
        self.networks.len() - 1
    }

    pub fn empirical(&self) -> &TemporalNetwork {
        &self.networks[0]
    }

    pub fn get(&self, index: usize) -> Result<&TemporalNetwork> {
        self.networks.get(index).ok_or(Error::UnknownNetwork(index))
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TemporalNetwork> {
        self.networks.iter()
    }

    /// Only the empirical network, for runs without null comparison.
    pub fn empirical_only(&self) -> Self {
        Self::new(self.empirical().clone())
    }
}
