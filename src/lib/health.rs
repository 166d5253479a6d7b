//! Sparse diagnosis histories and the censored intervals derived from them.

use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use crate::errors::*;
use crate::network::{Day, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HealthState {
    Healthy,
    Sick,
}

impl HealthState {
    /// Diagnosis files encode healthy as 0 and sick as 1.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(HealthState::Healthy),
            1 => Some(HealthState::Sick),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            HealthState::Healthy => 0,
            HealthState::Sick => 1,
        }
    }
}

/// A single diagnosis: `node` was observed in `state` on day `timestep`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisRecord {
    pub node: NodeId,
    pub timestep: Day,
    pub state: HealthState,
}

impl DiagnosisRecord {
    pub fn new(node: &str, timestep: Day, state: HealthState) -> Self {
        Self { node: node.into(), timestep, state }
    }
}

/// Observed states of one individual, keyed by day. Days without an
/// observation are absent; absence is not the same as healthy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthRecord {
    days: BTreeMap<Day, HealthState>,
}

impl HealthRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, day: Day, state: HealthState) {
        self.days.insert(day, state);
    }

    pub fn state_on(&self, day: Day) -> Option<HealthState> {
        self.days.get(&day).copied()
    }

    /// False for unobserved days.
    pub fn is_sick_on(&self, day: Day) -> bool {
        self.state_on(day) == Some(HealthState::Sick)
    }

    pub fn mark(&mut self, days: RangeInclusive<Day>, state: HealthState) {
        for day in days {
            self.days.insert(day, state);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Day, HealthState)> + '_ {
        self.days.iter().map(|(d, s)| (*d, *s))
    }

    pub fn days_in(&self, state: HealthState) -> Vec<Day> {
        self.iter().filter(|(_, s)| *s == state).map(|(d, _)| d).collect()
    }

    pub fn last_day(&self) -> Option<Day> {
        self.days.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Every unobserved day between two observations of the same state
    /// takes that state.
    pub fn fill_gaps(&mut self) {
        let observed: Vec<(Day, HealthState)> = self.iter().collect();
        for pair in observed.windows(2) {
            let (day1, state1) = pair[0];
            let (day2, state2) = pair[1];
            if state1 == state2 && day2 > day1 + 1 {
                self.mark((day1 + 1)..=(day2 - 1), state1);
            }
        }
    }
}

/// Inclusive `(start, end)` bounds of a maximal run of one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CensoredInterval {
    pub start: Day,
    pub end: Day,
}

impl CensoredInterval {
    pub fn new(start: Day, end: Day) -> Self {
        Self { start, end }
    }

    pub fn days(&self) -> RangeInclusive<Day> {
        self.start..=self.end
    }

    pub fn contains(&self, day: Day) -> bool {
        self.start <= day && day <= self.end
    }
}

/// A set is `None` when the node was never observed in that state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeIntervals {
    pub healthy: Option<Vec<CensoredInterval>>,
    pub sick: Option<Vec<CensoredInterval>>,
}

impl NodeIntervals {
    pub fn get(&self, state: HealthState) -> Option<&Vec<CensoredInterval>> {
        match state {
            HealthState::Healthy => self.healthy.as_ref(),
            HealthState::Sick => self.sick.as_ref(),
        }
    }

    pub fn get_mut(&mut self, state: HealthState) -> Option<&mut Vec<CensoredInterval>> {
        match state {
            HealthState::Healthy => self.healthy.as_mut(),
            HealthState::Sick => self.sick.as_mut(),
        }
    }
}

/// Per-day health map plus derived intervals for every node of interest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthTimeline {
    records: BTreeMap<NodeId, HealthRecord>,
    intervals: BTreeMap<NodeId, NodeIntervals>,
}

impl HealthTimeline {
    /// Builds records for the nodes in `nodes` (observations of other nodes
    /// are ignored), derives healthy and sick intervals, and marks every day
    /// inside a sick interval as sick.
    pub fn extract(
        records: &[DiagnosisRecord], nodes: &[NodeId], fill_gaps: bool
    ) -> Result<Self> {
        let mut health: BTreeMap<NodeId, HealthRecord> = nodes.iter().map(|n| {
            (n.clone(), HealthRecord::new())
        }).collect();

        for record in records {
            if let Some(node_record) = health.get_mut(&record.node) {
                node_record.observe(record.timestep, record.state);
            }
        }

        if fill_gaps {
            for record in health.values_mut() {
                record.fill_gaps();
            }
        }

        let mut intervals = BTreeMap::new();
        for (node, record) in &health {
            intervals.insert(node.clone(), NodeIntervals {
                healthy: interval_set(node, record, HealthState::Healthy)?,
                sick: interval_set(node, record, HealthState::Sick)?,
            });
        }

        for (node, node_intervals) in &intervals {
            if let Some(sick) = &node_intervals.sick {
                if let Some(record) = health.get_mut(node) {
                    for interval in sick {
                        record.mark(interval.days(), HealthState::Sick);
                    }
                }
            }
        }

        Ok(Self { records: health, intervals })
    }

    pub fn from_parts(
        records: BTreeMap<NodeId, HealthRecord>,
        intervals: BTreeMap<NodeId, NodeIntervals>,
    ) -> Self {
        Self { records, intervals }
    }

    pub fn record(&self, node: &str) -> Option<&HealthRecord> {
        self.records.get(node)
    }

    pub fn records(&self) -> &BTreeMap<NodeId, HealthRecord> {
        &self.records
    }

    pub fn intervals(&self, node: &str) -> Option<&NodeIntervals> {
        self.intervals.get(node)
    }

    pub fn all_intervals(&self) -> &BTreeMap<NodeId, NodeIntervals> {
        &self.intervals
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(|n| n.as_str())
    }

    pub fn is_sick_on(&self, node: &str, day: Day) -> bool {
        self.records.get(node).map(|r| r.is_sick_on(day)).unwrap_or(false)
    }

    /// Latest observed day over all nodes, 0 if nothing was observed.
    pub fn time_max(&self) -> Day {
        self.records.values().filter_map(|r| r.last_day()).max().unwrap_or(0)
    }

    /// `(node, interval)` for every interval of `state`, in node order.
    pub fn intervals_in(&self, state: HealthState) -> Vec<(&str, CensoredInterval)> {
        self.intervals.iter().flat_map(|(node, ni)| {
            ni.get(state).into_iter().flatten().map(move |i| (node.as_str(), *i))
        }).collect()
    }

    pub fn sick_interval_count(&self) -> usize {
        self.intervals_in(HealthState::Sick).len()
    }
}

fn interval_set(
    node: &str, record: &HealthRecord, state: HealthState
) -> Result<Option<Vec<CensoredInterval>>> {
    if record.days_in(state).is_empty() {
        Ok(None)
    }
    else {
        let (starts, ends) = boundary_candidates(record, state);
        pair_boundaries(node, state, starts, ends).map(Some)
    }
}

/// A day observed in `state` starts a run when the previous observation (if
/// any) differs, and ends one when the next observation (if any) differs.
fn boundary_candidates(record: &HealthRecord, state: HealthState) -> (Vec<Day>, Vec<Day>) {
    let observed: Vec<(Day, HealthState)> = record.iter().collect();
    let mut starts = Vec::new();
    let mut ends = Vec::new();
    for (i, (day, s)) in observed.iter().enumerate() {
        if *s != state {
            continue;
        }
        if i == 0 || observed[i - 1].1 != state {
            starts.push(*day);
        }
        if i + 1 == observed.len() || observed[i + 1].1 != state {
            ends.push(*day);
        }
    }
    (starts, ends)
}

fn pair_boundaries(
    node: &str, state: HealthState, mut starts: Vec<Day>, mut ends: Vec<Day>
) -> Result<Vec<CensoredInterval>> {
    let n_starts = starts.len();
    let n_ends = ends.len();
    let fail = |reason: String| Error::IntervalPairing {
        node: node.into(), state, n_starts, n_ends, reason,
    };

    if n_starts != n_ends {
        return Err(fail("candidate counts differ".into()));
    }

    starts.sort();
    ends.sort();
    let intervals: Vec<CensoredInterval> = starts.into_iter().zip(ends).map(
        |(start, end)| CensoredInterval::new(start, end)
    ).collect();

    for (i, interval) in intervals.iter().enumerate() {
        if interval.start > interval.end {
            return Err(fail(format!("interval {} starts after it ends", i)));
        }
        if i > 0 && intervals[i - 1].end >= interval.start {
            return Err(fail(format!("interval {} overlaps its predecessor", i)));
        }
    }

    Ok(intervals)
}
