//! Resolves censored sick intervals to exact infection and recovery days.
//!
//! A sick interval only says that the individual was first *reported* sick on
//! its start day. With diagnosis lag modeled, the true infection day is one of
//! the days since the last healthy report on which the individual had contact
//! the day before; a parameter in `(0, 1]` picks one through the discrete
//! uniform quantile function. With recovery modeled, a second quantile picks
//! the recovery day between the infection day and the next healthy report.
//!
//! Imputation never mutates the input timeline: every call works on its own
//! copy, so concurrent likelihood evaluations stay independent.

use std::collections::BTreeMap;

use crate::errors::*;
use crate::health::{CensoredInterval, DiagnosisRecord, HealthState, HealthTimeline};
use crate::network::{Day, NetworkSet, NodeId, TemporalNetwork};

/// Identifies one reported sick interval of one node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntervalKey {
    pub node: NodeId,
    pub interval: CensoredInterval,
}

impl IntervalKey {
    pub fn new(node: &str, interval: CensoredInterval) -> Self {
        Self { node: node.into(), interval }
    }
}

/// Candidate infection days per sick interval, ordered by key. The i-th
/// diagnosis-lag parameter belongs to the i-th key.
pub type ContactDayList = BTreeMap<IntervalKey, Vec<Day>>;

/// Latest admissible recovery day per sick interval.
pub type RecoveryBounds = BTreeMap<IntervalKey, Day>;

/// Earliest reported infection over all nodes.
pub fn find_seed_date(timeline: &HealthTimeline) -> Result<Day> {
    timeline.intervals_in(HealthState::Sick).iter().map(|(_, i)| i.start).min().ok_or(
        Error::MissingSeedDate
    )
}

/// Candidate infection days for every sick interval not starting on the seed
/// date: days after the latest preceding healthy interval (or from day 0)
/// through the reported start, on which the node had contacts the day before.
pub fn contact_days(
    timeline: &HealthTimeline, network: &TemporalNetwork, network_index: usize, seed_date: Day
) -> Result<ContactDayList> {
    let mut lists = ContactDayList::new();
    for (node, interval) in timeline.intervals_in(HealthState::Sick) {
        if interval.start == seed_date {
            continue;
        }

        let day_start = timeline.intervals(node)
            .and_then(|ni| ni.healthy.as_ref())
            .and_then(|healthy| {
                healthy.iter().filter(|h| h.end < interval.start).map(|h| h.end).max()
            })
            .map(|end| end + 1)
            .unwrap_or(0);

        let days: Vec<Day> = (day_start..=interval.start).filter(|day| {
            network.degree(node, day - 1) > 0
        }).collect();

        if days.is_empty() {
            return Err(Error::NoContactDays {
                network: network_index,
                node: node.into(),
                start: interval.start,
                end: interval.end,
            });
        }
        lists.insert(IntervalKey::new(node, interval), days);
    }
    Ok(lists)
}

/// One [`ContactDayList`] per network of the set, in the same order.
pub fn contact_days_for_set(
    timeline: &HealthTimeline, networks: &NetworkSet, seed_date: Day
) -> Result<Vec<ContactDayList>> {
    networks.iter().enumerate().map(|(i, network)| {
        contact_days(timeline, network, i, seed_date)
    }).collect()
}

/// Recovery must happen by the start of the first healthy interval after the
/// sick interval, or by `time_max` if the node is never reported healthy again.
pub fn recovery_bounds(timeline: &HealthTimeline, time_max: Day) -> RecoveryBounds {
    let mut bounds = RecoveryBounds::new();
    for (node, interval) in timeline.intervals_in(HealthState::Sick) {
        let next_healthy = timeline.intervals(node)
            .and_then(|ni| ni.healthy.as_ref())
            .and_then(|healthy| {
                healthy.iter().filter(|h| h.start > interval.end).map(|h| h.start).min()
            });
        bounds.insert(IntervalKey::new(node, interval), next_healthy.unwrap_or(time_max));
    }
    bounds
}

/// Index selected by quantile `q` from a discrete uniform over `0..n`: the
/// smallest `k` with `(k + 1) / n >= q`. `None` unless `0 < q <= 1` and `n > 0`.
pub fn discrete_uniform_quantile(q: f64, n: usize) -> Option<usize> {
    if n == 0 || !(q > 0.0 && q <= 1.0) {
        return None;
    }
    let cdf = |k: usize| (k + 1) as f64 / n as f64;
    let mut k = ((q * n as f64).ceil() as usize).max(1).min(n) - 1;
    // `q * n` can land one ulp off an integer; settle against the CDF itself.
    while k > 0 && cdf(k - 1) >= q {
        k -= 1;
    }
    while k + 1 < n && cdf(k) < q {
        k += 1;
    }
    Some(k)
}

/// `lo + q * (hi - lo)`.
pub fn continuous_uniform_quantile(q: f64, lo: f64, hi: f64) -> f64 {
    lo + q * (hi - lo)
}

/// Diagnosis-lag parameters paired with the candidate lists they index.
#[derive(Debug, Clone, Copy)]
pub struct LagImputation<'a> {
    pub contact_days: &'a ContactDayList,
    pub quantiles: &'a [f64],
}

/// Recovery quantile with the bounds it is scaled to.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryImputation<'a> {
    pub bounds: &'a RecoveryBounds,
    pub quantile: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Infection {
    pub node: NodeId,
    pub day: Day,
}

/// A private copy of the timeline with sick intervals resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ImputedTimeline {
    pub infections: Vec<Infection>,
    pub timeline: HealthTimeline,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Imputation {
    Resolved(ImputedTimeline),
    /// The parameters select no valid infection or recovery day.
    Infeasible,
}

/// Reported sick-interval starts taken as infection days, without copying
/// the timeline.
pub fn reported_infections(timeline: &HealthTimeline) -> Vec<Infection> {
    timeline.intervals_in(HealthState::Sick).into_iter().map(|(node, interval)| {
        Infection { node: node.into(), day: interval.start }
    }).collect()
}

/// Resolves every sick interval not starting on `seed_date`. Without lag
/// imputation the reported start is the infection day; without recovery
/// imputation the reported end is the recovery day.
pub fn impute(
    timeline: &HealthTimeline,
    seed_date: Day,
    lag: Option<LagImputation>,
    recovery: Option<RecoveryImputation>,
) -> Imputation {
    let mut infection_days: BTreeMap<&IntervalKey, Day> = BTreeMap::new();
    if let Some(lag) = lag {
        if lag.quantiles.len() != lag.contact_days.len() {
            return Imputation::Infeasible;
        }
        for ((key, days), q) in lag.contact_days.iter().zip(lag.quantiles) {
            match discrete_uniform_quantile(*q, days.len()) {
                Some(index) => {
                    infection_days.insert(key, days[index]);
                },
                None => {
                    return Imputation::Infeasible;
                }
            }
        }
    }

    if let Some(recovery) = recovery {
        if !(recovery.quantile >= 0.0 && recovery.quantile <= 1.0) {
            return Imputation::Infeasible;
        }
    }

    let mut records = timeline.records().clone();
    let mut intervals = timeline.all_intervals().clone();
    let mut infections = Vec::new();

    for (node, interval) in timeline.intervals_in(HealthState::Sick) {
        if interval.start == seed_date {
            infections.push(Infection { node: node.into(), day: interval.start });
            continue;
        }

        let key = IntervalKey::new(node, interval);
        let infection_day = infection_days.get(&key).copied().unwrap_or(interval.start);

        let recovery_day = if let Some(recovery) = recovery {
            let bound = match recovery.bounds.get(&key) {
                Some(bound) => *bound,
                None => return Imputation::Infeasible,
            };
            let day = continuous_uniform_quantile(
                recovery.quantile, infection_day as f64, bound as f64
            ).floor() as Day;
            if day <= interval.end {
                return Imputation::Infeasible;
            }
            day
        }
        else {
            interval.end
        };

        let resolved = CensoredInterval::new(infection_day, recovery_day);
        if let Some(sick) = intervals.get_mut(node).and_then(|ni| ni.get_mut(HealthState::Sick)) {
            for i in sick.iter_mut().filter(|i| **i == interval) {
                *i = resolved;
            }
        }
        if let Some(record) = records.get_mut(node) {
            record.mark(resolved.days(), HealthState::Sick);
        }
        infections.push(Infection { node: node.into(), day: infection_day });
    }

    Imputation::Resolved(ImputedTimeline {
        infections,
        timeline: HealthTimeline::from_parts(records, intervals),
    })
}

/// For simulated data with known infection days: the quantile that would
/// select the true day from each candidate list, i.e. the discrete uniform
/// CDF at its rank. The last sick record of a node in `true_records` is its
/// true infection day.
pub fn diagnosis_lag_truth(
    contact_days: &ContactDayList, true_records: &[DiagnosisRecord]
) -> Result<Vec<f64>> {
    let mut true_infection: BTreeMap<&str, Day> = BTreeMap::new();
    for record in true_records {
        if record.state == HealthState::Sick {
            true_infection.insert(&record.node, record.timestep);
        }
    }

    contact_days.iter().map(|(key, days)| {
        let missing = || Error::MissingDiagnosis {
            node: key.node.clone(),
            day: key.interval.start,
        };
        let day = true_infection.get(key.node.as_str()).ok_or_else(missing)?;
        let rank = days.iter().position(|d| d == day).ok_or_else(missing)?;
        Ok((rank + 1) as f64 / days.len() as f64)
    }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthState::*;
    use crate::network::EdgeRecord;

    fn timeline(records: &[DiagnosisRecord]) -> HealthTimeline {
        let nodes = vec![String::from("a"), String::from("b"), String::from("c")];
        HealthTimeline::extract(records, &nodes, false).unwrap()
    }

    fn network() -> TemporalNetwork {
        let records: Vec<EdgeRecord> = (0..10).map(|t| {
            if t % 2 == 0 {
                EdgeRecord::new("a", "b", 1.0, t)
            }
            else {
                EdgeRecord::new("b", "c", 1.0, t)
            }
        }).collect();
        TemporalNetwork::build(&records, true)
    }

    fn sample_timeline() -> HealthTimeline {
        timeline(&[
            DiagnosisRecord::new("a", 1, Sick),
            DiagnosisRecord::new("b", 0, Healthy),
            DiagnosisRecord::new("b", 2, Healthy),
            DiagnosisRecord::new("b", 7, Sick),
            DiagnosisRecord::new("b", 8, Sick),
            DiagnosisRecord::new("b", 9, Healthy),
            DiagnosisRecord::new("c", 3, Healthy),
        ])
    }

    #[test]
    fn test_seed_date() {
        assert_eq!(find_seed_date(&sample_timeline()).unwrap(), 1);
        assert!(matches!(
            find_seed_date(&timeline(&[DiagnosisRecord::new("a", 1, Healthy)])),
            Err(Error::MissingSeedDate)
        ));
    }

    #[test]
    fn test_contact_days_follow_previous_day_degree() {
        let lists = contact_days(&sample_timeline(), &network(), 0, 1).unwrap();
        assert_eq!(lists.len(), 1);
        let key = IntervalKey::new("b", CensoredInterval::new(7, 8));
        // b has contacts every day, so every day from 3 through 7 qualifies
        assert_eq!(lists[&key], vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_contact_days_empty_is_an_error() {
        let t = timeline(&[
            DiagnosisRecord::new("a", 1, Sick),
            DiagnosisRecord::new("c", 4, Healthy),
            DiagnosisRecord::new("c", 6, Sick),
        ]);
        // c only has contacts on odd days, and only day 6 (contact on day 5) qualifies
        let lists = contact_days(&t, &network(), 0, 1).unwrap();
        assert_eq!(lists[&IntervalKey::new("c", CensoredInterval::new(6, 6))], vec![6]);

        let sparse = TemporalNetwork::build(&[EdgeRecord::new("a", "b", 1.0, 0)], false);
        assert!(matches!(
            contact_days(&t, &sparse, 2, 1),
            Err(Error::NoContactDays { network: 2, start: 6, .. })
        ));
    }

    #[test]
    fn test_recovery_bounds() {
        let bounds = recovery_bounds(&sample_timeline(), 20);
        assert_eq!(bounds[&IntervalKey::new("b", CensoredInterval::new(7, 8))], 9);
        assert_eq!(bounds[&IntervalKey::new("a", CensoredInterval::new(1, 1))], 20);
    }

    #[test]
    fn test_discrete_quantile() {
        assert_eq!(discrete_uniform_quantile(1.0, 5), Some(4));
        assert_eq!(discrete_uniform_quantile(0.2, 5), Some(0));
        assert_eq!(discrete_uniform_quantile(0.21, 5), Some(1));
        assert_eq!(discrete_uniform_quantile(1e-6, 5), Some(0));
        assert_eq!(discrete_uniform_quantile(0.0, 5), None);
        assert_eq!(discrete_uniform_quantile(1.5, 5), None);
        assert_eq!(discrete_uniform_quantile(f64::NAN, 5), None);
        assert_eq!(discrete_uniform_quantile(0.5, 0), None);
    }

    #[test]
    fn test_discrete_quantile_inverts_exact_cdf_values() {
        assert_eq!(discrete_uniform_quantile(7.0 / 25.0, 25), Some(6));
        for n in 1..200 {
            for k in 1..=n {
                let q = k as f64 / n as f64;
                assert_eq!(discrete_uniform_quantile(q, n), Some(k - 1), "k = {}, n = {}", k, n);
            }
        }
    }

    #[test]
    fn test_lag_truth_selects_true_day() {
        let days: Vec<Day> = (0..25).collect();
        let mut lists = ContactDayList::new();
        lists.insert(IntervalKey::new("b", CensoredInterval::new(30, 31)), days.clone());
        let truth = diagnosis_lag_truth(&lists, &[DiagnosisRecord::new("b", 6, Sick)]).unwrap();
        assert_eq!(truth, vec![7.0 / 25.0]);
        assert_eq!(discrete_uniform_quantile(truth[0], days.len()).map(|i| days[i]), Some(6));
    }

    #[test]
    fn test_impute_lag_and_recovery() {
        let t = sample_timeline();
        let lists = contact_days(&t, &network(), 0, 1).unwrap();
        let bounds = recovery_bounds(&t, 20);
        let quantiles = [0.4];

        let imputed = match impute(
            &t, 1,
            Some(LagImputation { contact_days: &lists, quantiles: &quantiles }),
            Some(RecoveryImputation { bounds: &bounds, quantile: 1.0 }),
        ) {
            Imputation::Resolved(imputed) => imputed,
            Imputation::Infeasible => panic!("expected a feasible imputation"),
        };

        assert_eq!(imputed.infections, vec![
            Infection { node: "a".into(), day: 1 },
            Infection { node: "b".into(), day: 4 },
        ]);
        assert_eq!(reported_infections(&t), vec![
            Infection { node: "a".into(), day: 1 },
            Infection { node: "b".into(), day: 7 },
        ]);
        let b = imputed.timeline.intervals("b").unwrap();
        assert_eq!(b.sick, Some(vec![CensoredInterval::new(4, 9)]));
        for day in 4..=9 {
            assert!(imputed.timeline.is_sick_on("b", day));
        }

        // The input timeline is untouched
        assert!(!t.is_sick_on("b", 4));
        assert_eq!(t.intervals("b").unwrap().sick, Some(vec![CensoredInterval::new(7, 8)]));
    }

    #[test]
    fn test_recovery_before_reported_end_is_infeasible() {
        let t = sample_timeline();
        let bounds = recovery_bounds(&t, 20);
        // infection day 7, bound 9: quantile 0.5 gives day 8, which is the reported end
        let result = impute(&t, 1, None, Some(RecoveryImputation { bounds: &bounds, quantile: 0.5 }));
        assert_eq!(result, Imputation::Infeasible);
    }

    #[test]
    fn test_out_of_range_lag_is_infeasible() {
        let t = sample_timeline();
        let lists = contact_days(&t, &network(), 0, 1).unwrap();
        let quantiles = [0.0];
        let result = impute(
            &t, 1, Some(LagImputation { contact_days: &lists, quantiles: &quantiles }), None
        );
        assert_eq!(result, Imputation::Infeasible);
    }

    #[test]
    fn test_lag_truth() {
        let t = sample_timeline();
        let lists = contact_days(&t, &network(), 0, 1).unwrap();
        let truth = diagnosis_lag_truth(&lists, &[
            DiagnosisRecord::new("a", 1, Sick),
            DiagnosisRecord::new("b", 5, Sick),
        ]).unwrap();
        assert_eq!(truth, vec![3.0 / 5.0]);

        assert!(matches!(
            diagnosis_lag_truth(&lists, &[DiagnosisRecord::new("b", 1, Sick)]),
            Err(Error::MissingDiagnosis { .. })
        ));
    }
}
