use std::collections::BTreeMap;

use serde::Serialize;

/// Deterministic counters for aggregation cycles.
///
/// Everything is keyed by `CycleCounter` and stored in sorted maps so snapshots
/// have a stable order; nothing here reads the wall clock.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleMetrics {
    counters: BTreeMap<CycleCounter, u64>,
    merged_entities: Histogram,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CycleCounter {
    Started,
    Delivered,
    Failed,
    DiscardedStale,
    /// Superseded while still running.
    Cancelled,
    SecondaryFailures,
    JoinTimeouts,
}

impl CycleCounter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "cycles_started",
            Self::Delivered => "cycles_delivered",
            Self::Failed => "cycles_failed",
            Self::DiscardedStale => "cycles_discarded_stale",
            Self::Cancelled => "cycles_cancelled",
            Self::SecondaryFailures => "secondary_failures",
            Self::JoinTimeouts => "join_timeouts",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Histogram {
    pub count: u64,
    pub sum: u64,
    pub min: u64,
    pub max: u64,
}

impl Histogram {
    pub fn record(&mut self, value: u64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum = self.sum.saturating_add(value);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleMetricsSnapshot {
    pub counters: Vec<(&'static str, u64)>,
    pub merged_entities: Histogram,
}

impl CycleMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, counter: CycleCounter) -> u64 {
        self.counters.get(&counter).copied().unwrap_or(0)
    }

    pub fn inc(&mut self, counter: CycleCounter) {
        self.add(counter, 1);
    }

    pub fn add(&mut self, counter: CycleCounter, by: u64) {
        *self.counters.entry(counter).or_insert(0) += by;
    }

    pub fn record_merged(&mut self, entities: usize) {
        self.merged_entities.record(entities as u64);
    }

    pub fn merged_entities(&self) -> Histogram {
        self.merged_entities
    }

    pub fn snapshot(&self) -> CycleMetricsSnapshot {
        CycleMetricsSnapshot {
            counters: self.counters.iter().map(|(k, v)| (k.as_str(), *v)).collect(),
            merged_entities: self.merged_entities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CycleCounter, CycleMetrics, Histogram};

    #[test]
    fn counters_accumulate() {
        let mut m = CycleMetrics::new();
        m.inc(CycleCounter::Started);
        m.add(CycleCounter::Started, 2);
        assert_eq!(m.get(CycleCounter::Started), 3);
        assert_eq!(m.get(CycleCounter::Failed), 0);
    }

    #[test]
    fn histogram_tracks_min_max_sum_count() {
        let mut h = Histogram::default();
        h.record(5);
        h.record(2);
        h.record(7);
        assert_eq!(h.count, 3);
        assert_eq!(h.sum, 14);
        assert_eq!(h.min, 2);
        assert_eq!(h.max, 7);
    }

    #[test]
    fn snapshot_is_stably_ordered() {
        let mut m = CycleMetrics::new();
        m.inc(CycleCounter::JoinTimeouts);
        m.inc(CycleCounter::Started);
        m.inc(CycleCounter::Delivered);
        m.record_merged(4);

        let snap = m.snapshot();
        assert_eq!(
            snap.counters,
            vec![
                ("cycles_started", 1),
                ("cycles_delivered", 1),
                ("join_timeouts", 1)
            ]
        );
        assert_eq!(snap.merged_entities.count, 1);
    }
}
