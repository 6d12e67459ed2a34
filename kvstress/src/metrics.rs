//! Concurrency-safe accounting of call outcomes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use sketches_ddsketch::DDSketch;

use crate::workload::OpKind;

/// The outcome tag of a single call: either the HTTP status the server
/// answered with, or the synthetic marker for a request that never
/// completed.
///
/// Statuses order before the failure marker, which keeps breakdown listings
/// stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Outcome {
    /// The server responded with this status code.
    Status(u16),
    /// The request failed below the HTTP layer (refused, timed out, budget
    /// exhausted). The cause is logged, not part of the tag.
    Error,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Status(code) => write!(f, "{code}"),
            Outcome::Error => f.write_str("error"),
        }
    }
}

/// Shared accumulator for one phase of a run.
///
/// All workers record through a single instance. The critical section is a
/// handful of counter bumps behind one mutex, so the breakdown slot, the
/// success counter and the latency sketch always move together and no update
/// is lost under concurrency. Reporting reads a [`MetricsSnapshot`] taken
/// after the workers have joined.
#[derive(Default)]
pub struct Metrics {
    inner: Mutex<MetricsSnapshot>,
}

impl Metrics {
    /// Records one completed call under a single lock acquisition.
    pub fn record(&self, kind: OpKind, outcome: Outcome, success: bool, latency: Duration) {
        let mut inner = self.inner.lock().unwrap();
        *inner.breakdown.entry((kind, outcome)).or_default() += 1;
        if success {
            inner.success += 1;
        }
        inner.timing_mut(kind).add(latency.as_secs_f64());
    }

    /// Takes a point-in-time copy for reporting and assertions.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().unwrap().clone()
    }
}

/// Point-in-time copy of a [`Metrics`] accumulator.
#[derive(Clone, Default)]
pub struct MetricsSnapshot {
    /// Calls classified as successful.
    pub success: u64,
    /// Recorded calls per `(kind, outcome)` pair, ordered for stable
    /// reporting.
    pub breakdown: BTreeMap<(OpKind, Outcome), u64>,
    /// Latency sketch of SET calls.
    pub set_timing: DDSketch,
    /// Latency sketch of GET calls.
    pub get_timing: DDSketch,
    /// Latency sketch of DELETE calls.
    pub delete_timing: DDSketch,
}

impl MetricsSnapshot {
    /// Total recorded calls across all kinds and outcomes.
    pub fn total(&self) -> u64 {
        self.breakdown.values().sum()
    }

    /// Recorded calls of one kind.
    pub fn kind_total(&self, kind: OpKind) -> u64 {
        self.breakdown
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, count)| *count)
            .sum()
    }

    /// Count in one `(kind, outcome)` slot.
    pub fn count(&self, kind: OpKind, outcome: Outcome) -> u64 {
        self.breakdown.get(&(kind, outcome)).copied().unwrap_or(0)
    }

    /// Fraction of recorded calls that were not classified successful.
    pub fn failure_rate(&self) -> f64 {
        let total = self.total();
        match total {
            0 => 0.0,
            _ => (total - self.success) as f64 / total as f64,
        }
    }

    /// Latency sketch of one kind.
    pub fn timing(&self, kind: OpKind) -> &DDSketch {
        match kind {
            OpKind::Set => &self.set_timing,
            OpKind::Get => &self.get_timing,
            OpKind::Delete => &self.delete_timing,
        }
    }

    fn timing_mut(&mut self, kind: OpKind) -> &mut DDSketch {
        match kind {
            OpKind::Set => &mut self.set_timing,
            OpKind::Get => &mut self.get_timing,
            OpKind::Delete => &mut self.delete_timing,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn concurrent_records_are_not_lost() {
        let metrics = Arc::new(Metrics::default());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for i in 0..1000 {
                        let outcome = match i % 2 {
                            0 => Outcome::Status(200),
                            _ => Outcome::Error,
                        };
                        metrics.record(OpKind::Get, outcome, i % 2 == 0, Duration::from_micros(10));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total(), 8000);
        assert_eq!(snapshot.success, 4000);
        assert_eq!(snapshot.count(OpKind::Get, Outcome::Status(200)), 4000);
        assert_eq!(snapshot.count(OpKind::Get, Outcome::Error), 4000);
        assert_eq!(snapshot.timing(OpKind::Get).count(), 8000);
    }

    #[test]
    fn success_never_exceeds_the_breakdown_sum() {
        let metrics = Metrics::default();
        metrics.record(OpKind::Set, Outcome::Status(200), true, Duration::ZERO);
        metrics.record(OpKind::Set, Outcome::Status(500), false, Duration::ZERO);
        metrics.record(OpKind::Delete, Outcome::Status(404), true, Duration::ZERO);

        let snapshot = metrics.snapshot();
        assert!(snapshot.success <= snapshot.total());
        assert_eq!(snapshot.total(), 3);
        assert_eq!(snapshot.success, 2);
    }

    #[test]
    fn breakdown_groups_by_kind_then_outcome() {
        let metrics = Metrics::default();
        metrics.record(OpKind::Delete, Outcome::Error, false, Duration::ZERO);
        metrics.record(OpKind::Delete, Outcome::Status(404), true, Duration::ZERO);
        metrics.record(OpKind::Set, Outcome::Status(200), true, Duration::ZERO);

        let snapshot = metrics.snapshot();
        let keys: Vec<_> = snapshot.breakdown.keys().copied().collect();
        assert_eq!(
            keys,
            vec![
                (OpKind::Set, Outcome::Status(200)),
                (OpKind::Delete, Outcome::Status(404)),
                (OpKind::Delete, Outcome::Error),
            ]
        );
        assert_eq!(snapshot.kind_total(OpKind::Delete), 2);
    }
}
