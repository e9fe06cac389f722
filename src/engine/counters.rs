//! Shared execution counters, keyed by termination code, annotation code and
//! failure message.
use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Serialize;

use crate::common::interval_counters::{CountersSnapshot, IntervalCounters};

/// Thread-safe registry of rolling counters shared by every execution of one
/// engine instance. Lock poisoning is treated as "skip the update"; counters
/// are advisory and never worth failing an execution over.
#[derive(Debug, Default)]
pub struct ExecutionCounters {
    termination: Mutex<BTreeMap<String, IntervalCounters>>,
    annotate: Mutex<BTreeMap<String, IntervalCounters>>,
    errors: Mutex<BTreeMap<String, IntervalCounters>>,
}

/// Point-in-time deep copy of all counter groups.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionCountersReport {
    pub termination: BTreeMap<String, CountersSnapshot>,
    pub annotate: BTreeMap<String, CountersSnapshot>,
    pub errors: BTreeMap<String, CountersSnapshot>,
}

impl ExecutionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_termination(&self, code: &str, now: u64) {
        if let Ok(mut group) = self.termination.lock() {
            group.entry(code.to_string()).or_default().record(1.0, now);
        }
    }

    pub fn record_annotation(&self, code: &str, now: u64) {
        if let Ok(mut group) = self.annotate.lock() {
            group.entry(code.to_string()).or_default().record(1.0, now);
        }
    }

    pub fn record_error(&self, message: &str, now: u64) {
        if let Ok(mut group) = self.errors.lock() {
            group
                .entry(message.to_string())
                .or_default()
                .record(1.0, now);
        }
    }

    /// Snapshot every group, rolling stale windows over first so the report
    /// reflects the current time rather than the last write.
    pub fn report(&self, now: u64) -> ExecutionCountersReport {
        ExecutionCountersReport {
            termination: snapshot_group(&self.termination, now),
            annotate: snapshot_group(&self.annotate, now),
            errors: snapshot_group(&self.errors, now),
        }
    }
}

fn snapshot_group(
    group: &Mutex<BTreeMap<String, IntervalCounters>>,
    now: u64,
) -> BTreeMap<String, CountersSnapshot> {
    match group.lock() {
        Ok(mut group) => group
            .iter_mut()
            .map(|(key, counters)| (key.clone(), counters.snapshot(true, now)))
            .collect(),
        Err(_) => BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_grouped_by_key() {
        let counters = ExecutionCounters::new();
        let now = 1_700_000_000_000;

        counters.record_termination("SUCCESS", now);
        counters.record_termination("SUCCESS", now);
        counters.record_termination("ERROR", now);
        counters.record_annotation("risk_score", now);
        counters.record_error("script compile failed: boom", now);

        let report = counters.report(now);
        assert_eq!(report.termination["SUCCESS"].total, 2);
        assert_eq!(report.termination["ERROR"].total, 1);
        assert_eq!(report.annotate["risk_score"].total, 1);
        assert_eq!(report.errors["script compile failed: boom"].total, 1);
    }

    #[test]
    fn report_is_a_deep_copy() {
        let counters = ExecutionCounters::new();
        let now = 1_700_000_000_000;
        counters.record_termination("SUCCESS", now);

        let report = counters.report(now);
        counters.record_termination("SUCCESS", now);

        assert_eq!(report.termination["SUCCESS"].total, 1);
        assert_eq!(counters.report(now).termination["SUCCESS"].total, 2);
    }

    #[test]
    fn report_rolls_stale_windows() {
        let counters = ExecutionCounters::new();
        counters.record_termination("SUCCESS", 500);

        // Two seconds later the 1s window has rolled, the total has not.
        let report = counters.report(2_500);
        let snapshot = &report.termination["SUCCESS"];
        assert_eq!(snapshot.windows["lastS"], 0);
        assert_eq!(snapshot.total, 1);
    }
}
