//! Rolling multi-window event counters.
//!
//! Counts are kept for eleven fixed windows plus an unbounded total. Rollover
//! is lazy: a window resets exactly once when the current time crosses into a
//! new tick for that window's size, where the tick is `now / window_size_ms`.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Fixed window set, name to size in milliseconds.
pub const WINDOWS: [(&str, u64); 11] = [
    ("lastS", 1_000),
    ("lastM", 60_000),
    ("last10M", 600_000),
    ("last30M", 1_800_000),
    ("last1H", 3_600_000),
    ("last6H", 21_600_000),
    ("last12H", 43_200_000),
    ("last24H", 86_400_000),
    ("last7D", 604_800_000),
    ("last14D", 1_209_600_000),
    ("last30D", 2_592_000_000),
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntervalCounters {
    #[serde(default)]
    total: u64,
    #[serde(flatten)]
    counts: BTreeMap<String, u64>,
    /// Last observed tick per window; internal bookkeeping, excluded from
    /// snapshots but kept in the serialized form so restored counters do not
    /// spuriously reset.
    #[serde(rename = "_ticks", default)]
    ticks: BTreeMap<String, u64>,
}

/// Read-only view of all window counts plus the total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountersSnapshot {
    pub total: u64,
    #[serde(flatten)]
    pub windows: BTreeMap<String, u64>,
}

impl IntervalCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `amount` to every window and the total, rolling over any window
    /// whose tick changed since the last touch. Non-finite amounts count as 1.
    pub fn record(&mut self, amount: f64, now: u64) -> &mut Self {
        let amount = if amount.is_finite() { amount } else { 1.0 };
        let amount = amount.max(0.0) as u64;
        self.rollover(now);
        for (name, _) in WINDOWS {
            *self.counts.entry(name.to_string()).or_default() += amount;
        }
        self.total += amount;
        self
    }

    /// Reset every window whose tick changed since it was last touched.
    pub fn rollover(&mut self, now: u64) {
        for (name, size) in WINDOWS {
            let tick = now / size;
            if self.ticks.get(name) != Some(&tick) {
                self.counts.insert(name.to_string(), 0);
                self.ticks.insert(name.to_string(), tick);
            }
        }
    }

    /// Current view of all windows and the total. With `rollover` set, stale
    /// windows are zeroed first without recording anything.
    pub fn snapshot(&mut self, rollover: bool, now: u64) -> CountersSnapshot {
        if rollover {
            self.rollover(now);
        }
        let windows = WINDOWS
            .iter()
            .map(|(name, _)| (name.to_string(), self.count(name)))
            .collect();
        CountersSnapshot {
            total: self.total,
            windows,
        }
    }

    /// Zero all windows and the total, and clear tick bookkeeping.
    pub fn hard_reset(&mut self) {
        self.total = 0;
        self.counts.clear();
        self.ticks.clear();
    }

    pub fn count(&self, window: &str) -> u64 {
        self.counts.get(window).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}
