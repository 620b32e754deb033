//! Convergence monitoring for the fit objective.

use serde::Serialize;
use std::collections::VecDeque;

/// One monitored quantity.
#[derive(Debug, Clone)]
pub struct MonitoredVariable {
    name: &'static str,
    history: VecDeque<f64>,
    capacity: usize,
}

impl MonitoredVariable {
    fn new(name: &'static str, capacity: usize) -> Self {
        Self { name, history: VecDeque::with_capacity(capacity), capacity: capacity.max(2) }
    }

    fn push(&mut self, value: f64) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(value);
    }

    /// Label
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Most recent value.
    pub fn last(&self) -> Option<f64> {
        self.history.back().copied()
    }

    /// Average change per call over the retained history.
    pub fn average_slope(&self) -> Option<f64> {
        let n = self.history.len();
        if n < 2 {
            return None;
        }
        let first = self.history.front()?;
        let last = self.history.back()?;
        Some((last - first) / (n - 1) as f64)
    }

    /// Retained values, oldest first.
    pub fn history(&self) -> impl Iterator<Item = f64> + '_ {
        self.history.iter().copied()
    }

    /// Number of retained values.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

/// Snapshot of one monitored variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonitorRow {
    /// Label
    pub name: &'static str,
    /// Most recent value
    pub last: f64,
    /// Average change per call
    pub average_slope: Option<f64>,
}

/// Total, stat and syst likelihood histories with a fixed capacity.
#[derive(Debug, Clone)]
pub struct ConvergenceMonitor {
    total: MonitoredVariable,
    stat: MonitoredVariable,
    syst: MonitoredVariable,
}

impl ConvergenceMonitor {
    /// Keep at most `capacity` values per variable.
    pub fn new(capacity: usize) -> Self {
        Self {
            total: MonitoredVariable::new("Total", capacity),
            stat: MonitoredVariable::new("Stat", capacity),
            syst: MonitoredVariable::new("Syst", capacity),
        }
    }

    /// Record one evaluation.
    pub fn record(&mut self, total: f64, stat: f64, syst: f64) {
        self.total.push(total);
        self.stat.push(stat);
        self.syst.push(syst);
    }

    /// Total likelihood
    pub fn total(&self) -> &MonitoredVariable {
        &self.total
    }

    /// Statistical term
    pub fn stat(&self) -> &MonitoredVariable {
        &self.stat
    }

    /// Penalty term
    pub fn syst(&self) -> &MonitoredVariable {
        &self.syst
    }

    /// One row per variable, empty before the first record.
    pub fn rows(&self) -> Vec<MonitorRow> {
        [&self.total, &self.stat, &self.syst]
            .into_iter()
            .filter_map(|v| {
                Some(MonitorRow { name: v.name, last: v.last()?, average_slope: v.average_slope() })
            })
            .collect()
    }
}
