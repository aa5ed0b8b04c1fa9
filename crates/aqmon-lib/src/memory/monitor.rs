//! Heap usage sampling and cleanup decisions

use super::budget::{BudgetState, MemoryBudget};
use super::probe::HeapProbe;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Minimum spacing between warn-level cleanup passes
pub const DEFAULT_THROTTLE: Duration = Duration::from_secs(5);

/// What the monitor wants done after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "severity", rename_all = "snake_case")]
pub enum CleanupDecision {
    /// Usage is within budget
    None,
    /// Warn-level pass requested inside the throttle window; dropped
    Throttled,
    /// Run a cleanup pass of the given severity
    Run(BudgetState),
}

/// Result of one monitor tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TickOutcome {
    pub usage_mb: Option<f64>,
    pub previous: BudgetState,
    pub state: BudgetState,
    pub decision: CleanupDecision,
}

impl TickOutcome {
    pub fn is_transition(&self) -> bool {
        self.previous != self.state
    }
}

/// Classifies heap usage against a [`MemoryBudget`]
///
/// The monitor keeps the last classification and the time of the last
/// cleanup pass; it never runs cleanup itself.
pub struct MemoryMonitor {
    budget: MemoryBudget,
    probe: Arc<dyn HeapProbe>,
    throttle: Duration,
    last_cleanup: Option<Instant>,
    state: BudgetState,
    last_usage: Option<f64>,
}

impl MemoryMonitor {
    pub fn new(budget: MemoryBudget, probe: Arc<dyn HeapProbe>) -> Self {
        Self {
            budget,
            probe,
            throttle: DEFAULT_THROTTLE,
            last_cleanup: None,
            state: BudgetState::Ok,
            last_usage: None,
        }
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn budget(&self) -> &MemoryBudget {
        &self.budget
    }

    pub fn state(&self) -> BudgetState {
        self.state
    }

    pub fn last_usage(&self) -> Option<f64> {
        self.last_usage
    }

    pub fn last_cleanup(&self) -> Option<Instant> {
        self.last_cleanup
    }

    /// Read the probe and classify without touching monitor state
    ///
    /// An unavailable or non-finite reading classifies as `Ok`.
    pub fn measure(&self) -> (Option<f64>, BudgetState) {
        let usage = self.probe.used_mb().filter(|mb| mb.is_finite());
        let state = usage.map_or(BudgetState::Ok, |mb| self.budget.classify(mb));
        (usage, state)
    }

    /// Sample usage, update the classification and decide on cleanup
    ///
    /// A `Run` decision counts as a cleanup at `now` for throttling.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        let (usage_mb, state) = self.measure();
        let previous = self.state;
        self.state = state;
        self.last_usage = usage_mb;

        let decision = match state {
            BudgetState::Ok => CleanupDecision::None,
            BudgetState::Warn if self.is_throttled(now) => CleanupDecision::Throttled,
            severity => CleanupDecision::Run(severity),
        };

        if let CleanupDecision::Run(_) = decision {
            self.record_cleanup(now);
        }

        match decision {
            CleanupDecision::Throttled => {
                debug!(usage_mb = ?usage_mb, "Warn cleanup throttled");
            }
            _ => trace!(usage_mb = ?usage_mb, state = %state, "Memory tick"),
        }

        TickOutcome {
            usage_mb,
            previous,
            state,
            decision,
        }
    }

    /// Note a cleanup pass that ran outside [`tick`](Self::tick)
    pub fn record_cleanup(&mut self, now: Instant) {
        self.last_cleanup = Some(now);
    }

    fn is_throttled(&self, now: Instant) -> bool {
        self.last_cleanup
            .map(|last| now.saturating_duration_since(last) < self.throttle)
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for MemoryMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMonitor")
            .field("budget", &self.budget)
            .field("throttle", &self.throttle)
            .field("state", &self.state)
            .field("last_usage", &self.last_usage)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::probe::{NullProbe, ScriptedProbe};

    fn monitor(readings: &[f64]) -> MemoryMonitor {
        MemoryMonitor::new(
            MemoryBudget::default(),
            Arc::new(ScriptedProbe::new(readings.iter().copied())),
        )
    }

    #[test]
    fn test_duplicate_warn_breaches_run_once() {
        let mut monitor = monitor(&[85.0, 86.0]);
        let start = Instant::now();

        let first = monitor.tick(start);
        let second = monitor.tick(start + Duration::from_secs(2));

        assert_eq!(first.decision, CleanupDecision::Run(BudgetState::Warn));
        assert_eq!(second.decision, CleanupDecision::Throttled);
    }

    #[test]
    fn test_warn_after_throttle_window_runs_again() {
        let mut monitor = monitor(&[85.0, 86.0]);
        let start = Instant::now();

        monitor.tick(start);
        let later = monitor.tick(start + Duration::from_secs(5));

        assert_eq!(later.decision, CleanupDecision::Run(BudgetState::Warn));
    }

    #[test]
    fn test_critical_bypasses_throttle() {
        let mut monitor = monitor(&[85.0, 125.0, 145.0]);
        let start = Instant::now();

        monitor.tick(start);
        let critical = monitor.tick(start + Duration::from_secs(1));
        let emergency = monitor.tick(start + Duration::from_secs(2));

        assert_eq!(critical.decision, CleanupDecision::Run(BudgetState::Critical));
        assert_eq!(emergency.decision, CleanupDecision::Run(BudgetState::Emergency));
        assert_eq!(emergency.previous, BudgetState::Critical);
        assert!(emergency.is_transition());
    }

    #[test]
    fn test_unavailable_probe_is_ok() {
        let mut monitor = MemoryMonitor::new(MemoryBudget::default(), Arc::new(NullProbe));
        let outcome = monitor.tick(Instant::now());

        assert_eq!(outcome.usage_mb, None);
        assert_eq!(outcome.state, BudgetState::Ok);
        assert_eq!(outcome.decision, CleanupDecision::None);
    }

    #[test]
    fn test_measure_does_not_change_state() {
        let monitor = monitor(&[145.0]);
        let (usage, state) = monitor.measure();

        assert_eq!(usage, Some(145.0));
        assert_eq!(state, BudgetState::Emergency);
        assert_eq!(monitor.state(), BudgetState::Ok);
    }

    #[test]
    fn test_external_cleanup_starts_throttle() {
        let mut monitor = monitor(&[85.0]).with_throttle(Duration::from_secs(5));
        let start = Instant::now();

        monitor.record_cleanup(start);
        let outcome = monitor.tick(start + Duration::from_secs(1));

        assert_eq!(outcome.decision, CleanupDecision::Throttled);
    }
}
