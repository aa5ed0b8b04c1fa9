//! Memory guard: periodic monitoring, hygiene sweeps and the reload breaker
//!
//! The guard owns the monitor, the cleanup coordinator and a job scheduler.
//! All jobs run on the task that drives [`MemoryGuard::run`]; other tasks
//! talk to it through a [`GuardHandle`] and observe it through a
//! [`GuardSnapshot`] watch channel.

use super::budget::{BudgetState, MemoryBudget};
use super::cleanup::{CleanupCoordinator, CleanupReport};
use super::clock::{Clock, SystemClock};
use super::monitor::{CleanupDecision, MemoryMonitor, TickOutcome, DEFAULT_THROTTLE};
use super::probe::HeapProbe;
use super::scheduler::{JobId, JobScheduler};
use crate::observability::{DiagnosticsSink, NoopDiagnostics};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

const COMMAND_BUFFER: usize = 16;

/// Timing configuration for the guard
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Interval between usage measurements (default: 12 seconds)
    pub tick_interval: Duration,
    /// Interval between warn-level hygiene sweeps (default: 30 seconds)
    pub sweep_interval: Duration,
    /// Minimum spacing between warn-level passes (default: 5 seconds)
    pub throttle: Duration,
    /// Delay before re-measuring after an emergency pass (default: 3 seconds)
    pub recheck_delay: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(12),
            sweep_interval: Duration::from_secs(30),
            throttle: DEFAULT_THROTTLE,
            recheck_delay: Duration::from_secs(3),
        }
    }
}

/// Scheduled guard work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardJob {
    Tick,
    Sweep,
    EmergencyRecheck,
}

/// Host visibility; a hidden host sheds memory aggressively
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Requests other tasks can send to a running guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardCommand {
    Visibility(Visibility),
    /// Run one pass at the given severity right away
    CleanupNow(BudgetState),
}

/// Point-in-time view of the guard, published after every change
#[derive(Debug, Clone, Serialize)]
pub struct GuardSnapshot {
    pub state: BudgetState,
    pub usage_mb: Option<f64>,
    pub budget: MemoryBudget,
    pub cleanup_passes: u64,
    pub last_cleanup: Option<CleanupReport>,
    pub reload_requested: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl GuardSnapshot {
    fn initial(budget: MemoryBudget) -> Self {
        Self {
            state: BudgetState::Ok,
            usage_mb: None,
            budget,
            cleanup_passes: 0,
            last_cleanup: None,
            reload_requested: false,
            updated_at: None,
        }
    }
}

/// Sender side for talking to a running guard
#[derive(Debug, Clone)]
pub struct GuardHandle {
    tx: mpsc::Sender<GuardCommand>,
}

impl GuardHandle {
    pub async fn send(&self, command: GuardCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| anyhow::anyhow!("Memory guard is not running"))
    }

    pub async fn set_visibility(&self, visibility: Visibility) -> Result<()> {
        self.send(GuardCommand::Visibility(visibility)).await
    }

    pub async fn cleanup_now(&self, severity: BudgetState) -> Result<()> {
        self.send(GuardCommand::CleanupNow(severity)).await
    }
}

/// Heap-budget enforcement driver
pub struct MemoryGuard {
    config: GuardConfig,
    monitor: MemoryMonitor,
    coordinator: CleanupCoordinator,
    scheduler: JobScheduler<GuardJob>,
    clock: Arc<dyn Clock>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    snapshot_tx: watch::Sender<GuardSnapshot>,
    command_tx: mpsc::Sender<GuardCommand>,
    command_rx: Option<mpsc::Receiver<GuardCommand>>,
    recheck: Option<JobId>,
    reload_requested: bool,
    cleanup_passes: u64,
    last_cleanup: Option<CleanupReport>,
}

impl MemoryGuard {
    pub fn builder() -> MemoryGuardBuilder {
        MemoryGuardBuilder::new()
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn state(&self) -> BudgetState {
        self.monitor.state()
    }

    pub fn reload_requested(&self) -> bool {
        self.reload_requested
    }

    pub fn coordinator(&self) -> &CleanupCoordinator {
        &self.coordinator
    }

    /// Handle for sending commands to this guard
    pub fn handle(&self) -> GuardHandle {
        GuardHandle {
            tx: self.command_tx.clone(),
        }
    }

    /// Receiver of snapshots published after every tick and pass
    pub fn subscribe(&self) -> watch::Receiver<GuardSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> GuardSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Schedule the periodic jobs and take a first measurement
    pub fn start(&mut self) {
        let now = self.clock.now();
        self.scheduler.cancel_all();
        self.recheck = None;
        self.scheduler
            .every(GuardJob::Tick, self.config.tick_interval, now);
        self.scheduler
            .every(GuardJob::Sweep, self.config.sweep_interval, now);

        info!(
            tick_secs = self.config.tick_interval.as_secs_f64(),
            sweep_secs = self.config.sweep_interval.as_secs_f64(),
            warn_mb = self.monitor.budget().warn_mb(),
            emergency_mb = self.monitor.budget().emergency_mb(),
            "Memory guard started"
        );

        self.tick(now);
    }

    /// Cancel every scheduled job
    pub fn shutdown(&mut self) {
        self.scheduler.cancel_all();
        self.recheck = None;
        debug!("Memory guard jobs cancelled");
    }

    /// Earliest time any job is due
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Run every job due at the clock's current time
    pub fn run_pending(&mut self) -> Vec<GuardJob> {
        let now = self.clock.now();
        let due = self.scheduler.take_due(now);
        for job in &due {
            match job {
                GuardJob::Tick => {
                    self.tick(now);
                }
                GuardJob::Sweep => self.sweep(now),
                GuardJob::EmergencyRecheck => self.recheck_emergency(),
            }
        }
        due
    }

    /// React to the host being hidden or shown
    ///
    /// Hidden forces an emergency-grade pass regardless of usage; it does
    /// not arm the reload breaker.
    pub fn on_visibility_change(&mut self, visibility: Visibility) -> Option<CleanupReport> {
        match visibility {
            Visibility::Hidden => {
                info!("Host hidden, shedding caches");
                let now = self.clock.now();
                Some(self.run_cleanup(BudgetState::Emergency, now))
            }
            Visibility::Visible => {
                debug!("Host visible");
                None
            }
        }
    }

    /// Run one pass at `severity` outside the schedule
    pub fn cleanup_now(&mut self, severity: BudgetState) -> CleanupReport {
        let now = self.clock.now();
        self.run_cleanup(severity, now)
    }

    fn handle_command(&mut self, command: GuardCommand) {
        match command {
            GuardCommand::Visibility(visibility) => {
                self.on_visibility_change(visibility);
            }
            GuardCommand::CleanupNow(severity) => {
                self.cleanup_now(severity);
            }
        }
    }

    fn tick(&mut self, now: Instant) -> TickOutcome {
        let outcome = self.monitor.tick(now);
        self.diagnostics.on_tick(&outcome);

        if outcome.is_transition() {
            self.diagnostics
                .on_transition(outcome.previous, outcome.state, outcome.usage_mb);
        }

        match outcome.decision {
            CleanupDecision::Run(severity) => {
                self.execute_cleanup(severity);
                if severity == BudgetState::Emergency {
                    self.arm_recheck(now);
                }
            }
            CleanupDecision::Throttled | CleanupDecision::None => {}
        }

        self.publish();
        outcome
    }

    fn sweep(&mut self, now: Instant) {
        debug!("Hygiene sweep");
        self.run_cleanup(BudgetState::Warn, now);
    }

    fn run_cleanup(&mut self, severity: BudgetState, now: Instant) -> CleanupReport {
        self.monitor.record_cleanup(now);
        let report = self.execute_cleanup(severity);
        self.publish();
        report
    }

    fn execute_cleanup(&mut self, severity: BudgetState) -> CleanupReport {
        let report = self.coordinator.cleanup(severity);
        if report.severity.is_some() {
            self.cleanup_passes += 1;
            self.diagnostics.on_cleanup(&report);
        }
        self.last_cleanup = Some(report.clone());
        report
    }

    fn arm_recheck(&mut self, now: Instant) {
        if self.reload_requested || self.recheck.is_some() {
            return;
        }
        debug!(
            delay_secs = self.config.recheck_delay.as_secs_f64(),
            "Emergency recheck scheduled"
        );
        self.recheck = Some(
            self.scheduler
                .once(GuardJob::EmergencyRecheck, self.config.recheck_delay, now),
        );
    }

    fn recheck_emergency(&mut self) {
        self.recheck = None;
        let (usage_mb, state) = self.monitor.measure();

        if state != BudgetState::Emergency {
            info!(usage_mb = ?usage_mb, state = %state, "Memory recovered after emergency cleanup");
            return;
        }
        if self.reload_requested {
            return;
        }

        self.reload_requested = true;
        let reason = format!(
            "heap usage {:.1} MB still at or above emergency threshold {:.1} MB after cleanup",
            usage_mb.unwrap_or_default(),
            self.monitor.budget().emergency_mb()
        );
        error!(usage_mb = ?usage_mb, reason = %reason, "Emergency persists, requesting reload");
        self.diagnostics.on_reload(&reason, usage_mb);
        self.coordinator.host().request_reload(&reason);
        self.publish();
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(GuardSnapshot {
            state: self.monitor.state(),
            usage_mb: self.monitor.last_usage(),
            budget: *self.monitor.budget(),
            cleanup_passes: self.cleanup_passes,
            last_cleanup: self.last_cleanup.clone(),
            reload_requested: self.reload_requested,
            updated_at: Some(Utc::now()),
        });
    }

    /// Drive the guard until shutdown
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        self.start();
        let mut commands = self.command_rx.take();

        loop {
            let deadline = self.scheduler.next_deadline();

            tokio::select! {
                _ = sleep_until(deadline) => {
                    self.run_pending();
                }
                Some(command) = recv_command(&mut commands) => {
                    self.handle_command(command);
                }
                _ = shutdown.recv() => {
                    info!("Shutting down memory guard");
                    break;
                }
            }
        }

        self.shutdown();
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

async fn recv_command(rx: &mut Option<mpsc::Receiver<GuardCommand>>) -> Option<GuardCommand> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl std::fmt::Debug for MemoryGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryGuard")
            .field("config", &self.config)
            .field("monitor", &self.monitor)
            .field("coordinator", &self.coordinator)
            .field("reload_requested", &self.reload_requested)
            .finish()
    }
}

/// Builder for the memory guard
pub struct MemoryGuardBuilder {
    budget: MemoryBudget,
    probe: Option<Arc<dyn HeapProbe>>,
    coordinator: Option<CleanupCoordinator>,
    clock: Arc<dyn Clock>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    config: GuardConfig,
}

impl MemoryGuardBuilder {
    pub fn new() -> Self {
        Self {
            budget: MemoryBudget::default(),
            probe: None,
            coordinator: None,
            clock: Arc::new(SystemClock),
            diagnostics: Arc::new(NoopDiagnostics),
            config: GuardConfig::default(),
        }
    }

    pub fn budget(mut self, budget: MemoryBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn probe(mut self, probe: Arc<dyn HeapProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn coordinator(mut self, coordinator: CleanupCoordinator) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn diagnostics(mut self, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn config(mut self, config: GuardConfig) -> Self {
        self.config = config;
        self
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.config.tick_interval = interval;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    pub fn build(self) -> Result<MemoryGuard> {
        let probe = self
            .probe
            .ok_or_else(|| anyhow::anyhow!("Heap probe is required"))?;
        let coordinator = self
            .coordinator
            .ok_or_else(|| anyhow::anyhow!("Cleanup coordinator is required"))?;

        if self.config.tick_interval.is_zero() || self.config.sweep_interval.is_zero() {
            warn!("Zero guard interval clamped to 1ms");
        }

        let monitor = MemoryMonitor::new(self.budget, probe).with_throttle(self.config.throttle);
        let (snapshot_tx, _) = watch::channel(GuardSnapshot::initial(self.budget));
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);

        Ok(MemoryGuard {
            config: self.config,
            monitor,
            coordinator,
            scheduler: JobScheduler::new(),
            clock: self.clock,
            diagnostics: self.diagnostics,
            snapshot_tx,
            command_tx,
            command_rx: Some(command_rx),
            recheck: None,
            reload_requested: false,
            cleanup_passes: 0,
            last_cleanup: None,
        })
    }
}

impl Default for MemoryGuardBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{names, EvictableCache, SessionStore, TypedCache};
    use crate::memory::budget::SubsystemBudget;
    use crate::memory::clock::ManualClock;
    use crate::memory::host::HostRuntime;
    use crate::memory::probe::{NullProbe, ScriptedProbe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHost {
        reloads: AtomicUsize,
        reasons: Mutex<Vec<String>>,
    }

    impl HostRuntime for RecordingHost {
        fn request_reload(&self, reason: &str) {
            self.reloads.fetch_add(1, Ordering::SeqCst);
            self.reasons.lock().unwrap().push(reason.to_string());
        }
    }

    struct Fixture {
        guard: MemoryGuard,
        clock: Arc<ManualClock>,
        host: Arc<RecordingHost>,
        remote: Arc<TypedCache<String, u32>>,
        session: Arc<SessionStore>,
    }

    fn fixture(probe: Arc<dyn HeapProbe>, config: GuardConfig) -> Fixture {
        let clock = Arc::new(ManualClock::new());
        let host = Arc::new(RecordingHost::default());
        let remote = Arc::new(TypedCache::new(names::REMOTE_DATA));
        let session = Arc::new(SessionStore::new(names::SESSION));

        let mut coordinator = CleanupCoordinator::new(host.clone());
        coordinator.register_cache(remote.clone(), SubsystemBudget::new(Some(50), Some(800)));
        coordinator.register_transient(session.clone());

        let guard = MemoryGuard::builder()
            .probe(probe)
            .coordinator(coordinator)
            .clock(clock.clone())
            .config(config)
            .build()
            .unwrap();

        Fixture {
            guard,
            clock,
            host,
            remote,
            session,
        }
    }

    #[test]
    fn test_throttled_warn_runs_one_pass() {
        let config = GuardConfig {
            tick_interval: Duration::from_secs(2),
            ..GuardConfig::default()
        };
        let mut f = fixture(Arc::new(ScriptedProbe::new([85.0, 86.0])), config);

        f.guard.start();
        f.clock.advance(Duration::from_secs(2));
        assert_eq!(f.guard.run_pending(), vec![GuardJob::Tick]);

        let snapshot = f.guard.snapshot();
        assert_eq!(snapshot.state, BudgetState::Warn);
        assert_eq!(snapshot.cleanup_passes, 1);
    }

    #[test]
    fn test_persistent_emergency_requests_one_reload() {
        let mut f = fixture(Arc::new(ScriptedProbe::new([145.0])), GuardConfig::default());
        f.remote.insert("station".to_string(), vec![1, 2, 3]);

        f.guard.start();
        assert!(f.remote.is_empty());
        assert_eq!(f.host.reloads.load(Ordering::SeqCst), 0);

        f.clock.advance(Duration::from_secs(3));
        assert_eq!(f.guard.run_pending(), vec![GuardJob::EmergencyRecheck]);
        assert_eq!(f.host.reloads.load(Ordering::SeqCst), 1);
        assert!(f.guard.reload_requested());

        // Later emergency ticks never request a second reload
        for _ in 0..3 {
            f.clock.advance(Duration::from_secs(12));
            f.guard.run_pending();
        }
        assert_eq!(f.host.reloads.load(Ordering::SeqCst), 1);
        assert!(f.host.reasons.lock().unwrap()[0].contains("emergency"));
        assert!(f.guard.snapshot().reload_requested);
    }

    #[test]
    fn test_recovered_emergency_does_not_reload() {
        let mut f = fixture(Arc::new(ScriptedProbe::new([145.0, 60.0])), GuardConfig::default());

        f.guard.start();
        f.clock.advance(Duration::from_secs(3));
        f.guard.run_pending();

        assert_eq!(f.host.reloads.load(Ordering::SeqCst), 0);
        assert!(!f.guard.reload_requested());
    }

    #[test]
    fn test_hidden_forces_emergency_pass_without_reload() {
        let mut f = fixture(Arc::new(ScriptedProbe::new([50.0])), GuardConfig::default());
        f.remote.insert("station".to_string(), vec![1]);
        f.session.set("zoom", serde_json::json!(4));

        f.guard.start();
        let report = f.guard.on_visibility_change(Visibility::Hidden).unwrap();

        assert_eq!(report.severity, Some(BudgetState::Emergency));
        assert!(f.remote.is_empty());
        assert!(f.session.is_empty());

        // Only the periodic jobs remain; no recheck was armed
        f.clock.advance(Duration::from_secs(3));
        assert!(f.guard.run_pending().is_empty());
        assert_eq!(f.host.reloads.load(Ordering::SeqCst), 0);
        assert_eq!(f.guard.state(), BudgetState::Ok);
    }

    #[test]
    fn test_visible_does_nothing() {
        let mut f = fixture(Arc::new(NullProbe), GuardConfig::default());
        f.remote.insert("station".to_string(), vec![1]);

        assert!(f.guard.on_visibility_change(Visibility::Visible).is_none());
        assert_eq!(f.remote.entry_count(), 1);
    }

    #[test]
    fn test_sweep_runs_warn_cleanup_under_budget() {
        let mut f = fixture(Arc::new(ScriptedProbe::new([50.0])), GuardConfig::default());
        f.remote.insert("station".to_string(), (0..5000).collect());

        f.guard.start();
        f.clock.advance(Duration::from_secs(30));
        let jobs = f.guard.run_pending();

        assert!(jobs.contains(&GuardJob::Sweep));
        let kept = f.remote.get(&"station".to_string()).unwrap();
        assert_eq!(kept.len(), 800);
        assert_eq!(kept[0], 4200);
        assert_eq!(f.guard.snapshot().cleanup_passes, 1);
    }

    #[test]
    fn test_shutdown_cancels_jobs() {
        let mut f = fixture(Arc::new(NullProbe), GuardConfig::default());

        f.guard.start();
        assert!(f.guard.next_deadline().is_some());

        f.guard.shutdown();
        assert_eq!(f.guard.next_deadline(), None);
        f.clock.advance(Duration::from_secs(60));
        assert!(f.guard.run_pending().is_empty());
    }

    #[test]
    fn test_builder_requires_probe_and_coordinator() {
        let result = MemoryGuard::builder().build();
        assert!(result.is_err());

        let result = MemoryGuard::builder().probe(Arc::new(NullProbe)).build();
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_handles_commands_until_shutdown() {
        let remote = Arc::new(TypedCache::<String, u32>::new(names::REMOTE_DATA));
        let mut coordinator = CleanupCoordinator::new(Arc::new(RecordingHost::default()));
        coordinator.register_cache(remote.clone(), SubsystemBudget::remote_data());

        let guard = MemoryGuard::builder()
            .probe(Arc::new(NullProbe))
            .coordinator(coordinator)
            .build()
            .unwrap();
        let handle = guard.handle();
        let mut snapshots = guard.subscribe();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(guard.run(shutdown_rx));

        remote.insert("station".to_string(), vec![1, 2, 3]);
        handle.cleanup_now(BudgetState::Critical).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                snapshots.changed().await.unwrap();
                if snapshots.borrow().cleanup_passes > 0 {
                    break;
                }
            }
        })
        .await
        .unwrap();
        assert!(remote.is_empty());

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
