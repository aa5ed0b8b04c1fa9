//! Heap-budget enforcement
//!
//! A [`MemoryGuard`] measures heap usage on a schedule, classifies it
//! against a [`MemoryBudget`] and asks the [`CleanupCoordinator`] to evict
//! cached data in proportion to the pressure. If usage stays at the
//! emergency level after a full pass, the guard asks the host to reload.

mod budget;
mod cleanup;
mod clock;
mod guard;
mod host;
mod monitor;
mod probe;
mod scheduler;

pub use budget::{BudgetError, BudgetState, MemoryBudget, SubsystemBudget, BYTES_PER_MB};
pub use cleanup::{CleanupCoordinator, CleanupReport};
pub use clock::{Clock, ManualClock, SystemClock};
pub use guard::{
    GuardCommand, GuardConfig, GuardHandle, GuardJob, GuardSnapshot, MemoryGuard,
    MemoryGuardBuilder, Visibility,
};
pub use host::{HostRuntime, NoopHost};
pub use monitor::{CleanupDecision, MemoryMonitor, TickOutcome, DEFAULT_THROTTLE};
pub use probe::{HeapProbe, NullProbe, ProcessMemoryProbe, ScriptedProbe};
pub use scheduler::{JobId, JobScheduler};
