//! Graduated cache eviction

use super::budget::{BudgetState, SubsystemBudget};
use super::host::HostRuntime;
use crate::cache::{EvictableCache, TransientStorage};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// What one cleanup pass removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub severity: Option<BudgetState>,
    /// Array items dropped by truncation
    pub items_truncated: usize,
    /// Entries dropped by LRU eviction
    pub entries_evicted: usize,
    /// Entries dropped by clearing whole caches
    pub entries_cleared: usize,
    /// Session values dropped
    pub transient_cleared: usize,
    /// Whether the host accepted a GC hint
    pub gc_hinted: bool,
}

impl CleanupReport {
    /// Total entries and items removed
    pub fn removed(&self) -> usize {
        self.items_truncated + self.entries_evicted + self.entries_cleared + self.transient_cleared
    }
}

struct RegisteredCache {
    cache: Arc<dyn EvictableCache>,
    budget: SubsystemBudget,
}

/// Owns per-cache limits and applies them at a given severity
///
/// `Warn` trims arrays and evicts least-recently-updated entries.
/// `Critical` and `Emergency` do the same, then clear every cache and all
/// transient storage and hint the host to collect garbage.
pub struct CleanupCoordinator {
    caches: Vec<RegisteredCache>,
    transient: Vec<Arc<dyn TransientStorage>>,
    host: Arc<dyn HostRuntime>,
}

impl CleanupCoordinator {
    pub fn new(host: Arc<dyn HostRuntime>) -> Self {
        Self {
            caches: Vec::new(),
            transient: Vec::new(),
            host,
        }
    }

    /// Put a cache under the given limits
    pub fn register_cache(&mut self, cache: Arc<dyn EvictableCache>, budget: SubsystemBudget) {
        debug!(cache = %cache.name(), ?budget, "Cache registered for cleanup");
        self.caches.push(RegisteredCache { cache, budget });
    }

    pub fn register_transient(&mut self, storage: Arc<dyn TransientStorage>) {
        self.transient.push(storage);
    }

    /// Names of registered caches, in registration order
    pub fn cache_names(&self) -> Vec<String> {
        self.caches.iter().map(|c| c.cache.name().to_string()).collect()
    }

    /// Entries currently held across all registered caches
    pub fn total_entries(&self) -> usize {
        self.caches.iter().map(|c| c.cache.entry_count()).sum()
    }

    pub fn host(&self) -> &Arc<dyn HostRuntime> {
        &self.host
    }

    /// Run one pass at `severity`. `Ok` does nothing.
    pub fn cleanup(&self, severity: BudgetState) -> CleanupReport {
        let mut report = CleanupReport::default();
        if severity == BudgetState::Ok {
            return report;
        }
        report.severity = Some(severity);

        for registered in &self.caches {
            let cache = &registered.cache;
            if let Some(max_len) = registered.budget.max_array_length {
                report.items_truncated += cache.truncate(max_len);
            }
            if let Some(max_entries) = registered.budget.max_entries {
                report.entries_evicted += cache.evict_lru(max_entries);
            }
        }

        if severity.is_critical_or_worse() {
            for registered in &self.caches {
                report.entries_cleared += registered.cache.clear_all();
            }
            for storage in &self.transient {
                report.transient_cleared += storage.clear();
            }
            report.gc_hinted = self.host.collect_garbage();
        }

        debug!(
            severity = %severity,
            items_truncated = report.items_truncated,
            entries_evicted = report.entries_evicted,
            entries_cleared = report.entries_cleared,
            transient_cleared = report.transient_cleared,
            gc_hinted = report.gc_hinted,
            "Cleanup pass completed"
        );

        report
    }
}

impl std::fmt::Debug for CleanupCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupCoordinator")
            .field("caches", &self.cache_names())
            .field("transient", &self.transient.len())
            .finish()
    }
}
