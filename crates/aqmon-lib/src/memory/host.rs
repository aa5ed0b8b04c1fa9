//! Host runtime seam used by the cleanup coordinator and the guard

use tracing::warn;

/// Capabilities the hosting process exposes to the memory guard
pub trait HostRuntime: Send + Sync {
    /// Ask the runtime to reclaim memory. Returns `false` when the host
    /// has no such capability.
    fn collect_garbage(&self) -> bool {
        false
    }

    /// Discard all in-process state by restarting the host
    fn request_reload(&self, reason: &str);
}

/// Host without GC hints whose reload request is only logged
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHost;

impl HostRuntime for NoopHost {
    fn request_reload(&self, reason: &str) {
        warn!(reason = %reason, "Reload requested but host cannot reload");
    }
}
