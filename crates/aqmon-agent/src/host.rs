//! Process host for the memory guard

use aqmon_lib::memory::HostRuntime;
use aqmon_lib::StructuredLogger;
use tokio::sync::watch;

/// Exit code (`EX_TEMPFAIL`) used when the emergency breaker restarts the process
pub const RELOAD_EXIT_CODE: i32 = 75;

/// Host that turns reload requests into a process restart signal
///
/// The runtime has no collector to hint, so GC hints are declined. Reload
/// requests publish their reason; `main` waits on it and exits with
/// [`RELOAD_EXIT_CODE`].
pub struct ProcessHost {
    logger: StructuredLogger,
    reload_tx: watch::Sender<Option<String>>,
}

impl ProcessHost {
    pub fn new(logger: StructuredLogger) -> (Self, watch::Receiver<Option<String>>) {
        let (reload_tx, reload_rx) = watch::channel(None);
        (Self { logger, reload_tx }, reload_rx)
    }
}

impl HostRuntime for ProcessHost {
    fn request_reload(&self, reason: &str) {
        self.logger.log_shutdown(reason);
        self.reload_tx.send_replace(Some(reason.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_request_publishes_reason() {
        let (host, mut reload_rx) = ProcessHost::new(StructuredLogger::new("test"));
        assert!(reload_rx.borrow().is_none());

        assert!(!host.collect_garbage());
        host.request_reload("heap still above emergency");

        assert!(reload_rx.has_changed().unwrap());
        assert_eq!(
            reload_rx.borrow_and_update().as_deref(),
            Some("heap still above emergency")
        );
    }
}
