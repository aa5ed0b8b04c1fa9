//! Heap usage introspection
//!
//! Probes report resident memory in megabytes. A probe that cannot measure
//! returns `None`; the monitor treats that as `Ok` rather than failing.

use super::budget::BYTES_PER_MB;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

/// Source of current heap usage
pub trait HeapProbe: Send + Sync {
    /// Current usage in megabytes, or `None` if unavailable
    fn used_mb(&self) -> Option<f64>;
}

/// Probe for runtimes without usage introspection
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProbe;

impl HeapProbe for NullProbe {
    fn used_mb(&self) -> Option<f64> {
        None
    }
}

/// Resident set size of the current process from `/proc/self/status`
#[derive(Debug, Clone)]
pub struct ProcessMemoryProbe {
    status_path: PathBuf,
}

impl ProcessMemoryProbe {
    pub fn new() -> Self {
        Self {
            status_path: PathBuf::from("/proc/self/status"),
        }
    }

    /// Read from an alternative status file
    pub fn with_status_path(path: impl Into<PathBuf>) -> Self {
        Self {
            status_path: path.into(),
        }
    }
}

impl Default for ProcessMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HeapProbe for ProcessMemoryProbe {
    fn used_mb(&self) -> Option<f64> {
        let content = match std::fs::read_to_string(&self.status_path) {
            Ok(c) => c,
            Err(e) => {
                debug!(path = %self.status_path.display(), error = %e, "Memory status unavailable");
                return None;
            }
        };
        parse_vm_rss_kb(&content).map(|kb| kb as f64 * 1024.0 / BYTES_PER_MB)
    }
}

/// Extract `VmRSS` (in kB) from a proc status document
fn parse_vm_rss_kb(content: &str) -> Option<u64> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|v| v.parse().ok())
}

/// Probe that replays a fixed sequence of readings
///
/// Once exhausted it keeps returning the last reading.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    readings: Mutex<VecDeque<Option<f64>>>,
    last: Mutex<Option<f64>>,
}

impl ScriptedProbe {
    pub fn new(readings: impl IntoIterator<Item = f64>) -> Self {
        Self {
            readings: Mutex::new(readings.into_iter().map(Some).collect()),
            last: Mutex::new(None),
        }
    }

    /// Queue another reading
    pub fn push(&self, reading: Option<f64>) {
        if let Ok(mut readings) = self.readings.lock() {
            readings.push_back(reading);
        }
    }

    /// Readings not consumed yet
    pub fn remaining(&self) -> usize {
        self.readings.lock().map(|r| r.len()).unwrap_or(0)
    }
}

impl HeapProbe for ScriptedProbe {
    fn used_mb(&self) -> Option<f64> {
        let next = self.readings.lock().ok()?.pop_front();
        let mut last = self.last.lock().ok()?;
        if let Some(reading) = next {
            *last = reading;
        }
        *last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_vm_rss() {
        let status = "Name:\taqmon-agent\nVmPeak:\t  300000 kB\nVmRSS:\t   51200 kB\nThreads:\t4\n";
        assert_eq!(parse_vm_rss_kb(status), Some(51200));
        assert_eq!(parse_vm_rss_kb("Name:\tx\n"), None);
    }

    #[test]
    fn test_process_probe_reads_status_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Name:\ttest\nVmRSS:\t   102400 kB\n").unwrap();

        let probe = ProcessMemoryProbe::with_status_path(file.path());
        assert_eq!(probe.used_mb(), Some(100.0));
    }

    #[test]
    fn test_process_probe_missing_file() {
        let probe = ProcessMemoryProbe::with_status_path("/nonexistent/status");
        assert_eq!(probe.used_mb(), None);
    }

    #[test]
    fn test_null_probe() {
        assert_eq!(NullProbe.used_mb(), None);
    }

    #[test]
    fn test_scripted_probe_replays_then_holds() {
        let probe = ScriptedProbe::new([50.0, 85.0]);
        assert_eq!(probe.used_mb(), Some(50.0));
        assert_eq!(probe.used_mb(), Some(85.0));
        assert_eq!(probe.used_mb(), Some(85.0));

        probe.push(None);
        assert_eq!(probe.used_mb(), None);
        assert_eq!(probe.remaining(), 0);
    }
}
