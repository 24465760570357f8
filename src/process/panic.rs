//! Per-session stop signal
//!
//! Holds the cancellation token and spawned pids of the session's active
//! invocation. `begin`, `register_process`, `finish` and `trip` all run
//! under one mutex, so a panic racing a just-finished invocation can never
//! reach the processes of the next one.

use super::tree;
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Outcome of a panic
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanicReport {
    /// Invocation that was stopped, if one was active
    pub invocation: Option<String>,
    /// Processes terminated
    pub killed: usize,
}

#[derive(Debug)]
struct ActiveInvocation {
    id: String,
    token: CancellationToken,
    pids: Vec<u32>,
}

#[derive(Debug, Default)]
struct Inner {
    active: Option<ActiveInvocation>,
    tripped: bool,
}

/// Stop flag plus the process record of the active invocation
#[derive(Debug, Default)]
pub struct PanicSignal {
    inner: Mutex<Inner>,
}

impl PanicSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start tracking an invocation; clears the stop flag.
    pub fn begin(&self, invocation_id: &str) -> CancellationToken {
        let mut inner = self.lock();
        if let Some(stale) = inner.active.take() {
            tracing::warn!(
                invocation_id = %stale.id,
                "Replacing invocation that never finished"
            );
            stale.token.cancel();
        }
        let token = CancellationToken::new();
        inner.active = Some(ActiveInvocation {
            id: invocation_id.to_string(),
            token: token.clone(),
            pids: Vec::new(),
        });
        inner.tripped = false;
        token
    }

    /// Record a process spawned by `invocation_id`.
    ///
    /// Returns false when that invocation is no longer active or has been
    /// cancelled; the caller owns the process and must stop it.
    pub fn register_process(&self, invocation_id: &str, pid: u32) -> bool {
        let mut inner = self.lock();
        match inner.active.as_mut() {
            Some(active) if active.id == invocation_id && !active.token.is_cancelled() => {
                active.pids.push(pid);
                tracing::debug!(invocation_id, pid, "Agent process registered");
                true
            }
            _ => false,
        }
    }

    /// Forget a process that exited on its own
    pub fn release_process(&self, invocation_id: &str, pid: u32) {
        let mut inner = self.lock();
        if let Some(active) = inner.active.as_mut() {
            if active.id == invocation_id {
                active.pids.retain(|p| *p != pid);
            }
        }
    }

    /// Stop tracking `invocation_id`. Returns whether it was the active one.
    pub fn finish(&self, invocation_id: &str) -> bool {
        let mut inner = self.lock();
        if inner.active.as_ref().is_some_and(|a| a.id == invocation_id) {
            inner.active = None;
            true
        } else {
            false
        }
    }

    /// Cancel the active invocation and kill its process trees.
    ///
    /// The record is consumed, so a second trip reports nothing killed.
    /// Blocks while scanning the process table; call from a blocking
    /// context.
    pub fn trip(&self) -> PanicReport {
        let mut inner = self.lock();
        inner.tripped = true;
        let Some(active) = inner.active.take() else {
            return PanicReport::default();
        };

        active.token.cancel();
        let killed: usize = active.pids.iter().map(|pid| tree::kill_tree(*pid)).sum();
        tracing::warn!(
            invocation_id = %active.id,
            killed,
            "Panic: invocation cancelled"
        );
        PanicReport {
            invocation: Some(active.id),
            killed,
        }
    }

    /// Whether a panic happened since the last `begin`
    pub fn is_tripped(&self) -> bool {
        self.lock().tripped
    }

    pub fn active_invocation(&self) -> Option<String> {
        self.lock().active.as_ref().map(|a| a.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trip_without_invocation_is_noop() {
        let signal = PanicSignal::new();
        assert_eq!(signal.trip(), PanicReport::default());
        assert!(signal.is_tripped());
        assert_eq!(signal.trip(), PanicReport::default());
    }

    #[test]
    fn test_trip_cancels_and_consumes() {
        let signal = PanicSignal::new();
        let token = signal.begin("inv-1");
        assert!(!signal.is_tripped());
        assert_eq!(signal.active_invocation().as_deref(), Some("inv-1"));

        let report = signal.trip();
        assert_eq!(report.invocation.as_deref(), Some("inv-1"));
        assert_eq!(report.killed, 0);
        assert!(token.is_cancelled());
        assert!(signal.active_invocation().is_none());

        let again = signal.trip();
        assert_eq!(again, PanicReport::default());
    }

    #[test]
    fn test_begin_clears_flag() {
        let signal = PanicSignal::new();
        signal.trip();
        assert!(signal.is_tripped());
        let token = signal.begin("inv-2");
        assert!(!signal.is_tripped());
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_register_after_trip_is_refused() {
        let signal = PanicSignal::new();
        signal.begin("inv-1");
        assert!(signal.register_process("inv-1", 4242));
        signal.release_process("inv-1", 4242);
        signal.trip();
        assert!(!signal.register_process("inv-1", 4243));
    }

    #[test]
    fn test_late_finish_does_not_clear_next_invocation() {
        let signal = PanicSignal::new();
        signal.begin("inv-1");
        assert!(signal.finish("inv-1"));
        let next = signal.begin("inv-2");

        assert!(!signal.finish("inv-1"));
        assert!(!signal.register_process("inv-1", 4242));
        assert_eq!(signal.active_invocation().as_deref(), Some("inv-2"));
        assert!(!next.is_cancelled());
    }

    #[cfg(unix)]
    #[test]
    fn test_trip_kills_registered_tree() {
        use std::os::unix::process::CommandExt;

        let mut child = std::process::Command::new("sh")
            .args(["-c", "sleep 30 & wait"])
            .process_group(0)
            .spawn()
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(200));

        let signal = PanicSignal::new();
        signal.begin("inv-1");
        assert!(signal.register_process("inv-1", child.id()));

        let report = signal.trip();
        assert!(report.killed >= 1);
        assert!(!child.wait().unwrap().success());
        assert_eq!(signal.trip().killed, 0);
    }
}
