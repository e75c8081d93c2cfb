use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

/// Pause switch for outbound requests of one session.
///
/// While paused, queued requests wait before being sent. Requests already on
/// the wire are unaffected.
#[derive(Debug)]
pub struct QueueGate {
    paused: watch::Sender<bool>,
    pauses: AtomicU64,
}

/// Keeps the gate paused until dropped.
#[derive(Debug)]
#[must_use = "the gate resumes as soon as the guard is dropped"]
pub struct PauseGuard<'a> {
    gate: &'a QueueGate,
}

impl QueueGate {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            paused,
            pauses: AtomicU64::new(0),
        }
    }

    /// Pauses the gate, whether or not it already was.
    pub fn pause(&self) -> PauseGuard<'_> {
        self.try_pause();
        PauseGuard { gate: self }
    }

    /// Pauses the gate only if it is open. `None` means someone else holds it.
    pub fn try_pause(&self) -> Option<PauseGuard<'_>> {
        let changed = self.paused.send_if_modified(|paused| !std::mem::replace(paused, true));

        if !changed {
            return None;
        }

        self.pauses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("outbound queue paused");
        Some(PauseGuard { gate: self })
    }

    pub fn resume(&self) {
        if self.paused.send_if_modified(|paused| std::mem::replace(paused, false)) {
            tracing::debug!("outbound queue resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// How many times the gate went from open to paused.
    pub fn pause_count(&self) -> u64 {
        self.pauses.load(Ordering::Relaxed)
    }

    /// Resolves once the gate is open.
    pub async fn opened(&self) {
        let mut rx = self.paused.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|paused| !*paused).await;
    }
}

impl Default for QueueGate {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        self.gate.resume();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn guard_resumes_on_drop() {
        let gate = QueueGate::new();
        {
            let _guard = gate.pause();
            assert!(gate.is_paused());
        }
        assert!(!gate.is_paused());
        assert_eq!(gate.pause_count(), 1);
    }

    #[test]
    fn try_pause_fails_while_paused() {
        let gate = QueueGate::new();
        let guard = gate.try_pause();
        assert!(guard.is_some());
        assert!(gate.try_pause().is_none());
        drop(guard);
        assert!(gate.try_pause().is_some());
        assert_eq!(gate.pause_count(), 2);
    }

    #[tokio::test]
    async fn opened_waits_for_resume() {
        let gate = QueueGate::new();
        gate.opened().await;

        let guard = gate.pause();
        let waited = tokio::time::timeout(Duration::from_millis(20), gate.opened()).await;
        assert!(waited.is_err());

        drop(guard);
        tokio::time::timeout(Duration::from_millis(20), gate.opened())
            .await
            .unwrap();
    }
}
