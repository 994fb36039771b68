//! Set-once shutdown latch shared by every trigger path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;
use tracing::info;

/// What first asked the worker to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Process-level shutdown request.
    Signal,
    /// The hosting environment marked this worker for termination.
    MarkedForTermination,
}

/// Cloneable handle; all clones observe the same latch.
///
/// Triggering never resets. The first trigger records its reason, and
/// [`ShutdownLatch::claim_drain`] lets exactly one caller run the drain.
#[derive(Debug, Clone, Default)]
pub struct ShutdownLatch {
    token: CancellationToken,
    reason: Arc<OnceLock<ShutdownReason>>,
    drain_claimed: Arc<AtomicBool>,
}

impl ShutdownLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the latch. Returns `true` only for the call that tripped it.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        self.token.cancel();
        if first {
            info!(?reason, "shutdown requested");
        }
        first
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.get().copied()
    }

    /// Resolves once the latch has been tripped.
    pub async fn triggered(&self) {
        self.token.cancelled().await
    }

    /// The underlying token, for tasks that select on cancellation.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Claim the right to run the drain. `true` exactly once.
    pub fn claim_drain(&self) -> bool {
        self.drain_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_trigger_wins() {
        let latch = ShutdownLatch::new();
        assert!(!latch.is_triggered());
        assert!(latch.trigger(ShutdownReason::MarkedForTermination));
        assert!(!latch.trigger(ShutdownReason::Signal));
        assert!(latch.is_triggered());
        assert_eq!(latch.reason(), Some(ShutdownReason::MarkedForTermination));
    }

    #[test]
    fn clones_share_state() {
        let latch = ShutdownLatch::new();
        let other = latch.clone();
        other.trigger(ShutdownReason::Signal);
        assert!(latch.is_triggered());
        assert!(latch.token().is_cancelled());
    }

    #[test]
    fn drain_claimed_once() {
        let latch = ShutdownLatch::new();
        let other = latch.clone();
        assert!(latch.claim_drain());
        assert!(!other.claim_drain());
        assert!(!latch.claim_drain());
    }

    #[tokio::test]
    async fn concurrent_triggers_collapse() {
        let latch = ShutdownLatch::new();
        let mut handles = Vec::new();
        for i in 0..16 {
            let latch = latch.clone();
            handles.push(tokio::spawn(async move {
                let reason = if i % 2 == 0 {
                    ShutdownReason::Signal
                } else {
                    ShutdownReason::MarkedForTermination
                };
                latch.trigger(reason);
                latch.claim_drain()
            }));
        }

        let mut claims = 0;
        for handle in handles {
            if handle.await.unwrap() {
                claims += 1;
            }
        }
        assert_eq!(claims, 1);
        latch.triggered().await;
    }
}
