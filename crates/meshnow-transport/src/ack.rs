use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Notify;

/// Matches inbound `ACK` frames to the outbound sends awaiting them, by
/// magic (spec §3 `ack_queue`, §4.D receive step 7 "`ACK` ... push `magic`
/// onto `ack_queue`").
#[derive(Default)]
pub struct AckRegistry {
    pending: DashMap<u16, Arc<Notify>>,
}

impl AckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the receive path when an `ACK` frame addressed to us
    /// arrives. A late ACK that matches nothing pending is simply dropped
    /// (spec §4.D "ACK delivery is best-effort").
    pub fn deliver(&self, magic: u16) {
        if let Some((_, notify)) = self.pending.remove(&magic) {
            notify.notify_one();
        }
    }

    /// Waits up to `timeout` for an ACK matching `magic`. Returns `true` on
    /// match, `false` on timeout; registration is always cleaned up.
    pub async fn wait_for(&self, magic: u16, timeout: Duration) -> bool {
        let notify = self.pending.entry(magic).or_insert_with(|| Arc::new(Notify::new())).clone();
        let result = tokio::time::timeout(timeout, notify.notified()).await.is_ok();
        self.pending.remove(&magic);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivered_ack_wakes_the_waiter() {
        let registry = Arc::new(AckRegistry::new());
        let r2 = registry.clone();
        let waiter = tokio::spawn(async move { r2.wait_for(42, Duration::from_millis(200)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        registry.deliver(42);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn unmatched_ack_times_out() {
        let registry = AckRegistry::new();
        let ok = registry.wait_for(7, Duration::from_millis(20)).await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn late_ack_after_timeout_is_dropped_silently() {
        let registry = AckRegistry::new();
        assert!(!registry.wait_for(1, Duration::from_millis(5)).await);
        // Arriving after the waiter gave up must not panic or leak.
        registry.deliver(1);
    }
}
