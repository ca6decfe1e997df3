use std::time::Duration;
use tokio::sync::watch;

/// Latched outcome bits for one connect episode
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Latch {
    pub connected: bool,
    pub failed: bool,
}

/// Dual-flag signal raised by the dispatcher and awaited by `connect`.
///
/// Bits stay set until [`OutcomeSignals::clear`]; raising never clears.
#[derive(Debug)]
pub struct OutcomeSignals {
    tx: watch::Sender<Latch>,
}

impl Default for OutcomeSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl OutcomeSignals {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Latch::default());
        Self { tx }
    }

    pub fn clear(&self) {
        self.tx.send_replace(Latch::default());
    }

    pub fn raise_connected(&self) {
        self.tx.send_modify(|latch| latch.connected = true);
    }

    pub fn raise_failed(&self) {
        self.tx.send_modify(|latch| latch.failed = true);
    }

    pub fn snapshot(&self) -> Latch {
        *self.tx.borrow()
    }

    /// Wait until either bit is latched, or `timeout` elapses (`None`)
    pub async fn wait_any(&self, timeout: Duration) -> Option<Latch> {
        let mut rx = self.tx.subscribe();
        let wait = rx.wait_for(|latch| latch.connected || latch.failed);
        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(latch)) => Some(*latch),
            // The sender lives in `self`, so the channel cannot close while we wait
            Ok(Err(_)) => None,
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn wait_returns_as_soon_as_a_bit_latches() {
        let signals = Arc::new(OutcomeSignals::new());
        let raiser = signals.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            raiser.raise_failed();
        });

        let latch = signals.wait_any(Duration::from_secs(5)).await.unwrap();
        assert!(latch.failed);
        assert!(!latch.connected);
    }

    #[tokio::test(start_paused = true)]
    async fn latched_bits_survive_until_cleared() {
        let signals = OutcomeSignals::new();
        signals.raise_connected();

        // Raised before anyone waited: still observed
        let latch = signals.wait_any(Duration::from_secs(1)).await.unwrap();
        assert!(latch.connected);

        signals.clear();
        assert_eq!(signals.snapshot(), Latch::default());
        assert!(signals.wait_any(Duration::from_secs(1)).await.is_none());
    }
}
