use std::sync::Arc;
use tokio::sync::watch;

/// Cooperative cancellation handle for one scan. Clones share state.
#[derive(Clone, Debug)]
pub struct ScanCancel {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ScanCancel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanCancel {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel()` has been called (immediately if it already was).
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                // Sender gone: cancellation can no longer happen.
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let cancel = ScanCancel::new();
        assert!(!cancel.is_cancelled());

        let waiter = {
            let c = cancel.clone();
            tokio::spawn(async move { c.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn already_cancelled_resolves_immediately() {
        let cancel = ScanCancel::new();
        cancel.cancel();
        tokio::time::timeout(Duration::from_millis(100), cancel.cancelled())
            .await
            .unwrap();
    }
}
