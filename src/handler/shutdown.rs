use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    signal: Arc<Notify>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shutdown(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        self.signal.notify_waiters();
    }

    pub fn is_shutdown(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Returns immediately when shutdown was already requested.
    pub async fn wait_for_shutdown(&self) {
        let notified = self.signal.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_shutdown() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn late_waiters_still_observe_shutdown() {
        let signal = ShutdownSignal::new();
        signal.shutdown();
        tokio::time::timeout(Duration::from_millis(100), signal.wait_for_shutdown())
            .await
            .expect("waiter registered after shutdown must return");
    }

    #[tokio::test]
    async fn wakes_pending_waiters() {
        let signal = ShutdownSignal::new();
        let waiter = tokio::spawn({
            let signal = signal.clone();
            async move { signal.wait_for_shutdown().await }
        });
        tokio::task::yield_now().await;
        signal.shutdown();
        tokio::time::timeout(Duration::from_millis(100), waiter).await.unwrap().unwrap();
    }
}
