//! The start gate: requests to most methods wait until the server's
//! controllers have finished starting.

use async_trait::async_trait;
use tokio::sync::watch;

/// A set-once signal the binder consults before dispatching.
#[async_trait]
pub trait StartSignal: Send + Sync {
    fn is_set(&self) -> bool;

    /// Resolve once the signal is set. Must be cancel-safe.
    async fn wait(&self);
}

/// [`StartSignal`] backed by a [`watch`] channel.
#[derive(Debug)]
pub struct StartGate {
    tx: watch::Sender<bool>,
}

impl StartGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Open the gate. Later calls are no-ops.
    pub fn set(&self) {
        self.tx.send_if_modified(|started| !std::mem::replace(started, true));
    }
}

impl Default for StartGate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StartSignal for StartGate {
    fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns once set.
        let _ = rx.wait_for(|started| *started).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_resolves_after_set() {
        let gate = Arc::new(StartGate::new());
        assert!(!gate.is_set());

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        gate.set();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(gate.is_set());
    }

    #[tokio::test]
    async fn wait_after_set_returns_immediately() {
        let gate = StartGate::new();
        gate.set();
        gate.set();
        tokio::time::timeout(Duration::from_millis(100), gate.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_is_cancellable() {
        let gate = StartGate::new();
        let timed_out = tokio::time::timeout(Duration::from_millis(10), gate.wait()).await;
        assert!(timed_out.is_err());
        gate.set();
        assert!(gate.is_set());
    }
}
