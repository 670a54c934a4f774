//! Cooperative cancellation for delayed tasks.
//!
//! A [`CancelToken`] is checked at resumption points only: before a burst,
//! and when a sleep ends. Cancelling never interrupts synchronous work.
//! Dropping the [`CancelHandle`] cancels too.

use std::time::Duration;

use tokio::sync::watch;

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once cancelled.
    pub async fn cancelled(&mut self) {
        // An error means the handle was dropped, which also cancels.
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Sleep for `duration` unless cancelled first. Returns `true` when the
    /// full duration elapsed and the token is still live.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_cancelled(),
            _ = self.cancelled() => false,
        }
    }
}
