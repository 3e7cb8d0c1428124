//! Cooperative cancellation shared by every pipeline stage.
//!
//! A [`CancelSignal`] is a one-way latch broadcast over a `tokio::sync::watch`
//! channel: once [`CancelSignal::cancel`] is called every clone observes it,
//! both through the cheap [`CancelSignal::is_cancelled`] check and through the
//! awaitable [`CancelSignal::cancelled`] future used in `select!` arms.
//! Nothing is ever forcibly aborted; stages check the signal at their
//! suspension points and release what they own.
//!
//! Timeouts are just cancellations triggered by a timer
//! ([`CancelSignal::cancel_after`]).

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Broadcast cancellation latch. Cloning is cheap; all clones share state.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal has fired (immediately if it already has).
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as any clone of `self`, so this only
        // returns `Err` if the latch can never fire; park forever then.
        let closed = rx.wait_for(|fired| *fired).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }

    /// Fire the signal after `timeout` unless it fired earlier.
    ///
    /// Must be called from within a tokio runtime.
    pub fn cancel_after(&self, timeout: Duration) -> tokio::task::JoinHandle<()> {
        let signal = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = signal.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    tracing::info!(timeout_ms = timeout.as_millis() as u64, "deadline reached; cancelling");
                    signal.cancel();
                }
            }
        })
    }

    /// Guard that fires this signal when dropped unless disarmed.
    pub fn drop_guard(&self) -> CancelOnDrop {
        CancelOnDrop {
            signal: Some(self.clone()),
        }
    }
}

/// Fires its [`CancelSignal`] on drop.
///
/// The HTTP handler holds one so that a client disconnect, which drops the
/// handler future, also stops the worker tasks it spawned.
#[derive(Debug)]
pub struct CancelOnDrop {
    signal: Option<CancelSignal>,
}

impl CancelOnDrop {
    /// Consume the guard without firing.
    pub fn disarm(mut self) {
        self.signal = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(signal) = self.signal.take() {
            signal.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unset_and_latches() {
        let signal = CancelSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_cancelled());
        signal.cancel();
        assert!(clone.is_cancelled());
        signal.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves_for_all_clones() {
        let signal = CancelSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        signal.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .expect("task should not panic");
    }

    #[tokio::test]
    async fn cancel_after_fires() {
        let signal = CancelSignal::new();
        signal.cancel_after(Duration::from_millis(10));
        tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
            .await
            .expect("deadline should cancel");
        assert!(signal.is_cancelled());
    }

    #[test]
    fn drop_guard_cancels_unless_disarmed() {
        let signal = CancelSignal::new();
        signal.drop_guard().disarm();
        assert!(!signal.is_cancelled());
        drop(signal.drop_guard());
        assert!(signal.is_cancelled());
    }
}
