//! Process-wide cancellation signal
//!
//! One [`ShutdownTrigger`] fires; any number of cloned [`Shutdown`] observers
//! see it. The bus read loop and every handler loop hold an observer.

use tokio::sync::watch;

/// Fires the cancellation signal
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Observes the cancellation signal
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Create a connected trigger/observer pair
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    /// Signal every observer. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// A new observer of this trigger
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

impl Shutdown {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is signalled.
    ///
    /// A dropped trigger counts as cancellation: nothing could cancel later.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_all_observers() {
        let (trigger, shutdown) = channel();
        let mut a = shutdown.clone();
        let mut b = trigger.subscribe();

        assert!(!a.is_cancelled());
        trigger.cancel();

        tokio::time::timeout(Duration::from_secs(1), a.cancelled()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), b.cancelled()).await.unwrap();
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_trigger_counts_as_cancelled() {
        let (trigger, mut shutdown) = channel();
        drop(trigger);

        tokio::time::timeout(Duration::from_secs(1), shutdown.cancelled()).await.unwrap();
    }

    #[tokio::test]
    async fn test_pending_until_cancel() {
        let (_trigger, mut shutdown) = channel();

        let waited = tokio::time::timeout(Duration::from_millis(20), shutdown.cancelled()).await;
        assert!(waited.is_err());
    }
}
