//! # Shutdown Signalling
//!
//! A one-way, level-triggered stop signal built on a `tokio::sync::watch`
//! channel. Once triggered it stays triggered, so listeners that subscribe
//! late still observe it.

use std::sync::Arc;

use tokio::sync::watch;

/// Owner side of the stop signal. Clones share the same signal.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fires the signal. Repeated calls are harmless.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }
}

/// Listener side of the stop signal.
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal has fired. Never resolves if every
    /// `ShutdownSignal` handle is dropped without firing.
    pub async fn triggered(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
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
    async fn listener_wakes_on_trigger() {
        let signal = ShutdownSignal::new();
        let mut listener = signal.subscribe();

        let waiter = tokio::spawn(async move {
            listener.triggered().await;
        });

        signal.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("listener should wake")
            .unwrap();
        assert!(signal.is_triggered());
    }

    #[test]
    fn late_subscriber_sees_fired_signal() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        signal.trigger();

        let mut listener = signal.subscribe();
        assert!(listener.is_triggered());
        tokio_test::block_on(listener.triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn untriggered_listener_keeps_waiting() {
        let signal = ShutdownSignal::new();
        let mut listener = signal.subscribe();

        let result = tokio::time::timeout(Duration::from_millis(50), listener.triggered()).await;
        assert!(result.is_err());
    }
}
