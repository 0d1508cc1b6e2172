//! Shutdown on SIGTERM / SIGINT (Ctrl+C elsewhere).

use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Turns process signals into a shutdown flag.
#[derive(Debug)]
pub struct SignalHandler {
    tx: watch::Sender<bool>,
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHandler {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Starts listening for signals in a background task.
    #[cfg(unix)]
    pub fn spawn_listener(&self) {
        use tokio::signal::unix::{SignalKind, signal};

        let tx = self.tx.clone();
        tokio::spawn(async move {
            let (mut sigterm, mut sigint) =
                match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                    (Ok(term), Ok(int)) => (term, int),
                    (Err(e), _) | (_, Err(e)) => {
                        warn!(error = %e, "could not install signal handlers");
                        return;
                    }
                };

            let name = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            };
            info!(signal = name, "shutting down");
            tx.send_replace(true);
            debug!("signal listener stopped");
        });
    }

    #[cfg(not(unix))]
    pub fn spawn_listener(&self) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!(signal = "Ctrl+C", "shutting down");
                    tx.send_replace(true);
                }
                Err(e) => warn!(error = %e, "could not listen for Ctrl+C"),
            }
        });
    }

    /// Future resolving once shutdown was requested.
    pub fn shutdown(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    /// Requests shutdown without a signal.
    pub fn trigger_shutdown(&self) {
        self.tx.send_replace(true);
    }
}

/// Resolves when shutdown was requested or the handler is gone.
#[derive(Debug)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub async fn wait(mut self) {
        let _ = self.rx.wait_for(|requested| *requested).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_resolves_pending_waiters() {
        let handler = SignalHandler::new();
        let waiter = tokio::spawn(handler.shutdown().wait());

        assert!(!handler.is_shutdown());
        handler.trigger_shutdown();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(handler.is_shutdown());
    }

    #[tokio::test]
    async fn late_waiter_resolves_immediately() {
        let handler = SignalHandler::new();
        handler.trigger_shutdown();

        tokio::time::timeout(Duration::from_millis(100), handler.shutdown().wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dropping_handler_releases_waiters() {
        let handler = SignalHandler::new();
        let signal = handler.shutdown();
        drop(handler);

        tokio::time::timeout(Duration::from_millis(100), signal.wait())
            .await
            .unwrap();
    }
}
