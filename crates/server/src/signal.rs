//! Shutdown signal handling.
//!
//! SIGINT and SIGTERM are turned into a broadcast so the MCP loop and any
//! other task can stop and let sessions be shut down cleanly.

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast;
use tracing::{error, info};

/// Broadcasts a shutdown notification when SIGINT or SIGTERM arrives.
pub struct SignalHandler {
    shutdown_sender: broadcast::Sender<()>,
}

impl SignalHandler {
    /// Create a handler and a first receiver.
    ///
    /// Signals are not listened for until [`SignalHandler::run`] is spawned.
    pub fn new() -> (Self, broadcast::Receiver<()>) {
        let (shutdown_sender, shutdown_receiver) = broadcast::channel(1);
        (Self { shutdown_sender }, shutdown_receiver)
    }

    /// Another receiver for shutdown notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_sender.subscribe()
    }

    /// Notify subscribers without a signal.
    pub fn trigger(&self) {
        let _ = self.shutdown_sender.send(());
    }

    /// Wait for SIGINT or SIGTERM, then notify subscribers.
    pub async fn run(self) {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to register SIGTERM handler: {}", e);
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to register SIGINT handler: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating shutdown"),
        }

        self.trigger();
    }
}
