// External crates
use tokio::signal;
use tokio::sync::broadcast;

/// Global shutdown fan-out, built on a broadcast channel.
///
/// - each long-running component calls `.subscribe()` for its own receiver
/// - `.trigger()` notifies every subscriber at once
///
/// Cancellation is cooperative: the pipeline only observes the signal at the
/// point control returns to its line-consumption loop.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// A small buffer is sufficient since only one message is ever sent.
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(16);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Spawn the Ctrl+C listener; the user interrupt is the pipeline's sole
    /// defined clean-shutdown trigger besides end of the log stream.
    pub fn spawn_signal_listener(&self) {
        let shutdown = self.clone();
        tokio::spawn(async move {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
                return;
            }
            tracing::info!("Ctrl+C detected, broadcasting shutdown");
            shutdown.trigger();
        });
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
