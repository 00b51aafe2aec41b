//! Broadcast shutdown channel for worker coordination.
//!
//! A single shutdown signal terminates every subscribed worker. Workers only
//! observe the signal at state boundaries of their processing cycle, so the
//! only durable side effect at risk, the row delete that commits a batch, is
//! either fully applied or not applied at all.

use tokio::sync::watch;

/// Transmitter side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<()>);

impl ShutdownTx {
    /// Signals shutdown to all subscribed receivers.
    ///
    /// Fails when no receiver is listening anymore, which callers may safely
    /// ignore: it means all workers already terminated.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    /// Creates a new receiver subscribed to this channel.
    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Receiver side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<()>);

impl ShutdownRx {
    /// Completes when shutdown is signaled.
    ///
    /// Also completes when the transmitter is dropped, which is treated the
    /// same as an explicit shutdown so that orphaned workers never linger.
    pub async fn signaled(&mut self) {
        let _ = self.0.changed().await;
    }
}

/// Creates a new shutdown channel.
///
/// The channel carries no data; subscribers only care that the signal fired.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(tx), ShutdownRx(rx))
}
