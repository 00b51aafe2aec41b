//! Simple signaling primitives for worker coordination.
//!
//! Abstracts tokio's watch channels into signal types focused on coordination
//! events rather than data transfer. The processing worker uses a signal to
//! support forcing an immediate polling cycle without waiting for the next
//! scheduled tick.

use tokio::sync::watch;

/// Transmitter side of a coordination signal channel.
pub type SignalTx = watch::Sender<()>;

/// Receiver side of a coordination signal channel.
pub type SignalRx = watch::Receiver<()>;

/// Creates a new coordination signal channel.
///
/// All receivers observe the same signal simultaneously. A receiver sees only
/// signals sent after its creation; sends while nobody is waiting coalesce
/// into a single wakeup, which is the desired behavior for "poll now" nudges.
pub fn create_signal() -> (SignalTx, SignalRx) {
    let (tx, rx) = watch::channel(());
    (tx, rx)
}
