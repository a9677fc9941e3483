//! Outbound side of the signaling channel

use super::protocol::ClientEvent;
use crate::Result;

/// Ordered, best-effort transport for outbound [`ClientEvent`]s
///
/// `send` only queues; it never blocks, which lets teardown paths (including
/// process unload) notify the room synchronously. Inbound events are delivered
/// separately as a stream of [`super::SignalingEvent`].
pub trait SignalingChannel: Send + Sync {
    /// Queue an event for delivery
    ///
    /// Fails with [`crate::Error::SignalingError`] while the channel is down.
    fn send(&self, event: ClientEvent) -> Result<()>;

    /// Whether the underlying socket is currently up
    fn is_connected(&self) -> bool;
}
