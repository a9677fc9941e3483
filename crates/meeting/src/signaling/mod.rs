//! Signaling: room presence, negotiation relay and broadcast of presence flags

pub mod backoff;
pub mod channel;
pub mod client;
pub mod protocol;

pub use backoff::ReconnectionPolicy;
pub use channel::SignalingChannel;
pub use client::SignalingClient;
pub use protocol::{
    ClientEvent, IceCandidate, ServerEvent, SignalEnvelope, SignalPayload, SignalingEvent,
};
