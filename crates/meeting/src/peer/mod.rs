//! Peer connections: one WebRTC connection per remote participant

pub mod manager;
pub mod rtc;
pub mod state;
pub mod transport;

pub use manager::PeerConnectionManager;
pub use rtc::{RtcConnector, RtcPeerTransport};
pub use state::{
    Generation, NegotiationRole, PeerEntry, PeerInput, PeerNotice, PeerPhase, PeerSnapshot,
    PeerTable, PeerView,
};
pub use transport::{PeerConnector, PeerEvent, PeerEventSink, PeerTransport, TransportState};
