//! Seams between the peer state machine and a concrete WebRTC stack

use super::state::{Generation, PeerInput};
use crate::media::{LocalTrack, RemoteTrack};
use crate::participant::PeerId;
use crate::signaling::IceCandidate;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Coarse connection state reported by a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Created, no ICE activity yet
    New,
    /// ICE/DTLS in progress
    Connecting,
    /// Media path established
    Connected,
    /// Path interrupted; may recover on its own
    Disconnected,
    /// Path failed permanently
    Failed,
    /// Closed by either side
    Closed,
}

impl TransportState {
    /// States after which the connection carries no more media
    pub fn is_terminal(self) -> bool {
        matches!(self, TransportState::Failed | TransportState::Closed)
    }
}

/// Asynchronous notification from a transport
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A local ICE candidate was gathered and must be trickled to the peer
    LocalCandidate(IceCandidate),
    /// Remote media arrived
    RemoteTrack(RemoteTrack),
    /// Connection state changed
    StateChanged(TransportState),
}

/// Where a transport reports its [`PeerEvent`]s
///
/// Each sink is bound to one connection generation, so events from a torn
/// down connection can be told apart from those of its replacement.
#[derive(Debug, Clone)]
pub struct PeerEventSink {
    peer_id: PeerId,
    generation: Generation,
    tx: mpsc::UnboundedSender<PeerInput>,
}

impl PeerEventSink {
    /// Bind a sink to one connection generation
    pub fn new(peer_id: PeerId, generation: Generation, tx: mpsc::UnboundedSender<PeerInput>) -> Self {
        Self {
            peer_id,
            generation,
            tx,
        }
    }

    /// Remote peer this sink reports for
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Connection generation this sink reports for
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Report an event; dropped silently once the session loop is gone
    pub fn emit(&self, event: PeerEvent) {
        let _ = self.tx.send(PeerInput::Transport {
            peer_id: self.peer_id.clone(),
            generation: self.generation,
            event,
        });
    }
}

/// One peer-to-peer media connection
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Attach a local track for sending
    async fn add_local_track(&self, track: Arc<LocalTrack>) -> Result<()>;

    /// Create an offer and set it as local description; returns the SDP
    async fn create_offer(&self) -> Result<String>;

    /// Apply a remote offer, create an answer and set it as local description;
    /// returns the answer SDP
    async fn accept_offer(&self, sdp: String) -> Result<String>;

    /// Apply the remote answer to our offer
    async fn apply_answer(&self, sdp: String) -> Result<()>;

    /// Add a remote ICE candidate; the remote description must already be set
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Close the connection; safe to call more than once
    async fn close(&self) -> Result<()>;
}

/// Factory for [`PeerTransport`]s
#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// Open a connection towards `peer_id`, reporting events to `events`
    async fn connect(&self, peer_id: &str, events: PeerEventSink) -> Result<Arc<dyn PeerTransport>>;
}
