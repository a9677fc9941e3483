//! Scripted peer transports
//!
//! A fake transport behaves like a browser connection in the ways the state
//! machine cares about: adding a candidate before the remote description is an
//! error, and remote media shows up once the remote description is set and a
//! remote candidate gave it a path.

use async_trait::async_trait;
use meeting_mesh::peer::{PeerConnector, PeerEvent, PeerEventSink, PeerTransport};
use meeting_mesh::signaling::IceCandidate;
use meeting_mesh::{Error, LocalTrack, RemoteTrack, Result, TrackKind};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct FakeState {
    local_tracks: usize,
    remote_description_set: bool,
    candidates: Vec<IceCandidate>,
    rejected_candidates: usize,
    media_emitted: bool,
    closed: bool,
}

pub struct FakeTransport {
    pub peer_id: String,
    sink: PeerEventSink,
    silent: bool,
    state: Mutex<FakeState>,
}

impl FakeTransport {
    pub fn generation(&self) -> u64 {
        self.sink.generation()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn local_tracks(&self) -> usize {
        self.state.lock().local_tracks
    }

    pub fn applied_candidates(&self) -> usize {
        self.state.lock().candidates.len()
    }

    pub fn rejected_candidates(&self) -> usize {
        self.state.lock().rejected_candidates
    }

    fn local_candidate(&self) -> IceCandidate {
        IceCandidate {
            candidate: format!(
                "candidate:{} 1 udp 2122260223 192.0.2.1 50000 typ host",
                self.sink.generation()
            ),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
            username_fragment: None,
        }
    }

    fn maybe_emit_media(&self) {
        let mut state = self.state.lock();
        if self.silent
            || state.closed
            || state.media_emitted
            || !state.remote_description_set
            || state.candidates.is_empty()
        {
            return;
        }
        state.media_emitted = true;
        drop(state);

        let stream_id = format!("stream-{}", self.peer_id);
        self.sink.emit(PeerEvent::RemoteTrack(RemoteTrack::detached(
            format!("audio-{}", self.peer_id),
            TrackKind::Audio,
            stream_id.clone(),
        )));
        self.sink.emit(PeerEvent::RemoteTrack(RemoteTrack::detached(
            format!("video-{}", self.peer_id),
            TrackKind::Video,
            stream_id,
        )));
    }
}

#[async_trait]
impl PeerTransport for FakeTransport {
    async fn add_local_track(&self, _track: Arc<LocalTrack>) -> Result<()> {
        self.state.lock().local_tracks += 1;
        Ok(())
    }

    async fn create_offer(&self) -> Result<String> {
        self.sink
            .emit(PeerEvent::LocalCandidate(self.local_candidate()));
        Ok(format!("v=0 offer to {}", self.peer_id))
    }

    async fn accept_offer(&self, sdp: String) -> Result<String> {
        if !sdp.starts_with("v=0") {
            return Err(Error::SdpError(format!("unparseable offer: {}", sdp)));
        }
        self.state.lock().remote_description_set = true;
        self.sink
            .emit(PeerEvent::LocalCandidate(self.local_candidate()));
        Ok(format!("v=0 answer to {}", self.peer_id))
    }

    async fn apply_answer(&self, _sdp: String) -> Result<()> {
        self.state.lock().remote_description_set = true;
        self.maybe_emit_media();
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        {
            let mut state = self.state.lock();
            if !state.remote_description_set {
                state.rejected_candidates += 1;
                return Err(Error::IceCandidateError(
                    "remote description not set".to_string(),
                ));
            }
            state.candidates.push(candidate);
        }
        self.maybe_emit_media();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}

/// Creates [`FakeTransport`]s and remembers all of them
#[derive(Default)]
pub struct FakeConnector {
    /// Transports never produce remote media
    silent: bool,
    opened: Mutex<Vec<Arc<FakeTransport>>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn silent() -> Arc<Self> {
        Arc::new(Self {
            silent: true,
            ..Default::default()
        })
    }

    /// Every transport opened towards `peer_id`, oldest first
    pub fn opened_for(&self, peer_id: &str) -> Vec<Arc<FakeTransport>> {
        self.opened
            .lock()
            .iter()
            .filter(|t| t.peer_id == peer_id)
            .cloned()
            .collect()
    }

    /// Transports not yet closed
    pub fn live(&self) -> Vec<Arc<FakeTransport>> {
        self.opened
            .lock()
            .iter()
            .filter(|t| !t.is_closed())
            .cloned()
            .collect()
    }

    pub fn total_opened(&self) -> usize {
        self.opened.lock().len()
    }
}

#[async_trait]
impl PeerConnector for FakeConnector {
    async fn connect(&self, peer_id: &str, events: PeerEventSink) -> Result<Arc<dyn PeerTransport>> {
        let transport = Arc::new(FakeTransport {
            peer_id: peer_id.to_string(),
            sink: events,
            silent: self.silent,
            state: Mutex::new(FakeState::default()),
        });
        self.opened.lock().push(transport.clone());
        Ok(transport)
    }
}
