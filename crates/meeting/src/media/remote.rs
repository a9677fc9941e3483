//! Media received from remote peers

use super::TrackKind;
use std::sync::Arc;
use webrtc::track::track_remote::TrackRemote;

/// One inbound track
#[derive(Clone)]
pub struct RemoteTrack {
    /// Track id as announced by the sender
    pub id: String,
    /// Audio or video
    pub kind: TrackKind,
    /// Sender-side stream id
    pub stream_id: String,
    /// Live RTP source; absent for tracks not backed by a real connection
    pub handle: Option<Arc<TrackRemote>>,
}

impl RemoteTrack {
    /// Track description without a live RTP source
    pub fn detached(id: impl Into<String>, kind: TrackKind, stream_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            stream_id: stream_id.into(),
            handle: None,
        }
    }
}

impl std::fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("stream_id", &self.stream_id)
            .field("live", &self.handle.is_some())
            .finish()
    }
}

impl PartialEq for RemoteTrack {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.kind == other.kind && self.stream_id == other.stream_id
    }
}

/// Everything received from one peer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteStream {
    /// Tracks in arrival order
    pub tracks: Vec<RemoteTrack>,
}

impl RemoteStream {
    /// Add a track; a repeated id replaces the earlier one
    pub fn add_track(&mut self, track: RemoteTrack) {
        match self.tracks.iter_mut().find(|t| t.id == track.id) {
            Some(existing) => *existing = track,
            None => self.tracks.push(track),
        }
    }

    /// No tracks received yet
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// At least one audio track
    pub fn has_audio(&self) -> bool {
        self.tracks.iter().any(|t| t.kind == TrackKind::Audio)
    }

    /// At least one video track
    pub fn has_video(&self) -> bool {
        self.tracks.iter().any(|t| t.kind == TrackKind::Video)
    }
}
