//! Local capture and remote media

pub mod devices;
pub mod local;
pub mod remote;

pub use devices::{MediaDevices, SampleTrackDevices};
pub use local::{LocalMediaSource, LocalMediaState, LocalStream, LocalTrack, OPUS_SILENCE_FRAME};
pub use remote::{RemoteStream, RemoteTrack};

use serde::{Deserialize, Serialize};
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

/// Media kind of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    /// Microphone / audio
    Audio,
    /// Camera / video
    Video,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

impl TrackKind {
    /// Map a WebRTC codec type; `None` for unspecified
    pub fn from_codec_type(codec_type: RTPCodecType) -> Option<Self> {
        match codec_type {
            RTPCodecType::Audio => Some(TrackKind::Audio),
            RTPCodecType::Video => Some(TrackKind::Video),
            _ => None,
        }
    }
}
