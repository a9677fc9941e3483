//! Live multi-party meeting core over a WebRTC mesh
//!
//! This crate turns a signaling channel and local camera/microphone access into
//! a full mesh of direct peer connections, keeps per-peer connection and
//! presence state consistent as participants join, leave, mute or turn their
//! camera off, and lets the host end the meeting for everyone.
//!
//! # Features
//!
//! - **Full mesh**: one WebRTC connection per remote participant (up to 16)
//! - **Explicit negotiation state machine**: offer/answer/ICE with candidate
//!   buffering, glare tie-break and stale-continuation filtering
//! - **Presence sync**: roster plus remote mute/camera-off flags
//! - **Host controls**: end-for-all and participant nudges
//! - **WebSocket signaling**: `{"event", "data"}` JSON frames with reconnection
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Presentation (snapshots via tokio::sync::watch)         │
//! │  ↑                                                        │
//! │  MeetingController (single event loop)                   │
//! │  ├─ LocalMediaSource (MediaDevices → LocalTrack)         │
//! │  ├─ PresenceSynchronizer (roster, mute/video flags)      │
//! │  ├─ PeerConnectionManager                                │
//! │  │   ├─ PeerTable (pure state machine)                   │
//! │  │   └─ PeerConnector → PeerTransport (webrtc-rs)        │
//! │  └─ SignalingChannel (WebSocket client)                  │
//! │     ↓                                                     │
//! │  Relay server  ·  MeetingDirectory (REST)                │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use meeting_mesh::MeetingConfig;
//!
//! let config = MeetingConfig {
//!     signaling_url: "wss://meet.example.com/ws".to_string(),
//!     max_peers: 6,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Async Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use meeting_mesh::{
//!     MeetingConfig, MeetingController, MeetingMetadata, RtcConnector, SampleTrackDevices,
//!     SignalingClient,
//! };
//!
//! # async fn example() -> meeting_mesh::Result<()> {
//! let config = MeetingConfig::default();
//! let (client, events) =
//!     SignalingClient::connect(&config.signaling_url, "cand-1", config.reconnection.clone())
//!         .await?;
//!
//! let mut controller = MeetingController::new(
//!     config.clone(),
//!     MeetingMetadata::ad_hoc("room-1", "recruiter-1"),
//!     "cand-1",
//!     Arc::new(SampleTrackDevices::default()),
//!     Arc::new(client),
//!     Arc::new(RtcConnector::new(&config)),
//! )?;
//! controller.join().await?;
//!
//! let (_commands_tx, commands) = tokio::sync::mpsc::unbounded_channel();
//! let reason = controller.run(events, commands).await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod directory;
pub mod error;
pub mod media;
pub mod participant;
pub mod peer;
pub mod presence;
pub mod session;
pub mod signaling;

pub use config::{MediaConstraints, MeetingConfig, TurnServerConfig};
pub use directory::{HttpMeetingDirectory, MeetingDirectory, MeetingMetadata, ScheduleStatus};
pub use error::{DeviceErrorKind, Error, Result};
pub use media::{
    LocalMediaSource, LocalMediaState, LocalTrack, MediaDevices, RemoteStream, RemoteTrack,
    SampleTrackDevices, TrackKind,
};
pub use participant::{Participant, ParticipantRole, PeerId, RoomId};
pub use peer::{
    PeerConnectionManager, PeerConnector, PeerNotice, PeerPhase, PeerSnapshot, PeerTransport,
    RtcConnector,
};
pub use presence::{PresenceSnapshot, PresenceState, PresenceSynchronizer};
pub use session::{
    EndReason, MeetingCommand, MeetingControls, MeetingController, MeetingSession, SessionStatus,
};
pub use signaling::{
    ClientEvent, ReconnectionPolicy, ServerEvent, SignalingChannel, SignalingClient,
    SignalingEvent,
};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(!ver.is_empty());
    }
}
