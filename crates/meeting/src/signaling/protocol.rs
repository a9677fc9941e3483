//! Signaling wire protocol
//!
//! Every frame is a JSON object `{"event": <name>, "data": {...}}` with
//! camelCase payload fields. [`ClientEvent`] is what this client emits,
//! [`ServerEvent`] is what the relay delivers.

use crate::participant::{PeerId, RoomId};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// ICE candidate in browser `RTCIceCandidateInit` JSON shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// Candidate attribute line
    pub candidate: String,

    /// Media stream identification tag
    #[serde(default)]
    pub sdp_mid: Option<String>,

    /// Index of the m-line the candidate belongs to
    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_m_line_index: Option<u16>,

    /// ICE username fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// Negotiation message body; opaque to everything but the peer transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalPayload {
    /// SDP offer
    Offer {
        /// Session description
        sdp: String,
    },
    /// SDP answer
    Answer {
        /// Session description
        sdp: String,
    },
    /// Trickled ICE candidate
    Candidate {
        /// The candidate
        candidate: IceCandidate,
    },
}

impl SignalPayload {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            SignalPayload::Offer { .. } => "offer",
            SignalPayload::Answer { .. } => "answer",
            SignalPayload::Candidate { .. } => "candidate",
        }
    }
}

/// Addressed negotiation message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalEnvelope {
    /// Sender
    pub from: PeerId,
    /// Recipient
    pub to: PeerId,
    /// Body
    pub payload: SignalPayload,
}

impl SignalEnvelope {
    /// Outbound wire event for this envelope (the relay stamps `from`)
    pub fn into_client_event(self) -> ClientEvent {
        ClientEvent::Signal {
            to: self.to,
            signal: self.payload,
        }
    }
}

/// Events sent by this client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    /// Announce presence in the room
    JoinMeeting {
        /// Room
        room_id: RoomId,
    },
    /// Voluntary departure
    LeaveMeeting {
        /// Room
        room_id: RoomId,
    },
    /// Directed negotiation message
    Signal {
        /// Recipient
        to: PeerId,
        /// Body
        signal: SignalPayload,
    },
    /// Broadcast local audio state
    MuteChanged {
        /// Whether the microphone is muted
        muted: bool,
        /// Room
        room_id: RoomId,
    },
    /// Broadcast local camera state
    VideoStateChanged {
        /// Whether the camera is off
        video_state: bool,
        /// Room
        room_id: RoomId,
    },
    /// Host only: terminate the meeting for everyone
    EndMeeting {
        /// Room
        room_id: RoomId,
    },
    /// Host only: point-to-point nudge
    NotifyParticipantMeeting {
        /// Participant to nudge
        participant_id: PeerId,
        /// Room
        room_id: RoomId,
    },
}

impl ClientEvent {
    /// Wire event name
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinMeeting { .. } => "join-meeting",
            ClientEvent::LeaveMeeting { .. } => "leave-meeting",
            ClientEvent::Signal { .. } => "signal",
            ClientEvent::MuteChanged { .. } => "mute-changed",
            ClientEvent::VideoStateChanged { .. } => "video-state-changed",
            ClientEvent::EndMeeting { .. } => "end-meeting",
            ClientEvent::NotifyParticipantMeeting { .. } => "notify-participant-meeting",
        }
    }

    /// Serialize to a JSON text frame
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Into::into)
    }
}

/// Events delivered by the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// A peer entered the room
    UserJoined {
        /// Peer
        user_id: PeerId,
    },
    /// A peer left the room
    UserLeft {
        /// Peer
        user_id: PeerId,
    },
    /// Inbound negotiation message
    Signal {
        /// Sender
        from: PeerId,
        /// Body
        signal: SignalPayload,
    },
    /// Peer microphone update
    MuteChanged {
        /// Peer
        user_id: PeerId,
        /// Whether the peer is muted
        muted: bool,
    },
    /// Peer camera update
    VideoStateChanged {
        /// Peer
        user_id: PeerId,
        /// Whether the peer's camera is off
        video_state: bool,
    },
    /// The host ended the meeting
    MeetingEnded {},
}

impl ServerEvent {
    /// Parse a JSON text frame
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::InvalidData(format!("Invalid signaling frame: {}", e)))
    }
}

/// What the signaling transport hands to the session loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingEvent {
    /// A relay event
    Server(ServerEvent),
    /// The channel dropped; existing media keeps flowing
    Disconnected {
        /// Why the channel dropped
        reason: String,
    },
    /// The channel is back after a drop
    Reconnected,
}

impl From<ServerEvent> for SignalingEvent {
    fn from(event: ServerEvent) -> Self {
        SignalingEvent::Server(event)
    }
}
