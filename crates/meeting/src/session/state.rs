//! Meeting session aggregate

use crate::directory::{MeetingMetadata, ScheduleStatus};
use crate::participant::{Participant, ParticipantRole, PeerId, RoomId};
use serde::Serialize;

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndReason {
    /// Local participant left
    Left,
    /// Host ended the meeting (locally or remotely)
    HostEnded,
    /// Signaling channel gone for good
    ChannelLost,
    /// Process/page going away
    Unloaded,
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "status", content = "reason")]
pub enum SessionStatus {
    /// Device check; nothing announced yet
    PreJoin,
    /// Media acquired, join being announced
    Joining,
    /// In the room
    Joined,
    /// Terminal
    Ended(EndReason),
}

impl SessionStatus {
    /// Terminal state reached
    pub fn is_ended(self) -> bool {
        matches!(self, SessionStatus::Ended(_))
    }
}

/// Which controls the presentation layer should offer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingControls {
    /// Microphone toggle
    pub toggle_audio: bool,
    /// Camera toggle
    pub toggle_video: bool,
    /// Leave button
    pub leave: bool,
    /// End the meeting for everyone (host only)
    pub end_for_all: bool,
    /// Nudge a participant (host only)
    pub notify_participant: bool,
}

/// Aggregate root of one meeting as seen by the local participant
#[derive(Debug, Clone)]
pub struct MeetingSession {
    /// Room
    pub room_id: RoomId,
    /// Host participant id
    pub host_id: PeerId,
    /// Local participant
    pub local: Participant,
    /// Directory scheduling status at construction
    pub schedule: ScheduleStatus,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Signaling is down; existing media continues
    pub degraded: bool,
}

impl MeetingSession {
    /// Session for `local_id` in the meeting described by `metadata`
    ///
    /// The local role is derived from `hostId`, whatever the roster says.
    pub fn new(metadata: &MeetingMetadata, local_id: &str) -> Self {
        let mut local = metadata
            .participants
            .iter()
            .find(|p| p.id == local_id)
            .cloned()
            .unwrap_or_else(|| Participant::from_id(local_id));
        local.role = if local_id == metadata.host_id {
            ParticipantRole::Host
        } else {
            ParticipantRole::Attendee
        };

        Self {
            room_id: metadata.room_id.clone(),
            host_id: metadata.host_id.clone(),
            local,
            schedule: metadata.status,
            status: SessionStatus::PreJoin,
            degraded: false,
        }
    }

    /// Local participant is the host
    pub fn is_host(&self) -> bool {
        self.local.id == self.host_id
    }

    /// In the room
    pub fn is_joined(&self) -> bool {
        self.status == SessionStatus::Joined
    }

    /// Controls to show for the current status and role
    pub fn available_controls(&self) -> MeetingControls {
        match self.status {
            SessionStatus::PreJoin => MeetingControls {
                toggle_audio: true,
                toggle_video: true,
                ..Default::default()
            },
            SessionStatus::Joined => MeetingControls {
                toggle_audio: true,
                toggle_video: true,
                leave: true,
                end_for_all: self.is_host(),
                notify_participant: self.is_host(),
            },
            SessionStatus::Joining | SessionStatus::Ended(_) => MeetingControls::default(),
        }
    }
}
