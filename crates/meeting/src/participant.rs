//! Participant identity

use serde::{Deserialize, Serialize};

/// Stable participant identifier, unique within a meeting
pub type PeerId = String;

/// Meeting room identifier
pub type RoomId = String;

/// Role of a participant in the meeting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    /// May end the meeting for everyone and nudge participants
    Host,
    /// Regular participant
    #[default]
    Attendee,
}

/// A participant known to the room
///
/// Immutable for the lifetime of the session; ephemeral mute/camera flags are
/// tracked separately by [`crate::presence::PresenceSynchronizer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Participant identifier
    pub id: PeerId,

    /// Host or attendee
    #[serde(default)]
    pub role: ParticipantRole,

    /// Name shown on the participant's tile
    pub display_name: String,

    /// Optional avatar image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_image: Option<String>,
}

impl Participant {
    /// Participant announced only by id (e.g. via `user-joined` before the
    /// roster knew about them)
    pub fn from_id(id: impl Into<PeerId>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            role: ParticipantRole::Attendee,
            avatar_image: None,
        }
    }

    /// Whether this participant is the host
    pub fn is_host(&self) -> bool {
        self.role == ParticipantRole::Host
    }
}
