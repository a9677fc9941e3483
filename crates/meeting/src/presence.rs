//! Who is in the room and their microphone/camera flags
//!
//! Remote flags default to "unmuted, camera on" until the peer broadcasts
//! otherwise. An update for one peer never touches another peer's entry.

use crate::participant::{Participant, PeerId};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::watch;
use tracing::debug;

/// Ephemeral flags of one participant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceState {
    /// Microphone muted
    pub muted: bool,
    /// Camera off
    pub video_off: bool,
}

/// Consistent view for presentation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PresenceSnapshot {
    /// Participants currently in the room, local participant included
    pub roster: BTreeMap<PeerId, Participant>,
    /// Flags of remote participants that broadcast at least once
    pub states: BTreeMap<PeerId, PresenceState>,
}

impl PresenceSnapshot {
    /// Flags for a participant, defaulted when never broadcast
    pub fn state_of(&self, peer_id: &str) -> PresenceState {
        self.states.get(peer_id).copied().unwrap_or_default()
    }
}

/// Tracks roster membership and remote mute/camera flags
#[derive(Debug)]
pub struct PresenceSynchronizer {
    /// Participant details from the meeting directory, by id
    known: HashMap<PeerId, Participant>,
    roster: BTreeMap<PeerId, Participant>,
    remote_mute_states: HashMap<PeerId, bool>,
    remote_video_off_states: HashMap<PeerId, bool>,
    tx: watch::Sender<PresenceSnapshot>,
}

impl PresenceSynchronizer {
    /// Synchronizer seeded with participant details; nobody is present yet
    pub fn new(known: impl IntoIterator<Item = Participant>) -> Self {
        let (tx, _) = watch::channel(PresenceSnapshot::default());
        Self {
            known: known.into_iter().map(|p| (p.id.clone(), p)).collect(),
            roster: BTreeMap::new(),
            remote_mute_states: HashMap::new(),
            remote_video_off_states: HashMap::new(),
            tx,
        }
    }

    /// A participant entered the room; `false` if already present
    pub fn peer_joined(&mut self, peer_id: &str) -> bool {
        if self.roster.contains_key(peer_id) {
            return false;
        }
        let participant = self
            .known
            .get(peer_id)
            .cloned()
            .unwrap_or_else(|| Participant::from_id(peer_id));
        self.roster.insert(peer_id.to_string(), participant);
        self.publish();
        true
    }

    /// A participant left; their flags are forgotten
    pub fn peer_left(&mut self, peer_id: &str) {
        let was_present = self.roster.remove(peer_id).is_some();
        let had_mute = self.remote_mute_states.remove(peer_id).is_some();
        let had_video = self.remote_video_off_states.remove(peer_id).is_some();
        if was_present || had_mute || had_video {
            self.publish();
        }
    }

    /// Record a remote `mute-changed`
    pub fn apply_remote_mute(&mut self, peer_id: &str, muted: bool) {
        debug!("Peer {} muted={}", peer_id, muted);
        self.remote_mute_states.insert(peer_id.to_string(), muted);
        self.publish();
    }

    /// Record a remote `video-state-changed` (`true` = camera off)
    pub fn apply_remote_video(&mut self, peer_id: &str, video_off: bool) {
        debug!("Peer {} video_off={}", peer_id, video_off);
        self.remote_video_off_states
            .insert(peer_id.to_string(), video_off);
        self.publish();
    }

    /// Whether a peer is muted (default `false`)
    pub fn is_muted(&self, peer_id: &str) -> bool {
        self.remote_mute_states.get(peer_id).copied().unwrap_or(false)
    }

    /// Whether a peer's camera is off (default `false`)
    pub fn is_video_off(&self, peer_id: &str) -> bool {
        self.remote_video_off_states
            .get(peer_id)
            .copied()
            .unwrap_or(false)
    }

    /// Whether a participant is in the room
    pub fn is_present(&self, peer_id: &str) -> bool {
        self.roster.contains_key(peer_id)
    }

    /// Participants in the room
    pub fn roster(&self) -> impl Iterator<Item = &Participant> {
        self.roster.values()
    }

    /// Forget everyone
    pub fn clear(&mut self) {
        self.roster.clear();
        self.remote_mute_states.clear();
        self.remote_video_off_states.clear();
        self.publish();
    }

    /// Current snapshot
    pub fn snapshot(&self) -> PresenceSnapshot {
        self.tx.borrow().clone()
    }

    /// Watch snapshots
    pub fn subscribe(&self) -> watch::Receiver<PresenceSnapshot> {
        self.tx.subscribe()
    }

    fn publish(&self) {
        let mut states = BTreeMap::new();
        for id in self
            .remote_mute_states
            .keys()
            .chain(self.remote_video_off_states.keys())
        {
            states.insert(
                id.clone(),
                PresenceState {
                    muted: self.is_muted(id),
                    video_off: self.is_video_off(id),
                },
            );
        }

        self.tx.send_replace(PresenceSnapshot {
            roster: self.roster.clone(),
            states,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::ParticipantRole;

    #[test]
    fn test_defaults_before_any_broadcast() {
        let presence = PresenceSynchronizer::new(Vec::new());
        assert!(!presence.is_muted("b"));
        assert!(!presence.is_video_off("b"));
        assert_eq!(presence.snapshot().state_of("b"), PresenceState::default());
    }

    #[test]
    fn test_updates_are_isolated_per_peer() {
        let mut presence = PresenceSynchronizer::new(Vec::new());
        presence.peer_joined("a");
        presence.peer_joined("b");

        presence.apply_remote_mute("b", true);
        assert!(presence.is_muted("b"));
        assert!(!presence.is_muted("a"));
        assert!(!presence.is_video_off("b"));

        presence.apply_remote_video("a", true);
        let snap = presence.snapshot();
        assert_eq!(
            snap.state_of("a"),
            PresenceState {
                muted: false,
                video_off: true
            }
        );
        assert_eq!(
            snap.state_of("b"),
            PresenceState {
                muted: true,
                video_off: false
            }
        );
    }

    #[test]
    fn test_leave_forgets_flags() {
        let mut presence = PresenceSynchronizer::new(Vec::new());
        presence.peer_joined("b");
        presence.apply_remote_mute("b", true);
        presence.peer_left("b");

        assert!(!presence.is_present("b"));
        assert!(!presence.is_muted("b"));
        assert!(presence.snapshot().states.is_empty());
    }

    #[test]
    fn test_roster_uses_known_details() {
        let host = Participant {
            id: "h".to_string(),
            role: ParticipantRole::Host,
            display_name: "Recruiter".to_string(),
            avatar_image: None,
        };
        let mut presence = PresenceSynchronizer::new(vec![host]);
        let mut rx = presence.subscribe();

        assert!(presence.peer_joined("h"));
        assert!(!presence.peer_joined("h"));
        presence.peer_joined("guest");

        assert!(rx.has_changed().unwrap());
        let snap = rx.borrow_and_update().clone();
        assert_eq!(snap.roster["h"].display_name, "Recruiter");
        assert_eq!(snap.roster["guest"].display_name, "guest");
        assert_eq!(presence.roster().count(), 2);
    }
}
