//! In-memory relay standing in for the signaling server

use meeting_mesh::signaling::{ClientEvent, ServerEvent, SignalingChannel, SignalingEvent};
use meeting_mesh::{Error, PeerId, Result};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

#[derive(Default)]
struct HubState {
    members: BTreeSet<PeerId>,
    inboxes: HashMap<PeerId, VecDeque<SignalingEvent>>,
    sent: HashMap<PeerId, Vec<ClientEvent>>,
    offline: HashSet<PeerId>,
}

impl HubState {
    fn push(&mut self, to: &str, event: ServerEvent) {
        self.inboxes
            .entry(to.to_string())
            .or_default()
            .push_back(SignalingEvent::Server(event));
    }

    fn broadcast(&mut self, from: &str, event: ServerEvent) {
        let others: Vec<PeerId> = self
            .members
            .iter()
            .filter(|m| m.as_str() != from)
            .cloned()
            .collect();
        for member in others {
            self.push(&member, event.clone());
        }
    }
}

/// Room relay with the same routing rules as the real server: broadcasts go to
/// everyone but the sender, `signal` goes to the addressee only
#[derive(Default)]
pub struct SignalingHub {
    state: Mutex<HubState>,
}

impl SignalingHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Channel for one participant
    pub fn channel(self: &Arc<Self>, user_id: &str) -> Arc<HubChannel> {
        Arc::new(HubChannel {
            user_id: user_id.to_string(),
            hub: Arc::clone(self),
        })
    }

    /// Drain everything queued for `user_id`
    pub fn take_inbox(&self, user_id: &str) -> Vec<SignalingEvent> {
        self.state
            .lock()
            .inboxes
            .get_mut(user_id)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default()
    }

    /// Queue an arbitrary event for `user_id`
    pub fn deliver(&self, user_id: &str, event: SignalingEvent) {
        self.state
            .lock()
            .inboxes
            .entry(user_id.to_string())
            .or_default()
            .push_back(event);
    }

    /// Everything `user_id` sent, in order
    pub fn sent(&self, user_id: &str) -> Vec<ClientEvent> {
        self.state
            .lock()
            .sent
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// How many events named `name` (wire name) `user_id` sent
    pub fn sent_count(&self, user_id: &str, name: &str) -> usize {
        self.sent(user_id).iter().filter(|e| e.name() == name).count()
    }

    /// Participants currently in the room
    pub fn members(&self) -> Vec<PeerId> {
        self.state.lock().members.iter().cloned().collect()
    }

    /// Simulate the participant's socket going down or coming back
    ///
    /// A dropped socket leaves the room like the real server does: the others
    /// get `user-left`. Coming back online does not rejoin.
    pub fn set_online(&self, user_id: &str, online: bool) {
        let mut state = self.state.lock();
        if online {
            state.offline.remove(user_id);
            return;
        }
        state.offline.insert(user_id.to_string());
        if state.members.remove(user_id) {
            state.broadcast(
                user_id,
                ServerEvent::UserLeft {
                    user_id: user_id.to_string(),
                },
            );
        }
    }

    fn route(&self, from: &str, event: ClientEvent) -> Result<()> {
        let mut state = self.state.lock();
        if state.offline.contains(from) {
            return Err(Error::SignalingError(format!("{} is offline", from)));
        }
        state
            .sent
            .entry(from.to_string())
            .or_default()
            .push(event.clone());

        match event {
            ClientEvent::JoinMeeting { .. } => {
                state.members.insert(from.to_string());
                state.broadcast(
                    from,
                    ServerEvent::UserJoined {
                        user_id: from.to_string(),
                    },
                );
            }
            ClientEvent::LeaveMeeting { .. } => {
                state.members.remove(from);
                state.broadcast(
                    from,
                    ServerEvent::UserLeft {
                        user_id: from.to_string(),
                    },
                );
            }
            ClientEvent::Signal { to, signal } => {
                if state.members.contains(&to) {
                    state.push(
                        &to,
                        ServerEvent::Signal {
                            from: from.to_string(),
                            signal,
                        },
                    );
                }
            }
            ClientEvent::MuteChanged { muted, .. } => state.broadcast(
                from,
                ServerEvent::MuteChanged {
                    user_id: from.to_string(),
                    muted,
                },
            ),
            ClientEvent::VideoStateChanged { video_state, .. } => state.broadcast(
                from,
                ServerEvent::VideoStateChanged {
                    user_id: from.to_string(),
                    video_state,
                },
            ),
            ClientEvent::EndMeeting { .. } => state.broadcast(from, ServerEvent::MeetingEnded {}),
            ClientEvent::NotifyParticipantMeeting { .. } => {}
        }

        Ok(())
    }
}

/// One participant's view of the hub
pub struct HubChannel {
    user_id: PeerId,
    hub: Arc<SignalingHub>,
}

impl SignalingChannel for HubChannel {
    fn send(&self, event: ClientEvent) -> Result<()> {
        self.hub.route(&self.user_id, event)
    }

    fn is_connected(&self) -> bool {
        !self.hub.state.lock().offline.contains(&self.user_id)
    }
}
