//! Per-peer negotiation state machine
//!
//! [`PeerTable::apply`] consumes one [`PeerInput`] and returns the
//! [`PeerEffect`]s the driver must perform. The table does no I/O; results of
//! effects come back as further inputs tagged with the connection
//! [`Generation`] they belong to, so continuations of a torn down connection
//! are recognised and dropped.
//!
//! Per remote peer there is at most one live entry:
//!
//! ```text
//!   (absent) --user-joined--> Connecting/Initiator --first remote track--> Connected
//!   (absent) --offer--------> Connecting/Responder --first remote track--> Connected
//!   any ------failure/timeout/user-left--> (absent, tombstoned)
//! ```
//!
//! A tombstone suppresses stray offers and candidates from a closed peer until
//! a fresh `user-joined` for it arrives.

use super::transport::{PeerEvent, TransportState};
use crate::media::{RemoteStream, RemoteTrack};
use crate::participant::PeerId;
use crate::signaling::{IceCandidate, SignalEnvelope, SignalPayload};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::{debug, info, warn};

/// Connection incarnation counter
pub type Generation = u64;

/// Candidates kept per unknown peer before an offer arrives
const MAX_EARLY_CANDIDATES: usize = 64;

/// Closed peers remembered; the oldest is forgotten first
const MAX_TOMBSTONES: usize = 256;

/// Which side sends the offer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationRole {
    /// We were already in the room and offer to the newcomer
    Initiator,
    /// We answer an offer
    Responder,
}

/// Lifecycle phase of a live entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerPhase {
    /// Negotiating; no remote media yet
    Connecting,
    /// Remote media received
    Connected,
}

/// How a freshly opened transport should negotiate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Negotiation {
    /// Create and send an offer
    Offer,
    /// Answer the given offer
    Answer {
        /// Remote offer SDP
        offer_sdp: String,
    },
}

/// Inputs to [`PeerTable::apply`]
#[derive(Debug, Clone)]
pub enum PeerInput {
    /// `user-joined` for a remote peer
    Joined(PeerId),
    /// `user-left` for a remote peer
    Left(PeerId),
    /// Inbound negotiation message
    Signal {
        /// Sender
        from: PeerId,
        /// Body
        payload: SignalPayload,
    },
    /// Local offer created and set
    OfferCreated {
        /// Peer
        peer_id: PeerId,
        /// Connection generation
        generation: Generation,
        /// Offer SDP
        sdp: String,
    },
    /// Remote offer applied, local answer created and set
    AnswerCreated {
        /// Peer
        peer_id: PeerId,
        /// Connection generation
        generation: Generation,
        /// Answer SDP
        sdp: String,
    },
    /// Remote answer applied
    AnswerApplied {
        /// Peer
        peer_id: PeerId,
        /// Connection generation
        generation: Generation,
    },
    /// Opening or negotiating the transport failed
    NegotiationFailed {
        /// Peer
        peer_id: PeerId,
        /// Connection generation
        generation: Generation,
        /// Failure detail
        reason: String,
    },
    /// Asynchronous transport notification
    Transport {
        /// Peer
        peer_id: PeerId,
        /// Connection generation
        generation: Generation,
        /// What happened
        event: PeerEvent,
    },
    /// Connect timer fired
    ConnectTimeout {
        /// Peer
        peer_id: PeerId,
        /// Connection generation
        generation: Generation,
    },
    /// Close every connection and forget all per-peer bookkeeping
    Reset,
}

/// User-visible outcome of a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerNotice {
    /// First remote media arrived
    Connected(PeerId),
    /// Connection closed because of failure or timeout
    Lost {
        /// Peer
        peer_id: PeerId,
        /// Failure detail
        reason: String,
    },
    /// Connection not attempted
    Refused {
        /// Peer
        peer_id: PeerId,
        /// Why
        reason: String,
    },
}

/// Work for the driver
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEffect {
    /// Create a transport, attach local tracks, then negotiate
    Open {
        /// Peer
        peer_id: PeerId,
        /// Connection generation
        generation: Generation,
        /// Offer or answer
        negotiation: Negotiation,
    },
    /// Apply the remote answer
    ApplyAnswer {
        /// Peer
        peer_id: PeerId,
        /// Connection generation
        generation: Generation,
        /// Answer SDP
        sdp: String,
    },
    /// Add remote candidates in order
    AddCandidates {
        /// Peer
        peer_id: PeerId,
        /// Connection generation
        generation: Generation,
        /// Candidates
        candidates: Vec<IceCandidate>,
    },
    /// Relay a negotiation message
    Send(SignalEnvelope),
    /// Close the transport of this generation
    Close {
        /// Peer
        peer_id: PeerId,
        /// Connection generation
        generation: Generation,
    },
    /// Start the connect timer
    ArmTimeout {
        /// Peer
        peer_id: PeerId,
        /// Connection generation
        generation: Generation,
    },
    /// Surface a notice to the application
    Notify(PeerNotice),
}

/// Live connection bookkeeping for one remote peer
#[derive(Debug, Clone)]
pub struct PeerEntry {
    /// Connection incarnation
    pub generation: Generation,
    /// Offer or answer side
    pub role: NegotiationRole,
    /// Lifecycle phase
    pub phase: PeerPhase,
    /// Offer sent (initiator only)
    pub offer_sent: bool,
    /// Remote description applied; candidates may be added directly
    pub remote_description_set: bool,
    /// Remote candidates waiting for the remote description
    pub pending_candidates: Vec<IceCandidate>,
    /// Transport reported an established path
    pub transport_up: bool,
    /// Media received from the peer
    pub remote_stream: RemoteStream,
}

impl PeerEntry {
    fn new(generation: Generation, role: NegotiationRole) -> Self {
        Self {
            generation,
            role,
            phase: PeerPhase::Connecting,
            offer_sent: false,
            remote_description_set: false,
            pending_candidates: Vec::new(),
            transport_up: false,
            remote_stream: RemoteStream::default(),
        }
    }
}

/// Read-only view of one entry
#[derive(Debug, Clone, PartialEq)]
pub struct PeerView {
    /// Offer or answer side
    pub role: NegotiationRole,
    /// Lifecycle phase
    pub phase: PeerPhase,
    /// Connection incarnation
    pub generation: Generation,
    /// Media received from the peer
    pub remote_stream: RemoteStream,
}

/// Consistent snapshot of every live connection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeerSnapshot {
    /// Live entries by peer id
    pub peers: BTreeMap<PeerId, PeerView>,
}

impl PeerSnapshot {
    /// Remote stream for a peer, if connected or connecting
    pub fn remote_stream(&self, peer_id: &str) -> Option<&RemoteStream> {
        self.peers.get(peer_id).map(|p| &p.remote_stream)
    }

    /// Number of entries in the connected phase
    pub fn connected_count(&self) -> usize {
        self.peers
            .values()
            .filter(|p| p.phase == PeerPhase::Connected)
            .count()
    }
}

/// Per-peer connection state for the whole mesh
#[derive(Debug)]
pub struct PeerTable {
    local_id: PeerId,
    max_peers: usize,
    entries: HashMap<PeerId, PeerEntry>,
    tombstones: HashSet<PeerId>,
    tombstone_order: VecDeque<PeerId>,
    early_candidates: HashMap<PeerId, Vec<IceCandidate>>,
    next_generation: Generation,
}

impl PeerTable {
    /// Empty table for the local participant
    pub fn new(local_id: impl Into<PeerId>, max_peers: usize) -> Self {
        Self {
            local_id: local_id.into(),
            max_peers,
            entries: HashMap::new(),
            tombstones: HashSet::new(),
            tombstone_order: VecDeque::new(),
            early_candidates: HashMap::new(),
            next_generation: 1,
        }
    }

    /// Local participant id
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Live entry for a peer
    pub fn entry(&self, peer_id: &str) -> Option<&PeerEntry> {
        self.entries.get(peer_id)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No live entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a closed peer is still being ignored
    pub fn is_tombstoned(&self, peer_id: &str) -> bool {
        self.tombstones.contains(peer_id)
    }

    /// Candidates buffered for a peer that has no entry yet
    pub fn early_candidate_count(&self, peer_id: &str) -> usize {
        self.early_candidates.get(peer_id).map_or(0, Vec::len)
    }

    /// Snapshot of all live entries
    pub fn snapshot(&self) -> PeerSnapshot {
        PeerSnapshot {
            peers: self
                .entries
                .iter()
                .map(|(id, e)| {
                    (
                        id.clone(),
                        PeerView {
                            role: e.role,
                            phase: e.phase,
                            generation: e.generation,
                            remote_stream: e.remote_stream.clone(),
                        },
                    )
                })
                .collect(),
        }
    }

    /// Apply one input
    pub fn apply(&mut self, input: PeerInput) -> Vec<PeerEffect> {
        let mut effects = Vec::new();

        match input {
            PeerInput::Joined(peer_id) => self.on_joined(peer_id, &mut effects),
            PeerInput::Left(peer_id) => self.on_left(peer_id, &mut effects),
            PeerInput::Signal { from, payload } => self.on_signal(from, payload, &mut effects),
            PeerInput::OfferCreated {
                peer_id,
                generation,
                sdp,
            } => {
                if let Some(entry) = self.current(&peer_id, generation) {
                    entry.offer_sent = true;
                    effects.push(self.envelope(peer_id, SignalPayload::Offer { sdp }));
                }
            }
            PeerInput::AnswerCreated {
                peer_id,
                generation,
                sdp,
            } => {
                if self.current(&peer_id, generation).is_some() {
                    effects.push(self.envelope(peer_id.clone(), SignalPayload::Answer { sdp }));
                    self.remote_description_ready(&peer_id, &mut effects);
                }
            }
            PeerInput::AnswerApplied {
                peer_id,
                generation,
            } => {
                if self.current(&peer_id, generation).is_some() {
                    self.remote_description_ready(&peer_id, &mut effects);
                }
            }
            PeerInput::NegotiationFailed {
                peer_id,
                generation,
                reason,
            } => self.fail(&peer_id, generation, reason, &mut effects),
            PeerInput::Transport {
                peer_id,
                generation,
                event,
            } => self.on_transport(peer_id, generation, event, &mut effects),
            PeerInput::ConnectTimeout {
                peer_id,
                generation,
            } => {
                // A live path with no media means the peer sends nothing yet
                let stalled = self
                    .current(&peer_id, generation)
                    .is_some_and(|e| e.phase == PeerPhase::Connecting && !e.transport_up);
                if stalled {
                    self.fail(
                        &peer_id,
                        generation,
                        "no remote media before connect timeout".to_string(),
                        &mut effects,
                    );
                }
            }
            PeerInput::Reset => {
                for (peer_id, entry) in self.entries.drain() {
                    effects.push(PeerEffect::Close {
                        peer_id,
                        generation: entry.generation,
                    });
                }
                self.tombstones.clear();
                self.tombstone_order.clear();
                self.early_candidates.clear();
            }
        }

        effects
    }

    fn on_joined(&mut self, peer_id: PeerId, effects: &mut Vec<PeerEffect>) {
        if peer_id == self.local_id {
            return;
        }

        if self.tombstones.remove(&peer_id) {
            self.tombstone_order.retain(|p| p != &peer_id);
        }
        // Candidates sent before we initiate belong to a previous incarnation
        self.early_candidates.remove(&peer_id);

        if self.teardown(&peer_id, effects) {
            info!("Peer {} rejoined, replacing its connection", peer_id);
        }

        self.open(peer_id, NegotiationRole::Initiator, Negotiation::Offer, effects);
    }

    fn on_left(&mut self, peer_id: PeerId, effects: &mut Vec<PeerEffect>) {
        if peer_id == self.local_id {
            return;
        }

        self.early_candidates.remove(&peer_id);
        if self.teardown(&peer_id, effects) {
            info!("Peer {} left, connection closed", peer_id);
        }
        self.tombstone(peer_id);
    }

    fn on_signal(&mut self, from: PeerId, payload: SignalPayload, effects: &mut Vec<PeerEffect>) {
        if from == self.local_id {
            return;
        }

        match payload {
            SignalPayload::Offer { sdp } => {
                if self.tombstones.contains(&from) {
                    debug!("Ignoring offer from closed peer {}", from);
                    return;
                }

                // The existing entry is authoritative, whatever its role
                if self.entries.contains_key(&from) {
                    debug!("Ignoring offer from {}, connection already exists", from);
                    return;
                }

                self.open(
                    from,
                    NegotiationRole::Responder,
                    Negotiation::Answer { offer_sdp: sdp },
                    effects,
                );
            }
            SignalPayload::Answer { sdp } => match self.entries.get(&from) {
                Some(entry)
                    if entry.role == NegotiationRole::Initiator
                        && entry.offer_sent
                        && !entry.remote_description_set =>
                {
                    effects.push(PeerEffect::ApplyAnswer {
                        peer_id: from,
                        generation: entry.generation,
                        sdp,
                    });
                }
                _ => debug!("Ignoring unexpected answer from {}", from),
            },
            SignalPayload::Candidate { candidate } => match self.entries.get_mut(&from) {
                Some(entry) if entry.remote_description_set => {
                    effects.push(PeerEffect::AddCandidates {
                        peer_id: from,
                        generation: entry.generation,
                        candidates: vec![candidate],
                    });
                }
                Some(entry) => entry.pending_candidates.push(candidate),
                None if self.tombstones.contains(&from) => {
                    debug!("Ignoring candidate from closed peer {}", from);
                }
                None => {
                    let buffered = self.early_candidates.entry(from).or_default();
                    if buffered.len() < MAX_EARLY_CANDIDATES {
                        buffered.push(candidate);
                    }
                }
            },
        }
    }

    fn on_transport(
        &mut self,
        peer_id: PeerId,
        generation: Generation,
        event: PeerEvent,
        effects: &mut Vec<PeerEffect>,
    ) {
        let Some(entry) = self.current(&peer_id, generation) else {
            debug!(
                "Dropping stale event from {} (generation {})",
                peer_id, generation
            );
            return;
        };

        match event {
            PeerEvent::LocalCandidate(candidate) => {
                effects.push(self.envelope(peer_id, SignalPayload::Candidate { candidate }));
            }
            PeerEvent::RemoteTrack(track) => {
                let first = entry.phase == PeerPhase::Connecting;
                Self::add_remote_track(entry, track);
                if first {
                    info!("Peer {} connected", peer_id);
                    effects.push(PeerEffect::Notify(PeerNotice::Connected(peer_id)));
                }
            }
            PeerEvent::StateChanged(state) if state.is_terminal() => {
                self.fail(
                    &peer_id,
                    generation,
                    format!("transport {:?}", state),
                    effects,
                );
            }
            PeerEvent::StateChanged(TransportState::Connected) => {
                debug!("Peer {} transport connected", peer_id);
                entry.transport_up = true;
            }
            PeerEvent::StateChanged(TransportState::Disconnected) => {
                warn!("Peer {} media path interrupted", peer_id);
                entry.transport_up = false;
            }
            PeerEvent::StateChanged(state) => {
                debug!("Peer {} transport {:?}", peer_id, state);
            }
        }
    }

    fn add_remote_track(entry: &mut PeerEntry, track: RemoteTrack) {
        entry.remote_stream.add_track(track);
        entry.phase = PeerPhase::Connected;
    }

    /// Create a new entry and request its transport
    fn open(
        &mut self,
        peer_id: PeerId,
        role: NegotiationRole,
        negotiation: Negotiation,
        effects: &mut Vec<PeerEffect>,
    ) {
        if self.entries.len() >= self.max_peers {
            warn!(
                "Mesh full ({} peers), not connecting to {}",
                self.max_peers, peer_id
            );
            effects.push(PeerEffect::Notify(PeerNotice::Refused {
                peer_id,
                reason: format!("mesh limit of {} peers reached", self.max_peers),
            }));
            return;
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        let mut entry = PeerEntry::new(generation, role);
        if role == NegotiationRole::Responder {
            if let Some(early) = self.early_candidates.remove(&peer_id) {
                entry.pending_candidates = early;
            }
        }
        self.entries.insert(peer_id.clone(), entry);

        debug!(
            "Opening connection to {} as {:?} (generation {})",
            peer_id, role, generation
        );
        effects.push(PeerEffect::Open {
            peer_id: peer_id.clone(),
            generation,
            negotiation,
        });
        effects.push(PeerEffect::ArmTimeout {
            peer_id,
            generation,
        });
    }

    /// Remove an entry and close its transport; `true` if there was one
    fn teardown(&mut self, peer_id: &str, effects: &mut Vec<PeerEffect>) -> bool {
        match self.entries.remove(peer_id) {
            Some(entry) => {
                effects.push(PeerEffect::Close {
                    peer_id: peer_id.to_string(),
                    generation: entry.generation,
                });
                true
            }
            None => false,
        }
    }

    fn fail(
        &mut self,
        peer_id: &str,
        generation: Generation,
        reason: String,
        effects: &mut Vec<PeerEffect>,
    ) {
        if self.current(peer_id, generation).is_none() {
            return;
        }

        warn!("Connection to {} lost: {}", peer_id, reason);
        self.teardown(peer_id, effects);
        self.tombstone(peer_id.to_string());
        effects.push(PeerEffect::Notify(PeerNotice::Lost {
            peer_id: peer_id.to_string(),
            reason,
        }));
    }

    fn tombstone(&mut self, peer_id: PeerId) {
        if !self.tombstones.insert(peer_id.clone()) {
            return;
        }
        self.tombstone_order.push_back(peer_id);
        while self.tombstones.len() > MAX_TOMBSTONES {
            match self.tombstone_order.pop_front() {
                Some(oldest) => {
                    self.tombstones.remove(&oldest);
                }
                None => break,
            }
        }
    }

    /// Number of closed peers remembered
    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    fn remote_description_ready(&mut self, peer_id: &str, effects: &mut Vec<PeerEffect>) {
        if let Some(entry) = self.entries.get_mut(peer_id) {
            entry.remote_description_set = true;
            if !entry.pending_candidates.is_empty() {
                effects.push(PeerEffect::AddCandidates {
                    peer_id: peer_id.to_string(),
                    generation: entry.generation,
                    candidates: std::mem::take(&mut entry.pending_candidates),
                });
            }
        }
    }

    fn current(&mut self, peer_id: &str, generation: Generation) -> Option<&mut PeerEntry> {
        self.entries
            .get_mut(peer_id)
            .filter(|e| e.generation == generation)
    }

    fn envelope(&self, to: PeerId, payload: SignalPayload) -> PeerEffect {
        PeerEffect::Send(SignalEnvelope {
            from: self.local_id.clone(),
            to,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::TrackKind;

    fn candidate(n: u32) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{} 1 udp 2122260223 10.0.0.{} 5000 typ host", n, n),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
            username_fragment: None,
        }
    }

    fn offer(from: &str) -> PeerInput {
        PeerInput::Signal {
            from: from.to_string(),
            payload: SignalPayload::Offer {
                sdp: format!("offer-from-{}", from),
            },
        }
    }

    fn open_generation(effects: &[PeerEffect]) -> Generation {
        effects
            .iter()
            .find_map(|e| match e {
                PeerEffect::Open { generation, .. } => Some(*generation),
                _ => None,
            })
            .expect("open effect")
    }

    fn track(peer: &str, generation: Generation) -> PeerInput {
        PeerInput::Transport {
            peer_id: peer.to_string(),
            generation,
            event: PeerEvent::RemoteTrack(RemoteTrack::detached("a", TrackKind::Audio, "s")),
        }
    }

    #[test]
    fn test_joined_opens_initiator_and_sends_offer() {
        let mut table = PeerTable::new("host", 8);
        let effects = table.apply(PeerInput::Joined("alice".to_string()));
        let generation = open_generation(&effects);
        assert!(matches!(
            &effects[0],
            PeerEffect::Open { negotiation: Negotiation::Offer, .. }
        ));
        assert!(matches!(&effects[1], PeerEffect::ArmTimeout { .. }));
        assert_eq!(table.entry("alice").unwrap().role, NegotiationRole::Initiator);

        let effects = table.apply(PeerInput::OfferCreated {
            peer_id: "alice".to_string(),
            generation,
            sdp: "v=0".to_string(),
        });
        assert_eq!(
            effects,
            vec![PeerEffect::Send(SignalEnvelope {
                from: "host".to_string(),
                to: "alice".to_string(),
                payload: SignalPayload::Offer { sdp: "v=0".to_string() },
            })]
        );
    }

    #[test]
    fn test_own_join_echo_ignored() {
        let mut table = PeerTable::new("host", 8);
        assert!(table.apply(PeerInput::Joined("host".to_string())).is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn test_candidates_buffered_until_answer_applied() {
        let mut table = PeerTable::new("host", 8);
        let generation = open_generation(&table.apply(PeerInput::Joined("alice".to_string())));
        table.apply(PeerInput::OfferCreated {
            peer_id: "alice".to_string(),
            generation,
            sdp: "v=0".to_string(),
        });

        for n in 1..=2 {
            let effects = table.apply(PeerInput::Signal {
                from: "alice".to_string(),
                payload: SignalPayload::Candidate { candidate: candidate(n) },
            });
            assert!(effects.is_empty());
        }
        assert_eq!(table.entry("alice").unwrap().pending_candidates.len(), 2);

        let effects = table.apply(PeerInput::Signal {
            from: "alice".to_string(),
            payload: SignalPayload::Answer { sdp: "answer".to_string() },
        });
        assert!(matches!(&effects[0], PeerEffect::ApplyAnswer { .. }));

        let effects = table.apply(PeerInput::AnswerApplied {
            peer_id: "alice".to_string(),
            generation,
        });
        assert_eq!(
            effects,
            vec![PeerEffect::AddCandidates {
                peer_id: "alice".to_string(),
                generation,
                candidates: vec![candidate(1), candidate(2)],
            }]
        );

        let effects = table.apply(PeerInput::Signal {
            from: "alice".to_string(),
            payload: SignalPayload::Candidate { candidate: candidate(3) },
        });
        assert!(matches!(&effects[0], PeerEffect::AddCandidates { candidates, .. } if candidates.len() == 1));
    }

    #[test]
    fn test_early_candidates_move_into_responder_entry() {
        let mut table = PeerTable::new("alice", 8);
        table.apply(PeerInput::Signal {
            from: "host".to_string(),
            payload: SignalPayload::Candidate { candidate: candidate(7) },
        });
        assert_eq!(table.early_candidate_count("host"), 1);

        let effects = table.apply(offer("host"));
        let generation = open_generation(&effects);
        assert_eq!(table.early_candidate_count("host"), 0);
        assert_eq!(table.entry("host").unwrap().pending_candidates.len(), 1);

        let effects = table.apply(PeerInput::AnswerCreated {
            peer_id: "host".to_string(),
            generation,
            sdp: "answer".to_string(),
        });
        assert!(matches!(&effects[0], PeerEffect::Send(env) if env.payload.kind() == "answer"));
        assert!(matches!(
            &effects[1],
            PeerEffect::AddCandidates { candidates, .. } if candidates == &vec![candidate(7)]
        ));
    }

    #[test]
    fn test_duplicate_offer_after_answer_ignored() {
        let mut table = PeerTable::new("alice", 8);
        let generation = open_generation(&table.apply(offer("host")));
        table.apply(PeerInput::AnswerCreated {
            peer_id: "host".to_string(),
            generation,
            sdp: "answer".to_string(),
        });

        assert!(table.apply(offer("host")).is_empty());
        assert_eq!(table.len(), 1);
        assert_eq!(table.entry("host").unwrap().generation, generation);
    }

    #[test]
    fn test_offer_to_connecting_initiator_ignored() {
        // Regardless of which id is greater, the initiator entry stands
        for (local, remote) in [("amy", "zed"), ("zed", "amy")] {
            let mut table = PeerTable::new(local, 8);
            let generation = open_generation(&table.apply(PeerInput::Joined(remote.to_string())));
            table.apply(PeerInput::OfferCreated {
                peer_id: remote.to_string(),
                generation,
                sdp: "offer".to_string(),
            });

            assert!(table.apply(offer(remote)).is_empty(), "{} yielded", local);
            let entry = table.entry(remote).unwrap();
            assert_eq!(entry.generation, generation);
            assert_eq!(entry.role, NegotiationRole::Initiator);
            assert_eq!(entry.phase, PeerPhase::Connecting);
        }
    }

    #[test]
    fn test_live_transport_without_media_survives_timeout() {
        let mut table = PeerTable::new("host", 8);
        let generation = open_generation(&table.apply(PeerInput::Joined("alice".to_string())));
        table.apply(PeerInput::Transport {
            peer_id: "alice".to_string(),
            generation,
            event: PeerEvent::StateChanged(TransportState::Connected),
        });

        assert!(table
            .apply(PeerInput::ConnectTimeout {
                peer_id: "alice".to_string(),
                generation,
            })
            .is_empty());
        assert_eq!(table.entry("alice").unwrap().phase, PeerPhase::Connecting);

        // Media still connects it later
        let effects = table.apply(track("alice", generation));
        assert_eq!(
            effects,
            vec![PeerEffect::Notify(PeerNotice::Connected("alice".to_string()))]
        );
    }

    #[test]
    fn test_tombstones_are_capped() {
        let mut table = PeerTable::new("host", 8);
        for n in 0..MAX_TOMBSTONES + 10 {
            table.apply(PeerInput::Left(format!("peer-{}", n)));
        }
        assert_eq!(table.tombstone_count(), MAX_TOMBSTONES);
        assert!(!table.is_tombstoned("peer-0"));
        assert!(table.is_tombstoned(&format!("peer-{}", MAX_TOMBSTONES + 9)));

        // Rejoin forgets the tombstone; leaving again re-records it once
        table.apply(PeerInput::Joined("peer-20".to_string()));
        table.apply(PeerInput::Left("peer-20".to_string()));
        assert_eq!(table.tombstone_count(), MAX_TOMBSTONES);
        assert!(table.is_tombstoned("peer-20"));
    }

    #[test]
    fn test_first_track_connects_once() {
        let mut table = PeerTable::new("host", 8);
        let generation = open_generation(&table.apply(PeerInput::Joined("alice".to_string())));

        let effects = table.apply(track("alice", generation));
        assert_eq!(
            effects,
            vec![PeerEffect::Notify(PeerNotice::Connected("alice".to_string()))]
        );
        assert!(table.apply(track("alice", generation)).is_empty());
        assert_eq!(table.entry("alice").unwrap().phase, PeerPhase::Connected);
    }

    #[test]
    fn test_stale_generation_dropped() {
        let mut table = PeerTable::new("host", 8);
        let old = open_generation(&table.apply(PeerInput::Joined("alice".to_string())));
        let new = open_generation(&table.apply(PeerInput::Joined("alice".to_string())));
        assert_ne!(old, new);

        assert!(table.apply(track("alice", old)).is_empty());
        assert!(table
            .apply(PeerInput::ConnectTimeout {
                peer_id: "alice".to_string(),
                generation: old,
            })
            .is_empty());
        assert_eq!(table.entry("alice").unwrap().generation, new);
    }

    #[test]
    fn test_timeout_closes_and_tombstones() {
        let mut table = PeerTable::new("host", 8);
        let generation = open_generation(&table.apply(PeerInput::Joined("alice".to_string())));

        let effects = table.apply(PeerInput::ConnectTimeout {
            peer_id: "alice".to_string(),
            generation,
        });
        assert!(matches!(&effects[0], PeerEffect::Close { .. }));
        assert!(matches!(&effects[1], PeerEffect::Notify(PeerNotice::Lost { .. })));
        assert!(table.is_empty());
        assert!(table.is_tombstoned("alice"));

        // stray offer ignored until alice joins again
        assert!(table.apply(offer("alice")).is_empty());
        table.apply(PeerInput::Joined("alice".to_string()));
        assert!(!table.is_tombstoned("alice"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_timeout_after_connect_is_ignored() {
        let mut table = PeerTable::new("host", 8);
        let generation = open_generation(&table.apply(PeerInput::Joined("alice".to_string())));
        table.apply(track("alice", generation));
        assert!(table
            .apply(PeerInput::ConnectTimeout {
                peer_id: "alice".to_string(),
                generation,
            })
            .is_empty());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_left_clears_entry_and_early_candidates() {
        let mut table = PeerTable::new("host", 8);
        table.apply(PeerInput::Signal {
            from: "bob".to_string(),
            payload: SignalPayload::Candidate { candidate: candidate(1) },
        });
        table.apply(PeerInput::Joined("alice".to_string()));

        let effects = table.apply(PeerInput::Left("alice".to_string()));
        assert!(matches!(&effects[0], PeerEffect::Close { .. }));
        table.apply(PeerInput::Left("bob".to_string()));

        assert!(table.is_empty());
        assert_eq!(table.early_candidate_count("bob"), 0);
        assert!(table
            .apply(PeerInput::Signal {
                from: "bob".to_string(),
                payload: SignalPayload::Candidate { candidate: candidate(2) },
            })
            .is_empty());
        assert_eq!(table.early_candidate_count("bob"), 0);
    }

    #[test]
    fn test_terminal_transport_state_fails_entry() {
        let mut table = PeerTable::new("host", 8);
        let generation = open_generation(&table.apply(PeerInput::Joined("alice".to_string())));
        let effects = table.apply(PeerInput::Transport {
            peer_id: "alice".to_string(),
            generation,
            event: PeerEvent::StateChanged(TransportState::Failed),
        });
        assert!(matches!(&effects[1], PeerEffect::Notify(PeerNotice::Lost { .. })));
        assert!(table.is_empty());
    }

    #[test]
    fn test_mesh_limit_refuses() {
        let mut table = PeerTable::new("host", 1);
        table.apply(PeerInput::Joined("alice".to_string()));
        let effects = table.apply(PeerInput::Joined("bob".to_string()));
        assert!(matches!(
            &effects[0],
            PeerEffect::Notify(PeerNotice::Refused { peer_id, .. }) if peer_id == "bob"
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_reset_closes_everything() {
        let mut table = PeerTable::new("host", 8);
        table.apply(PeerInput::Joined("alice".to_string()));
        table.apply(PeerInput::Joined("bob".to_string()));
        table.apply(PeerInput::Left("carol".to_string()));

        let effects = table.apply(PeerInput::Reset);
        assert_eq!(
            effects
                .iter()
                .filter(|e| matches!(e, PeerEffect::Close { .. }))
                .count(),
            2
        );
        assert!(table.is_empty());
        assert!(!table.is_tombstoned("carol"));
        assert!(table.snapshot().peers.is_empty());
    }
}
