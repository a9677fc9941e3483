//! Drives the [`PeerTable`] against real transports and the signaling channel

use super::state::{Generation, Negotiation, PeerEffect, PeerInput, PeerNotice, PeerSnapshot, PeerTable};
use super::transport::{PeerConnector, PeerEventSink, PeerTransport};
use crate::media::LocalTrack;
use crate::participant::PeerId;
use crate::signaling::SignalingChannel;
use crate::Result;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

/// Capacity of the notice broadcast; slow subscribers lose the oldest notices
const NOTICE_CAPACITY: usize = 64;

/// Owns every peer connection of the local participant
///
/// All state changes go through [`PeerConnectionManager::handle`], which must
/// be called from a single task. Transport callbacks and timers feed back
/// through the receiver returned by [`PeerConnectionManager::new`].
pub struct PeerConnectionManager {
    table: PeerTable,
    connector: Arc<dyn PeerConnector>,
    signaling: Arc<dyn SignalingChannel>,
    local_tracks: Vec<Arc<LocalTrack>>,
    transports: HashMap<PeerId, (Generation, Arc<dyn PeerTransport>)>,
    connect_timeout: Duration,
    inputs_tx: mpsc::UnboundedSender<PeerInput>,
    snapshot_tx: watch::Sender<PeerSnapshot>,
    notices_tx: broadcast::Sender<PeerNotice>,
}

impl PeerConnectionManager {
    /// Create a manager and the queue its transports and timers report into
    pub fn new(
        local_id: impl Into<PeerId>,
        max_peers: usize,
        connect_timeout: Duration,
        connector: Arc<dyn PeerConnector>,
        signaling: Arc<dyn SignalingChannel>,
    ) -> (Self, mpsc::UnboundedReceiver<PeerInput>) {
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, _) = watch::channel(PeerSnapshot::default());
        let (notices_tx, _) = broadcast::channel(NOTICE_CAPACITY);

        (
            Self {
                table: PeerTable::new(local_id, max_peers),
                connector,
                signaling,
                local_tracks: Vec::new(),
                transports: HashMap::new(),
                connect_timeout,
                inputs_tx,
                snapshot_tx,
                notices_tx,
            },
            inputs_rx,
        )
    }

    /// Tracks attached to every connection opened from now on
    pub fn set_local_tracks(&mut self, tracks: Vec<Arc<LocalTrack>>) {
        self.local_tracks = tracks;
    }

    /// Underlying state table
    pub fn table(&self) -> &PeerTable {
        &self.table
    }

    /// Current snapshot
    pub fn snapshot(&self) -> PeerSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Watch snapshots; updated after every handled input
    pub fn subscribe(&self) -> watch::Receiver<PeerSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Receive connect/lost/refused notices
    pub fn subscribe_notices(&self) -> broadcast::Receiver<PeerNotice> {
        self.notices_tx.subscribe()
    }

    /// Number of open transports
    pub fn transport_count(&self) -> usize {
        self.transports.len()
    }

    /// Apply an input and run every resulting effect to completion
    pub async fn handle(&mut self, input: PeerInput) {
        let mut queue = VecDeque::from([input]);

        while let Some(input) = queue.pop_front() {
            for effect in self.table.apply(input) {
                if let Some(next) = self.execute(effect).await {
                    queue.push_back(next);
                }
            }
        }

        self.snapshot_tx.send_replace(self.table.snapshot());
    }

    /// Close every connection
    pub async fn close_all(&mut self) {
        self.handle(PeerInput::Reset).await;
    }

    async fn execute(&mut self, effect: PeerEffect) -> Option<PeerInput> {
        match effect {
            PeerEffect::Open {
                peer_id,
                generation,
                negotiation,
            } => Some(
                match self.open(&peer_id, generation, negotiation).await {
                    Ok(input) => input,
                    Err(e) => PeerInput::NegotiationFailed {
                        peer_id,
                        generation,
                        reason: e.to_string(),
                    },
                },
            ),
            PeerEffect::ApplyAnswer {
                peer_id,
                generation,
                sdp,
            } => {
                let transport = self.transport(&peer_id, generation)?;
                Some(match transport.apply_answer(sdp).await {
                    Ok(()) => PeerInput::AnswerApplied {
                        peer_id,
                        generation,
                    },
                    Err(e) => PeerInput::NegotiationFailed {
                        peer_id,
                        generation,
                        reason: e.to_string(),
                    },
                })
            }
            PeerEffect::AddCandidates {
                peer_id,
                generation,
                candidates,
            } => {
                let transport = self.transport(&peer_id, generation)?;
                for candidate in candidates {
                    // A bad candidate only costs that path
                    if let Err(e) = transport.add_ice_candidate(candidate).await {
                        warn!("Candidate from {} rejected: {}", peer_id, e);
                    }
                }
                None
            }
            PeerEffect::Send(envelope) => {
                let kind = envelope.payload.kind();
                let to = envelope.to.clone();
                if let Err(e) = self.signaling.send(envelope.into_client_event()) {
                    warn!("Failed to send {} to {}: {}", kind, to, e);
                }
                None
            }
            PeerEffect::Close {
                peer_id,
                generation,
            } => {
                let matches = self
                    .transports
                    .get(&peer_id)
                    .is_some_and(|(g, _)| *g == generation);
                if matches {
                    if let Some((_, transport)) = self.transports.remove(&peer_id) {
                        if let Err(e) = transport.close().await {
                            warn!("Error closing connection to {}: {}", peer_id, e);
                        }
                    }
                }
                None
            }
            PeerEffect::ArmTimeout {
                peer_id,
                generation,
            } => {
                let tx = self.inputs_tx.clone();
                let timeout = self.connect_timeout;
                tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    let _ = tx.send(PeerInput::ConnectTimeout {
                        peer_id,
                        generation,
                    });
                });
                None
            }
            PeerEffect::Notify(notice) => {
                match &notice {
                    PeerNotice::Connected(peer_id) => info!("Media flowing with {}", peer_id),
                    PeerNotice::Lost { peer_id, reason } => {
                        warn!("Lost connection to {}: {}", peer_id, reason)
                    }
                    PeerNotice::Refused { peer_id, reason } => {
                        warn!("Not connecting to {}: {}", peer_id, reason)
                    }
                }
                // No subscribers is fine
                let _ = self.notices_tx.send(notice);
                None
            }
        }
    }

    /// Create the transport, attach local tracks and run the first
    /// negotiation step
    async fn open(
        &mut self,
        peer_id: &str,
        generation: Generation,
        negotiation: Negotiation,
    ) -> Result<PeerInput> {
        let sink = PeerEventSink::new(peer_id.to_string(), generation, self.inputs_tx.clone());
        let transport = self.connector.connect(peer_id, sink).await?;
        self.transports
            .insert(peer_id.to_string(), (generation, transport.clone()));

        for track in &self.local_tracks {
            transport.add_local_track(track.clone()).await?;
        }

        debug!(
            "Attached {} local tracks for {}",
            self.local_tracks.len(),
            peer_id
        );

        Ok(match negotiation {
            Negotiation::Offer => PeerInput::OfferCreated {
                peer_id: peer_id.to_string(),
                generation,
                sdp: transport.create_offer().await?,
            },
            Negotiation::Answer { offer_sdp } => PeerInput::AnswerCreated {
                peer_id: peer_id.to_string(),
                generation,
                sdp: transport.accept_offer(offer_sdp).await?,
            },
        })
    }

    fn transport(&self, peer_id: &str, generation: Generation) -> Option<Arc<dyn PeerTransport>> {
        match self.transports.get(peer_id) {
            Some((g, transport)) if *g == generation => Some(transport.clone()),
            _ => {
                debug!("No transport for {} generation {}", peer_id, generation);
                None
            }
        }
    }
}
