//! Meeting session controller
//!
//! Orchestrates the lifecycle `pre-join → joining → joined → ended`: device
//! acquisition, the join handshake, in-meeting actions and teardown. All state
//! is owned by the controller; [`MeetingController::run`] is the single event
//! loop that serialises signaling events, transport callbacks and user
//! commands.

use super::state::{EndReason, MeetingControls, MeetingSession, SessionStatus};
use crate::config::MeetingConfig;
use crate::directory::{MeetingMetadata, ScheduleStatus};
use crate::media::{LocalMediaSource, LocalMediaState, MediaDevices};
use crate::participant::PeerId;
use crate::peer::{PeerConnectionManager, PeerConnector, PeerInput, PeerNotice, PeerSnapshot};
use crate::presence::{PresenceSnapshot, PresenceSynchronizer};
use crate::signaling::{ClientEvent, ServerEvent, SignalPayload, SignalingChannel, SignalingEvent};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

/// User actions accepted by [`MeetingController::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeetingCommand {
    /// Acquire media and enter the room
    Join,
    /// Flip the microphone
    ToggleAudio,
    /// Flip the camera
    ToggleVideo,
    /// Leave the meeting
    Leave,
    /// Host only: end the meeting for everyone
    EndForAll,
    /// Host only: nudge a participant
    NotifyParticipant(PeerId),
    /// Process is going away
    Unload,
}

/// Drives one meeting for the local participant
pub struct MeetingController {
    config: MeetingConfig,
    session: MeetingSession,
    media: LocalMediaSource,
    signaling: Arc<dyn SignalingChannel>,
    peers: PeerConnectionManager,
    peer_inputs: Option<mpsc::UnboundedReceiver<PeerInput>>,
    presence: PresenceSynchronizer,
    status_tx: watch::Sender<SessionStatus>,
}

impl MeetingController {
    /// Create a controller in `pre-join`
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] when `config` does not validate.
    pub fn new(
        config: MeetingConfig,
        metadata: MeetingMetadata,
        local_id: impl Into<PeerId>,
        devices: Arc<dyn MediaDevices>,
        signaling: Arc<dyn SignalingChannel>,
        connector: Arc<dyn PeerConnector>,
    ) -> Result<Self> {
        config.validate()?;

        let local_id = local_id.into();
        let session = MeetingSession::new(&metadata, &local_id);
        let (peers, peer_inputs) = PeerConnectionManager::new(
            local_id,
            config.max_peers as usize,
            config.connect_timeout(),
            connector,
            signaling.clone(),
        );
        let (status_tx, _) = watch::channel(session.status);

        info!(
            "Meeting controller for {} in room {} (host: {})",
            session.local.id,
            session.room_id,
            session.is_host()
        );

        Ok(Self {
            media: LocalMediaSource::new(devices, config.media),
            presence: PresenceSynchronizer::new(metadata.participants),
            config,
            session,
            signaling,
            peers,
            peer_inputs: Some(peer_inputs),
            status_tx,
        })
    }

    /// Session aggregate
    pub fn session(&self) -> &MeetingSession {
        &self.session
    }

    /// Lifecycle status
    pub fn status(&self) -> SessionStatus {
        self.session.status
    }

    /// Controls to show for the current status and role
    pub fn available_controls(&self) -> MeetingControls {
        self.session.available_controls()
    }

    /// Local media, when held
    pub fn local_media(&self) -> Option<&LocalMediaState> {
        self.media.state()
    }

    /// Presence tracking
    pub fn presence(&self) -> &PresenceSynchronizer {
        &self.presence
    }

    /// Peer connections
    pub fn peers(&self) -> &PeerConnectionManager {
        &self.peers
    }

    /// Current peer snapshot
    pub fn peer_snapshot(&self) -> PeerSnapshot {
        self.peers.snapshot()
    }

    /// Watch the lifecycle status
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    /// Watch peer snapshots
    pub fn subscribe_peers(&self) -> watch::Receiver<PeerSnapshot> {
        self.peers.subscribe()
    }

    /// Watch presence snapshots
    pub fn subscribe_presence(&self) -> watch::Receiver<PresenceSnapshot> {
        self.presence.subscribe()
    }

    /// Receive per-peer notices (connected, lost, refused)
    pub fn subscribe_notices(&self) -> broadcast::Receiver<PeerNotice> {
        self.peers.subscribe_notices()
    }

    /// Acquire media ahead of joining, for the pre-join device check
    pub async fn preview(&mut self) -> Result<()> {
        if self.session.status != SessionStatus::PreJoin {
            return Err(Error::InvalidState(format!(
                "Preview only possible before joining, status is {:?}",
                self.session.status
            )));
        }
        if self.media.state().is_none() {
            self.media.acquire().await?;
        }
        Ok(())
    }

    /// Enter the room
    ///
    /// Acquires media (unless a preview already holds it) and announces
    /// `join-meeting`. A device failure leaves the session in `pre-join` with
    /// nothing sent; the call may be retried.
    pub async fn join(&mut self) -> Result<()> {
        if self.session.status != SessionStatus::PreJoin {
            return Err(Error::InvalidState(format!(
                "Cannot join from {:?}",
                self.session.status
            )));
        }
        if self.session.schedule == ScheduleStatus::Ended {
            return Err(Error::InvalidState(format!(
                "Meeting {} has already ended",
                self.session.room_id
            )));
        }

        if self.media.state().is_none() {
            if let Err(e) = self.media.acquire().await {
                warn!("Cannot join {}: {}", self.session.room_id, e);
                return Err(e);
            }
        }

        self.set_status(SessionStatus::Joining);
        self.peers.set_local_tracks(self.media.tracks());

        let join = ClientEvent::JoinMeeting {
            room_id: self.session.room_id.clone(),
        };
        if let Err(e) = self.signaling.send(join) {
            warn!("Failed to announce join: {}", e);
            self.media.release();
            self.set_status(SessionStatus::PreJoin);
            return Err(e);
        }

        let local_id = self.session.local.id.clone();
        self.presence.peer_joined(&local_id);
        self.set_status(SessionStatus::Joined);
        info!("Joined meeting {} as {}", self.session.room_id, local_id);

        // Peers assume unmuted/camera-on until told otherwise
        if let Some(state) = self.media.state() {
            if !state.audio_enabled || !state.video_enabled {
                self.announce_local_state();
            }
        }

        Ok(())
    }

    /// Flip the microphone and broadcast the new state
    ///
    /// Returns the new enabled flag; `None` when no stream is held.
    pub fn toggle_audio(&mut self) -> Option<bool> {
        let enabled = self.media.toggle_audio()?;
        if self.session.is_joined() {
            self.broadcast(ClientEvent::MuteChanged {
                muted: !enabled,
                room_id: self.session.room_id.clone(),
            });
        }
        Some(enabled)
    }

    /// Flip the camera and broadcast the new state
    ///
    /// Returns the new enabled flag; `None` when no stream is held.
    pub fn toggle_video(&mut self) -> Option<bool> {
        let enabled = self.media.toggle_video()?;
        if self.session.is_joined() {
            self.broadcast(ClientEvent::VideoStateChanged {
                video_state: !enabled,
                room_id: self.session.room_id.clone(),
            });
        }
        Some(enabled)
    }

    /// Leave the meeting; later calls are no-ops
    pub async fn leave(&mut self) {
        match self.session.status {
            SessionStatus::Ended(_) => debug!("Leave ignored, session already ended"),
            SessionStatus::Joined => self.end(EndReason::Left).await,
            SessionStatus::PreJoin | SessionStatus::Joining => {
                self.media.release();
                self.set_status(SessionStatus::Ended(EndReason::Left));
            }
        }
    }

    /// Host only: end the meeting for everyone, then leave
    pub async fn end_meeting_for_all(&mut self) -> Result<()> {
        self.require_host("end-meeting")?;

        self.signaling.send(ClientEvent::EndMeeting {
            room_id: self.session.room_id.clone(),
        })?;
        info!("Ended meeting {} for all participants", self.session.room_id);

        self.end(EndReason::HostEnded).await;
        Ok(())
    }

    /// Host only: nudge a participant to join
    pub fn notify_participant(&self, participant_id: &str) -> Result<()> {
        self.require_host("notify-participant-meeting")?;

        self.signaling.send(ClientEvent::NotifyParticipantMeeting {
            participant_id: participant_id.to_string(),
            room_id: self.session.room_id.clone(),
        })
    }

    /// Best-effort teardown when the process goes away
    pub async fn unload(&mut self) {
        match self.session.status {
            SessionStatus::Ended(_) => {}
            SessionStatus::Joined => self.end(EndReason::Unloaded).await,
            SessionStatus::PreJoin | SessionStatus::Joining => {
                self.media.release();
                self.set_status(SessionStatus::Ended(EndReason::Unloaded));
            }
        }
    }

    /// Apply one user command
    pub async fn handle_command(&mut self, command: MeetingCommand) -> Result<()> {
        debug!("Command: {:?}", command);
        match command {
            MeetingCommand::Join => self.join().await,
            MeetingCommand::ToggleAudio => {
                self.toggle_audio();
                Ok(())
            }
            MeetingCommand::ToggleVideo => {
                self.toggle_video();
                Ok(())
            }
            MeetingCommand::Leave => {
                self.leave().await;
                Ok(())
            }
            MeetingCommand::EndForAll => self.end_meeting_for_all().await,
            MeetingCommand::NotifyParticipant(id) => self.notify_participant(&id),
            MeetingCommand::Unload => {
                self.unload().await;
                Ok(())
            }
        }
    }

    /// Apply one event from the signaling transport
    pub async fn handle_signaling_event(&mut self, event: SignalingEvent) {
        match event {
            SignalingEvent::Server(event) => self.handle_server_event(event).await,
            SignalingEvent::Disconnected { reason } => {
                if !self.session.status.is_ended() {
                    warn!("Session degraded, signaling lost: {}", reason);
                    self.session.degraded = true;
                }
            }
            SignalingEvent::Reconnected => {
                self.session.degraded = false;
                if self.session.is_joined() {
                    // The relay sees a new socket: start over as a newcomer
                    info!("Signaling restored, rejoining {}", self.session.room_id);
                    self.peers.close_all().await;
                    self.broadcast(ClientEvent::JoinMeeting {
                        room_id: self.session.room_id.clone(),
                    });
                    // Peers forgot our flags when the old socket left; toggles
                    // made while degraded never reached them either
                    self.announce_local_state();
                }
            }
        }
    }

    /// Apply one relay event
    pub async fn handle_server_event(&mut self, event: ServerEvent) {
        if !self.session.is_joined() {
            debug!("Ignoring {:?} while {:?}", event, self.session.status);
            return;
        }

        let local_id = self.session.local.id.clone();
        match event {
            ServerEvent::UserJoined { user_id } => {
                if user_id == local_id {
                    return;
                }
                info!("{} joined", user_id);
                self.presence.peer_joined(&user_id);
                if self.config.announce_state_on_join {
                    self.announce_local_state();
                }
                self.peers.handle(PeerInput::Joined(user_id)).await;
            }
            ServerEvent::UserLeft { user_id } => {
                if user_id == local_id {
                    return;
                }
                info!("{} left", user_id);
                self.presence.peer_left(&user_id);
                self.peers.handle(PeerInput::Left(user_id)).await;
            }
            ServerEvent::Signal { from, signal } => {
                if from == local_id {
                    return;
                }
                // Existing members announce themselves to newcomers by
                // offering; closed peers stay gone
                let announces = matches!(signal, SignalPayload::Offer { .. })
                    && !self.peers.table().is_tombstoned(&from);
                if announces {
                    self.presence.peer_joined(&from);
                }
                self.peers
                    .handle(PeerInput::Signal {
                        from,
                        payload: signal,
                    })
                    .await;
            }
            ServerEvent::MuteChanged { user_id, muted } => {
                if user_id != local_id {
                    self.presence.apply_remote_mute(&user_id, muted);
                }
            }
            ServerEvent::VideoStateChanged {
                user_id,
                video_state,
            } => {
                if user_id != local_id {
                    self.presence.apply_remote_video(&user_id, video_state);
                }
            }
            ServerEvent::MeetingEnded {} => {
                info!("Host ended meeting {}", self.session.room_id);
                self.end(EndReason::HostEnded).await;
            }
        }
    }

    /// Handle every transport/timer event already queued
    ///
    /// Returns how many were handled. [`MeetingController::run`] does this
    /// continuously; callers driving the controller by hand use it between
    /// signaling events.
    pub async fn process_peer_events(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let Some(rx) = self.peer_inputs.as_mut() else {
                break;
            };
            let Ok(input) = rx.try_recv() else {
                break;
            };
            self.peers.handle(input).await;
            handled += 1;
        }
        handled
    }

    /// Run the session until it ends
    ///
    /// A closed signaling stream ends the session with
    /// [`EndReason::ChannelLost`]; a closed command stream with
    /// [`EndReason::Unloaded`].
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<SignalingEvent>,
        mut commands: mpsc::UnboundedReceiver<MeetingCommand>,
    ) -> Result<EndReason> {
        let mut peer_inputs = self
            .peer_inputs
            .take()
            .ok_or_else(|| Error::InvalidState("Controller is already running".to_string()))?;

        loop {
            if let SessionStatus::Ended(reason) = self.session.status {
                info!("Meeting {} over: {:?}", self.session.room_id, reason);
                return Ok(reason);
            }

            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_signaling_event(event).await,
                    None => {
                        warn!("Signaling stream closed");
                        self.end(EndReason::ChannelLost).await;
                    }
                },
                Some(input) = peer_inputs.recv() => self.peers.handle(input).await,
                command = commands.recv() => match command {
                    Some(command) => {
                        if let Err(e) = self.handle_command(command).await {
                            warn!("Command failed: {}", e);
                        }
                    }
                    None => self.unload().await,
                },
            }
        }
    }

    fn require_host(&self, action: &str) -> Result<()> {
        if !self.session.is_host() {
            return Err(Error::NotHost(format!(
                "{} is reserved for the host of {}",
                action, self.session.room_id
            )));
        }
        if !self.session.is_joined() {
            return Err(Error::InvalidState(format!(
                "{} requires a joined session, status is {:?}",
                action, self.session.status
            )));
        }
        Ok(())
    }

    /// Send the absolute local mute/camera state to the room
    fn announce_local_state(&self) {
        let Some(state) = self.media.state() else {
            return;
        };
        let room_id = self.session.room_id.clone();
        self.broadcast(ClientEvent::MuteChanged {
            muted: !state.audio_enabled,
            room_id: room_id.clone(),
        });
        self.broadcast(ClientEvent::VideoStateChanged {
            video_state: !state.video_enabled,
            room_id,
        });
    }

    fn broadcast(&self, event: ClientEvent) {
        let name = event.name();
        if let Err(e) = self.signaling.send(event) {
            warn!("Failed to broadcast {}: {}", name, e);
        }
    }

    /// Tear down a joined session
    async fn end(&mut self, reason: EndReason) {
        if self.session.status.is_ended() {
            return;
        }

        let notify = self.session.is_joined() && self.signaling.is_connected();
        let leave = ClientEvent::LeaveMeeting {
            room_id: self.session.room_id.clone(),
        };

        // On unload the notification goes out before anything else
        if notify && reason == EndReason::Unloaded {
            self.broadcast(leave.clone());
        }

        self.media.release();
        self.peers.close_all().await;

        if notify && reason != EndReason::Unloaded {
            self.broadcast(leave);
        }

        self.presence.clear();
        self.set_status(SessionStatus::Ended(reason));
    }

    fn set_status(&mut self, status: SessionStatus) {
        if self.session.status != status {
            debug!("Session {:?} -> {:?}", self.session.status, status);
            self.session.status = status;
            self.status_tx.send_replace(status);
        }
    }
}

impl Drop for MeetingController {
    fn drop(&mut self) {
        if self.session.is_joined() {
            // Last-chance notification; connections close as they drop
            let _ = self.signaling.send(ClientEvent::LeaveMeeting {
                room_id: self.session.room_id.clone(),
            });
            self.media.release();
        }
    }
}
