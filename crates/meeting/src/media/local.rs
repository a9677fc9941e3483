//! Local capture tracks and the media source that owns them

use super::devices::MediaDevices;
use super::TrackKind;
use crate::config::MediaConstraints;
use crate::{Error, Result};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// One 20 ms Opus frame of silence (TOC byte for a CELT frame, no payload)
pub const OPUS_SILENCE_FRAME: [u8; 3] = [0xF8, 0xFF, 0xFE];

/// A single local capture track
///
/// The same track is attached to every peer connection; disabling it mutes
/// the track for all of them without renegotiation. A disabled audio track
/// keeps sending silence so remote sides still see the track.
pub struct LocalTrack {
    id: String,
    kind: TrackKind,
    enabled: AtomicBool,
    stopped: AtomicBool,
    rtc: Arc<TrackLocalStaticSample>,
}

impl LocalTrack {
    /// Wrap a sample track; new tracks start enabled
    pub fn new(id: impl Into<String>, kind: TrackKind, rtc: Arc<TrackLocalStaticSample>) -> Self {
        Self {
            id: id.into(),
            kind,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            rtc,
        }
    }

    /// Track identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Audio or video
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Whether samples are currently forwarded
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Enable or disable sample forwarding
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Whether the track was stopped; stopped tracks never restart
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Stop the track permanently
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.enabled.store(false, Ordering::SeqCst);
    }

    /// Underlying WebRTC track, for attaching to peer connections
    pub fn rtc_track(&self) -> Arc<TrackLocalStaticSample> {
        Arc::clone(&self.rtc)
    }

    /// What actually goes on the wire for `data`
    ///
    /// Enabled tracks send the frame as is. Disabled audio sends silence;
    /// disabled video sends nothing.
    pub fn outgoing_payload(&self, data: Bytes) -> Option<Bytes> {
        if self.is_enabled() {
            return Some(data);
        }
        match self.kind {
            TrackKind::Audio => Some(Bytes::from_static(&OPUS_SILENCE_FRAME)),
            TrackKind::Video => None,
        }
    }

    /// Push one encoded frame to every connection carrying this track
    ///
    /// Returns `Ok(false)` when the frame was withheld because the track is
    /// disabled (audio is replaced by silence, video is dropped).
    pub async fn write_sample(&self, data: Bytes, duration: Duration) -> Result<bool> {
        if self.is_stopped() {
            return Err(Error::MediaTrackError(format!(
                "Track {} is stopped",
                self.id
            )));
        }
        let enabled = self.is_enabled();
        let Some(data) = self.outgoing_payload(data) else {
            return Ok(false);
        };

        let sample = Sample {
            data,
            duration,
            timestamp: std::time::SystemTime::now(),
            ..Default::default()
        };

        self.rtc
            .write_sample(&sample)
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to write RTP sample: {}", e)))?;

        Ok(enabled)
    }
}

impl std::fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("enabled", &self.is_enabled())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Set of tracks returned by one device acquisition
#[derive(Debug, Clone)]
pub struct LocalStream {
    /// Stream identifier (the `msid` remote peers see)
    pub id: String,
    /// Captured tracks
    pub tracks: Vec<Arc<LocalTrack>>,
}

impl LocalStream {
    /// Tracks of one kind
    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &Arc<LocalTrack>> {
        self.tracks.iter().filter(move |t| t.kind() == kind)
    }
}

/// Acquired stream plus the user-facing enabled flags
#[derive(Debug, Clone)]
pub struct LocalMediaState {
    /// Captured tracks
    pub stream: LocalStream,
    /// Microphone enabled
    pub audio_enabled: bool,
    /// Camera enabled
    pub video_enabled: bool,
}

/// Owns device acquisition and the local tracks for one session
///
/// Acquisition happens once per join attempt. Toggles flip the enabled flag on
/// every track of the kind, and [`LocalMediaSource::release`] stops all tracks
/// exactly once.
pub struct LocalMediaSource {
    devices: Arc<dyn MediaDevices>,
    constraints: MediaConstraints,
    state: Option<LocalMediaState>,
}

impl LocalMediaSource {
    /// Create a source that will request `constraints` from `devices`
    pub fn new(devices: Arc<dyn MediaDevices>, constraints: MediaConstraints) -> Self {
        Self {
            devices,
            constraints,
            state: None,
        }
    }

    /// Request camera/microphone
    ///
    /// On failure nothing is held and the call may be retried.
    pub async fn acquire(&mut self) -> Result<&LocalMediaState> {
        if self.state.is_some() {
            return Err(Error::InvalidState(
                "Local media already acquired".to_string(),
            ));
        }

        let stream = self.devices.get_user_media(self.constraints).await?;
        let audio_enabled = stream.tracks_of(TrackKind::Audio).any(|t| t.is_enabled());
        let video_enabled = stream.tracks_of(TrackKind::Video).any(|t| t.is_enabled());

        info!(
            "Acquired local stream {} ({} tracks)",
            stream.id,
            stream.tracks.len()
        );

        Ok(&*self.state.insert(LocalMediaState {
            stream,
            audio_enabled,
            video_enabled,
        }))
    }

    /// Current state, if a stream is held
    pub fn state(&self) -> Option<&LocalMediaState> {
        self.state.as_ref()
    }

    /// All held tracks
    pub fn tracks(&self) -> Vec<Arc<LocalTrack>> {
        self.state
            .as_ref()
            .map(|s| s.stream.tracks.clone())
            .unwrap_or_default()
    }

    /// Flip the microphone; returns the new enabled flag, `None` without a stream
    pub fn toggle_audio(&mut self) -> Option<bool> {
        self.toggle(TrackKind::Audio)
    }

    /// Flip the camera; returns the new enabled flag, `None` without a stream
    pub fn toggle_video(&mut self) -> Option<bool> {
        self.toggle(TrackKind::Video)
    }

    fn toggle(&mut self, kind: TrackKind) -> Option<bool> {
        let state = self.state.as_mut()?;
        let flag = match kind {
            TrackKind::Audio => &mut state.audio_enabled,
            TrackKind::Video => &mut state.video_enabled,
        };
        *flag = !*flag;
        let enabled = *flag;

        for track in state.stream.tracks_of(kind) {
            track.set_enabled(enabled);
        }
        debug!("Local {} enabled={}", kind, enabled);

        Some(enabled)
    }

    /// Stop every held track
    ///
    /// Returns `true` if this call stopped anything; later calls are no-ops.
    pub fn release(&mut self) -> bool {
        match self.state.take() {
            Some(state) => {
                for track in &state.stream.tracks {
                    track.stop();
                }
                info!("Released local stream {}", state.stream.id);
                true
            }
            None => false,
        }
    }
}

impl Drop for LocalMediaSource {
    fn drop(&mut self) {
        self.release();
    }
}
