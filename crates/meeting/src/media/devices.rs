//! Camera/microphone acquisition

use super::local::{LocalStream, LocalTrack};
use super::TrackKind;
use crate::config::MediaConstraints;
use crate::error::DeviceErrorKind;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Source of local capture tracks
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquire tracks satisfying `constraints`
    ///
    /// Fails with [`Error::Device`] when access is refused or no device can
    /// serve the request.
    async fn get_user_media(&self, constraints: MediaConstraints) -> Result<LocalStream>;
}

/// Devices backed by sample-fed WebRTC tracks (Opus audio, VP8 video)
///
/// Frames are pushed by the application through
/// [`LocalTrack::write_sample`]. Availability flags simulate a machine
/// without a camera or microphone; `refuse` simulates a denied permission
/// prompt.
#[derive(Debug, Clone)]
pub struct SampleTrackDevices {
    /// A microphone is present
    pub audio_available: bool,
    /// A camera is present
    pub video_available: bool,
    /// Deny access regardless of availability
    pub refuse: Option<DeviceErrorKind>,
}

impl Default for SampleTrackDevices {
    fn default() -> Self {
        Self {
            audio_available: true,
            video_available: true,
            refuse: None,
        }
    }
}

impl SampleTrackDevices {
    fn track(kind: TrackKind, stream_id: &str) -> Arc<LocalTrack> {
        let codec = match kind {
            TrackKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_string(),
                clock_rate: 48000,
                channels: 2,
                sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
                rtcp_feedback: vec![],
            },
            TrackKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_string(),
                clock_rate: 90000,
                channels: 0,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
        };

        let id = format!("{}-{}", kind, uuid::Uuid::new_v4());
        let rtc = Arc::new(TrackLocalStaticSample::new(
            codec,
            id.clone(),
            stream_id.to_string(),
        ));
        Arc::new(LocalTrack::new(id, kind, rtc))
    }
}

#[async_trait]
impl MediaDevices for SampleTrackDevices {
    async fn get_user_media(&self, constraints: MediaConstraints) -> Result<LocalStream> {
        if let Some(kind) = self.refuse {
            return Err(Error::Device {
                kind,
                message: "access to media devices refused".to_string(),
            });
        }
        if !constraints.audio && !constraints.video {
            return Err(Error::device_unavailable("no media kinds requested"));
        }
        if constraints.audio && !self.audio_available {
            return Err(Error::device_unavailable("no microphone found"));
        }
        if constraints.video && !self.video_available {
            return Err(Error::device_unavailable("no camera found"));
        }

        let stream_id = format!("stream-{}", uuid::Uuid::new_v4());
        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(Self::track(TrackKind::Audio, &stream_id));
        }
        if constraints.video {
            tracks.push(Self::track(TrackKind::Video, &stream_id));
        }

        Ok(LocalStream {
            id: stream_id,
            tracks,
        })
    }
}
