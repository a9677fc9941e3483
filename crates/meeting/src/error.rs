//! Error types for the meeting core

/// Result type alias using the meeting Error
pub type Result<T> = std::result::Result<T, Error>;

/// Why local media could not be acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    /// The user (or platform policy) refused camera/microphone access
    PermissionDenied,
    /// No usable device, or the device is busy
    DeviceUnavailable,
}

impl std::fmt::Display for DeviceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceErrorKind::PermissionDenied => write!(f, "permission denied"),
            DeviceErrorKind::DeviceUnavailable => write!(f, "device unavailable"),
        }
    }
}

/// Errors that can occur in meeting operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Camera/microphone acquisition failed
    #[error("Media device error ({kind}): {message}")]
    Device {
        /// Failure class
        kind: DeviceErrorKind,
        /// Human-readable detail
        message: String,
    },

    /// Signaling channel error
    #[error("Signaling error: {0}")]
    SignalingError(String),

    /// WebRTC peer connection error
    #[error("Peer connection error: {0}")]
    PeerConnectionError(String),

    /// ICE candidate error
    #[error("ICE candidate error: {0}")]
    IceCandidateError(String),

    /// SDP negotiation error
    #[error("SDP negotiation error: {0}")]
    SdpError(String),

    /// Media track error
    #[error("Media track error: {0}")]
    MediaTrackError(String),

    /// Host-only action attempted by a non-host participant
    #[error("Not authorized: {0}")]
    NotHost(String),

    /// Operation not valid in the current session state
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// Meeting directory (REST) error
    #[error("Directory error: {0}")]
    DirectoryError(String),

    /// Invalid data format
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// WebRTC library error
    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Shorthand for [`DeviceErrorKind::PermissionDenied`]
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Error::Device {
            kind: DeviceErrorKind::PermissionDenied,
            message: message.into(),
        }
    }

    /// Shorthand for [`DeviceErrorKind::DeviceUnavailable`]
    pub fn device_unavailable(message: impl Into<String>) -> Self {
        Error::Device {
            kind: DeviceErrorKind::DeviceUnavailable,
            message: message.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Device { .. }
                | Error::SignalingError(_)
                | Error::WebSocketError(_)
                | Error::DirectoryError(_)
                | Error::IoError(_)
        )
    }

    /// Check if this error is a device acquisition error
    pub fn is_device_error(&self) -> bool {
        matches!(self, Error::Device { .. })
    }

    /// Check if this error is a peer-related error
    ///
    /// Peer errors are contained to a single connection and never end the session.
    pub fn is_peer_error(&self) -> bool {
        matches!(
            self,
            Error::PeerConnectionError(_)
                | Error::IceCandidateError(_)
                | Error::SdpError(_)
                | Error::MediaTrackError(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::SerializationError(e.to_string())
    }
}
