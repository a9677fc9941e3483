//! Configuration types for the meeting core

use crate::signaling::ReconnectionPolicy;
use serde::{Deserialize, Serialize};

/// Upper bound for the mesh size. Every participant holds one connection per
/// other participant, so upstream bandwidth grows linearly with this value.
pub const MAX_MESH_PEERS: u32 = 16;

/// Main configuration for a meeting client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeetingConfig {
    /// WebSocket signaling server URL (ws:// or wss://)
    pub signaling_url: String,

    /// STUN server URLs (at least one required)
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// Maximum remote peers in the mesh (default: 8, max: 16)
    pub max_peers: u32,

    /// Seconds a new connection may stay without inbound media before it is
    /// declared lost (default: 30)
    pub connect_timeout_secs: u32,

    /// Which local devices to request on join
    pub media: MediaConstraints,

    /// Re-broadcast local mute/camera state when a new participant joins
    /// (default: true)
    pub announce_state_on_join: bool,

    /// Signaling reconnection behaviour
    pub reconnection: ReconnectionPolicy,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn: or turns:)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

/// Devices requested from [`crate::media::MediaDevices`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    /// Request a microphone
    pub audio: bool,
    /// Request a camera
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

impl Default for MeetingConfig {
    fn default() -> Self {
        Self {
            signaling_url: "ws://localhost:8080".to_string(),
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: Vec::new(),
            max_peers: 8,
            connect_timeout_secs: 30,
            media: MediaConstraints::default(),
            announce_state_on_join: true,
            reconnection: ReconnectionPolicy::default(),
        }
    }
}

impl MeetingConfig {
    /// Connect timeout as a [`std::time::Duration`]
    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.connect_timeout_secs as u64)
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `stun_servers` is empty
    /// - `max_peers` is not in range 1-16
    /// - `connect_timeout_secs` is not in range 1-120
    /// - `signaling_url` is not a valid WebSocket URL
    /// - a TURN url does not use the turn:/turns: scheme
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.stun_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one STUN server is required".to_string(),
            ));
        }

        if self.max_peers == 0 || self.max_peers > MAX_MESH_PEERS {
            return Err(Error::InvalidConfig(format!(
                "max_peers must be in range 1-{}, got {}",
                MAX_MESH_PEERS, self.max_peers
            )));
        }

        if self.connect_timeout_secs == 0 || self.connect_timeout_secs > 120 {
            return Err(Error::InvalidConfig(format!(
                "connect_timeout_secs must be in range 1-120, got {}",
                self.connect_timeout_secs
            )));
        }

        if !self.signaling_url.starts_with("ws://") && !self.signaling_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "signaling_url must start with ws:// or wss://, got {}",
                self.signaling_url
            )));
        }

        for turn in &self.turn_servers {
            if !turn.url.starts_with("turn:") && !turn.url.starts_with("turns:") {
                return Err(Error::InvalidConfig(format!(
                    "TURN url must start with turn: or turns:, got {}",
                    turn.url
                )));
            }
        }

        Ok(())
    }
}
