//! Headless meeting client
//!
//! Joins a meeting room through the WebSocket signaling server, keeps a WebRTC
//! mesh with every other participant and logs what happens in the room.
//!
//! # Usage
//!
//! ```bash
//! # Join an ad-hoc room as a candidate
//! cargo run -p meeting-client -- \
//!   --signaling-url ws://localhost:8080/ws \
//!   --room-id room-42 \
//!   --user-id cand-7 \
//!   --host-id recruiter-1
//!
//! # Resolve the room through the meeting directory
//! cargo run -p meeting-client -- \
//!   --directory-url https://api.example.com \
//!   --auth-token "$TOKEN" \
//!   --room-id room-42 --user-id recruiter-1
//!
//! # Audio only, JSON logs
//! RUST_LOG=meeting_mesh=debug cargo run -p meeting-client -- \
//!   --room-id room-42 --user-id cand-7 --no-video --json-logs
//! ```

use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use meeting_mesh::media::OPUS_SILENCE_FRAME;
use meeting_mesh::{
    HttpMeetingDirectory, LocalTrack, MediaConstraints, MeetingCommand, MeetingConfig,
    MeetingController, MeetingDirectory, MeetingMetadata, ReconnectionPolicy, RtcConnector,
    SampleTrackDevices, SignalingClient, TrackKind, TurnServerConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const OPUS_FRAME: Duration = Duration::from_millis(20);

/// Meeting client
///
/// Joins a room, negotiates a peer connection with every participant and
/// leaves cleanly on Ctrl+C.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket signaling URL
    #[arg(
        long,
        default_value = "ws://localhost:8080",
        env = "MEETING_SIGNALING_URL"
    )]
    signaling_url: String,

    /// Room to join
    #[arg(long, env = "MEETING_ROOM_ID")]
    room_id: String,

    /// Local participant id
    #[arg(long, env = "MEETING_USER_ID")]
    user_id: String,

    /// Host of an ad-hoc room (ignored when a directory is configured)
    #[arg(long, env = "MEETING_HOST_ID")]
    host_id: Option<String>,

    /// Meeting directory base URL
    #[arg(long, env = "MEETING_DIRECTORY_URL")]
    directory_url: Option<String>,

    /// Bearer token for the meeting directory
    #[arg(long, env = "MEETING_AUTH_TOKEN")]
    auth_token: Option<String>,

    /// STUN servers (comma-separated)
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "stun:stun.l.google.com:19302"
    )]
    stun_servers: Vec<String>,

    /// TURN server URL
    #[arg(long, env = "MEETING_TURN_URL")]
    turn_url: Option<String>,

    /// TURN username
    #[arg(long, env = "MEETING_TURN_USERNAME", default_value = "")]
    turn_username: String,

    /// TURN credential
    #[arg(long, env = "MEETING_TURN_CREDENTIAL", default_value = "")]
    turn_credential: String,

    /// Maximum remote peers
    #[arg(long, default_value_t = 8, env = "MEETING_MAX_PEERS")]
    max_peers: u32,

    /// Seconds a connection may wait for remote media
    #[arg(long, default_value_t = 30, env = "MEETING_CONNECT_TIMEOUT_SECS")]
    connect_timeout_secs: u32,

    /// Join without a camera
    #[arg(long)]
    no_video: bool,

    /// Give up on the signaling server instead of reconnecting
    #[arg(long)]
    no_reconnect: bool,

    /// Emit logs as JSON
    #[arg(long, env = "MEETING_JSON_LOGS")]
    json_logs: bool,
}

impl Args {
    fn config(&self) -> MeetingConfig {
        MeetingConfig {
            signaling_url: self.signaling_url.clone(),
            stun_servers: self.stun_servers.clone(),
            turn_servers: self
                .turn_url
                .iter()
                .map(|url| TurnServerConfig {
                    url: url.clone(),
                    username: self.turn_username.clone(),
                    credential: self.turn_credential.clone(),
                })
                .collect(),
            max_peers: self.max_peers,
            connect_timeout_secs: self.connect_timeout_secs,
            media: MediaConstraints {
                audio: true,
                video: !self.no_video,
            },
            reconnection: if self.no_reconnect {
                ReconnectionPolicy::disabled()
            } else {
                ReconnectionPolicy::default()
            },
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    info!(
        version = meeting_mesh::version(),
        room = %args.room_id,
        user = %args.user_id,
        "Meeting client starting"
    );

    let config = args.config();
    config.validate().context("invalid meeting configuration")?;

    let metadata = match &args.directory_url {
        Some(url) => {
            let directory = HttpMeetingDirectory::new(url.clone(), args.auth_token.clone())?;
            directory
                .fetch_meeting(&args.room_id)
                .await
                .with_context(|| format!("failed to look up meeting {}", args.room_id))?
        }
        None => {
            let host = args.host_id.clone().unwrap_or_else(|| args.user_id.clone());
            MeetingMetadata::ad_hoc(args.room_id.clone(), host)
        }
    };

    let (signaling, events) =
        SignalingClient::connect(&config.signaling_url, &args.user_id, config.reconnection.clone())
            .await
            .context("failed to reach signaling server")?;
    let signaling = Arc::new(signaling);

    let mut controller = MeetingController::new(
        config.clone(),
        metadata,
        args.user_id.clone(),
        Arc::new(SampleTrackDevices {
            video_available: !args.no_video,
            ..Default::default()
        }),
        signaling.clone(),
        Arc::new(RtcConnector::new(&config)),
    )?;

    controller.join().await.context("failed to join meeting")?;
    info!("Controls: {:?}", controller.available_controls());

    if let Some(media) = controller.local_media() {
        for track in media.stream.tracks_of(TrackKind::Audio) {
            tokio::spawn(feed_silence(track.clone()));
        }
    }
    spawn_observers(&controller);

    let (commands_tx, commands) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, leaving meeting");
            let _ = commands_tx.send(MeetingCommand::Unload);
        }
    });

    let reason = controller.run(events, commands).await?;
    signaling.close();
    // Give the connection task a moment to flush the leave notification
    tokio::time::sleep(Duration::from_millis(250)).await;
    info!("Meeting ended: {:?}", reason);

    Ok(())
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,meeting_mesh=info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Keep the audio track fed so peers receive a live (silent) stream
async fn feed_silence(track: Arc<LocalTrack>) {
    let mut ticker = tokio::time::interval(OPUS_FRAME);
    loop {
        ticker.tick().await;
        match track
            .write_sample(Bytes::from_static(&OPUS_SILENCE_FRAME), OPUS_FRAME)
            .await
        {
            Ok(_) => {}
            Err(e) => {
                info!("Audio feed stopped: {}", e);
                break;
            }
        }
    }
}

fn spawn_observers(controller: &MeetingController) {
    let mut presence = controller.subscribe_presence();
    tokio::spawn(async move {
        while presence.changed().await.is_ok() {
            let snapshot = presence.borrow_and_update().clone();
            match serde_json::to_string(&snapshot) {
                Ok(json) => info!("Presence: {}", json),
                Err(e) => warn!("Failed to encode presence: {}", e),
            }
        }
    });

    let mut peers = controller.subscribe_peers();
    tokio::spawn(async move {
        while peers.changed().await.is_ok() {
            let snapshot = peers.borrow_and_update().clone();
            info!(
                "Peers: {} connected of {}",
                snapshot.connected_count(),
                snapshot.peers.len()
            );
        }
    });

    let mut notices = controller.subscribe_notices();
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) => info!("Peer notice: {:?}", notice),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Missed {} peer notices", skipped)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut status = controller.subscribe_status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = *status.borrow_and_update();
            info!("Session status: {:?}", current);
        }
    });
}
