//! WebSocket signaling client for room presence and SDP exchange

use super::backoff::ReconnectionPolicy;
use super::channel::SignalingChannel;
use super::protocol::{ClientEvent, ServerEvent, SignalingEvent};
use crate::{Error, Result};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// WebSocket signaling client
///
/// Owns a background task that pumps frames between the socket and two
/// queues: outbound [`ClientEvent`]s and inbound [`SignalingEvent`]s. When the
/// socket drops, the task reconnects according to its [`ReconnectionPolicy`]
/// and reports `Disconnected`/`Reconnected` on the inbound queue. Once retries
/// are exhausted the inbound queue closes.
pub struct SignalingClient {
    /// Endpoint including the `userId` query parameter
    url: String,

    /// Outgoing frame sender
    tx: mpsc::UnboundedSender<Message>,

    /// Socket state as seen by the background task
    connected: Arc<AtomicBool>,

    /// Set once `close` was requested
    closing: Arc<AtomicBool>,

    shutdown: Arc<Notify>,
}

impl SignalingClient {
    /// Signaling endpoint for `user_id`: the base URL with `?userId=` appended
    pub fn endpoint(base_url: &str, user_id: &str) -> Result<Url> {
        let mut url = Url::parse(base_url).map_err(|e| {
            Error::InvalidConfig(format!("Invalid signaling URL {}: {}", base_url, e))
        })?;
        url.query_pairs_mut().append_pair("userId", user_id);
        Ok(url)
    }

    /// Connect to the signaling server
    ///
    /// Returns the client together with the inbound event stream. The initial
    /// connection attempt is not retried; failures surface as
    /// [`Error::WebSocketError`].
    pub async fn connect(
        base_url: &str,
        user_id: &str,
        policy: ReconnectionPolicy,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SignalingEvent>)> {
        let url = Self::endpoint(base_url, user_id)?.to_string();
        info!("Connecting to signaling server: {}", url);

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::WebSocketError(format!("Failed to connect: {}", e)))?;

        info!("Connected to signaling server");

        let (tx, rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));
        let closing = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(Notify::new());

        tokio::spawn(Self::connection_task(
            ws_stream,
            url.clone(),
            policy,
            rx,
            events_tx,
            connected.clone(),
            closing.clone(),
            shutdown.clone(),
        ));

        Ok((
            Self {
                url,
                tx,
                connected,
                closing,
                shutdown,
            },
            events_rx,
        ))
    }

    /// Endpoint this client talks to
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Flush queued frames, close the socket and stop reconnecting
    pub fn close(&self) {
        if !self.closing.swap(true, Ordering::SeqCst) {
            self.shutdown.notify_one();
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn connection_task(
        mut ws: WsStream,
        url: String,
        policy: ReconnectionPolicy,
        mut outgoing: mpsc::UnboundedReceiver<Message>,
        events: mpsc::UnboundedSender<SignalingEvent>,
        connected: Arc<AtomicBool>,
        closing: Arc<AtomicBool>,
        shutdown: Arc<Notify>,
    ) {
        loop {
            let dropped = Self::pump(ws, &mut outgoing, &events, &shutdown).await;
            connected.store(false, Ordering::SeqCst);

            let reason = match dropped {
                Some(reason) if !closing.load(Ordering::SeqCst) => reason,
                _ => break,
            };

            warn!("Signaling connection lost: {}", reason);
            if events.send(SignalingEvent::Disconnected { reason }).is_err() {
                break;
            }

            ws = match Self::reconnect(&url, &policy, &shutdown).await {
                Some(ws) => ws,
                None => break,
            };

            connected.store(true, Ordering::SeqCst);
            info!("Signaling connection restored");
            if events.send(SignalingEvent::Reconnected).is_err() {
                break;
            }
        }

        debug!("Signaling connection task terminated");
    }

    /// Retry until connected, retries run out, or shutdown is requested
    async fn reconnect(
        url: &str,
        policy: &ReconnectionPolicy,
        shutdown: &Notify,
    ) -> Option<WsStream> {
        let mut attempt = 0;
        while policy.should_retry(attempt) {
            let delay = policy.calculate_backoff(attempt);
            debug!("Reconnecting in {:?} (attempt {})", delay, attempt + 1);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.notified() => return None,
            }

            match connect_async(url).await {
                Ok((ws, _)) => return Some(ws),
                Err(e) => warn!("Reconnect attempt {} failed: {}", attempt + 1, e),
            }
            attempt += 1;
        }

        error!(
            "Giving up on signaling server after {} attempts",
            policy.max_retries
        );
        None
    }

    /// Move frames until the socket drops (`Some(reason)`) or the client is
    /// shut down (`None`)
    async fn pump(
        ws: WsStream,
        outgoing: &mut mpsc::UnboundedReceiver<Message>,
        events: &mpsc::UnboundedSender<SignalingEvent>,
        shutdown: &Notify,
    ) -> Option<String> {
        let (mut write, mut read) = ws.split();

        loop {
            tokio::select! {
                msg = outgoing.recv() => match msg {
                    Some(msg) => {
                        if let Err(e) = write.send(msg).await {
                            return Some(format!("send failed: {}", e));
                        }
                    }
                    None => {
                        let _ = write.send(Message::Close(None)).await;
                        return None;
                    }
                },
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => match ServerEvent::from_json(&text) {
                        Ok(event) => {
                            debug!("Received signaling event: {:?}", event);
                            if events.send(event.into()).is_err() {
                                return None;
                            }
                        }
                        Err(e) => warn!("Ignoring signaling frame: {}", e),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        return Some(format!("closed by server: {:?}", frame));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Some(e.to_string()),
                    None => return Some("stream ended".to_string()),
                },
                _ = shutdown.notified() => {
                    while let Ok(msg) = outgoing.try_recv() {
                        if write.send(msg).await.is_err() {
                            break;
                        }
                    }
                    let _ = write.send(Message::Close(None)).await;
                    return None;
                }
            }
        }
    }
}

impl SignalingChannel for SignalingClient {
    fn send(&self, event: ClientEvent) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::SignalingError(format!(
                "Channel down, dropping {}",
                event.name()
            )));
        }

        let json = event.to_json()?;
        debug!("Sending signaling event: {}", json);

        self.tx
            .send(Message::Text(json))
            .map_err(|e| Error::SignalingError(format!("Failed to send message: {}", e)))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.closing.load(Ordering::SeqCst)
    }
}

impl Drop for SignalingClient {
    fn drop(&mut self) {
        self.close();
    }
}
