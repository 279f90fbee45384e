//! Bidirectional channel to the live voice service
//!
//! The wire protocol is JSON text frames over a WebSocket: one setup message
//! embedding the grounding context and voice preference, then a continuous
//! stream of PCM16 audio payloads uplink, and audio-chunk / interrupted /
//! closed / error messages downlink. The service is stateless between frames,
//! so uplink gaps are tolerated and nothing is retransmitted.

use crate::config::SessionConfig;
use crate::context::ConsultantContext;
use crate::error::{LiveError, LiveResult};
use crate::pcm::PcmPayload;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Messages sent to the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// One-time initialization: grounding instructions plus voice selection.
    Setup {
        system_instruction: String,
        voice: String,
        response_modality: String,
    },
    /// A single capture frame, independently deliverable.
    Audio { data: String, mime_type: String },
}

impl ClientEvent {
    /// Build the initialization payload for a session.
    pub fn setup(config: &SessionConfig, context: &ConsultantContext) -> Self {
        ClientEvent::Setup {
            system_instruction: context.system_instruction(),
            voice: config.voice.clone(),
            response_modality: "audio".to_string(),
        }
    }

    /// Wrap an encoded capture frame.
    pub fn audio(payload: PcmPayload) -> Self {
        ClientEvent::Audio {
            data: payload.data,
            mime_type: payload.mime_type,
        }
    }
}

/// Messages received from the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A chunk of synthesized speech: base64 PCM16 at the output sample rate.
    /// Ordering is implicit in arrival order.
    Audio { data: String },
    /// The user barged in; abandon all pending playback.
    Interrupted,
    /// The service closed the session.
    Closed,
    /// The service reported a fatal error.
    Error { message: String },
}

/// Uplink half of an established channel. Cloneable; sends never block.
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<ClientEvent>,
}

impl ChannelSender {
    pub fn send(&self, event: ClientEvent) -> LiveResult<()> {
        self.tx
            .send(event)
            .map_err(|e| LiveError::ChannelSend(e.to_string()))
    }
}

/// An established bidirectional channel. Split into sender and receiver to
/// feed the independent uplink and downlink tasks.
pub struct ChannelHandle {
    sender: ChannelSender,
    receiver: mpsc::Receiver<ServerEvent>,
}

impl ChannelHandle {
    pub fn split(self) -> (ChannelSender, mpsc::Receiver<ServerEvent>) {
        (self.sender, self.receiver)
    }

    /// Build a handle wired to in-process channels instead of a socket.
    /// Returns the handle plus the remote end, for driving a session in tests.
    pub fn pair() -> (Self, RemoteEnd) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::channel(64);
        (
            Self {
                sender: ChannelSender { tx: out_tx },
                receiver: in_rx,
            },
            RemoteEnd {
                from_client: out_rx,
                to_client: in_tx,
            },
        )
    }
}

/// The service side of an in-process channel pair.
pub struct RemoteEnd {
    pub from_client: mpsc::UnboundedReceiver<ClientEvent>,
    pub to_client: mpsc::Sender<ServerEvent>,
}

/// Connect the WebSocket channel and spawn the two socket driver tasks. The
/// caller sends the setup message as its first event. The socket closes when
/// the uplink sender is dropped; a socket error or remote close surfaces as a
/// final `ServerEvent`.
pub async fn connect(config: &SessionConfig) -> LiveResult<ChannelHandle> {
    let (ws, _) = connect_async(config.service_url.as_str())
        .await
        .map_err(|e| LiveError::ChannelSetup(e.to_string()))?;
    info!("Live channel connected to {}", config.service_url);

    let (mut sink, mut stream) = ws.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientEvent>();
    let (in_tx, in_rx) = mpsc::channel::<ServerEvent>(64);

    // Uplink driver: drain outbound events into the socket in order.
    tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(j) => j,
                Err(e) => {
                    warn!("Dropping unserializable client event: {e}");
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(json.into())).await {
                warn!("Uplink send failed: {e}");
                break;
            }
        }
        let _ = sink.close().await;
        debug!("Uplink driver finished");
    });

    // Downlink driver: parse inbound frames until the socket ends.
    tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) => {
                        let terminal =
                            matches!(event, ServerEvent::Closed | ServerEvent::Error { .. });
                        if in_tx.send(event).await.is_err() {
                            break;
                        }
                        if terminal {
                            break;
                        }
                    }
                    Err(e) => warn!("Unrecognized server frame: {e}"),
                },
                Ok(Message::Close(_)) => {
                    let _ = in_tx.send(ServerEvent::Closed).await;
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    let _ = in_tx
                        .send(ServerEvent::Error {
                            message: e.to_string(),
                        })
                        .await;
                    break;
                }
            }
        }
        debug!("Downlink driver finished");
    });

    Ok(ChannelHandle {
        sender: ChannelSender { tx: out_tx },
        receiver: in_rx,
    })
}
