//! WhatsApp Web transport.
//!
//! The bot does not drive WhatsApp Web itself. A bridge process (whatsapp-web.js,
//! Baileys, ...) owns the browser session and exposes a small JSON protocol over
//! WebSocket: lifecycle and message events flow in, `send` commands flow out and
//! are confirmed by a matching `send_result`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::platform::{InboundMessage, Transport, TransportEvent};

/// Address suffix of a direct contact
pub const CONTACT_SUFFIX: &str = "@c.us";
/// Address suffix of a group chat
pub const GROUP_SUFFIX: &str = "@g.us";

const SEND_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);
const EVENT_BUFFER: usize = 64;
const CLOSED_REASON: &str = "bridge connection closed";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SendWaiter = oneshot::Sender<std::result::Result<(), String>>;

/// Turn a phone number or address into a sendable chat id.
pub fn chat_id(recipient: &str) -> String {
    let trimmed = recipient.trim();
    if trimmed.contains('@') {
        trimmed.to_string()
    } else {
        format!("{}{}", trimmed, CONTACT_SUFFIX)
    }
}

/// Sender address without the contact suffix.
pub fn bare_number(sender_id: &str) -> &str {
    sender_id.strip_suffix(CONTACT_SUFFIX).unwrap_or(sender_id)
}

pub fn is_group_address(address: &str) -> bool {
    address.ends_with(GROUP_SUFFIX)
}

/// Events sent by the bridge
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BridgeEvent {
    Qr {
        code: String,
    },
    Authenticated,
    AuthFailure {
        #[serde(default)]
        reason: String,
    },
    Ready {
        #[serde(default)]
        wid: Option<String>,
    },
    Disconnected {
        #[serde(default)]
        reason: String,
    },
    Message {
        from: String,
        #[serde(default)]
        body: String,
        #[serde(default)]
        from_me: bool,
        #[serde(default)]
        is_group: bool,
    },
    SendResult {
        request_id: String,
        success: bool,
        #[serde(default)]
        error: Option<String>,
    },
}

/// Commands sent to the bridge
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BridgeCommand<'a> {
    Send {
        request_id: &'a str,
        to: &'a str,
        text: &'a str,
    },
}

#[derive(Default)]
struct BridgeState {
    ready: AtomicBool,
    own_address: StdRwLock<Option<String>>,
    pending: Mutex<HashMap<String, SendWaiter>>,
}

impl BridgeState {
    /// Update connection state and translate into a transport event.
    /// Send confirmations are consumed here and produce no event.
    async fn apply(&self, event: BridgeEvent) -> Option<TransportEvent> {
        match event {
            BridgeEvent::Qr { code } => Some(TransportEvent::Qr(code)),
            BridgeEvent::Authenticated => Some(TransportEvent::Authenticated),
            BridgeEvent::AuthFailure { reason } => Some(TransportEvent::AuthFailure(reason)),
            BridgeEvent::Ready { wid } => {
                if let Ok(mut own) = self.own_address.write() {
                    *own = wid;
                }
                self.ready.store(true, Ordering::SeqCst);
                Some(TransportEvent::Ready)
            }
            BridgeEvent::Disconnected { reason } => {
                self.ready.store(false, Ordering::SeqCst);
                Some(TransportEvent::Disconnected(reason))
            }
            BridgeEvent::Message {
                from,
                body,
                from_me,
                is_group,
            } => Some(TransportEvent::Message(InboundMessage {
                sender_id: from,
                text: body,
                is_from_self: from_me,
                is_group,
            })),
            BridgeEvent::SendResult {
                request_id,
                success,
                error,
            } => {
                let waiter = self.pending.lock().await.remove(&request_id);
                match waiter {
                    Some(tx) => {
                        let outcome = if success {
                            Ok(())
                        } else {
                            Err(error.unwrap_or_else(|| "send failed".to_string()))
                        };
                        let _ = tx.send(outcome);
                    }
                    None => debug!("send_result for unknown request {}", request_id),
                }
                None
            }
        }
    }

    async fn fail_pending(&self, reason: &str) {
        let mut pending = self.pending.lock().await;
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(reason.to_string()));
        }
    }
}

/// Client side of a WhatsApp Web bridge connection
pub struct WhatsAppBridge {
    sink: Mutex<SplitSink<WsStream, Message>>,
    state: Arc<BridgeState>,
}

impl WhatsAppBridge {
    /// Connect to the bridge and start reading its events.
    ///
    /// Events arrive on the returned receiver until the socket closes; the
    /// last event is always a `Disconnected`.
    pub async fn connect(
        url: &str,
        attempts: u32,
    ) -> Result<(Arc<Self>, mpsc::Receiver<TransportEvent>)> {
        let stream = connect_with_retry(url, attempts).await?;
        let (sink, source) = stream.split();

        let state = Arc::new(BridgeState::default());
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(read_loop(source, Arc::clone(&state), tx));

        let bridge = Arc::new(Self {
            sink: Mutex::new(sink),
            state,
        });
        Ok((bridge, rx))
    }
}

#[async_trait]
impl Transport for WhatsAppBridge {
    fn is_ready(&self) -> bool {
        self.state.ready.load(Ordering::SeqCst)
    }

    fn own_address(&self) -> Option<String> {
        self.state.own_address.read().ok().and_then(|own| own.clone())
    }

    async fn send_message(&self, address: &str, text: &str) -> Result<()> {
        if !self.is_ready() {
            bail!("WhatsApp client not ready");
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.state.pending.lock().await.insert(request_id.clone(), tx);

        let payload = serde_json::to_string(&BridgeCommand::Send {
            request_id: &request_id,
            to: address,
            text,
        })
        .context("Failed to encode send command")?;

        let written = self.sink.lock().await.send(Message::Text(payload.into())).await;
        if let Err(e) = written {
            self.state.pending.lock().await.remove(&request_id);
            return Err(e).context("Failed to write to WhatsApp bridge");
        }

        match tokio::time::timeout(SEND_TIMEOUT, rx).await {
            Ok(Ok(Ok(()))) => {
                debug!("Bridge confirmed send {} to {}", request_id, address);
                Ok(())
            }
            Ok(Ok(Err(reason))) => bail!("Bridge failed to send to {}: {}", address, reason),
            Ok(Err(_)) => bail!("Bridge dropped send request {}", request_id),
            Err(_) => {
                self.state.pending.lock().await.remove(&request_id);
                bail!("Timed out waiting for bridge to confirm send to {}", address)
            }
        }
    }
}

async fn connect_with_retry(url: &str, attempts: u32) -> Result<WsStream> {
    let attempts = attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        match connect_async(url).await {
            Ok((stream, _response)) => {
                info!("Connected to WhatsApp bridge at {}", url);
                return Ok(stream);
            }
            Err(e) => {
                warn!(
                    "Bridge connection attempt {}/{} failed: {}",
                    attempt, attempts, e
                );
                last_err = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                }
            }
        }
    }

    let err = last_err.map_or_else(|| anyhow!("no connection attempts made"), anyhow::Error::from);
    Err(err).with_context(|| format!("Failed to connect to WhatsApp bridge at {}", url))
}

async fn read_loop(
    mut source: SplitStream<WsStream>,
    state: Arc<BridgeState>,
    events: mpsc::Sender<TransportEvent>,
) {
    while let Some(frame) = source.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("WhatsApp bridge read error: {}", e);
                break;
            }
        };

        let event: BridgeEvent = match serde_json::from_str(text.as_str()) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping unrecognized bridge frame: {}", e);
                continue;
            }
        };

        if let Some(event) = state.apply(event).await {
            if events.send(event).await.is_err() {
                debug!("Transport event receiver dropped");
                break;
            }
        }
    }

    state.ready.store(false, Ordering::SeqCst);
    state.fail_pending(CLOSED_REASON).await;
    let _ = events
        .send(TransportEvent::Disconnected(CLOSED_REASON.to_string()))
        .await;
}
