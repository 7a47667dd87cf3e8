//! Realtime chat channel over a websocket bound to one session id.
//!
//! A [`ChatChannel`] owns exactly one socket. Inbound frames decode into
//! typed [`ChannelEvent`]s delivered in socket order through an mpsc
//! channel, each tagged with the connection's monotonically-assigned id so
//! consumers can discard events from superseded connections. Lifecycle
//! events carry no intentional/unintentional distinction; that is the
//! supervisor's layer.

use crate::error::ChannelError;
use crate::identity::{IdentityKey, IdentityStore};
use crate::types::ChatResponsePayload;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

/// Fallback text for `error` frames that carry no message.
const UNKNOWN_WS_ERROR: &str = "Unknown websocket error";
/// Error text emitted for frames that do not parse as JSON.
const PARSE_FAILURE: &str = "Failed to parse websocket message.";

/// Typed inbound events decoded from the tagged frame protocol.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// Socket handshake completed.
    Open,
    /// The server (re)assigned the session backing this connection.
    Session { session_id: String },
    Typing {
        actor: Option<String>,
        is_typing: bool,
    },
    Response {
        payload: ChatResponsePayload,
        stream_id: Option<String>,
    },
    StreamStart {
        stream_id: String,
        agent: Option<String>,
    },
    StreamDelta {
        stream_id: String,
        delta: String,
    },
    StreamEnd { stream_id: String },
    /// Server-reported error or a local parse failure.
    Error { message: String },
    /// Socket closed (any cause).
    Closed,
}

/// One channel event tagged with its originating connection.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub conn_id: u64,
    pub event: ChannelEvent,
}

/// Wire shape of one inbound frame.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    stream_id: Option<String>,
    #[serde(default)]
    payload: Value,
}

/// Decoder outcome for one text frame.
#[derive(Debug)]
enum Decoded {
    Event(ChannelEvent),
    /// Application-level heartbeat probe; reply with a pong frame.
    Ping,
    /// Heartbeat reply or a frame the client does not act on.
    Ignored,
}

/// Decode one inbound text frame.
///
/// Frames missing their required payload fields are ignored; frames that
/// fail to parse at all yield an `Error` event rather than an abort, so
/// one bad frame never kills the stream.
fn decode_frame(text: &str) -> Decoded {
    let frame: WireFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(_) => {
            return Decoded::Event(ChannelEvent::Error {
                message: PARSE_FAILURE.to_string(),
            })
        }
    };

    match frame.kind.as_str() {
        "session" => match frame.payload.get("sessionId").and_then(Value::as_str) {
            Some(session_id) => Decoded::Event(ChannelEvent::Session {
                session_id: session_id.to_string(),
            }),
            None => Decoded::Ignored,
        },
        "typing" => match frame.payload.get("isTyping").and_then(Value::as_bool) {
            Some(is_typing) => Decoded::Event(ChannelEvent::Typing {
                actor: frame
                    .payload
                    .get("actor")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                is_typing,
            }),
            None => Decoded::Ignored,
        },
        "response" => {
            if !frame.payload.is_object() {
                return Decoded::Ignored;
            }
            match serde_json::from_value::<ChatResponsePayload>(frame.payload) {
                Ok(payload) => Decoded::Event(ChannelEvent::Response {
                    payload,
                    stream_id: frame.stream_id,
                }),
                Err(_) => Decoded::Ignored,
            }
        }
        "stream_start" => match frame.payload.get("streamId").and_then(Value::as_str) {
            Some(stream_id) => Decoded::Event(ChannelEvent::StreamStart {
                stream_id: stream_id.to_string(),
                agent: frame
                    .payload
                    .get("agent")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }),
            None => Decoded::Ignored,
        },
        "stream_delta" => {
            let stream_id = frame.payload.get("streamId").and_then(Value::as_str);
            let delta = frame.payload.get("delta").and_then(Value::as_str);
            match (stream_id, delta) {
                (Some(stream_id), Some(delta)) => Decoded::Event(ChannelEvent::StreamDelta {
                    stream_id: stream_id.to_string(),
                    delta: delta.to_string(),
                }),
                _ => Decoded::Ignored,
            }
        }
        "stream_end" => match frame.payload.get("streamId").and_then(Value::as_str) {
            Some(stream_id) => Decoded::Event(ChannelEvent::StreamEnd {
                stream_id: stream_id.to_string(),
            }),
            None => Decoded::Ignored,
        },
        "error" => {
            let message = frame
                .payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or(UNKNOWN_WS_ERROR);
            Decoded::Event(ChannelEvent::Error {
                message: message.to_string(),
            })
        }
        "ping" => Decoded::Ping,
        _ => Decoded::Ignored,
    }
}

fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn pong_frame() -> Message {
    let frame = json!({ "type": "pong", "payload": { "timestamp": now_unix_millis() } });
    Message::Text(frame.to_string())
}

/// One live websocket connection bound to a session id.
pub struct ChatChannel {
    conn_id: u64,
    outbound: mpsc::UnboundedSender<Message>,
    open: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl ChatChannel {
    /// Open a socket for `session_id` and start its read/write loops.
    ///
    /// Decoded events arrive on `events`, tagged with `conn_id`. The
    /// `Open` event is emitted before this returns; `Closed` is emitted
    /// exactly once when the read loop ends, unless the channel is torn
    /// down with [`ChatChannel::abort`].
    pub async fn connect(
        ws_url: &str,
        session_id: &str,
        conn_id: u64,
        identity: Arc<dyn IdentityStore>,
        events: mpsc::UnboundedSender<ChannelMessage>,
        connect_timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let mut url =
            Url::parse(ws_url).map_err(|err| ChannelError::InvalidUrl(err.to_string()))?;
        url.query_pairs_mut().append_pair("sessionId", session_id);

        let (socket, _) = timeout(connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| ChannelError::Timeout(format!("after {connect_timeout:?}")))?
            .map_err(|err| ChannelError::Connect(err.to_string()))?;
        tracing::debug!(conn_id, %session_id, "websocket connected");

        let (mut sink, mut stream) = socket.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let open = Arc::new(AtomicBool::new(true));

        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if sink.send(message).await.is_err() || closing {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_events = events.clone();
        let reader_outbound = outbound.clone();
        let reader_open = Arc::clone(&open);
        let reader = tokio::spawn(async move {
            loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => match decode_frame(&text) {
                        Decoded::Event(event) => {
                            if let ChannelEvent::Session { session_id } = &event {
                                // The server may rebind the session mid-flight;
                                // keep the durable id in step with it.
                                if let Err(err) =
                                    identity.set(IdentityKey::SessionId, Some(session_id.as_str()))
                                {
                                    tracing::warn!(%err, "failed to persist rebound session id");
                                }
                            }
                            if reader_events
                                .send(ChannelMessage { conn_id, event })
                                .is_err()
                            {
                                break;
                            }
                        }
                        Decoded::Ping => {
                            let _ = reader_outbound.send(pong_frame());
                        }
                        Decoded::Ignored => {}
                    },
                    Some(Ok(Message::Ping(data))) => {
                        let _ = reader_outbound.send(Message::Pong(data));
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        let _ = reader_events.send(ChannelMessage {
                            conn_id,
                            event: ChannelEvent::Error {
                                message: err.to_string(),
                            },
                        });
                        break;
                    }
                }
            }
            reader_open.store(false, Ordering::SeqCst);
            let _ = reader_events.send(ChannelMessage {
                conn_id,
                event: ChannelEvent::Closed,
            });
        });

        let _ = events.send(ChannelMessage {
            conn_id,
            event: ChannelEvent::Open,
        });

        Ok(Self {
            conn_id,
            outbound,
            open,
            reader,
            writer,
        })
    }

    /// Identifier assigned by the supervisor at creation.
    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// True while the socket is open for sends.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Send one user message. Returns false (a no-op) when the socket is
    /// not open; callers decide whether that warrants surfacing.
    pub fn send_chat(&self, content: &str, stream: bool, typing: bool) -> bool {
        if !self.is_open() {
            return false;
        }
        let mut payload = json!({
            "content": content,
            "timestamp": now_unix_millis(),
        });
        if stream {
            payload["stream"] = Value::Bool(true);
        }
        if typing {
            payload["typing"] = Value::Bool(true);
        }
        let frame = json!({ "type": "message", "payload": payload });
        self.outbound.send(Message::Text(frame.to_string())).is_ok()
    }

    /// Begin a graceful close. The read loop still emits its final
    /// `Closed` event; whoever replaced this connection ignores it by id.
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        let _ = self.outbound.send(Message::Close(None));
    }

    /// Hard teardown: stop both loops immediately. No further events are
    /// emitted for this connection.
    pub fn abort(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.reader.abort();
        self.writer.abort();
    }
}
