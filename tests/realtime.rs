//! Realtime channel integration tests against an in-process websocket server.

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use shopmate::channel::{ChannelEvent, ChannelMessage, ChatChannel};
use shopmate::identity::{IdentityKey, IdentityStore, MemoryIdentityStore};
use shopmate::supervisor::{CloseDisposition, ReconnectSupervisor};
use shopmate::transcript::Transcript;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type ServerSocket = WebSocketStream<TcpStream>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawn a one-connection websocket server and hand the socket to `serve`.
async fn ws_server<F, Fut>(serve: F) -> String
where
    F: FnOnce(ServerSocket) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let socket = tokio_tungstenite::accept_async(stream).await.unwrap();
        serve(socket).await;
    });
    format!("ws://{addr}")
}

fn text_frame(value: Value) -> Message {
    Message::Text(value.to_string())
}

async fn recv_event(
    events: &mut mpsc::UnboundedReceiver<ChannelMessage>,
) -> ChannelEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for channel event")
        .expect("event channel closed")
        .event
}

#[tokio::test]
async fn frames_are_delivered_in_order_and_reduce_to_one_turn() {
    let url = ws_server(|mut socket| async move {
        let frames = [
            json!({ "type": "typing", "payload": { "actor": "assistant", "isTyping": true } }),
            json!({ "type": "stream_start", "payload": { "streamId": "s1", "agent": "general" } }),
            json!({ "type": "stream_delta", "payload": { "streamId": "s1", "delta": "a" } }),
            json!({ "type": "typing", "payload": { "actor": "assistant", "isTyping": false } }),
            json!({ "type": "stream_delta", "payload": { "streamId": "s1", "delta": "b" } }),
            json!({ "type": "stream_end", "payload": { "streamId": "s1" } }),
        ];
        for frame in frames {
            socket.send(text_frame(frame)).await.unwrap();
        }
        // Keep the socket open until the client is done reading.
        let _ = socket.next().await;
    })
    .await;

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let identity: Arc<dyn IdentityStore> = Arc::new(MemoryIdentityStore::new());
    let channel = ChatChannel::connect(&url, "sess_rt", 1, identity, events_tx, CONNECT_TIMEOUT)
        .await
        .unwrap();

    assert!(matches!(recv_event(&mut events).await, ChannelEvent::Open));

    let mut transcript = Transcript::new();
    loop {
        match recv_event(&mut events).await {
            ChannelEvent::Typing { is_typing, .. } => transcript.set_typing(is_typing),
            ChannelEvent::StreamStart { stream_id, agent } => {
                transcript.apply_stream_start(&stream_id, agent.as_deref());
            }
            ChannelEvent::StreamDelta { stream_id, delta } => {
                transcript.apply_stream_delta(&stream_id, &delta);
            }
            ChannelEvent::StreamEnd { stream_id } => {
                transcript.apply_stream_end(&stream_id);
                break;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript.turns()[0].text, "ab");
    assert!(!transcript.typing());
    channel.abort();
}

#[tokio::test]
async fn session_frame_updates_persisted_identity() {
    let url = ws_server(|mut socket| async move {
        socket
            .send(text_frame(json!({
                "type": "session",
                "payload": { "sessionId": "sess_rebound", "expiresAt": "2026-09-01T00:00:00Z" }
            })))
            .await
            .unwrap();
        let _ = socket.next().await;
    })
    .await;

    let identity = Arc::new(MemoryIdentityStore::new());
    identity.set(IdentityKey::SessionId, Some("sess_old")).unwrap();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let channel = ChatChannel::connect(
        &url,
        "sess_old",
        7,
        identity.clone(),
        events_tx,
        CONNECT_TIMEOUT,
    )
    .await
    .unwrap();

    assert!(matches!(recv_event(&mut events).await, ChannelEvent::Open));
    match recv_event(&mut events).await {
        ChannelEvent::Session { session_id } => assert_eq!(session_id, "sess_rebound"),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(
        identity.get(IdentityKey::SessionId).as_deref(),
        Some("sess_rebound")
    );
    channel.abort();
}

#[tokio::test]
async fn outbound_send_carries_content_and_flags() {
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<String>();
    let url = ws_server(move |mut socket| async move {
        while let Some(Ok(message)) = socket.next().await {
            if let Message::Text(text) = message {
                let _ = seen_tx.send(text);
            }
        }
    })
    .await;

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let identity: Arc<dyn IdentityStore> = Arc::new(MemoryIdentityStore::new());
    let channel = ChatChannel::connect(&url, "sess_out", 1, identity, events_tx, CONNECT_TIMEOUT)
        .await
        .unwrap();
    assert!(matches!(recv_event(&mut events).await, ChannelEvent::Open));

    assert!(channel.send_chat("add the trail shoe to my cart", true, true));

    let raw = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
        .await
        .unwrap()
        .unwrap();
    let frame: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(frame["type"], "message");
    assert_eq!(frame["payload"]["content"], "add the trail shoe to my cart");
    assert_eq!(frame["payload"]["stream"], true);
    assert_eq!(frame["payload"]["typing"], true);
    assert!(frame["payload"]["timestamp"].is_u64());
    channel.abort();
}

#[tokio::test]
async fn application_ping_is_answered_with_pong() {
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<String>();
    let url = ws_server(move |mut socket| async move {
        socket
            .send(text_frame(json!({ "type": "ping", "payload": { "timestamp": 1 } })))
            .await
            .unwrap();
        while let Some(Ok(message)) = socket.next().await {
            if let Message::Text(text) = message {
                let _ = seen_tx.send(text);
            }
        }
    })
    .await;

    let (events_tx, _events) = mpsc::unbounded_channel();
    let identity: Arc<dyn IdentityStore> = Arc::new(MemoryIdentityStore::new());
    let channel = ChatChannel::connect(&url, "sess_hb", 1, identity, events_tx, CONNECT_TIMEOUT)
        .await
        .unwrap();

    let raw = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
        .await
        .unwrap()
        .unwrap();
    let frame: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(frame["type"], "pong");
    channel.abort();
}

#[tokio::test]
async fn server_drop_emits_closed_and_classifies_unintentional() {
    let url = ws_server(|mut socket| async move {
        socket
            .send(text_frame(json!({ "type": "typing", "payload": { "isTyping": true } })))
            .await
            .unwrap();
        // Drop without a close handshake, like a crashed backend.
    })
    .await;

    let mut supervisor = ReconnectSupervisor::new(Duration::from_millis(1200));
    let conn_id = supervisor.begin_connect();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let identity: Arc<dyn IdentityStore> = Arc::new(MemoryIdentityStore::new());
    let _channel = ChatChannel::connect(
        &url,
        "sess_drop",
        conn_id,
        identity,
        events_tx,
        CONNECT_TIMEOUT,
    )
    .await
    .unwrap();

    assert!(matches!(recv_event(&mut events).await, ChannelEvent::Open));
    assert!(supervisor.on_open(conn_id));
    assert!(matches!(
        recv_event(&mut events).await,
        ChannelEvent::Typing { .. }
    ));
    // An abrupt drop may surface a transport error before the close.
    loop {
        match recv_event(&mut events).await {
            ChannelEvent::Closed => break,
            ChannelEvent::Error { .. } => {}
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(supervisor.on_close(conn_id), CloseDisposition::Unintentional);
}

#[tokio::test]
async fn intentional_close_is_not_rescheduled() {
    let url = ws_server(|mut socket| async move {
        while let Some(Ok(message)) = socket.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    })
    .await;

    let mut supervisor = ReconnectSupervisor::new(Duration::from_millis(1200));
    let conn_id = supervisor.begin_connect();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let identity: Arc<dyn IdentityStore> = Arc::new(MemoryIdentityStore::new());
    let channel = ChatChannel::connect(
        &url,
        "sess_bye",
        conn_id,
        identity,
        events_tx,
        CONNECT_TIMEOUT,
    )
    .await
    .unwrap();
    assert!(matches!(recv_event(&mut events).await, ChannelEvent::Open));
    supervisor.on_open(conn_id);

    supervisor.mark_intentional();
    channel.close();

    assert!(matches!(recv_event(&mut events).await, ChannelEvent::Closed));
    assert_eq!(supervisor.on_close(conn_id), CloseDisposition::Intentional);
    assert!(!channel.is_open());
    assert!(!channel.send_chat("late message", false, false));
}
