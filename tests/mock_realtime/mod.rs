//! WebSocket mock of the realtime conversation endpoint
//!
//! Accepts connections, records every client event, and lets a test push
//! server events into the most recent connection.

// Not every test binary uses every helper
#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

/// Shared state of the mock server
#[derive(Default)]
pub struct MockRealtimeState {
    /// Connections accepted since start
    pub connection_count: AtomicU64,
    /// Connections currently open
    pub open_connections: AtomicU64,
    /// Client events in arrival order, across all connections
    pub frames: Mutex<Vec<Value>>,
    /// `Authorization` header of each handshake
    pub auth_headers: Mutex<Vec<String>>,
    /// Request path and query of each handshake
    pub request_uris: Mutex<Vec<String>>,
    push: Mutex<Option<mpsc::UnboundedSender<Message>>>,
}

impl MockRealtimeState {
    /// Send a server event to the latest connection. Returns false when no
    /// connection is open.
    pub fn push(&self, event: Value) -> bool {
        match self.push.lock().as_ref() {
            Some(tx) => tx.send(Message::Text(event.to_string().into())).is_ok(),
            None => false,
        }
    }

    /// Close the latest connection from the server side.
    pub fn drop_connection(&self) -> bool {
        match self.push.lock().as_ref() {
            Some(tx) => tx.send(Message::Close(None)).is_ok(),
            None => false,
        }
    }

    pub fn connections(&self) -> u64 {
        self.connection_count.load(Ordering::SeqCst)
    }

    /// `type` of every recorded client event
    pub fn frame_types(&self) -> Vec<String> {
        self.frames
            .lock()
            .iter()
            .filter_map(|f| f.get("type").and_then(|t| t.as_str()).map(str::to_string))
            .collect()
    }

    pub fn frames_of(&self, event_type: &str) -> Vec<Value> {
        self.frames
            .lock()
            .iter()
            .filter(|f| f.get("type").and_then(|t| t.as_str()) == Some(event_type))
            .cloned()
            .collect()
    }

    pub fn clear_frames(&self) {
        self.frames.lock().clear();
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<MockRealtimeState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let recorder = state.clone();
    let ws_stream = accept_hdr_async(stream, move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let auth = req
            .headers()
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        recorder.auth_headers.lock().push(auth);
        recorder.request_uris.lock().push(req.uri().to_string());
        Ok(resp)
    })
    .await?;
    let (mut write, mut read) = ws_stream.split();

    let conn_id = state.connection_count.fetch_add(1, Ordering::SeqCst) + 1;
    state.open_connections.fetch_add(1, Ordering::SeqCst);

    let (push_tx, mut push_rx) = mpsc::unbounded_channel::<Message>();
    *state.push.lock() = Some(push_tx);

    let created = json!({
        "type": "session.created",
        "session": { "id": format!("sess_mock_{}", conn_id), "model": "gpt-4o-realtime-preview" }
    });
    write.send(Message::Text(created.to_string().into())).await?;

    loop {
        tokio::select! {
            Some(outgoing) = push_rx.recv() => {
                let closing = matches!(outgoing, Message::Close(_));
                write.send(outgoing).await?;
                if closing {
                    break;
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(value) = serde_json::from_str::<Value>(text.as_str()) {
                            state.frames.lock().push(value);
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        eprintln!("Mock realtime WebSocket error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.open_connections.fetch_sub(1, Ordering::SeqCst);
    Ok(())
}

/// Start the mock on an ephemeral port. Returns its `ws://` base URL.
pub async fn spawn_realtime_mock() -> (String, Arc<MockRealtimeState>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock realtime listener");
    let port = listener.local_addr().expect("local addr").port();
    let state = Arc::new(MockRealtimeState::default());

    let server_state = state.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let state = server_state.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, state).await {
                    eprintln!("Mock realtime connection error: {}", e);
                }
            });
        }
    });

    (format!("ws://127.0.0.1:{}/v1/realtime", port), state)
}
