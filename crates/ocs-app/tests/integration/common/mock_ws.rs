//! Mock streaming server for integration tests.
//!
//! Speaks just enough of the broker protocol to drive a session:
//! - Answers the session-open request (`"t":"c"`) with a connect-ack
//! - Records every text frame received and counts heartbeat pings
//! - Pushes arbitrary frames to connected clients
//! - Drops all connections on request

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// How the server answers session-open requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    Accept,
    Reject,
}

#[derive(Debug, Clone)]
enum ServerCommand {
    Push(String),
    Disconnect,
}

/// A mock streaming server for testing.
pub struct MockNorenServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    command_tx: broadcast::Sender<ServerCommand>,
    messages: Arc<Mutex<Vec<String>>>,
    connections: Arc<Mutex<u32>>,
    pings: Arc<Mutex<u32>>,
}

impl MockNorenServer {
    /// Start a server that accepts every session.
    pub async fn start() -> Self {
        Self::start_with(AckMode::Accept).await
    }

    pub async fn start_with(ack: AckMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let messages: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let connections: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let pings: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (command_tx, _) = broadcast::channel::<ServerCommand>(64);

        let messages_clone = messages.clone();
        let connections_clone = connections.clone();
        let pings_clone = pings.clone();
        let command_clone = command_tx.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(
                            stream,
                            ack,
                            messages_clone.clone(),
                            connections_clone.clone(),
                            pings_clone.clone(),
                            command_clone.subscribe(),
                        ));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            command_tx,
            messages,
            connections,
            pings,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }

    /// Ping frames received across all connections.
    pub async fn ping_count(&self) -> u32 {
        *self.pings.lock().await
    }

    pub async fn received_messages(&self) -> Vec<String> {
        self.messages.lock().await.clone()
    }

    /// Received frames whose `t` discriminant equals `kind`.
    pub async fn received_of_kind(&self, kind: &str) -> Vec<serde_json::Value> {
        self.received_messages()
            .await
            .iter()
            .filter_map(|m| serde_json::from_str::<serde_json::Value>(m).ok())
            .filter(|v| v.get("t").and_then(|t| t.as_str()) == Some(kind))
            .collect()
    }

    /// Wait until at least `count` frames of `kind` were received.
    pub async fn wait_for_kind(&self, kind: &str, count: usize) -> Vec<serde_json::Value> {
        let result = tokio::time::timeout(Duration::from_secs(3), async {
            loop {
                let frames = self.received_of_kind(kind).await;
                if frames.len() >= count {
                    return frames;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;

        match result {
            Ok(frames) => frames,
            Err(_) => panic!(
                "timed out waiting for {count} '{kind}' frames, got {:?}",
                self.received_messages().await
            ),
        }
    }

    /// Send a text frame to every connected client.
    pub fn push(&self, frame: serde_json::Value) {
        let _ = self.command_tx.send(ServerCommand::Push(frame.to_string()));
    }

    /// Close every open connection.
    pub fn disconnect_all(&self) {
        let _ = self.command_tx.send(ServerCommand::Disconnect);
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    ack: AckMode,
    messages: Arc<Mutex<Vec<String>>>,
    connections: Arc<Mutex<u32>>,
    pings: Arc<Mutex<u32>>,
    mut commands: broadcast::Receiver<ServerCommand>,
) {
    {
        let mut count = connections.lock().await;
        *count += 1;
    }

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        messages.lock().await.push(text.clone());

                        let parsed = serde_json::from_str::<serde_json::Value>(&text).ok();
                        let is_open = parsed
                            .as_ref()
                            .and_then(|v| v.get("t"))
                            .and_then(|t| t.as_str())
                            == Some("c");
                        if is_open {
                            let reply = match ack {
                                AckMode::Accept => serde_json::json!({
                                    "t": "ck",
                                    "s": "OK",
                                    "uid": parsed.as_ref().and_then(|v| v.get("uid")).cloned(),
                                }),
                                AckMode::Reject => serde_json::json!({
                                    "t": "ck",
                                    "s": "NOT_OK",
                                    "emsg": "Invalid session key",
                                }),
                            };
                            let _ = write.send(Message::Text(reply.to_string())).await;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        *pings.lock().await += 1;
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            command = commands.recv() => {
                match command {
                    Ok(ServerCommand::Push(frame)) => {
                        let _ = write.send(Message::Text(frame)).await;
                    }
                    Ok(ServerCommand::Disconnect) => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockNorenServer::start().await;
        assert!(server.url().starts_with("ws://127.0.0.1:"));
        server.shutdown().await;
    }
}
