//! WebSocket front door: one session per connection.

use crate::protocol::{decode_pcm16, ClientEvent, ServerEvent};
use crate::session::{Providers, Session, SessionIdentity, SessionInput, SessionOutput};
use futures_util::{SinkExt, StreamExt};
use http::{HeaderMap, StatusCode, Uri};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Frames buffered between a socket and its session
const CHANNEL_CAPACITY: usize = 64;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Session error: {0}")]
    Session(String),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_address: String,
    /// Shared secret clients must present as a bearer token
    pub session_key: Option<String>,
    /// Identity reported to clients; the room can be overridden per connection
    pub identity: SessionIdentity,
}

pub struct SessionServer {
    config: Arc<ServerConfig>,
    providers: Providers,
}

impl SessionServer {
    pub fn new(config: ServerConfig, providers: Providers) -> Self {
        Self {
            config: Arc::new(config),
            providers,
        }
    }

    /// Bind the configured address and serve until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.listen_address).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), ServerError> {
        log::info!("🎯 Story agent listening on ws://{}", listener.local_addr()?);
        if self.config.session_key.is_none() {
            log::warn!("⚠️ No session key configured, accepting unauthenticated clients");
        }

        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        log::info!("🎯 Connection from {}", addr);
                        let config = Arc::clone(&self.config);
                        let providers = self.providers.clone();
                        let cancel = shutdown.child_token();

                        sessions.spawn(async move {
                            match handle_connection(stream, addr, config, providers, cancel).await {
                                Ok(()) => log::info!("✅ Connection {} closed", addr),
                                Err(e) => log::error!("❌ Connection {} failed: {}", addr, e),
                            }
                        });
                    }
                    Err(e) => {
                        log::error!("❌ Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
                // Reap finished sessions so the set doesn't grow
                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
            }
        }

        log::info!("🛑 Server shutting down, waiting for {} sessions", sessions.len());
        while sessions.join_next().await.is_some() {}
        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    config: Arc<ServerConfig>,
    providers: Providers,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    let mut requested_room = None;
    let ws = accept_hdr_async(stream, |request: &Request, response: Response| {
        if !authorize(request.headers(), config.session_key.as_deref()) {
            log::warn!("🔒 Rejecting {}: missing or wrong session key", addr);
            return Err(unauthorized());
        }
        requested_room = room_from_uri(request.uri());
        Ok(response)
    })
    .await?;

    let identity = SessionIdentity {
        agent: config.identity.agent.clone(),
        room: requested_room.unwrap_or_else(|| config.identity.room.clone()),
    };

    let (mut write, mut read) = ws.split();
    let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (outbound_tx, mut outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let session = Session::new(providers, identity, outbound_tx.clone())
        .map_err(|e| ServerError::Session(e.to_string()))?;
    log::info!("🎯 Session {} assigned to {}", session.id(), addr);

    // Socket → session. A disconnect cancels the session, so the socket is read
    // even while the session is busy; inputs wait in a backlog meanwhile.
    let reader_cancel = cancel.clone();
    let reader = tokio::spawn(async move {
        let mut backlog: VecDeque<SessionInput> = VecDeque::new();
        let mut dropped_audio = 0usize;

        loop {
            tokio::select! {
                biased;
                _ = reader_cancel.cancelled() => break,
                permit = inbound_tx.reserve(), if !backlog.is_empty() => {
                    let Ok(permit) = permit else { break };
                    if let Some(input) = backlog.pop_front() {
                        permit.send(input);
                    }
                }
                frame = read.next() => {
                    let input = match frame {
                        Some(Ok(Message::Binary(data))) => match decode_pcm16(data.as_slice()) {
                            Ok(samples) => SessionInput::Audio(samples),
                            Err(e) => {
                                log::warn!("Dropping audio frame from {}: {}", addr, e);
                                continue;
                            }
                        },
                        Some(Ok(Message::Text(text))) => {
                            match ClientEvent::from_json(&text.to_string()) {
                                Ok(ClientEvent::Transcript { text }) => {
                                    SessionInput::Transcript(text)
                                }
                                Ok(ClientEvent::Hangup) => SessionInput::Hangup,
                                Err(e) => {
                                    log::warn!("Ignoring event from {}: {}", addr, e);
                                    let _ = outbound_tx.try_send(SessionOutput::Event(
                                        ServerEvent::Error {
                                            message: e.to_string(),
                                        },
                                    ));
                                    continue;
                                }
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            log::info!("Client {} closed the connection: {:?}", addr, frame);
                            break;
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            log::warn!("WebSocket error from {}: {}", addr, e);
                            break;
                        }
                        None => break,
                    };

                    let is_audio = matches!(input, SessionInput::Audio(_));
                    if is_audio && backlog.len() >= CHANNEL_CAPACITY {
                        if dropped_audio == 0 {
                            log::warn!("⚠️ Session for {} is busy, dropping audio", addr);
                        }
                        dropped_audio += 1;
                        continue;
                    }
                    if dropped_audio > 0 {
                        log::debug!("Dropped {} audio frames from {}", dropped_audio, addr);
                        dropped_audio = 0;
                    }
                    backlog.push_back(input);
                }
            }
        }
        reader_cancel.cancel();
    });

    // Session → socket, until every sender is gone
    let writer = tokio::spawn(async move {
        while let Some(output) = outbound_rx.recv().await {
            let message = match output {
                SessionOutput::Event(event) => match event.to_json() {
                    Ok(json) => Message::Text(json.into()),
                    Err(e) => {
                        log::error!("Failed to encode event: {}", e);
                        continue;
                    }
                },
                SessionOutput::Audio(audio) => Message::Binary(audio.into()),
            };

            if let Err(e) = write.send(message).await {
                log::debug!("Client {} stopped receiving: {}", addr, e);
                break;
            }
        }
        let _ = write.close().await;
    });

    let result = session.run(inbound_rx, cancel.clone()).await;

    // Stop the reader so the writer can drain and close
    cancel.cancel();
    let _ = reader.await;
    let _ = writer.await;

    result
        .map(|_| ())
        .map_err(|e| ServerError::Session(e.to_string()))
}

/// Whether a handshake carries the expected bearer token. Anything goes without one.
pub fn authorize(headers: &HeaderMap, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };

    headers
        .get(http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token.trim() == expected)
}

/// Room named by a `?room=` query parameter, if any
pub fn room_from_uri(uri: &Uri) -> Option<String> {
    let base = Url::parse("ws://localhost").ok()?;
    let url = base.join(&uri.to_string()).ok()?;

    url.query_pairs()
        .find(|(key, _)| key == "room")
        .map(|(_, value)| value.trim().to_string())
        .filter(|room| !room.is_empty())
}

fn unauthorized() -> ErrorResponse {
    let mut response = ErrorResponse::new(Some("Unauthorized".to_string()));
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    response
}
