use crate::error::CoreError;
use crate::push::{PushRegistry, SessionId};
use async_trait::async_trait;
use chorus_api::UserId;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use uuid::Uuid;

/// Long-lived bidirectional frame connection, as the gateway hands it to the
/// core after the upgrade. Frames are opaque strings here; the engine only
/// ever writes JSON notifications and discards inbound frames.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    async fn send_frame(&self, frame: String) -> Result<(), CoreError>;

    /// Next inbound frame; `Ok(None)` on clean close.
    async fn recv_frame(&self) -> Result<Option<String>, CoreError>;
}

/// Handshake check. The token arrives in a header or query parameter; the
/// credential layer behind this trait is out of scope for the engine.
#[async_trait]
pub trait SessionAuthenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<UserId, CoreError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Connecting,
    Authenticated,
    Active,
    Closing,
    Terminated,
}

/// Handle to a live push session. Dropping it does not tear the session
/// down; teardown happens on client disconnect, transport error, queue
/// overflow, or unregistration.
pub struct PushSession {
    pub session_id: SessionId,
    pub user_id: UserId,
    state: watch::Receiver<SessionState>,
}

impl PushSession {
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub async fn wait_terminated(&mut self) {
        while *self.state.borrow() != SessionState::Terminated {
            if self.state.changed().await.is_err() {
                return;
            }
        }
    }
}

/// States only move forward; a late transition request loses.
fn advance(state_tx: &watch::Sender<SessionState>, next: SessionState) {
    state_tx.send_if_modified(|state| {
        if next > *state {
            *state = next;
            true
        } else {
            false
        }
    });
}

/// Runs the session handshake and starts the per-session reader and writer
/// tasks. The writer drains the outbound queue to the transport; the reader
/// drains inbound frames until close. Either side failing moves the session
/// to `Closing`, removes it from the registry, and the session reaches
/// `Terminated` once both tasks have exited. Teardown never touches the
/// user's other sessions.
pub async fn connect_session(
    registry: Arc<PushRegistry>,
    authenticator: Arc<dyn SessionAuthenticator>,
    transport: Arc<dyn SessionTransport>,
    token: &str,
) -> Result<PushSession, CoreError> {
    let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
    let user_id = authenticator
        .authenticate(token)
        .await
        .map_err(|_| CoreError::Unauthenticated)?;
    advance(&state_tx, SessionState::Authenticated);

    let session_id = Uuid::new_v4();
    let mut queue = registry.register(&user_id, session_id).await;
    advance(&state_tx, SessionState::Active);

    let state_tx = Arc::new(state_tx);

    let writer = {
        let transport = transport.clone();
        let registry = registry.clone();
        let state_tx = state_tx.clone();
        let user_id = user_id.clone();
        tokio::spawn(async move {
            while let Some(frame) = queue.recv().await {
                if let Err(err) = transport.send_frame(frame).await {
                    debug!("push session {} write failed: {}", session_id, err);
                    break;
                }
            }
            advance(&state_tx, SessionState::Closing);
            registry.unregister(&user_id, session_id).await;
        })
    };

    let reader = {
        let transport = transport.clone();
        let registry = registry.clone();
        let state_tx = state_tx.clone();
        let mut closing = state_rx.clone();
        let user_id = user_id.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    inbound = transport.recv_frame() => match inbound {
                        // Inbound frames are liveness only on this channel.
                        Ok(Some(_)) => continue,
                        Ok(None) | Err(_) => break,
                    },
                    changed = closing.changed() => {
                        if changed.is_err() || *closing.borrow() >= SessionState::Closing {
                            break;
                        }
                    }
                }
            }
            advance(&state_tx, SessionState::Closing);
            registry.unregister(&user_id, session_id).await;
        })
    };

    {
        let state_tx = state_tx.clone();
        tokio::spawn(async move {
            let _ = writer.await;
            let _ = reader.await;
            advance(&state_tx, SessionState::Terminated);
        });
    }

    Ok(PushSession {
        session_id,
        user_id,
        state: state_rx,
    })
}

#[derive(Clone, Default)]
pub struct StaticAuthenticator {
    tokens: Arc<Mutex<HashMap<String, UserId>>>,
}

impl StaticAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_token(&self, token: impl Into<String>, user: UserId) {
        self.tokens.lock().await.insert(token.into(), user);
    }
}

#[async_trait]
impl SessionAuthenticator for StaticAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<UserId, CoreError> {
        self.tokens
            .lock()
            .await
            .get(token)
            .cloned()
            .ok_or(CoreError::Unauthenticated)
    }
}

/// In-process transport: the server half implements [`SessionTransport`], the
/// client half is what a connected device would hold.
pub struct DuplexTransport {
    inbound: Mutex<mpsc::Receiver<String>>,
    outbound: mpsc::Sender<String>,
}

pub struct ClientHalf {
    tx: mpsc::Sender<String>,
    rx: mpsc::Receiver<String>,
}

pub fn duplex(capacity: usize) -> (Arc<DuplexTransport>, ClientHalf) {
    let (to_server, from_client) = mpsc::channel(capacity);
    let (to_client, from_server) = mpsc::channel(capacity);
    (
        Arc::new(DuplexTransport {
            inbound: Mutex::new(from_client),
            outbound: to_client,
        }),
        ClientHalf {
            tx: to_server,
            rx: from_server,
        },
    )
}

impl ClientHalf {
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    pub async fn send(&self, frame: impl Into<String>) -> Result<(), CoreError> {
        self.tx
            .send(frame.into())
            .await
            .map_err(|_| CoreError::Transport("session closed".to_string()))
    }
}

#[async_trait]
impl SessionTransport for DuplexTransport {
    async fn send_frame(&self, frame: String) -> Result<(), CoreError> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| CoreError::Transport("peer closed".to_string()))
    }

    async fn recv_frame(&self) -> Result<Option<String>, CoreError> {
        Ok(self.inbound.lock().await.recv().await)
    }
}
