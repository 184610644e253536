// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! WebSocket display surface for dashboards and companion apps

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use parking_lot::RwLock;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::{DisplaySurface, LiveSnapshot};
use crate::error::{OrchestratorError, Result};

/// State shared by the surface, the accept loop and every connection
struct Shared {
    max_clients: usize,
    attached: AtomicUsize,
    latest: RwLock<Option<String>>,
    snapshots: broadcast::Sender<String>,
}

impl Shared {
    /// Claim a client slot; `false` when the surface is full
    fn reserve(&self) -> bool {
        self.attached
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < self.max_clients).then_some(n + 1))
            .is_ok()
    }

    fn release(&self) {
        self.attached.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Serves the live snapshot to every connected WebSocket client
pub struct WebSocketSurface {
    port: u16,
    shared: Arc<Shared>,
}

impl WebSocketSurface {
    pub fn new(port: u16, max_clients: usize) -> Self {
        let (snapshots, _) = broadcast::channel(64);

        Self {
            port,
            shared: Arc::new(Shared {
                max_clients,
                attached: AtomicUsize::new(0),
                latest: RwLock::new(None),
                snapshots,
            }),
        }
    }

    /// Bind and accept in the background; returns the bound address
    pub async fn start(&self, shutdown: broadcast::Receiver<()>) -> Result<SocketAddr> {
        let listener = TcpListener::bind(("0.0.0.0", self.port)).await?;
        let local = listener.local_addr()?;
        info!("Live status WebSocket listening on ws://{}", local);

        tokio::spawn(accept_loop(listener, self.shared.clone(), shutdown));
        Ok(local)
    }

    pub fn client_count(&self) -> usize {
        self.shared.attached.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DisplaySurface for WebSocketSurface {
    fn is_attached(&self) -> bool {
        self.client_count() > 0
    }

    async fn push(&self, snapshot: &LiveSnapshot) -> Result<()> {
        let json = serde_json::json!({ "type": "status", "data": snapshot }).to_string();
        *self.shared.latest.write() = Some(json.clone());

        self.shared
            .snapshots
            .send(json)
            .map(|_| ())
            .map_err(|_| OrchestratorError::TransientIo("no display attached".into()))
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>, mut shutdown: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    if !shared.reserve() {
                        warn!("Display limit of {} reached, refusing {}", shared.max_clients, addr);
                        continue;
                    }
                    let snapshots = shared.snapshots.subscribe();
                    tokio::spawn(serve(stream, addr, shared.clone(), snapshots));
                }
                Err(e) => error!("Accept error: {}", e),
            },
            _ = shutdown.recv() => {
                info!("Live status WebSocket shutting down");
                break;
            }
        }
    }
}

/// Answer to a client text frame, if any
fn reply_to(text: &str) -> Option<String> {
    let cmd: serde_json::Value = serde_json::from_str(text).ok()?;
    (cmd.get("type")?.as_str()? == "ping").then(|| serde_json::json!({ "type": "pong" }).to_string())
}

async fn serve(stream: TcpStream, addr: SocketAddr, shared: Arc<Shared>, mut snapshots: broadcast::Receiver<String>) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", addr, e);
            shared.release();
            return;
        }
    };
    let display_id = uuid::Uuid::new_v4();
    info!("Display attached from {} ({})", addr, display_id);

    let (mut tx, mut rx) = ws.split();

    let hello = serde_json::json!({
        "type": "welcome",
        "client_id": display_id,
        "server": "VitalSync",
        "version": env!("CARGO_PKG_VERSION"),
    });
    let latest = shared.latest.read().clone();
    let greeting = std::iter::once(hello.to_string()).chain(latest);
    for text in greeting {
        if let Err(e) = tx.send(Message::Text(text)).await {
            warn!("Failed to greet {}: {}", addr, e);
        }
    }

    loop {
        tokio::select! {
            incoming = rx.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    debug!("{} sent {}", addr, text);
                    if let Some(reply) = reply_to(&text) {
                        let _ = tx.send(Message::Text(reply)).await;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = tx.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    warn!("WebSocket error from {}: {}", addr, e);
                    break;
                }
                Some(Ok(_)) => {}
            },
            outgoing = snapshots.recv() => match outgoing {
                Ok(json) => {
                    if let Err(e) = tx.send(Message::Text(json)).await {
                        warn!("Display {} dropped: {}", addr, e);
                        break;
                    }
                }
                // Only the newest snapshot matters
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    shared.release();
    info!("Display {} detached", addr);
}
