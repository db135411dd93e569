//! WebSocket surface for the on-screen client.
//!
//! Overlays go out as binary packets `u32 LE json length | scene json | png`.
//! Status and attendance notices go out as JSON text. The client sends layout
//! changes back as JSON text commands.

use crate::overlay::OverlayScene;
use axum::{
    Json, Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use capture::{CameraStatus, Orientation, SessionManager};
use geometry::Size;
use schema::AttendanceMark;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tower_http::cors::CorsLayer;

const EVENT_CAPACITY: usize = 16;

/// Painted overlay ready for the display client.
#[derive(Debug)]
pub struct OverlayPacket {
    pub scene: OverlayScene,
    pub png: Vec<u8>,
}

impl OverlayPacket {
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let json = serde_json::to_vec(&self.scene)?;

        let mut binary_msg = Vec::with_capacity(4 + json.len() + self.png.len());
        binary_msg.extend_from_slice(&(json.len() as u32).to_le_bytes());
        binary_msg.extend_from_slice(&json);
        binary_msg.extend_from_slice(&self.png);
        Ok(binary_msg)
    }
}

/// What the client shows in its status strip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectivityStatus {
    pub camera_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_fault: Option<String>,
    pub channel_connected: bool,
}

impl ConnectivityStatus {
    pub fn apply_camera(&mut self, status: &CameraStatus) {
        self.camera_available = status.is_live();
        self.camera_fault = match status {
            CameraStatus::Unavailable(e) => Some(e.to_string()),
            _ => None,
        };
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DisplayMessage {
    Status(ConnectivityStatus),
    Marked { marks: Vec<AttendanceMark> },
}

#[derive(Debug, Clone)]
pub enum DisplayEvent {
    Overlay(Arc<OverlayPacket>),
    Message(DisplayMessage),
}

/// Layout changes reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Resize { width: u32, height: u32 },
    Orientation { portrait: bool },
    Visibility { visible: bool },
}

impl ClientCommand {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn apply(&self, session: &SessionManager) {
        match *self {
            ClientCommand::Resize { width, height } => {
                let size = Size::new(width, height);
                if size.is_empty() {
                    tracing::debug!(width, height, "Ignoring empty display size");
                    return;
                }
                session.on_resize(size);
            }
            ClientCommand::Orientation { portrait } => {
                session.on_orientation_change(if portrait {
                    Orientation::Portrait
                } else {
                    Orientation::Landscape
                });
            }
            ClientCommand::Visibility { visible } => session.on_visibility_change(visible),
        }
    }
}

/// Fan-out point for display events. Cheap to clone.
#[derive(Clone)]
pub struct DisplayHub {
    tx: broadcast::Sender<DisplayEvent>,
    status: Arc<watch::Sender<ConnectivityStatus>>,
}

impl Default for DisplayHub {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (status, _) = watch::channel(ConnectivityStatus::default());
        Self {
            tx,
            status: Arc::new(status),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DisplayEvent> {
        self.tx.subscribe()
    }

    pub fn status(&self) -> ConnectivityStatus {
        self.status.borrow().clone()
    }

    pub fn publish_overlay(&self, packet: OverlayPacket) {
        // No receivers just means no client is connected.
        let _ = self.tx.send(DisplayEvent::Overlay(Arc::new(packet)));
    }

    pub fn publish_marks(&self, marks: Vec<AttendanceMark>) {
        let _ = self
            .tx
            .send(DisplayEvent::Message(DisplayMessage::Marked { marks }));
    }

    /// Apply `change` and broadcast only when the status actually changed.
    pub fn update_status(&self, change: impl FnOnce(&mut ConnectivityStatus)) -> bool {
        let changed = self.status.send_if_modified(|status| {
            let before = status.clone();
            change(status);
            *status != before
        });

        if changed {
            let status = self.status();
            tracing::info!(
                camera_available = status.camera_available,
                camera_fault = status.camera_fault.as_deref(),
                channel_connected = status.channel_connected,
                "Connectivity changed"
            );
            let _ = self.tx.send(DisplayEvent::Message(DisplayMessage::Status(status)));
        }
        changed
    }
}

#[derive(Clone)]
struct AppState {
    hub: DisplayHub,
    session: SessionManager,
}

pub async fn run_server(
    listener: TcpListener,
    hub: DisplayHub,
    session: SessionManager,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(AppState { hub, session });

    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Display server listening on {}", addr);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.hub.status())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    tracing::info!("Display client connected");

    let mut rx = state.hub.subscribe();

    let greeting = DisplayMessage::Status(state.hub.status());
    if send_message(&mut socket, &greeting).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = rx.recv() => {
                let sent = match event {
                    Ok(DisplayEvent::Overlay(packet)) => match packet.encode() {
                        Ok(bytes) => socket.send(Message::Binary(bytes)).await,
                        Err(e) => {
                            tracing::error!("JSON serialization error: {}", e);
                            continue;
                        }
                    },
                    Ok(DisplayEvent::Message(message)) => send_message(&mut socket, &message).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Display client lagging, dropped events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if sent.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => match ClientCommand::parse(&text) {
                        Ok(command) => command.apply(&state.session),
                        Err(e) => tracing::debug!(error = %e, "Ignoring malformed client command"),
                    },
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::info!("Display client disconnected");
}

async fn send_message(socket: &mut WebSocket, message: &DisplayMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(message) {
        Ok(text) => socket.send(Message::Text(text)).await,
        Err(e) => {
            tracing::error!("JSON serialization error: {}", e);
            Ok(())
        }
    }
}
