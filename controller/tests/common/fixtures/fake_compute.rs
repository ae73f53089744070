//! Fake compute with a working notification channel
//!
//! A small axum server answering the version probe and accepting WebSocket
//! connections on the notification path. Frames pushed through
//! [`FakeCompute::push`] are broadcast to every open channel.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use controller::{Compute, ComputeContext, ComputeSettings};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Clone)]
enum FakeFrame {
    Text(String),
    Close,
}

#[derive(Clone)]
struct FakeState {
    version: Arc<Mutex<String>>,
    version_delay: Arc<Mutex<Duration>>,
    version_hits: Arc<AtomicUsize>,
    channels_opened: Arc<AtomicUsize>,
    authorization: Arc<Mutex<Option<String>>>,
    frames: broadcast::Sender<FakeFrame>,
}

pub struct FakeCompute {
    addr: SocketAddr,
    state: FakeState,
}

impl FakeCompute {
    /// Start a fake compute reporting this controller's own version
    pub async fn start() -> Self {
        Self::start_with_version(controller::VERSION).await
    }

    pub async fn start_with_version(version: &str) -> Self {
        let (frames, _) = broadcast::channel(64);
        let state = FakeState {
            version: Arc::new(Mutex::new(version.to_string())),
            version_delay: Arc::new(Mutex::new(Duration::ZERO)),
            version_hits: Arc::new(AtomicUsize::new(0)),
            channels_opened: Arc::new(AtomicUsize::new(0)),
            authorization: Arc::new(Mutex::new(None)),
            frames,
        };

        let app = Router::new()
            .route("/v2/compute/version", get(version_handler))
            .route("/v2/compute/notifications/ws", get(notifications_handler))
            .route("/v2/compute/projects/{project_id}/files", get(files_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake compute");
        let addr = listener.local_addr().expect("fake compute address");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fake compute server");
        });

        Self { addr, state }
    }

    pub fn settings(&self, compute_id: &str) -> ComputeSettings {
        ComputeSettings {
            compute_id: Some(compute_id.to_string()),
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            ..Default::default()
        }
    }

    pub fn compute(&self, compute_id: &str, context: ComputeContext) -> Compute {
        Compute::new(self.settings(compute_id), context).expect("compute")
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn set_version(&self, version: &str) {
        *self.state.version.lock().unwrap() = version.to_string();
    }

    /// Hold every `/version` answer back for `delay`
    pub fn set_version_delay(&self, delay: Duration) {
        *self.state.version_delay.lock().unwrap() = delay;
    }

    /// Number of version probes received
    pub fn version_hits(&self) -> usize {
        self.state.version_hits.load(Ordering::SeqCst)
    }

    /// Number of notification channels accepted so far
    pub fn channels_opened(&self) -> usize {
        self.state.channels_opened.load(Ordering::SeqCst)
    }

    /// Authorization header of the last notification channel
    pub fn channel_authorization(&self) -> Option<String> {
        self.state.authorization.lock().unwrap().clone()
    }

    /// Send a text frame to every open channel
    pub fn push(&self, frame: &str) {
        let _ = self.state.frames.send(FakeFrame::Text(frame.to_string()));
    }

    /// Close every open channel from the compute side
    pub fn close_channels(&self) {
        let _ = self.state.frames.send(FakeFrame::Close);
    }
}

async fn version_handler(State(state): State<FakeState>) -> Json<Value> {
    state.version_hits.fetch_add(1, Ordering::SeqCst);
    let delay = *state.version_delay.lock().unwrap();
    tokio::time::sleep(delay).await;
    let version = state.version.lock().unwrap().clone();
    Json(json!({ "version": version }))
}

async fn files_handler(Path(project_id): Path<String>) -> Json<Value> {
    Json(json!([{ "path": format!("{}/project-files/qemu/disk.qcow2", project_id) }]))
}

async fn notifications_handler(
    ws: WebSocketUpgrade,
    headers: axum::http::HeaderMap,
    State(state): State<FakeState>,
) -> Response {
    let authorization = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    *state.authorization.lock().unwrap() = authorization;

    ws.on_upgrade(move |socket| relay_frames(socket, state))
}

async fn relay_frames(mut socket: WebSocket, state: FakeState) {
    let mut frames = state.frames.subscribe();
    state.channels_opened.fetch_add(1, Ordering::SeqCst);

    while let Ok(frame) = frames.recv().await {
        match frame {
            FakeFrame::Text(text) => {
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            FakeFrame::Close => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
        }
    }
}
