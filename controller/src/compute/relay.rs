//! Notification relay
//!
//! One background task per connected compute holds the push channel open and
//! handles frames strictly in order. Heartbeats update the utilization
//! figures; every other frame is handed to the notification bus untouched.
//! The relay never reconnects by itself: when the channel ends the compute is
//! marked disconnected and the next request starts a fresh connect cycle.

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Number, Value};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::{Compute, Credentials};
use crate::constants::events::PING_ACTION;

/// Frame pushed by a compute
#[derive(Debug, Deserialize)]
struct NotificationFrame {
    action: String,
    event: Value,
}

/// Payload of a `ping` frame
#[derive(Debug, Deserialize)]
struct Heartbeat {
    cpu_usage_percent: Number,
    memory_usage_percent: Number,
}

impl Compute {
    /// Replace any previous relay with a fresh one
    pub(crate) async fn start_relay(&self) {
        self.stop_relay().await;

        let compute = self.clone();
        let handle = tokio::spawn(async move { compute.run_relay().await });
        *self.relay.lock().await = Some(handle);
    }

    /// Cancel the relay task and wait for it to finish; this drops the push
    /// channel
    pub(crate) async fn stop_relay(&self) {
        let handle = self.relay.lock().await.take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
            debug!("Notification relay for compute {} stopped", self.id());
        }
    }

    pub async fn is_relay_running(&self) -> bool {
        self.relay
            .lock()
            .await
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    async fn run_relay(self) {
        let (url, credentials) = {
            let state = self.state.read().await;
            (state.notification_url(), state.credentials.clone())
        };

        let request = match channel_request(&url, credentials.as_ref()) {
            Ok(request) => request,
            Err(e) => {
                warn!("Invalid notification channel for compute {}: {}", self.id(), e);
                self.mark_disconnected().await;
                return;
            }
        };

        let mut channel = match connect_async(request).await {
            Ok((channel, _)) => channel,
            Err(e) => {
                warn!("Cannot open notification channel {}: {}", url, e);
                self.mark_disconnected().await;
                return;
            }
        };

        info!("Notification channel open for compute {}", self.id());

        while let Some(message) = channel.next().await {
            let frame = match message {
                Ok(Message::Text(text)) => text.as_str().to_string(),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Compute {} sent a non UTF-8 frame: {}", self.id(), e);
                        break;
                    }
                },
                Ok(Message::Close(_)) => {
                    info!("Compute {} closed the notification channel", self.id());
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!("Notification channel error for compute {}: {}", self.id(), e);
                    break;
                }
            };

            if let Err(e) = self.handle_frame(&frame).await {
                warn!("Malformed notification from compute {}: {}", self.id(), e);
                break;
            }
        }

        self.mark_disconnected().await;
        let _ = channel.close(None).await;
        info!("Notification relay for compute {} ended", self.id());
    }

    /// Handle one frame from the push channel
    pub(crate) async fn handle_frame(&self, frame: &str) -> Result<()> {
        let frame: NotificationFrame = serde_json::from_str(frame)?;

        if frame.action == PING_ACTION {
            let heartbeat: Heartbeat = serde_json::from_value(frame.event)?;
            {
                let mut state = self.state.write().await;
                state.cpu_usage_percent = Some(heartbeat.cpu_usage_percent);
                state.memory_usage_percent = Some(heartbeat.memory_usage_percent);
            }
            self.emit_updated().await;
        } else {
            debug!("Relaying {} from compute {}", frame.action, self.id());
            self.context
                .notification
                .dispatch(&frame.action, frame.event, self.id());
        }

        Ok(())
    }
}

fn channel_request(url: &str, credentials: Option<&Credentials>) -> Result<Request> {
    let mut request = url.into_client_request()?;

    if let Some(credentials) = credentials {
        let token = STANDARD.encode(format!("{}:{}", credentials.user(), credentials.secret()));
        let value = HeaderValue::from_str(&format!("Basic {}", token))
            .map_err(|e| anyhow!("invalid credentials header: {}", e))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    Ok(request)
}
