//! Client-side proxy for one remote compute
//!
//! A compute is a remote execution backend exposing a versioned HTTP API and a
//! push channel for notifications. The controller owns one [`Compute`] per
//! registered backend and talks to it exclusively through the verbs defined in
//! [`verbs`].
//!
//! # Architecture
//!
//! ```text
//! caller → verbs → connection (probe once) → request executor → session → compute
//!                        ↓
//!                  notification relay (push channel) → NotificationBus
//! ```
//!
//! # Lifecycle
//!
//! 1. Created disconnected; nothing touches the network
//! 2. First request probes `/version` and checks major.minor compatibility
//! 3. On success the relay task is started and `compute.updated` is emitted
//! 4. A push channel failure, a settings update or `close()` returns the
//!    compute to disconnected; the next request probes again

pub mod connection;
pub mod relay;
pub mod request;
pub mod session;
pub mod verbs;

pub use connection::ConnectionState;
pub use request::{ComputeResponse, QueryOptions, RequestBody};
pub use session::SessionHolder;
pub use verbs::FileStream;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Number;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::constants::{api, defaults, events, naming};
use crate::errors::{ComputeError, Result};
use crate::images::ImageScanner;
use crate::notification::{NotificationBus, PersistenceTrigger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    /// Scheme of the push channel for this protocol
    pub fn websocket_scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "ws",
            Protocol::Https => "wss",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP Basic credentials for a compute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    user: String,
    password: Option<String>,
}

impl Credentials {
    /// Blank users mean no authentication at all, whatever the password.
    /// An empty password still authenticates, with a blank secret.
    pub fn new(user: Option<&str>, password: Option<&str>) -> Option<Self> {
        let user = user.map(str::trim).filter(|u| !u.is_empty())?;
        let password = password
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        Some(Self {
            user: user.to_string(),
            password,
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Password sent on the wire
    pub fn secret(&self) -> &str {
        self.password.as_deref().unwrap_or("")
    }
}

/// Settings a compute is registered with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeSettings {
    #[serde(default)]
    pub compute_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_host() -> String {
    defaults::HOST.to_string()
}

fn default_port() -> u16 {
    defaults::PORT
}

impl Default for ComputeSettings {
    fn default() -> Self {
        Self {
            compute_id: None,
            name: None,
            protocol: Protocol::default(),
            host: default_host(),
            port: default_port(),
            user: None,
            password: None,
        }
    }
}

/// Fields that can be changed on a registered compute. Every applied update
/// invalidates the session and forces a new probe.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ComputeUpdate {
    /// `Some(None)` (or a blank name) drops the explicit name so it is
    /// derived from the connection settings again
    #[serde(default, deserialize_with = "present")]
    pub name: Option<Option<String>>,
    pub protocol: Option<Protocol>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// Distinguish an absent field from an explicit `null`
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Collaborators handed to every compute by the controller
#[derive(Clone)]
pub struct ComputeContext {
    pub notification: Arc<dyn NotificationBus>,
    pub persistence: Arc<dyn PersistenceTrigger>,
    pub images: Arc<dyn ImageScanner>,
    pub local_compute_enabled: bool,
}

/// Full description of a compute, as published on the notification bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeSnapshot {
    pub compute_id: String,
    pub name: String,
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub connected: bool,
    pub cpu_usage_percent: Option<Number>,
    pub memory_usage_percent: Option<Number>,
}

/// Reduced description stored with a topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeTopology {
    pub compute_id: String,
    pub name: String,
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
}

/// Display name derived from the connection settings.
pub fn derive_name(
    compute_id: &str,
    protocol: Protocol,
    host: &str,
    port: u16,
    user: Option<&str>,
) -> String {
    if compute_id == naming::LOCAL_COMPUTE_ID {
        return naming::LOCAL_COMPUTE_NAME.to_string();
    }

    match user {
        Some(user) => {
            // Generated users are commonly very long
            let user = if user.chars().count() > naming::MAX_USER_DISPLAY_LEN {
                let prefix: String = user.chars().take(naming::ELIDED_USER_PREFIX_LEN).collect();
                format!("{}...", prefix)
            } else {
                user.to_string()
            };
            format!("{}://{}@{}:{}", protocol, user, host, port)
        }
        None => format!("{}://{}:{}", protocol, host, port),
    }
}

#[derive(Debug)]
pub(crate) struct ComputeState {
    pub(crate) name: Option<String>,
    pub(crate) protocol: Protocol,
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) credentials: Option<Credentials>,
    pub(crate) connection: ConnectionState,
    pub(crate) version: Option<String>,
    /// Usage as reported by the last heartbeat, kept as sent
    pub(crate) cpu_usage_percent: Option<Number>,
    pub(crate) memory_usage_percent: Option<Number>,
    /// Bumped by `close` and `update`; a probe started under an older
    /// generation must not connect
    pub(crate) generation: u64,
}

impl ComputeState {
    fn display_name(&self, compute_id: &str) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => derive_name(
                compute_id,
                self.protocol,
                &self.host,
                self.port,
                self.credentials.as_ref().map(|c| c.user()),
            ),
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!(
            "{}://{}:{}{}{}",
            self.protocol,
            self.host,
            self.port,
            api::COMPUTE_PREFIX,
            path
        )
    }

    pub(crate) fn notification_url(&self) -> String {
        format!(
            "{}://{}:{}{}{}",
            self.protocol.websocket_scheme(),
            self.host,
            self.port,
            api::COMPUTE_PREFIX,
            api::NOTIFICATIONS_PATH
        )
    }

    fn snapshot(&self, compute_id: &str) -> ComputeSnapshot {
        ComputeSnapshot {
            compute_id: compute_id.to_string(),
            name: self.display_name(compute_id),
            protocol: self.protocol,
            host: self.host.clone(),
            port: self.port,
            user: self.credentials.as_ref().map(|c| c.user().to_string()),
            connected: self.connection == ConnectionState::Connected,
            cpu_usage_percent: self.cpu_usage_percent.clone(),
            memory_usage_percent: self.memory_usage_percent.clone(),
        }
    }
}

/// Proxy for one remote compute. Cloning yields another handle on the same
/// compute.
pub struct Compute {
    id: String,
    pub(crate) state: Arc<RwLock<ComputeState>>,
    pub(crate) session: SessionHolder,
    pub(crate) relay: Arc<Mutex<Option<JoinHandle<()>>>>,
    pub(crate) probe_lock: Arc<Mutex<()>>,
    pub(crate) context: ComputeContext,
}

impl Compute {
    pub fn new(settings: ComputeSettings, context: ComputeContext) -> Result<Self> {
        let id = settings
            .compute_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if id == naming::LOCAL_COMPUTE_ID && !context.local_compute_enabled {
            return Err(ComputeError::LocalComputeDisabled);
        }

        info!("Create compute {}", id);

        let state = ComputeState {
            name: settings.name,
            protocol: settings.protocol,
            host: settings.host,
            port: settings.port,
            credentials: Credentials::new(settings.user.as_deref(), settings.password.as_deref()),
            connection: ConnectionState::Disconnected,
            version: None,
            cpu_usage_percent: None,
            memory_usage_percent: None,
            generation: 0,
        };

        Ok(Self {
            id,
            state: Arc::new(RwLock::new(state)),
            session: SessionHolder::new(),
            relay: Arc::new(Mutex::new(None)),
            probe_lock: Arc::new(Mutex::new(())),
            context,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn name(&self) -> String {
        self.state.read().await.display_name(&self.id)
    }

    pub async fn protocol(&self) -> Protocol {
        self.state.read().await.protocol
    }

    pub async fn host(&self) -> String {
        self.state.read().await.host.clone()
    }

    pub async fn port(&self) -> u16 {
        self.state.read().await.port
    }

    pub async fn credentials(&self) -> Option<Credentials> {
        self.state.read().await.credentials.clone()
    }

    /// Version reported by the compute, `None` until the first successful probe
    pub async fn version(&self) -> Option<String> {
        self.state.read().await.version.clone()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.state.read().await.connection
    }

    pub async fn is_connected(&self) -> bool {
        self.connection_state().await == ConnectionState::Connected
    }

    pub async fn cpu_usage_percent(&self) -> Option<f64> {
        self.state
            .read()
            .await
            .cpu_usage_percent
            .as_ref()
            .and_then(Number::as_f64)
    }

    pub async fn memory_usage_percent(&self) -> Option<f64> {
        self.state
            .read()
            .await
            .memory_usage_percent
            .as_ref()
            .and_then(Number::as_f64)
    }

    pub async fn snapshot(&self) -> ComputeSnapshot {
        self.state.read().await.snapshot(&self.id)
    }

    pub async fn topology_dump(&self) -> ComputeTopology {
        let state = self.state.read().await;
        ComputeTopology {
            compute_id: self.id.clone(),
            name: state.display_name(&self.id),
            protocol: state.protocol,
            host: state.host.clone(),
            port: state.port,
        }
    }

    /// Apply new settings. The current session is dropped and the compute
    /// is disconnected; the next request probes it again.
    #[instrument(skip(self, changes), fields(compute_id = %self.id))]
    pub async fn update(&self, changes: ComputeUpdate) {
        {
            let mut state = self.state.write().await;

            if let Some(name) = changes.name {
                state.name = name.filter(|name| !name.trim().is_empty());
            }
            if let Some(protocol) = changes.protocol {
                state.protocol = protocol;
            }
            if let Some(host) = changes.host {
                state.host = host;
            }
            if let Some(port) = changes.port {
                state.port = port;
            }
            if changes.user.is_some() || changes.password.is_some() {
                let current = state.credentials.clone();
                let user = changes
                    .user
                    .or_else(|| current.as_ref().map(|c| c.user().to_string()));
                let password = changes
                    .password
                    .or_else(|| current.as_ref().and_then(|c| c.password().map(str::to_string)));
                state.credentials = Credentials::new(user.as_deref(), password.as_deref());
            }

            state.connection = ConnectionState::Disconnected;
            state.generation += 1;
        }

        self.session.close().await;
        self.stop_relay().await;

        info!("Compute {} updated", self.id);
        self.emit_updated().await;
        self.context.persistence.save();
    }

    /// Disconnect and release the session and the push channel
    #[instrument(skip(self), fields(compute_id = %self.id))]
    pub async fn close(&self) {
        {
            let mut state = self.state.write().await;
            state.connection = ConnectionState::Disconnected;
            state.generation += 1;
        }
        self.session.close().await;
        self.stop_relay().await;
        info!("Compute {} closed", self.id);
    }

    pub(crate) async fn mark_disconnected(&self) {
        self.state.write().await.connection = ConnectionState::Disconnected;
    }

    pub(crate) async fn emit_updated(&self) {
        let snapshot = self.snapshot().await;
        match serde_json::to_value(&snapshot) {
            Ok(payload) => self.context.notification.emit(events::COMPUTE_UPDATED, payload),
            Err(e) => tracing::error!("Cannot serialize compute {}: {}", self.id, e),
        }
    }
}

impl Clone for Compute {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            state: self.state.clone(),
            session: self.session.clone(),
            relay: self.relay.clone(),
            probe_lock: self.probe_lock.clone(),
            context: self.context.clone(),
        }
    }
}

impl fmt::Debug for Compute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compute").field("id", &self.id).finish_non_exhaustive()
    }
}
