//! Connection state machine
//!
//! ```text
//! Disconnected → Probing → Connected
//!       ↑           │           │
//!       └───────────┴───────────┘  probe failure, push channel loss,
//!                                  update() or close()
//! ```
//!
//! Traffic is gated on `Connected`. The version probe runs at most once at a
//! time; callers arriving while it is in flight wait for its outcome.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::request::{QueryOptions, RequestBody};
use super::Compute;
use crate::constants::api::VERSION_PATH;
use crate::errors::{ComputeError, Result};
use crate::version::{is_compatible, VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Probing,
    Connected,
}

impl Compute {
    /// Probe the compute unless it is already connected. On success the
    /// notification relay is started and `compute.updated` is emitted.
    #[instrument(skip(self), fields(compute_id = %self.id()))]
    pub async fn connect(&self) -> Result<()> {
        if self.is_connected().await {
            return Ok(());
        }

        let _probe = self.probe_lock.lock().await;
        if self.is_connected().await {
            return Ok(());
        }

        let generation = {
            let mut state = self.state.write().await;
            state.connection = ConnectionState::Probing;
            state.generation
        };

        let version = match self.probe_version().await {
            Ok(version) => version,
            Err(e) => {
                self.mark_disconnected().await;
                warn!("Compute {} is not usable: {}", self.id(), e);
                return Err(e);
            }
        };

        {
            let mut state = self.state.write().await;
            if state.generation != generation {
                return Err(self.superseded(&state.url(VERSION_PATH)));
            }
            state.version = Some(version.clone());
            state.connection = ConnectionState::Connected;
        }

        self.start_relay().await;

        // close() or update() may have run while the relay was starting
        let current = self.state.read().await.generation;
        if current != generation {
            self.stop_relay().await;
            let url = self.state.read().await.url(VERSION_PATH);
            return Err(self.superseded(&url));
        }

        info!("Connected to compute {} (version {})", self.id(), version);
        self.emit_updated().await;
        Ok(())
    }

    fn superseded(&self, url: &str) -> ComputeError {
        info!("Compute {} was closed or updated during its version probe", self.id());
        ComputeError::Connection {
            compute_id: self.id().to_string(),
            url: url.to_string(),
            reason: "compute closed or updated during the version probe".to_string(),
        }
    }

    /// `GET /version` and check that major.minor matches this build
    async fn probe_version(&self) -> Result<String> {
        let response = self
            .execute(Method::GET, VERSION_PATH, RequestBody::Empty, QueryOptions::default())
            .await?;

        let version = match response.json.get("version").and_then(Value::as_str) {
            Some(version) => version.to_string(),
            None => {
                self.session.close().await;
                return Err(ComputeError::NotACompute {
                    compute_id: self.id().to_string(),
                });
            }
        };

        if !is_compatible(VERSION, &version) {
            self.session.close().await;
            return Err(ComputeError::VersionMismatch {
                compute_id: self.id().to_string(),
                local: VERSION.to_string(),
                remote: version,
            });
        }

        Ok(version)
    }
}
