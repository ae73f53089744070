//! Lazily created HTTP session shared by every request to one compute

use reqwest::Client;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Holds the authenticated transport session of a compute.
///
/// The session is created on first use and dropped whenever the compute
/// settings change; requests already in flight keep their own handle.
#[derive(Clone, Default)]
pub struct SessionHolder {
    client: Arc<Mutex<Option<Client>>>,
}

impl SessionHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session, created if none is open
    pub async fn client(&self) -> Client {
        let mut client = self.client.lock().await;
        client
            .get_or_insert_with(|| {
                debug!("Opening new HTTP session");
                Client::new()
            })
            .clone()
    }

    /// Drop the current session. Returns whether one was open.
    pub async fn close(&self) -> bool {
        self.client.lock().await.take().is_some()
    }

    pub async fn is_open(&self) -> bool {
        self.client.lock().await.is_some()
    }
}
