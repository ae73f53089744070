//! Typed verbs used by the rest of the controller
//!
//! Each verb connects the compute if needed, then runs one request. Errors
//! come back exactly as the request executor classified them.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::PathBuf;
use std::pin::Pin;
use tracing::{debug, info, warn};

use super::request::{authorize, classify_status, ComputeResponse, QueryOptions, RequestBody};
use super::Compute;
use crate::constants::http::LISTING_TIMEOUT;
use crate::constants::images::MERGED_IMAGE_KINDS;
use crate::errors::{ComputeError, Result};

/// Body of a file served by a compute, consumed chunk by chunk
pub type FileStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

impl Compute {
    /// Connect if needed, then run the request
    pub async fn http_query(
        &self,
        method: Method,
        path: &str,
        body: impl Into<RequestBody>,
        options: QueryOptions,
    ) -> Result<ComputeResponse> {
        self.connect().await?;
        self.execute(method, path, body.into(), options).await
    }

    pub async fn get(&self, path: &str) -> Result<ComputeResponse> {
        self.http_query(Method::GET, path, RequestBody::Empty, QueryOptions::default())
            .await
    }

    pub async fn post(&self, path: &str, body: impl Into<RequestBody>) -> Result<ComputeResponse> {
        self.http_query(Method::POST, path, body, QueryOptions::default())
            .await
    }

    pub async fn put(&self, path: &str, body: impl Into<RequestBody>) -> Result<ComputeResponse> {
        self.http_query(Method::PUT, path, body, QueryOptions::default())
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<ComputeResponse> {
        self.http_query(Method::DELETE, path, RequestBody::Empty, QueryOptions::default())
            .await
    }

    /// Forward a call to an emulator hosted on the compute. Emulator
    /// operations can take minutes, so no timeout applies.
    pub async fn forward(
        &self,
        method: Method,
        category: &str,
        path: &str,
        body: impl Into<RequestBody>,
    ) -> Result<Value> {
        let path = format!("/{}/{}", category, path);
        let response = self
            .http_query(method, &path, body, QueryOptions::unbounded())
            .await?;
        Ok(response.json)
    }

    /// Images the compute offers for an emulator kind. For qemu, dynamips
    /// and iou, images found locally and absent on the compute are appended.
    pub async fn images(&self, kind: &str) -> Result<Vec<Value>> {
        let path = format!("/{}/images", kind);
        let response = self
            .http_query(
                Method::GET,
                &path,
                RequestBody::Empty,
                QueryOptions::with_timeout(LISTING_TIMEOUT),
            )
            .await?;

        let mut images = match response.json {
            Value::Array(images) => images,
            Value::Object(map) if map.is_empty() => Vec::new(),
            other => {
                warn!("Compute {} returned an unexpected image listing: {}", self.id(), other);
                return Err(ComputeError::NotACompute {
                    compute_id: self.id().to_string(),
                });
            }
        };

        if !MERGED_IMAGE_KINDS.contains(&kind) {
            return Ok(images);
        }

        let mut known: HashSet<String> = images
            .iter()
            .filter_map(|image| image.get("filename").and_then(Value::as_str))
            .map(str::to_string)
            .collect();

        let mut added = 0;
        for path in self.local_images(kind).await {
            let Some(filename) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            if known.insert(filename.clone()) {
                images.push(json!({"filename": filename, "path": filename}));
                added += 1;
            }
        }

        debug!(
            "Compute {} lists {} {} images ({} added from local storage)",
            self.id(),
            images.len(),
            kind,
            added
        );
        Ok(images)
    }

    async fn local_images(&self, kind: &str) -> Vec<PathBuf> {
        let scanner = self.context.images.clone();
        let kind = kind.to_string();

        match tokio::task::spawn_blocking(move || scanner.scan(&kind)).await {
            Ok(paths) => paths,
            Err(e) => {
                warn!("Local image scan failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Files of a project stored on the compute
    pub async fn list_files(&self, project_id: &str) -> Result<Value> {
        let path = format!("/projects/{}/files", project_id);
        let response = self
            .http_query(
                Method::GET,
                &path,
                RequestBody::Empty,
                QueryOptions::with_timeout(LISTING_TIMEOUT),
            )
            .await?;
        Ok(response.json)
    }

    /// Download a project file
    pub async fn download_file(&self, project_id: &str, path: &str) -> Result<FileStream> {
        let resource = format!("/projects/{}/files/{}", project_id, path);
        self.open_stream(&resource, path).await
    }

    /// Follow a project file that is still being written (captures, logs)
    pub async fn stream_file(&self, project_id: &str, path: &str) -> Result<FileStream> {
        let resource = format!("/projects/{}/stream/{}", project_id, path);
        self.open_stream(&resource, path).await
    }

    async fn open_stream(&self, resource: &str, path: &str) -> Result<FileStream> {
        self.connect().await?;

        let (url, credentials) = self.target(resource).await;
        let client = self.session.client().await;

        let response = authorize(client.get(&url), credentials.as_ref())
            .send()
            .await
            .map_err(|e| self.connection_error(&url, e))?;

        let status = response.status().as_u16();
        if status == 404 {
            return Err(ComputeError::NotFound {
                message: format!("{} not found on compute", path),
            });
        }
        if status >= 300 {
            let payload = response
                .bytes()
                .await
                .map_err(|e| self.connection_error(&url, e))?;
            return Err(classify_status(self.id(), &url, status, &payload, false));
        }

        info!("Streaming {} from compute {}", path, self.id());

        let compute_id = self.id().to_string();
        let stream = response.bytes_stream().map(move |chunk| {
            chunk.map_err(|e| ComputeError::Connection {
                compute_id: compute_id.clone(),
                url: url.clone(),
                reason: e.to_string(),
            })
        });
        Ok(Box::pin(stream))
    }
}
