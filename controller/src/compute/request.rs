//! Request execution and response classification
//!
//! Every HTTP exchange with a compute goes through [`Compute::execute`]. It is
//! the only place where transport errors and HTTP statuses are turned into
//! [`ComputeError`] values; callers above it propagate them unchanged.

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Body, Client, Method, RequestBuilder};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::{Compute, Credentials};
use crate::constants::http::REQUEST_TIMEOUT;
use crate::errors::{ComputeConflict, ComputeError, Result};

const JSON_CONTENT: &str = "application/json";
const OCTET_STREAM_CONTENT: &str = "application/octet-stream";

/// Body of a request to a compute
#[derive(Debug, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Structured data, JSON encoded on the wire
    Json(Value),
    /// Bytes or a byte stream sent unmodified as `application/octet-stream`
    Raw(Body),
}

impl RequestBody {
    /// Serialize any value into a JSON body
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self::from(serde_json::to_value(value)?))
    }

    pub fn bytes(data: impl Into<Bytes>) -> Self {
        RequestBody::Raw(Body::from(data.into()))
    }

    /// Stream a large upload (image, project file) without buffering it
    pub fn stream<S>(stream: S) -> Self
    where
        S: futures::TryStream + Send + Sync + 'static,
        S::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
        Bytes: From<S::Ok>,
    {
        RequestBody::Raw(Body::wrap_stream(stream))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }

    fn content_type(&self) -> &'static str {
        match self {
            RequestBody::Raw(_) => OCTET_STREAM_CONTENT,
            _ => JSON_CONTENT,
        }
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RequestBody::Empty,
            Value::Object(ref map) if map.is_empty() => RequestBody::Empty,
            value => RequestBody::Json(value),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(data: Bytes) -> Self {
        RequestBody::bytes(data)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(data: Vec<u8>) -> Self {
        RequestBody::bytes(data)
    }
}

/// Per-request options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// `None` lets the request run until the compute answers
    pub timeout: Option<Duration>,
    /// Keep the response body as bytes instead of decoding JSON
    pub raw: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            timeout: Some(REQUEST_TIMEOUT),
            raw: false,
        }
    }
}

impl QueryOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    /// For long-running emulator operations
    pub fn unbounded() -> Self {
        Self {
            timeout: None,
            ..Self::default()
        }
    }

    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }
}

/// Successful answer from a compute
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeResponse {
    pub status: u16,
    /// Decoded body; an empty object when the body is empty or kept raw
    pub json: Value,
    /// Undecoded body, filled only for raw requests
    pub body: Bytes,
}

impl Compute {
    /// Issue one request without going through the connection check
    pub(crate) async fn execute(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        options: QueryOptions,
    ) -> Result<ComputeResponse> {
        let (url, credentials) = self.target(path).await;
        let client = self.session.client().await;

        debug!("{} {} (timeout: {:?})", method, url, options.timeout);

        let exchange = self.exchange(client, method, &url, credentials, body);
        let (status, payload) = match options.timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| {
                    self.connection_error(&url, format!("timed out after {:?}", limit))
                })??,
            None => exchange.await?,
        };

        decode_response(self.id(), &url, status, payload, options.raw)
    }

    async fn exchange(
        &self,
        client: Client,
        method: Method,
        url: &str,
        credentials: Option<Credentials>,
        body: RequestBody,
    ) -> Result<(u16, Bytes)> {
        let mut request = authorize(client.request(method, url), credentials.as_ref())
            .header(CONTENT_TYPE, body.content_type());

        request = match body {
            RequestBody::Empty => request,
            RequestBody::Json(value) => request.body(serde_json::to_vec(&value)?),
            RequestBody::Raw(data) => request.body(data),
        };

        let response = request
            .send()
            .await
            .map_err(|e| self.connection_error(url, e))?;
        let status = response.status().as_u16();
        let payload = response
            .bytes()
            .await
            .map_err(|e| self.connection_error(url, e))?;

        Ok((status, payload))
    }

    /// Absolute URL and credentials for a compute-relative path
    pub(crate) async fn target(&self, path: &str) -> (String, Option<Credentials>) {
        let state = self.state.read().await;
        (state.url(path), state.credentials.clone())
    }

    pub(crate) fn connection_error(&self, url: &str, reason: impl fmt::Display) -> ComputeError {
        warn!("Request to compute {} failed: {}", self.id(), reason);
        ComputeError::Connection {
            compute_id: self.id().to_string(),
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub(crate) fn authorize(request: RequestBuilder, credentials: Option<&Credentials>) -> RequestBuilder {
    match credentials {
        Some(credentials) => request.basic_auth(credentials.user(), Some(credentials.secret())),
        None => request,
    }
}

/// Turn a raw answer into a response or a classified failure
pub(crate) fn decode_response(
    compute_id: &str,
    url: &str,
    status: u16,
    payload: Bytes,
    raw: bool,
) -> Result<ComputeResponse> {
    if status >= 300 {
        return Err(classify_status(compute_id, url, status, &payload, raw));
    }

    if payload.is_empty() || raw {
        return Ok(ComputeResponse {
            status,
            json: Value::Object(Map::new()),
            body: payload,
        });
    }

    let json = std::str::from_utf8(&payload)
        .ok()
        .and_then(|text| serde_json::from_str::<Value>(text).ok())
        .ok_or_else(|| {
            warn!("Compute {} answered {} with a non JSON body", compute_id, url);
            ComputeError::NotACompute {
                compute_id: compute_id.to_string(),
            }
        })?;

    Ok(ComputeResponse {
        status,
        json,
        body: Bytes::new(),
    })
}

/// Map a failure status to its error kind. Only the status drives the
/// classification; the body only adds detail.
pub(crate) fn classify_status(
    compute_id: &str,
    url: &str,
    status: u16,
    payload: &[u8],
    raw: bool,
) -> ComputeError {
    let body = String::from_utf8_lossy(payload).into_owned();
    let message = if raw || body.is_empty() {
        String::new()
    } else {
        serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or_else(|| body.clone())
    };

    match status {
        400 => ComputeError::BadRequest {
            url: url.to_string(),
            body,
        },
        401 => ComputeError::Unauthorized {
            compute_id: compute_id.to_string(),
        },
        403 => ComputeError::Forbidden { message },
        404 => ComputeError::NotFound { message },
        409 => match serde_json::from_str::<Value>(&body) {
            Ok(payload @ Value::Object(_)) if !raw => {
                ComputeError::Conflict(ComputeConflict::new(payload))
            }
            // Not emitted by a compute, keep the text
            _ => ComputeError::GenericConflict { message },
        },
        500 => ComputeError::Internal {
            url: url.to_string(),
        },
        503 => ComputeError::Unavailable {
            url: url.to_string(),
            body,
        },
        status => {
            error!(
                "Compute {} answered {} with unsupported status {}",
                compute_id, url, status
            );
            ComputeError::UnsupportedStatus { status }
        }
    }
}
