//! Error types for the compute proxy
//!
//! Every failure a caller can observe when talking to a compute is classified
//! here, at the request boundary. Callers match on the variant to decide how
//! to react; nothing in the proxy retries on its own.

use serde_json::Value;
use std::fmt;

pub type Result<T> = std::result::Result<T, ComputeError>;

/// Failure returned by any compute operation
#[derive(Debug)]
pub enum ComputeError {
    /// Compute unreachable, request timed out or the transport was closed
    Connection {
        compute_id: String,
        url: String,
        reason: String,
    },

    /// The peer answered but does not speak the compute protocol
    NotACompute { compute_id: String },

    /// The peer speaks the protocol but its major.minor differs from ours
    VersionMismatch {
        compute_id: String,
        local: String,
        remote: String,
    },

    /// 400
    BadRequest { url: String, body: String },

    /// 401
    Unauthorized { compute_id: String },

    /// 403
    Forbidden { message: String },

    /// 404
    NotFound { message: String },

    /// 409 with a structured error payload from the compute
    Conflict(ComputeConflict),

    /// 409 whose body is not a structured compute error
    GenericConflict { message: String },

    /// 500
    Internal { url: String },

    /// 503
    Unavailable { url: String, body: String },

    /// Any other status >= 300. The proxy has no contract for it.
    UnsupportedStatus { status: u16 },

    /// A request body could not be serialized
    InvalidBody { reason: String },

    /// The local compute id was used while the local compute is disabled
    LocalComputeDisabled,
}

/// Structured conflict reported by a compute
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeConflict {
    pub message: String,
    pub payload: Value,
}

impl ComputeConflict {
    pub fn new(payload: Value) -> Self {
        let message = match payload.get("message").and_then(|m| m.as_str()) {
            Some(message) => message.to_string(),
            None => payload.to_string(),
        };
        Self { message, payload }
    }
}

impl ComputeError {
    /// Unreachable, timed out or closed
    pub fn is_connectivity(&self) -> bool {
        matches!(self, ComputeError::Connection { .. })
    }

    /// Foreign service or protocol version mismatch; callers treat both as
    /// "not a recognized compute"
    pub fn is_incompatible(&self) -> bool {
        matches!(
            self,
            ComputeError::NotACompute { .. } | ComputeError::VersionMismatch { .. }
        )
    }

    /// HTTP status a controller API should answer with when relaying this error
    pub fn status(&self) -> u16 {
        match self {
            ComputeError::BadRequest { .. } => 400,
            ComputeError::Unauthorized { .. } => 401,
            ComputeError::Forbidden { .. } => 403,
            ComputeError::NotFound { .. } => 404,
            ComputeError::NotACompute { .. }
            | ComputeError::VersionMismatch { .. }
            | ComputeError::Conflict(_)
            | ComputeError::GenericConflict { .. }
            | ComputeError::LocalComputeDisabled => 409,
            ComputeError::Internal { .. }
            | ComputeError::UnsupportedStatus { .. }
            | ComputeError::InvalidBody { .. } => 500,
            ComputeError::Unavailable { .. } | ComputeError::Connection { .. } => 503,
        }
    }
}

impl fmt::Display for ComputeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeError::Connection {
                compute_id,
                url,
                reason,
            } => {
                write!(f, "Cannot connect to compute '{}' ({}): {}", compute_id, url, reason)
            }
            ComputeError::NotACompute { compute_id } => {
                write!(f, "The server {} is not a compute server", compute_id)
            }
            ComputeError::VersionMismatch {
                compute_id,
                local,
                remote,
            } => {
                write!(
                    f,
                    "The server {} versions are not compatible {} != {}",
                    compute_id, local, remote
                )
            }
            ComputeError::BadRequest { url, body } => {
                write!(f, "Bad request {} {}", url, body)
            }
            ComputeError::Unauthorized { compute_id } => {
                write!(f, "Invalid authentication for compute {}", compute_id)
            }
            ComputeError::Forbidden { message } => write!(f, "{}", message),
            ComputeError::NotFound { message } => write!(f, "{}", message),
            ComputeError::Conflict(conflict) => write!(f, "{}", conflict.message),
            ComputeError::GenericConflict { message } => write!(f, "{}", message),
            ComputeError::Internal { url } => {
                write!(f, "Internal server error {}", url)
            }
            ComputeError::Unavailable { url, body } => {
                write!(f, "Service unavailable {} {}", url, body)
            }
            ComputeError::UnsupportedStatus { status } => {
                write!(f, "{} status code is not supported", status)
            }
            ComputeError::InvalidBody { reason } => {
                write!(f, "Cannot serialize request body: {}", reason)
            }
            ComputeError::LocalComputeDisabled => {
                write!(f, "The local compute is started without local mode enabled")
            }
        }
    }
}

impl std::error::Error for ComputeError {}

impl From<serde_json::Error> for ComputeError {
    fn from(err: serde_json::Error) -> Self {
        ComputeError::InvalidBody {
            reason: err.to_string(),
        }
    }
}
