//! Application-wide constants for the compute protocol, timeouts and naming
//!
//! Central place for the wire paths every compute understands and the magic
//! numbers the proxy relies on.

use std::time::Duration;

/// Compute API layout
pub mod api {
    /// Root every compute-facing URL is namespaced under
    pub const COMPUTE_PREFIX: &str = "/v2/compute";

    /// Version probe, relative to the compute prefix
    pub const VERSION_PATH: &str = "/version";

    /// Push channel, relative to the compute prefix
    pub const NOTIFICATIONS_PATH: &str = "/notifications/ws";
}

/// HTTP timeout constants
pub mod http {
    use super::Duration;

    /// Default bound for a single request to a compute
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// Bound for listing calls (images, project files) that may scan disks
    pub const LISTING_TIMEOUT: Duration = Duration::from_secs(120);
}

/// Notification names and actions
pub mod events {
    /// Emitted whenever the compute snapshot changes
    pub const COMPUTE_UPDATED: &str = "compute.updated";

    /// Heartbeat action pushed periodically by computes
    pub const PING_ACTION: &str = "ping";
}

/// Compute identity and naming
pub mod naming {
    /// Identifier reserved for the compute running next to the controller
    pub const LOCAL_COMPUTE_ID: &str = "local";

    /// Display name used for the local compute
    pub const LOCAL_COMPUTE_NAME: &str = "Local";

    /// Users longer than this are elided in derived names
    pub const MAX_USER_DISPLAY_LEN: usize = 14;

    /// Number of user characters kept when eliding
    pub const ELIDED_USER_PREFIX_LEN: usize = 11;
}

/// Image discovery
pub mod images {
    /// Emulator kinds whose listing is merged with locally discovered images
    pub const MERGED_IMAGE_KINDS: &[&str] = &["qemu", "dynamips", "iou"];
}

/// Default connection descriptor values
pub mod defaults {
    pub const HOST: &str = "localhost";

    pub const PORT: u16 = 3080;
}
