pub mod compute;
pub mod config;
pub mod constants;
pub mod errors;
pub mod images;
pub mod notification;
pub mod version;

// Re-export commonly used types
pub use compute::{
    Compute, ComputeContext, ComputeResponse, ComputeSettings, ComputeSnapshot, ComputeUpdate,
    ConnectionState, Protocol, QueryOptions, RequestBody,
};
pub use config::{Config, ConfigManager};
pub use errors::{ComputeConflict, ComputeError};
pub use images::{DirectoryImageScanner, ImageScanner};
pub use notification::{ChannelNotificationBus, Notification, NotificationBus, PersistenceTrigger};
pub use version::VERSION;
