pub mod manager;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
pub use manager::ConfigManager;

use crate::compute::ComputeSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root of the local image store (`QEMU/`, `IOU/`, `IOS/` below it)
    pub images_path: Option<PathBuf>,
    /// Whether the well-known `local` compute may be registered
    #[serde(default)]
    pub local_compute_enabled: bool,
    // Populated from individual compute config files, keyed by file stem
    #[serde(skip)]
    pub computes: HashMap<String, ComputeSettings>,
}
