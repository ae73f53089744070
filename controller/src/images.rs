//! Local image discovery
//!
//! Computes only know the images stored on their own disk. For some emulator
//! kinds the controller also offers images it holds locally, found through an
//! [`ImageScanner`].

use glob::glob;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Lists image files available locally for an emulator kind
pub trait ImageScanner: Send + Sync {
    fn scan(&self, kind: &str) -> Vec<PathBuf>;
}

/// Scans `<root>/<KIND DIR>/*` the way images are laid out on a controller
pub struct DirectoryImageScanner {
    root: PathBuf,
}

impl DirectoryImageScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn kind_directory(kind: &str) -> Option<&'static str> {
        match kind {
            "qemu" => Some("QEMU"),
            "iou" => Some("IOU"),
            "dynamips" => Some("IOS"),
            _ => None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ImageScanner for DirectoryImageScanner {
    fn scan(&self, kind: &str) -> Vec<PathBuf> {
        let Some(directory) = Self::kind_directory(kind) else {
            return Vec::new();
        };

        let pattern = self.root.join(directory).join("*");
        let pattern = pattern.to_string_lossy();

        let entries = match glob(&pattern) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Invalid image pattern {}: {}", pattern, e);
                return Vec::new();
            }
        };

        let mut images: Vec<PathBuf> = entries
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Unreadable image entry: {}", e);
                    None
                }
            })
            .filter(|path| path.is_file())
            .filter(|path| {
                // Skip hidden files and checksum sidecars
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| !name.starts_with('.') && !name.ends_with(".md5sum"))
                    .unwrap_or(false)
            })
            .collect();
        images.sort();

        debug!("Found {} local {} images in {}", images.len(), kind, self.root.display());
        images
    }
}

/// Scanner that never finds anything
pub struct NoImages;

impl ImageScanner for NoImages {
    fn scan(&self, _kind: &str) -> Vec<PathBuf> {
        Vec::new()
    }
}
