//! Explicit store resolution.
//!
//! The store kind comes from configuration. [`detect_store`] validates it once
//! at startup and reports whether the database file already exists. File
//! system access goes through [`StoreProbe`] so tests can substitute it.

use crate::config::{StoreConfig, StoreKind};
use crate::error::StoreError;
use std::path::{Path, PathBuf};

/// File system questions asked while resolving a store.
pub trait StoreProbe {
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
}

/// [`StoreProbe`] backed by the real file system.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsProbe;

impl StoreProbe for FsProbe {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }
}

/// A resolved store location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreTarget {
    pub kind: StoreKind,
    pub path: PathBuf,
    /// The database file is already present.
    pub exists: bool,
}

/// Resolve the configured store.
///
/// # Errors
/// [`StoreError::Config`] if the path is empty, names a directory, or its
/// parent directory does not exist.
pub fn detect_store(
    config: &StoreConfig,
    probe: &dyn StoreProbe,
) -> Result<StoreTarget, StoreError> {
    match config.kind {
        StoreKind::Sqlite => {
            let path = &config.path;
            if path.as_os_str().is_empty() {
                return Err(StoreError::Config("store path is empty".to_string()));
            }
            if probe.is_dir(path) {
                return Err(StoreError::Config(format!(
                    "store path {} is a directory",
                    path.display()
                )));
            }
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                if !probe.is_dir(parent) {
                    return Err(StoreError::Config(format!(
                        "parent directory {} does not exist",
                        parent.display()
                    )));
                }
            }
            Ok(StoreTarget {
                kind: StoreKind::Sqlite,
                path: path.clone(),
                exists: probe.exists(path),
            })
        }
    }
}
