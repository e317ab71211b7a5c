//! JSON file persistence for the catalog.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::CatalogRoot;

/// Errors from loading or saving the catalog document.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Failed to read catalog file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Catalog file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize catalog: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write catalog file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Catalog stored as a single pretty-printed JSON document.
#[derive(Debug, Clone)]
pub struct JsonCatalogStore {
    path: PathBuf,
}

impl JsonCatalogStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the catalog. A missing file yields the seeded default; a file
    /// that exists but cannot be read or parsed is an error.
    pub fn load(&self) -> Result<CatalogRoot, PersistenceError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(
                    "No catalog at {}, starting from the default catalog",
                    self.path.display()
                );
                return Ok(CatalogRoot::default());
            }
            Err(source) => {
                return Err(PersistenceError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_str(&content).map_err(|source| PersistenceError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Writes the catalog through a temporary file and a rename, so a crash
    /// mid-write leaves the previous document intact.
    pub fn save(&self, root: &CatalogRoot) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(root)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| self.write_error(source))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|source| self.write_error(source))?;
        std::fs::rename(&tmp, &self.path).map_err(|source| self.write_error(source))?;

        debug!("Catalog saved to {}", self.path.display());
        Ok(())
    }

    /// Moves an unreadable catalog file aside so the next save cannot
    /// overwrite it. Returns where it went.
    pub fn quarantine(&self) -> Result<PathBuf, PersistenceError> {
        let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
        let target = self.path.with_extension(format!("json.corrupt-{stamp}"));
        std::fs::rename(&self.path, &target).map_err(|source| self.write_error(source))?;
        warn!("Moved unreadable catalog to {}", target.display());
        Ok(target)
    }

    fn write_error(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Write {
            path: self.path.clone(),
            source,
        }
    }
}
