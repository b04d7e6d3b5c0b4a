//! Output sink for the fact document.
//!
//! Documents are written to a temporary sibling and renamed into place, so
//! readers never observe a partially written file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;
use vxflex_inventory::FactDocument;

use crate::error::DiscoveryError;

/// Where the document is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// An explicit file.
    File(PathBuf),
    /// `<dir>/<server>.json`.
    Cache {
        /// Cache root.
        dir: PathBuf,
        /// Gateway host the document describes.
        server: String,
    },
}

impl OutputTarget {
    /// Destination path.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        match self {
            Self::File(path) => path.clone(),
            Self::Cache { dir, server } => dir.join(format!("{server}.json")),
        }
    }

    /// Write `document` as pretty-printed JSON and return the path.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Output`] if the directory cannot be created
    /// or the file cannot be written.
    pub fn write(&self, document: &FactDocument) -> Result<PathBuf, DiscoveryError> {
        let path = self.path();
        let mut json = serde_json::to_vec_pretty(document)
            .map_err(|e| DiscoveryError::Inventory(e.into()))?;
        json.push(b'\n');

        if let Self::Cache { dir, .. } = self {
            fs::create_dir_all(dir).map_err(|source| DiscoveryError::Output {
                path: dir.clone(),
                source,
            })?;
        }

        write_atomic(&path, &json).map_err(|source| DiscoveryError::Output {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), bytes = json.len(), "inventory written");
        Ok(path)
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".tmp-{}", std::process::id()));
    let temporary = path.with_file_name(name);

    let result = fs::File::create(&temporary)
        .and_then(|mut file| {
            file.write_all(contents)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&temporary, path));

    if result.is_err() {
        let _ = fs::remove_file(&temporary);
    }
    result
}
