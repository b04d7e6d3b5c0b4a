//! CLI error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that end a discovery run.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Inventory collection failed.
    #[error(transparent)]
    Inventory(#[from] vxflex_inventory::Error),

    /// Collection finished but produced nothing to publish.
    #[error("collected document is empty")]
    EmptyDocument,

    /// The document could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Output {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl DiscoveryError {
    /// Whether the run was cut short by the overall timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Inventory(e) if e.is_timeout())
    }

    /// The single status line printed for this failure.
    #[must_use]
    pub fn status_line(&self) -> String {
        match self {
            _ if self.is_timeout() => "Timed out trying to gather VxFlex OS inventory".to_string(),
            Self::EmptyDocument => "Could not get updated facts".to_string(),
            other => format!("Failed to gather VxFlex OS inventory: {other}"),
        }
    }
}
