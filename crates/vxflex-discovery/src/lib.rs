//! # vxflex-discovery
//!
//! Command-line front end for `vxflex-inventory`.
//!
//! One invocation collects the inventory of one gateway, writes the fact
//! document to a file or the cache directory, prints a single status line
//! and exits:
//!
//! ```text
//! vxflex-discovery --server 10.1.1.5 --username admin --output inv.json
//!   └─► Successfully gathered inventory.
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod error;
pub mod output;

use std::path::PathBuf;

use tracing::info;

pub use cli::Cli;
pub use error::DiscoveryError;
pub use output::OutputTarget;

/// Status line printed after a successful run.
pub const SUCCESS_LINE: &str = "Successfully gathered inventory.";

/// Collect the inventory described by `cli` and write it out.
///
/// # Errors
///
/// Returns [`DiscoveryError::Inventory`] if collection fails or times out,
/// [`DiscoveryError::EmptyDocument`] if nothing was collected, or
/// [`DiscoveryError::Output`] if the document cannot be written.
pub async fn run(cli: &Cli) -> Result<PathBuf, DiscoveryError> {
    let config = cli.to_config();
    info!(
        server = %config.credentials.host,
        port = config.credentials.port,
        timeout_secs = config.timeout.as_secs(),
        "gathering VxFlex OS inventory"
    );

    let document = vxflex_inventory::discover(&config, cli.os_facts_source()).await?;
    if document.is_empty() {
        return Err(DiscoveryError::EmptyDocument);
    }

    cli.output_target().write(&document)
}

/// Status line for the outcome of [`run`].
#[must_use]
pub fn status_line(result: &Result<PathBuf, DiscoveryError>) -> String {
    match result {
        Ok(_) => SUCCESS_LINE.to_string(),
        Err(e) => e.status_line(),
    }
}
