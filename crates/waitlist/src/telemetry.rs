//! Tracing subscriber setup

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::{filter::Directive, EnvFilter};

/// Install the global `fmt` subscriber writing to stderr.
///
/// `RUST_LOG` directives apply on top of `default_level`.
pub fn init(default_level: &str) -> Result<()> {
    let directive: Directive = default_level
        .parse()
        .with_context(|| format!("Invalid log level '{default_level}'"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(directive)
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))
}
