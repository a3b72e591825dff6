//! Tracing subscriber setup.
//!
//! The terminal belongs to the editor, so logs go to a file. `LSPOP_LOG` takes the usual
//! `EnvFilter` directives; the default is `info`.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding filter directives.
pub const ENV_LOG_FILTER: &str = "LSPOP_LOG";

/// Install the global subscriber writing to `log_file_path`.
pub fn init(log_file_path: &Path) -> io::Result<()> {
    let log_file = File::create(log_file_path)?;
    build_subscriber(log_file, filter_from_env())
        .try_init()
        .map_err(io::Error::other)
}

fn filter_from_env() -> EnvFilter {
    EnvFilter::try_from_env(ENV_LOG_FILTER).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn build_subscriber(
    log_file: File,
    env_filter: EnvFilter,
) -> impl tracing::Subscriber + Send + Sync {
    let fmt_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(Arc::new(log_file));

    tracing_subscriber::registry().with(fmt_layer).with(env_filter)
}
