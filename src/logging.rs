//! Tracing setup for the CLI binary.

use tracing_subscriber::EnvFilter;

/// Initialize stderr logging. `RUST_LOG` overrides the default level;
/// `--verbose` bumps the default to debug. Safe to call more than once.
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
