//! Process-wide diagnostic output

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. Only errors are shown unless `verbose` is set
/// or `RUST_LOG` says otherwise. Calling it again is a no-op.
pub fn init(verbose: bool) {
    let default_level = if verbose { "info" } else { "error" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_level(true)
        .with_writer(std::io::stderr)
        .try_init();
}
