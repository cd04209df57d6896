//! Diagnostic tracing on stderr.
//!
//! Step banners, block output and failure notices are product output and go to
//! stdout regardless of this filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn`, or `debug` when `debug` is set.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=rundoc=debug rundoc run README.md -t setup
/// ```
pub fn init(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
