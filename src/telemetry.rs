//! Tracing/logging initialization
//!
//! Logs go to stderr so stdout stays free for reports. The filter comes from
//! `RUST_LOG` and defaults to `info`.

use tracing_subscriber::EnvFilter;

/// Initialize tracing for the process
///
/// Safe to call multiple times; later calls are no-ops.
///
/// # Arguments
///
/// * `json` - Emit one JSON object per event instead of human-readable lines
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
