//! Logging and tracing utilities

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing subscriber with default configuration.
///
/// Honors `RUST_LOG` when set, otherwise logs at `info`.
pub fn init_tracing() {
    init_tracing_with(0);
}

/// Initialize tracing with an explicit verbosity level.
///
/// Zero defers to `RUST_LOG` (falling back to `info`); one forces `debug`,
/// two or more forces `trace`.
pub fn init_tracing_with(verbosity: u8) {
    let filter = match verbosity {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        _ => EnvFilter::new(filter_directive(verbosity)),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn filter_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}
