use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Default filter when neither `UNIBRIDGE_LOG`, `RUST_LOG` nor the config
/// names one.
pub const DEFAULT_FILTER: &str = "unibridge=info";

/// Initialise the tracing subscriber once per process.
///
/// `UNIBRIDGE_LOG` wins over `RUST_LOG`, which wins over `fallback`.
pub fn init_logging(fallback: Option<&str>) {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_env("UNIBRIDGE_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new(fallback.unwrap_or(DEFAULT_FILTER)));

        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    });
}
