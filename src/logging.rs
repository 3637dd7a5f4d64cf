use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

use crate::util::env as envutil;

/// Sets up the global tracing subscriber with a fmt formatter and env filter.
///
/// `default_filter` applies when `RUST_LOG` is not set, e.g. `"shop_sync=info"`.
/// `LOG_SOURCE_LOCATIONS=1` adds file/line to every event.
pub fn init_tracing(default_filter: &str) -> Result<(), anyhow::Error> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let with_source = envutil::env_flag("LOG_SOURCE_LOCATIONS", false);

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(with_source)
        .with_file(with_source)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}
