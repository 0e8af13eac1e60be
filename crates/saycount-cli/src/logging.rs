//! Logging setup for the CLI.
//!
//! Logs go to stderr so the countdown line on stdout stays readable. The
//! filter comes from `SAYCOUNT_LOG` (e.g. `SAYCOUNT_LOG=saycount_core=debug`)
//! and defaults to warnings only.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_ENV: &str = "SAYCOUNT_LOG";

pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .try_init();
}
