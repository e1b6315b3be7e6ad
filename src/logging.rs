use std::sync::Once;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Structured diagnostics backed by `tracing`.
///
/// Filter resolution: `RUST_LOG`, then `SECURE_HOME_LOG`, then
/// `secure_home=info,warn`. Safe to call more than once.

static INIT_LOGGING: Once = Once::new();

const DEFAULT_FILTER: &str = "secure_home=info,warn";

pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let fallback = std::env::var("SECURE_HOME_LOG").unwrap_or_else(|_| DEFAULT_FILTER.into());
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(fallback))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        let stdout_layer = fmt::layer().compact().with_target(false);

        // Another subscriber may already be installed (e.g. by an embedding app).
        if tracing_subscriber::registry().with(filter).with(stdout_layer).try_init().is_err() {
            eprintln!("[secure-home][WARN] tracing subscriber already installed");
        }
    });
}
