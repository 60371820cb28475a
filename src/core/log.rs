use tracing_subscriber::{
    EnvFilter, fmt, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

/// Installs the global subscriber. Run progress is logged at info; `verbose`
/// adds per-request debug output. `RUST_LOG` replaces both.
pub fn init_logging(verbose: bool) {
    let directive = if verbose {
        "emasnap=debug"
    } else {
        "emasnap=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::registry()
        .with(fmt::layer().pretty().without_time())
        .with(filter)
        .init();
}
