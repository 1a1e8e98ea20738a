use tracing_subscriber::EnvFilter;

/// Initialize logging for the binary.
///
/// `RUST_LOG` takes precedence when set. Otherwise only the guestsync
/// crates log, at the given level, with everything else at warn.
/// Timestamps are dropped: output lands on a terminal next to the
/// progress UI, not in a log aggregator.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,guestsync={level},guestsync_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}
