//! Subscriber setup: human-readable stderr output plus the plaintext run log.

use decom_engine::state::RunLog;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` overrides the default `info`.
///
/// Only the first call in a process takes effect.
pub fn init(run_log: Option<RunLog>) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let file = run_log.map(|log| {
        fmt::layer()
            .with_writer(log)
            .with_ansi(false)
            .with_target(false)
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr)
        .with(file)
        .try_init();
}
