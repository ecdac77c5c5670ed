//! Global `tracing` subscriber installation, ported verbatim in spirit from
//! `utils::logger::init_logger`.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a global tracing subscriber. Honors `RUST_LOG` if set, otherwise
/// falls back to `log_level`. Call once at process start.
pub fn init(log_level: &str, json_logs: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}
