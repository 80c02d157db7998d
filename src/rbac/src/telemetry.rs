//! Tracing subscriber setup for hosts embedding the engine

use crate::config::RbacConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a global fmt subscriber filtered by `RUST_LOG`, falling back to `default_level`
///
/// Returns `false` if a global subscriber was already installed, which makes repeated
/// calls (e.g. from several tests) harmless.
pub fn init_tracing(default_level: &str) -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback_directive(default_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .is_ok()
}

/// [`init_tracing`] with the configured `log_level` as the fallback
pub fn init_tracing_from(config: &RbacConfig) -> bool {
    init_tracing(&config.log_level)
}

fn fallback_directive(level: &str) -> String {
    format!("cretoai_rbac={}", level)
}
