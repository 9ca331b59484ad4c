//! Tracing setup. Logs always go to stderr; stdout carries the protocol.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "warn";

/// Builds the filter from `RUST_LOG`, then `LOG_LEVEL`, then the default.
fn env_filter<F>(lookup: F) -> EnvFilter
where
    F: Fn(&str) -> Option<String>,
{
    let directive = lookup("RUST_LOG")
        .or_else(|| lookup("LOG_LEVEL").map(|level| level.trim().to_lowercase()))
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string());
    EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn wants_json<F>(lookup: F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup("LOG_FORMAT").is_some_and(|f| f.trim().eq_ignore_ascii_case("json"))
}

/// Installs the global subscriber. `LOG_FORMAT=json` selects JSON lines.
pub fn init() -> anyhow::Result<()> {
    let lookup = |key: &str| std::env::var(key).ok();
    let registry = tracing_subscriber::registry().with(env_filter(lookup));

    if wants_json(lookup) {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()?;
    }
    Ok(())
}
