//! websift-server: exposes the websift research tools over a JSON-lines
//! stdio protocol.
//!
//! Configuration comes from the environment (see
//! [`websift::config::ServiceConfig::from_env`]); logging is controlled by
//! `RUST_LOG` / `LOG_LEVEL` and `LOG_FORMAT`.

mod logging;
mod protocol;

use std::sync::Arc;
use websift::config::ServiceConfig;
use websift::events::ChannelEventSink;
use websift::tools::ResearchService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init()?;

    let config = ServiceConfig::from_env();
    tracing::info!(
        cache_max_size = config.cache_max_size,
        durable_cache = config.cache_durable_url.is_some(),
        verify_tls = config.verify_tls,
        "Starting websift-server"
    );

    let (sink, events) = ChannelEventSink::new();
    let service = ResearchService::from_config(config)
        .await
        .with_event_sink(Arc::new(sink));

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    protocol::serve(stdin, tokio::io::stdout(), service, events).await?;

    tracing::info!("Input closed; shutting down");
    Ok(())
}
