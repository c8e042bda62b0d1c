use clap::Parser;
use mapping_engine::api;
use mapping_engine::config::Config;
use mapping_engine::content::memory::MemoryContentStore;
use mapping_engine::fixed_url::propagator::FixedUrlPropagator;
use mapping_engine::fixed_url::resolver::ReplicaResolver;
use mapping_engine::fixed_url::service::FixedUrlService;
use mapping_engine::mapping::MappingEngine;
use mapping_engine::records::store::InMemoryEntityStore;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();

    tracing::info!(
        "Starting mapping node for {}/{} on {}",
        config.domain,
        config.subdomain,
        config.bind
    );

    // 1. Stores:
    let content = MemoryContentStore::new(&config.domain);
    let records = InMemoryEntityStore::new();

    // 2. Fixed URL propagation:
    let aliases = Arc::new(FixedUrlService::new(
        ReplicaResolver::new(config.discovery()),
        FixedUrlPropagator::new(config.replica_timeout()),
    ));

    // 3. Engine:
    let engine = MappingEngine::new(content, records, aliases, config.mapping_options());

    // 4. HTTP Router:
    let app = api::router(engine);

    // 5. Start HTTP server:
    tracing::info!("HTTP server listening on {}", config.bind);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
