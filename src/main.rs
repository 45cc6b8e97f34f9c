use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tracing::info;

use xml_worker::{
    AsyncHttpClient, Cli, ConfigManager, Dispatcher, LibXml2Engine, Operation, SourceLoader,
    UrlFetcher, logging, serve,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let config = ConfigManager::load_config(&cli)
        .await
        .context("Failed to load configuration")?;

    logging::init_logging(&config.logging.level, atty::is(atty::Stream::Stderr))
        .context("Failed to initialize logging")?;

    let http = AsyncHttpClient::new(config.network.http_client_config())
        .context("Failed to create HTTP client")?;
    let loader = SourceLoader::new(Arc::new(UrlFetcher::new(http)));
    let engine = Arc::new(LibXml2Engine::new());
    let dispatcher = Arc::new(Dispatcher::new(engine, loader, &config.cache));

    let addresses: Vec<_> = Operation::ALL.iter().map(|op| op.address()).collect();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        max_in_flight = config.server.max_in_flight,
        cache_ttl_seconds = config.cache.time_to_idle_seconds,
        ?addresses,
        "xml-worker ready"
    );

    let summary = serve(
        Arc::clone(&dispatcher),
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        config.server.max_in_flight,
    )
    .await
    .context("Request loop failed")?;

    let stats = dispatcher.cache_stats().await;
    info!(
        replies = summary.replies,
        errors = summary.errors,
        stylesheets = stats.stylesheets.entry_count,
        queries = stats.queries.entry_count,
        xpaths = stats.xpaths.entry_count,
        "shutting down"
    );

    Ok(())
}
