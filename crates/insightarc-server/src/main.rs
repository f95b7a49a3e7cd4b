mod configuration;
mod error;
mod routes;
mod state;
#[cfg(test)]
mod test_support;

use anyhow::Result;
use insightarc::providers::factory;
use insightarc::research::ResearchPipeline;
use insightarc::search::tavily::TavilySearchProvider;
use insightarc::store::FsContentStore;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let settings = configuration::Settings::new()?;
    let addr = settings.server.socket_addr()?;

    let provider = factory::get_provider(settings.provider.into_config())?;
    let search = Arc::new(TavilySearchProvider::new(settings.search.into_config())?);
    let store = Arc::new(FsContentStore::new(
        settings.store.dir.clone(),
        settings.store.url_prefix.clone(),
    ));
    let research = settings.research.into_config();
    info!(
        topic_count = research.topic_count,
        max_steps = research.max_steps,
        store = %settings.store.dir.display(),
        "research pipeline configured"
    );

    // Create app state
    let state = state::AppState {
        pipeline: Arc::new(ResearchPipeline::new(provider, search, store, research)),
        default_report_name: settings.store.default_name,
        url_prefix: settings.store.url_prefix,
    };

    let app = routes::configure(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
