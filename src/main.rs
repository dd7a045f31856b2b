use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use marquee_search::{
    config::Config,
    db::{self, Cache, CatalogStore, PgCatalogStore, RedisCounterStore},
    routes::{create_router, AppState},
    services::{
        index::{ElasticsearchIndex, SearchIndex},
        BrowseService, HttpEmbedder, QueryPlanner, RecommendationEngine, SearchService,
        TrendingAggregator,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url).await?;
    let catalog: Arc<dyn CatalogStore> = Arc::new(PgCatalogStore::new(pool));
    tracing::info!(items = catalog.count().await?, "Catalog store ready");

    let elasticsearch = ElasticsearchIndex::new(
        config.search_url.clone(),
        config.search_index.clone(),
        config.search_username.clone(),
        config.search_password.clone(),
        config.search_accept_invalid_certs,
    )?;
    elasticsearch.ensure_index().await?;
    let index: Arc<dyn SearchIndex> = Arc::new(elasticsearch);

    let redis_client = db::create_redis_client(&config.redis_url)?;
    let (cache, cache_writer) = Cache::new(redis_client.clone()).await;

    let planner = QueryPlanner::new(
        Arc::new(HttpEmbedder::new(config.embedding_url.clone())),
        config.semantic_overfetch,
    );

    let state = AppState {
        catalog: catalog.clone(),
        search: Arc::new(SearchService::new(planner, index.clone())),
        browse: Arc::new(
            BrowseService::new(index.clone()).with_cache(cache.clone(), config.cache_ttl_secs),
        ),
        trending: Arc::new(TrendingAggregator::new(
            Arc::new(RedisCounterStore::new(redis_client)),
            catalog.clone(),
        )),
        recommendations: Arc::new(
            RecommendationEngine::new(catalog, index).with_cache(cache, config.cache_ttl_secs),
        ),
    };

    let app = create_router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cache_writer.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
