use core_config::tracing::{init_tracing, install_color_eyre};
use domain_catalog_search::cache::RedisCache;
use domain_catalog_search::elasticsearch::ElasticsearchIndex;
use domain_catalog_search::postgres::PgOrderHistory;
use domain_catalog_search::{CatalogSearchService, IndexCatalog, SearchIndex};
use std::sync::Arc;
use tracing::info;

mod config;
mod server;

use config::Config;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Install color-eyre first for colored error output (before any fallible operations)
    install_color_eyre();

    // Load configuration from environment variables
    let config = Config::from_env()?;

    // Initialize tracing with ErrorLayer for span trace capture
    init_tracing(&config.environment);

    let index: Arc<dyn SearchIndex> = Arc::new(
        ElasticsearchIndex::new(config.elasticsearch.clone().into())
            .map_err(|e| eyre::eyre!("Failed to build Elasticsearch client: {}", e))?,
    );
    info!(
        url = %config.elasticsearch.url,
        index = %config.elasticsearch.index,
        "Elasticsearch adapter configured"
    );

    // Initialize backend connections concurrently
    let postgres_future = async {
        sea_orm::Database::connect(config.database.url.as_str())
            .await
            .map_err(|e| eyre::eyre!("PostgreSQL connection failed: {}", e))
    };

    let redis_future = async {
        RedisCache::connect(&config.redis.uri)
            .await
            .map_err(|e| eyre::eyre!("Redis connection failed: {}", e))
    };

    let (db, cache) = tokio::try_join!(postgres_future, redis_future)?;

    let service = CatalogSearchService::with_settings(
        index.clone(),
        Arc::new(cache),
        Arc::new(PgOrderHistory::new(db.clone())),
        Arc::new(IndexCatalog::new(index)),
        config.search.clone(),
        config.recommendations.clone(),
    );

    let router = server::build_router(service, config.request_timeout);

    info!("Starting search API");
    server::serve(router, &config.server)
        .await
        .map_err(|e| eyre::eyre!("Server error: {}", e))?;

    match db.close().await {
        Ok(_) => info!("PostgreSQL connection closed successfully"),
        Err(e) => tracing::error!("Error closing PostgreSQL: {}", e),
    }

    info!("Search API shutdown complete");
    Ok(())
}
