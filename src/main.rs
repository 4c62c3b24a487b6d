use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use pricing_engine::app;
use pricing_engine::config::AppConfig;
use pricing_engine::external::simulated::{SimulatedBasePriceSource, SimulatedMarketDataSource};
use pricing_engine::logging::{init_logging, LoggingConfig};
use pricing_engine::queue::redis_queue::RedisJobQueue;
use pricing_engine::queue::JobQueue;
use pricing_engine::services::pricing_service::PricingService;
use pricing_engine::shutdown::shutdown_signal;
use pricing_engine::store::redis_store::{create_redis_pool, RedisStore};
use pricing_engine::store::CacheStore;
use pricing_engine::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging FIRST
    init_logging(LoggingConfig::from_env("pricing-api"))
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    let config = AppConfig::from_env();
    config.validate().map_err(anyhow::Error::msg)?;

    let pool = create_redis_pool(&config.redis_url).context("failed to create Redis pool")?;
    let store: Arc<dyn CacheStore> = Arc::new(RedisStore::new(pool.clone()));
    let queue: Arc<dyn JobQueue> = Arc::new(RedisJobQueue::new(
        pool,
        &config.queue_name,
        config.visibility_timeout(),
    ));

    let pricing = PricingService::new(
        store.clone(),
        Arc::new(SimulatedBasePriceSource::new()),
        Arc::new(SimulatedMarketDataSource::fixed(0.95)),
        config.upstream_timeout(),
        config.cache_ttl(),
    );

    let addr = config.bind_addr();
    let state = AppState {
        pricing: Arc::new(pricing),
        store,
        queue,
        config: Arc::new(config),
    };
    let app = app::create_app(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("🚀 Pricing API running at http://{}/", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Pricing API stopped");
    Ok(())
}
