use std::sync::Arc;

use anyhow::Context;

use pricing_engine::config::AppConfig;
use pricing_engine::external::simulated::{
    FaultInjector, SimulatedBasePriceSource, SimulatedMarketDataSource, SimulatedProductCatalog,
};
use pricing_engine::jobs::recalculate_prices_job::{PipelineSettings, RecalculationPipeline};
use pricing_engine::logging::{init_logging, LoggingConfig};
use pricing_engine::queue::redis_queue::RedisJobQueue;
use pricing_engine::queue::JobQueue;
use pricing_engine::services::distributed_lock::DistributedLock;
use pricing_engine::services::queue_maintenance::{QueueMaintenanceService, DEFAULT_SWEEP_INTERVAL};
use pricing_engine::services::worker::{Worker, WorkerSettings};
use pricing_engine::shutdown::cancel_on_signal;
use pricing_engine::store::redis_store::{create_redis_pool, RedisStore};
use pricing_engine::store::CacheStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    init_logging(LoggingConfig::from_env("pricing-worker"))
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

    let pipeline = RecalculationPipeline::new(
        DistributedLock::new(store.clone(), config.lock_name.clone(), config.lock_timeout()),
        store.clone(),
        Arc::new(SimulatedProductCatalog::new(
            config.catalog_size,
            std::time::Duration::from_millis(config.catalog_latency_ms),
        )),
        Arc::new(SimulatedBasePriceSource::new()),
        Arc::new(SimulatedMarketDataSource::volatile(0.9, 1.1)),
        FaultInjector::new(config.fault_probability),
        PipelineSettings::from_config(&config),
    );

    let mut maintenance = QueueMaintenanceService::new(queue.clone(), DEFAULT_SWEEP_INTERVAL).await?;
    maintenance.start().await?;

    let worker = Arc::new(Worker::new(
        queue,
        Arc::new(pipeline),
        store,
        WorkerSettings::from_config(&config),
    ));

    tracing::info!(queue = %config.queue_name, "👷 Pricing worker started");
    worker.run_pool(config.worker_concurrency, cancel_on_signal()).await;

    maintenance.stop().await?;
    tracing::info!("✅ Pricing worker stopped");
    Ok(())
}
