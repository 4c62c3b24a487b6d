use std::process::ExitCode;
use std::sync::Arc;

use pricing_engine::config::AppConfig;
use pricing_engine::logging::{init_logging, LoggingConfig};
use pricing_engine::queue::redis_queue::RedisJobQueue;
use pricing_engine::services::event_bridge::{EventBridge, RedisEventSource};
use pricing_engine::shutdown::cancel_on_signal;
use pricing_engine::store::redis_store::{create_redis_pool, RedisStore};
use pricing_engine::store::CacheStore;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    if let Err(e) = init_logging(LoggingConfig::from_env("pricing-listener")) {
        eprintln!("failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("Listener failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<u8> {
    let config = AppConfig::from_env();
    config.validate().map_err(anyhow::Error::msg)?;

    // give Redis time to come up alongside us
    let delay = config.listener_startup_delay();
    tracing::info!("Waiting {:?} before subscribing", delay);
    tokio::time::sleep(delay).await;

    let pool = create_redis_pool(&config.redis_url)?;
    RedisStore::new(pool.clone()).ping().await?;

    let queue = Arc::new(RedisJobQueue::new(
        pool,
        &config.queue_name,
        config.visibility_timeout(),
    ));
    let bridge = EventBridge::new(
        Arc::new(RedisEventSource::new(config.redis_url.clone())),
        queue,
        config.event_channel.clone(),
        config.job_max_retries,
        config.retry_backoff(),
    );

    let exit = bridge.run(cancel_on_signal()).await?;
    tracing::info!(?exit, "Listener exiting");
    Ok(exit.exit_code() as u8)
}
