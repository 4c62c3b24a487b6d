//! Bulk Price Recalculation Job
//!
//! Recomputes the price of every known product and rewrites the cache so
//! request handlers keep hitting warm entries. A run is triggered by a
//! market event (through the task queue), never by a schedule.
//!
//! # Run Lifecycle
//!
//! ```text
//! Idle -> LockRequested -> Acquired -> Running -> Completed -> Released
//!                       \-> Denied (skipped)     \-> Failed  -> Released
//! ```
//!
//! 1. Take `recalculate_global_lock` with a single non-blocking attempt.
//!    If another worker holds it, the run is skipped.
//! 2. Probe the external dependency (may time out transiently).
//! 3. List every product id (slow bulk call).
//! 4. Recompute each product concurrently and overwrite `price:<id>`.
//! 5. Release the lock whatever the result.
//!
//! # Error Handling
//!
//! The run never raises. It returns a [`RunOutcome`] and the worker decides
//! whether to retry:
//! - upstream timeouts and store connection failures are retryable
//! - invalid computed records and serialization errors are permanent

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, TryStreamExt};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::external::price_source::{BasePriceSource, MarketDataSource, ProductCatalog, SourceError};
use crate::external::simulated::FaultInjector;
use crate::jobs::RecalculationRunner;
use crate::models::{PriceRecord, PriceSource, RecalculationJob, RunOutcome};
use crate::services::distributed_lock::DistributedLock;
use crate::services::price_cache_service::set_cached_price;
use crate::store::{CacheStore, LockOutcome, StoreError};

pub const LOCK_HELD_REASON: &str = "lock_held";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("fatal failure: {0}")]
    Fatal(String),
}

impl From<SourceError> for PipelineError {
    fn from(value: SourceError) -> Self {
        PipelineError::Transient(value.to_string())
    }
}

impl From<StoreError> for PipelineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Serialization(_) => PipelineError::Fatal(value.to_string()),
            _ => PipelineError::Transient(value.to_string()),
        }
    }
}

impl From<AppError> for PipelineError {
    fn from(value: AppError) -> Self {
        PipelineError::Fatal(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    LockRequested,
    Denied,
    Running,
    Completed,
    Failed,
    Released,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Location quoted to the market feed for bulk pricing.
    pub location: String,
    pub discount_rate: f64,
    pub concurrency: usize,
    pub cache_ttl: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            location: config.bulk_location.clone(),
            discount_rate: config.worker_discount_rate,
            concurrency: config.recalc_concurrency,
            cache_ttl: config.cache_ttl(),
        }
    }
}

pub struct RecalculationPipeline {
    lock: DistributedLock,
    store: Arc<dyn CacheStore>,
    catalog: Arc<dyn ProductCatalog>,
    base_prices: Arc<dyn BasePriceSource>,
    market_data: Arc<dyn MarketDataSource>,
    faults: FaultInjector,
    settings: PipelineSettings,
}

impl RecalculationPipeline {
    pub fn new(
        lock: DistributedLock,
        store: Arc<dyn CacheStore>,
        catalog: Arc<dyn ProductCatalog>,
        base_prices: Arc<dyn BasePriceSource>,
        market_data: Arc<dyn MarketDataSource>,
        faults: FaultInjector,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            lock,
            store,
            catalog,
            base_prices,
            market_data,
            faults,
            settings,
        }
    }

    /// One guarded recomputation pass.
    pub async fn run_once(&self, job: &RecalculationJob) -> RunOutcome {
        log_phase(job, RunPhase::LockRequested);
        let handle = match self.lock.try_acquire().await {
            Ok(LockOutcome::Acquired(handle)) => handle,
            Ok(LockOutcome::Denied) => {
                log_phase(job, RunPhase::Denied);
                info!(
                    job_id = %job.id,
                    lock = %self.lock.name(),
                    "Another recalculation is already in progress, skipping"
                );
                return RunOutcome::Skipped {
                    reason: LOCK_HELD_REASON.to_string(),
                };
            }
            Err(e) => {
                warn!(job_id = %job.id, "Could not reach lock store: {}", e);
                return RunOutcome::RetryableFailure {
                    reason: format!("lock store unavailable: {}", e),
                };
            }
        };

        log_phase(job, RunPhase::Running);
        let result = self.recalculate_all().await;

        match &result {
            Ok(_) => log_phase(job, RunPhase::Completed),
            Err(_) => log_phase(job, RunPhase::Failed),
        }

        if let Err(e) = self.lock.release(handle).await {
            // the hold time still bounds how long the lock survives
            warn!(job_id = %job.id, "Failed to release lock: {}", e);
        }
        log_phase(job, RunPhase::Released);

        match result {
            Ok(updated_count) => {
                info!(job_id = %job.id, updated_count, "Recalculated all prices");
                RunOutcome::Success { updated_count }
            }
            Err(PipelineError::Transient(reason)) => {
                warn!(job_id = %job.id, attempt = job.attempt, "Transient recalculation failure: {}", reason);
                RunOutcome::RetryableFailure { reason }
            }
            Err(PipelineError::Fatal(reason)) => {
                error!(job_id = %job.id, "Recalculation failed permanently: {}", reason);
                RunOutcome::PermanentFailure { reason }
            }
        }
    }

    async fn recalculate_all(&self) -> Result<usize, PipelineError> {
        self.faults.check()?;

        let product_ids = self.catalog.list_product_ids().await?;
        info!("Recalculating prices for {} products", product_ids.len());

        let updated = AtomicUsize::new(0);
        stream::iter(product_ids.into_iter().map(Ok::<String, PipelineError>))
            .try_for_each_concurrent(self.settings.concurrency, |product_id| {
                let updated = &updated;
                async move {
                    self.recalculate_one(&product_id).await?;
                    updated.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }
            })
            .await?;

        Ok(updated.load(Ordering::Relaxed))
    }

    async fn recalculate_one(&self, product_id: &str) -> Result<(), PipelineError> {
        let (base_price, market_multiplier) = tokio::try_join!(
            self.base_prices.fetch_base_price(product_id),
            self.market_data.fetch_market_multiplier(&self.settings.location),
        )?;

        let record = PriceRecord::new(
            product_id,
            base_price,
            market_multiplier,
            self.settings.discount_rate,
            PriceSource::ProactiveWorker,
        )?;

        set_cached_price(self.store.as_ref(), &record, self.settings.cache_ttl).await?;
        Ok(())
    }
}

#[async_trait]
impl RecalculationRunner for RecalculationPipeline {
    async fn run(&self, job: &RecalculationJob) -> RunOutcome {
        self.run_once(job).await
    }
}

fn log_phase(job: &RecalculationJob, phase: RunPhase) {
    tracing::debug!(job_id = %job.id, attempt = job.attempt, phase = ?phase, "Recalculation phase");
}
