use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::errors::AppError;
use crate::external::price_source::{BasePriceSource, MarketDataSource, SourceError};
use crate::models::{discount_for, PriceRecord, PriceSource};
use crate::services::price_cache_service::{get_cached_price, set_cached_price};
use crate::store::CacheStore;

/// How a quote was produced, for response headers and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    WriteFailed,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::WriteFailed => "write-failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PriceQuote {
    pub record: PriceRecord,
    pub cache_status: CacheStatus,
}

/// Cache-aside pricing for the request path.
pub struct PricingService {
    store: Arc<dyn CacheStore>,
    base_prices: Arc<dyn BasePriceSource>,
    market_data: Arc<dyn MarketDataSource>,
    upstream_timeout: Duration,
    cache_ttl: Duration,
}

impl PricingService {
    pub fn new(
        store: Arc<dyn CacheStore>,
        base_prices: Arc<dyn BasePriceSource>,
        market_data: Arc<dyn MarketDataSource>,
        upstream_timeout: Duration,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            store,
            base_prices,
            market_data,
            upstream_timeout,
            cache_ttl,
        }
    }

    /// Returns the cached price when present, otherwise fetches base price
    /// and market multiplier concurrently, prices the product and populates
    /// the cache.
    ///
    /// Either upstream failing or timing out fails the request with
    /// `UpstreamUnavailable`. A failed cache write does not: the computed
    /// record is still returned, flagged `WriteFailed`.
    pub async fn get_price(
        &self,
        product_id: &str,
        user_location: &str,
        is_prime_member: bool,
    ) -> Result<PriceQuote, AppError> {
        if product_id.trim().is_empty() {
            return Err(AppError::Validation("product_id must not be empty".to_string()));
        }
        if user_location.trim().is_empty() {
            return Err(AppError::Validation("user_location must not be empty".to_string()));
        }

        match get_cached_price(self.store.as_ref(), product_id).await {
            Ok(Some(record)) => {
                return Ok(PriceQuote {
                    record: record.with_source(PriceSource::Cache),
                    cache_status: CacheStatus::Hit,
                });
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Ignoring unusable cache entry for {}: {}", product_id, e);
            }
        }

        let (base_price, market_multiplier) = tokio::try_join!(
            self.bounded(self.base_prices.fetch_base_price(product_id)),
            self.bounded(self.market_data.fetch_market_multiplier(user_location)),
        )
        .map_err(|e| {
            error!("Upstream fetch failed for {} ({}): {}", product_id, user_location, e);
            AppError::from(e)
        })?;

        let record = PriceRecord::new(
            product_id,
            base_price,
            market_multiplier,
            discount_for(is_prime_member),
            PriceSource::Live,
        )?;

        let cache_status = match set_cached_price(self.store.as_ref(), &record, self.cache_ttl).await {
            Ok(()) => CacheStatus::Miss,
            Err(e) => {
                warn!("Failed to cache price for {}: {}", product_id, e);
                CacheStatus::WriteFailed
            }
        };

        info!(
            product_id = %product_id,
            final_price = record.final_price(),
            cache = cache_status.as_str(),
            "Computed live price"
        );

        Ok(PriceQuote { record, cache_status })
    }

    async fn bounded<T>(&self, fetch: impl Future<Output = Result<T, SourceError>>) -> Result<T, SourceError> {
        match tokio::time::timeout(self.upstream_timeout, fetch).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(self.upstream_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedBasePrice {
        price: f64,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BasePriceSource for FixedBasePrice {
        async fn fetch_base_price(&self, _product_id: &str) -> Result<f64, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.price)
        }
    }

    struct FixedMultiplier(f64);

    #[async_trait]
    impl MarketDataSource for FixedMultiplier {
        async fn fetch_market_multiplier(&self, _location: &str) -> Result<f64, SourceError> {
            Ok(self.0)
        }
    }

    struct FailingMarketData;

    #[async_trait]
    impl MarketDataSource for FailingMarketData {
        async fn fetch_market_multiplier(&self, _location: &str) -> Result<f64, SourceError> {
            Err(SourceError::Network("connection reset".to_string()))
        }
    }

    struct StalledMarketData;

    #[async_trait]
    impl MarketDataSource for StalledMarketData {
        async fn fetch_market_multiplier(&self, _location: &str) -> Result<f64, SourceError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(1.0)
        }
    }

    fn service_with(store: Arc<InMemoryStore>, market: Arc<dyn MarketDataSource>) -> (PricingService, Arc<FixedBasePrice>) {
        let base = Arc::new(FixedBasePrice {
            price: 52.00,
            calls: AtomicUsize::new(0),
        });
        let service = PricingService::new(
            store,
            base.clone(),
            market,
            Duration::from_millis(200),
            Duration::from_millis(60_000),
        );
        (service, base)
    }

    #[tokio::test]
    async fn test_miss_computes_live_price() {
        let store = Arc::new(InMemoryStore::new());
        let (service, _) = service_with(store, Arc::new(FixedMultiplier(0.95)));

        let quote = service.get_price("P-100", "NY", false).await.unwrap();

        assert_eq!(quote.cache_status, CacheStatus::Miss);
        assert_eq!(quote.record.source(), PriceSource::Live);
        assert_eq!(quote.record.final_price(), 49.40);
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let store = Arc::new(InMemoryStore::new());
        let (service, base) = service_with(store, Arc::new(FixedMultiplier(0.95)));

        let first = service.get_price("P-100", "NY", true).await.unwrap();
        let second = service.get_price("P-100", "NY", true).await.unwrap();

        assert_eq!(second.cache_status, CacheStatus::Hit);
        assert_eq!(second.record.source(), PriceSource::Cache);
        assert_eq!(second.record.final_price(), first.record.final_price());
        assert_eq!(second.record.base_price(), first.record.base_price());
        assert_eq!(second.record.discount_rate(), first.record.discount_rate());
        assert_eq!(base.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_entry_expires_and_is_recomputed() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
        let (service, base) = service_with(store, Arc::new(FixedMultiplier(0.95)));

        service.get_price("P-100", "NY", false).await.unwrap();
        clock.advance(Duration::from_millis(60_000));
        let again = service.get_price("P-100", "NY", false).await.unwrap();

        assert_eq!(again.cache_status, CacheStatus::Miss);
        assert_eq!(base.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_upstream_failure_fails_request() {
        let store = Arc::new(InMemoryStore::new());
        let (service, _) = service_with(store.clone(), Arc::new(FailingMarketData));

        let err = service.get_price("P-100", "NY", false).await.unwrap_err();

        assert!(matches!(err, AppError::UpstreamUnavailable(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_upstream_timeout_fails_request() {
        let store = Arc::new(InMemoryStore::new());
        let (service, _) = service_with(store, Arc::new(StalledMarketData));

        let err = service.get_price("P-100", "NY", false).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamUnavailable(msg) if msg.contains("timed out")));
    }

    #[tokio::test]
    async fn test_cache_write_failure_still_returns_price() {
        let store = Arc::new(InMemoryStore::new());
        store.set_fail_writes(true);
        let (service, _) = service_with(store, Arc::new(FixedMultiplier(0.95)));

        let quote = service.get_price("P-100", "NY", true).await.unwrap();

        assert_eq!(quote.cache_status, CacheStatus::WriteFailed);
        assert_eq!(quote.record.final_price(), 46.93);
    }

    #[tokio::test]
    async fn test_corrupt_cache_entry_is_treated_as_miss() {
        let store = Arc::new(InMemoryStore::new());
        store.set("price:P-100", b"garbage".to_vec(), Duration::from_secs(60)).await.unwrap();
        let (service, _) = service_with(store, Arc::new(FixedMultiplier(0.95)));

        let quote = service.get_price("P-100", "NY", false).await.unwrap();
        assert_eq!(quote.cache_status, CacheStatus::Miss);
        assert_eq!(quote.record.final_price(), 49.40);
    }

    #[tokio::test]
    async fn test_empty_product_id_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let (service, _) = service_with(store, Arc::new(FixedMultiplier(0.95)));

        let err = service.get_price("  ", "NY", false).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
