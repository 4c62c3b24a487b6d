//! In-process stand-ins for the upstream systems.
//!
//! The pricing engine only depends on the traits in `price_source`; these
//! implementations reproduce the latency and value profile of the real
//! upstreams (a slow product database, a market-data API and a bulk product
//! listing) so the whole system can run without them.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, warn};

use crate::external::price_source::{BasePriceSource, MarketDataSource, ProductCatalog, SourceError};

fn random_latency(range: &Range<u64>) -> Duration {
    if range.is_empty() {
        return Duration::from_millis(range.start);
    }
    Duration::from_millis(rand::rng().random_range(range.clone()))
}

/// Product database lookup: `49.99 + (hash(product_id) % 10)`.
pub struct SimulatedBasePriceSource {
    latency_ms: Range<u64>,
}

impl SimulatedBasePriceSource {
    pub fn new() -> Self {
        Self { latency_ms: 10..50 }
    }

    /// Deterministic for a given build, so repeated lookups agree.
    pub fn base_price_for(product_id: &str) -> f64 {
        let mut hasher = DefaultHasher::new();
        product_id.hash(&mut hasher);
        let bucket = hasher.finish() % 10;
        // work in cents so the result is the closest f64 to an exact 2-dp price
        (4_999 + bucket * 100) as f64 / 100.0
    }
}

impl Default for SimulatedBasePriceSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BasePriceSource for SimulatedBasePriceSource {
    async fn fetch_base_price(&self, product_id: &str) -> Result<f64, SourceError> {
        tokio::time::sleep(random_latency(&self.latency_ms)).await;
        let price = Self::base_price_for(product_id);
        debug!(product_id = %product_id, base_price = price, "Fetched base price");
        Ok(price)
    }
}

#[derive(Debug, Clone)]
enum MultiplierProfile {
    Fixed(f64),
    Volatile { low: f64, high: f64 },
}

/// Market-data API.
///
/// The request-path feed quotes a flat multiplier; the bulk feed used by
/// the recomputation pipeline drifts within a band on every call.
pub struct SimulatedMarketDataSource {
    profile: MultiplierProfile,
    latency_ms: Range<u64>,
}

impl SimulatedMarketDataSource {
    pub fn fixed(multiplier: f64) -> Self {
        Self {
            profile: MultiplierProfile::Fixed(multiplier),
            latency_ms: 20..40,
        }
    }

    pub fn volatile(low: f64, high: f64) -> Self {
        Self {
            profile: MultiplierProfile::Volatile { low, high },
            latency_ms: 0..1,
        }
    }
}

#[async_trait]
impl MarketDataSource for SimulatedMarketDataSource {
    async fn fetch_market_multiplier(&self, location: &str) -> Result<f64, SourceError> {
        tokio::time::sleep(random_latency(&self.latency_ms)).await;
        let multiplier = match self.profile {
            MultiplierProfile::Fixed(value) => value,
            MultiplierProfile::Volatile { low, high } => {
                let raw = rand::rng().random_range(low..high);
                // quote to 4 dp like a real feed
                (raw * 10_000.0).round() / 10_000.0
            }
        };
        debug!(location = %location, multiplier, "Fetched market multiplier");
        Ok(multiplier)
    }
}

/// Bulk product listing. Slow on purpose and may contain duplicates, like
/// the table scan it stands in for.
pub struct SimulatedProductCatalog {
    size: usize,
    latency: Duration,
}

impl SimulatedProductCatalog {
    pub fn new(size: usize, latency: Duration) -> Self {
        Self { size, latency }
    }
}

#[async_trait]
impl ProductCatalog for SimulatedProductCatalog {
    async fn list_product_ids(&self) -> Result<Vec<String>, SourceError> {
        tokio::time::sleep(self.latency).await;
        let mut rng = rand::rng();
        let ids = (0..self.size)
            .map(|_| format!("P-{}", rng.random_range(100..1000)))
            .collect::<Vec<_>>();
        debug!(count = ids.len(), "Listed product ids");
        Ok(ids)
    }
}

/// Fixed product listing, mostly for tests and local seeding.
pub struct StaticProductCatalog {
    ids: Vec<String>,
}

impl StaticProductCatalog {
    pub fn new(ids: Vec<String>) -> Self {
        Self { ids }
    }
}

#[async_trait]
impl ProductCatalog for StaticProductCatalog {
    async fn list_product_ids(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.ids.clone())
    }
}

/// Randomly fails with a transient external timeout.
pub struct FaultInjector {
    probability: f64,
}

impl FaultInjector {
    pub fn new(probability: f64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
        }
    }

    pub fn disabled() -> Self {
        Self::new(0.0)
    }

    pub fn always() -> Self {
        Self::new(1.0)
    }

    pub fn check(&self) -> Result<(), SourceError> {
        if self.probability > 0.0 && rand::random::<f64>() < self.probability {
            warn!(probability = self.probability, "Injected external API timeout");
            return Err(SourceError::TransientTimeout("External API timeout".to_string()));
        }
        Ok(())
    }
}
