use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("external API timeout: {0}")]
    TransientTimeout(String),
}

/// Slow-changing list price, looked up per product.
#[async_trait]
pub trait BasePriceSource: Send + Sync {
    async fn fetch_base_price(&self, product_id: &str) -> Result<f64, SourceError>;
}

/// Fast-changing market multiplier, looked up per customer location.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_market_multiplier(&self, location: &str) -> Result<f64, SourceError>;
}

/// Bulk listing of every product that should have a warm cache entry.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn list_product_ids(&self) -> Result<Vec<String>, SourceError>;
}
