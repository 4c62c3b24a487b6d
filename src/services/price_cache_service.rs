use std::time::Duration;

use tracing::debug;

use crate::models::PriceRecord;
use crate::store::{price_key, CacheStore, StoreError};

/// Reads `price:<product_id>`. A payload that does not decode or does not
/// replay to its own `final_price` is reported as a serialization error.
pub async fn get_cached_price(store: &dyn CacheStore, product_id: &str) -> Result<Option<PriceRecord>, StoreError> {
    let key = price_key(product_id);
    let Some(bytes) = store.get(&key).await? else {
        debug!(key = %key, "Price cache miss");
        return Ok(None);
    };

    let record: PriceRecord = serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::Serialization(format!("{}: {}", key, e)))?;
    record
        .verify()
        .map_err(|e| StoreError::Serialization(format!("{}: {}", key, e)))?;

    debug!(key = %key, "Price cache hit");
    Ok(Some(record))
}

pub async fn set_cached_price(store: &dyn CacheStore, record: &PriceRecord, ttl: Duration) -> Result<(), StoreError> {
    let payload = serde_json::to_vec(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
    store.set(&price_key(record.product_id()), payload, ttl).await
}
