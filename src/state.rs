use std::sync::Arc;

use crate::config::AppConfig;
use crate::queue::JobQueue;
use crate::services::pricing_service::PricingService;
use crate::store::CacheStore;

#[derive(Clone)]
pub struct AppState {
    pub pricing: Arc<PricingService>,
    pub store: Arc<dyn CacheStore>,
    pub queue: Arc<dyn JobQueue>,
    pub config: Arc<AppConfig>,
}
