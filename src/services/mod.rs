pub mod distributed_lock;
pub mod event_bridge;
pub mod job_status_service;
pub mod price_cache_service;
pub mod pricing_service;
pub mod queue_maintenance;
pub mod worker;
