use std::str::FromStr;
use std::time::Duration;

/// Process configuration shared by the API server, the worker and the listener.
///
/// Every value has a default so a bare `.env`-less start works against a
/// local Redis.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub redis_url: String,
    pub host: String,
    pub port: u16,
    pub upstream_timeout_ms: u64,
    pub cache_ttl_ms: u64,
    pub lock_name: String,
    pub lock_timeout_secs: u64,
    pub job_max_retries: u32,
    pub job_retry_backoff_secs: u64,
    pub job_visibility_timeout_secs: u64,
    pub job_status_ttl_secs: u64,
    pub queue_name: String,
    pub event_channel: String,
    pub listener_startup_delay_secs: u64,
    pub worker_concurrency: usize,
    pub worker_poll_interval_ms: u64,
    pub recalc_concurrency: usize,
    pub catalog_size: usize,
    pub catalog_latency_ms: u64,
    pub fault_probability: f64,
    pub worker_discount_rate: f64,
    pub bulk_location: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            upstream_timeout_ms: 2_000,
            cache_ttl_ms: 60_000,
            lock_name: "recalculate_global_lock".to_string(),
            lock_timeout_secs: 60,
            job_max_retries: 5,
            job_retry_backoff_secs: 30,
            job_visibility_timeout_secs: 300,
            job_status_ttl_secs: 3_600,
            queue_name: "recalculate_all_prices".to_string(),
            event_channel: "market_events".to_string(),
            listener_startup_delay_secs: 15,
            worker_concurrency: 2,
            worker_poll_interval_ms: 500,
            recalc_concurrency: 16,
            catalog_size: 1_000,
            catalog_latency_ms: 5_000,
            fault_probability: 0.1,
            worker_discount_rate: 0.10,
            bulk_location: "GLOBAL".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: env_or("REDIS_URL", defaults.redis_url),
            host: env_or("HOST", defaults.host),
            port: env_parse("PORT", defaults.port),
            upstream_timeout_ms: env_parse("UPSTREAM_TIMEOUT_MS", defaults.upstream_timeout_ms),
            cache_ttl_ms: env_parse("CACHE_TTL_MS", defaults.cache_ttl_ms),
            lock_name: env_or("LOCK_NAME", defaults.lock_name),
            lock_timeout_secs: env_parse("LOCK_TIMEOUT_SECS", defaults.lock_timeout_secs),
            job_max_retries: env_parse("JOB_MAX_RETRIES", defaults.job_max_retries),
            job_retry_backoff_secs: env_parse("JOB_RETRY_BACKOFF_SECS", defaults.job_retry_backoff_secs),
            job_visibility_timeout_secs: env_parse(
                "JOB_VISIBILITY_TIMEOUT_SECS",
                defaults.job_visibility_timeout_secs,
            ),
            job_status_ttl_secs: env_parse("JOB_STATUS_TTL_SECS", defaults.job_status_ttl_secs),
            queue_name: env_or("QUEUE_NAME", defaults.queue_name),
            event_channel: env_or("EVENT_CHANNEL", defaults.event_channel),
            listener_startup_delay_secs: env_parse(
                "LISTENER_STARTUP_DELAY_SECS",
                defaults.listener_startup_delay_secs,
            ),
            worker_concurrency: env_parse("WORKER_CONCURRENCY", defaults.worker_concurrency),
            worker_poll_interval_ms: env_parse("WORKER_POLL_INTERVAL_MS", defaults.worker_poll_interval_ms),
            recalc_concurrency: env_parse("RECALC_CONCURRENCY", defaults.recalc_concurrency),
            catalog_size: env_parse("CATALOG_SIZE", defaults.catalog_size),
            catalog_latency_ms: env_parse("CATALOG_LATENCY_MS", defaults.catalog_latency_ms),
            fault_probability: env_parse("FAULT_PROBABILITY", defaults.fault_probability),
            worker_discount_rate: env_parse("WORKER_DISCOUNT_RATE", defaults.worker_discount_rate),
            bulk_location: env_or("BULK_LOCATION", defaults.bulk_location),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.redis_url.is_empty() {
            return Err("REDIS_URL must not be empty".to_string());
        }
        if self.upstream_timeout_ms == 0 {
            return Err("UPSTREAM_TIMEOUT_MS must be greater than zero".to_string());
        }
        if self.cache_ttl_ms == 0 {
            return Err("CACHE_TTL_MS must be greater than zero".to_string());
        }
        if self.lock_timeout_secs == 0 {
            return Err("LOCK_TIMEOUT_SECS must be greater than zero".to_string());
        }
        if self.job_visibility_timeout_secs <= self.lock_timeout_secs {
            return Err(format!(
                "JOB_VISIBILITY_TIMEOUT_SECS ({}) must exceed LOCK_TIMEOUT_SECS ({})",
                self.job_visibility_timeout_secs, self.lock_timeout_secs
            ));
        }
        if self.worker_concurrency == 0 || self.recalc_concurrency == 0 {
            return Err("WORKER_CONCURRENCY and RECALC_CONCURRENCY must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.fault_probability) {
            return Err(format!("FAULT_PROBABILITY must be within [0, 1], got {}", self.fault_probability));
        }
        if !(0.0..1.0).contains(&self.worker_discount_rate) {
            return Err(format!(
                "WORKER_DISCOUNT_RATE must be within [0, 1), got {}",
                self.worker_discount_rate
            ));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.job_retry_backoff_secs)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.job_visibility_timeout_secs)
    }

    pub fn job_status_ttl(&self) -> Duration {
        Duration::from_secs(self.job_status_ttl_secs)
    }

    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_interval_ms)
    }

    pub fn listener_startup_delay(&self) -> Duration {
        Duration::from_secs(self.listener_startup_delay_secs)
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Ignoring unparsable {}={:?}, using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_contract() {
        let config = AppConfig::default();
        assert_eq!(config.cache_ttl(), Duration::from_millis(60_000));
        assert_eq!(config.lock_name, "recalculate_global_lock");
        assert_eq!(config.lock_timeout(), Duration::from_secs(60));
        assert_eq!(config.job_max_retries, 5);
        assert_eq!(config.retry_backoff(), Duration::from_secs(30));
        assert_eq!(config.event_channel, "market_events");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_lease_shorter_than_lock() {
        let config = AppConfig {
            job_visibility_timeout_secs: 30,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_fault_probability() {
        let config = AppConfig {
            fault_probability: 1.5,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
