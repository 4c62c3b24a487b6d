//! Market event listener.
//!
//! Subscribes to the market event channel and turns every message into a
//! queued [`RecalculationJob`]. Message content is logged but otherwise
//! ignored: any event means "recompute everything".
//!
//! The bridge is long-running. It ends in exactly three ways:
//! - the cancellation token fires ([`BridgeExit::Shutdown`], exit 0)
//! - the subscription stream closes ([`BridgeExit::StreamEnded`], exit 1)
//! - subscribing or enqueueing fails ([`BridgeError`], exit 1)
//!
//! A supervisor is expected to restart the process in the last two cases.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::Client;
use futures::stream::{BoxStream, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::models::RecalculationJob;
use crate::queue::{JobQueue, QueueError};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("subscription failed: {0}")]
    Subscription(String),

    #[error("failed to enqueue recalculation job: {0}")]
    Enqueue(#[from] QueueError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeExit {
    Shutdown,
    StreamEnded,
}

impl BridgeExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            BridgeExit::Shutdown => 0,
            BridgeExit::StreamEnded => 1,
        }
    }
}

#[async_trait]
pub trait EventSource: Send + Sync {
    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, Vec<u8>>, BridgeError>;
}

/// Redis pub/sub subscription on a dedicated connection; pooled
/// connections cannot enter subscriber mode.
pub struct RedisEventSource {
    redis_url: String,
}

impl RedisEventSource {
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
        }
    }
}

#[async_trait]
impl EventSource for RedisEventSource {
    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, Vec<u8>>, BridgeError> {
        let client = Client::open(self.redis_url.as_str()).map_err(|e| BridgeError::Subscription(e.to_string()))?;

        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| BridgeError::Subscription(e.to_string()))?;

        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| BridgeError::Subscription(e.to_string()))?;

        Ok(pubsub
            .into_on_message()
            .map(|msg| msg.get_payload_bytes().to_vec())
            .boxed())
    }
}

pub struct EventBridge {
    source: Arc<dyn EventSource>,
    queue: Arc<dyn JobQueue>,
    channel: String,
    max_retries: u32,
    backoff: Duration,
}

impl EventBridge {
    pub fn new(
        source: Arc<dyn EventSource>,
        queue: Arc<dyn JobQueue>,
        channel: impl Into<String>,
        max_retries: u32,
        backoff: Duration,
    ) -> Self {
        Self {
            source,
            queue,
            channel: channel.into(),
            max_retries,
            backoff,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) -> Result<BridgeExit, BridgeError> {
        let mut events = self.source.subscribe(&self.channel).await.map_err(|e| {
            error!(channel = %self.channel, "Could not subscribe: {}", e);
            e
        })?;
        info!(channel = %self.channel, "Subscribed to market events");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Event bridge shutting down");
                    return Ok(BridgeExit::Shutdown);
                }
                next = events.next() => match next {
                    Some(payload) => self.on_event(&payload).await?,
                    None => {
                        warn!(channel = %self.channel, "Market event stream ended");
                        return Ok(BridgeExit::StreamEnded);
                    }
                }
            }
        }
    }

    async fn on_event(&self, payload: &[u8]) -> Result<(), BridgeError> {
        let message = String::from_utf8_lossy(payload);
        let job = RecalculationJob::new(self.max_retries, self.backoff.as_secs());

        self.queue.enqueue(&job, Duration::ZERO).await.map_err(|e| {
            error!(event = %message, "Dropping market event, enqueue failed: {}", e);
            e
        })?;

        info!(job_id = %job.id, event = %message, "Market event received, recalculation queued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::memory::InMemoryJobQueue;
    use crate::queue::Delivery;
    use futures::stream;

    struct ScriptedSource {
        messages: Vec<Vec<u8>>,
        endless: bool,
    }

    #[async_trait]
    impl EventSource for ScriptedSource {
        async fn subscribe(&self, _channel: &str) -> Result<BoxStream<'static, Vec<u8>>, BridgeError> {
            let messages = stream::iter(self.messages.clone());
            if self.endless {
                Ok(messages.chain(stream::pending()).boxed())
            } else {
                Ok(messages.boxed())
            }
        }
    }

    struct RefusingSource;

    #[async_trait]
    impl EventSource for RefusingSource {
        async fn subscribe(&self, _channel: &str) -> Result<BoxStream<'static, Vec<u8>>, BridgeError> {
            Err(BridgeError::Subscription("connection refused".to_string()))
        }
    }

    struct DownQueue;

    #[async_trait]
    impl JobQueue for DownQueue {
        async fn enqueue(&self, _job: &RecalculationJob, _delay: Duration) -> Result<(), QueueError> {
            Err(QueueError::Connection("connection refused".to_string()))
        }
        async fn reserve(&self) -> Result<Option<Delivery>, QueueError> {
            Ok(None)
        }
        async fn ack(&self, _delivery: &Delivery) -> Result<(), QueueError> {
            Ok(())
        }
        async fn requeue_expired(&self) -> Result<usize, QueueError> {
            Ok(0)
        }
    }

    fn bridge(source: Arc<dyn EventSource>, queue: Arc<dyn JobQueue>) -> EventBridge {
        EventBridge::new(source, queue, "market_events", 5, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_each_message_enqueues_one_job() {
        let queue = Arc::new(InMemoryJobQueue::new(Duration::from_secs(300)));
        let source = Arc::new(ScriptedSource {
            messages: vec![b"price_spike".to_vec(), vec![0xff, 0xfe], b"".to_vec()],
            endless: false,
        });

        let exit = bridge(source, queue.clone()).run(CancellationToken::new()).await.unwrap();

        assert_eq!(exit, BridgeExit::StreamEnded);
        assert_eq!(exit.exit_code(), 1);
        assert_eq!(queue.ready_len(), 3);

        let job = queue.reserve().await.unwrap().unwrap().job;
        assert_eq!(job.attempt, 0);
        assert_eq!(job.max_retries, 5);
        assert_eq!(job.backoff_secs, 30);
    }

    #[tokio::test]
    async fn test_cancel_is_a_clean_exit() {
        let queue = Arc::new(InMemoryJobQueue::new(Duration::from_secs(300)));
        let source = Arc::new(ScriptedSource {
            messages: vec![b"event".to_vec()],
            endless: true,
        });
        let cancel = CancellationToken::new();
        let bridge = bridge(source, queue.clone());

        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move { bridge.run(cancel).await })
        };
        while queue.ready_len() == 0 {
            tokio::task::yield_now().await;
        }
        cancel.cancel();

        let exit = handle.await.unwrap().unwrap();
        assert_eq!(exit, BridgeExit::Shutdown);
        assert_eq!(exit.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_subscription_failure_is_an_error() {
        let queue = Arc::new(InMemoryJobQueue::new(Duration::from_secs(300)));
        let err = bridge(Arc::new(RefusingSource), queue)
            .run(CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Subscription(_)));
    }

    #[tokio::test]
    async fn test_enqueue_failure_stops_the_bridge() {
        let source = Arc::new(ScriptedSource {
            messages: vec![b"event".to_vec()],
            endless: true,
        });
        let err = bridge(source, Arc::new(DownQueue))
            .run(CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Enqueue(_)));
    }
}
