//! Integration tests for the Redis store and job queue.
//!
//! These run the Lua scripts and `SET NX PX` locking against a real Redis
//! started with testcontainers. Set `REDIS_TEST_URL` to reuse an existing
//! server instead.

use std::time::Duration;

use deadpool_redis::Pool;
use testcontainers::{runners::AsyncRunner, ContainerAsync};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;
use uuid::Uuid;

use pricing_engine::models::RecalculationJob;
use pricing_engine::queue::redis_queue::RedisJobQueue;
use pricing_engine::queue::JobQueue;
use pricing_engine::store::redis_store::{create_redis_pool, RedisStore};
use pricing_engine::store::{CacheStore, LockHandle, LockOutcome};

// Shared Redis container for all tests
static SHARED_REDIS: OnceCell<(Option<ContainerAsync<Redis>>, String)> = OnceCell::const_new();

async fn get_redis_url() -> String {
    let (_, url) = SHARED_REDIS
        .get_or_init(|| async {
            if let Ok(url) = std::env::var("REDIS_TEST_URL") {
                return (None, url);
            }

            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");
            let host_port = container.get_host_port_ipv4(6379).await.expect("get port");
            let url = format!("redis://127.0.0.1:{}", host_port);

            (Some(container), url)
        })
        .await;

    url.clone()
}

async fn pool() -> Pool {
    create_redis_pool(&get_redis_url().await).expect("create pool")
}

fn unique(prefix: &str) -> String {
    format!("{}:{}", prefix, Uuid::new_v4())
}

fn acquired(outcome: LockOutcome) -> LockHandle {
    match outcome {
        LockOutcome::Acquired(handle) => handle,
        LockOutcome::Denied => panic!("expected to acquire the lock"),
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_redis_store_ping() {
    let store = RedisStore::new(pool().await);
    store.ping().await.unwrap();
}

#[tokio::test]
async fn test_redis_store_value_expires() {
    let store = RedisStore::new(pool().await);
    let key = unique("price");

    store.set(&key, b"{}".to_vec(), Duration::from_millis(200)).await.unwrap();
    assert_eq!(store.get(&key).await.unwrap(), Some(b"{}".to_vec()));

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(store.get(&key).await.unwrap(), None);
}

#[tokio::test]
async fn test_redis_lock_has_one_holder() {
    let store = RedisStore::new(pool().await);
    let name = unique("recalculate_global_lock");

    let holder = acquired(store.acquire_lock(&name, Duration::from_secs(60)).await.unwrap());
    assert_eq!(
        store.acquire_lock(&name, Duration::from_secs(60)).await.unwrap(),
        LockOutcome::Denied
    );

    let impostor = LockHandle {
        name: name.clone(),
        token: Uuid::new_v4().to_string(),
    };
    assert!(!store.release(&impostor).await.unwrap());
    assert_eq!(
        store.acquire_lock(&name, Duration::from_secs(60)).await.unwrap(),
        LockOutcome::Denied
    );

    assert!(store.release(&holder).await.unwrap());
    acquired(store.acquire_lock(&name, Duration::from_secs(60)).await.unwrap());
}

#[tokio::test]
async fn test_redis_expired_holder_cannot_release_successor() {
    let store = RedisStore::new(pool().await);
    let name = unique("recalculate_global_lock");

    let stale = acquired(store.acquire_lock(&name, Duration::from_millis(200)).await.unwrap());
    tokio::time::sleep(Duration::from_millis(350)).await;

    let successor = acquired(store.acquire_lock(&name, Duration::from_secs(60)).await.unwrap());
    assert!(!store.release(&stale).await.unwrap());
    assert_eq!(
        store.acquire_lock(&name, Duration::from_secs(60)).await.unwrap(),
        LockOutcome::Denied
    );
    assert!(store.release(&successor).await.unwrap());
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_redis_queue_delivers_in_order_and_acks() {
    let queue = RedisJobQueue::new(pool().await, &unique("recalculate_all_prices"), Duration::from_secs(300));
    let first = RecalculationJob::new(5, 30);
    let second = RecalculationJob::new(5, 30);
    queue.enqueue(&first, Duration::ZERO).await.unwrap();
    queue.enqueue(&second, Duration::ZERO).await.unwrap();

    let delivery = queue.reserve().await.unwrap().unwrap();
    assert_eq!(delivery.job, first);
    queue.ack(&delivery).await.unwrap();

    assert_eq!(queue.reserve().await.unwrap().unwrap().job, second);
    assert!(queue.reserve().await.unwrap().is_none());
}

#[tokio::test]
async fn test_redis_queue_holds_delayed_job_until_backoff() {
    let queue = RedisJobQueue::new(pool().await, &unique("recalculate_all_prices"), Duration::from_secs(300));
    let retry = RecalculationJob::new(5, 30).next_attempt();
    queue.enqueue(&retry, Duration::from_millis(300)).await.unwrap();

    assert!(queue.reserve().await.unwrap().is_none());

    tokio::time::sleep(Duration::from_millis(450)).await;
    let delivery = queue.reserve().await.unwrap().unwrap();
    assert_eq!(delivery.job, retry);
}

#[tokio::test]
async fn test_redis_queue_requeues_unacked_delivery_after_lease() {
    let queue = RedisJobQueue::new(pool().await, &unique("recalculate_all_prices"), Duration::from_millis(300));
    let job = RecalculationJob::new(5, 30);
    queue.enqueue(&job, Duration::ZERO).await.unwrap();

    // reserved by a worker that then died
    let _abandoned = queue.reserve().await.unwrap().unwrap();
    assert_eq!(queue.requeue_expired().await.unwrap(), 0);
    assert!(queue.reserve().await.unwrap().is_none());

    tokio::time::sleep(Duration::from_millis(450)).await;
    assert_eq!(queue.requeue_expired().await.unwrap(), 1);

    let redelivered = queue.reserve().await.unwrap().unwrap();
    assert_eq!(redelivered.job, job);
}

#[tokio::test]
async fn test_redis_queue_acked_delivery_is_not_requeued() {
    let queue = RedisJobQueue::new(pool().await, &unique("recalculate_all_prices"), Duration::from_millis(300));
    queue.enqueue(&RecalculationJob::new(5, 30), Duration::ZERO).await.unwrap();

    let delivery = queue.reserve().await.unwrap().unwrap();
    queue.ack(&delivery).await.unwrap();

    tokio::time::sleep(Duration::from_millis(450)).await;
    assert_eq!(queue.requeue_expired().await.unwrap(), 0);
    assert!(queue.reserve().await.unwrap().is_none());
}
