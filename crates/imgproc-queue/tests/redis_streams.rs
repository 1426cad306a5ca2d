//! Redis Streams round trip. Needs a reachable server at `REDIS_URL`.

use futures::StreamExt;
use imgproc_queue::{DeliveryMode, QueueConfig, QueueTransport, RedisQueue, CONTENT_TYPE_JSON};

fn unique_queue() -> String {
    format!("imgproc-test:{}", uuid::Uuid::new_v4())
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn publish_subscribe_ack() {
    let queue = RedisQueue::connect(QueueConfig {
        block_ms: 500,
        ..QueueConfig::from_env()
    })
    .await
    .unwrap();
    let name = unique_queue();

    let mut stream = queue.subscribe(&name).await.unwrap();
    queue
        .publish(&name, CONTENT_TYPE_JSON, DeliveryMode::Persistent, br#"{"id":"1"}"#)
        .await
        .unwrap();

    let delivery = stream.next().await.unwrap().unwrap();
    assert_eq!(delivery.body(), br#"{"id":"1"}"#);
    delivery.ack().await.unwrap();
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn requeue_redelivers() {
    let queue = RedisQueue::connect(QueueConfig {
        block_ms: 500,
        ..QueueConfig::from_env()
    })
    .await
    .unwrap();
    let name = unique_queue();

    let mut stream = queue.subscribe(&name).await.unwrap();
    queue
        .publish(&name, CONTENT_TYPE_JSON, DeliveryMode::Transient, b"again")
        .await
        .unwrap();

    stream.next().await.unwrap().unwrap().reject(true).await.unwrap();
    let redelivered = stream.next().await.unwrap().unwrap();
    assert_eq!(redelivered.body(), b"again");
    redelivered.reject(false).await.unwrap();
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn abandoned_delivery_is_claimed_by_another_consumer() {
    let name = unique_queue();
    let first = RedisQueue::connect(QueueConfig {
        block_ms: 500,
        consumer_name: "imgproc-test-first".to_string(),
        ..QueueConfig::from_env()
    })
    .await
    .unwrap();

    let mut stream = first.subscribe(&name).await.unwrap();
    first
        .publish(&name, CONTENT_TYPE_JSON, DeliveryMode::Persistent, b"orphan")
        .await
        .unwrap();
    let abandoned = stream.next().await.unwrap().unwrap();
    let tag = abandoned.tag().to_string();
    drop(abandoned);
    drop(stream);

    let second = RedisQueue::connect(QueueConfig {
        block_ms: 500,
        consumer_name: "imgproc-test-second".to_string(),
        claim_min_idle_ms: 0,
        claim_interval_ms: 0,
        ..QueueConfig::from_env()
    })
    .await
    .unwrap();
    let mut stream = second.subscribe(&name).await.unwrap();

    let claimed = stream.next().await.unwrap().unwrap();
    assert_eq!(claimed.tag(), tag);
    assert_eq!(claimed.body(), b"orphan");
    claimed.ack().await.unwrap();
}
