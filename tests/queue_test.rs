//! Integration tests for the durable queue.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use stepsync::DurableQueue;
use stepsync::error::Error;
use stepsync::model::QUEUE_KEY;
use stepsync::store::MemoryStore;

fn step(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("test payload must be an object, got {other}"),
    }
}

fn test_queue() -> DurableQueue<Arc<MemoryStore>> {
    DurableQueue::new(Arc::new(MemoryStore::new()))
}

// ---------------------------------------------------------------------------
// Append + list
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_on_fresh_queue_is_empty() {
    let queue = test_queue();
    assert!(queue.list().await.unwrap().is_empty());
    assert!(queue.is_empty().await.unwrap());
}

#[tokio::test]
async fn appended_steps_list_in_append_order_with_timestamps() {
    let queue = test_queue();

    queue.append(step(json!({"title": "A"}))).await.unwrap();
    queue.append(step(json!({"title": "B"}))).await.unwrap();

    let steps = queue.list().await.unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].get("title"), Some(&json!("A")));
    assert_eq!(steps[1].get("title"), Some(&json!("B")));
    assert!(steps[0].timestamp <= steps[1].timestamp);
    assert!(steps[0].timestamp > 0);
}

#[tokio::test]
async fn many_appends_keep_fifo_order_and_non_decreasing_timestamps() {
    let queue = test_queue();

    for i in 0..50 {
        queue.append(step(json!({"seq": i}))).await.unwrap();
    }

    let steps = queue.list().await.unwrap();
    let seqs: Vec<i64> = steps
        .iter()
        .map(|s| s.get("seq").and_then(Value::as_i64).unwrap())
        .collect();
    assert_eq!(seqs, (0..50).collect::<Vec<_>>());
    assert!(steps.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn concurrent_appends_are_not_lost() {
    let queue = Arc::new(test_queue());

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.append(step(json!({"seq": i}))).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let mut seqs: Vec<i64> = queue
        .list()
        .await
        .unwrap()
        .iter()
        .map(|s| s.get("seq").and_then(Value::as_i64).unwrap())
        .collect();
    seqs.sort();
    assert_eq!(seqs, (0..20).collect::<Vec<_>>());
}

#[tokio::test]
async fn timestamp_never_goes_backwards_after_clock_skew() {
    let store = Arc::new(MemoryStore::new());
    let far_future = chrono::Utc::now().timestamp_millis() + 3_600_000;
    stepsync::store::KvStore::set(
        &store,
        QUEUE_KEY,
        format!(r#"[{{"title":"from the future","timestamp":{far_future}}}]"#),
    )
    .await
    .unwrap();

    let queue = DurableQueue::new(Arc::clone(&store));
    let appended = queue.append(step(json!({"title": "now"}))).await.unwrap();
    assert_eq!(appended.timestamp, far_future);
}

#[tokio::test]
async fn record_is_one_json_array_under_well_known_key() {
    let store = Arc::new(MemoryStore::new());
    let queue = DurableQueue::new(Arc::clone(&store));

    queue.append(step(json!({"title": "A"}))).await.unwrap();

    let raw = store.raw(QUEUE_KEY).await.expect("record stored");
    let parsed: Value = serde_json::from_str(&raw).unwrap();
    let items = parsed.as_array().expect("array record");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["title"], json!("A"));
    assert!(items[0]["timestamp"].is_i64());
}

// ---------------------------------------------------------------------------
// Clear
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clear_removes_everything_and_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let queue = DurableQueue::new(Arc::clone(&store));
    queue.append(step(json!({"title": "A"}))).await.unwrap();

    queue.clear().await.unwrap();
    assert!(queue.list().await.unwrap().is_empty());
    assert!(store.raw(QUEUE_KEY).await.is_none());

    queue.clear().await.unwrap();
    assert!(queue.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn append_after_clear_starts_a_new_record() {
    let queue = test_queue();
    queue.append(step(json!({"title": "old"}))).await.unwrap();
    queue.clear().await.unwrap();
    queue.append(step(json!({"title": "new"}))).await.unwrap();

    let steps = queue.list().await.unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].get("title"), Some(&json!("new")));
}

// ---------------------------------------------------------------------------
// Storage failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn storage_failure_propagates_from_every_operation() {
    let store = Arc::new(MemoryStore::new());
    let queue = DurableQueue::new(Arc::clone(&store));
    store.set_unavailable(true);

    assert!(matches!(
        queue.append(step(json!({"title": "A"}))).await,
        Err(Error::Unavailable(_))
    ));
    assert!(matches!(queue.list().await, Err(Error::Unavailable(_))));
    assert!(matches!(queue.clear().await, Err(Error::Unavailable(_))));
}

#[tokio::test]
async fn rejected_write_fails_append_and_keeps_prior_record() {
    let store = Arc::new(MemoryStore::new());
    let queue = DurableQueue::new(Arc::clone(&store));
    queue.append(step(json!({"title": "A"}))).await.unwrap();
    let before = store.raw(QUEUE_KEY).await;

    store.set_reject_writes(true);
    assert!(matches!(
        queue.append(step(json!({"title": "B"}))).await,
        Err(Error::Unavailable(_))
    ));
    assert!(matches!(queue.clear().await, Err(Error::Unavailable(_))));

    assert_eq!(store.raw(QUEUE_KEY).await, before);
    let steps = queue.list().await.unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].get("title"), Some(&json!("A")));
}

#[tokio::test]
async fn corrupt_record_is_reported_and_left_in_place() {
    let store = Arc::new(MemoryStore::new());
    stepsync::store::KvStore::set(&store, QUEUE_KEY, "not json".to_string())
        .await
        .unwrap();
    let queue = DurableQueue::new(Arc::clone(&store));

    assert!(matches!(queue.list().await, Err(Error::Corrupt(_))));
    assert!(matches!(
        queue.append(step(json!({"title": "A"}))).await,
        Err(Error::Corrupt(_))
    ));
    assert_eq!(store.raw(QUEUE_KEY).await.as_deref(), Some("not json"));
}

#[tokio::test]
async fn queues_with_different_keys_are_independent() {
    let store = Arc::new(MemoryStore::new());
    let first = DurableQueue::new(Arc::clone(&store));
    let second = DurableQueue::with_key(Arc::clone(&store), "other-workflows");

    first.append(step(json!({"title": "A"}))).await.unwrap();

    assert_eq!(first.len().await.unwrap(), 1);
    assert!(second.is_empty().await.unwrap());
    assert_eq!(second.key(), "other-workflows");
}
