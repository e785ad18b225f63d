// store.rs
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Mutex;
use tracing::warn;

/// Failure talking to the durable store. Always a transient condition from
/// the caller's point of view.
#[derive(Debug, Clone, Error)]
#[error("store unavailable: {0}")]
pub struct StoreError(pub String);

/// The durable-store collaborator: keyed writes, reads, and change
/// notification. `watch` delivers the current value first, then changes
/// with at-least-once semantics; consumers must tolerate duplicates.
#[async_trait]
pub trait Store: Send + Sync {
    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError>;
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn watch(&self, key: &str) -> Result<mpsc::Receiver<Value>, StoreError>;
}

const WATCH_BUFFER: usize = 16;

pub const RETRY_ATTEMPTS: u32 = 3;
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(50);

/// Bounded exponential backoff for idempotent store writes. Terminal
/// domain errors never pass through here.
pub async fn with_retry<T, F, Fut>(what: &str, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut delay = RETRY_BASE_DELAY;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < RETRY_ATTEMPTS => {
                warn!(error = %err, attempt, "{} failed, retrying", what);
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// In-process store, the default when no DATABASE_URL is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    values: HashMap<String, Value>,
    watchers: HashMap<String, Vec<mpsc::Sender<Value>>>,
}

#[async_trait]
impl Store for MemoryStore {
    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.values.insert(key.to_string(), value.clone());
        if let Some(watchers) = inner.watchers.get_mut(key) {
            watchers.retain(|tx| match tx.try_send(value.clone()) {
                Ok(()) => true,
                // A full watcher keeps its slot; it catches up from later
                // values or re-reads the snapshot.
                Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Closed(_)) => false,
            });
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.values.get(key).cloned())
    }

    async fn watch(&self, key: &str) -> Result<mpsc::Receiver<Value>, StoreError> {
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        let mut inner = self.inner.lock().await;
        if let Some(current) = inner.values.get(key) {
            // Snapshot first, so a (re)connecting watcher starts current.
            let _ = tx.try_send(current.clone());
        }
        inner.watchers.entry(key.to_string()).or_default().push(tx);
        Ok(rx)
    }
}
