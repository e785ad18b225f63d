// src/db.rs
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgListener, PgPoolOptions};
use sqlx::{PgPool, Row};
use tokio::sync::mpsc;
use tracing::warn;

use crate::store::{Store, StoreError};

const WATCH_BUFFER: usize = 16;

/// Postgres-backed store: one JSONB row per key, watchers driven by
/// pg_notify. Selected at startup when DATABASE_URL is set.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(from_sqlx)?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sync_state (key TEXT PRIMARY KEY, value JSONB NOT NULL)",
        )
        .execute(&pool)
        .await
        .map_err(from_sqlx)?;
        Ok(Self { pool })
    }
}

fn from_sqlx(err: sqlx::Error) -> StoreError {
    StoreError(err.to_string())
}

// NOTIFY channel names must be plain identifiers.
fn channel_for(key: &str) -> String {
    format!("sync_{}", key.replace(['/', '-'], "_"))
}

#[async_trait]
impl Store for PgStore {
    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sync_state (key, value) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(key)
        .bind(&value)
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(channel_for(key))
            .bind(value.to_string())
            .execute(&self.pool)
            .await
            .map_err(from_sqlx)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query("SELECT value FROM sync_state WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(from_sqlx)?;
        Ok(row.map(|r| r.get::<Value, _>("value")))
    }

    async fn watch(&self, key: &str) -> Result<mpsc::Receiver<Value>, StoreError> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(from_sqlx)?;
        listener.listen(&channel_for(key)).await.map_err(from_sqlx)?;
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        if let Some(current) = self.get(key).await? {
            // Snapshot first, matching the in-memory store.
            let _ = tx.try_send(current);
        }
        let key = key.to_string();
        tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => match serde_json::from_str(notification.payload()) {
                        Ok(value) => {
                            if tx.send(value).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, key = %key, "discarding malformed notification");
                        }
                    },
                    Err(err) => {
                        // PgListener reconnects on its own; notifications in
                        // the gap are lost, which at-least-once consumers
                        // recover from by re-reading the snapshot.
                        warn!(error = %err, key = %key, "store watch interrupted");
                        if tx.is_closed() {
                            break;
                        }
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });
        Ok(rx)
    }
}
