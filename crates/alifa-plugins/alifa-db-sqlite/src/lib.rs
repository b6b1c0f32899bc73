//! # alifa-db-sqlite Implementation
//!
//! `RecordStore` over a single SQLite table. Every collection shares the
//! `records` table; payloads are stored as JSON text and filtered in Rust.
//!
//! # Developer Note
//! Change notifications are delivered in-process, after the write commits,
//! to every subscriber whose collection and filter match. Handlers are
//! collected before any of them runs so a handler may subscribe or drop a
//! subscription without deadlocking the subscriber map.

use alifa_core::{ChangeEvent, ChangeHandler, ChangeKind, Record, RecordFilter, RecordStore, Subscription};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS records (
    collection TEXT NOT NULL,
    id         TEXT NOT NULL,
    payload    TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT,
    PRIMARY KEY (collection, id)
)";

struct Subscriber {
    collection: String,
    filter: RecordFilter,
    on_change: ChangeHandler,
}

pub struct SqliteRecordStore {
    pool: SqlitePool,
    subscribers: Arc<DashMap<u64, Subscriber>>,
    next_subscription: AtomicU64,
}

impl SqliteRecordStore {
    /// Opens (creating if needed) the database at `database_url` and ensures
    /// the schema exists.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // An in-memory database lives only as long as its connection.
        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
        };
        let pool = pool_options.connect_with(options).await?;

        sqlx::query(SCHEMA).execute(&pool).await?;
        tracing::info!(database_url, "record store ready");

        Ok(Self {
            pool,
            subscribers: Arc::new(DashMap::new()),
            next_subscription: AtomicU64::new(1),
        })
    }

    fn notify(&self, event: ChangeEvent) {
        let Some(payload) = event.payload() else {
            return;
        };
        let handlers: Vec<ChangeHandler> = self
            .subscribers
            .iter()
            .filter(|s| s.collection == event.collection && s.filter.matches(payload))
            .map(|s| s.on_change.clone())
            .collect();

        tracing::debug!(collection = %event.collection, id = %event.record_id, kind = ?event.kind, subscribers = handlers.len(), "change");
        for handler in handlers {
            handler(&event);
        }
    }

    async fn payload_of(&self, collection: &str, id: &str) -> anyhow::Result<Option<Value>> {
        let row = sqlx::query("SELECT payload FROM records WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(serde_json::from_str(&row.get::<String, _>("payload"))?)),
            None => Ok(None),
        }
    }
}

fn record_from_row(row: &SqliteRow) -> anyhow::Result<Record> {
    Ok(Record {
        id: row.get("id"),
        collection: row.get("collection"),
        payload: serde_json::from_str(&row.get::<String, _>("payload"))?,
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<Option<DateTime<Utc>>, _>("updated_at"),
    })
}

/// Shallow merge of `patch` into `base`. A non-object on either side replaces.
fn merge(base: Value, patch: Value) -> Value {
    match (base, patch) {
        (Value::Object(mut base), Value::Object(patch)) => {
            base.extend(patch);
            Value::Object(base)
        }
        (_, patch) => patch,
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn create_record(&self, collection: &str, payload: Value) -> anyhow::Result<String> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now();

        sqlx::query("INSERT INTO records (collection, id, payload, created_at) VALUES (?, ?, ?, ?)")
            .bind(collection)
            .bind(&id)
            .bind(serde_json::to_string(&payload)?)
            .bind(now)
            .execute(&self.pool)
            .await?;

        self.notify(ChangeEvent {
            kind: ChangeKind::Insert,
            collection: collection.to_string(),
            record_id: id.clone(),
            new: Some(payload),
            old: None,
            at: now,
        });
        Ok(id)
    }

    /// Read-merge-write in one transaction.
    async fn update_record(&self, collection: &str, id: &str, payload: Value) -> anyhow::Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT payload FROM records WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| serde_json::from_str::<Value>(&row.get::<String, _>("payload")))
            .transpose()?;

        let merged = match &existing {
            Some(old) => {
                let merged = merge(old.clone(), payload);
                sqlx::query("UPDATE records SET payload = ?, updated_at = ? WHERE collection = ? AND id = ?")
                    .bind(serde_json::to_string(&merged)?)
                    .bind(now)
                    .bind(collection)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                merged
            }
            None => {
                sqlx::query("INSERT INTO records (collection, id, payload, created_at) VALUES (?, ?, ?, ?)")
                    .bind(collection)
                    .bind(id)
                    .bind(serde_json::to_string(&payload)?)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                payload
            }
        };

        tx.commit().await?;

        self.notify(ChangeEvent {
            kind: if existing.is_some() { ChangeKind::Update } else { ChangeKind::Insert },
            collection: collection.to_string(),
            record_id: id.to_string(),
            new: Some(merged),
            old: existing,
            at: now,
        });
        Ok(())
    }

    async fn delete_record(&self, collection: &str, id: &str) -> anyhow::Result<()> {
        let Some(old) = self.payload_of(collection, id).await? else {
            return Ok(());
        };

        sqlx::query("DELETE FROM records WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;

        self.notify(ChangeEvent {
            kind: ChangeKind::Delete,
            collection: collection.to_string(),
            record_id: id.to_string(),
            new: None,
            old: Some(old),
            at: Utc::now(),
        });
        Ok(())
    }

    async fn fetch_record(&self, collection: &str, id: &str) -> anyhow::Result<Option<Record>> {
        let row = sqlx::query("SELECT * FROM records WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn list_records(&self, collection: &str, filter: &RecordFilter) -> anyhow::Result<Vec<Record>> {
        let rows = sqlx::query("SELECT * FROM records WHERE collection = ? ORDER BY rowid ASC")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let record = record_from_row(row)?;
            if filter.matches(&record.payload) {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn subscribe(
        &self,
        collection: &str,
        filter: RecordFilter,
        on_change: ChangeHandler,
    ) -> anyhow::Result<Subscription> {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.subscribers.insert(
            id,
            Subscriber {
                collection: collection.to_string(),
                filter,
                on_change,
            },
        );

        let subscribers = self.subscribers.clone();
        Ok(Subscription::new(id, move || {
            subscribers.remove(&id);
        }))
    }
}
