//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be plugged into the write-gate.
//! Every storage call may fail; the gate neither retries nor classifies failures.

use crate::models::{Actor, ChangeHandler, Record, RecordFilter, Subscription};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

/// Record persistence and change notification contract.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts a payload and returns the new record id.
    async fn create_record(&self, collection: &str, payload: Value) -> anyhow::Result<String>;

    /// Merges `payload` into the record's payload, inserting the record when absent.
    async fn update_record(&self, collection: &str, id: &str, payload: Value) -> anyhow::Result<()>;

    async fn delete_record(&self, collection: &str, id: &str) -> anyhow::Result<()>;

    async fn fetch_record(&self, collection: &str, id: &str) -> anyhow::Result<Option<Record>>;

    /// Records matching `filter`, oldest first.
    async fn list_records(&self, collection: &str, filter: &RecordFilter) -> anyhow::Result<Vec<Record>>;

    /// Calls `on_change` for every later change in `collection` matching `filter`,
    /// until the returned handle is dropped.
    async fn subscribe(
        &self,
        collection: &str,
        filter: RecordFilter,
        on_change: ChangeHandler,
    ) -> anyhow::Result<Subscription>;
}

/// File storage contract for uploads.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Stores `bytes` at `path` inside `bucket`, replacing any existing file,
    /// and returns its public URL.
    async fn upload_file(&self, bucket: &str, path: &str, bytes: Bytes) -> anyhow::Result<String>;

    /// Removes a file. Removing a missing file is not an error.
    async fn remove_file(&self, bucket: &str, path: &str) -> anyhow::Result<()>;
}

/// Identity contract.
#[cfg_attr(feature = "testing", mockall::automock)]
pub trait IdentityProvider: Send + Sync {
    /// The signed-in actor, if any.
    fn current_actor(&self) -> Option<Actor>;
}

/// Time source for the rate limiter, in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}
