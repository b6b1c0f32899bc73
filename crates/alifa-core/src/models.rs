//! # Domain Models
//!
//! Records as the storage collaborator hands them back, the change events it
//! pushes to subscribers, and the typed read models decoded from both.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Collection names used by the write paths and feeds.
pub mod collections {
    pub const POSTS: &str = "posts";
    pub const POST_COMMENTS: &str = "post_comments";
    pub const POST_LIKES: &str = "post_likes";
    pub const PROFILES: &str = "profiles";
    pub const PRIVACY_SETTINGS: &str = "privacy_settings";
}

/// The authenticated user attempting a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub email: String,
}

/// A stored record: an opaque JSON payload plus the columns every collection has.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub collection: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Deserializes the payload into a read model, with `id` and `created_at`
    /// taken from the record itself.
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        let mut payload = self.payload.clone();
        if let Value::Object(map) = &mut payload {
            map.insert("id".to_string(), Value::String(self.id.clone()));
            map.insert("created_at".to_string(), serde_json::to_value(self.created_at)?);
        }
        serde_json::from_value(payload)
    }
}

/// Equality conditions on top-level payload fields, all of which must hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    conditions: Vec<(String, Value)>,
}

impl RecordFilter {
    /// Matches every record of the collection.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::all().and_eq(field, value)
    }

    pub fn and_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push((field.to_string(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    pub fn matches(&self, payload: &Value) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| payload.get(field) == Some(expected))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A change notification for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub collection: String,
    pub record_id: String,
    /// Payload after the change (absent for deletes).
    pub new: Option<Value>,
    /// Payload before the change (absent for inserts).
    pub old: Option<Value>,
    /// When the change was committed.
    pub at: DateTime<Utc>,
}

impl ChangeEvent {
    /// The payload a subscription filter is matched against.
    pub fn payload(&self) -> Option<&Value> {
        self.new.as_ref().or(self.old.as_ref())
    }

    /// Deserializes the payload into a read model, the way [`Record::decode`]
    /// does. `created_at` is only filled in when the payload lacks it.
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        let mut payload = self
            .payload()
            .cloned()
            .ok_or_else(|| <serde_json::Error as serde::de::Error>::custom("change event carries no payload"))?;
        if let Value::Object(map) = &mut payload {
            map.insert("id".to_string(), Value::String(self.record_id.clone()));
            if !map.contains_key("created_at") {
                map.insert("created_at".to_string(), serde_json::to_value(self.at)?);
            }
        }
        serde_json::from_value(payload)
    }
}

/// Callback invoked for every matching change on a subscription.
pub type ChangeHandler = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Handle for a live subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(id: u64, cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle with nothing to tear down, for stores without live channels.
    pub fn detached(id: u64) -> Self {
        Self { id, cancel: None }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Terminal success of a write attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Accepted {
    /// Id of the record created or updated.
    pub id: String,
    /// Public URLs of files uploaded by this write, in attachment order.
    pub urls: Vec<String>,
}

/// A comment as shown under a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A post as shown in the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub content: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub event_title: Option<String>,
    #[serde(default)]
    pub event_description: Option<String>,
    #[serde(default)]
    pub event_date: Option<String>,
    #[serde(default)]
    pub event_time: Option<String>,
    #[serde(default)]
    pub media_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Like {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
}
