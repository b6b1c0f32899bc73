//! # Feeds
//!
//! Local views kept in step with the store's change notifications. Each feed
//! owns its subscription; dropping the feed unsubscribes.

use alifa_core::{
    collections, ChangeEvent, ChangeHandler, ChangeKind, Comment, Like, Post, PrivacySettings, Record, RecordFilter,
    RecordStore, Subscription,
};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

fn decode_records<T: DeserializeOwned>(records: &[Record]) -> Vec<T> {
    records
        .iter()
        .filter_map(|record| match record.decode() {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(collection = %record.collection, id = %record.id, error = %e, "skipping undecodable record");
                None
            }
        })
        .collect()
}

fn decode_event<T: DeserializeOwned>(event: &ChangeEvent) -> Option<T> {
    event
        .decode()
        .map_err(|e| {
            tracing::warn!(collection = %event.collection, id = %event.record_id, error = %e, "skipping undecodable change");
        })
        .ok()
}

/// Comments under one post, oldest first. New comments are appended as the
/// store reports them.
pub struct CommentFeed {
    comments: Arc<RwLock<Vec<Comment>>>,
    _subscription: Subscription,
}

impl CommentFeed {
    /// Subscribes before listing, so a comment written in between is not
    /// missed. Whatever arrived early is kept after the listed comments.
    pub async fn open(store: &dyn RecordStore, post_id: &str) -> anyhow::Result<Self> {
        let filter = RecordFilter::eq("post_id", post_id);
        let comments = Arc::new(RwLock::new(Vec::<Comment>::new()));

        let sink = comments.clone();
        let on_change: ChangeHandler = Arc::new(move |event: &ChangeEvent| {
            if event.kind != ChangeKind::Insert {
                return;
            }
            let Some(comment) = decode_event::<Comment>(event) else {
                return;
            };
            let mut comments = sink.write().unwrap_or_else(PoisonError::into_inner);
            if !comments.iter().any(|c| c.id == comment.id) {
                comments.push(comment);
            }
        });
        let subscription = store
            .subscribe(collections::POST_COMMENTS, filter.clone(), on_change)
            .await?;

        let mut listed = decode_records::<Comment>(&store.list_records(collections::POST_COMMENTS, &filter).await?);
        {
            let mut comments = comments.write().unwrap_or_else(PoisonError::into_inner);
            let early: Vec<Comment> = std::mem::take(&mut *comments)
                .into_iter()
                .filter(|c| !listed.iter().any(|l| l.id == c.id))
                .collect();
            listed.extend(early);
            *comments = listed;
        }

        Ok(Self {
            comments,
            _subscription: subscription,
        })
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.comments.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.comments.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Likes by id, each mapped to the user who left it.
#[derive(Default)]
struct LikeBook {
    likes: HashMap<String, String>,
    /// Likes deleted before the initial listing came back.
    removed: HashSet<String>,
    loaded: bool,
}

struct LikeState {
    book: Mutex<LikeBook>,
    viewer: Option<String>,
}

impl LikeState {
    fn book(&self) -> MutexGuard<'_, LikeBook> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, event: &ChangeEvent) {
        match event.kind {
            ChangeKind::Insert => {
                let Some(like) = decode_event::<Like>(event) else {
                    return;
                };
                let mut book = self.book();
                if !book.removed.contains(&like.id) {
                    book.likes.insert(like.id, like.user_id);
                }
            }
            ChangeKind::Delete => {
                let mut book = self.book();
                book.likes.remove(&event.record_id);
                if !book.loaded {
                    book.removed.insert(event.record_id.clone());
                }
            }
            ChangeKind::Update => {}
        }
    }

    fn load(&self, listed: Vec<Like>) {
        let mut book = self.book();
        for like in listed {
            if !book.removed.contains(&like.id) {
                book.likes.insert(like.id, like.user_id);
            }
        }
        book.removed.clear();
        book.loaded = true;
    }
}

/// Like count of one post and whether the viewer likes it.
pub struct LikeTracker {
    state: Arc<LikeState>,
    _subscription: Subscription,
}

impl LikeTracker {
    /// Subscribes before listing. Likes are keyed by id, so one reported both
    /// ways is counted once.
    pub async fn open(store: &dyn RecordStore, post_id: &str, viewer: Option<&str>) -> anyhow::Result<Self> {
        let filter = RecordFilter::eq("post_id", post_id);
        let state = Arc::new(LikeState {
            book: Mutex::new(LikeBook::default()),
            viewer: viewer.map(str::to_string),
        });

        let sink = state.clone();
        let on_change: ChangeHandler = Arc::new(move |event: &ChangeEvent| sink.apply(event));
        let subscription = store
            .subscribe(collections::POST_LIKES, filter.clone(), on_change)
            .await?;

        state.load(decode_records::<Like>(&store.list_records(collections::POST_LIKES, &filter).await?));

        Ok(Self {
            state,
            _subscription: subscription,
        })
    }

    pub fn count(&self) -> u64 {
        self.state.book().likes.len() as u64
    }

    pub fn liked(&self) -> bool {
        let Some(viewer) = self.state.viewer.as_deref() else {
            return false;
        };
        self.state.book().likes.values().any(|user| user == viewer)
    }
}

/// All posts, newest first. Any change to the collection marks the feed
/// stale; the next read refetches.
pub struct PostFeed {
    store: Arc<dyn RecordStore>,
    posts: tokio::sync::Mutex<Vec<Post>>,
    stale: Arc<AtomicBool>,
    _subscription: Subscription,
}

impl PostFeed {
    pub async fn open(store: Arc<dyn RecordStore>) -> anyhow::Result<Self> {
        let stale = Arc::new(AtomicBool::new(true));
        let flag = stale.clone();
        let on_change: ChangeHandler = Arc::new(move |_: &ChangeEvent| flag.store(true, Ordering::SeqCst));
        let subscription = store
            .subscribe(collections::POSTS, RecordFilter::all(), on_change)
            .await?;

        Ok(Self {
            store,
            posts: tokio::sync::Mutex::new(Vec::new()),
            stale,
            _subscription: subscription,
        })
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    pub async fn posts(&self) -> anyhow::Result<Vec<Post>> {
        let mut posts = self.posts.lock().await;
        if self.stale.swap(false, Ordering::SeqCst) {
            match self.store.list_records(collections::POSTS, &RecordFilter::all()).await {
                Ok(records) => {
                    let mut fresh = decode_records::<Post>(&records);
                    fresh.reverse();
                    *posts = fresh;
                    tracing::debug!(count = posts.len(), "post feed refreshed");
                }
                Err(e) => {
                    self.stale.store(true, Ordering::SeqCst);
                    return Err(e);
                }
            }
        }
        Ok(posts.clone())
    }
}

/// The actor's stored privacy settings, or the defaults if none are stored.
pub async fn load_privacy_settings(store: &dyn RecordStore, user_id: &str) -> anyhow::Result<PrivacySettings> {
    match store.fetch_record(collections::PRIVACY_SETTINGS, user_id).await? {
        Some(record) => Ok(serde_json::from_value(record.payload)?),
        None => Ok(PrivacySettings::default()),
    }
}
