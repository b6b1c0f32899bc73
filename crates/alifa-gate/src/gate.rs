//! # Write Gate
//!
//! Orchestrates every user-generated write. Each public operation runs the
//! same short-circuiting sequence and ends in `Accepted` or a [`Rejection`].
//!
//! # Developer Note
//! Drafts are borrowed mutably but only cleared after the store reports
//! success. A rejected draft is left untouched so the user can fix it.
//! Storage work runs on its own task: once `Persisting` is entered it runs to
//! completion even if the caller stops waiting.

use crate::state::{Action, Attempt, GateState};
use alifa_config::{GateSettings, UploadPolicy};
use alifa_core::{
    collections, Accepted, Actor, Attachment, AvatarDraft, CommentDraft, FieldError, FileStore, GateResult,
    IdentityProvider, PostDraft, PostFields, PrivacyPatch, PrivacySettings, ProfileDraft, RecordFilter,
    RecordStore, Rejection,
};
use alifa_guard::{
    sanitize_content, sanitize_filename, validate_file_signature, validate_file_size, validate_file_type,
    validate_serialized, ParsedRecord, RateLimitKey, RateLimiter, SchemaName,
};
use anyhow::Context;
use bytes::Bytes;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const POST_OPTIONAL_FIELDS: &[&str] = &["location", "event_title", "event_description", "event_date", "event_time"];
const NO_AVATAR_FILE: &str = "Veuillez sélectionner une image";

/// Outcome of a like toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LikeToggled {
    pub accepted: Accepted,
    /// Whether the actor likes the post after the toggle.
    pub liked: bool,
}

pub struct WriteGate {
    identity: Arc<dyn IdentityProvider>,
    records: Arc<dyn RecordStore>,
    files: Arc<dyn FileStore>,
    limiter: Arc<RateLimiter>,
    settings: GateSettings,
    /// One lock per post and actor, held across a like toggle's read and write.
    like_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl WriteGate {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        records: Arc<dyn RecordStore>,
        files: Arc<dyn FileStore>,
        limiter: Arc<RateLimiter>,
        settings: GateSettings,
    ) -> Self {
        Self {
            identity,
            records,
            files,
            limiter,
            settings,
            like_locks: Arc::new(DashMap::new()),
        }
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Publishes a post, uploading its attachments first.
    pub async fn create_post(&self, draft: &mut PostDraft) -> GateResult<Accepted> {
        let mut attempt = Attempt::start(Action::Post);
        let result = self.create_post_steps(&mut attempt, draft).await;
        if result.is_ok() {
            draft.clear();
        }
        attempt.finish(result)
    }

    async fn create_post_steps(&self, attempt: &mut Attempt, draft: &PostDraft) -> GateResult<Accepted> {
        // 1. Identity and rate budget
        let actor = self.admit(attempt)?;

        // 2. Structure
        let parsed = validate(attempt, SchemaName::Post, &normalize_post(&draft.fields))?;

        // 3. Sanitize text, derive storage paths from sanitized names
        attempt.enter(GateState::Sanitizing);
        let mut payload = post_payload(&parsed)?;
        payload.insert("user_id".to_string(), Value::String(actor.id.clone()));
        let uploads: Vec<(String, Bytes)> = draft
            .attachments
            .iter()
            .map(|file| {
                let path = format!("{}/{}-{}", actor.id, Uuid::new_v4(), sanitize_filename(&file.name));
                (path, file.content.clone())
            })
            .collect();

        // 4. Attachments
        if !draft.attachments.is_empty() {
            check_files(attempt, &draft.attachments, &self.settings.post_media).await?;
        }

        // 5. Store
        let records = self.records.clone();
        let files = self.files.clone();
        let bucket = self.settings.buckets.post_media.clone();
        persist(attempt, async move {
            let mut urls = Vec::with_capacity(uploads.len());
            let mut stored = Vec::with_capacity(uploads.len());
            for (path, bytes) in uploads {
                match files.upload_file(&bucket, &path, bytes).await {
                    Ok(url) => {
                        urls.push(url);
                        stored.push(path);
                    }
                    Err(e) => {
                        remove_quietly(files.as_ref(), &bucket, &stored).await;
                        return Err(e.context(format!("uploading {path}")));
                    }
                }
            }

            payload.insert("media_urls".to_string(), json!(urls));
            match records.create_record(collections::POSTS, Value::Object(payload)).await {
                Ok(id) => Ok(Accepted { id, urls }),
                Err(e) => {
                    remove_quietly(files.as_ref(), &bucket, &stored).await;
                    Err(e.context("creating post"))
                }
            }
        })
        .await
    }

    /// Rewrites the text of one of the actor's posts. Cleared optional fields
    /// are stored as `null`.
    pub async fn edit_post(&self, post_id: &str, fields: &mut PostFields) -> GateResult<Accepted> {
        let mut attempt = Attempt::start(Action::PostEdit);
        let result = self.edit_post_steps(&mut attempt, post_id, fields).await;
        if result.is_ok() {
            fields.clear();
        }
        attempt.finish(result)
    }

    async fn edit_post_steps(&self, attempt: &mut Attempt, post_id: &str, fields: &PostFields) -> GateResult<Accepted> {
        let actor = self.admit(attempt)?;
        let parsed = validate(attempt, SchemaName::Post, &normalize_post(fields))?;

        attempt.enter(GateState::Sanitizing);
        let payload = post_payload(&parsed)?;

        let records = self.records.clone();
        let post_id = post_id.to_string();
        persist(attempt, async move {
            let existing = records
                .fetch_record(collections::POSTS, &post_id)
                .await?
                .with_context(|| format!("post {post_id} not found"))?;
            if existing.payload.get("user_id").and_then(Value::as_str) != Some(actor.id.as_str()) {
                anyhow::bail!("post {post_id} belongs to another user");
            }
            records.update_record(collections::POSTS, &post_id, Value::Object(payload)).await?;
            Ok(Accepted {
                id: post_id,
                urls: Vec::new(),
            })
        })
        .await
    }

    /// Adds a comment under a post.
    pub async fn add_comment(&self, post_id: &str, draft: &mut CommentDraft) -> GateResult<Accepted> {
        let mut attempt = Attempt::start(Action::Comment);
        let result = self.add_comment_steps(&mut attempt, post_id, draft).await;
        if result.is_ok() {
            draft.clear();
        }
        attempt.finish(result)
    }

    async fn add_comment_steps(&self, attempt: &mut Attempt, post_id: &str, draft: &CommentDraft) -> GateResult<Accepted> {
        let actor = self.admit(attempt)?;
        let parsed = validate(attempt, SchemaName::Comment, &json!({ "content": draft.content.trim() }))?;

        attempt.enter(GateState::Sanitizing);
        let content = sanitized_required(SchemaName::Comment, "content", text(&parsed, "content"))?;

        let records = self.records.clone();
        let payload = json!({ "post_id": post_id, "user_id": actor.id, "content": content });
        persist(attempt, async move {
            let id = records.create_record(collections::POST_COMMENTS, payload).await?;
            Ok(Accepted { id, urls: Vec::new() })
        })
        .await
    }

    /// Likes the post, or removes the actor's like if there is one.
    pub async fn toggle_like(&self, post_id: &str) -> GateResult<LikeToggled> {
        let mut attempt = Attempt::start(Action::Like);
        let result = self.toggle_like_steps(&mut attempt, post_id).await;
        attempt.finish(result)
    }

    async fn toggle_like_steps(&self, attempt: &mut Attempt, post_id: &str) -> GateResult<LikeToggled> {
        let actor = self.admit(attempt)?;

        let lock_key = format!("{post_id}_{}", actor.id);
        let lock = self.like_locks.entry(lock_key.clone()).or_default().clone();
        let locks = self.like_locks.clone();

        let records = self.records.clone();
        let post_id = post_id.to_string();
        let result = persist(attempt, async move {
            let _held = lock.lock().await;
            let mine = RecordFilter::eq("post_id", post_id.as_str()).and_eq("user_id", actor.id.as_str());
            let existing = records.list_records(collections::POST_LIKES, &mine).await?;

            if let Some(first) = existing.first() {
                for like in &existing {
                    records.delete_record(collections::POST_LIKES, &like.id).await?;
                }
                return Ok(LikeToggled {
                    accepted: Accepted {
                        id: first.id.clone(),
                        urls: Vec::new(),
                    },
                    liked: false,
                });
            }

            let id = records
                .create_record(collections::POST_LIKES, json!({ "post_id": post_id, "user_id": actor.id }))
                .await?;
            Ok(LikeToggled {
                accepted: Accepted { id, urls: Vec::new() },
                liked: true,
            })
        })
        .await;

        locks.remove_if(&lock_key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Saves the actor's profile. The draft already mirrors what was stored,
    /// so it is left as is.
    pub async fn update_profile(&self, draft: &ProfileDraft) -> GateResult<Accepted> {
        let mut attempt = Attempt::start(Action::Profile);
        let result = self.update_profile_steps(&mut attempt, draft).await;
        attempt.finish(result)
    }

    async fn update_profile_steps(&self, attempt: &mut Attempt, draft: &ProfileDraft) -> GateResult<Accepted> {
        let actor = self.admit(attempt)?;
        let normalized = ProfileDraft {
            display_name: draft.display_name.trim().to_string(),
            bio: trimmed(&draft.bio),
            location: trimmed(&draft.location),
            profession: trimmed(&draft.profession),
            phone: trimmed(&draft.phone),
            website: trimmed(&draft.website),
        };
        let parsed = validate(attempt, SchemaName::Profile, &normalized)?;

        attempt.enter(GateState::Sanitizing);
        let mut payload = Map::new();
        payload.insert("user_id".to_string(), Value::String(actor.id.clone()));
        for field in ["display_name", "location", "profession", "phone", "website"] {
            payload.insert(field.to_string(), parsed.get(field).cloned().unwrap_or(Value::Null));
        }
        let bio = parsed
            .get("bio")
            .and_then(Value::as_str)
            .map(sanitize_content)
            .filter(|bio| !bio.trim().is_empty());
        payload.insert("bio".to_string(), json!(bio));

        let records = self.records.clone();
        persist(attempt, async move {
            records
                .update_record(collections::PROFILES, &actor.id, Value::Object(payload))
                .await?;
            Ok(Accepted {
                id: actor.id,
                urls: Vec::new(),
            })
        })
        .await
    }

    /// Replaces the actor's avatar and points the profile at the new file.
    pub async fn upload_avatar(&self, draft: &mut AvatarDraft) -> GateResult<Accepted> {
        let mut attempt = Attempt::start(Action::Avatar);
        let result = self.upload_avatar_steps(&mut attempt, draft).await;
        if let Ok(accepted) = &result {
            draft.current_url = accepted.urls.first().cloned();
            draft.clear();
        }
        attempt.finish(result)
    }

    async fn upload_avatar_steps(&self, attempt: &mut Attempt, draft: &AvatarDraft) -> GateResult<Accepted> {
        let actor = self.admit(attempt)?;

        attempt.enter(GateState::Validating);
        let Some(file) = draft.file.as_ref() else {
            return Err(Rejection::ValidationFailed(vec![FieldError::new("file", NO_AVATAR_FILE)]));
        };

        check_files(attempt, std::slice::from_ref(file), &self.settings.avatar).await?;

        let bucket = self.settings.buckets.avatars.clone();
        let subtype = file.content_type.split_once('/').map(|(_, s)| s).unwrap_or("img");
        let path = format!("{}/avatar.{subtype}", actor.id);
        let previous = draft
            .current_url
            .as_deref()
            .and_then(|url| stored_path(url, &bucket))
            .filter(|old| *old != path);
        let bytes = file.content.clone();

        let records = self.records.clone();
        let files = self.files.clone();
        persist(attempt, async move {
            let url = files.upload_file(&bucket, &path, bytes).await?;
            records
                .update_record(
                    collections::PROFILES,
                    &actor.id,
                    json!({ "user_id": actor.id, "avatar_url": url }),
                )
                .await?;
            // The old file goes only once the profile no longer points at it.
            if let Some(old) = previous {
                remove_quietly(files.as_ref(), &bucket, &[old]).await;
            }
            Ok(Accepted {
                id: actor.id,
                urls: vec![url],
            })
        })
        .await
    }

    /// Merges `patch` into `current` and stores the result. `current` is only
    /// updated once the store accepts it.
    pub async fn update_privacy(&self, current: &mut PrivacySettings, patch: PrivacyPatch) -> GateResult<Accepted> {
        let mut attempt = Attempt::start(Action::Privacy);
        let merged = patch.apply(current);
        let result = self.update_privacy_steps(&mut attempt, &merged).await;
        if result.is_ok() {
            *current = merged;
        }
        attempt.finish(result)
    }

    async fn update_privacy_steps(&self, attempt: &mut Attempt, merged: &PrivacySettings) -> GateResult<Accepted> {
        let actor = self.admit(attempt)?;
        let mut payload = validate(attempt, SchemaName::PrivacySettings, merged)?;
        payload.insert("user_id".to_string(), Value::String(actor.id.clone()));

        let records = self.records.clone();
        persist(attempt, async move {
            records
                .update_record(collections::PRIVACY_SETTINGS, &actor.id, Value::Object(payload))
                .await?;
            Ok(Accepted {
                id: actor.id,
                urls: Vec::new(),
            })
        })
        .await
    }

    /// Identity, then rate budget.
    fn admit(&self, attempt: &mut Attempt) -> GateResult<Actor> {
        attempt.enter(GateState::Authenticating);
        let actor = self.identity.current_actor().ok_or(Rejection::NotAuthenticated)?;

        attempt.enter(GateState::RateChecking);
        let action = attempt.action();
        let rule = action.rule(&self.settings.rate_limits);
        let key = RateLimitKey::new(action.as_str(), &actor.id);
        if !self.limiter.is_allowed(key.as_str(), rule.max_attempts, rule.window_ms) {
            return Err(Rejection::RateLimited);
        }
        Ok(actor)
    }
}

fn validate<T: Serialize>(attempt: &mut Attempt, schema: SchemaName, input: &T) -> GateResult<ParsedRecord> {
    attempt.enter(GateState::Validating);
    validate_serialized(schema, input).map_err(Rejection::ValidationFailed)
}

/// Type for every file, then size for every file, then signatures.
async fn check_files(attempt: &mut Attempt, files: &[Attachment], policy: &UploadPolicy) -> GateResult<()> {
    attempt.enter(GateState::FileChecking);

    if files.iter().any(|f| !validate_file_type(f, &policy.allowed_types)) {
        return Err(Rejection::UnsupportedFileType);
    }
    if files.iter().any(|f| !validate_file_size(f, policy.max_mb)) {
        return Err(Rejection::FileTooLarge { max_mb: policy.max_mb });
    }
    for file in files {
        if policy.is_unverified(&file.content_type) {
            tracing::warn!(name = %file.name, content_type = %file.content_type, "accepted without signature check");
            continue;
        }
        if !validate_file_signature(file).await {
            return Err(Rejection::CorruptOrSpoofedFile);
        }
    }
    Ok(())
}

/// Runs storage work on its own task and waits for it.
async fn persist<T, F>(attempt: &mut Attempt, work: F) -> GateResult<T>
where
    T: Send + 'static,
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    attempt.enter(GateState::Persisting);
    match tokio::spawn(work).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            tracing::error!(action = %attempt.action(), error = ?e, "storage collaborator failed");
            Err(Rejection::StorageFailure)
        }
        Err(e) => {
            tracing::error!(action = %attempt.action(), error = %e, "storage task did not complete");
            Err(Rejection::StorageFailure)
        }
    }
}

async fn remove_quietly(files: &dyn FileStore, bucket: &str, paths: &[String]) {
    for path in paths {
        if let Err(e) = files.remove_file(bucket, path).await {
            tracing::warn!(bucket, path = %path, error = ?e, "could not remove file");
        }
    }
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn normalize_post(fields: &PostFields) -> PostFields {
    PostFields {
        content: fields.content.trim().to_string(),
        location: trimmed(&fields.location),
        event_title: trimmed(&fields.event_title),
        event_description: trimmed(&fields.event_description),
        event_date: trimmed(&fields.event_date),
        event_time: trimmed(&fields.event_time),
    }
}

fn text<'a>(parsed: &'a ParsedRecord, field: &str) -> &'a str {
    parsed.get(field).and_then(Value::as_str).unwrap_or_default()
}

/// Sanitizes a required text field. Markup-only input leaves nothing to
/// store and is reported like an empty field.
fn sanitized_required(schema: SchemaName, field: &str, raw: &str) -> GateResult<String> {
    let clean = sanitize_content(raw);
    if clean.trim().is_empty() {
        return Err(Rejection::ValidationFailed(vec![FieldError::new(
            field,
            schema.required_message(field),
        )]));
    }
    Ok(clean)
}

/// Stored post columns from validated fields. Absent optionals become `null`.
fn post_payload(parsed: &ParsedRecord) -> GateResult<Map<String, Value>> {
    let mut payload = Map::new();
    let content = sanitized_required(SchemaName::Post, "content", text(parsed, "content"))?;
    payload.insert("content".to_string(), Value::String(content));
    for field in POST_OPTIONAL_FIELDS {
        payload.insert(field.to_string(), parsed.get(*field).cloned().unwrap_or(Value::Null));
    }
    Ok(payload)
}

/// Path of a stored file inside `bucket`, recovered from its public URL.
fn stored_path(url: &str, bucket: &str) -> Option<String> {
    let marker = format!("/{bucket}/");
    let (_, rest) = url.split_once(&marker)?;
    let path = rest.split(['?', '#']).next().unwrap_or_default();
    (!path.is_empty()).then(|| path.to_string())
}
