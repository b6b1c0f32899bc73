//! Write-gate scenarios against mocked collaborators.

use alifa_config::GateSettings;
use alifa_core::{
    collections, Actor, Attachment, AvatarDraft, ChangeHandler, CommentDraft, FieldError, MockFileStore, MockIdentityProvider,
    MockRecordStore, PostDraft, PostFields, PreviewUrl, PrivacyPatch, PrivacySettings, ProfileDraft, Record,
    RecordFilter, RecordStore, Rejection, Subscription, Visibility,
};
use alifa_gate::WriteGate;
use alifa_guard::{ManualClock, RateLimiter};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D];
const EXE: &[u8] = &[0x4D, 0x5A, 0x90, 0x00, 0x03, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00];

fn actor() -> Actor {
    Actor {
        id: "u-1".to_string(),
        email: "awa@example.com".to_string(),
    }
}

fn signed_in() -> MockIdentityProvider {
    let mut identity = MockIdentityProvider::new();
    identity.expect_current_actor().returning(|| Some(actor()));
    identity
}

fn signed_out() -> MockIdentityProvider {
    let mut identity = MockIdentityProvider::new();
    identity.expect_current_actor().returning(|| None);
    identity
}

struct Harness {
    clock: Arc<ManualClock>,
    gate: WriteGate,
}

fn harness(identity: MockIdentityProvider, records: impl RecordStore + 'static, files: MockFileStore) -> Harness {
    let clock = Arc::new(ManualClock::starting_at(1_700_000_000_000));
    let limiter = Arc::new(RateLimiter::new(clock.clone()));
    let gate = WriteGate::new(
        Arc::new(identity),
        Arc::new(records),
        Arc::new(files),
        limiter,
        GateSettings::default(),
    );
    Harness { clock, gate }
}

fn counted_preview(counter: &Arc<AtomicUsize>) -> PreviewUrl {
    let counter = counter.clone();
    PreviewUrl::new("blob:local/preview", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

fn stored_post(author: &str) -> Record {
    Record {
        id: "p-1".to_string(),
        collection: collections::POSTS.to_string(),
        payload: json!({ "user_id": author, "content": "avant" }),
        created_at: chrono::Utc::now(),
        updated_at: None,
    }
}

// Scenario A
#[tokio::test]
async fn no_actor_is_rejected_before_anything_else() {
    let h = harness(signed_out(), MockRecordStore::new(), MockFileStore::new());
    let mut draft = CommentDraft::new("Bonjour");

    let result = h.gate.add_comment("p-1", &mut draft).await;

    assert_eq!(result, Err(Rejection::NotAuthenticated));
    assert_eq!(draft.content, "Bonjour");
    assert_eq!(h.gate.limiter().recorded("comment_u-1", 60_000), 0);
}

// Scenario B
#[tokio::test]
async fn eleventh_comment_within_a_minute_is_rate_limited() {
    let mut records = MockRecordStore::new();
    records
        .expect_create_record()
        .withf(|collection, _| collection == collections::POST_COMMENTS)
        .times(11)
        .returning(|_, _| Ok(uuid::Uuid::new_v4().to_string()));
    let h = harness(signed_in(), records, MockFileStore::new());

    for i in 0..10 {
        let mut draft = CommentDraft::new(format!("Commentaire {i}"));
        assert!(h.gate.add_comment("p-1", &mut draft).await.is_ok());
        assert!(draft.content.is_empty());
    }

    let mut draft = CommentDraft::new("Un de trop");
    assert_eq!(h.gate.add_comment("p-1", &mut draft).await, Err(Rejection::RateLimited));
    assert_eq!(draft.content, "Un de trop");

    h.clock.advance(60_000);
    assert!(h.gate.add_comment("p-1", &mut draft).await.is_ok());
}

// Scenario C
#[tokio::test]
async fn empty_post_is_rejected_on_content() {
    let h = harness(signed_in(), MockRecordStore::new(), MockFileStore::new());
    let mut draft = PostDraft::new("   ");

    let Err(Rejection::ValidationFailed(errors)) = h.gate.create_post(&mut draft).await else {
        panic!("expected a validation failure");
    };
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field, "content");
    assert_eq!(errors[0].message, "Le contenu ne peut pas être vide");
}

// Scenario D
#[tokio::test]
async fn renamed_executable_never_reaches_storage() {
    let revoked = Arc::new(AtomicUsize::new(0));
    let h = harness(signed_in(), MockRecordStore::new(), MockFileStore::new());
    let mut draft = PostDraft::new("Nouvelle table en chêne");
    draft.attach(Attachment::new("table.png", "image/png", EXE).with_preview(counted_preview(&revoked)));

    assert_eq!(h.gate.create_post(&mut draft).await, Err(Rejection::CorruptOrSpoofedFile));
    assert_eq!(draft.attachments.len(), 1);
    assert_eq!(revoked.load(Ordering::SeqCst), 0);

    draft.discard();
    assert_eq!(revoked.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn file_checks_run_type_then_size() {
    let h = harness(signed_in(), MockRecordStore::new(), MockFileStore::new());

    let mut svg = PostDraft::new("Plan");
    svg.attach(Attachment::new("plan.svg", "image/svg+xml", b"<svg/>".to_vec()));
    assert_eq!(h.gate.create_post(&mut svg).await, Err(Rejection::UnsupportedFileType));

    let mut big = PostDraft::new("Vidéo");
    let mut content = PNG.to_vec();
    content.resize(10 * 1024 * 1024 + 1, 0);
    big.attach(Attachment::new("atelier.png", "image/png", content));
    assert_eq!(h.gate.create_post(&mut big).await, Err(Rejection::FileTooLarge { max_mb: 10 }));
}

#[tokio::test]
async fn post_with_media_uploads_then_records_and_clears_draft() {
    let mut files = MockFileStore::new();
    files
        .expect_upload_file()
        .withf(|bucket, path, _| bucket == "post-media" && path.starts_with("u-1/") && path.ends_with("-my_photo_.png"))
        .times(1)
        .returning(|bucket, path, _| Ok(format!("/media/{bucket}/{path}")));
    files
        .expect_upload_file()
        .withf(|_, path, _| path.ends_with("-demo.mp4"))
        .times(1)
        .returning(|bucket, path, _| Ok(format!("/media/{bucket}/{path}")));

    let mut records = MockRecordStore::new();
    records
        .expect_create_record()
        .withf(|collection, payload| {
            collection == collections::POSTS
                && payload["user_id"] == "u-1"
                && payload["content"] == "Portes ouvertes samedi"
                && payload["location"] == "Conakry"
                && payload["event_title"] == Value::Null
                && payload["media_urls"].as_array().map(Vec::len) == Some(2)
        })
        .times(1)
        .returning(|_, _| Ok("p-9".to_string()));

    let revoked = Arc::new(AtomicUsize::new(0));
    let h = harness(signed_in(), records, files);
    let mut draft = PostDraft::new(" Portes ouvertes <script>x()</script>samedi ");
    draft.fields.location = Some("Conakry".to_string());
    draft.fields.event_title = Some("  ".to_string());
    draft.attach(Attachment::new("my photo!!.png", "image/png", PNG).with_preview(counted_preview(&revoked)));
    draft.attach(Attachment::new("demo.mp4", "video/mp4", vec![0u8; 64]));

    let accepted = h.gate.create_post(&mut draft).await.unwrap();

    assert_eq!(accepted.id, "p-9");
    assert_eq!(accepted.urls.len(), 2);
    assert!(accepted.urls[0].starts_with("/media/post-media/u-1/"));
    assert!(draft.attachments.is_empty());
    assert!(draft.fields.content.is_empty());
    assert_eq!(revoked.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_post_record_removes_uploaded_media_and_keeps_draft() {
    let mut files = MockFileStore::new();
    files
        .expect_upload_file()
        .returning(|bucket, path, _| Ok(format!("/media/{bucket}/{path}")));
    files
        .expect_remove_file()
        .withf(|bucket, path| bucket == "post-media" && path.starts_with("u-1/"))
        .times(1)
        .returning(|_, _| Ok(()));

    let mut records = MockRecordStore::new();
    records
        .expect_create_record()
        .returning(|_, _| Err(anyhow::anyhow!("connection reset")));

    let h = harness(signed_in(), records, files);
    let mut draft = PostDraft::new("Chaises sur mesure");
    draft.attach(Attachment::new("chaise.png", "image/png", PNG));

    assert_eq!(h.gate.create_post(&mut draft).await, Err(Rejection::StorageFailure));
    assert_eq!(draft.fields.content, "Chaises sur mesure");
    assert_eq!(draft.attachments.len(), 1);
}

#[tokio::test]
async fn comment_is_trimmed_and_sanitized() {
    let mut records = MockRecordStore::new();
    records
        .expect_create_record()
        .withf(|_, payload| {
            payload["content"] == "<strong>Bravo</strong> !" && payload["post_id"] == "p-1" && payload["user_id"] == "u-1"
        })
        .times(1)
        .returning(|_, _| Ok("c-1".to_string()));
    let h = harness(signed_in(), records, MockFileStore::new());

    let mut draft = CommentDraft::new("  <strong onclick=\"x()\">Bravo</strong> !<img src=x>  ");
    let accepted = h.gate.add_comment("p-1", &mut draft).await.unwrap();
    assert_eq!(accepted.id, "c-1");
    assert!(accepted.urls.is_empty());
}

#[tokio::test]
async fn over_long_comment_keeps_draft() {
    let h = harness(signed_in(), MockRecordStore::new(), MockFileStore::new());
    let mut draft = CommentDraft::new("a".repeat(501));

    let rejection = h.gate.add_comment("p-1", &mut draft).await.unwrap_err();
    assert_eq!(rejection.code(), "validation_failed");
    assert_eq!(draft.content.len(), 501);
}

#[tokio::test]
async fn markup_only_comment_is_reported_empty() {
    let mut records = MockRecordStore::new();
    records.expect_create_record().times(0);
    let h = harness(signed_in(), records, MockFileStore::new());

    let mut draft = CommentDraft::new("<script>alert(1)</script><img src=x>");
    let rejection = h.gate.add_comment("p-1", &mut draft).await.unwrap_err();
    assert_eq!(
        rejection.field_errors(),
        &[FieldError::new("content", "Le commentaire ne peut pas être vide")]
    );
    assert_eq!(draft.content, "<script>alert(1)</script><img src=x>");
}

#[tokio::test]
async fn escaped_comment_may_outgrow_the_typed_limit() {
    let mut records = MockRecordStore::new();
    records
        .expect_create_record()
        .withf(|_, payload| payload["content"] == "&lt;".repeat(500))
        .times(1)
        .returning(|_, _| Ok("c-2".to_string()));
    let h = harness(signed_in(), records, MockFileStore::new());

    let mut draft = CommentDraft::new("<".repeat(500));
    assert_eq!(h.gate.add_comment("p-1", &mut draft).await.unwrap().id, "c-2");
}

#[tokio::test]
async fn markup_only_post_is_never_stored() {
    let mut records = MockRecordStore::new();
    records.expect_create_record().times(0);
    let h = harness(signed_in(), records, MockFileStore::new());

    let mut draft = PostDraft::new("<script>x</script>");
    let rejection = h.gate.create_post(&mut draft).await.unwrap_err();
    assert_eq!(
        rejection.field_errors(),
        &[FieldError::new("content", "Le contenu ne peut pas être vide")]
    );
    assert_eq!(draft.fields.content, "<script>x</script>");
}

#[tokio::test]
async fn edit_post_writes_nulls_for_cleared_fields() {
    let mut records = MockRecordStore::new();
    records
        .expect_fetch_record()
        .returning(|_, _| Ok(Some(stored_post("u-1"))));
    records
        .expect_update_record()
        .withf(|collection, id, payload| {
            collection == collections::POSTS
                && id == "p-1"
                && payload["content"] == "après"
                && payload["location"] == Value::Null
                && payload.get("user_id").is_none()
        })
        .times(1)
        .returning(|_, _, _| Ok(()));
    let h = harness(signed_in(), records, MockFileStore::new());

    let mut fields = PostFields::new("après");
    fields.location = Some(String::new());
    let accepted = h.gate.edit_post("p-1", &mut fields).await.unwrap();

    assert_eq!(accepted.id, "p-1");
    assert!(fields.content.is_empty());
}

#[tokio::test]
async fn editing_someone_elses_post_is_a_storage_failure() {
    let mut records = MockRecordStore::new();
    records
        .expect_fetch_record()
        .returning(|_, _| Ok(Some(stored_post("u-2"))));
    let h = harness(signed_in(), records, MockFileStore::new());

    let mut fields = PostFields::new("détourné");
    assert_eq!(h.gate.edit_post("p-1", &mut fields).await, Err(Rejection::StorageFailure));
    assert_eq!(fields.content, "détourné");
}

#[tokio::test]
async fn like_is_created_when_absent() {
    let mut records = MockRecordStore::new();
    records
        .expect_list_records()
        .withf(|collection, filter| {
            collection == collections::POST_LIKES
                && *filter == RecordFilter::eq("post_id", "p-1").and_eq("user_id", "u-1")
        })
        .returning(|_, _| Ok(Vec::new()));
    records
        .expect_create_record()
        .withf(|_, payload| *payload == json!({ "post_id": "p-1", "user_id": "u-1" }))
        .times(1)
        .returning(|_, _| Ok("l-1".to_string()));
    let h = harness(signed_in(), records, MockFileStore::new());

    let toggled = h.gate.toggle_like("p-1").await.unwrap();
    assert!(toggled.liked);
    assert_eq!(toggled.accepted.id, "l-1");
}

#[tokio::test]
async fn existing_like_is_removed() {
    let mut records = MockRecordStore::new();
    records.expect_list_records().returning(|_, _| {
        Ok(vec![Record {
            id: "l-1".to_string(),
            collection: collections::POST_LIKES.to_string(),
            payload: json!({ "post_id": "p-1", "user_id": "u-1" }),
            created_at: chrono::Utc::now(),
            updated_at: None,
        }])
    });
    records
        .expect_delete_record()
        .withf(|collection, id| collection == collections::POST_LIKES && id == "l-1")
        .times(1)
        .returning(|_, _| Ok(()));
    let h = harness(signed_in(), records, MockFileStore::new());

    let toggled = h.gate.toggle_like("p-1").await.unwrap();
    assert!(!toggled.liked);
}

#[tokio::test]
async fn profile_is_upserted_under_actor_id() {
    let mut records = MockRecordStore::new();
    records
        .expect_update_record()
        .withf(|collection, id, payload| {
            collection == collections::PROFILES
                && id == "u-1"
                && payload["display_name"] == "Mamadou"
                && payload["bio"] == "Ébéniste <em>depuis 1998</em>"
                && payload["website"] == Value::Null
        })
        .times(1)
        .returning(|_, _, _| Ok(()));
    let h = harness(signed_in(), records, MockFileStore::new());

    let mut draft = ProfileDraft::new(" Mamadou ");
    draft.bio = Some("Ébéniste <em>depuis 1998</em><script>x</script>".to_string());
    draft.website = Some(String::new());
    draft.phone = Some("+224 622 12 34 56".to_string());

    assert_eq!(h.gate.update_profile(&draft).await.unwrap().id, "u-1");
}

#[tokio::test]
async fn invalid_profile_reports_every_field() {
    let h = harness(signed_in(), MockRecordStore::new(), MockFileStore::new());
    let mut draft = ProfileDraft::new("");
    draft.phone = Some("123".to_string());
    draft.website = Some("pas-une-url".to_string());

    let rejection = h.gate.update_profile(&draft).await.unwrap_err();
    let fields: Vec<&str> = rejection.field_errors().iter().map(|e| e.field.as_str()).collect();
    assert_eq!(fields, vec!["display_name", "phone", "website"]);
}

#[tokio::test]
async fn avatar_without_file_fails_validation() {
    let h = harness(signed_in(), MockRecordStore::new(), MockFileStore::new());
    let mut draft = AvatarDraft::default();

    let rejection = h.gate.upload_avatar(&mut draft).await.unwrap_err();
    assert_eq!(rejection.field_errors()[0].field, "file");
}

#[tokio::test]
async fn avatar_replaces_previous_file_and_updates_profile() {
    let mut files = MockFileStore::new();
    files
        .expect_upload_file()
        .withf(|bucket, path, bytes| bucket == "avatars" && path == "u-1/avatar.png" && bytes.len() == PNG.len())
        .times(1)
        .returning(|bucket, path, _| Ok(format!("/media/{bucket}/{path}")));
    files
        .expect_remove_file()
        .withf(|bucket, path| bucket == "avatars" && path == "u-1/avatar.jpeg")
        .times(1)
        .returning(|_, _| Err(anyhow::anyhow!("already gone")));

    let mut records = MockRecordStore::new();
    records
        .expect_update_record()
        .withf(|collection, id, payload| {
            collection == collections::PROFILES && id == "u-1" && payload["avatar_url"] == "/media/avatars/u-1/avatar.png"
        })
        .times(1)
        .returning(|_, _, _| Ok(()));

    let h = harness(signed_in(), records, files);
    let mut draft = AvatarDraft::new(
        Attachment::new("moi.png", "image/png", PNG),
        Some("/media/avatars/u-1/avatar.jpeg".to_string()),
    );

    let accepted = h.gate.upload_avatar(&mut draft).await.unwrap();
    assert_eq!(accepted.urls, vec!["/media/avatars/u-1/avatar.png".to_string()]);
    assert!(draft.file.is_none());
    assert_eq!(draft.current_url.as_deref(), Some("/media/avatars/u-1/avatar.png"));
}

#[tokio::test]
async fn previous_avatar_survives_a_failed_profile_update() {
    let mut files = MockFileStore::new();
    files
        .expect_upload_file()
        .times(1)
        .returning(|bucket, path, _| Ok(format!("/media/{bucket}/{path}")));
    files.expect_remove_file().times(0);

    let mut records = MockRecordStore::new();
    records
        .expect_update_record()
        .times(1)
        .returning(|_, _, _| Err(anyhow::anyhow!("offline")));

    let h = harness(signed_in(), records, files);
    let mut draft = AvatarDraft::new(
        Attachment::new("moi.png", "image/png", PNG),
        Some("/media/avatars/u-1/avatar.jpeg".to_string()),
    );

    assert_eq!(h.gate.upload_avatar(&mut draft).await, Err(Rejection::StorageFailure));
    assert_eq!(draft.current_url.as_deref(), Some("/media/avatars/u-1/avatar.jpeg"));
    assert!(draft.file.is_some());
}

#[tokio::test]
async fn avatar_policy_is_stricter_than_post_media() {
    let h = harness(signed_in(), MockRecordStore::new(), MockFileStore::new());

    let mut video = AvatarDraft::new(Attachment::new("moi.mp4", "video/mp4", vec![0u8; 16]), None);
    assert_eq!(h.gate.upload_avatar(&mut video).await, Err(Rejection::UnsupportedFileType));

    let mut content = PNG.to_vec();
    content.resize(5 * 1024 * 1024 + 1, 0);
    let mut big = AvatarDraft::new(Attachment::new("moi.png", "image/png", content), None);
    assert_eq!(h.gate.upload_avatar(&mut big).await, Err(Rejection::FileTooLarge { max_mb: 5 }));
    assert!(big.file.is_some());
}

#[tokio::test]
async fn privacy_settings_only_change_once_stored() {
    let mut records = MockRecordStore::new();
    records
        .expect_update_record()
        .withf(|collection, id, payload| {
            collection == collections::PRIVACY_SETTINGS
                && id == "u-1"
                && payload["profile_visibility"] == "friends"
                && payload["personalized_ads"] == true
                && payload["user_id"] == "u-1"
        })
        .times(1)
        .returning(|_, _, _| Ok(()));
    records
        .expect_update_record()
        .returning(|_, _, _| Err(anyhow::anyhow!("offline")));
    let h = harness(signed_in(), records, MockFileStore::new());

    let mut current = PrivacySettings::default();
    let patch = PrivacyPatch {
        profile_visibility: Some(Visibility::Friends),
        ..PrivacyPatch::default()
    };
    h.gate.update_privacy(&mut current, patch).await.unwrap();
    assert_eq!(current.profile_visibility, Visibility::Friends);

    let patch = PrivacyPatch {
        data_collection: Some(false),
        ..PrivacyPatch::default()
    };
    assert_eq!(h.gate.update_privacy(&mut current, patch).await, Err(Rejection::StorageFailure));
    assert!(current.data_collection);
}

/// A record store whose writes take a while.
#[derive(Default)]
struct SlowStore {
    created: AtomicUsize,
}

#[async_trait]
impl RecordStore for SlowStore {
    async fn create_record(&self, _collection: &str, _payload: Value) -> anyhow::Result<String> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(format!("c-{n}"))
    }

    async fn update_record(&self, _collection: &str, _id: &str, _payload: Value) -> anyhow::Result<()> {
        anyhow::bail!("read-only")
    }

    async fn delete_record(&self, _collection: &str, _id: &str) -> anyhow::Result<()> {
        anyhow::bail!("read-only")
    }

    async fn fetch_record(&self, _collection: &str, _id: &str) -> anyhow::Result<Option<Record>> {
        Ok(None)
    }

    async fn list_records(&self, _collection: &str, _filter: &RecordFilter) -> anyhow::Result<Vec<Record>> {
        Ok(Vec::new())
    }

    async fn subscribe(
        &self,
        _collection: &str,
        _filter: RecordFilter,
        _on_change: ChangeHandler,
    ) -> anyhow::Result<Subscription> {
        Ok(Subscription::detached(0))
    }
}

#[tokio::test]
async fn persisting_completes_after_caller_gives_up() {
    let store = Arc::new(SlowStore::default());
    let clock = Arc::new(ManualClock::starting_at(0));
    let gate = WriteGate::new(
        Arc::new(signed_in()),
        store.clone(),
        Arc::new(MockFileStore::new()),
        Arc::new(RateLimiter::new(clock)),
        GateSettings::default(),
    );

    let mut draft = CommentDraft::new("Patience");
    let gave_up = tokio::time::timeout(Duration::from_millis(5), gate.add_comment("p-1", &mut draft)).await;
    assert!(gave_up.is_err());
    assert_eq!(store.created.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(store.created.load(Ordering::SeqCst), 1);
    assert_eq!(draft.content, "Patience");
}

/// Likes kept in memory, with a slow read so concurrent toggles overlap.
#[derive(Default)]
struct LikeStore {
    likes: Mutex<Vec<Record>>,
    next: AtomicUsize,
}

impl LikeStore {
    fn count(&self) -> usize {
        self.likes.lock().unwrap().len()
    }
}

#[async_trait]
impl RecordStore for LikeStore {
    async fn create_record(&self, collection: &str, payload: Value) -> anyhow::Result<String> {
        let id = format!("l-{}", self.next.fetch_add(1, Ordering::SeqCst));
        self.likes.lock().unwrap().push(Record {
            id: id.clone(),
            collection: collection.to_string(),
            payload,
            created_at: chrono::Utc::now(),
            updated_at: None,
        });
        Ok(id)
    }

    async fn update_record(&self, _collection: &str, _id: &str, _payload: Value) -> anyhow::Result<()> {
        anyhow::bail!("likes are never updated")
    }

    async fn delete_record(&self, _collection: &str, id: &str) -> anyhow::Result<()> {
        self.likes.lock().unwrap().retain(|like| like.id != id);
        Ok(())
    }

    async fn fetch_record(&self, _collection: &str, _id: &str) -> anyhow::Result<Option<Record>> {
        Ok(None)
    }

    async fn list_records(&self, _collection: &str, _filter: &RecordFilter) -> anyhow::Result<Vec<Record>> {
        let snapshot = self.likes.lock().unwrap().clone();
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(snapshot)
    }

    async fn subscribe(
        &self,
        _collection: &str,
        _filter: RecordFilter,
        _on_change: ChangeHandler,
    ) -> anyhow::Result<Subscription> {
        Ok(Subscription::detached(0))
    }
}

#[tokio::test]
async fn double_tapped_like_cancels_out() {
    let store = Arc::new(LikeStore::default());
    let clock = Arc::new(ManualClock::starting_at(0));
    let gate = WriteGate::new(
        Arc::new(signed_in()),
        store.clone(),
        Arc::new(MockFileStore::new()),
        Arc::new(RateLimiter::new(clock)),
        GateSettings::default(),
    );

    let (first, second) = tokio::join!(gate.toggle_like("p-1"), gate.toggle_like("p-1"));
    let mut liked = vec![first.unwrap().liked, second.unwrap().liked];
    liked.sort();
    assert_eq!(liked, vec![false, true]);
    assert_eq!(store.count(), 0);

    assert!(gate.toggle_like("p-1").await.unwrap().liked);
    assert_eq!(store.count(), 1);
}
