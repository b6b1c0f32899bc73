//! Commands read from stdin and the replies written for them.

use alifa_auth_simple::LocalAuthProvider;
use alifa_core::{
    collections, Accepted, Attachment, AvatarDraft, CommentDraft, FieldError, IdentityProvider, PostDraft,
    PostFields, PrivacyPatch, ProfileDraft, RecordStore, Rejection,
};
use alifa_gate::{load_privacy_settings, CommentFeed, PostFeed, WriteGate};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    SignUp {
        email: String,
        password: String,
        display_name: String,
    },
    SignIn {
        email: String,
        password: String,
    },
    SignOut,
    Comment {
        post_id: String,
        content: String,
    },
    Post {
        #[serde(flatten)]
        fields: PostFields,
        #[serde(default)]
        files: Vec<PathBuf>,
    },
    EditPost {
        post_id: String,
        #[serde(flatten)]
        fields: PostFields,
    },
    Like {
        post_id: String,
    },
    Profile {
        #[serde(flatten)]
        profile: ProfileDraft,
    },
    Avatar {
        file: PathBuf,
    },
    Privacy {
        #[serde(flatten)]
        patch: PrivacyPatch,
    },
    Comments {
        post_id: String,
    },
    Posts,
}

#[derive(Serialize)]
struct RejectionReport<'a> {
    ok: bool,
    code: &'static str,
    message: String,
    fields: &'a [FieldError],
    recoverable: bool,
}

pub fn failure(code: &str, message: impl Into<String>) -> Value {
    json!({ "ok": false, "code": code, "message": message.into() })
}

fn rejected(rejection: &Rejection) -> Value {
    let report = RejectionReport {
        ok: false,
        code: rejection.code(),
        message: rejection.to_string(),
        fields: rejection.field_errors(),
        recoverable: rejection.is_recoverable(),
    };
    serde_json::to_value(report).unwrap_or_else(|e| failure("internal", e.to_string()))
}

fn accepted(accepted: &Accepted) -> Value {
    json!({ "ok": true, "id": accepted.id, "urls": accepted.urls })
}

fn reply(result: Result<Accepted, Rejection>) -> Value {
    match result {
        Ok(a) => accepted(&a),
        Err(r) => rejected(&r),
    }
}

/// Reads a file from disk into an attachment, declaring the type its
/// extension suggests.
async fn read_attachment(path: &Path) -> anyhow::Result<Attachment> {
    let content = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let content_type = mime_guess::from_path(path).first_or_octet_stream();
    Ok(Attachment::new(name, content_type.essence_str(), content))
}

pub struct Session {
    gate: WriteGate,
    auth: Arc<LocalAuthProvider>,
    records: Arc<dyn RecordStore>,
}

impl Session {
    pub fn new(gate: WriteGate, auth: Arc<LocalAuthProvider>, records: Arc<dyn RecordStore>) -> Self {
        Self { gate, auth, records }
    }

    pub async fn handle(&self, command: Command) -> Value {
        match command {
            Command::SignUp {
                email,
                password,
                display_name,
            } => match self.auth.sign_up(&email, &password, &display_name) {
                Ok(actor) => {
                    // The account starts with a profile carrying its display name.
                    let profile = ProfileDraft::new(display_name);
                    if let Err(rejection) = self.gate.update_profile(&profile).await {
                        tracing::warn!(user_id = %actor.id, code = rejection.code(), "initial profile not stored");
                    }
                    json!({ "ok": true, "id": actor.id, "email": actor.email })
                }
                Err(e) => failure("auth_failed", e.to_string()),
            },
            Command::SignIn { email, password } => match self.auth.sign_in(&email, &password) {
                Ok(actor) => json!({ "ok": true, "id": actor.id, "email": actor.email }),
                Err(e) => failure("auth_failed", e.to_string()),
            },
            Command::SignOut => {
                self.auth.sign_out();
                json!({ "ok": true })
            }
            Command::Comment { post_id, content } => {
                let mut draft = CommentDraft::new(content);
                reply(self.gate.add_comment(&post_id, &mut draft).await)
            }
            Command::Post { fields, files } => {
                let mut draft = PostDraft {
                    fields,
                    attachments: Vec::with_capacity(files.len()),
                };
                for path in &files {
                    match read_attachment(path).await {
                        Ok(file) => draft.attach(file),
                        Err(e) => return failure("unreadable_file", format!("{}: {e}", path.display())),
                    }
                }
                reply(self.gate.create_post(&mut draft).await)
            }
            Command::EditPost { post_id, mut fields } => reply(self.gate.edit_post(&post_id, &mut fields).await),
            Command::Like { post_id } => match self.gate.toggle_like(&post_id).await {
                Ok(toggled) => json!({ "ok": true, "id": toggled.accepted.id, "liked": toggled.liked }),
                Err(r) => rejected(&r),
            },
            Command::Profile { profile } => reply(self.gate.update_profile(&profile).await),
            Command::Avatar { file } => {
                let file = match read_attachment(&file).await {
                    Ok(file) => file,
                    Err(e) => return failure("unreadable_file", e.to_string()),
                };
                let current_url = self.current_avatar_url().await;
                let mut draft = AvatarDraft::new(file, current_url);
                reply(self.gate.upload_avatar(&mut draft).await)
            }
            Command::Privacy { patch } => {
                let Some(actor) = self.auth.current_actor() else {
                    return rejected(&Rejection::NotAuthenticated);
                };
                let mut current = match load_privacy_settings(self.records.as_ref(), &actor.id).await {
                    Ok(settings) => settings,
                    Err(e) => {
                        tracing::error!(error = ?e, "could not load privacy settings");
                        return rejected(&Rejection::StorageFailure);
                    }
                };
                match self.gate.update_privacy(&mut current, patch).await {
                    Ok(a) => json!({ "ok": true, "id": a.id, "settings": current }),
                    Err(r) => rejected(&r),
                }
            }
            Command::Comments { post_id } => match CommentFeed::open(self.records.as_ref(), &post_id).await {
                Ok(feed) => json!({ "ok": true, "comments": feed.comments() }),
                Err(e) => failure("storage_failure", e.to_string()),
            },
            Command::Posts => {
                let posts = match PostFeed::open(self.records.clone()).await {
                    Ok(feed) => feed.posts().await,
                    Err(e) => Err(e),
                };
                match posts {
                    Ok(posts) => json!({ "ok": true, "posts": posts }),
                    Err(e) => failure("storage_failure", e.to_string()),
                }
            }
        }
    }

    async fn current_avatar_url(&self) -> Option<String> {
        let actor = self.auth.current_actor()?;
        let profile = self
            .records
            .fetch_record(collections::PROFILES, &actor.id)
            .await
            .ok()
            .flatten()?;
        profile.payload.get("avatar_url")?.as_str().map(str::to_string)
    }
}
