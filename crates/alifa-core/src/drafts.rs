//! # Drafts
//!
//! Input buffers held by the presentation layer while the user composes a write.
//! The gate reads them, and clears them only once the write is stored, so a
//! rejected draft is still there for the user to fix.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A local preview URL (e.g. an object URL shown next to a picked file).
/// Revoked exactly once, when the handle is dropped.
pub struct PreviewUrl {
    url: String,
    revoke: Option<Box<dyn FnOnce(&str) + Send + Sync>>,
}

impl PreviewUrl {
    pub fn new(url: impl Into<String>, revoke: impl FnOnce(&str) + Send + Sync + 'static) -> Self {
        Self {
            url: url.into(),
            revoke: Some(Box::new(revoke)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for PreviewUrl {
    fn drop(&mut self) {
        if let Some(revoke) = self.revoke.take() {
            revoke(&self.url);
        }
    }
}

impl fmt::Debug for PreviewUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PreviewUrl").field(&self.url).finish()
    }
}

/// A file picked by the user. `content_type` is the declared type and is not trusted.
#[derive(Debug)]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    pub content: Bytes,
    preview: Option<PreviewUrl>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            content: content.into(),
            preview: None,
        }
    }

    pub fn with_preview(mut self, preview: PreviewUrl) -> Self {
        self.preview = Some(preview);
        self
    }

    pub fn preview_url(&self) -> Option<&str> {
        self.preview.as_ref().map(PreviewUrl::url)
    }

    /// Byte length of the content.
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentDraft {
    pub content: String,
}

impl CommentDraft {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into() }
    }

    pub fn clear(&mut self) {
        self.content.clear();
    }
}

/// Text fields of a post, shared by creation and editing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostFields {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<String>,
}

impl PostFields {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Default)]
pub struct PostDraft {
    pub fields: PostFields,
    pub attachments: Vec<Attachment>,
}

impl PostDraft {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            fields: PostFields::new(content),
            attachments: Vec::new(),
        }
    }

    pub fn attach(&mut self, attachment: Attachment) {
        self.attachments.push(attachment);
    }

    /// Empties the draft, revoking every preview URL.
    pub fn clear(&mut self) {
        self.fields.clear();
        self.attachments.clear();
    }

    /// Abandons the draft. Nothing is stored; preview URLs are revoked.
    pub fn discard(self) {}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileDraft {
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profession: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl ProfileDraft {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct AvatarDraft {
    pub file: Option<Attachment>,
    /// Public URL of the avatar being replaced, if any.
    pub current_url: Option<String>,
}

impl AvatarDraft {
    pub fn new(file: Attachment, current_url: Option<String>) -> Self {
        Self {
            file: Some(file),
            current_url,
        }
    }

    pub fn clear(&mut self) {
        self.file = None;
    }

    /// Abandons the draft, revoking the preview of the picked file.
    pub fn discard(self) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
    Friends,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacySettings {
    pub profile_visibility: Visibility,
    pub activity_status: bool,
    pub data_collection: bool,
    pub personalized_ads: bool,
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self {
            profile_visibility: Visibility::Public,
            activity_status: true,
            data_collection: true,
            personalized_ads: true,
        }
    }
}

/// A partial change to privacy settings; unset fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyPatch {
    #[serde(default)]
    pub profile_visibility: Option<Visibility>,
    #[serde(default)]
    pub activity_status: Option<bool>,
    #[serde(default)]
    pub data_collection: Option<bool>,
    #[serde(default)]
    pub personalized_ads: Option<bool>,
}

impl PrivacyPatch {
    pub fn apply(&self, current: &PrivacySettings) -> PrivacySettings {
        PrivacySettings {
            profile_visibility: self.profile_visibility.unwrap_or(current.profile_visibility),
            activity_status: self.activity_status.unwrap_or(current.activity_status),
            data_collection: self.data_collection.unwrap_or(current.data_collection),
            personalized_ads: self.personalized_ads.unwrap_or(current.personalized_ads),
        }
    }
}
