//! # alifa-config
//!
//! Layered settings for the write-gate and its plugins.
//!
//! Sources, lowest precedence first:
//! 1. compiled defaults ([`Settings::default`])
//! 2. `alifa.toml` in the working directory, or the file named by `ALIFA_CONFIG`
//! 3. `ALIFA__*` environment variables, `__` between path segments
//!    (e.g. `ALIFA__GATE__RATE_LIMITS__COMMENT__MAX_ATTEMPTS=20`)
//!
//! A `.env` file is loaded into the environment first if present.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_CONFIG_FILE: &str = "alifa.toml";
const CONFIG_FILE_VAR: &str = "ALIFA_CONFIG";
const ENV_PREFIX: &str = "ALIFA";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("could not load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid settings: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log: LogSettings,
    pub storage: StorageSettings,
    pub gate: GateSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Where the bundled plugins keep their data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub database_url: String,
    /// Root directory of the local file store.
    pub media_root: PathBuf,
    /// Prefix of the public URLs handed out for stored files.
    pub public_url_prefix: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://alifa.db?mode=rwc".to_string(),
            media_root: PathBuf::from("./media"),
            public_url_prefix: "/media".to_string(),
        }
    }
}

/// Budget of one rate-limited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateRule {
    pub max_attempts: u32,
    pub window_ms: i64,
}

impl RateRule {
    pub const fn new(max_attempts: u32, window_ms: i64) -> Self {
        Self { max_attempts, window_ms }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    pub comment: RateRule,
    pub post: RateRule,
    pub post_edit: RateRule,
    pub like: RateRule,
    pub profile: RateRule,
    pub avatar: RateRule,
    pub privacy: RateRule,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            comment: RateRule::new(10, 60_000),
            post: RateRule::new(5, 60_000),
            post_edit: RateRule::new(10, 60_000),
            like: RateRule::new(30, 60_000),
            profile: RateRule::new(10, 60_000),
            avatar: RateRule::new(3, 60_000),
            privacy: RateRule::new(10, 60_000),
        }
    }
}

impl RateLimits {
    fn named(&self) -> [(&'static str, RateRule); 7] {
        [
            ("comment", self.comment),
            ("post", self.post),
            ("post_edit", self.post_edit),
            ("like", self.like),
            ("profile", self.profile),
            ("avatar", self.avatar),
            ("privacy", self.privacy),
        ]
    }
}

/// What an upload slot accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadPolicy {
    pub max_mb: u64,
    pub allowed_types: Vec<String>,
    /// Allowed types with no known signature. They pass on type and size alone.
    #[serde(default)]
    pub unverified_types: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

const IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];
const VIDEO_TYPES: &[&str] = &["video/mp4", "video/webm", "video/quicktime"];

impl UploadPolicy {
    pub fn avatar() -> Self {
        Self {
            max_mb: 5,
            allowed_types: strings(IMAGE_TYPES),
            unverified_types: Vec::new(),
        }
    }

    pub fn post_media() -> Self {
        Self {
            max_mb: 10,
            allowed_types: strings(&[IMAGE_TYPES, VIDEO_TYPES].concat()),
            unverified_types: strings(VIDEO_TYPES),
        }
    }

    pub fn is_unverified(&self, content_type: &str) -> bool {
        self.unverified_types.iter().any(|t| t == content_type)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Buckets {
    pub avatars: String,
    pub post_media: String,
}

impl Default for Buckets {
    fn default() -> Self {
        Self {
            avatars: "avatars".to_string(),
            post_media: "post-media".to_string(),
        }
    }
}

/// Everything the write-gate reads at run time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    pub rate_limits: RateLimits,
    pub avatar: UploadPolicy,
    pub post_media: UploadPolicy,
    pub buckets: Buckets,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            rate_limits: RateLimits::default(),
            avatar: UploadPolicy::avatar(),
            post_media: UploadPolicy::post_media(),
            buckets: Buckets::default(),
        }
    }
}

impl Settings {
    /// Loads `.env`, then every layer, then validates.
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        let file = std::env::var(CONFIG_FILE_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&file)
    }

    /// Loads defaults, then `file` if it exists, then the environment.
    pub fn load_from(file: &Path) -> Result<Self, SettingsError> {
        let settings: Settings = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::from(file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Semantic checks. Reports every problem, not just the first.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let mut problems = Vec::new();

        for (name, rule) in self.gate.rate_limits.named() {
            if rule.window_ms <= 0 {
                problems.push(format!("gate.rate_limits.{name}.window_ms must be positive"));
            }
        }

        for (name, policy) in [("avatar", &self.gate.avatar), ("post_media", &self.gate.post_media)] {
            if policy.max_mb == 0 {
                problems.push(format!("gate.{name}.max_mb must be positive"));
            }
            if policy.allowed_types.is_empty() {
                problems.push(format!("gate.{name}.allowed_types must not be empty"));
            }
            for unverified in &policy.unverified_types {
                if !policy.allowed_types.contains(unverified) {
                    problems.push(format!("gate.{name}.unverified_types lists `{unverified}` which is not allowed"));
                }
            }
        }

        for (name, bucket) in [
            ("avatars", &self.gate.buckets.avatars),
            ("post_media", &self.gate.buckets.post_media),
        ] {
            if bucket.trim().is_empty() {
                problems.push(format!("gate.buckets.{name} must not be empty"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SettingsError::Invalid(problems))
        }
    }
}
