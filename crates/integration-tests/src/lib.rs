//! Shared fixtures: the real plugins wired behind a write-gate, over an
//! in-memory database and a scratch media directory.

use alifa_auth_simple::LocalAuthProvider;
use alifa_config::GateSettings;
use alifa_core::Attachment;
use alifa_db_sqlite::SqliteRecordStore;
use alifa_gate::WriteGate;
use alifa_guard::{ManualClock, RateLimiter};
use alifa_storage_local::LocalFileStore;
use std::path::PathBuf;
use std::sync::Arc;

pub const PASSWORD: &str = "Forgeron2024";

pub const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D];
pub const GIF: &[u8] = &[0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00];
pub const EXE: &[u8] = &[0x4D, 0x5A, 0x90, 0x00, 0x03, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00];

pub fn png(name: &str) -> Attachment {
    Attachment::new(name, "image/png", PNG)
}

pub struct Stack {
    pub auth: Arc<LocalAuthProvider>,
    pub records: Arc<SqliteRecordStore>,
    pub clock: Arc<ManualClock>,
    pub gate: WriteGate,
    pub media_root: PathBuf,
}

impl Stack {
    pub async fn start() -> anyhow::Result<Self> {
        let media_root = std::env::temp_dir().join(format!("alifa-it-{}", uuid::Uuid::new_v4()));
        let auth = Arc::new(LocalAuthProvider::new());
        let records = Arc::new(SqliteRecordStore::connect("sqlite::memory:").await?);
        let files = Arc::new(LocalFileStore::new(&media_root, "/media"));
        let clock = Arc::new(ManualClock::starting_at(1_700_000_000_000));

        let gate = WriteGate::new(
            auth.clone(),
            records.clone(),
            files,
            Arc::new(RateLimiter::new(clock.clone())),
            GateSettings::default(),
        );

        Ok(Self {
            auth,
            records,
            clock,
            gate,
            media_root,
        })
    }

    /// Signs up a fresh account, which becomes the current actor.
    pub fn sign_up(&self, name: &str) -> alifa_core::Actor {
        let email = format!("{}@alifa.example", name.to_lowercase());
        match self.auth.sign_up(&email, PASSWORD, name) {
            Ok(actor) => actor,
            Err(e) => panic!("sign up {email}: {e}"),
        }
    }

    /// Path on disk of a file served at `url`.
    pub fn file_at(&self, url: &str) -> PathBuf {
        self.media_root.join(url.trim_start_matches("/media/"))
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.media_root);
    }
}
