//! # Alifa Binary
//!
//! Assembles the write-gate from the compiled-in plugins and drives it from
//! JSON commands on stdin, one per line. Replies go to stdout, one JSON object
//! per command; logs go to stderr.

mod session;

use alifa_config::{LogSettings, Settings};
use alifa_gate::WriteGate;
use alifa_guard::{RateLimiter, SystemClock};
use session::{Command, Session};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[cfg(not(all(feature = "db-sqlite", feature = "storage-local", feature = "auth-simple")))]
compile_error!("alifa needs the db-sqlite, storage-local and auth-simple plugins");

#[cfg(feature = "db-sqlite")]
use alifa_db_sqlite::SqliteRecordStore;

#[cfg(feature = "storage-local")]
use alifa_storage_local::LocalFileStore;

#[cfg(feature = "auth-simple")]
use alifa_auth_simple::LocalAuthProvider;

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_tracing(&settings.log);

    // 1. Record store
    let records = Arc::new(SqliteRecordStore::connect(&settings.storage.database_url).await?);

    // 2. File store
    let files = Arc::new(LocalFileStore::new(
        &settings.storage.media_root,
        settings.storage.public_url_prefix.as_str(),
    ));

    // 3. Identity
    let auth = Arc::new(LocalAuthProvider::new());

    // 4. Gate, with the wall clock behind its limiter
    let limiter = Arc::new(RateLimiter::new(Arc::new(SystemClock)));
    let gate = WriteGate::new(auth.clone(), records.clone(), files, limiter, settings.gate.clone());
    let session = Session::new(gate, auth, records);

    tracing::info!("alifa ready, reading commands from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<Command>(&line) {
            Ok(command) => session.handle(command).await,
            Err(e) => session::failure("bad_command", e.to_string()),
        };
        println!("{reply}");
    }

    Ok(())
}
