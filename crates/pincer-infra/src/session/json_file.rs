//! JSON-file session persistence.
//!
//! One file per session at `{dir}/{encoded_key}.json`. The encoding keeps
//! filenames inside `[A-Za-z0-9._-]` and is one-to-one, so distinct keys
//! never share a file. Writes go to a uniquely named temporary sibling that
//! is renamed into place, so a crash mid-write never leaves a truncated
//! session behind.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use pincer_core::session::persistence::SessionPersistence;
use pincer_types::error::StoreError;
use pincer_types::session::Session;
use tracing::{debug, warn};

/// Stores each session as a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileSessionStore {
    dir: PathBuf,
}

impl JsonFileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key`.
    pub fn session_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }

    fn tmp_path(&self, key: &str) -> PathBuf {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        self.dir
            .join(format!("{}.{}-{n}.tmp", encode_key(key), std::process::id()))
    }
}

/// Filename stem for `key`.
///
/// ASCII letters, digits, `.` and `-` are kept. `_` is the escape character:
/// it becomes `__`, and every other byte becomes `_` plus two uppercase hex
/// digits, so `telegram:42` is `telegram_3A42` and `telegram_42` is
/// `telegram__42`.
pub fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'_' => encoded.push_str("__"),
            b if b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-') => {
                encoded.push(char::from(b))
            }
            b => {
                let _ = write!(encoded, "_{b:02X}");
            }
        }
    }
    encoded
}

impl SessionPersistence for JsonFileSessionStore {
    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.session_path(&session.key);
        let tmp = self.tmp_path(&session.key);
        let json = serde_json::to_vec_pretty(session)?;

        tokio::fs::write(&tmp, json).await?;
        if let Err(err) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        debug!(session_key = %session.key, path = %path.display(), "session saved");
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Session>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(dir = %self.dir.display(), "no sessions directory yet");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let content = match tokio::fs::read(&path).await {
                Ok(content) => content,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable session file");
                    continue;
                }
            };
            match serde_json::from_slice::<Session>(&content) {
                Ok(session) => sessions.push(session),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping corrupt session file");
                }
            }
        }

        debug!(count = sessions.len(), dir = %self.dir.display(), "sessions loaded");
        Ok(sessions)
    }
}
