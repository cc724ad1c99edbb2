//! Terminal-keyed status cache.
//!
//! Each terminal gets one small JSON file naming the session it is bound
//! to, shared with the other SaveContext front ends. Files live under
//! `~/.savecontext/status-cache/<key>.json` and go stale after two hours.
//!
//! # Key resolution
//!
//! 1. `SAVECONTEXT_STATUS_KEY` env var (explicit override)
//! 2. Controlling TTY, walking up to 5 ancestor processes
//! 3. `TERM_SESSION_ID` env var (macOS Terminal.app)
//! 4. `ITERM_SESSION_ID` env var (iTerm2)

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, warn};

/// Entries older than this are deleted on read.
pub const CACHE_TTL: Duration = Duration::from_secs(2 * 60 * 60);

const MAX_KEY_LEN: usize = 100;

/// One cached binding, in the camelCase layout other clients write.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCacheEntry {
    pub session_id: String,
    pub session_name: String,
    pub project_path: String,
    /// Unix milliseconds when the entry was written.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_status: Option<String>,
}

impl StatusCacheEntry {
    /// An entry stamped with the current time.
    #[must_use]
    pub fn new(session_id: &str, session_name: &str, project_path: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            session_name: session_name.to_string(),
            project_path: project_path.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            provider: Some("cli".to_string()),
            item_count: None,
            session_status: None,
        }
    }
}

/// A status cache rooted at one directory.
#[derive(Debug, Clone)]
pub struct StatusCache {
    dir: PathBuf,
    ttl: Duration,
}

impl StatusCache {
    /// A cache in an explicit directory.
    #[must_use]
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ttl: CACHE_TTL,
        }
    }

    /// The cache under `~/.savecontext/status-cache`.
    #[must_use]
    pub fn default_location() -> Option<Self> {
        super::global_savecontext_dir().map(|d| Self::at(d.join("status-cache")))
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Read the entry for `key`.
    ///
    /// Missing, unparseable and stale entries all read as `None`; stale
    /// files are removed.
    #[must_use]
    pub fn read(&self, key: &str) -> Option<StatusCacheEntry> {
        let path = self.entry_path(key);
        let content = fs::read_to_string(&path).ok()?;

        let entry: StatusCacheEntry = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Ignoring corrupt status cache entry");
                return None;
            }
        };

        let age_ms = chrono::Utc::now().timestamp_millis().saturating_sub(entry.timestamp);
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        if age_ms > ttl_ms {
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "Failed to remove stale status cache entry");
            }
            return None;
        }

        Some(entry)
    }

    /// Write the entry for `key`: temp file with mode 0600, then rename.
    ///
    /// # Errors
    ///
    /// Returns an I/O or JSON error if the write fails.
    pub fn write(&self, key: &str, entry: &StatusCacheEntry) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let file_path = self.entry_path(key);
        let temp_path = self.dir.join(format!("{key}.json.tmp"));
        let json = serde_json::to_string_pretty(entry)?;

        {
            let mut opts = fs::OpenOptions::new();
            opts.write(true).create(true).truncate(true);
            #[cfg(unix)]
            opts.mode(0o600);
            let mut file = opts.open(&temp_path)?;
            file.write_all(json.as_bytes())?;
            file.flush()?;
        }
        fs::rename(&temp_path, &file_path)?;

        debug!(key, session = %entry.session_id, "Wrote status cache entry");
        Ok(())
    }

    /// Remove the entry for `key`. Returns whether a file was removed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file exists but cannot be removed.
    pub fn clear(&self, key: &str) -> Result<bool> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        Ok(true)
    }
}

/// Make a key safe to use as a file name.
#[must_use]
pub fn sanitize_key(key: &str) -> Option<String> {
    let sanitized: String = key
        .trim()
        .chars()
        .map(|c| {
            if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_whitespace() {
                '_'
            } else {
                c
            }
        })
        .take(MAX_KEY_LEN)
        .collect();

    (!sanitized.is_empty()).then_some(sanitized)
}

/// Walk the process tree to find the controlling terminal.
///
/// Agent-spawned processes often have no TTY themselves; the terminal is
/// held further up the tree.
fn find_tty_from_ancestors() -> Option<String> {
    let mut current_pid = std::process::id().to_string();

    for _ in 0..5 {
        if let Ok(output) = Command::new("ps").args(["-o", "tty=", "-p", &current_pid]).output() {
            if output.status.success() {
                let tty = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !tty.is_empty() && tty != "?" && tty != "??" {
                    return Some(tty);
                }
            }
        }

        let Ok(output) = Command::new("ps").args(["-o", "ppid=", "-p", &current_pid]).output() else {
            break;
        };
        if !output.status.success() {
            break;
        }

        let ppid = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if ppid.is_empty() || ppid == "0" || ppid == "1" || ppid == current_pid {
            break;
        }
        current_pid = ppid;
    }

    None
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Resolve the status key for this terminal.
#[must_use]
pub fn status_key() -> Option<String> {
    if let Some(key) = non_empty_env("SAVECONTEXT_STATUS_KEY") {
        return sanitize_key(&key);
    }
    if let Some(tty) = find_tty_from_ancestors() {
        return sanitize_key(&format!("tty-{tty}"));
    }
    if let Some(id) = non_empty_env("TERM_SESSION_ID") {
        return sanitize_key(&format!("term-{id}"));
    }
    if let Some(id) = non_empty_env("ITERM_SESSION_ID") {
        return sanitize_key(&format!("iterm-{id}"));
    }
    None
}
