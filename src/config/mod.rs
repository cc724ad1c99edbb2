//! Configuration management.
//!
//! Resolves where the database lives, who is acting, and whether cloud
//! credentials are available. Everything is read from flags, environment
//! variables and files under `~/.savecontext/`; nothing is written here
//! except by the status cache.

pub mod status_cache;

pub use status_cache::{StatusCache, StatusCacheEntry};

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Cloud API used when neither the environment nor the credentials file
/// names one.
pub const DEFAULT_API_URL: &str = "https://api.savecontext.dev";

/// Get the global SaveContext directory, `~/.savecontext/`.
#[must_use]
pub fn global_savecontext_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".savecontext"))
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// `--db`, then `SAVECONTEXT_DB`, then `~/.savecontext/data/savecontext.db`.
fn resolve_db_path_with(
    explicit_path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
    global_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env("SAVECONTEXT_DB") {
        return Some(PathBuf::from(path));
    }
    global_dir.map(|dir| dir.join("data").join("savecontext.db"))
}

fn resolve_actor_with(explicit: Option<&str>, env: impl Fn(&str) -> Option<String>) -> String {
    explicit
        .filter(|a| !a.trim().is_empty())
        .map(str::to_string)
        .or_else(|| env("SC_ACTOR"))
        .or_else(|| env("USER"))
        .unwrap_or_else(|| "unknown".to_string())
}

// ====================
// Credentials
// ====================

/// The subset of `credentials.json` this crate reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
}

impl Credentials {
    /// Load a credentials file. A missing file yields empty credentials.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the file exists but is not valid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid credentials file {}: {e}", path.display())))
    }

    /// `~/.savecontext/credentials.json`.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        global_savecontext_dir().map(|d| d.join("credentials.json"))
    }
}

// ====================
// Resolved configuration
// ====================

/// Everything a command needs to pick and drive a backend.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub actor: String,
    pub api_key: Option<String>,
    pub api_url: String,
}

impl Config {
    /// Resolve from flags, the environment and `~/.savecontext/`.
    ///
    /// # Errors
    ///
    /// Returns `Config` if no database location can be determined or the
    /// credentials file is malformed.
    pub fn resolve(db: Option<&Path>, actor: Option<&str>) -> Result<Self> {
        let credentials = match Credentials::default_path() {
            Some(path) => Credentials::load(&path)?,
            None => Credentials::default(),
        };
        Self::resolve_with(db, actor, env_var, global_savecontext_dir(), credentials)
    }

    fn resolve_with(
        db: Option<&Path>,
        actor: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
        global_dir: Option<PathBuf>,
        credentials: Credentials,
    ) -> Result<Self> {
        let db_path = resolve_db_path_with(db, &env, global_dir).ok_or_else(|| {
            Error::Config("Could not determine a database path; pass --db or set SAVECONTEXT_DB".to_string())
        })?;

        let api_key = env("SAVECONTEXT_API_KEY").or(credentials.api_key.filter(|k| !k.trim().is_empty()));
        let api_url = env("SAVECONTEXT_API_URL")
            .or(credentials.api_url.filter(|u| !u.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let config = Self {
            db_path,
            actor: resolve_actor_with(actor, &env),
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
        };
        debug!(
            db = %config.db_path.display(),
            actor = %config.actor,
            remote = config.api_key.is_some(),
            "Resolved configuration"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_db_path_priority() {
        let home = Some(PathBuf::from("/home/u/.savecontext"));
        let explicit = PathBuf::from("/custom/db.sqlite");

        assert_eq!(
            resolve_db_path_with(Some(&explicit), env_of(&[("SAVECONTEXT_DB", "/env.db")]), home.clone()),
            Some(explicit)
        );
        assert_eq!(
            resolve_db_path_with(None, env_of(&[("SAVECONTEXT_DB", "/env.db")]), home.clone()),
            Some(PathBuf::from("/env.db"))
        );
        assert_eq!(
            resolve_db_path_with(None, env_of(&[]), home),
            Some(PathBuf::from("/home/u/.savecontext/data/savecontext.db"))
        );
        assert_eq!(resolve_db_path_with(None, env_of(&[]), None), None);
    }

    #[test]
    fn test_actor_priority() {
        assert_eq!(resolve_actor_with(Some("flag"), env_of(&[("SC_ACTOR", "env")])), "flag");
        assert_eq!(
            resolve_actor_with(None, env_of(&[("SC_ACTOR", "env"), ("USER", "u")])),
            "env"
        );
        assert_eq!(resolve_actor_with(Some("  "), env_of(&[("USER", "u")])), "u");
        assert_eq!(resolve_actor_with(None, env_of(&[])), "unknown");
    }

    #[test]
    fn test_credentials_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.json");

        assert_eq!(Credentials::load(&path).unwrap(), Credentials::default());

        std::fs::write(&path, r#"{"apiKey": "sk_1", "apiUrl": "https://x.test", "email": "a@b"}"#).unwrap();
        let creds = Credentials::load(&path).unwrap();
        assert_eq!(creds.api_key.as_deref(), Some("sk_1"));
        assert_eq!(creds.api_url.as_deref(), Some("https://x.test"));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(Credentials::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_env_key_beats_credentials() {
        let creds = Credentials {
            api_key: Some("from_file".into()),
            api_url: Some("https://file.test/".into()),
        };
        let config = Config::resolve_with(
            Some(Path::new("/db")),
            None,
            env_of(&[("SAVECONTEXT_API_KEY", "from_env")]),
            None,
            creds,
        )
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("from_env"));
        assert_eq!(config.api_url, "https://file.test");
    }

    #[test]
    fn test_local_only_config() {
        let config = Config::resolve_with(Some(Path::new("/db")), Some("me"), env_of(&[]), None, Credentials::default())
            .unwrap();
        assert!(config.api_key.is_none());
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.actor, "me");
    }
}
