//! Error types for the SaveContext data store.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, etc.)
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    DatabaseNotFound,
    AlreadyInitialized,
    DatabaseError,
    SchemaUnsupported,

    // Not Found (exit 3)
    SessionNotFound,
    IssueNotFound,
    CheckpointNotFound,
    ProjectNotFound,
    PlanNotFound,
    AmbiguousId,

    // Validation (exit 4)
    InvalidArgument,
    Cancelled,

    // Dependency (exit 5)
    CycleDetected,
    ParentAlreadySet,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Remote API (exit 10)
    RemoteError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::DatabaseNotFound => "DATABASE_NOT_FOUND",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::SchemaUnsupported => "SCHEMA_UNSUPPORTED",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::IssueNotFound => "ISSUE_NOT_FOUND",
            Self::CheckpointNotFound => "CHECKPOINT_NOT_FOUND",
            Self::ProjectNotFound => "PROJECT_NOT_FOUND",
            Self::PlanNotFound => "PLAN_NOT_FOUND",
            Self::AmbiguousId => "AMBIGUOUS_ID",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::Cancelled => "CANCELLED",
            Self::CycleDetected => "CYCLE_DETECTED",
            Self::ParentAlreadySet => "PARENT_ALREADY_SET",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::RemoteError => "REMOTE_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code. Always non-zero.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError | Self::Cancelled => 1,
            Self::DatabaseNotFound
            | Self::AlreadyInitialized
            | Self::DatabaseError
            | Self::SchemaUnsupported => 2,
            Self::SessionNotFound
            | Self::IssueNotFound
            | Self::CheckpointNotFound
            | Self::ProjectNotFound
            | Self::PlanNotFound
            | Self::AmbiguousId => 3,
            Self::InvalidArgument => 4,
            Self::CycleDetected | Self::ParentAlreadySet => 5,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
            Self::RemoteError => 10,
        }
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in data store operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database not found at {}", path.display())]
    DatabaseNotFound { path: PathBuf },

    #[error("Already initialized at {}", path.display())]
    AlreadyInitialized { path: PathBuf },

    #[error("Database schema does not support {feature}")]
    SchemaUnsupported { feature: &'static str },

    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    #[error("Issue not found: {id}")]
    IssueNotFound { id: String },

    #[error("Checkpoint not found: {id}")]
    CheckpointNotFound { id: String },

    #[error("Project not found: {id}")]
    ProjectNotFound { id: String },

    #[error("Plan not found: {id}")]
    PlanNotFound { id: String },

    #[error("Ambiguous ID '{id}': matches {matches:?}")]
    AmbiguousId { id: String, matches: Vec<String> },

    #[error("Dependency cycle: {issue_id} cannot depend on {depends_on_id}")]
    CycleDetected {
        issue_id: String,
        depends_on_id: String,
    },

    #[error("Issue {issue_id} already has parent {existing_parent}")]
    ParentAlreadySet {
        issue_id: String,
        existing_parent: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Remote API error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::DatabaseNotFound { .. } => ErrorCode::DatabaseNotFound,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::SchemaUnsupported { .. } => ErrorCode::SchemaUnsupported,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::SessionNotFound { .. } => ErrorCode::SessionNotFound,
            Self::IssueNotFound { .. } => ErrorCode::IssueNotFound,
            Self::CheckpointNotFound { .. } => ErrorCode::CheckpointNotFound,
            Self::ProjectNotFound { .. } => ErrorCode::ProjectNotFound,
            Self::PlanNotFound { .. } => ErrorCode::PlanNotFound,
            Self::AmbiguousId { .. } => ErrorCode::AmbiguousId,
            Self::CycleDetected { .. } => ErrorCode::CycleDetected,
            Self::ParentAlreadySet { .. } => ErrorCode::ParentAlreadySet,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Remote { .. } => ErrorCode::RemoteError,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::DatabaseNotFound { path } => Some(format!(
                "No database at {}. Run `scstore init` or pass --db <path>.",
                path.display()
            )),

            Self::AlreadyInitialized { path } => Some(format!(
                "Database already exists at {}. Use `--force` to reinitialize.",
                path.display()
            )),

            Self::SchemaUnsupported { feature } => Some(format!(
                "This database predates {feature}. Open it with a current SaveContext server to upgrade the schema."
            )),

            Self::SessionNotFound { id } => Some(format!(
                "No session with ID '{id}'. Use `scstore sessions list` to see available sessions."
            )),

            Self::IssueNotFound { id } => Some(format!(
                "No issue with ID '{id}'. Use `scstore issues list` to see available issues."
            )),

            Self::ProjectNotFound { id } => Some(format!(
                "No project with ID '{id}'. Use `scstore projects list` to see available projects."
            )),

            Self::AmbiguousId { id, .. } => Some(format!(
                "Short ID '{id}' exists in more than one project. Use the full issue ID."
            )),

            Self::ParentAlreadySet { .. } => Some(
                "An issue can have only one parent. Remove the existing parent-child dependency first."
                    .to_string(),
            ),

            Self::InvalidArgument(msg) => {
                if msg.contains("status") {
                    Some(
                        "Valid statuses: backlog, open, in_progress, blocked, closed, deferred. \
                         Synonyms: done→closed, todo→open, pending→open"
                            .to_string(),
                    )
                } else if msg.contains("type") {
                    Some("Valid types: task, bug, feature, epic, chore".to_string())
                } else if msg.contains("priority") {
                    Some("Valid priorities: 0-4".to_string())
                } else {
                    None
                }
            }

            Self::Remote { status: 401 | 403, .. } => Some(
                "The API key was rejected. Check SAVECONTEXT_API_KEY or ~/.savecontext/credentials.json, or pass --local."
                    .to_string(),
            ),

            Self::CheckpointNotFound { .. }
            | Self::PlanNotFound { .. }
            | Self::CycleDetected { .. }
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Config(_)
            | Self::Remote { .. }
            | Self::Cancelled
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_never_zero() {
        let errors = [
            Error::Cancelled,
            Error::DatabaseNotFound { path: PathBuf::from("/nope.db") },
            Error::IssueNotFound { id: "x".into() },
            Error::InvalidArgument("bad status".into()),
            Error::Remote { status: 500, message: "boom".into() },
        ];
        for e in errors {
            assert!(e.exit_code() >= 1, "{e} exits with 0");
        }
    }

    #[test]
    fn test_missing_database_hint_mentions_init() {
        let e = Error::DatabaseNotFound { path: PathBuf::from("/tmp/x.db") };
        assert_eq!(e.exit_code(), 2);
        assert!(e.hint().unwrap().contains("scstore init"));
    }

    #[test]
    fn test_structured_json_shape() {
        let e = Error::ProjectNotFound { id: "proj_1".into() };
        let json = e.to_structured_json();
        assert_eq!(json["error"]["code"], "PROJECT_NOT_FOUND");
        assert_eq!(json["error"]["exit_code"], 3);
        assert!(json["error"]["hint"].is_string());
    }
}
