//! CLI definitions using clap.

use crate::error::{Error, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::{BufRead, Write};
use std::path::PathBuf;

pub mod commands;

/// SaveContext data store - inspect and manage the local database
#[derive(Parser, Debug)]
#[command(name = "scstore", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.savecontext/data/savecontext.db)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Actor name for the audit trail
    #[arg(long, global = true)]
    pub actor: Option<String>,

    /// Output as JSON (implied when stdout is not a terminal)
    #[arg(long, global = true)]
    pub json: bool,

    /// Skip confirmation prompts
    #[arg(short, long, global = true)]
    pub force: bool,

    /// Use the local database even when cloud credentials exist
    #[arg(long, global = true)]
    pub local: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no logging)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database with the current schema
    Init,

    /// Project management
    #[command(visible_alias = "project")]
    Projects {
        #[command(subcommand)]
        command: ProjectCommands,
    },

    /// Session management
    #[command(visible_alias = "session")]
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Issue queries, labels and project links
    #[command(visible_alias = "issue")]
    Issues {
        #[command(subcommand)]
        command: IssueCommands,
    },

    /// Dashboard statistics
    Stats {
        /// Restrict issue and session counts to one project path
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Terminal status cache
    Status {
        #[command(subcommand)]
        command: Option<StatusCommands>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Project Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// List projects with session and issue counts
    List {
        /// Maximum projects to return
        #[arg(short, long, default_value = "50")]
        limit: u32,
    },

    /// Show project details (by ID or path)
    Show {
        id: String,
    },

    /// Rename a project
    Rename {
        id: String,
        name: String,
    },

    /// Update project settings
    Update(ProjectUpdateArgs),

    /// Delete a project row (sessions and issues are kept)
    Delete {
        id: String,
    },

    /// Move everything from SOURCE into TARGET, then delete SOURCE
    Merge {
        source: String,
        target: String,
    },
}

#[derive(Args, Debug)]
pub struct ProjectUpdateArgs {
    /// Project ID or path
    pub id: String,

    /// New name
    #[arg(short, long)]
    pub name: Option<String>,

    /// New description
    #[arg(short, long)]
    pub description: Option<String>,

    /// New issue prefix (uppercased)
    #[arg(short = 'p', long)]
    pub issue_prefix: Option<String>,
}

// ============================================================================
// Session Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// List sessions, most recently updated first
    List {
        /// Filter by project path (primary or additional)
        #[arg(short, long)]
        project: Option<String>,

        /// Filter by status (active, paused, completed)
        #[arg(short, long)]
        status: Option<String>,

        /// Search names and descriptions
        #[arg(long)]
        search: Option<String>,

        /// Maximum sessions to return
        #[arg(short, long, default_value = "50")]
        limit: u32,
    },

    /// Show a session with all of its project paths
    Show {
        id: String,
    },

    /// Rename a session
    Rename {
        id: String,
        name: String,
    },

    /// Mark a session completed
    Archive {
        id: String,
    },

    /// Delete a session with its context items and checkpoints
    Delete {
        id: String,
    },

    /// Manage the project paths a session spans
    Paths {
        #[command(subcommand)]
        command: SessionPathCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionPathCommands {
    /// Link an additional project path
    Add {
        id: String,
        path: String,
    },

    /// Unlink a project path
    Remove {
        id: String,
        path: String,
    },

    /// Make a path the session's primary project
    SetPrimary {
        id: String,
        path: String,
    },
}

// ============================================================================
// Issue Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum IssueCommands {
    /// List issues, newest first
    List(IssueListArgs),

    /// Show an issue with labels, dependencies and children
    Show {
        /// Issue ID or short ID
        id: String,
    },

    /// Issue counts per status
    Stats {
        /// Restrict to one project path
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Manage issue labels
    Labels {
        #[command(subcommand)]
        command: LabelCommands,
    },

    /// Manage additional project paths
    Projects {
        #[command(subcommand)]
        command: IssueProjectCommands,
    },
}

#[derive(Args, Debug, Default)]
pub struct IssueListArgs {
    /// Filter by project path (primary or additional)
    #[arg(short, long)]
    pub project: Option<String>,

    /// Filter by status (synonyms like done or todo are accepted)
    #[arg(short, long)]
    pub status: Option<String>,

    /// Created within the last N hours
    #[arg(long)]
    pub created_hours: Option<u32>,

    /// Created within the last N days
    #[arg(long)]
    pub created_days: Option<u32>,

    /// Updated within the last N hours
    #[arg(long)]
    pub updated_hours: Option<u32>,

    /// Updated within the last N days
    #[arg(long)]
    pub updated_days: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum LabelCommands {
    /// List every distinct label
    List {
        /// Restrict to one project path
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Add labels to an issue
    Add {
        id: String,
        #[arg(required = true, num_args = 1..)]
        labels: Vec<String>,
    },

    /// Remove labels from an issue
    Remove {
        id: String,
        #[arg(required = true, num_args = 1..)]
        labels: Vec<String>,
    },

    /// Replace an issue's labels (no labels clears them)
    Set {
        id: String,
        labels: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum IssueProjectCommands {
    /// Link an issue to an additional project path
    Add {
        id: String,
        path: String,
    },

    /// Unlink an additional project path
    Remove {
        id: String,
        path: String,
    },
}

// ============================================================================
// Status Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum StatusCommands {
    /// Show the session bound to this terminal
    Show,

    /// Bind this terminal to a session
    Set {
        /// Session ID
        session: String,
    },

    /// Remove this terminal's binding
    Clear,
}

// ============================================================================
// Output helpers
// ============================================================================

/// Print a value as pretty JSON on stdout.
///
/// # Errors
///
/// Returns a JSON error if serialization fails.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Render a millisecond timestamp as RFC 3339.
#[must_use]
pub fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ts).map_or_else(|| ts.to_string(), |dt| dt.to_rfc3339())
}

/// What the user must type to confirm a destructive command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// `y` or `yes`, case-insensitive.
    YesNo,
    /// An exact word, e.g. `DELETE`.
    Literal(&'static str),
}

impl Confirmation {
    fn accepts(self, answer: &str) -> bool {
        let answer = answer.trim();
        match self {
            Self::YesNo => matches!(answer.to_lowercase().as_str(), "y" | "yes"),
            Self::Literal(word) => answer == word,
        }
    }
}

/// Ask on stderr and read one line from stdin.
///
/// `force` skips the prompt. A declined prompt returns `Error::Cancelled`.
///
/// # Errors
///
/// Returns `Cancelled` if the answer does not confirm, or an I/O error.
pub fn confirm(prompt: &str, expected: Confirmation, force: bool) -> Result<()> {
    if force {
        return Ok(());
    }
    let hint = match expected {
        Confirmation::YesNo => "[y/N]".to_string(),
        Confirmation::Literal(word) => format!("(type {word} to confirm)"),
    };

    let mut stderr = std::io::stderr();
    write!(stderr, "{prompt} {hint} ")?;
    stderr.flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    confirm_answer(&answer, expected)
}

fn confirm_answer(answer: &str, expected: Confirmation) -> Result<()> {
    if expected.accepts(answer) {
        Ok(())
    } else {
        Err(Error::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["scstore", "projects", "delete", "proj_1", "--force", "--json"]);
        assert!(cli.force);
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Projects { command: ProjectCommands::Delete { ref id } } if id == "proj_1"
        ));
    }

    #[test]
    fn test_labels_set_accepts_empty_list() {
        let cli = Cli::parse_from(["scstore", "issues", "labels", "set", "SC-1"]);
        match cli.command {
            Commands::Issues {
                command: IssueCommands::Labels {
                    command: LabelCommands::Set { id, labels },
                },
            } => {
                assert_eq!(id, "SC-1");
                assert!(labels.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_confirmations() {
        assert!(confirm_answer("y\n", Confirmation::YesNo).is_ok());
        assert!(confirm_answer("YES", Confirmation::YesNo).is_ok());
        assert!(matches!(confirm_answer("\n", Confirmation::YesNo), Err(Error::Cancelled)));
        assert!(confirm_answer("DELETE\n", Confirmation::Literal("DELETE")).is_ok());
        assert!(confirm_answer("delete", Confirmation::Literal("DELETE")).is_err());
        assert!(confirm("never read", Confirmation::Literal("DELETE"), true).is_ok());
    }
}
