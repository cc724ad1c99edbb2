//! SQLite storage layer for SaveContext.
//!
//! This module provides the persistence layer using SQLite with:
//! - WAL mode and a separate read-only connection for queries
//! - One IMMEDIATE transaction per logical mutation
//! - Schema capability probing instead of required migrations
//! - Audit events when the database has an `events` table
//!
//! # Submodules
//!
//! - [`capabilities`] - Optional-table detection
//! - [`events`] - Audit event storage
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Connection lifecycle and the mutation wrapper
//! - [`issues`], [`sessions`], [`context`], [`projects`], [`plans`],
//!   [`stats`] - Per-domain queries and mutations on [`SqliteStorage`]

pub mod capabilities;
pub mod context;
pub mod events;
pub mod issues;
pub mod plans;
pub mod projects;
pub mod schema;
pub mod sessions;
pub mod sqlite;
pub mod stats;

pub use capabilities::{IssueSchema, SchemaCapabilities};
pub use events::{Event, EventType};
pub use sqlite::{MutationContext, SqliteStorage};
pub use stats::{DashboardStats, IssueStats, SessionStats, TaskStats};
