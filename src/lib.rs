//! SaveContext data store.
//!
//! Schema-adaptive access to the SaveContext SQLite database shared by the
//! MCP server, the dashboard and the `sc` CLI, plus the `scstore` binary
//! for inspecting and managing it.
//!
//! # Architecture
//!
//! - [`storage`] - SQLite layer: capability probing, transactional mutations, audit events
//! - [`model`] - Data types (Session, Issue, ContextItem, Checkpoint, Project, Plan)
//! - [`backend`] - Local and cloud backends for project and session management
//! - [`config`] - Path, actor and credential resolution; the terminal status cache
//! - [`validate`] - Status, type and priority normalization
//! - [`cli`] - Command-line interface using clap
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod storage;
pub mod validate;

pub use error::{Error, Result};
pub use storage::SqliteStorage;
