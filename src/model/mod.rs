//! Data models for SaveContext.
//!
//! Row shapes returned by the store and the input/filter types its
//! operations accept.

pub mod context;
pub mod issue;
pub mod plan;
pub mod project;
pub mod session;

pub use context::{
    Checkpoint, ContextItem, ContextItemInput, ItemCategory, ItemPriority, Memory, MemoryCategory,
    NewCheckpoint, MAX_VALUE_BYTES,
};
pub use issue::{
    DeleteIssueCounts, DependencyType, Issue, IssueDependency, IssueFilter, IssueRef, NewIssue, TimeFilter,
    TimeThresholds,
};
pub use plan::{Plan, PlanIssue, PlanStatus, PlanSummary};
pub use project::{
    DeleteProjectCounts, MergeProjectCounts, Project, ProjectCounts, ProjectUpdate,
    ProjectWithCounts,
};
pub use session::{
    DeleteSessionCounts, Session, SessionFilter, SessionPathRemoval, SessionStatus,
};
