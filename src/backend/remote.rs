//! SaveContext cloud backend.
//!
//! Talks to the REST API with a bearer key. Every response is wrapped as
//! `{ success, data, error }` with camelCase payloads, which are mapped
//! into the local model types here.

use super::Backend;
use crate::error::{Error, Result};
use crate::model::{
    DeleteProjectCounts, DeleteSessionCounts, MergeProjectCounts, Project, ProjectCounts,
    ProjectUpdate, ProjectWithCounts, Session, SessionFilter, SessionPathRemoval,
};
use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ====================
// Wire types
// ====================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteProject {
    id: String,
    project_path: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    issue_prefix: Option<String>,
    #[serde(default = "default_next_issue_number")]
    next_issue_number: i32,
    #[serde(default)]
    created_at: i64,
    #[serde(default)]
    updated_at: i64,
    #[serde(default)]
    session_count: usize,
    #[serde(default)]
    issue_count: usize,
}

const fn default_next_issue_number() -> i32 {
    1
}

impl RemoteProject {
    fn into_project(self) -> Project {
        self.into_with_counts().project
    }

    fn into_with_counts(self) -> ProjectWithCounts {
        ProjectWithCounts {
            project: Project {
                id: self.id,
                project_path: self.project_path,
                name: self.name,
                description: self.description,
                issue_prefix: self.issue_prefix,
                next_issue_number: self.next_issue_number,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
            session_count: self.session_count,
            issue_count: self.issue_count,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteSession {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    project_path: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    ended_at: Option<i64>,
    #[serde(default)]
    created_at: i64,
    #[serde(default)]
    updated_at: i64,
    #[serde(default)]
    additional_project_paths: Vec<String>,
}

impl From<RemoteSession> for Session {
    fn from(s: RemoteSession) -> Self {
        Self {
            id: s.id,
            name: s.name,
            description: s.description,
            branch: s.branch,
            channel: s.channel,
            project_path: s.project_path,
            status: s.status.unwrap_or_else(|| "active".to_string()),
            ended_at: s.ended_at,
            created_at: s.created_at,
            updated_at: s.updated_at,
            additional_project_paths: s.additional_project_paths,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RemoteProjectCounts {
    sessions: usize,
    issues: usize,
    context_items: usize,
    memories: usize,
    checkpoints: usize,
}

impl From<RemoteProjectCounts> for ProjectCounts {
    fn from(c: RemoteProjectCounts) -> Self {
        Self {
            sessions: c.sessions,
            issues: c.issues,
            context_items: c.context_items,
            memories: c.memories,
            checkpoints: c.checkpoints,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RemoteDeleteProject {
    sessions_unlinked: usize,
    session_links_removed: usize,
    issue_links_removed: usize,
    projects: usize,
}

impl From<RemoteDeleteProject> for DeleteProjectCounts {
    fn from(c: RemoteDeleteProject) -> Self {
        Self {
            sessions_unlinked: c.sessions_unlinked,
            session_links_removed: c.session_links_removed,
            issue_links_removed: c.issue_links_removed,
            projects: c.projects,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RemoteMergeProjects {
    sessions: usize,
    issues: usize,
    plans: usize,
    memories: usize,
    memories_dropped: usize,
    session_links: usize,
    issue_links: usize,
}

impl From<RemoteMergeProjects> for MergeProjectCounts {
    fn from(c: RemoteMergeProjects) -> Self {
        Self {
            sessions: c.sessions,
            issues: c.issues,
            plans: c.plans,
            memories: c.memories,
            memories_dropped: c.memories_dropped,
            session_links: c.session_links,
            issue_links: c.issue_links,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RemoteDeleteSession {
    checkpoint_items: usize,
    checkpoints: usize,
    context_items: usize,
    session_projects: usize,
    agent_sessions: usize,
    sessions: usize,
}

impl From<RemoteDeleteSession> for DeleteSessionCounts {
    fn from(c: RemoteDeleteSession) -> Self {
        Self {
            checkpoint_items: c.checkpoint_items,
            checkpoints: c.checkpoints,
            context_items: c.context_items,
            session_projects: c.session_projects,
            agent_sessions: c.agent_sessions,
            sessions: c.sessions,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RemotePathRemoval {
    removed: usize,
    primary_cleared: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RemoteAdded {
    added: bool,
}

/// Render the envelope's `error` field, which may be a string or an object
/// with a `message`.
fn error_message(error: Option<&Value>) -> Option<String> {
    match error? {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some(Value::Object(map.clone()).to_string())),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Decode one response body. Non-2xx statuses and `success: false` both
/// become `Error::Remote`.
fn parse_envelope<T: DeserializeOwned>(status: u16, body: &str) -> Result<Option<T>> {
    let envelope: Envelope<T> = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            let message = if (200..300).contains(&status) {
                format!("Malformed response: {e}")
            } else {
                body.trim().chars().take(200).collect()
            };
            return Err(Error::Remote { status, message });
        }
    };

    if !(200..300).contains(&status) || !envelope.success {
        let message = error_message(envelope.error.as_ref())
            .unwrap_or_else(|| format!("Request failed with status {status}"));
        return Err(Error::Remote { status, message });
    }

    Ok(envelope.data)
}

// ====================
// Client
// ====================

/// [`Backend`] over the cloud REST API.
///
/// Requests are async under the hood and run to completion on a private
/// runtime, so callers see the same blocking interface as the local store.
pub struct RemoteBackend {
    runtime: tokio::runtime::Runtime,
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl RemoteBackend {
    /// # Errors
    ///
    /// Returns `Config` for an unusable base URL, or an error if the runtime
    /// or HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid API URL {base_url}: {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(Error::Config(format!("Invalid API URL {base_url}")));
        }

        let runtime = tokio::runtime::Runtime::new()?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("scstore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            runtime,
            client,
            base_url: parsed,
            api_key: api_key.to_string(),
        })
    }

    /// `{base}/api/v1/{segments...}`, each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("Invalid API URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "v1"])
            .extend(segments);
        Ok(url)
    }

    fn builder(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let url = self.url(segments)?;
        debug!(%method, %url, "Cloud request");
        Ok(self.client.request(method, url).bearer_auth(&self.api_key))
    }

    fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Option<T>> {
        self.runtime.block_on(async {
            let response = request.send().await.map_err(|e| {
                warn!(error = %e, "Cloud request failed");
                Error::Remote {
                    status: 0,
                    message: format!("Request failed: {e}"),
                }
            })?;

            let status = response.status().as_u16();
            let text = response.text().await.map_err(|e| Error::Remote {
                status,
                message: format!("Failed to read response: {e}"),
            })?;
            parse_envelope(status, &text)
        })
    }

    fn request<T: DeserializeOwned>(&self, method: Method, segments: &[&str], body: Option<Value>) -> Result<Option<T>> {
        let mut request = self.builder(method, segments)?;
        if let Some(body) = &body {
            request = request.json(body);
        }
        self.send(request)
    }

    /// Like [`Self::request`], but a missing `data` is an error.
    fn request_data<T: DeserializeOwned>(&self, method: Method, segments: &[&str], body: Option<Value>) -> Result<T> {
        self.request(method, segments, body)?.ok_or_else(|| Error::Remote {
            status: 200,
            message: format!("Response to /{} carried no data", segments.join("/")),
        })
    }

    /// A lookup where 404 means absent rather than failure.
    fn request_optional<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<Option<T>> {
        match self.request(Method::GET, segments, None) {
            Err(Error::Remote { status: 404, .. }) => Ok(None),
            other => other,
        }
    }
}

/// Query parameters for `GET /sessions`.
fn session_query(filter: &SessionFilter) -> Vec<(&'static str, String)> {
    let mut query = vec![("limit", filter.limit.unwrap_or(50).to_string())];
    if let Some(path) = &filter.project_path {
        query.push(("projectPath", path.clone()));
    }
    if let Some(status) = filter.status {
        query.push(("status", status.to_string()));
    }
    if let Some(search) = &filter.search {
        query.push(("search", search.clone()));
    }
    query
}

impl Backend for RemoteBackend {
    fn name(&self) -> &'static str {
        "cloud"
    }

    fn list_projects(&self, limit: u32) -> Result<Vec<ProjectWithCounts>> {
        let request = self.builder(Method::GET, &["projects"])?.query(&[("limit", limit)]);
        let projects: Vec<RemoteProject> = self.send(request)?.unwrap_or_default();
        Ok(projects.into_iter().map(RemoteProject::into_with_counts).collect())
    }

    fn get_project(&self, id_or_path: &str) -> Result<Option<Project>> {
        let project: Option<RemoteProject> = self.request_optional(&["projects", id_or_path])?;
        Ok(project.map(RemoteProject::into_project))
    }

    fn project_counts(&self, project: &Project) -> Result<ProjectCounts> {
        let counts: Option<RemoteProjectCounts> =
            self.request(Method::GET, &["projects", project.id.as_str(), "counts"], None)?;
        Ok(counts.unwrap_or_default().into())
    }

    fn rename_project(&mut self, id: &str, name: &str) -> Result<Project> {
        self.update_project(
            id,
            &ProjectUpdate {
                name: Some(name.to_string()),
                ..ProjectUpdate::default()
            },
        )
    }

    fn update_project(&mut self, id: &str, update: &ProjectUpdate) -> Result<Project> {
        if update.is_empty() {
            return Err(Error::InvalidArgument("Nothing to update".to_string()));
        }
        let body = json!({
            "name": update.name,
            "description": update.description,
            "issuePrefix": update.issue_prefix,
        });
        let project: RemoteProject = self.request_data(Method::PATCH, &["projects", id], Some(body))?;
        Ok(project.into_project())
    }

    fn delete_project(&mut self, id: &str) -> Result<DeleteProjectCounts> {
        let counts: Option<RemoteDeleteProject> = self.request(Method::DELETE, &["projects", id], None)?;
        Ok(counts.unwrap_or_default().into())
    }

    fn merge_projects(&mut self, source_id: &str, target_id: &str) -> Result<MergeProjectCounts> {
        let body = json!({ "sourceId": source_id, "targetId": target_id });
        let counts: Option<RemoteMergeProjects> = self.request(Method::POST, &["projects", "merge"], Some(body))?;
        Ok(counts.unwrap_or_default().into())
    }

    fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>> {
        let request = self.builder(Method::GET, &["sessions"])?.query(&session_query(filter));
        let sessions: Vec<RemoteSession> = self.send(request)?.unwrap_or_default();
        Ok(sessions.into_iter().map(Session::from).collect())
    }

    fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let session: Option<RemoteSession> = self.request_optional(&["sessions", id])?;
        Ok(session.map(Session::from))
    }

    fn rename_session(&mut self, id: &str, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::InvalidArgument("Session name cannot be empty".to_string()));
        }
        self.request::<Value>(Method::PATCH, &["sessions", id], Some(json!({ "name": name.trim() })))?;
        Ok(())
    }

    fn archive_session(&mut self, id: &str) -> Result<()> {
        self.request::<Value>(Method::PATCH, &["sessions", id], Some(json!({ "status": "completed" })))?;
        Ok(())
    }

    fn delete_session(&mut self, id: &str) -> Result<DeleteSessionCounts> {
        let counts: Option<RemoteDeleteSession> = self.request(Method::DELETE, &["sessions", id], None)?;
        Ok(counts.unwrap_or_default().into())
    }

    fn add_session_path(&mut self, id: &str, path: &str) -> Result<bool> {
        let added: Option<RemoteAdded> = self.request(
            Method::POST,
            &["sessions", id, "paths"],
            Some(json!({ "projectPath": path })),
        )?;
        Ok(added.is_none_or(|a| a.added))
    }

    fn remove_session_path(&mut self, id: &str, path: &str) -> Result<SessionPathRemoval> {
        let removal: Option<RemotePathRemoval> = self.request(
            Method::DELETE,
            &["sessions", id, "paths"],
            Some(json!({ "projectPath": path })),
        )?;
        let removal = removal.unwrap_or_default();
        Ok(SessionPathRemoval {
            removed: removal.removed,
            primary_cleared: removal.primary_cleared,
        })
    }

    fn set_session_primary(&mut self, id: &str, path: &str) -> Result<()> {
        self.request::<Value>(
            Method::PUT,
            &["sessions", id, "paths", "primary"],
            Some(json!({ "projectPath": path })),
        )?;
        Ok(())
    }
}
