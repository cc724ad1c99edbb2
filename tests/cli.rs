use assert_cmd::Command;
use scstore::model::{NewIssue, Project};
use scstore::SqliteStorage;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const ACTOR: &str = "cli-test";

struct Env {
    home: TempDir,
    db: PathBuf,
}

impl Env {
    fn new() -> Self {
        let home = TempDir::new().unwrap();
        let db = home.path().join("store.db");
        Self { home, db }
    }

    /// A command isolated from the caller's home directory and credentials.
    /// Stdout is piped, so output is JSON.
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("scstore").unwrap();
        cmd.env("HOME", self.home.path())
            .env("SAVECONTEXT_STATUS_KEY", "test-terminal")
            .env_remove("SAVECONTEXT_DB")
            .env_remove("SAVECONTEXT_API_KEY")
            .env_remove("SAVECONTEXT_API_URL")
            .env_remove("SC_ACTOR")
            .env_remove("RUST_LOG")
            .arg("--db")
            .arg(&self.db)
            .arg("--actor")
            .arg(ACTOR);
        cmd
    }

    fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.cmd().args(args).output().unwrap();
        assert!(
            output.status.success(),
            "{args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }

    fn storage(&self) -> SqliteStorage {
        SqliteStorage::open(&self.db).unwrap()
    }

    /// Create the database with one project, one session and two issues.
    fn seeded(self) -> Self {
        self.cmd().arg("init").assert().success();

        let mut storage = self.storage();
        storage.create_project(&Project::new("/work/app", "App"), ACTOR).unwrap();
        storage
            .create_session("Feature work", None, Some("/work/app"), None, ACTOR)
            .unwrap();
        storage
            .create_issue(&NewIssue::new("/work/app", "First"), ACTOR)
            .unwrap();
        storage
            .create_issue(&NewIssue::new("/work/app", "Second").with_status("closed"), ACTOR)
            .unwrap();
        self
    }
}

/// The structured error is the last thing on stderr, after any prompt text.
fn error_json(stderr: &[u8]) -> serde_json::Value {
    let text = String::from_utf8_lossy(stderr);
    let line = text.trim_end().lines().last().unwrap_or_default();
    let start = line.find('{').unwrap();
    serde_json::from_str(&line[start..]).unwrap()
}

fn error_code(stderr: &[u8]) -> String {
    error_json(stderr)["error"]["code"].as_str().unwrap().to_string()
}

fn only_session_id(env: &Env) -> String {
    let listed = env.json(&["sessions", "list"]);
    listed["sessions"][0]["id"].as_str().unwrap().to_string()
}

#[test]
fn test_init_then_reinit_requires_force() {
    let env = Env::new();

    let created = env.json(&["init"]);
    assert_eq!(created["reinitialized"], false);
    assert!(env.db.exists());

    let output = env.cmd().arg("init").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(error_code(&output.stderr), "ALREADY_INITIALIZED");

    let forced = env.json(&["init", "--force"]);
    assert_eq!(forced["reinitialized"], true);
}

#[test]
fn test_missing_database_exits_nonzero_with_hint() {
    let env = Env::new();
    let output = env.cmd().arg("stats").output().unwrap();

    assert_eq!(output.status.code(), Some(2));
    let value = error_json(&output.stderr);
    assert_eq!(value["error"]["code"], "DATABASE_NOT_FOUND");
    assert!(value["error"]["hint"].as_str().unwrap().contains("scstore init"));
}

#[test]
fn test_dashboard_stats() {
    let env = Env::new().seeded();
    let stats = env.json(&["stats"]);

    assert_eq!(stats["projects"], 1);
    assert_eq!(stats["sessions"]["active"], 1);
    assert_eq!(stats["issues"]["open"], 1);
    assert_eq!(stats["issues"]["closed"], 1);
    assert_eq!(stats["issues"]["total"], 2);

    let scoped = env.json(&["stats", "--project", "/elsewhere"]);
    assert_eq!(scoped["issues"]["total"], 0);
}

#[test]
fn test_projects_list_show_and_update() {
    let env = Env::new().seeded();

    let listed = env.json(&["projects", "list"]);
    assert_eq!(listed["backend"], "local");
    assert_eq!(listed["count"], 1);
    assert_eq!(listed["projects"][0]["issue_count"], 2);
    assert_eq!(listed["projects"][0]["session_count"], 1);

    let shown = env.json(&["projects", "show", "/work/app"]);
    assert_eq!(shown["project"]["name"], "App");
    assert_eq!(shown["counts"]["issues"], 2);

    let updated = env.json(&["projects", "update", "/work/app", "--issue-prefix", "web"]);
    assert_eq!(updated["issue_prefix"], "WEB");

    let renamed = env.json(&["projects", "rename", "/work/app", "Web App"]);
    assert_eq!(renamed["name"], "Web App");
}

#[test]
fn test_project_delete_needs_confirmation() {
    let env = Env::new().seeded();

    let output = env
        .cmd()
        .args(["projects", "delete", "/work/app"])
        .write_stdin("delete\n")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(error_code(&output.stderr), "CANCELLED");
    assert!(env.storage().get_project_by_path("/work/app").unwrap().is_some());

    env.cmd()
        .args(["projects", "delete", "/work/app"])
        .write_stdin("DELETE\n")
        .assert()
        .success();
    assert!(env.storage().get_project_by_path("/work/app").unwrap().is_none());

    // Sessions and issues outlive their project row
    assert_eq!(env.json(&["issues", "list", "--project", "/work/app"])["count"], 2);
}

#[test]
fn test_project_merge() {
    let env = Env::new().seeded();
    env.storage()
        .create_project(&Project::new("/work/app-old", "Old"), ACTOR)
        .unwrap();
    {
        let mut storage = env.storage();
        storage
            .create_issue(&NewIssue::new("/work/app-old", "Legacy bug"), ACTOR)
            .unwrap();
    }

    let merged = env.json(&["projects", "merge", "/work/app-old", "/work/app", "--force"]);
    assert_eq!(merged["counts"]["issues"], 1);
    assert_eq!(env.json(&["projects", "list"])["count"], 1);
    assert_eq!(env.json(&["issues", "list", "--project", "/work/app"])["count"], 3);
}

#[test]
fn test_session_paths_and_archive() {
    let env = Env::new().seeded();
    let id = only_session_id(&env);

    let added = env.json(&["sessions", "paths", "add", &id, "/work/lib"]);
    assert_eq!(added["added"], true);
    let again = env.json(&["sessions", "paths", "add", &id, "/work/lib"]);
    assert_eq!(again["added"], false);

    let filtered = env.json(&["sessions", "list", "--project", "/work/lib"]);
    assert_eq!(filtered["count"], 1);

    let removed = env.json(&["sessions", "paths", "remove", &id, "/work/app"]);
    assert_eq!(removed["result"]["primary_cleared"], true);

    env.json(&["sessions", "paths", "set-primary", &id, "/work/lib"]);
    let shown = env.json(&["sessions", "show", &id]);
    assert_eq!(shown["project_path"], "/work/lib");

    env.json(&["sessions", "archive", &id]);
    let archived = env.json(&["sessions", "list", "--status", "completed"]);
    assert_eq!(archived["count"], 1);
}

#[test]
fn test_session_delete_with_force() {
    let env = Env::new().seeded();
    let id = only_session_id(&env);

    let deleted = env.json(&["sessions", "delete", &id, "--force"]);
    assert_eq!(deleted["deleted"], true);

    let output = env.cmd().args(["sessions", "show", &id]).output().unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(error_code(&output.stderr), "SESSION_NOT_FOUND");
}

#[test]
fn test_issue_queries_accept_short_ids() {
    let env = Env::new().seeded();

    let open = env.json(&["issues", "list", "--status", "todo"]);
    assert_eq!(open["count"], 1);
    assert_eq!(open["issues"][0]["title"], "First");

    let shown = env.json(&["issues", "show", "APP-1"]);
    assert_eq!(shown["title"], "First");
    assert_eq!(shown["children"].as_array().unwrap().len(), 0);

    let output = env.cmd().args(["issues", "list", "--status", "sideways"]).output().unwrap();
    assert_eq!(output.status.code(), Some(4));
}

#[test]
fn test_issue_labels_and_projects() {
    let env = Env::new().seeded();

    let added = env.json(&["issues", "labels", "add", "APP-1", "backend", " api ", "backend"]);
    assert_eq!(added["labels"], serde_json::json!(["api", "backend"]));

    let set = env.json(&["issues", "labels", "set", "APP-1", "urgent"]);
    assert_eq!(set["labels"], serde_json::json!(["urgent"]));

    let all = env.json(&["issues", "labels", "list"]);
    assert_eq!(all["labels"], serde_json::json!(["urgent"]));

    let cleared = env.json(&["issues", "labels", "set", "APP-1"]);
    assert_eq!(cleared["labels"], serde_json::json!([]));

    let linked = env.json(&["issues", "projects", "add", "APP-1", "/work/lib"]);
    assert_eq!(linked["added"], true);
    assert_eq!(env.json(&["issues", "list", "--project", "/work/lib"])["count"], 1);

    let unlinked = env.json(&["issues", "projects", "remove", "APP-1", "/work/lib"]);
    assert_eq!(unlinked["removed"], 1);
}

#[test]
fn test_status_cache_lifecycle() {
    let env = Env::new().seeded();
    let id = only_session_id(&env);

    let empty = env.json(&["status"]);
    assert!(empty["entry"].is_null());

    env.json(&["status", "set", &id]);
    let cache_file: &Path = &env.home.path().join(".savecontext/status-cache/test-terminal.json");
    assert!(cache_file.exists());

    let shown = env.json(&["status", "show"]);
    assert_eq!(shown["entry"]["sessionId"], id.as_str());
    assert_eq!(shown["entry"]["projectPath"], "/work/app");

    let cleared = env.json(&["status", "clear"]);
    assert_eq!(cleared["cleared"], true);
    assert!(!cache_file.exists());
}

#[test]
fn test_completions() {
    let output = Command::cargo_bin("scstore")
        .unwrap()
        .args(["completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("scstore"));
}
