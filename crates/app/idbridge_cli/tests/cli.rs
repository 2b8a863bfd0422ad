//! End-to-end tests for the `idbridge` binary against a file-backed
//! SQLite control plane.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

struct Workspace {
    _dir: TempDir,
    database_url: String,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let database_url = format!("sqlite://{}?mode=rwc", dir.path().join("cp.db").display());
        Self {
            _dir: dir,
            database_url,
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("idbridge").unwrap();
        cmd.env_remove("CREDENTIAL_ENCRYPTION_KEY")
            .env("RUST_LOG", "warn")
            .arg("--database-url")
            .arg(&self.database_url);
        cmd
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self.cmd().args(args).assert().success().get_output().stdout.clone();
        serde_json::from_slice(&output).expect("stdout is JSON")
    }

    fn add_tenant(&self) -> (String, String) {
        let out = self.json(&[
            "connect",
            "add",
            "--name",
            "shop",
            "--app-name",
            "Shop",
            "--endpoint",
            "sqlite::memory:",
        ]);
        (
            out["id"].as_str().unwrap().to_string(),
            out["apiKey"].as_str().unwrap().to_string(),
        )
    }
}

#[test]
fn version_prints_package() {
    Command::cargo_bin("idbridge")
        .unwrap()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("idbridge_cli"));
}

#[test]
fn migrate_is_idempotent() {
    let ws = Workspace::new();
    ws.cmd().arg("migrate").assert().success();
    ws.cmd().arg("migrate").assert().success();
}

#[test]
fn tenants_can_be_added_rotated_and_deactivated() {
    let ws = Workspace::new();
    let (id, key) = ws.add_tenant();
    assert!(key.starts_with("idb_"));

    let listed = ws.json(&["connect", "list"]);
    assert_eq!(listed[0]["id"], id.as_str());
    assert_eq!(listed[0]["tableName"], "users");
    assert!(listed[0].get("credentialEncrypted").is_none());

    let rotated = ws.json(&["connect", "rotate-key", &id]);
    assert_ne!(rotated["apiKey"].as_str().unwrap(), key);

    ws.cmd().args(["connect", "deactivate", id.as_str()]).assert().success();
    ws.cmd()
        .args(["connect", "deactivate", id.as_str()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no active tenant"));
}

#[test]
fn credentials_need_an_encryption_key() {
    let ws = Workspace::new();
    ws.cmd()
        .args([
            "connect",
            "add",
            "--name",
            "shop",
            "--app-name",
            "Shop",
            "--endpoint",
            "postgres://app@db.example.com/shop",
            "--credential",
            "s3cret",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("encryption key"));

    let listed = ws.json(&["connect", "list"]);
    assert_eq!(listed.as_array().unwrap().len(), 0);
}

#[test]
fn bans_round_trip_through_the_cli() {
    let ws = Workspace::new();
    let (id, _) = ws.add_tenant();

    let ban = ws.json(&[
        "ban",
        &id,
        "u-42",
        "--reason",
        "spam",
        "--type",
        "temporary",
        "--hours",
        "2",
    ]);
    assert_eq!(ban["banType"], "temporary");
    assert_eq!(ban["bannedBy"], "cli");

    let status = ws.json(&["check-ban", &id, "u-42"]);
    assert_eq!(status["banned"], true);

    let lifted = ws.json(&["unban", &id, "u-42"]);
    assert_eq!(lifted["lifted"], true);

    let status = ws.json(&["check-ban", &id, "u-42"]);
    assert_eq!(status["banned"], false);

    ws.cmd()
        .args(["ban", id.as_str(), "u-42", "--reason", "x", "--type", "temporary"])
        .assert()
        .failure();
}

#[test]
fn schema_commands_reach_the_tenant_database() {
    let ws = Workspace::new();
    let (id, _) = ws.add_tenant();

    let overview = ws.json(&["schema", "overview", &id]);
    assert_eq!(overview["tables"].as_array().unwrap().len(), 0);

    ws.cmd()
        .args(["schema", "detect", id.as_str()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Table not found"));
}

#[test]
fn purge_reports_count() {
    let ws = Workspace::new();
    let out = ws.json(&["tokens", "purge", "--older-than-hours", "0"]);
    assert_eq!(out["purged"], 0);
}

#[test]
fn operator_actions_show_up_in_the_audit_trail() {
    let ws = Workspace::new();
    let (id, _) = ws.add_tenant();
    let (other, _) = ws.add_tenant();

    ws.json(&["ban", &id, "u-7", "--reason", "spam"]);
    ws.json(&["unban", &id, "u-7"]);
    // Nothing to lift, nothing recorded.
    ws.json(&["unban", &id, "u-7"]);

    let events = ws.json(&["audit", "--database-id", &id]);
    let actions: Vec<&str> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions.len(), 3);
    for expected in ["tenant.register", "ban.create", "ban.lift"] {
        assert!(actions.contains(&expected), "{actions:?}");
    }
    assert!(events.as_array().unwrap().iter().all(|e| e["actor"] == "cli"));
    assert_eq!(events[0]["databaseId"], id.as_str());

    let all = ws.json(&["audit"]);
    assert_eq!(all.as_array().unwrap().len(), 4);
    let limited = ws.json(&["audit", "--limit", "1"]);
    assert_eq!(limited.as_array().unwrap().len(), 1);

    let scoped = ws.json(&["audit", "--database-id", &other]);
    assert_eq!(scoped[0]["action"], "tenant.register");
}
