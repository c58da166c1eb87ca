//! CLI-level tests: drive the binary the way an operator or CI job would.

mod common;

use assert_cmd::Command;
use assert_fs::TempDir;
use common::test_server::{TestServer, binary_path};
use predicates::prelude::*;

fn cmd() -> Command {
    Command::new(binary_path())
}

#[test]
fn test_admin_init_creates_admin_token() {
    let data_dir = TempDir::new().unwrap();

    cmd()
        .args(["admin", "init", "--non-interactive", "--data-dir"])
        .arg(data_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Admin token"));

    let token = std::fs::read_to_string(data_dir.path().join(".admin_token")).unwrap();
    assert!(token.trim().starts_with("stv_"));

    // Re-initializing is refused.
    cmd()
        .args(["admin", "init", "--non-interactive", "--data-dir"])
        .arg(data_dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("already initialized"));
}

#[test]
fn test_serve_requires_init() {
    let data_dir = TempDir::new().unwrap();

    cmd()
        .args(["serve", "--data-dir"])
        .arg(data_dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

#[test]
fn test_token_lifecycle() {
    let data_dir = TempDir::new().unwrap();

    cmd()
        .args(["admin", "init", "--non-interactive", "--data-dir"])
        .arg(data_dir.path())
        .assert()
        .success();

    let output = cmd()
        .args([
            "admin",
            "token",
            "create",
            "--name",
            "ci",
            "--permissions",
            "pull,push",
            "--data-dir",
        ])
        .arg(data_dir.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("stv_"));

    let id = stdout
        .lines()
        .find_map(|l| l.trim().strip_prefix("id:"))
        .map(|v| v.trim().to_string())
        .expect("token id in output");

    cmd()
        .args(["admin", "token", "list", "--data-dir"])
        .arg(data_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("ci"))
        .stdout(predicate::str::contains("pull,push"));

    cmd()
        .args(["admin", "token", "revoke", "--data-dir"])
        .arg(data_dir.path())
        .arg(&id)
        .assert()
        .success();

    cmd()
        .args(["admin", "token", "list", "--data-dir"])
        .arg(data_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("ci").not());
}

#[test]
fn test_config_commands() {
    let data_dir = TempDir::new().unwrap();

    cmd()
        .args(["admin", "init", "--non-interactive", "--data-dir"])
        .arg(data_dir.path())
        .assert()
        .success();

    // Defaults are seeded at init.
    cmd()
        .args(["admin", "config", "get", "version_retention_limit", "--data-dir"])
        .arg(data_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("10"));

    cmd()
        .args(["admin", "config", "set", "version_retention_limit", "5", "--data-dir"])
        .arg(data_dir.path())
        .assert()
        .success();

    cmd()
        .args(["admin", "config", "list", "--data-dir"])
        .arg(data_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("version_retention_limit = 5"))
        .stdout(predicate::str::contains("audit_log_retention_days = 90"));
}

#[tokio::test]
async fn test_push_pull_via_cli() {
    let server = TestServer::start().await;

    let src = TempDir::new().unwrap();
    std::fs::create_dir_all(src.path().join("sub")).unwrap();
    std::fs::write(src.path().join("a.txt"), b"hello cli").unwrap();
    std::fs::write(src.path().join("sub/b.txt"), b"nested").unwrap();
    std::fs::write(src.path().join("skip.log"), b"noise").unwrap();

    let push = tokio::task::spawn_blocking({
        let base_url = server.base_url.clone();
        let token = server.admin_token.clone();
        let src = src.path().to_path_buf();
        move || {
            cmd()
                .args(["push", "--project", "p1", "--app", "a1", "--version", "v1"])
                .args(["--server-url", &base_url])
                .args(["--token", &token])
                .args(["--ignore", "*.log"])
                .arg("--path")
                .arg(&src)
                .output()
                .unwrap()
        }
    })
    .await
    .unwrap();
    assert!(
        push.status.success(),
        "push failed: {}",
        String::from_utf8_lossy(&push.stderr)
    );

    let dest = TempDir::new().unwrap();
    let pull = tokio::task::spawn_blocking({
        let base_url = server.base_url.clone();
        let token = server.admin_token.clone();
        let dest = dest.path().to_path_buf();
        move || {
            cmd()
                .args(["pull", "--project", "p1", "--app", "a1", "--version", "v1"])
                .args(["--server-url", &base_url])
                .args(["--token", &token])
                .arg("--path")
                .arg(&dest)
                .output()
                .unwrap()
        }
    })
    .await
    .unwrap();
    assert!(
        pull.status.success(),
        "pull failed: {}",
        String::from_utf8_lossy(&pull.stderr)
    );

    assert_eq!(
        std::fs::read(dest.path().join("a.txt")).unwrap(),
        b"hello cli"
    );
    assert_eq!(
        std::fs::read(dest.path().join("sub/b.txt")).unwrap(),
        b"nested"
    );
    assert!(!dest.path().join("skip.log").exists());
}

#[tokio::test]
async fn test_publish_via_cli_resolves_latest_pull() {
    let server = TestServer::start().await;

    let src = TempDir::new().unwrap();
    std::fs::write(src.path().join("a.txt"), b"published").unwrap();

    let run = |args: Vec<String>| {
        tokio::task::spawn_blocking(move || {
            let mut command = cmd();
            for arg in &args {
                command.arg(arg);
            }
            command.output().unwrap()
        })
    };

    let push_args: Vec<String> = [
        "push", "--project", "p1", "--app", "a1", "--version", "v1",
        "--server-url", server.base_url.as_str(), "--token", server.admin_token.as_str(),
        "--path", src.path().to_str().unwrap(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    assert!(run(push_args).await.unwrap().status.success());

    let publish_args: Vec<String> = [
        "publish", "--project", "p1", "--app", "a1", "--version", "v1",
        "--server-url", server.base_url.as_str(), "--token", server.admin_token.as_str(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let publish = run(publish_args).await.unwrap();
    assert!(
        publish.status.success(),
        "publish failed: {}",
        String::from_utf8_lossy(&publish.stderr)
    );

    // `pull --version latest` resolves the published version.
    let dest = TempDir::new().unwrap();
    let pull_args: Vec<String> = [
        "pull", "--project", "p1", "--app", "a1", "--version", "latest",
        "--server-url", server.base_url.as_str(), "--token", server.admin_token.as_str(),
        "--path", dest.path().to_str().unwrap(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    assert!(run(pull_args).await.unwrap().status.success());

    assert_eq!(
        std::fs::read(dest.path().join("a.txt")).unwrap(),
        b"published"
    );
}
