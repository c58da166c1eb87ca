mod common;

use std::path::Path;
use std::sync::Arc;

use common::test_server::TestServer;
use serde_json::Value;
use tempfile::TempDir;

use stevedore::agent::{self, ApiClient, NullProgress};
use stevedore::digest;

fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
    for (path, data) in files {
        let full = root.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, data).unwrap();
    }
}

fn pseudo_random_bytes(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| ((i as u64 * 31 + seed as u64 * 7 + (i >> 8) as u64) % 251) as u8)
        .collect()
}

fn client(server: &TestServer) -> ApiClient {
    ApiClient::new(&server.base_url, &server.admin_token).unwrap()
}

async fn push_dir(
    server: &TestServer,
    project: &str,
    app: &str,
    version: &str,
    dir: &Path,
    ignore: &[String],
) {
    let client = client(server);
    agent::push(
        &client,
        project,
        app,
        version,
        dir,
        ignore,
        8,
        Arc::new(NullProgress),
    )
    .await
    .unwrap();
}

async fn pull_dir(server: &TestServer, project: &str, app: &str, version: &str, dest: &Path) {
    let client = client(server);
    agent::pull(&client, project, app, version, dest, 8, Arc::new(NullProgress))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_push_then_pull_round_trip() {
    let server = TestServer::start().await;

    let src = TempDir::new().unwrap();
    let b_bin = pseudo_random_bytes(4096, 1);
    write_tree(src.path(), &[("a.txt", b"hello"), ("sub/b.bin", &b_bin)]);

    push_dir(&server, "p1", "a1", "v1", src.path(), &[]).await;

    let dest = TempDir::new().unwrap();
    pull_dir(&server, "p1", "a1", "v1", dest.path()).await;

    assert_eq!(std::fs::read(dest.path().join("a.txt")).unwrap(), b"hello");
    assert_eq!(std::fs::read(dest.path().join("sub/b.bin")).unwrap(), b_bin);

    let (src_digest, _) = digest::digest_file(&src.path().join("sub/b.bin"))
        .await
        .unwrap();
    let (dest_digest, _) = digest::digest_file(&dest.path().join("sub/b.bin"))
        .await
        .unwrap();
    assert_eq!(src_digest, dest_digest);
}

#[tokio::test]
async fn test_pull_skips_matching_files() {
    let server = TestServer::start().await;

    let src = TempDir::new().unwrap();
    write_tree(src.path(), &[("a.txt", b"hello"), ("b.txt", b"world")]);
    push_dir(&server, "p1", "a1", "v1", src.path(), &[]).await;

    let dest = TempDir::new().unwrap();
    pull_dir(&server, "p1", "a1", "v1", dest.path()).await;

    let mtime_before = std::fs::metadata(dest.path().join("a.txt"))
        .unwrap()
        .modified()
        .unwrap();

    // Matching files are skipped: a second pull leaves them untouched.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    pull_dir(&server, "p1", "a1", "v1", dest.path()).await;

    let mtime_after = std::fs::metadata(dest.path().join("a.txt"))
        .unwrap()
        .modified()
        .unwrap();
    assert_eq!(mtime_before, mtime_after);
}

#[tokio::test]
async fn test_pull_resumes_partial_file() {
    let server = TestServer::start().await;

    let big = pseudo_random_bytes(3 * 1024 * 1024, 2);
    let src = TempDir::new().unwrap();
    write_tree(src.path(), &[("big.bin", &big)]);
    push_dir(&server, "p1", "a1", "v1", src.path(), &[]).await;

    // Seed the destination with the first 1 MiB.
    let dest = TempDir::new().unwrap();
    std::fs::write(dest.path().join("big.bin"), &big[..1024 * 1024]).unwrap();

    pull_dir(&server, "p1", "a1", "v1", dest.path()).await;

    let pulled = std::fs::read(dest.path().join("big.bin")).unwrap();
    assert_eq!(pulled.len(), big.len());
    assert_eq!(digest::digest_bytes(&pulled), digest::digest_bytes(&big));
}

#[tokio::test]
async fn test_pull_replaces_corrupt_file() {
    let server = TestServer::start().await;

    let src = TempDir::new().unwrap();
    write_tree(src.path(), &[("a.txt", b"hello")]);
    push_dir(&server, "p1", "a1", "v1", src.path(), &[]).await;

    let dest = TempDir::new().unwrap();
    // Same length, wrong content.
    std::fs::write(dest.path().join("a.txt"), b"jello").unwrap();

    pull_dir(&server, "p1", "a1", "v1", dest.path()).await;
    assert_eq!(std::fs::read(dest.path().join("a.txt")).unwrap(), b"hello");
}

#[tokio::test]
async fn test_ignore_patterns_on_push() {
    let server = TestServer::start().await;

    let src = TempDir::new().unwrap();
    write_tree(
        src.path(),
        &[
            ("node_modules/x.js", b"x".as_slice()),
            ("build/app.log", b"log".as_slice()),
            ("src/main.go", b"package main".as_slice()),
        ],
    );

    let ignore = vec!["node_modules/**".to_string(), "*.log".to_string()];
    push_dir(&server, "p1", "a1", "v1", src.path(), &ignore).await;

    let manifest = client(&server).get_manifest("p1", "a1", "v1").await.unwrap();
    let paths: Vec<&str> = manifest.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["src/main.go"]);
}

#[tokio::test]
async fn test_publish_and_latest() {
    let server = TestServer::start().await;
    let api = client(&server);

    let src = TempDir::new().unwrap();
    write_tree(src.path(), &[("a.txt", b"one")]);
    push_dir(&server, "p1", "a1", "v1", src.path(), &[]).await;
    write_tree(src.path(), &[("a.txt", b"two")]);
    push_dir(&server, "p1", "a1", "v2", src.path(), &[]).await;

    // Nothing published yet.
    assert!(api.latest_version("p1", "a1").await.is_err());

    api.publish("p1", "a1", "v1").await.unwrap();
    assert_eq!(api.latest_version("p1", "a1").await.unwrap().version, "v1");

    // Publishing v2 implicitly unpublishes v1.
    api.publish("p1", "a1", "v2").await.unwrap();
    assert_eq!(api.latest_version("p1", "a1").await.unwrap().version, "v2");

    api.unpublish("p1", "a1", "v2").await.unwrap();
    assert!(api.latest_version("p1", "a1").await.is_err());
}

#[tokio::test]
async fn test_publish_requires_existing_version() {
    let server = TestServer::start().await;
    let api = client(&server);

    let src = TempDir::new().unwrap();
    write_tree(src.path(), &[("a.txt", b"one")]);
    push_dir(&server, "p1", "a1", "v1", src.path(), &[]).await;

    assert!(api.publish("p1", "a1", "ghost").await.is_err());
}

#[tokio::test]
async fn test_reupload_overwrites_version() {
    let server = TestServer::start().await;
    let api = client(&server);

    let src = TempDir::new().unwrap();
    write_tree(src.path(), &[("old.txt", b"old")]);
    push_dir(&server, "p1", "a1", "v1", src.path(), &[]).await;

    // Re-push the same version with a different tree.
    let src2 = TempDir::new().unwrap();
    write_tree(src2.path(), &[("new.txt", b"new")]);
    push_dir(&server, "p1", "a1", "v1", src2.path(), &[]).await;

    let manifest = api.get_manifest("p1", "a1", "v1").await.unwrap();
    let paths: Vec<&str> = manifest.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["new.txt"]);

    // The prior version's blobs were discarded at upload-init.
    assert!(!api.file_exists("p1", "a1", "v1", "old.txt").await.unwrap());
    assert!(api.file_exists("p1", "a1", "v1", "new.txt").await.unwrap());
}

#[tokio::test]
async fn test_range_requests() {
    let server = TestServer::start().await;

    let src = TempDir::new().unwrap();
    write_tree(src.path(), &[("data.bin", b"0123456789")]);
    push_dir(&server, "p1", "a1", "v1", src.path(), &[]).await;

    let http = reqwest::Client::new();
    let url = format!("{}/api/v1/file/p1/a1/v1", server.base_url);

    let resp = http
        .get(&url)
        .query(&[("path", "data.bin")])
        .bearer_auth(&server.admin_token)
        .header("Range", "bytes=4-")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 206);
    assert_eq!(
        resp.headers().get("Content-Range").unwrap(),
        "bytes 4-9/10"
    );
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"456789");

    let resp = http
        .get(&url)
        .query(&[("path", "data.bin")])
        .bearer_auth(&server.admin_token)
        .header("Range", "bytes=2-5")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 206);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"2345");

    // start == size is not satisfiable.
    let resp = http
        .get(&url)
        .query(&[("path", "data.bin")])
        .bearer_auth(&server.admin_token)
        .header("Range", "bytes=10-")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 416);

    // Plain GET advertises range support.
    let resp = http
        .get(&url)
        .query(&[("path", "data.bin")])
        .bearer_auth(&server.admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.headers().get("Accept-Ranges").unwrap(), "bytes");
}

#[tokio::test]
async fn test_auth_required() {
    let server = TestServer::start().await;

    let http = reqwest::Client::new();
    let resp = http
        .get(format!("{}/api/v1/manifest/p1/a1/v1", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    let resp = http
        .get(format!("{}/api/v1/manifest/p1/a1/v1", server.base_url))
        .bearer_auth("stv_00000000_000000000000000000000000")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    // Health stays open.
    let resp = http
        .get(format!("{}/health", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
}

#[tokio::test]
async fn test_delete_version_cascade() {
    let server = TestServer::start().await;
    let api = client(&server);

    let src = TempDir::new().unwrap();
    write_tree(src.path(), &[("a.txt", b"one")]);
    push_dir(&server, "p1", "a1", "v1", src.path(), &[]).await;

    let http = reqwest::Client::new();
    let resp = http
        .delete(format!(
            "{}/api/v1/projects/p1/apps/a1/versions/v1",
            server.base_url
        ))
        .bearer_auth(&server.admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    assert!(api.get_manifest("p1", "a1", "v1").await.is_err());
    assert!(!server.artifacts_dir().join("p1/a1/v1").exists());

    // Deleting the project removes the whole subtree.
    let resp = http
        .delete(format!("{}/api/v1/projects/p1", server.base_url))
        .bearer_auth(&server.admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert!(!server.artifacts_dir().join("p1").exists());
}

#[tokio::test]
async fn test_retention_keeps_newest_versions() {
    let server = TestServer::start().await;
    let api = client(&server);

    let output = server.run_admin(&["admin", "config", "set", "version_retention_limit", "3"]);
    assert!(output.status.success());

    let src = TempDir::new().unwrap();
    for v in ["v1", "v2", "v3", "v4", "v5"] {
        write_tree(src.path(), &[("a.txt", v.as_bytes())]);
        push_dir(&server, "p1", "a1", v, src.path(), &[]).await;
    }

    let output = server.run_admin(&["admin", "maintenance"]);
    assert!(output.status.success());

    for v in ["v1", "v2"] {
        assert!(api.get_manifest("p1", "a1", v).await.is_err());
        assert!(!server.artifacts_dir().join("p1/a1").join(v).exists());
    }
    for v in ["v3", "v4", "v5"] {
        assert!(api.get_manifest("p1", "a1", v).await.is_ok());
        assert!(server.artifacts_dir().join("p1/a1").join(v).exists());
    }
}

#[tokio::test]
async fn test_maintenance_removes_incomplete_versions() {
    let server = TestServer::start().await;
    let api = client(&server);

    let src = TempDir::new().unwrap();
    write_tree(src.path(), &[("a.txt", b"good")]);
    push_dir(&server, "p1", "a1", "v1", src.path(), &[]).await;

    // A version directory without a manifest is an interrupted upload.
    let half_done = server.artifacts_dir().join("p1/a1/half-done");
    std::fs::create_dir_all(&half_done).unwrap();
    std::fs::write(half_done.join("file.bin"), b"partial").unwrap();

    let output = server.run_admin(&["admin", "maintenance"]);
    assert!(output.status.success());

    assert!(api.get_manifest("p1", "a1", "v1").await.is_ok());
    assert!(!half_done.exists());
}

#[tokio::test]
async fn test_sync_storage_is_idempotent() {
    let server = TestServer::start().await;
    let api = client(&server);

    let src = TempDir::new().unwrap();
    write_tree(src.path(), &[("a.txt", b"one")]);
    push_dir(&server, "p1", "a1", "v1", src.path(), &[]).await;
    push_dir(&server, "p1", "a1", "v2", src.path(), &[]).await;

    // Remove one version behind the server's back.
    std::fs::remove_dir_all(server.artifacts_dir().join("p1/a1/v1")).unwrap();

    let http = reqwest::Client::new();
    let sync_url = format!("{}/api/v1/sync-storage", server.base_url);

    let first: Value = http
        .post(&sync_url)
        .bearer_auth(&server.admin_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let second: Value = http
        .post(&sync_url)
        .bearer_auth(&server.admin_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // Running twice on an unchanged tree produces the same state.
    assert_eq!(first, second);

    // v2 survived the reconcile; the publish flow still sees it.
    api.publish("p1", "a1", "v2").await.unwrap();
    assert_eq!(api.latest_version("p1", "a1").await.unwrap().version, "v2");

    // v1 has no storage presence and no longer publishes.
    assert!(api.publish("p1", "a1", "v1").await.is_err());
}

#[tokio::test]
async fn test_webhook_fanout_on_push() {
    let server = TestServer::start().await;

    // One-shot webhook receiver.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let hook_port = listener.local_addr().unwrap().port();
    let receiver = std::thread::spawn(move || -> String {
        use std::io::{Read, Write};
        let (mut socket, _) = listener.accept().unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let body_start;
        loop {
            let n = socket.read(&mut chunk).unwrap();
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                body_start = pos + 4;
                break;
            }
        }
        let headers = String::from_utf8_lossy(&buf[..body_start]).to_string();
        let content_length: usize = headers
            .lines()
            .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(str::trim).map(String::from))
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        while buf.len() - body_start < content_length {
            let n = socket.read(&mut chunk).unwrap();
            buf.extend_from_slice(&chunk[..n]);
        }
        socket
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
            .unwrap();
        String::from_utf8_lossy(&buf[body_start..body_start + content_length]).to_string()
    });

    let output = server.run_admin(&[
        "admin",
        "webhook",
        "create",
        "--name",
        "ci",
        "--url",
        &format!("http://127.0.0.1:{hook_port}/hook"),
        "--events",
        "push",
    ]);
    assert!(output.status.success());

    let src = TempDir::new().unwrap();
    write_tree(src.path(), &[("a.txt", b"hello")]);
    push_dir(&server, "p1", "a1", "v1", src.path(), &[]).await;

    let body = tokio::task::spawn_blocking(move || receiver.join().unwrap())
        .await
        .unwrap();
    let event: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(event["type"], "push");
    assert_eq!(event["project"], "p1");
    assert_eq!(event["app"], "a1");
    assert_eq!(event["version"], "v1");
    assert_eq!(event["metadata"]["file_count"], 1);
}

#[tokio::test]
async fn test_empty_manifest_push() {
    let server = TestServer::start().await;
    let api = client(&server);

    let src = TempDir::new().unwrap();
    push_dir(&server, "p1", "a1", "v1", src.path(), &[]).await;

    let manifest = api.get_manifest("p1", "a1", "v1").await.unwrap();
    assert!(manifest.files.is_empty());
    api.publish("p1", "a1", "v1").await.unwrap();
}
