//! End-to-end router tests against fake toolset binaries
//!
//! Each test builds the real router over a `GridClient` whose PATH points
//! at a tempdir of shell scripts standing in for the Gfarm tools.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use gfarm_api::{create_router, ApiState};
use gfarm_grid::{GridClient, GridConfig};
use gfarm_lock::{DistributedLock, LockConfig, MemoryLockStore};

fn install_tool(dir: &TempDir, name: &str, body: &str) {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "#!/bin/sh\n{body}").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn router_with(dir: &TempDir, lock: Option<Arc<DistributedLock>>, allow_anonymous: bool) -> Router {
    let grid = Arc::new(GridClient::new(GridConfig {
        tool_path: dir.path().display().to_string(),
        helper_script: None,
    }));
    create_router(ApiState::new(grid, lock, allow_anonymous))
}

fn basic_auth() -> String {
    format!("Basic {}", STANDARD.encode("user1:secret"))
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[tokio::test]
async fn test_dir_list_ok() {
    let dir = TempDir::new().unwrap();
    install_tool(&dir, "gfls", "echo \"listing of $2\"");
    let router = router_with(&dir, None, false);

    let response = router
        .oneshot(
            Request::get("/dir/testdir")
                .header(header::AUTHORIZATION, basic_auth())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "listing of /testdir\n");
}

#[tokio::test]
async fn test_dir_list_aliases() {
    let dir = TempDir::new().unwrap();
    install_tool(&dir, "gfls", "echo ok");
    let router = router_with(&dir, None, true);

    for path in ["/d/x", "/dir/x", "/directories/x", "/d", "/dir"] {
        let response = router
            .clone()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "alias {path}");
    }
}

#[tokio::test]
async fn test_dir_list_hidden_flag() {
    let dir = TempDir::new().unwrap();
    install_tool(&dir, "gfls", "echo \"$@\"");
    let router = router_with(&dir, None, true);

    let response = router
        .oneshot(Request::get("/dir/testdir?a=1").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(body_text(response).await, "-l -a /testdir\n");
}

#[tokio::test]
async fn test_dir_list_recursive_flag() {
    let dir = TempDir::new().unwrap();
    install_tool(&dir, "gfls", "echo \"$@\"");
    let router = router_with(&dir, None, true);

    let response = router
        .oneshot(Request::get("/dir/testdir?R=1").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(body_text(response).await, "-l -R /testdir\n");
}

#[tokio::test]
async fn test_dir_list_tool_failure_is_500_with_detail() {
    let dir = TempDir::new().unwrap();
    install_tool(&dir, "gfls", "echo 'no such directory' >&2; exit 1");
    let router = router_with(&dir, None, true);

    let response = router
        .oneshot(Request::get("/dir/missing").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["detail"], "no such directory");
}

#[tokio::test]
async fn test_dir_list_ignore_errors() {
    let dir = TempDir::new().unwrap();
    install_tool(&dir, "gfls", "echo 'partial output'; exit 1");
    let router = router_with(&dir, None, true);

    let response = router
        .oneshot(
            Request::get("/dir/flaky?ign_err=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "partial output\n");
}

#[tokio::test]
async fn test_malformed_credentials_are_403_and_spawn_nothing() {
    let dir = TempDir::new().unwrap();
    // Any tool invocation would leave a marker file.
    install_tool(&dir, "gfls", "touch \"$(dirname \"$0\")/spawned\"");
    let router = router_with(&dir, None, true);

    let response = router
        .oneshot(
            Request::get("/dir/testdir")
                .header(header::AUTHORIZATION, "Digest abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(!dir.path().join("spawned").exists());
}

#[tokio::test]
async fn test_anonymous_disabled_is_401() {
    let dir = TempDir::new().unwrap();
    install_tool(&dir, "gfls", "echo ok");
    let router = router_with(&dir, None, false);

    let response = router
        .oneshot(Request::get("/dir/testdir").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_dir_create_ok() {
    let dir = TempDir::new().unwrap();
    install_tool(
        &dir,
        "gfmkdir",
        "[ \"$1\" = \"/testdir\" ] || { echo \"wrong arg $1\" >&2; exit 1; }",
    );
    let router = router_with(&dir, None, true);

    let response = router
        .oneshot(Request::put("/dir/testdir").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "");
}

#[tokio::test]
async fn test_dir_create_holds_the_lease() {
    let dir = TempDir::new().unwrap();
    install_tool(&dir, "gfmkdir", "exit 0");

    let store = Arc::new(MemoryLockStore::new());
    let lock = Arc::new(DistributedLock::new(
        store,
        LockConfig {
            retry_count: 1,
            retry_interval: Duration::from_millis(5),
            ..Default::default()
        },
    ));

    // A competing instance already holds the lease for this path.
    let held = lock.acquire("/testdir").await.unwrap();

    let router = router_with(&dir, Some(lock.clone()), true);
    let response = router
        .clone()
        .oneshot(Request::put("/dir/testdir").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // Once released, creation goes through and releases its own lease.
    assert!(lock.release(&held).await);
    let response = router
        .oneshot(Request::put("/dir/testdir").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(lock.acquire("/testdir").await.is_ok());
}

const STAT_LINE: &str = "echo \"12345 -rw-rw-r-- 1 user1 group1 16 Jan 1 00:00:00 2022 hello.txt\"";

#[tokio::test]
async fn test_file_export_streams_with_headers() {
    let dir = TempDir::new().unwrap();
    install_tool(&dir, "gfls", STAT_LINE);
    install_tool(&dir, "gfexport", "printf 'hello grid world!'");
    let router = router_with(&dir, None, true);

    let response = router
        .oneshot(Request::get("/files/hello.txt").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain"
    );
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "16");
    assert_eq!(body_text(response).await, "hello grid world!");
}

#[tokio::test]
async fn test_file_export_directory_is_415() {
    let dir = TempDir::new().unwrap();
    install_tool(
        &dir,
        "gfls",
        "echo \"99 drwxr-xr-x 2 u g 0 Dec 31 23:59:59 2021 somedir\"",
    );
    install_tool(&dir, "gfexport", "touch \"$(dirname \"$0\")/spawned\"");
    let router = router_with(&dir, None, true);

    let response = router
        .oneshot(Request::get("/files/somedir").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(!dir.path().join("spawned").exists());
}

#[tokio::test]
async fn test_file_export_unknown_size_is_415() {
    let dir = TempDir::new().unwrap();
    install_tool(&dir, "gfls", "echo 'gfls: no such object'; exit 1");
    install_tool(&dir, "gfexport", "touch \"$(dirname \"$0\")/spawned\"");
    let router = router_with(&dir, None, true);

    let response = router
        .oneshot(Request::get("/files/ghost").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(!dir.path().join("spawned").exists());
}

#[tokio::test]
async fn test_file_export_empty_file_is_204_without_transfer() {
    let dir = TempDir::new().unwrap();
    install_tool(
        &dir,
        "gfls",
        "echo \"12345 -rw-rw-r-- 1 u g 0 Jan 1 00:00:00 2022 empty\"",
    );
    install_tool(&dir, "gfexport", "touch \"$(dirname \"$0\")/spawned\"");
    let router = router_with(&dir, None, true);

    let response = router
        .oneshot(Request::get("/files/empty").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    // A zero-byte file never initiates a transfer invocation.
    assert!(!dir.path().join("spawned").exists());
}

#[tokio::test]
async fn test_file_export_unreadable_is_500() {
    let dir = TempDir::new().unwrap();
    install_tool(&dir, "gfls", STAT_LINE);
    install_tool(&dir, "gfexport", "echo 'permission denied' >&2; exit 2");
    let router = router_with(&dir, None, true);

    let response = router
        .oneshot(Request::get("/files/hello.txt").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(response).await.contains("permission denied"));
}

#[tokio::test]
async fn test_whoami() {
    let dir = TempDir::new().unwrap();
    install_tool(&dir, "gfwhoami", "printf 'testuser'");
    let router = router_with(&dir, None, false);

    for path in ["/conf/me", "/c/me"] {
        let response = router
            .clone()
            .oneshot(
                Request::get(path)
                    .header(header::AUTHORIZATION, basic_auth())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "testuser");
    }
}

#[tokio::test]
async fn test_whoami_bearer_token_env() {
    let dir = TempDir::new().unwrap();
    install_tool(
        &dir,
        "gfwhoami",
        "printf '%s' \"$GFARM_SASL_MECHANISMS\"",
    );
    let router = router_with(&dir, None, false);

    let response = router
        .oneshot(
            Request::get("/conf/me")
                .header(header::AUTHORIZATION, "Bearer some-opaque-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "XOAUTH2");
}

#[tokio::test]
async fn test_health() {
    let dir = TempDir::new().unwrap();
    let router = router_with(&dir, None, false);

    let response = router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["status"], "healthy");
}
