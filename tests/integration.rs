use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;

use beamdrop::stats::{BroadcastSettings, StatsBroadcaster, StatsStore};
use beamdrop::storage::{FileOperations, SharedRoot};
use beamdrop::{AppState, router};
use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

struct TestServer {
    addr: SocketAddr,
    dir: TempDir,
    stats: Arc<StatsStore>,
    shutdown: CancellationToken,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let root = SharedRoot::new(dir.path()).unwrap();
        let stats = Arc::new(StatsStore::in_memory());
        stats.initialize().unwrap();

        let shutdown = CancellationToken::new();
        let broadcaster = StatsBroadcaster::new(
            Arc::clone(&stats),
            root.path().to_path_buf(),
            BroadcastSettings::default(),
            shutdown.clone(),
        );
        let state = AppState::new(FileOperations::new(root, Arc::clone(&stats)), broadcaster);
        let app = router(state, None);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
                .unwrap();
        });

        Self {
            addr,
            dir,
            stats,
            shutdown,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = self.client.get(self.url(path)).send().await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[tokio::test]
async fn health_and_readiness() {
    let server = TestServer::start().await;

    let (status, body) = server.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "healthy", "service": "beamdrop" }));

    let (status, body) = server.get("/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["checks"]["database"], "ok");
    assert_eq!(body["checks"]["shared_directory"], "ok");
}

#[tokio::test]
async fn lists_directories_before_files() {
    let server = TestServer::start().await;
    fs::write(server.dir.path().join("a.txt"), "hello").unwrap();
    fs::create_dir(server.dir.path().join("zdir")).unwrap();

    let (status, body) = server.get("/files").await;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["name"], "zdir");
    assert_eq!(entries[0]["isDir"], true);
    assert_eq!(entries[1]["name"], "a.txt");
    assert_eq!(entries[1]["path"], "a.txt");
    assert_eq!(entries[1]["size"], "5 B");
    assert_eq!(entries[1]["isStarred"], false);
}

#[tokio::test]
async fn listing_a_file_returns_its_bytes() {
    let server = TestServer::start().await;
    fs::write(server.dir.path().join("note.txt"), "raw contents").unwrap();

    let response = server
        .client
        .get(server.url("/files?path=note.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "raw contents");
}

#[tokio::test]
async fn traversal_is_rejected() {
    let server = TestServer::start().await;

    let (status, body) = server.get("/files?path=../../etc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid"));

    let (status, _) = server.get("/download?file=../secret.txt").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server
        .post("/write", json!({ "filePath": "../escape.txt", "content": "x" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!server.dir.path().parent().unwrap().join("escape.txt").exists());
}

#[tokio::test]
async fn upload_then_download_counts_both() {
    let server = TestServer::start().await;
    fs::create_dir(server.dir.path().join("docs")).unwrap();

    let form = Form::new().part(
        "file",
        Part::bytes(b"uploaded body".to_vec()).file_name("hello.txt"),
    );
    let response = server
        .client
        .post(server.url("/upload?path=docs"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["file"], "docs/hello.txt");
    assert_eq!(
        fs::read_to_string(server.dir.path().join("docs/hello.txt")).unwrap(),
        "uploaded body"
    );
    assert_eq!(server.stats.get_stats().unwrap().uploads, 1);

    let response = server
        .client
        .get(server.url("/download?file=docs/hello.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(disposition, "attachment; filename=\"hello.txt\"");
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"uploaded body");
    assert_eq!(server.stats.get_stats().unwrap().downloads, 1);
}

#[tokio::test]
async fn upload_accepts_repeated_files_field() {
    let server = TestServer::start().await;

    let form = Form::new()
        .part("files", Part::bytes(b"one".to_vec()).file_name("one.txt"))
        .part("files", Part::bytes(b"two".to_vec()).file_name("two.txt"));
    let response = server
        .client
        .post(server.url("/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["files"], json!(["one.txt", "two.txt"]));
    assert_eq!(server.stats.get_stats().unwrap().uploads, 2);
}

#[tokio::test]
async fn upload_into_traversal_path_is_rejected() {
    let server = TestServer::start().await;

    let form = Form::new().part("file", Part::bytes(b"x".to_vec()).file_name("x.txt"));
    let response = server
        .client
        .post(server.url("/upload?path=../.."))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(server.stats.get_stats().unwrap().uploads, 0);
}

#[tokio::test]
async fn upload_without_file_is_bad_request() {
    let server = TestServer::start().await;

    let form = Form::new().text("path", "docs");
    let response = server
        .client
        .post(server.url("/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn mkdir_conflicts_on_second_call() {
    let server = TestServer::start().await;

    let (status, body) = server.post("/mkdir", json!({ "dirPath": "new/nested" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["path"], "new/nested");
    assert!(server.dir.path().join("new/nested").is_dir());

    let (status, body) = server.post("/mkdir", json!({ "dirPath": "new/nested" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Directory already exists");
}

#[tokio::test]
async fn write_rename_copy_move_flow() {
    let server = TestServer::start().await;

    let (status, _) = server
        .post("/write", json!({ "filePath": "notes/todo.txt", "content": "buy milk" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server
        .post("/rename", json!({ "oldPath": "notes/todo.txt", "newName": "done.txt" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["newPath"], "notes/done.txt");

    let (status, _) = server
        .post("/copy", json!({ "sourcePath": "notes/done.txt", "targetPath": "copy.txt" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        fs::read_to_string(server.dir.path().join("copy.txt")).unwrap(),
        "buy milk"
    );

    let (status, body) = server
        .post("/move", json!({ "sourcePath": "copy.txt", "targetPath": "notes/moved.txt" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["from"], "copy.txt");
    assert!(!server.dir.path().join("copy.txt").exists());
    assert!(server.dir.path().join("notes/moved.txt").is_file());

    let (status, _) = server
        .post("/move", json!({ "sourcePath": "missing.txt", "targetPath": "x.txt" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server
        .post("/rename", json!({ "oldPath": "notes/done.txt", "newName": "moved.txt" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn search_matches_names_case_insensitively() {
    let server = TestServer::start().await;
    let root = server.dir.path();
    fs::create_dir_all(root.join("a/b")).unwrap();
    fs::write(root.join("a/report.txt"), "").unwrap();
    fs::write(root.join("a/b/Report2.doc"), "").unwrap();
    fs::write(root.join("a/b/notes.md"), "").unwrap();

    let (status, body) = server.get("/search?q=REPORT").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    let paths: Vec<&str> = body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["path"].as_str().unwrap())
        .collect();
    assert_eq!(paths, vec!["a/b/Report2.doc", "a/report.txt"]);

    let (status, body) = server.get("/search?q=").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Search query is required");
}

#[tokio::test]
async fn star_toggle_and_listing() {
    let server = TestServer::start().await;
    fs::write(server.dir.path().join("fav.txt"), "").unwrap();

    let (status, body) = server.post("/star", json!({ "filePath": "fav.txt" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["starred"], true);

    let (_, body) = server.get("/starred").await;
    assert_eq!(body["starred"][0]["filePath"], "fav.txt");

    let (_, listing) = server.get("/files").await;
    assert_eq!(listing[0]["isStarred"], true);

    let (status, body) = server.post("/star", json!({ "filePath": "fav.txt" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["starred"], false);

    let (status, _) = server
        .post("/star", json!({ "filePath": "ghost.txt", "starred": true }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn wrong_method_and_bad_json_are_json_errors() {
    let server = TestServer::start().await;

    let (status, body) = server.get("/move").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"], "Method not allowed");

    let response = server
        .client
        .post(server.url("/mkdir"))
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn every_request_is_counted() {
    let server = TestServer::start().await;

    server.get("/health").await;
    server.get("/files").await;
    let (status, body) = server.get("/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["requests"], 3);
    assert!(body["startTime"].is_string());
}

#[tokio::test]
async fn stats_socket_sends_initial_snapshot() {
    let server = TestServer::start().await;

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws/stats", server.addr))
        .await
        .unwrap();
    let message = socket.next().await.unwrap().unwrap();
    let snapshot: Value = serde_json::from_str(&message.into_text().unwrap()).unwrap();
    assert_eq!(snapshot["requests"], 1);
    assert!(snapshot["system"]["cpu"]["cores"].as_u64().unwrap() >= 1);

    socket.close(None).await.unwrap();
}
