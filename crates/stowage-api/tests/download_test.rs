//! Download route integration tests.
//!
//! Run with: `cargo test -p stowage-api --test download_test`

use axum_test::TestServer;
use std::path::PathBuf;
use std::sync::Arc;
use stowage_api::setup::routes::setup_routes;
use stowage_api::AppState;
use stowage_core::{AppConfig, DriverKind, DriverOptions, StorageSetup};
use stowage_storage::{StorageService, UploadFile};
use tempfile::TempDir;

fn test_config(download_route_enabled: bool) -> AppConfig {
    AppConfig {
        server_port: 0,
        environment: "test".to_string(),
        storage_config_path: PathBuf::from("storage.json"),
        storage_default: None,
        download_route_enabled,
        log_json: false,
    }
}

/// Local `files` (default) and `images` storages sharing one temp root.
fn local_service(temp_dir: &TempDir) -> StorageService {
    let key = temp_dir.path().join("fixtures").to_string_lossy().to_string();
    let setup = StorageSetup::new()
        .with_storage("files", DriverKind::Local, DriverOptions::new(key.clone()))
        .with_storage("images", DriverKind::Local, DriverOptions::new(key));
    StorageService::from_setup(&setup).expect("Failed to configure storages")
}

fn test_server(service: StorageService, download_route_enabled: bool) -> TestServer {
    let state = Arc::new(AppState::new(test_config(download_route_enabled), service));
    TestServer::new(setup_routes(state).into_make_service()).expect("Failed to create test server")
}

fn text_upload(body: &'static [u8], filename: &str) -> UploadFile {
    UploadFile::new(body)
        .with_filename(filename)
        .with_content_type("text/plain")
}

#[tokio::test]
async fn test_storage_controller_download_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let service = local_service(&temp_dir);

    service
        .save_async(text_upload(b"File saving worked", "get.txt"), None)
        .await
        .unwrap();
    service
        .save_async(text_upload(b"File saving worked in images", "get.txt"), Some("images"))
        .await
        .unwrap();

    let server = test_server(service, true);

    let res = server.get("/storage/download/images/get.txt").await;
    assert_eq!(res.status_code(), 200);
    assert_eq!(res.text(), "File saving worked in images");

    let res = server.get("/storage/download/files/get.txt").await;
    assert_eq!(res.status_code(), 200);
    assert_eq!(res.text(), "File saving worked");
    assert_eq!(res.header("content-type"), "text/plain");
    assert_eq!(res.header("content-disposition"), "attachment;filename=get.txt");

    let res = server.get("/storage/download/files/get342.txt").await;
    assert_eq!(res.status_code(), 404);
}

#[tokio::test]
async fn test_download_default_storage_and_unnamed_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let service = local_service(&temp_dir);
    std::fs::write(temp_dir.path().join("fixtures/files/raw.bin"), b"\x00\x01\x02").unwrap();

    let server = test_server(service, true);

    let res = server.get("/storage/download/raw.bin").await;
    assert_eq!(res.status_code(), 200);
    assert_eq!(res.as_bytes().to_vec(), vec![0u8, 1, 2]);
    assert_eq!(res.header("content-type"), "application/octet-stream");
    assert_eq!(res.header("content-disposition"), "attachment;filename=unnamed");
}

#[tokio::test]
async fn test_download_error_responses() {
    let temp_dir = tempfile::tempdir().unwrap();
    let server = test_server(local_service(&temp_dir), true);

    let res = server.get("/storage/download/videos/get.txt").await;
    assert_eq!(res.status_code(), 404);
    let body: serde_json::Value = res.json();
    assert_eq!(body["code"], "NOT_FOUND");
    assert_eq!(body["error"], "videos storage has not been added");

    let res = server.get("/storage/download/files/nested/get.txt").await;
    assert_eq!(res.status_code(), 400);
    let body: serde_json::Value = res.json();
    assert_eq!(body["code"], "INVALID_INPUT");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_download_streams_when_backend_has_no_url() {
    let setup =
        StorageSetup::new().with_storage("cloud", DriverKind::Memory, DriverOptions::new("cloud"));
    let service = StorageService::from_setup(&setup).unwrap();
    service
        .save_async(text_upload(b"served from memory", "mem.txt"), None)
        .await
        .unwrap();

    let server = test_server(service, true);

    let res = server.get("/storage/download/cloud/mem.txt").await;
    assert_eq!(res.status_code(), 200);
    assert_eq!(res.text(), "served from memory");
    assert_eq!(res.header("content-disposition"), "attachment;filename=mem.txt");
}

#[tokio::test]
async fn test_health_and_disabled_download_route() {
    let temp_dir = tempfile::tempdir().unwrap();
    let server = test_server(local_service(&temp_dir), false);

    let res = server.get("/health").await;
    assert_eq!(res.status_code(), 200);
    let body: serde_json::Value = res.json();
    assert_eq!(body, serde_json::json!({"status": "ok"}));

    let res = server.get("/storage/download/files/get.txt").await;
    assert_eq!(res.status_code(), 404);
}
