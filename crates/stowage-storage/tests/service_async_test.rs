//! Async storage service tests.
//!
//! Run with: `cargo test -p stowage-storage --test service_async_test`

mod helpers;

use helpers::{dir_entries, memory_service, TestStorage};
use stowage_storage::{SaveContent, StorageError, UploadFile};

#[tokio::test]
async fn test_save_and_get_async() {
    let storage = TestStorage::new();
    let service = &storage.service;

    let file = UploadFile::new(&b"File saving worked"[..])
        .with_filename("get.txt")
        .with_content_type("text/plain");
    let saved = service.save_async(file, Some("images")).await.unwrap();
    assert_eq!(saved.size, 18);

    let fetched = service.get_async("images/get.txt").await.unwrap();
    assert_eq!(fetched.filename, "get.txt");
    assert_eq!(fetched.read_async(None).await.unwrap(), &b"File saving worked"[..]);

    assert!(fetched.delete_async().await.unwrap());
    assert!(dir_entries(&storage.container_dir("images")).is_empty());
}

#[tokio::test]
async fn test_save_content_and_delete_async() {
    let storage = TestStorage::new();
    let service = &storage.service;

    service
        .save_content_async(SaveContent::new("async.txt").content(&b"async"[..]))
        .await
        .unwrap();

    assert!(service.delete_async("files/async.txt").await.unwrap());
    assert!(matches!(
        service.delete_async("files/async.txt").await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_memory_storage_async() {
    let service = memory_service();

    let file = UploadFile::new(&b"in memory"[..]).with_filename("m.txt");
    service.save_async(file, None).await.unwrap();

    let fetched = service.get_async("m.txt").await.unwrap();
    assert_eq!(fetched.read_async(Some(2)).await.unwrap(), &b"in"[..]);
    assert!(service.delete_async("cloud/m.txt").await.unwrap());
}

#[test]
fn test_memory_storage_configured_outside_runtime() {
    // Configured before any runtime exists, then used and released from async code.
    let service = memory_service();

    let runtime = tokio::runtime::Runtime::new().expect("Failed to build runtime");
    runtime.block_on(async move {
        let file = UploadFile::new(&b"startup order"[..]).with_filename("late.txt");
        service.save_async(file, None).await.unwrap();

        let fetched = service.get_async("cloud/late.txt").await.unwrap();
        assert_eq!(fetched.read_async(None).await.unwrap(), &b"startup order"[..]);

        drop(fetched);
        drop(service);
    });

    // The fallback runtime outlives every driver; a second service reuses it.
    let again = memory_service();
    runtime.block_on(async move {
        let file = UploadFile::new(&b"x"[..]).with_filename("again.txt");
        assert_eq!(again.save_async(file, None).await.unwrap().size, 1);
    });
}
