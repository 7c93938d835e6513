//! DocumentStorage against the local filesystem backend.

#![cfg(feature = "storage-local")]

use docsafe_storage::{BoxedReader, ByteStream, DocumentStorage, LocalStorage};
use futures::StreamExt;
use std::io::Read;
use std::sync::Arc;
use tempfile::TempDir;

async fn setup() -> (TempDir, DocumentStorage) {
    let dir = tempfile::tempdir().unwrap();
    let backend = LocalStorage::new(
        dir.path(),
        "http://localhost:4000/files".to_string(),
        b"integration-secret".to_vec(),
    )
    .await
    .unwrap();
    (dir, DocumentStorage::new(Arc::new(backend)))
}

fn reader(data: &[u8]) -> BoxedReader {
    Box::pin(std::io::Cursor::new(data.to_vec()))
}

async fn collect(mut stream: ByteStream) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    out
}

#[tokio::test]
async fn store_temporary_then_get_document_round_trips() {
    let (_dir, storage) = setup().await;
    let content = b"%PDF-1.7 quarterly report".to_vec();

    let path = storage
        .store_temporary("t1", "d1", reader(&content), content.len() as u64, "application/pdf")
        .await
        .unwrap();
    assert_eq!(path, "temp/t1/d1");

    let stream = storage.get_document("t1", &path).await.unwrap();
    assert_eq!(collect(stream).await, content);
}

#[tokio::test]
async fn size_mismatch_removes_upload() {
    let (_dir, storage) = setup().await;

    let err = storage
        .store_temporary("t1", "d1", reader(b"short"), 100, "text/plain")
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert!(!storage.exists("t1", "temp/t1/d1").await.unwrap());
}

#[tokio::test]
async fn store_permanent_moves_out_of_temporary() {
    let (_dir, storage) = setup().await;
    let temp = storage
        .store_temporary("t1", "d1", reader(b"clean"), 5, "text/plain")
        .await
        .unwrap();

    let permanent = storage
        .store_permanent("t1", "d1", "v1", "f1", &temp)
        .await
        .unwrap();

    assert_eq!(permanent, "t1/f1/d1/v1");
    assert!(storage.exists("t1", &permanent).await.unwrap());
    assert!(!storage.exists("t1", &temp).await.unwrap());
    assert!(!storage.exists("t1", "quarantine/t1/d1").await.unwrap());
    let stream = storage.get_document("t1", &permanent).await.unwrap();
    assert_eq!(collect(stream).await, b"clean");
}

#[tokio::test]
async fn move_to_quarantine_moves_out_of_temporary() {
    let (_dir, storage) = setup().await;
    let temp = storage
        .store_temporary("t1", "d1", reader(b"X5O!P%@AP"), 9, "text/plain")
        .await
        .unwrap();

    let quarantine = storage.move_to_quarantine("t1", "d1", &temp).await.unwrap();

    assert_eq!(quarantine, "quarantine/t1/d1");
    assert!(storage.exists("t1", &quarantine).await.unwrap());
    assert!(!storage.exists("t1", &temp).await.unwrap());
}

#[tokio::test]
async fn replayed_move_is_idempotent() {
    let (_dir, storage) = setup().await;
    let temp = storage
        .store_temporary("t1", "d1", reader(b"clean"), 5, "text/plain")
        .await
        .unwrap();

    let first = storage.store_permanent("t1", "d1", "v1", "root", &temp).await.unwrap();
    let second = storage.store_permanent("t1", "d1", "v1", "root", &temp).await.unwrap();
    assert_eq!(first, second);

    let err = storage
        .move_to_quarantine("t1", "d1", &temp)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn other_tenant_cannot_read_move_or_delete() {
    let (_dir, storage) = setup().await;
    let temp = storage
        .store_temporary("t1", "d1", reader(b"secret"), 6, "text/plain")
        .await
        .unwrap();

    assert!(storage.get_document("t2", &temp).await.err().unwrap().is_not_found());
    assert!(storage
        .store_permanent("t2", "d1", "v1", "root", &temp)
        .await
        .unwrap_err()
        .is_not_found());
    assert!(storage
        .move_to_quarantine("t2", "d1", &temp)
        .await
        .unwrap_err()
        .is_not_found());
    assert!(storage.delete_document("t2", &temp).await.unwrap_err().is_not_found());

    // Untouched for the owner.
    assert!(storage.exists("t1", &temp).await.unwrap());
}

#[tokio::test]
async fn delete_document_missing_is_not_found() {
    let (_dir, storage) = setup().await;
    let temp = storage
        .store_temporary("t1", "d1", reader(b"bye"), 3, "text/plain")
        .await
        .unwrap();

    storage.delete_document("t1", &temp).await.unwrap();
    assert!(storage.delete_document("t1", &temp).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn presigned_url_carries_download_disposition() {
    let (_dir, storage) = setup().await;
    let temp = storage
        .store_temporary("t1", "d1", reader(b"pdf"), 3, "application/pdf")
        .await
        .unwrap();
    let permanent = storage.store_permanent("t1", "d1", "v1", "root", &temp).await.unwrap();

    let url = storage
        .get_presigned_url("t1", &permanent, "report.pdf", None)
        .await
        .unwrap();

    assert!(url.starts_with("http://localhost:4000/files/t1/root/d1/v1?"));
    assert!(url.contains("disposition=attachment"));
    assert!(url.contains("signature="));
}

#[tokio::test]
async fn batch_archive_contains_every_document() {
    let (_dir, storage) = setup().await;
    let mut paths = Vec::new();
    for (doc, body) in [("d1", b"first".as_slice()), ("d2", b"second".as_slice())] {
        let temp = storage
            .store_temporary("t1", doc, reader(body), body.len() as u64, "text/plain")
            .await
            .unwrap();
        paths.push(storage.store_permanent("t1", doc, "v1", "root", &temp).await.unwrap());
    }

    let stream = storage
        .create_batch_archive(
            "t1",
            &paths,
            &["notes.txt".to_string(), "../notes.txt".to_string()],
        )
        .await
        .unwrap();
    let bytes = collect(stream).await;

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    assert_eq!(archive.len(), 2);

    let mut first = String::new();
    archive
        .by_name("notes.txt")
        .unwrap()
        .read_to_string(&mut first)
        .unwrap();
    assert_eq!(first, "first");

    let mut second = String::new();
    archive
        .by_name("notes (1).txt")
        .unwrap()
        .read_to_string(&mut second)
        .unwrap();
    assert_eq!(second, "second");
}

#[tokio::test]
async fn batch_archive_aborts_when_any_document_is_missing() {
    let (_dir, storage) = setup().await;
    let temp = storage
        .store_temporary("t1", "d1", reader(b"here"), 4, "text/plain")
        .await
        .unwrap();
    let present = storage.store_permanent("t1", "d1", "v1", "root", &temp).await.unwrap();

    let result = storage
        .create_batch_archive(
            "t1",
            &[present, "t1/root/d2/v1".to_string()],
            &["a.txt".to_string(), "b.txt".to_string()],
        )
        .await;

    assert!(result.err().unwrap().is_not_found());
}
