use super::*;
use std::collections::HashSet;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::protocol::UploadedImage;
use tokio::sync::oneshot;

use crate::types::StatusKind;

#[derive(Default)]
struct TestUploader {
    failing: Mutex<HashSet<String>>,
    calls: Arc<Mutex<Vec<String>>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl TestUploader {
    fn failing(names: &[&str]) -> Self {
        Self {
            failing: Mutex::new(names.iter().map(|name| name.to_string()).collect()),
            ..Self::default()
        }
    }

    fn gated(rx: oneshot::Receiver<()>) -> Self {
        Self {
            gate: Mutex::new(Some(rx)),
            ..Self::default()
        }
    }

    async fn recover(&self, name: &str) {
        self.failing.lock().await.remove(name);
    }
}

#[async_trait]
impl AttachmentUploader for TestUploader {
    async fn upload(&self, file: &PendingFile) -> Result<UploadedImage> {
        self.calls.lock().await.push(file.file_name.clone());
        let gate = self.gate.lock().await.take();
        if let Some(rx) = gate {
            let _ = rx.await;
        }
        if self.failing.lock().await.contains(&file.file_name) {
            return Err(anyhow!("storage unavailable"));
        }
        Ok(UploadedImage::from_url(format!(
            "https://cdn.test/{}",
            file.file_name
        )))
    }
}

fn image(name: &str) -> PendingFile {
    PendingFile::new(name, Some("image/png"), vec![1, 2, 3])
}

fn document(name: &str) -> PendingFile {
    PendingFile::new(name, Some("application/pdf"), vec![4, 5, 6])
}

fn manager(uploader: Arc<TestUploader>, max: usize) -> AttachmentUploadManager {
    let (events, _) = broadcast::channel(64);
    AttachmentUploadManager::new(uploader, max, events)
}

#[tokio::test]
async fn uploads_supported_files_within_capacity() {
    let uploader = Arc::new(TestUploader::default());
    let manager = manager(uploader.clone(), 3);

    let outcome = manager
        .handle_files(vec![image("a.png"), image("b.png")])
        .await;

    assert_eq!(
        outcome,
        BatchOutcome {
            added: 2,
            failed: 0,
            overflow: 0,
            unsupported: 0,
        }
    );
    let attachments = manager.attachments().await;
    assert_eq!(attachments.len(), 2);
    assert_ne!(attachments[0].id, attachments[1].id);
    assert_eq!(attachments[0].asset.url, "https://cdn.test/a.png");
    assert_eq!(attachments[0].asset.description.as_deref(), Some("a.png"));
    assert_eq!(attachments[0].asset.mime_type.as_deref(), Some("image/png"));
    assert_eq!(manager.status().await, None);
    assert_eq!(manager.progress().await, None);
    assert!(manager.can_attach_more().await);
}

#[tokio::test]
async fn unsupported_file_is_dropped_with_error_status() {
    let uploader = Arc::new(TestUploader::default());
    let manager = manager(uploader.clone(), 10);

    let outcome = manager
        .handle_files(vec![document("notes.pdf"), image("cat.png")])
        .await;

    assert_eq!(outcome.added, 1);
    assert_eq!(outcome.unsupported, 1);
    let status = manager.status().await.expect("status");
    assert_eq!(status.kind, StatusKind::Error);
    assert!(status.message.contains("Unsupported file type"));
    assert_eq!(*uploader.calls.lock().await, vec!["cat.png".to_string()]);
}

#[tokio::test]
async fn extension_is_enough_when_mime_type_is_missing() {
    let uploader = Arc::new(TestUploader::default());
    let manager = manager(uploader, 10);

    let outcome = manager
        .handle_files(vec![PendingFile::new("loop.GIF", None, vec![0])])
        .await;

    assert_eq!(outcome.added, 1);
    assert_eq!(outcome.unsupported, 0);
}

#[tokio::test]
async fn overflow_keeps_first_files_and_reports_info() {
    let uploader = Arc::new(TestUploader::default());
    let manager = manager(uploader.clone(), 1);

    let outcome = manager
        .handle_files(vec![image("first.png"), image("second.png")])
        .await;

    assert!(outcome.added <= 1);
    assert_eq!(outcome.overflow, 1);
    let status = manager.status().await.expect("status");
    assert_eq!(status.kind, StatusKind::Info);
    assert!(status.message.contains("first 1 file"), "{}", status.message);
    assert_eq!(*uploader.calls.lock().await, vec!["first.png".to_string()]);
    assert!(!manager.can_attach_more().await);
}

#[tokio::test]
async fn full_composer_rejects_the_whole_batch() {
    let uploader = Arc::new(TestUploader::default());
    let manager = manager(uploader.clone(), 1);
    manager.handle_files(vec![image("kept.png")]).await;
    uploader.calls.lock().await.clear();

    let outcome = manager
        .handle_files(vec![image("late.png"), image("later.png")])
        .await;

    assert_eq!(outcome.added, 0);
    assert_eq!(outcome.overflow, 2);
    assert!(uploader.calls.lock().await.is_empty());
    assert_eq!(manager.attachments().await.len(), 1);
    let status = manager.status().await.expect("status");
    assert!(status.is_error());
    assert_eq!(status.message, "You can attach up to 1 images per message.");
}

#[tokio::test]
async fn never_exceeds_capacity_across_batches() {
    let uploader = Arc::new(TestUploader::default());
    let manager = manager(uploader, 4);

    for batch in 0..3 {
        let files = (0..3)
            .map(|index| image(&format!("{batch}-{index}.png")))
            .collect();
        manager.handle_files(files).await;
        assert!(manager.attachments().await.len() <= 4);
    }
    assert_eq!(manager.attachments().await.len(), 4);
}

#[tokio::test]
async fn failed_uploads_are_retained_and_fully_successful_retry_clears_them() {
    let uploader = Arc::new(TestUploader::failing(&["b.png"]));
    let manager = manager(uploader.clone(), 10);

    let outcome = manager
        .handle_files(vec![image("a.png"), image("b.png")])
        .await;
    assert_eq!(outcome.added, 1);
    assert_eq!(outcome.failed, 1);
    assert!(manager.can_retry().await);
    let status = manager.status().await.expect("status");
    assert!(status.is_error());
    assert_eq!(status.message, "Failed to upload 1 attachment. You can retry.");

    uploader.recover("b.png").await;
    uploader.calls.lock().await.clear();
    let retry = manager.retry_failed().await;

    assert_eq!(retry.added, 1);
    assert_eq!(retry.failed, 0);
    assert_eq!(*uploader.calls.lock().await, vec!["b.png".to_string()]);
    assert!(manager.failed_files().await.is_empty());
    assert_eq!(manager.attachments().await.len(), 2);
}

#[tokio::test]
async fn partial_retry_keeps_only_still_failing_files() {
    let uploader = Arc::new(TestUploader::failing(&["b.png", "c.png"]));
    let manager = manager(uploader.clone(), 10);
    manager
        .handle_files(vec![image("a.png"), image("b.png"), image("c.png")])
        .await;
    assert_eq!(manager.failed_files().await.len(), 2);

    uploader.recover("b.png").await;
    let retry = manager.retry_failed().await;

    assert_eq!(retry.added, 1);
    assert_eq!(retry.failed, 1);
    let remaining: Vec<_> = manager
        .failed_files()
        .await
        .into_iter()
        .map(|file| file.file_name)
        .collect();
    assert_eq!(remaining, vec!["c.png".to_string()]);
}

#[tokio::test]
async fn retry_without_failures_does_nothing() {
    let uploader = Arc::new(TestUploader::default());
    let manager = manager(uploader.clone(), 10);

    assert_eq!(manager.retry_failed().await, BatchOutcome::default());
    assert!(uploader.calls.lock().await.is_empty());
}

#[tokio::test]
async fn progress_is_reported_after_every_attempt() {
    let uploader = Arc::new(TestUploader::failing(&["b.png"]));
    let (events, mut rx) = broadcast::channel(64);
    let manager = AttachmentUploadManager::new(uploader, 10, events);

    manager
        .handle_files(vec![image("a.png"), image("b.png"), image("c.png")])
        .await;

    let mut completed = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let ComposerEvent::UploadProgress(Some(progress)) = event {
            assert_eq!(progress.total, 3);
            assert!(progress.completed <= progress.total);
            completed.push(progress.completed);
        }
    }
    assert_eq!(completed, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn remove_attachment_ignores_unknown_ids() {
    let uploader = Arc::new(TestUploader::default());
    let manager = manager(uploader, 10);
    manager
        .handle_files(vec![image("a.png"), image("b.png")])
        .await;
    let first = manager.attachments().await[0].id.clone();

    manager
        .remove_attachment(&AttachmentId::new("missing"))
        .await;
    assert_eq!(manager.attachments().await.len(), 2);

    manager.remove_attachment(&first).await;
    let remaining = manager.attachments().await;
    assert_eq!(remaining.len(), 1);
    assert_ne!(remaining[0].id, first);
}

#[tokio::test]
async fn reset_discards_results_of_inflight_batch() {
    let (release, gate) = oneshot::channel();
    let uploader = Arc::new(TestUploader::gated(gate));
    let manager = Arc::new(manager(uploader.clone(), 10));

    let task = tokio::spawn({
        let manager = manager.clone();
        async move { manager.handle_files(vec![image("slow.png")]).await }
    });
    while uploader.calls.lock().await.is_empty() {
        tokio::task::yield_now().await;
    }
    assert!(manager.is_uploading().await);

    manager.reset().await;
    release.send(()).expect("release upload");
    let outcome = task.await.expect("join");

    assert_eq!(outcome.added, 0);
    assert!(manager.attachments().await.is_empty());
    assert_eq!(manager.progress().await, None);
    assert_eq!(manager.status().await, None);
}

#[tokio::test]
async fn second_batch_waits_for_the_first() {
    let (release, gate) = oneshot::channel();
    let uploader = Arc::new(TestUploader::gated(gate));
    let manager = Arc::new(manager(uploader.clone(), 10));

    let task = tokio::spawn({
        let manager = manager.clone();
        async move { manager.handle_files(vec![image("slow.png")]).await }
    });
    while uploader.calls.lock().await.is_empty() {
        tokio::task::yield_now().await;
    }

    let refused = manager.handle_files(vec![image("eager.png")]).await;
    assert_eq!(refused, BatchOutcome::default());
    let status = manager.status().await.expect("status");
    assert_eq!(status, ComposerStatus::info("Please wait for uploads to finish."));

    release.send(()).expect("release upload");
    let outcome = task.await.expect("join");
    assert_eq!(outcome.added, 1);
    assert_eq!(*uploader.calls.lock().await, vec!["slow.png".to_string()]);
}

#[tokio::test]
async fn expire_status_clears_only_after_ttl() {
    let uploader = Arc::new(TestUploader::default());
    let manager = manager(uploader, 10);
    manager
        .handle_files(vec![document("notes.pdf")])
        .await;
    assert!(manager.status().await.is_some());

    let ttl = Duration::from_millis(4000);
    assert!(!manager.expire_status(Instant::now(), ttl).await);
    assert!(manager.status().await.is_some());

    let later = Instant::now() + ttl;
    assert!(manager.expire_status(later, ttl).await);
    assert_eq!(manager.status().await, None);
}
