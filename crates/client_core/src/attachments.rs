use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use shared::{domain::AttachmentId, protocol::AttachmentAsset};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use crate::{
    error::ComposerIssue,
    types::{
        attachment_payloads, Attachment, BatchOutcome, ComposerStatus, PendingFile,
        UploadProgress,
    },
    AttachmentUploader, ComposerEvent,
};

/// Validates, uploads and tracks the attachments of one composer session.
///
/// Uploads run one file at a time so `completed` only ever grows within a batch, and a
/// failing file never disturbs the others. Files that fail stay in `failed_files` until a
/// retry fully succeeds or a new batch replaces them.
pub struct AttachmentUploadManager {
    uploader: Arc<dyn AttachmentUploader>,
    max_attachments: usize,
    state: Mutex<AttachmentState>,
    events: broadcast::Sender<ComposerEvent>,
}

#[derive(Default)]
struct AttachmentState {
    attachments: Vec<Attachment>,
    status: Option<ComposerStatus>,
    status_set_at: Option<Instant>,
    failed_files: Vec<PendingFile>,
    progress: Option<UploadProgress>,
    session: u64,
}

impl AttachmentState {
    fn set_status(&mut self, status: Option<ComposerStatus>) {
        self.status_set_at = status.as_ref().map(|_| Instant::now());
        self.status = status;
    }
}

impl AttachmentUploadManager {
    pub fn new(
        uploader: Arc<dyn AttachmentUploader>,
        max_attachments: usize,
        events: broadcast::Sender<ComposerEvent>,
    ) -> Self {
        Self {
            uploader,
            max_attachments,
            state: Mutex::new(AttachmentState::default()),
            events,
        }
    }

    pub fn max_attachments(&self) -> usize {
        self.max_attachments
    }

    pub async fn attachments(&self) -> Vec<Attachment> {
        self.state.lock().await.attachments.clone()
    }

    pub async fn asset_payloads(&self) -> Vec<AttachmentAsset> {
        attachment_payloads(&self.state.lock().await.attachments)
    }

    pub async fn status(&self) -> Option<ComposerStatus> {
        self.state.lock().await.status.clone()
    }

    pub async fn progress(&self) -> Option<UploadProgress> {
        self.state.lock().await.progress
    }

    pub async fn failed_files(&self) -> Vec<PendingFile> {
        self.state.lock().await.failed_files.clone()
    }

    pub async fn is_uploading(&self) -> bool {
        self.state.lock().await.progress.is_some()
    }

    pub async fn can_retry(&self) -> bool {
        !self.state.lock().await.failed_files.is_empty()
    }

    pub async fn can_attach_more(&self) -> bool {
        self.state.lock().await.attachments.len() < self.max_attachments
    }

    pub async fn set_status(&self, status: Option<ComposerStatus>) {
        self.state.lock().await.set_status(status.clone());
        let _ = self.events.send(ComposerEvent::StatusChanged(status));
    }

    pub async fn report(&self, issue: &ComposerIssue) {
        self.set_status(issue.to_status()).await;
    }

    pub async fn expire_status(&self, now: Instant, ttl: Duration) -> bool {
        let expired = {
            let mut state = self.state.lock().await;
            match state.status_set_at {
                Some(set_at) if now.saturating_duration_since(set_at) >= ttl => {
                    state.set_status(None);
                    true
                }
                _ => false,
            }
        };
        if expired {
            let _ = self.events.send(ComposerEvent::StatusChanged(None));
        }
        expired
    }

    pub async fn remove_attachment(&self, attachment_id: &AttachmentId) {
        self.state
            .lock()
            .await
            .attachments
            .retain(|item| &item.id != attachment_id);
    }

    /// Clears the session. A batch still in flight is abandoned and its results dropped.
    pub async fn reset(&self) {
        {
            let mut state = self.state.lock().await;
            let session = state.session.wrapping_add(1);
            *state = AttachmentState {
                session,
                ..AttachmentState::default()
            };
        }
        let _ = self.events.send(ComposerEvent::UploadProgress(None));
        let _ = self.events.send(ComposerEvent::StatusChanged(None));
    }

    pub async fn handle_files(&self, files: Vec<PendingFile>) -> BatchOutcome {
        self.process_batch(files).await.unwrap_or_default()
    }

    pub async fn retry_failed(&self) -> BatchOutcome {
        let failed = {
            let state = self.state.lock().await;
            if state.failed_files.is_empty() {
                return BatchOutcome::default();
            }
            state.failed_files.clone()
        };

        let Some(outcome) = self.process_batch(failed).await else {
            return BatchOutcome::default();
        };
        if outcome.failed == 0 {
            self.state.lock().await.failed_files.clear();
        }
        outcome
    }

    /// `None` when the batch was refused because another one is still uploading.
    async fn process_batch(&self, files: Vec<PendingFile>) -> Option<BatchOutcome> {
        if files.is_empty() {
            return Some(BatchOutcome::default());
        }

        let mut state = self.state.lock().await;
        if state.progress.is_some() {
            drop(state);
            debug!("attachment batch refused while another batch is uploading");
            self.report(&ComposerIssue::UploadInFlight).await;
            return None;
        }

        let session = state.session;
        let remaining = self.max_attachments.saturating_sub(state.attachments.len());
        if remaining == 0 {
            drop(state);
            self.report(&ComposerIssue::CapacityExceeded {
                max: self.max_attachments,
            })
            .await;
            return Some(BatchOutcome {
                added: 0,
                failed: files.len(),
                overflow: files.len(),
                unsupported: 0,
            });
        }

        let overflow = files.len().saturating_sub(remaining);
        let (supported, rejected): (Vec<_>, Vec<_>) = files
            .into_iter()
            .take(remaining)
            .partition(PendingFile::is_supported_image);
        let unsupported = rejected.len();

        let mut issues = Vec::new();
        if overflow > 0 {
            issues.push(ComposerIssue::Overflow {
                accepted: remaining,
            });
        }
        if unsupported > 0 {
            issues.push(ComposerIssue::UnsupportedType);
        }

        if supported.is_empty() {
            let status = compose_status(&issues);
            state.failed_files.clear();
            state.set_status(status.clone());
            drop(state);
            let _ = self.events.send(ComposerEvent::StatusChanged(status));
            return Some(BatchOutcome {
                added: 0,
                failed: unsupported,
                overflow,
                unsupported,
            });
        }

        // Claimed under the same lock as the checks above so a concurrent batch sees it.
        let total = supported.len();
        let started = UploadProgress { total, completed: 0 };
        state.progress = Some(started);
        drop(state);
        let _ = self.events.send(ComposerEvent::UploadProgress(Some(started)));

        let mut uploaded = Vec::new();
        let mut failed = Vec::new();
        for (index, file) in supported.into_iter().enumerate() {
            match self.uploader.upload(&file).await {
                Ok(image) => uploaded.push(Attachment::from_upload(&file, image)),
                Err(err) => {
                    warn!(file = %file.file_name, "attachment upload failed: {err:#}");
                    failed.push(file);
                }
            }
            let progress = UploadProgress {
                total,
                completed: index + 1,
            };
            if !self.update_progress(session, progress).await {
                debug!("attachment session reset mid-batch; discarding results");
                return Some(BatchOutcome {
                    added: 0,
                    failed: failed.len(),
                    overflow,
                    unsupported,
                });
            }
        }

        if !failed.is_empty() {
            issues.push(ComposerIssue::UploadFailure {
                count: failed.len(),
            });
        }
        let outcome = BatchOutcome {
            added: uploaded.len(),
            failed: failed.len(),
            overflow,
            unsupported,
        };
        let status = compose_status(&issues);

        {
            let mut state = self.state.lock().await;
            if state.session != session {
                debug!("attachment session reset before batch completed; discarding results");
                return Some(BatchOutcome { added: 0, ..outcome });
            }
            state.attachments.extend(uploaded);
            debug_assert!(state.attachments.len() <= self.max_attachments);
            state.failed_files = failed;
            state.progress = None;
            state.set_status(status.clone());
        }
        let _ = self.events.send(ComposerEvent::UploadProgress(None));
        let _ = self.events.send(ComposerEvent::StatusChanged(status));
        Some(outcome)
    }

    /// Returns `false` if the session was reset since the batch began.
    async fn update_progress(&self, session: u64, progress: UploadProgress) -> bool {
        {
            let mut state = self.state.lock().await;
            if state.session != session {
                return false;
            }
            state.progress = Some(progress);
        }
        let _ = self.events.send(ComposerEvent::UploadProgress(Some(progress)));
        true
    }
}

/// One status for the whole batch: `error` if any issue is an error, otherwise `info`.
fn compose_status(issues: &[ComposerIssue]) -> Option<ComposerStatus> {
    if issues.is_empty() {
        return None;
    }
    let message = issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    if issues.iter().any(ComposerIssue::is_error) {
        Some(ComposerStatus::error(message))
    } else {
        Some(ComposerStatus::info(message))
    }
}

#[cfg(test)]
#[path = "tests/attachments_tests.rs"]
mod tests;
