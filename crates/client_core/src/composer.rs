use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Result;
use async_trait::async_trait;
use shared::{
    domain::{AttachmentId, ChannelKind, RoomId, ThreadId},
    protocol::{AttachmentAsset, DirectMessageRequest, RoomMessageRequest},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    attachments::AttachmentUploadManager,
    config::ComposerSettings,
    error::ComposerIssue,
    gif::{gif_command_query, ConfirmedGif, GifSearchController},
    types::{
        Attachment, BatchOutcome, ComposerStatus, GifPhase, GifPreviewSnapshot, PendingFile,
        UploadProgress, ATTACHMENT_ONLY_PLACEHOLDER,
    },
    AttachmentUploader, ComposerEvent, ComposerFocus, DirectMessageSender, GifSearcher,
    InputRef, RoomMessageSender,
};

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub body: String,
    pub attachments: Vec<AttachmentAsset>,
}

/// What differs between composing into a room and into a direct thread.
#[async_trait]
pub trait ComposerChannel: Send + Sync {
    type Target: Clone + fmt::Display + PartialEq + Send + Sync;

    fn kind(&self) -> ChannelKind;
    fn access_revoked_message(&self) -> &'static str;
    fn no_target_upload_message(&self) -> &'static str;
    fn submits_on_enter(&self) -> bool;

    async fn dispatch(&self, target: &Self::Target, message: OutboundMessage) -> Result<bool>;
}

pub struct RoomChannel {
    sender: Arc<dyn RoomMessageSender>,
    location: Option<(f64, f64)>,
}

impl RoomChannel {
    pub fn new(sender: Arc<dyn RoomMessageSender>) -> Self {
        Self {
            sender,
            location: None,
        }
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.location = Some((latitude, longitude));
        self
    }
}

#[async_trait]
impl ComposerChannel for RoomChannel {
    type Target = RoomId;

    fn kind(&self) -> ChannelKind {
        ChannelKind::Room
    }

    fn access_revoked_message(&self) -> &'static str {
        "Chat rooms are unavailable for your account."
    }

    fn no_target_upload_message(&self) -> &'static str {
        "Select a room before uploading images."
    }

    fn submits_on_enter(&self) -> bool {
        true
    }

    async fn dispatch(&self, target: &RoomId, message: OutboundMessage) -> Result<bool> {
        let request = RoomMessageRequest {
            message: message.body,
            attachments: message.attachments,
            latitude: self.location.map(|(latitude, _)| latitude),
            longitude: self.location.map(|(_, longitude)| longitude),
        };
        self.sender.send_room_message(target, request).await
    }
}

pub struct DirectChannel {
    sender: Arc<dyn DirectMessageSender>,
}

impl DirectChannel {
    pub fn new(sender: Arc<dyn DirectMessageSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl ComposerChannel for DirectChannel {
    type Target = ThreadId;

    fn kind(&self) -> ChannelKind {
        ChannelKind::Direct
    }

    fn access_revoked_message(&self) -> &'static str {
        "Direct messages are disabled for your account."
    }

    fn no_target_upload_message(&self) -> &'static str {
        "Select a conversation before uploading images."
    }

    fn submits_on_enter(&self) -> bool {
        false
    }

    async fn dispatch(&self, target: &ThreadId, message: OutboundMessage) -> Result<bool> {
        let request = DirectMessageRequest {
            body: message.body,
            attachments: message.attachments,
        };
        self.sender.send_direct_message(target, request).await?;
        Ok(true)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Sent { gif: bool },
    /// The draft held a `/gif` command; a preview was fetched instead of sending.
    PreviewRequested,
    AwaitingPreview,
    /// A gate stopped the send; the reason is in the status.
    Blocked,
    /// Nothing to do: no target, empty draft, or a send already in flight.
    Ignored,
    /// The channel rejected the message; draft and attachments are kept.
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyPress {
    pub is_enter: bool,
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
    /// An IME composition is in progress.
    pub composing: bool,
}

impl KeyPress {
    pub fn enter() -> Self {
        Self {
            is_enter: true,
            ..Self::default()
        }
    }

    pub fn is_plain_enter(&self) -> bool {
        self.is_enter && !(self.shift || self.ctrl || self.alt || self.meta || self.composing)
    }
}

struct ComposerState<T> {
    draft: String,
    target: Option<T>,
    has_access: bool,
    offline: bool,
    sending: bool,
}

pub type RoomComposer = ComposerOrchestrator<RoomChannel>;
pub type DirectComposer = ComposerOrchestrator<DirectChannel>;

/// Draft text, attachments and the `/gif` preview of one channel, gated and assembled into
/// a single outbound message.
pub struct ComposerOrchestrator<C: ComposerChannel> {
    channel: C,
    attachments: AttachmentUploadManager,
    gif: GifSearchController,
    focus: Arc<dyn ComposerFocus>,
    input: InputRef,
    status_ttl: Duration,
    state: Mutex<ComposerState<C::Target>>,
    events: broadcast::Sender<ComposerEvent>,
}

impl<C: ComposerChannel> ComposerOrchestrator<C> {
    pub fn new(
        channel: C,
        uploader: Arc<dyn AttachmentUploader>,
        gif_searcher: Arc<dyn GifSearcher>,
        focus: Arc<dyn ComposerFocus>,
        input: InputRef,
        settings: &ComposerSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            channel,
            attachments: AttachmentUploadManager::new(
                uploader,
                settings.max_attachments,
                events.clone(),
            ),
            gif: GifSearchController::new(
                gif_searcher,
                settings.gif_preview_limit,
                events.clone(),
            ),
            focus,
            input,
            status_ttl: settings.status_ttl,
            state: Mutex::new(ComposerState {
                draft: String::new(),
                target: None,
                has_access: true,
                offline: false,
                sending: false,
            }),
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ComposerEvent> {
        self.events.subscribe()
    }

    pub fn kind(&self) -> ChannelKind {
        self.channel.kind()
    }

    pub async fn draft(&self) -> String {
        self.state.lock().await.draft.clone()
    }

    /// Replaces the draft and drops a GIF preview the new text no longer asks for.
    pub async fn set_draft(&self, draft: impl Into<String>) {
        let draft = draft.into();
        self.state.lock().await.draft = draft.clone();
        self.gif.sync_with_draft(&draft).await;
    }

    pub async fn target(&self) -> Option<C::Target> {
        self.state.lock().await.target.clone()
    }

    /// Switching target starts a fresh session: draft, attachments and preview are dropped.
    pub async fn set_target(&self, target: Option<C::Target>) {
        {
            let mut state = self.state.lock().await;
            if state.target == target {
                return;
            }
            state.target = target;
            state.draft.clear();
        }
        self.attachments.reset().await;
        self.gif.cancel().await;
    }

    pub async fn set_access(&self, has_access: bool) {
        self.state.lock().await.has_access = has_access;
    }

    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.offline = offline;
    }

    pub async fn check_attachment_picker(&self) -> bool {
        let issue = match self.upload_gate().await {
            Some(issue) => Some(issue),
            None if !self.attachments.can_attach_more().await => {
                Some(ComposerIssue::CapacityExceeded {
                    max: self.attachments.max_attachments(),
                })
            }
            None => None,
        };
        match issue {
            Some(issue) => {
                self.attachments.report(&issue).await;
                false
            }
            None => true,
        }
    }

    pub async fn attach_files(&self, files: Vec<PendingFile>) -> BatchOutcome {
        if files.is_empty() {
            return BatchOutcome::default();
        }
        if let Some(issue) = self.upload_gate().await {
            self.attachments.report(&issue).await;
            return BatchOutcome::default();
        }
        self.attachments.handle_files(files).await
    }

    pub async fn retry_failed_uploads(&self) -> BatchOutcome {
        if let Some(issue) = self.upload_gate().await {
            self.attachments.report(&issue).await;
            return BatchOutcome::default();
        }
        self.attachments.retry_failed().await
    }

    pub async fn remove_attachment(&self, attachment_id: &AttachmentId) {
        self.attachments.remove_attachment(attachment_id).await;
    }

    pub async fn attachments(&self) -> Vec<Attachment> {
        self.attachments.attachments().await
    }

    pub async fn status(&self) -> Option<ComposerStatus> {
        self.attachments.status().await
    }

    pub async fn progress(&self) -> Option<UploadProgress> {
        self.attachments.progress().await
    }

    pub async fn can_retry(&self) -> bool {
        self.attachments.can_retry().await
    }

    pub async fn dismiss_status(&self) {
        self.attachments.set_status(None).await;
    }

    pub async fn expire_status(&self, now: Instant) -> bool {
        self.attachments.expire_status(now, self.status_ttl).await
    }

    /// Sends the draft. Gates are checked in order and the first failing one wins.
    pub async fn send(&self) -> SendOutcome {
        let (draft, target) = match self.send_gate().await {
            Ok(ready) => ready,
            Err(outcome) => return outcome,
        };
        if self.attachments.is_uploading().await {
            self.attachments.report(&ComposerIssue::UploadInFlight).await;
            return SendOutcome::Blocked;
        }

        let assets = self.attachments.asset_payloads().await;
        let trimmed = draft.trim();
        if trimmed.is_empty() && assets.is_empty() {
            return SendOutcome::Ignored;
        }

        self.gif.sync_with_draft(&draft).await;
        if let Some(query) = gif_command_query(&draft) {
            match self.gif.phase().await {
                GifPhase::Searching => return SendOutcome::AwaitingPreview,
                GifPhase::Idle => {
                    self.gif.request_preview(&query).await;
                    // The draft may have moved on while the search ran.
                    let current = self.draft().await;
                    self.gif.sync_with_draft(&current).await;
                    return SendOutcome::PreviewRequested;
                }
                GifPhase::Ready | GifPhase::Empty | GifPhase::Error => {}
            }
        }

        if let Some(confirmed) = self.gif.confirm_selection(&draft).await {
            return self.dispatch_gif(target, confirmed).await;
        }

        let body = if trimmed.is_empty() {
            ATTACHMENT_ONLY_PLACEHOLDER.to_string()
        } else {
            trimmed.to_string()
        };
        self.dispatch(
            target,
            OutboundMessage {
                body,
                attachments: assets,
            },
            None,
        )
        .await
    }

    /// Enter-to-send, for channels that wire it. `None` when the key is not a submit.
    pub async fn handle_key(&self, key: KeyPress) -> Option<SendOutcome> {
        if !self.channel.submits_on_enter() || !key.is_plain_enter() {
            return None;
        }
        Some(self.send().await)
    }

    /// Sends the selected GIF on its own, leaving any typed text out of the message.
    pub async fn confirm_gif(&self) -> SendOutcome {
        let (draft, target) = match self.send_gate().await {
            Ok(ready) => ready,
            Err(outcome) => return outcome,
        };
        self.gif.sync_with_draft(&draft).await;
        match self.gif.confirm_selection(&draft).await {
            Some(confirmed) => self.dispatch_gif(target, confirmed).await,
            None => SendOutcome::Ignored,
        }
    }

    pub async fn shuffle_gif(&self) {
        let draft = self.draft().await;
        self.gif.sync_with_draft(&draft).await;
        self.gif.shuffle_selection(&draft).await;
    }

    pub async fn cancel_gif(&self) {
        self.gif.cancel().await;
    }

    pub async fn gif_snapshot(&self) -> GifPreviewSnapshot {
        self.gif.snapshot().await
    }

    async fn upload_gate(&self) -> Option<ComposerIssue> {
        let state = self.state.lock().await;
        if state.offline {
            Some(ComposerIssue::OfflineBlocked {
                action: "upload images",
            })
        } else if !state.has_access {
            Some(ComposerIssue::AccessRevoked {
                message: self.channel.access_revoked_message(),
            })
        } else if state.target.is_none() {
            Some(ComposerIssue::NoTargetForUpload {
                message: self.channel.no_target_upload_message(),
            })
        } else {
            None
        }
    }

    /// Checks shared by every send path, in order: access, connectivity, target, in-flight.
    async fn send_gate(&self) -> Result<(String, C::Target), SendOutcome> {
        let issue = {
            let state = self.state.lock().await;
            if !state.has_access {
                ComposerIssue::AccessRevoked {
                    message: self.channel.access_revoked_message(),
                }
            } else if state.offline {
                ComposerIssue::OfflineBlocked {
                    action: "send messages",
                }
            } else {
                match &state.target {
                    Some(_) if state.sending => {
                        debug!("send skipped; a message is already being sent");
                        return Err(SendOutcome::Ignored);
                    }
                    Some(target) => return Ok((state.draft.clone(), target.clone())),
                    None => {
                        debug!(kind = ?self.channel.kind(), "send skipped; no target selected");
                        ComposerIssue::NoTarget
                    }
                }
            }
        };
        match issue.to_status() {
            Some(status) => {
                self.attachments.set_status(Some(status)).await;
                Err(SendOutcome::Blocked)
            }
            None => Err(SendOutcome::Ignored),
        }
    }

    async fn dispatch_gif(&self, target: C::Target, confirmed: ConfirmedGif) -> SendOutcome {
        let message = OutboundMessage {
            body: confirmed.message_body(),
            attachments: vec![confirmed.attachment],
        };
        self.dispatch(target, message, Some(confirmed.draft)).await
    }

    /// `gif_remainder` is the draft left once a GIF's command line is stripped; it stays in
    /// the composer after the GIF goes out.
    async fn dispatch(
        &self,
        target: C::Target,
        message: OutboundMessage,
        gif_remainder: Option<String>,
    ) -> SendOutcome {
        let gif = gif_remainder.is_some();
        {
            let mut state = self.state.lock().await;
            if state.sending {
                return SendOutcome::Ignored;
            }
            state.sending = true;
        }

        let attachment_count = message.attachments.len();
        let result = self.channel.dispatch(&target, message).await;
        self.state.lock().await.sending = false;

        match result {
            Ok(true) => {
                self.state.lock().await.draft = gif_remainder.unwrap_or_default();
                self.attachments.reset().await;
                self.gif.cancel().await;
                self.focus.focus(&self.input);
                info!(
                    kind = ?self.channel.kind(),
                    recipient = %target,
                    attachments = attachment_count,
                    gif,
                    "message sent"
                );
                let _ = self.events.send(ComposerEvent::MessageSent {
                    kind: self.channel.kind(),
                    target: target.to_string(),
                    attachments: attachment_count,
                });
                SendOutcome::Sent { gif }
            }
            Ok(false) => {
                warn!(recipient = %target, "message was not dispatched");
                self.attachments
                    .report(&ComposerIssue::send_failure(""))
                    .await;
                SendOutcome::Failed
            }
            Err(err) => {
                warn!(recipient = %target, "message send failed: {err:#}");
                self.attachments
                    .report(&ComposerIssue::send_failure(err.to_string()))
                    .await;
                SendOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/composer_tests.rs"]
mod tests;
