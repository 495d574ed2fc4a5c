use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{ChannelKind, ChannelTab, RoomId, ThreadId},
    protocol::{DirectMessageRequest, GifSearchResponse, RoomMessageRequest, UploadedImage},
};

pub mod attachments;
pub mod channel_tabs;
pub mod composer;
pub mod config;
pub mod error;
pub mod gif;
pub mod scroll_anchor;
pub mod transport;
pub mod types;

pub use attachments::AttachmentUploadManager;
pub use channel_tabs::{
    ChannelTabCollaborators, ChannelTabController, InMemoryTabMemory, NavigationSnapshot,
};
pub use composer::{
    ComposerChannel, ComposerOrchestrator, DirectChannel, DirectComposer, KeyPress, OutboundMessage,
    RoomChannel, RoomComposer, SendOutcome,
};
pub use config::{load_settings, ComposerSettings};
pub use error::ComposerIssue;
pub use gif::{ConfirmedGif, GifSearchController};
pub use scroll_anchor::{ScrollAnchorController, ScrollMetrics};
pub use transport::HttpChatBackend;
pub use types::*;

#[async_trait]
pub trait AttachmentUploader: Send + Sync {
    async fn upload(&self, file: &PendingFile) -> Result<UploadedImage>;
}

/// Searches GIFs. An empty `results` list is a valid answer, not an error.
#[async_trait]
pub trait GifSearcher: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<GifSearchResponse>;
}

pub struct MissingGifSearcher;

#[async_trait]
impl GifSearcher for MissingGifSearcher {
    async fn search(&self, _query: &str, _limit: usize) -> Result<GifSearchResponse> {
        Err(anyhow!("GIF search is unavailable."))
    }
}

#[async_trait]
pub trait RoomMessageSender: Send + Sync {
    async fn send_room_message(&self, room_id: &RoomId, request: RoomMessageRequest)
        -> Result<bool>;
}

#[async_trait]
pub trait DirectMessageSender: Send + Sync {
    async fn send_direct_message(
        &self,
        thread_id: &ThreadId,
        request: DirectMessageRequest,
    ) -> Result<()>;
}

/// Zero-argument refresh (thread list, friend graph). Invoked best-effort.
#[async_trait]
pub trait ChannelRefresher: Send + Sync {
    async fn refresh(&self) -> Result<()>;
}

pub trait ThreadSelector: Send + Sync {
    fn select_thread(&self, thread_id: &ThreadId);
}

pub trait TabMemory: Send + Sync {
    fn remember(&self, tab: ChannelTab);
    fn recall(&self) -> Option<ChannelTab>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRef(pub String);

pub trait ComposerFocus: Send + Sync {
    fn focus(&self, input: &InputRef);
}

pub struct NoopFocus;

impl ComposerFocus for NoopFocus {
    fn focus(&self, _input: &InputRef) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComposerEvent {
    UploadProgress(Option<UploadProgress>),
    StatusChanged(Option<ComposerStatus>),
    GifPreviewChanged(GifPhase),
    MessageSent {
        kind: ChannelKind,
        target: String,
        attachments: usize,
    },
}
