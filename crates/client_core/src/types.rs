use std::path::Path;

use anyhow::{Context, Result};
use shared::{
    domain::{AttachmentId, ChannelTab},
    protocol::{AttachmentAsset, GifOption, UploadedImage},
};

pub const MAX_CHAT_ATTACHMENTS: usize = 10;
pub const ATTACHMENT_ONLY_PLACEHOLDER: &str = "[attachment]";

const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "tiff", "heic", "heif", "avif",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl PendingFile {
    pub fn new(
        file_name: impl Into<String>,
        mime_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.map(str::to_string),
            bytes,
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read attachment '{}'", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("attachment")
            .to_string();
        let mime_type = mime_guess::from_path(path)
            .first()
            .map(|mime| mime.essence_str().to_string());
        Ok(Self {
            file_name,
            mime_type,
            bytes,
        })
    }

    /// `image/*` MIME types, or a known image/GIF extension when the type is missing or generic.
    pub fn is_supported_image(&self) -> bool {
        let mime_is_image = self
            .mime_type
            .as_deref()
            .map(|mime| mime.trim().to_ascii_lowercase().starts_with("image/"))
            .unwrap_or(false);
        mime_is_image || is_image_filename(&self.file_name)
    }
}

pub fn is_image_filename(file_name: &str) -> bool {
    let Some((_, ext)) = file_name.rsplit_once('.') else {
        return false;
    };
    SUPPORTED_IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub id: AttachmentId,
    pub asset: AttachmentAsset,
}

impl Attachment {
    pub fn from_upload(file: &PendingFile, uploaded: UploadedImage) -> Self {
        Self {
            id: AttachmentId::new(uuid::Uuid::new_v4().to_string()),
            asset: AttachmentAsset {
                url: uploaded.url,
                width: uploaded.width,
                height: uploaded.height,
                mime_type: uploaded.mime_type.or_else(|| file.mime_type.clone()),
                description: Some(file.file_name.clone()),
                uploaded_at: uploaded.uploaded_at,
            },
        }
    }
}

pub fn attachment_payloads(attachments: &[Attachment]) -> Vec<AttachmentAsset> {
    attachments.iter().map(|item| item.asset.clone()).collect()
}

/// Maps the attachment-only placeholder body back to empty text for display.
pub fn sanitize_attachment_only_message<'a>(
    message: &'a str,
    attachments: &[AttachmentAsset],
) -> &'a str {
    if !attachments.is_empty() && message == ATTACHMENT_ONLY_PLACEHOLDER {
        ""
    } else {
        message
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Error,
}

/// Transient composer feedback; overwritten by the next operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposerStatus {
    pub kind: StatusKind,
    pub message: String,
}

impl ComposerStatus {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Error,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == StatusKind::Error
    }
}

/// Progress of the batch in flight. `completed <= total` always.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub total: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub added: usize,
    pub failed: usize,
    pub overflow: usize,
    pub unsupported: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GifPreviewState {
    pub query: String,
    pub options: Vec<GifOption>,
    pub selected_index: Option<usize>,
}

impl GifPreviewState {
    pub fn pending(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            options: Vec::new(),
            selected_index: None,
        }
    }

    pub fn selected(&self) -> Option<&GifOption> {
        self.selected_index.and_then(|index| self.options.get(index))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GifPhase {
    Idle,
    Searching,
    Ready,
    Empty,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GifPreviewSnapshot {
    pub phase: GifPhase,
    pub preview: Option<GifPreviewState>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelSelection {
    pub active_tab: ChannelTab,
    pub dialog_tab: ChannelTab,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollAnchorState {
    pub show_jump_to_latest: bool,
    pub latest_button_offset: f64,
}
