//! Composer failure taxonomy. Every issue is converted into status state; none escape a
//! composer action as an error.

use thiserror::Error;

use crate::types::ComposerStatus;

fn plural(count: &usize) -> &'static str {
    if *count == 1 {
        ""
    } else {
        "s"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComposerIssue {
    #[error("Only the first {accepted} file{} were attached.", plural(.accepted))]
    Overflow { accepted: usize },
    #[error("Unsupported file type removed. Only image and GIF files are supported.")]
    UnsupportedType,
    #[error("Failed to upload {count} attachment{}. You can retry.", plural(.count))]
    UploadFailure { count: usize },
    #[error("You can attach up to {max} images per message.")]
    CapacityExceeded { max: usize },
    #[error("Reconnect to {action}.")]
    OfflineBlocked { action: &'static str },
    #[error("{message}")]
    AccessRevoked { message: &'static str },
    #[error("no room or thread selected")]
    NoTarget,
    #[error("{message}")]
    NoTargetForUpload { message: &'static str },
    #[error("Please wait for uploads to finish.")]
    UploadInFlight,
    #[error("No GIFs found for \"{query}\". Try another search.")]
    GifSearchEmpty { query: String },
    #[error("{message}")]
    GifSearchFailure { message: String },
    #[error("{message}")]
    SendFailure { message: String },
}

impl ComposerIssue {
    pub const GIF_SEARCH_FALLBACK: &'static str = "Failed to load GIF preview.";
    pub const SEND_FALLBACK: &'static str = "Failed to send message.";

    pub fn gif_search_failure(message: impl Into<String>) -> Self {
        Self::GifSearchFailure {
            message: non_empty_or(message.into(), Self::GIF_SEARCH_FALLBACK),
        }
    }

    pub fn send_failure(message: impl Into<String>) -> Self {
        Self::SendFailure {
            message: non_empty_or(message.into(), Self::SEND_FALLBACK),
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(
            self,
            Self::Overflow { .. } | Self::UploadInFlight | Self::NoTarget | Self::GifSearchEmpty { .. }
        )
    }

    /// Status shown for this issue. `NoTarget` is silent; the host is expected to prevent it.
    pub fn to_status(&self) -> Option<ComposerStatus> {
        match self {
            Self::NoTarget => None,
            issue if issue.is_error() => Some(ComposerStatus::error(issue.to_string())),
            issue => Some(ComposerStatus::info(issue.to_string())),
        }
    }
}

fn non_empty_or(message: String, fallback: &str) -> String {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatusKind;

    #[test]
    fn overflow_message_names_accepted_count() {
        let issue = ComposerIssue::Overflow { accepted: 1 };
        assert_eq!(issue.to_string(), "Only the first 1 file were attached.");
        assert_eq!(issue.to_status().map(|s| s.kind), Some(StatusKind::Info));

        let issue = ComposerIssue::Overflow { accepted: 3 };
        assert_eq!(issue.to_string(), "Only the first 3 files were attached.");
    }

    #[test]
    fn no_target_is_silent() {
        assert_eq!(ComposerIssue::NoTarget.to_status(), None);
    }

    #[test]
    fn blank_collaborator_messages_fall_back() {
        assert_eq!(
            ComposerIssue::gif_search_failure("  ").to_string(),
            ComposerIssue::GIF_SEARCH_FALLBACK
        );
        assert_eq!(
            ComposerIssue::send_failure("thread archived").to_string(),
            "thread archived"
        );
    }
}
