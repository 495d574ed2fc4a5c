//! `/gif <query>` previews: a cancellable search whose results are applied only while the
//! request that produced them is still the current one.

use std::sync::Arc;

use shared::protocol::AttachmentAsset;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use crate::{
    error::ComposerIssue,
    types::{GifPhase, GifPreviewSnapshot, GifPreviewState},
    ComposerEvent, GifSearcher,
};

pub const GIF_PREVIEW_LIMIT: usize = 12;

const GIF_COMMAND: &str = "/gif";

/// Query of a `/gif <query>` draft, taken from the command line only.
pub fn gif_command_query(draft: &str) -> Option<String> {
    let trimmed = draft.trim();
    let head = trimmed.get(..GIF_COMMAND.len())?;
    if !head.eq_ignore_ascii_case(GIF_COMMAND) {
        return None;
    }
    let rest = &trimmed[GIF_COMMAND.len()..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let query = rest.lines().next()?.trim();
    (!query.is_empty()).then(|| query.to_string())
}

pub fn strip_gif_command(draft: &str) -> String {
    let lowered = draft.to_ascii_lowercase();
    let Some(start) = lowered.find(GIF_COMMAND) else {
        return draft.trim().to_string();
    };
    let end = draft[start..]
        .find('\n')
        .map(|offset| start + offset)
        .unwrap_or(draft.len());
    format!("{}{}", &draft[..start], &draft[end..])
        .trim()
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GenerationToken(u64);

/// The selection handed to the composer. Nothing is sent or cleared by confirming.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedGif {
    pub attachment: AttachmentAsset,
    pub query: String,
    pub draft: String,
}

impl ConfirmedGif {
    pub fn message_body(&self) -> String {
        format!("GIF: {}", self.query)
    }
}

#[derive(Default)]
struct GifState {
    preview: Option<GifPreviewState>,
    notice: Option<ComposerIssue>,
    loading: bool,
    current: Option<GenerationToken>,
    next_token: u64,
}

impl GifState {
    fn phase(&self) -> GifPhase {
        if self.loading {
            return GifPhase::Searching;
        }
        match (&self.notice, &self.preview) {
            (Some(ComposerIssue::GifSearchEmpty { .. }), _) => GifPhase::Empty,
            (Some(_), _) => GifPhase::Error,
            (None, Some(preview)) if !preview.options.is_empty() => GifPhase::Ready,
            _ => GifPhase::Idle,
        }
    }

    fn issue_token(&mut self) -> GenerationToken {
        self.next_token = self.next_token.wrapping_add(1);
        let token = GenerationToken(self.next_token);
        self.current = Some(token);
        token
    }

    fn is_active(&self) -> bool {
        self.preview.is_some() || self.notice.is_some() || self.loading
    }

    fn clear(&mut self) {
        self.current = None;
        self.preview = None;
        self.notice = None;
        self.loading = false;
    }
}

pub struct GifSearchController {
    searcher: Arc<dyn GifSearcher>,
    limit: usize,
    state: Mutex<GifState>,
    events: broadcast::Sender<ComposerEvent>,
}

impl GifSearchController {
    pub fn new(
        searcher: Arc<dyn GifSearcher>,
        limit: usize,
        events: broadcast::Sender<ComposerEvent>,
    ) -> Self {
        Self {
            searcher,
            limit,
            state: Mutex::new(GifState::default()),
            events,
        }
    }

    /// Returns the phase left once this request settles, which is a newer request's phase
    /// if this one was superseded or cancelled.
    pub async fn request_preview(&self, query: &str) -> GifPhase {
        let query = query.trim();
        if query.is_empty() {
            return self.phase().await;
        }

        let token = {
            let mut state = self.state.lock().await;
            let token = state.issue_token();
            state.preview = Some(GifPreviewState::pending(query));
            state.notice = None;
            state.loading = true;
            token
        };
        self.emit(GifPhase::Searching);

        let result = self.searcher.search(query, self.limit).await;

        let phase = {
            let mut state = self.state.lock().await;
            if state.current != Some(token) {
                debug!(query, "discarding stale GIF search result");
                return state.phase();
            }
            state.loading = false;
            match result {
                Ok(response) if response.results.is_empty() => {
                    state.preview = Some(GifPreviewState::pending(query));
                    state.notice = Some(ComposerIssue::GifSearchEmpty {
                        query: query.to_string(),
                    });
                }
                Ok(response) => {
                    state.preview = Some(GifPreviewState {
                        query: query.to_string(),
                        options: response.results,
                        selected_index: Some(0),
                    });
                }
                Err(err) => {
                    debug!(query, "GIF search failed: {err:#}");
                    state.notice = Some(ComposerIssue::gif_search_failure(err.to_string()));
                }
            }
            state.phase()
        };
        self.emit(phase);
        phase
    }

    /// Cycles through several options; with one or none, searches the same query again.
    pub async fn shuffle_selection(&self, draft: &str) {
        let (cycled, requery) = {
            let mut state = self.state.lock().await;
            if state.loading {
                return;
            }
            match state.preview.as_mut() {
                None => (false, gif_command_query(draft)),
                Some(preview) if preview.options.len() > 1 => {
                    let next = preview
                        .selected_index
                        .map(|index| (index + 1) % preview.options.len())
                        .unwrap_or(0);
                    preview.selected_index = Some(next);
                    (true, None)
                }
                Some(preview) => (false, Some(preview.query.clone())),
            }
        };
        if cycled {
            self.emit(GifPhase::Ready);
        } else if let Some(query) = requery {
            self.request_preview(&query).await;
        }
    }

    pub async fn confirm_selection(&self, draft: &str) -> Option<ConfirmedGif> {
        let state = self.state.lock().await;
        if state.loading {
            return None;
        }
        let preview = state.preview.as_ref()?;
        let selected = preview.selected()?;
        Some(ConfirmedGif {
            attachment: selected.attachment.clone(),
            query: preview.query.clone(),
            draft: strip_gif_command(draft),
        })
    }

    /// Clears the preview. A search still in flight resolves into nothing.
    pub async fn cancel(&self) {
        let was_active = {
            let mut state = self.state.lock().await;
            let was_active = state.is_active();
            state.clear();
            was_active
        };
        if was_active {
            self.emit(GifPhase::Idle);
        }
    }

    /// Cancels when the draft no longer holds a command, or when its query moved away from
    /// a settled preview.
    pub async fn sync_with_draft(&self, draft: &str) {
        let cleared = {
            let mut state = self.state.lock().await;
            let stale = match gif_command_query(draft) {
                None => state.is_active(),
                Some(query) => {
                    !state.loading
                        && state
                            .preview
                            .as_ref()
                            .is_some_and(|preview| preview.query != query)
                }
            };
            if stale {
                state.clear();
            }
            stale
        };
        if cleared {
            self.emit(GifPhase::Idle);
        }
    }

    pub async fn phase(&self) -> GifPhase {
        self.state.lock().await.phase()
    }

    pub async fn snapshot(&self) -> GifPreviewSnapshot {
        let state = self.state.lock().await;
        GifPreviewSnapshot {
            phase: state.phase(),
            preview: state.preview.clone(),
            message: state.notice.as_ref().map(ToString::to_string),
        }
    }

    fn emit(&self, phase: GifPhase) {
        let _ = self.events.send(ComposerEvent::GifPreviewChanged(phase));
    }
}

#[cfg(test)]
#[path = "tests/gif_tests.rs"]
mod tests;
