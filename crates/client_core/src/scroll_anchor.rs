//! Keeps the message list pinned to the newest message and places the jump-to-latest
//! button above the composer.
//!
//! The controller owns no timers. Hosts feed it the current [`Instant`], poll it at
//! [`ScrollAnchorController::next_deadline`], and call
//! [`ScrollAnchorController::on_animation_frame`] once per rendered frame.

use std::time::{Duration, Instant};

use shared::domain::ChannelTab;

use crate::{config::ComposerSettings, types::ScrollAnchorState};

/// Distance from the bottom, in px, past which the jump-to-latest button shows.
pub const JUMP_TO_LATEST_THRESHOLD: f64 = 20.0;
const BUTTON_GAP: f64 = 8.0;
const OFFSET_EPSILON: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_height: f64,
    pub scroll_top: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    pub fn distance_from_bottom(&self) -> f64 {
        self.scroll_height - self.scroll_top - self.client_height
    }
}

#[derive(Debug)]
pub struct ScrollAnchorController {
    target_settle: Duration,
    message_settle: Duration,
    scroll_due: Option<Instant>,
    offset_due: Option<f64>,
    state: ScrollAnchorState,
}

impl ScrollAnchorController {
    pub fn new(target_settle: Duration, message_settle: Duration) -> Self {
        Self {
            target_settle,
            message_settle,
            scroll_due: None,
            offset_due: None,
            state: ScrollAnchorState::default(),
        }
    }

    pub fn from_settings(settings: &ComposerSettings) -> Self {
        Self::new(settings.target_settle, settings.message_settle)
    }

    pub fn state(&self) -> ScrollAnchorState {
        self.state
    }

    /// Room, thread or route changed. A pending scroll is rescheduled, not duplicated.
    pub fn on_target_changed(&mut self, now: Instant) {
        self.scroll_due = Some(now + self.target_settle);
    }

    /// New content in `tab`. Only rooms and direct with at least one message scroll.
    pub fn on_messages_changed(&mut self, tab: ChannelTab, message_count: usize, now: Instant) {
        if tab.is_conversational() && message_count > 0 {
            self.scroll_due = Some(now + self.message_settle);
        }
    }

    pub fn anchor_to_bottom(&mut self, now: Instant) {
        self.scroll_due = Some(now);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scroll_due
    }

    /// `true` once the settle delay has passed; the host then scrolls to the bottom.
    pub fn poll_scroll(&mut self, now: Instant) -> bool {
        match self.scroll_due {
            Some(due) if due <= now => {
                self.scroll_due = None;
                true
            }
            _ => false,
        }
    }

    pub fn on_scroll(&mut self, metrics: ScrollMetrics) -> bool {
        let show = metrics.distance_from_bottom() > JUMP_TO_LATEST_THRESHOLD;
        let changed = show != self.state.show_jump_to_latest;
        self.state.show_jump_to_latest = show;
        changed
    }

    /// Composer resized. Only the latest height before the next frame is applied.
    pub fn on_composer_resized(&mut self, height: f64) {
        self.offset_due = Some(height.round() + BUTTON_GAP);
    }

    /// Applies a pending offset if it moved by more than half a pixel. Returns whether
    /// the offset changed.
    pub fn on_animation_frame(&mut self) -> bool {
        let Some(target) = self.offset_due.take() else {
            return false;
        };
        if (self.state.latest_button_offset - target).abs() > OFFSET_EPSILON {
            self.state.latest_button_offset = target;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
#[path = "tests/scroll_anchor_tests.rs"]
mod tests;
