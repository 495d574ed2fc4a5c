use std::sync::{Arc, Mutex as StdMutex};

use shared::domain::{ChannelTab, ThreadId};
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::debug;

use crate::{types::ChannelSelection, ChannelRefresher, TabMemory, ThreadSelector};

/// Read-only navigation parameters (`tab`, `thread`) as carried in a query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationSnapshot {
    params: Vec<(String, String)>,
}

impl NavigationSnapshot {
    pub fn from_query(query: &str) -> Self {
        let query = query.trim_start_matches('?');
        Self {
            params: url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
        }
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    /// First value for `key`; empty values count as missing.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
            .filter(|value| !value.is_empty())
    }
}

pub struct ChannelTabCollaborators {
    pub direct_threads: Arc<dyn ChannelRefresher>,
    pub friend_graph: Arc<dyn ChannelRefresher>,
    pub thread_selector: Arc<dyn ThreadSelector>,
    pub tab_memory: Arc<dyn TabMemory>,
}

#[derive(Default)]
pub struct InMemoryTabMemory {
    last: StdMutex<Option<ChannelTab>>,
}

impl TabMemory for InMemoryTabMemory {
    fn remember(&self, tab: ChannelTab) {
        if let Ok(mut last) = self.last.lock() {
            *last = Some(tab);
        }
    }

    fn recall(&self) -> Option<ChannelTab> {
        self.last.lock().ok().and_then(|last| *last)
    }
}

struct TabState {
    selection: ChannelSelection,
    has_direct_access: bool,
    selected_thread: Option<ThreadId>,
}

/// Derives the active channel tab from navigation and explicit switches, refreshing the
/// data behind direct and friends when they are entered.
pub struct ChannelTabController {
    collaborators: ChannelTabCollaborators,
    state: Mutex<TabState>,
    refreshes: Mutex<Vec<JoinHandle<()>>>,
}

impl ChannelTabController {
    pub fn new(collaborators: ChannelTabCollaborators) -> Self {
        Self {
            collaborators,
            state: Mutex::new(TabState {
                selection: ChannelSelection::default(),
                has_direct_access: true,
                selected_thread: None,
            }),
            refreshes: Mutex::new(Vec::new()),
        }
    }

    pub async fn selection(&self) -> ChannelSelection {
        self.state.lock().await.selection
    }

    pub async fn selected_thread(&self) -> Option<ThreadId> {
        self.state.lock().await.selected_thread.clone()
    }

    /// Re-derives the selection from a navigation change. Unknown or missing tabs mean
    /// rooms.
    pub async fn apply_navigation(&self, snapshot: &NavigationSnapshot) -> ChannelSelection {
        let mut thread_to_select = None;
        let (previous, next) = {
            let mut state = self.state.lock().await;
            let previous = state.selection;
            let requested = snapshot.get("tab").and_then(ChannelTab::parse);
            state.selection = match requested {
                Some(ChannelTab::Direct) if state.has_direct_access => {
                    if let Some(thread) = snapshot.get("thread") {
                        let thread = ThreadId::new(thread);
                        state.selected_thread = Some(thread.clone());
                        thread_to_select = Some(thread);
                    }
                    ChannelSelection {
                        active_tab: ChannelTab::Direct,
                        dialog_tab: ChannelTab::Direct,
                    }
                }
                Some(ChannelTab::Friends) => ChannelSelection {
                    active_tab: ChannelTab::Friends,
                    dialog_tab: ChannelTab::Friends,
                },
                Some(ChannelTab::Direct) => ChannelSelection::default(),
                _ => ChannelSelection {
                    active_tab: ChannelTab::Rooms,
                    dialog_tab: match previous.dialog_tab {
                        ChannelTab::Direct => ChannelTab::Rooms,
                        other => other,
                    },
                },
            };
            (previous, state.selection)
        };

        if let Some(thread) = thread_to_select {
            self.collaborators.thread_selector.select_thread(&thread);
        }
        self.entered(previous.active_tab, next.active_tab).await;
        next
    }

    /// Explicit tab switch. Direct without access falls back to rooms.
    pub async fn select_tab(&self, tab: ChannelTab) -> ChannelSelection {
        let (previous, next) = {
            let mut state = self.state.lock().await;
            let previous = state.selection;
            let tab = match tab {
                ChannelTab::Direct if !state.has_direct_access => ChannelTab::Rooms,
                tab => tab,
            };
            state.selection = ChannelSelection {
                active_tab: tab,
                dialog_tab: tab,
            };
            (previous, state.selection)
        };
        self.entered(previous.active_tab, next.active_tab).await;
        next
    }

    pub async fn select_thread(&self, thread_id: ThreadId) -> ChannelSelection {
        if !self.state.lock().await.has_direct_access {
            return self.selection().await;
        }
        self.collaborators.thread_selector.select_thread(&thread_id);
        self.state.lock().await.selected_thread = Some(thread_id);
        self.select_tab(ChannelTab::Direct).await
    }

    pub async fn set_direct_access(&self, has_access: bool) -> ChannelSelection {
        let on_direct = {
            let mut state = self.state.lock().await;
            state.has_direct_access = has_access;
            if !has_access && state.selection.dialog_tab == ChannelTab::Direct {
                state.selection.dialog_tab = ChannelTab::Rooms;
            }
            state.selection.active_tab == ChannelTab::Direct
        };
        if !has_access && on_direct {
            return self.select_tab(ChannelTab::Rooms).await;
        }
        self.selection().await
    }

    /// Picks the first thread when direct is active and nothing is selected yet.
    pub async fn select_default_thread(&self, threads: &[ThreadId]) -> Option<ThreadId> {
        let chosen = {
            let mut state = self.state.lock().await;
            if state.selection.active_tab != ChannelTab::Direct || state.selected_thread.is_some()
            {
                return None;
            }
            let first = threads.first()?.clone();
            state.selected_thread = Some(first.clone());
            first
        };
        self.collaborators.thread_selector.select_thread(&chosen);
        Some(chosen)
    }

    pub fn last_conversation_tab(&self) -> ChannelTab {
        self.collaborators.tab_memory.recall().unwrap_or_default()
    }

    pub async fn restore_last_tab(&self) -> ChannelSelection {
        self.select_tab(self.last_conversation_tab()).await
    }

    pub async fn drain_refreshes(&self) {
        let pending = std::mem::take(&mut *self.refreshes.lock().await);
        for handle in pending {
            let _ = handle.await;
        }
    }

    async fn entered(&self, previous: ChannelTab, next: ChannelTab) {
        if next.is_conversational() {
            self.collaborators.tab_memory.remember(next);
        }
        if previous == next {
            return;
        }
        let refresher = match next {
            ChannelTab::Direct => ("direct_threads", &self.collaborators.direct_threads),
            ChannelTab::Friends => ("friend_graph", &self.collaborators.friend_graph),
            ChannelTab::Rooms => return,
        };
        let handle = spawn_refresh(refresher.0, Arc::clone(refresher.1));
        self.refreshes.lock().await.push(handle);
    }
}

fn spawn_refresh(name: &'static str, refresher: Arc<dyn ChannelRefresher>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = refresher.refresh().await {
            debug!(refresh = name, "channel refresh failed: {err:#}");
        }
    })
}

#[cfg(test)]
#[path = "tests/channel_tabs_tests.rs"]
mod tests;
