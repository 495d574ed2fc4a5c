use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

#[derive(Default)]
struct CountingRefresher {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl ChannelRefresher for CountingRefresher {
    async fn refresh(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("threads endpoint unavailable"));
        }
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSelector {
    selected: StdMutex<Vec<ThreadId>>,
}

impl ThreadSelector for RecordingSelector {
    fn select_thread(&self, thread_id: &ThreadId) {
        self.selected
            .lock()
            .expect("selector lock")
            .push(thread_id.clone());
    }
}

struct Fixture {
    controller: ChannelTabController,
    direct_threads: Arc<CountingRefresher>,
    friend_graph: Arc<CountingRefresher>,
    selector: Arc<RecordingSelector>,
    memory: Arc<InMemoryTabMemory>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_direct_refresher(CountingRefresher::default())
    }

    fn with_direct_refresher(direct_threads: CountingRefresher) -> Self {
        let direct_threads = Arc::new(direct_threads);
        let friend_graph = Arc::new(CountingRefresher::default());
        let selector = Arc::new(RecordingSelector::default());
        let memory = Arc::new(InMemoryTabMemory::default());
        let controller = ChannelTabController::new(ChannelTabCollaborators {
            direct_threads: direct_threads.clone(),
            friend_graph: friend_graph.clone(),
            thread_selector: selector.clone(),
            tab_memory: memory.clone(),
        });
        Self {
            controller,
            direct_threads,
            friend_graph,
            selector,
            memory,
        }
    }

    fn selected_threads(&self) -> Vec<ThreadId> {
        self.selector.selected.lock().expect("selector lock").clone()
    }
}

fn selection(active_tab: ChannelTab, dialog_tab: ChannelTab) -> ChannelSelection {
    ChannelSelection {
        active_tab,
        dialog_tab,
    }
}

#[test]
fn navigation_snapshot_reads_query_strings() {
    let snapshot = NavigationSnapshot::from_query("?tab=direct&thread=t%2042&tab=friends");
    assert_eq!(snapshot.get("tab"), Some("direct"));
    assert_eq!(snapshot.get("thread"), Some("t 42"));
    assert_eq!(NavigationSnapshot::from_query("thread=").get("thread"), None);
}

#[tokio::test]
async fn unknown_or_missing_tab_defaults_to_rooms() {
    let fixture = Fixture::new();

    let derived = fixture
        .controller
        .apply_navigation(&NavigationSnapshot::from_query("tab=settings"))
        .await;
    assert_eq!(derived, selection(ChannelTab::Rooms, ChannelTab::Rooms));

    let derived = fixture
        .controller
        .apply_navigation(&NavigationSnapshot::default())
        .await;
    assert_eq!(derived.active_tab, ChannelTab::Rooms);
}

#[tokio::test]
async fn entering_direct_selects_thread_and_refreshes_once() {
    let fixture = Fixture::new();
    let snapshot = NavigationSnapshot::from_query("tab=direct&thread=thread-7");

    let derived = fixture.controller.apply_navigation(&snapshot).await;
    fixture.controller.apply_navigation(&snapshot).await;
    fixture.controller.drain_refreshes().await;

    assert_eq!(derived, selection(ChannelTab::Direct, ChannelTab::Direct));
    assert_eq!(fixture.direct_threads.calls.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.friend_graph.calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        fixture.controller.selected_thread().await,
        Some(ThreadId::new("thread-7"))
    );
    assert_eq!(fixture.selected_threads().len(), 2);
    assert_eq!(fixture.memory.recall(), Some(ChannelTab::Direct));
}

#[tokio::test]
async fn direct_without_access_falls_back_to_rooms() {
    let fixture = Fixture::new();
    fixture.controller.set_direct_access(false).await;

    let derived = fixture
        .controller
        .apply_navigation(&NavigationSnapshot::from_query("tab=direct&thread=t1"))
        .await;
    assert_eq!(derived, selection(ChannelTab::Rooms, ChannelTab::Rooms));
    assert!(fixture.selected_threads().is_empty());

    let switched = fixture.controller.select_tab(ChannelTab::Direct).await;
    assert_eq!(switched.active_tab, ChannelTab::Rooms);

    fixture.controller.drain_refreshes().await;
    assert_eq!(fixture.direct_threads.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn losing_access_on_direct_returns_to_rooms() {
    let fixture = Fixture::new();
    fixture.controller.select_tab(ChannelTab::Direct).await;

    let derived = fixture.controller.set_direct_access(false).await;

    assert_eq!(derived, selection(ChannelTab::Rooms, ChannelTab::Rooms));
    assert_eq!(fixture.memory.recall(), Some(ChannelTab::Rooms));
}

#[tokio::test]
async fn friends_refreshes_graph_and_is_not_remembered() {
    let fixture = Fixture::new();
    fixture.controller.select_tab(ChannelTab::Direct).await;

    let derived = fixture
        .controller
        .apply_navigation(&NavigationSnapshot::from_query("tab=friends"))
        .await;
    fixture.controller.drain_refreshes().await;

    assert_eq!(derived, selection(ChannelTab::Friends, ChannelTab::Friends));
    assert_eq!(fixture.friend_graph.calls.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.controller.last_conversation_tab(), ChannelTab::Direct);

    let restored = fixture.controller.restore_last_tab().await;
    assert_eq!(restored, selection(ChannelTab::Direct, ChannelTab::Direct));
}

#[tokio::test]
async fn leaving_direct_via_navigation_collapses_dialog_tab() {
    let fixture = Fixture::new();
    fixture
        .controller
        .apply_navigation(&NavigationSnapshot::from_query("tab=direct"))
        .await;

    let derived = fixture
        .controller
        .apply_navigation(&NavigationSnapshot::from_query("tab=rooms"))
        .await;
    assert_eq!(derived, selection(ChannelTab::Rooms, ChannelTab::Rooms));

    fixture.controller.select_tab(ChannelTab::Friends).await;
    let derived = fixture
        .controller
        .apply_navigation(&NavigationSnapshot::default())
        .await;
    assert_eq!(derived, selection(ChannelTab::Rooms, ChannelTab::Friends));
}

#[tokio::test]
async fn refresh_failures_are_swallowed() {
    let fixture = Fixture::with_direct_refresher(CountingRefresher {
        fail: true,
        ..CountingRefresher::default()
    });

    let derived = fixture.controller.select_tab(ChannelTab::Direct).await;
    fixture.controller.drain_refreshes().await;

    assert_eq!(derived.active_tab, ChannelTab::Direct);
    assert_eq!(fixture.direct_threads.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn default_thread_is_chosen_only_once_on_direct() {
    let fixture = Fixture::new();
    let threads = vec![ThreadId::new("a"), ThreadId::new("b")];

    assert_eq!(fixture.controller.select_default_thread(&threads).await, None);

    fixture.controller.select_tab(ChannelTab::Direct).await;
    assert_eq!(fixture.controller.select_default_thread(&[]).await, None);
    assert_eq!(
        fixture.controller.select_default_thread(&threads).await,
        Some(ThreadId::new("a"))
    );
    assert_eq!(fixture.controller.select_default_thread(&threads).await, None);
    assert_eq!(fixture.selected_threads(), vec![ThreadId::new("a")]);
}

#[tokio::test]
async fn selecting_a_thread_switches_to_direct() {
    let fixture = Fixture::new();

    let derived = fixture
        .controller
        .select_thread(ThreadId::new("thread-3"))
        .await;

    assert_eq!(derived.active_tab, ChannelTab::Direct);
    assert_eq!(fixture.selected_threads(), vec![ThreadId::new("thread-3")]);
}
