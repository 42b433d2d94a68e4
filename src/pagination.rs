use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::db::EntityStore;
use crate::errors::{AppError, AppResult, ErrorView};
use crate::types::{Entity, EntityKind, Listing};

/// Numbered buttons shown at most.
pub const MAX_PAGE_BUTTONS: usize = 5;

/// Position inside a paginated listing. Always internally consistent:
/// `total_pages == max(1, ceil(total_count / page_size))` and
/// `1 <= current_page <= total_pages`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub current_page: usize,
    pub total_pages: usize,
    pub total_count: usize,
    pub page_size: usize,
}

impl Page {
    /// Builds a page for `total_count` records, clamping `requested` into range.
    pub fn new(total_count: usize, page_size: usize, requested: usize) -> Self {
        let page_size = page_size.max(1);
        let total_pages = Self::total_pages_for(total_count, page_size);
        Self {
            current_page: requested.clamp(1, total_pages),
            total_pages,
            total_count,
            page_size,
        }
    }

    /// An empty listing still has one (empty) page.
    pub fn total_pages_for(total_count: usize, page_size: usize) -> usize {
        total_count.div_ceil(page_size.max(1)).max(1)
    }

    pub fn is_first(&self) -> bool {
        self.current_page == 1
    }

    pub fn is_last(&self) -> bool {
        self.current_page == self.total_pages
    }
}

/// Page numbers to render as buttons: front-loaded near the start, tail-loaded
/// near the end, otherwise a window centred on `current`.
pub fn page_buttons(current: usize, total: usize) -> Vec<usize> {
    let total = total.max(1);
    let current = current.clamp(1, total);
    if total <= MAX_PAGE_BUTTONS {
        return (1..=total).collect();
    }
    let start = if current <= 3 {
        1
    } else if current + 2 >= total {
        total - (MAX_PAGE_BUTTONS - 1)
    } else {
        current - 2
    };
    (start..start + MAX_PAGE_BUTTONS).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Browse,
    Search,
}

impl Mode {
    pub fn for_query(query: &str) -> Self {
        if query.trim().is_empty() {
            Mode::Browse
        } else {
            Mode::Search
        }
    }
}

/// Render model for the numbered pagination control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageControls {
    pub visible: bool,
    pub buttons: Vec<usize>,
    pub current: usize,
    pub prev_enabled: bool,
    pub next_enabled: bool,
}

impl PageControls {
    /// Hidden in search mode and whenever everything fits on one page.
    pub fn for_page(page: &Page, mode: Mode) -> Self {
        Self {
            visible: mode == Mode::Browse && page.total_pages > 1,
            buttons: page_buttons(page.current_page, page.total_pages),
            current: page.current_page,
            prev_enabled: !page.is_first(),
            next_enabled: !page.is_last(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageView {
    pub kind: EntityKind,
    pub mode: Mode,
    pub query: String,
    pub items: Vec<Entity>,
    pub page: Page,
    pub controls: PageControls,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ViewState {
    Idle,
    Loading,
    Ready(PageView),
    Failed(ErrorView),
}

/// Result of a fetch. `Stale` means a newer request superseded this one and
/// its data was dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Applied(PageView),
    Stale,
}

impl FetchOutcome {
    pub fn view(&self) -> Option<&PageView> {
        match self {
            FetchOutcome::Applied(view) => Some(view),
            FetchOutcome::Stale => None,
        }
    }
}

#[derive(Debug)]
struct CoordinatorState {
    current_page: usize,
    query: String,
    /// Incremented per request; results carrying an older value are stale.
    generation: u64,
    view: ViewState,
}

/// Keeps one entity list's page, query and view state in step with the store.
pub struct PaginationCoordinator {
    store: Arc<dyn EntityStore>,
    kind: EntityKind,
    page_size: usize,
    state: Mutex<CoordinatorState>,
}

impl PaginationCoordinator {
    pub fn new(store: Arc<dyn EntityStore>, kind: EntityKind, page_size: usize) -> Self {
        Self {
            store,
            kind,
            page_size: page_size.max(1),
            state: Mutex::new(CoordinatorState {
                current_page: 1,
                query: String::new(),
                generation: 0,
                view: ViewState::Idle,
            }),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub async fn current_page(&self) -> usize {
        self.state.lock().await.current_page
    }

    pub async fn query(&self) -> String {
        self.state.lock().await.query.clone()
    }

    pub async fn mode(&self) -> Mode {
        Mode::for_query(&self.state.lock().await.query)
    }

    pub async fn view(&self) -> ViewState {
        self.state.lock().await.view.clone()
    }

    /// Fetch `page_number` for `query`. Switching between an empty and a
    /// non-empty query resets to page 1; search mode always shows one page.
    pub async fn fetch_page(&self, page_number: usize, query: &str) -> AppResult<FetchOutcome> {
        let query = query.to_string();
        self.fetch_with(move |_| (page_number, query)).await
    }

    /// Keeps the current query; only the page changes.
    pub async fn on_page_change(&self, page_number: usize) -> AppResult<FetchOutcome> {
        self.fetch_with(|s| (page_number, s.query.clone())).await
    }

    pub async fn on_query_change(&self, query: &str) -> AppResult<FetchOutcome> {
        let query = query.to_string();
        self.fetch_with(move |s| (s.current_page, query)).await
    }

    /// Repeat the current request, typically after a `Failed` view.
    pub async fn retry(&self) -> AppResult<FetchOutcome> {
        self.fetch_with(|s| (s.current_page, s.query.clone())).await
    }

    /// `resolve` picks the page and query from the state it sees, under the
    /// same lock that claims the generation.
    async fn fetch_with<F>(&self, resolve: F) -> AppResult<FetchOutcome>
    where
        F: FnOnce(&CoordinatorState) -> (usize, String),
    {
        let (generation, requested, query) = {
            let mut s = self.state.lock().await;
            let (page_number, query) = resolve(&s);
            let query = query.trim().to_string();
            let mode_changed = Mode::for_query(&s.query) != Mode::for_query(&query);
            let requested = if mode_changed || !query.is_empty() {
                1
            } else {
                page_number.max(1)
            };
            s.generation += 1;
            s.query = query.clone();
            s.current_page = requested;
            s.view = ViewState::Loading;
            (s.generation, requested, query)
        };

        tracing::debug!(
            kind = self.kind.as_str(),
            page = requested,
            query = %query,
            "fetching page"
        );
        let result = self.load(requested, &query).await;

        let mut s = self.state.lock().await;
        if s.generation != generation || s.query != query {
            tracing::debug!(kind = self.kind.as_str(), query = %query, "dropping stale page result");
            return Ok(FetchOutcome::Stale);
        }
        match result {
            Ok(view) => {
                s.current_page = view.page.current_page;
                s.view = ViewState::Ready(view.clone());
                Ok(FetchOutcome::Applied(view))
            }
            Err(e) => {
                tracing::warn!(kind = self.kind.as_str(), "page fetch failed: {e}");
                s.view = ViewState::Failed(ErrorView::from(&e));
                Err(e)
            }
        }
    }

    /// Detail lookup. An unknown id is reported as `NotFound`.
    pub async fn get_by_id(&self, id: &str) -> AppResult<Entity> {
        let kind = self.kind;
        let owned = id.to_string();
        self.blocking(move |store| store.get_by_id(kind, &owned))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {}", kind.as_str(), id)))
    }

    async fn load(&self, requested: usize, query: &str) -> AppResult<PageView> {
        let kind = self.kind;
        let size = self.page_size;
        let mode = Mode::for_query(query);

        let (listing, page) = match mode {
            Mode::Browse => {
                let listing = self.blocking(move |store| store.list(kind, requested, size)).await?;
                let page = Page::new(listing.count, size, requested);
                if page.current_page == requested {
                    (listing, page)
                } else {
                    // Out of range: clamp and fetch the page that exists.
                    let clamped = page.current_page;
                    let listing = self.blocking(move |store| store.list(kind, clamped, size)).await?;
                    let page = Page::new(listing.count, size, clamped);
                    (listing, page)
                }
            }
            Mode::Search => {
                let term = query.to_string();
                let listing: Listing = self.blocking(move |store| store.search(kind, &term)).await?;
                let page = Page::new(listing.count, size, 1);
                (listing, page)
            }
        };

        Ok(PageView {
            kind,
            mode,
            query: query.to_string(),
            items: listing.items,
            controls: PageControls::for_page(&page, mode),
            page,
        })
    }

    async fn blocking<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn EntityStore) -> AppResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(store.as_ref())).await?
    }
}

#[cfg(test)]
mod tests {
    use super::{page_buttons, FetchOutcome, Mode, Page, PageControls, PaginationCoordinator, ViewState};
    use crate::db::{EntityStore, MemoryStore};
    use crate::errors::{AppError, AppResult, RecoveryAction};
    use crate::types::{Entity, EntityKind, Listing, Project};
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;

    fn project(id: usize) -> Entity {
        Entity::Project(Project {
            id: id.to_string(),
            name: format!("Projet {id}"),
            description: None,
            code: None,
            status: None,
            created_at: Utc::now(),
        })
    }

    fn store_with(n: usize) -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_entities((1..=n).map(project)).unwrap())
    }

    #[test]
    fn total_pages_is_ceiling_of_count() {
        for size in 1..=7 {
            for count in 0..=40 {
                let page = Page::new(count, size, 1);
                let expected = ((count + size - 1) / size).max(1);
                assert_eq!(page.total_pages, expected, "count={count} size={size}");
            }
        }
    }

    #[test]
    fn requested_page_is_clamped() {
        let page = Page::new(12, 5, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.current_page, 3);
        assert_eq!(Page::new(12, 5, 0).current_page, 1);
    }

    #[test]
    fn button_window_rules() {
        assert_eq!(page_buttons(1, 3), vec![1, 2, 3]);
        assert_eq!(page_buttons(1, 10), vec![1, 2, 3, 4, 5]);
        assert_eq!(page_buttons(3, 10), vec![1, 2, 3, 4, 5]);
        assert_eq!(page_buttons(5, 10), vec![3, 4, 5, 6, 7]);
        assert_eq!(page_buttons(8, 10), vec![6, 7, 8, 9, 10]);
        assert_eq!(page_buttons(10, 10), vec![6, 7, 8, 9, 10]);
        assert_eq!(page_buttons(4, 6), vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn controls_hidden_in_search_mode_or_single_page() {
        let page = Page::new(12, 5, 1);
        let browse = PageControls::for_page(&page, Mode::Browse);
        assert!(browse.visible);
        assert!(!browse.prev_enabled);
        assert!(browse.next_enabled);
        assert!(!PageControls::for_page(&page, Mode::Search).visible);
        assert!(!PageControls::for_page(&Page::new(5, 5, 1), Mode::Browse).visible);

        let last = PageControls::for_page(&Page::new(12, 5, 3), Mode::Browse);
        assert!(last.prev_enabled);
        assert!(!last.next_enabled);
    }

    #[tokio::test]
    async fn out_of_range_page_clamps_to_last() {
        let coordinator = PaginationCoordinator::new(store_with(12), EntityKind::Project, 5);
        let outcome = coordinator.fetch_page(5, "").await.unwrap();
        let view = outcome.view().unwrap();
        assert_eq!(view.page.total_pages, 3);
        assert_eq!(view.page.current_page, 3);
        let ids: Vec<&str> = view.items.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["11", "12"]);
        assert_eq!(coordinator.current_page().await, 3);
    }

    #[tokio::test]
    async fn search_mode_shows_all_matches_on_page_one() {
        let coordinator = PaginationCoordinator::new(store_with(12), EntityKind::Project, 5);
        coordinator.fetch_page(2, "").await.unwrap();
        assert_eq!(coordinator.current_page().await, 2);

        let outcome = coordinator.on_query_change("projet 1").await.unwrap();
        let view = outcome.view().unwrap();
        assert_eq!(view.mode, Mode::Search);
        // "Projet 1", "Projet 10", "Projet 11", "Projet 12"
        assert_eq!(view.items.len(), 4);
        assert_eq!(view.page.current_page, 1);
        assert!(!view.controls.visible);

        // Paging inside search mode stays on the single logical page.
        coordinator.on_page_change(2).await.unwrap();
        assert_eq!(coordinator.current_page().await, 1);
    }

    #[tokio::test]
    async fn clearing_the_query_resets_to_first_page() {
        let coordinator = PaginationCoordinator::new(store_with(12), EntityKind::Project, 5);
        coordinator.fetch_page(3, "").await.unwrap();
        coordinator.fetch_page(3, "projet").await.unwrap();
        let outcome = coordinator.fetch_page(3, "").await.unwrap();
        assert_eq!(outcome.view().unwrap().page.current_page, 1);
        assert_eq!(coordinator.mode().await, Mode::Browse);
    }

    #[tokio::test]
    async fn failure_surfaces_retry_and_recovers() {
        let store = store_with(7);
        let coordinator =
            PaginationCoordinator::new(store.clone() as Arc<dyn EntityStore>, EntityKind::Project, 5);
        coordinator.fetch_page(1, "").await.unwrap();

        store.fail_on(EntityKind::Project).unwrap();
        let err = coordinator.on_page_change(2).await.unwrap_err();
        assert!(matches!(err, AppError::Fetch(_)));
        match coordinator.view().await {
            ViewState::Failed(view) => assert_eq!(view.recovery, RecoveryAction::Retry),
            other => panic!("expected failed view, got {other:?}"),
        }

        store.recover(EntityKind::Project).unwrap();
        let outcome = coordinator.retry().await.unwrap();
        assert_eq!(outcome.view().unwrap().page.current_page, 2);
        assert!(matches!(coordinator.view().await, ViewState::Ready(_)));
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let coordinator = PaginationCoordinator::new(store_with(2), EntityKind::Project, 5);
        assert_eq!(coordinator.get_by_id("2").await.unwrap().id(), "2");
        let err = coordinator.get_by_id("99").await.unwrap_err();
        assert_eq!(err.recovery(), RecoveryAction::GoBack);
    }

    /// Delegates to a memory store but makes searches for "lent" slow.
    struct SlowSearchStore {
        inner: MemoryStore,
    }

    impl EntityStore for SlowSearchStore {
        fn list(&self, kind: EntityKind, page: usize, page_size: usize) -> AppResult<Listing> {
            self.inner.list(kind, page, page_size)
        }
        fn get_by_id(&self, kind: EntityKind, id: &str) -> AppResult<Option<Entity>> {
            self.inner.get_by_id(kind, id)
        }
        fn search(&self, kind: EntityKind, term: &str) -> AppResult<Listing> {
            if term == "lent" {
                std::thread::sleep(Duration::from_millis(300));
            }
            self.inner.search(kind, term)
        }
        fn snapshot(&self, kind: EntityKind) -> AppResult<Vec<Entity>> {
            self.inner.snapshot(kind)
        }
        fn create(&self, entity: &Entity) -> AppResult<()> {
            self.inner.create(entity)
        }
        fn update(&self, entity: &Entity) -> AppResult<()> {
            self.inner.update(entity)
        }
        fn delete(&self, kind: EntityKind, id: &str) -> AppResult<bool> {
            self.inner.delete(kind, id)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slower_older_query_is_discarded() {
        let store = SlowSearchStore {
            inner: MemoryStore::with_entities((1..=12).map(project)).unwrap(),
        };
        let coordinator = Arc::new(PaginationCoordinator::new(
            Arc::new(store),
            EntityKind::Project,
            5,
        ));

        let slow = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.fetch_page(1, "lent").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let fresh = coordinator.fetch_page(1, "projet 2").await.unwrap();
        assert!(matches!(fresh, FetchOutcome::Applied(_)));

        let stale = slow.await.unwrap().unwrap();
        assert_eq!(stale, FetchOutcome::Stale);

        match coordinator.view().await {
            ViewState::Ready(view) => {
                assert_eq!(view.query, "projet 2");
                assert_eq!(view.items.len(), 1);
            }
            other => panic!("expected ready view, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn page_click_during_search_keeps_the_query() {
        let store = SlowSearchStore {
            inner: MemoryStore::with_entities((1..=12).map(project)).unwrap(),
        };
        let coordinator = Arc::new(PaginationCoordinator::new(
            Arc::new(store),
            EntityKind::Project,
            5,
        ));
        coordinator.fetch_page(2, "").await.unwrap();

        let search = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.on_query_change("lent").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The click lands while the search is in flight: it re-issues that search.
        coordinator.on_page_change(2).await.unwrap();
        assert_eq!(search.await.unwrap().unwrap(), FetchOutcome::Stale);

        assert_eq!(coordinator.query().await, "lent");
        assert_eq!(coordinator.mode().await, Mode::Search);
        assert_eq!(coordinator.current_page().await, 1);
        match coordinator.view().await {
            ViewState::Ready(view) => {
                assert_eq!(view.query, "lent");
                assert_eq!(view.mode, Mode::Search);
            }
            other => panic!("expected ready view, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn query_change_in_browse_mode_keeps_the_page() {
        let coordinator = PaginationCoordinator::new(store_with(12), EntityKind::Project, 5);
        coordinator.fetch_page(3, "").await.unwrap();
        let outcome = coordinator.on_query_change("  ").await.unwrap();
        assert_eq!(outcome.view().unwrap().page.current_page, 3);
    }
}
