use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::db::{EntityStore, NotificationRepository};
use crate::debounce::{Debouncer, FocusIntent};
use crate::errors::{AppError, AppResult};
use crate::index::SearchIndexer;
use crate::notifications::{BellState, NotificationInbox};
use crate::pagination::{FetchOutcome, PaginationCoordinator};
use crate::policy::{ProfileDefaults, RolePolicy};
use crate::types::{EntityKind, Notification, Role, SearchResults};

/// A paginated entity list with its own debounced search box.
pub struct ListView {
    coordinator: Arc<PaginationCoordinator>,
    debouncer: Debouncer,
    consumer: JoinHandle<()>,
}

impl ListView {
    fn spawn(coordinator: Arc<PaginationCoordinator>, debouncer: Debouncer) -> Self {
        let rx = debouncer.subscribe();
        let consumer = tokio::spawn(run_list_consumer(Arc::clone(&coordinator), rx));
        Self {
            coordinator,
            debouncer,
            consumer,
        }
    }

    pub fn coordinator(&self) -> &Arc<PaginationCoordinator> {
        &self.coordinator
    }

    pub fn on_search_input(&self, raw: impl Into<String>) {
        self.debouncer.on_input(raw);
    }

    pub fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }
}

impl Drop for ListView {
    fn drop(&mut self) {
        self.consumer.abort();
    }
}

async fn run_list_consumer(coordinator: Arc<PaginationCoordinator>, mut rx: watch::Receiver<String>) {
    while rx.changed().await.is_ok() {
        let query = rx.borrow_and_update().clone();
        // Failures are already reflected in the coordinator's view state.
        if let Err(e) = coordinator.on_query_change(&query).await {
            tracing::debug!(kind = coordinator.kind().as_str(), "list search failed: {e}");
        }
    }
}

async fn run_quick_search(
    store: Arc<dyn EntityStore>,
    indexer: SearchIndexer,
    policy: RolePolicy,
    results: Arc<RwLock<SearchResults>>,
    focus: Arc<StdMutex<FocusIntent>>,
    mut rx: watch::Receiver<String>,
) {
    while rx.changed().await.is_ok() {
        let query = rx.borrow_and_update().clone();
        if query.trim().is_empty() {
            arm_focus(&focus);
            *results.write().await = SearchResults::default();
            continue;
        }
        // Matches of the previous query are never shown as current.
        *results.write().await = SearchResults::loading(query.as_str());

        let scan_store = Arc::clone(&store);
        let scan_query = query.clone();
        let found = tokio::task::spawn_blocking(move || {
            indexer.search(&scan_query, scan_store.as_ref(), &policy)
        })
        .await;

        // A newer query was published while scanning: its results win.
        if *rx.borrow() != query {
            tracing::debug!(query = %query, "dropping stale quick search results");
            continue;
        }
        let found = match found {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(query = %query, "quick search task failed: {e}");
                SearchResults::failed(query)
            }
        };
        arm_focus(&focus);
        *results.write().await = found;
    }
}

fn arm_focus(focus: &StdMutex<FocusIntent>) {
    focus.lock().unwrap_or_else(PoisonError::into_inner).arm();
}

/// Everything the header and list pages need for one signed-in user.
pub struct Session {
    policy: RolePolicy,
    user_id: String,
    debouncer: Debouncer,
    focus: Arc<StdMutex<FocusIntent>>,
    results: Arc<RwLock<SearchResults>>,
    quick_search: JoinHandle<()>,
    inbox: Arc<Mutex<NotificationInbox>>,
    lists: HashMap<EntityKind, ListView>,
}

impl Session {
    /// Select the role policy, load (or seed) the inbox and start the search consumers.
    pub async fn start(
        role: Role,
        user_id: &str,
        store: Arc<dyn EntityStore>,
        notifications: Arc<dyn NotificationRepository>,
        config: &AppConfig,
    ) -> AppResult<Self> {
        config.validate()?;
        let policy = RolePolicy::for_role(role);

        let owner = user_id.to_string();
        let inbox = tokio::task::spawn_blocking(move || {
            NotificationInbox::load(notifications, role, &owner)
        })
        .await??;

        let debouncer = Debouncer::new(config.header_debounce());
        let results = Arc::new(RwLock::new(SearchResults::default()));
        let focus = Arc::new(StdMutex::new(FocusIntent::default()));
        let quick_search = tokio::spawn(run_quick_search(
            Arc::clone(&store),
            SearchIndexer::new(config.min_query_len),
            policy,
            Arc::clone(&results),
            Arc::clone(&focus),
            debouncer.subscribe(),
        ));

        let lists = EntityKind::ALL
            .into_iter()
            .map(|kind| {
                let coordinator = Arc::new(PaginationCoordinator::new(
                    Arc::clone(&store),
                    kind,
                    config.page_size,
                ));
                (kind, ListView::spawn(coordinator, Debouncer::new(config.list_debounce())))
            })
            .collect();

        tracing::info!(role = role.as_str(), user = user_id, "session started");
        Ok(Self {
            policy,
            user_id: user_id.to_string(),
            debouncer,
            focus,
            results,
            quick_search,
            inbox: Arc::new(Mutex::new(inbox)),
            lists,
        })
    }

    pub fn role(&self) -> Role {
        self.policy.role()
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn policy(&self) -> &RolePolicy {
        &self.policy
    }

    pub fn profile_defaults(&self) -> ProfileDefaults {
        self.policy.profile_defaults()
    }

    // ─── Header quick search ──────────────────────────────────────────────

    pub fn on_search_input(&self, raw: impl Into<String>) {
        self.debouncer.on_input(raw);
    }

    pub fn search_debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    pub async fn results(&self) -> SearchResults {
        self.results.read().await.clone()
    }

    /// Call on every keystroke with the input's current focus.
    pub fn remember_focus(&self, focused: bool) {
        self.focus
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remember(focused);
    }

    /// Poll after each render. True exactly once, after the render that shows
    /// the debounced results; focus must then be re-applied to the input.
    pub fn restore_focus(&self) -> bool {
        self.focus
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take_restore()
    }

    // ─── Entity lists ─────────────────────────────────────────────────────

    pub fn list(&self, kind: EntityKind) -> AppResult<&ListView> {
        self.lists
            .get(&kind)
            .ok_or_else(|| AppError::NotFound(format!("list {}", kind.as_str())))
    }

    pub fn on_list_search_input(&self, kind: EntityKind, raw: impl Into<String>) -> AppResult<()> {
        self.list(kind)?.on_search_input(raw);
        Ok(())
    }

    pub async fn on_page_change(&self, kind: EntityKind, page: usize) -> AppResult<FetchOutcome> {
        self.list(kind)?.coordinator().on_page_change(page).await
    }

    // ─── Notifications ────────────────────────────────────────────────────

    pub async fn notifications(&self) -> Vec<Notification> {
        self.inbox.lock().await.notifications().to_vec()
    }

    pub async fn unread_count(&self) -> usize {
        self.inbox.lock().await.unread_count()
    }

    pub async fn bell(&self) -> BellState {
        self.inbox.lock().await.bell()
    }

    /// Mark the clicked notification read; returns where to navigate, if anywhere.
    pub async fn on_notification_click(&self, index: usize) -> AppResult<Option<String>> {
        self.with_inbox(move |inbox| inbox.mark_read(index)).await
    }

    pub async fn on_mark_all_read(&self) -> AppResult<()> {
        self.with_inbox(NotificationInbox::mark_all_read).await
    }

    pub async fn push_notification(&self, notification: Notification) -> AppResult<()> {
        self.with_inbox(move |inbox| inbox.push(notification)).await
    }

    /// Runs an inbox mutation, and its repository write, on the blocking pool.
    async fn with_inbox<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut NotificationInbox) -> AppResult<T> + Send + 'static,
    {
        let mut inbox = Arc::clone(&self.inbox).lock_owned().await;
        tokio::task::spawn_blocking(move || f(&mut inbox)).await?
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.quick_search.abort();
    }
}
