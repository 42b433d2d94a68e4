use std::sync::Arc;

use serde::Serialize;

use crate::errors::{AppError, ErrorView};
use crate::notifications::BellState;
use crate::pagination::{FetchOutcome, PageView, ViewState};
use crate::policy::ProfileDefaults;
use crate::session::Session;
use crate::types::{Entity, EntityKind, Notification, Role, SearchResults};
use crate::AppMutex;

// ─── Tauri commands ────────────────────────────────────────────────────────────

/// Errors cross the IPC boundary as a short message plus a recovery action.
/// The raw error only goes to the log.
fn client_error(error: AppError) -> ErrorView {
    tracing::warn!("command failed: {error}");
    ErrorView::from(&error)
}

fn parse_kind(kind: &str) -> Result<EntityKind, ErrorView> {
    EntityKind::parse(kind).ok_or_else(|| client_error(AppError::NotFound(format!("entity kind {kind}"))))
}

/// Clone the session Arc out of the state so the lock is not held across awaits.
async fn current_session(state: &tauri::State<'_, AppMutex>) -> Result<Arc<Session>, ErrorView> {
    state
        .lock()
        .await
        .session
        .clone()
        .ok_or_else(|| client_error(AppError::NotFound("no active session".to_string())))
}

#[derive(Debug, Serialize)]
pub struct NotificationsPayload {
    pub items: Vec<Notification>,
    pub bell: BellState,
}

/// Called after login. Selects the role policy and loads (or seeds) notifications.
#[tauri::command]
pub async fn start_session(
    role: String,
    user_id: String,
    state: tauri::State<'_, AppMutex>,
) -> Result<ProfileDefaults, ErrorView> {
    let role = Role::parse(&role)
        .ok_or_else(|| client_error(AppError::NotFound(format!("role {role}"))))?;
    let (store, config) = {
        let s = state.lock().await;
        (Arc::clone(&s.store), s.config.clone())
    };
    let session = Session::start(role, &user_id, store.clone(), store, &config)
        .await
        .map_err(client_error)?;
    let defaults = session.profile_defaults();
    state.lock().await.session = Some(Arc::new(session));
    Ok(defaults)
}

#[tauri::command]
pub async fn end_session(state: tauri::State<'_, AppMutex>) -> Result<(), ErrorView> {
    state.lock().await.session = None;
    Ok(())
}

/// Header quick search keystroke. `focused` is whether the input had focus.
#[tauri::command]
pub async fn search_input(
    raw: String,
    focused: bool,
    state: tauri::State<'_, AppMutex>,
) -> Result<(), ErrorView> {
    let session = current_session(&state).await?;
    session.remember_focus(focused);
    session.on_search_input(raw);
    Ok(())
}

#[tauri::command]
pub async fn search_results(state: tauri::State<'_, AppMutex>) -> Result<SearchResults, ErrorView> {
    Ok(current_session(&state).await?.results().await)
}

/// Polled by the frontend after rendering results; true means refocus the input.
#[tauri::command]
pub async fn restore_search_focus(state: tauri::State<'_, AppMutex>) -> Result<bool, ErrorView> {
    Ok(current_session(&state).await?.restore_focus())
}

#[tauri::command]
pub async fn list_search_input(
    kind: String,
    raw: String,
    state: tauri::State<'_, AppMutex>,
) -> Result<(), ErrorView> {
    let kind = parse_kind(&kind)?;
    current_session(&state)
        .await?
        .on_list_search_input(kind, raw)
        .map_err(client_error)
}

/// Returns `None` when a newer request superseded this one.
#[tauri::command]
pub async fn change_page(
    kind: String,
    page: usize,
    state: tauri::State<'_, AppMutex>,
) -> Result<Option<PageView>, ErrorView> {
    let kind = parse_kind(&kind)?;
    let outcome = current_session(&state)
        .await?
        .on_page_change(kind, page)
        .await
        .map_err(client_error)?;
    Ok(match outcome {
        FetchOutcome::Applied(view) => Some(view),
        FetchOutcome::Stale => None,
    })
}

#[tauri::command]
pub async fn list_view(kind: String, state: tauri::State<'_, AppMutex>) -> Result<ViewState, ErrorView> {
    let kind = parse_kind(&kind)?;
    let session = current_session(&state).await?;
    let list = session.list(kind).map_err(client_error)?;
    Ok(list.coordinator().view().await)
}

#[tauri::command]
pub async fn retry_list(kind: String, state: tauri::State<'_, AppMutex>) -> Result<ViewState, ErrorView> {
    let kind = parse_kind(&kind)?;
    let session = current_session(&state).await?;
    let coordinator = Arc::clone(session.list(kind).map_err(client_error)?.coordinator());
    // The failure, if any, is part of the returned view state.
    let _ = coordinator.retry().await;
    Ok(coordinator.view().await)
}

#[tauri::command]
pub async fn get_entity(
    kind: String,
    id: String,
    state: tauri::State<'_, AppMutex>,
) -> Result<Entity, ErrorView> {
    let kind = parse_kind(&kind)?;
    let session = current_session(&state).await?;
    let coordinator = Arc::clone(session.list(kind).map_err(client_error)?.coordinator());
    coordinator.get_by_id(&id).await.map_err(client_error)
}

/// Create or replace a record on behalf of the CRUD forms.
#[tauri::command]
pub async fn save_entity(entity: Entity, state: tauri::State<'_, AppMutex>) -> Result<(), ErrorView> {
    let store = Arc::clone(&state.lock().await.store);
    tokio::task::spawn_blocking(move || {
        use crate::db::EntityStore;
        match store.get_by_id(entity.kind(), entity.id())? {
            Some(_) => store.update(&entity),
            None => store.create(&entity),
        }
    })
    .await
    .map_err(|e| client_error(e.into()))?
    .map_err(client_error)
}

#[tauri::command]
pub async fn delete_entity(
    kind: String,
    id: String,
    state: tauri::State<'_, AppMutex>,
) -> Result<bool, ErrorView> {
    let kind = parse_kind(&kind)?;
    let store = Arc::clone(&state.lock().await.store);
    tokio::task::spawn_blocking(move || {
        use crate::db::EntityStore;
        store.delete(kind, &id)
    })
    .await
    .map_err(|e| client_error(e.into()))?
    .map_err(client_error)
}

#[tauri::command]
pub async fn get_notifications(state: tauri::State<'_, AppMutex>) -> Result<NotificationsPayload, ErrorView> {
    let session = current_session(&state).await?;
    Ok(NotificationsPayload {
        items: session.notifications().await,
        bell: session.bell().await,
    })
}

/// Returns the route to navigate to when the notification carries a link.
#[tauri::command]
pub async fn click_notification(
    index: usize,
    state: tauri::State<'_, AppMutex>,
) -> Result<Option<String>, ErrorView> {
    current_session(&state)
        .await?
        .on_notification_click(index)
        .await
        .map_err(client_error)
}

#[tauri::command]
pub async fn mark_all_notifications_read(state: tauri::State<'_, AppMutex>) -> Result<(), ErrorView> {
    current_session(&state)
        .await?
        .on_mark_all_read()
        .await
        .map_err(client_error)
}
