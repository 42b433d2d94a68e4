pub mod config;
pub mod db;
pub mod debounce;
pub mod errors;
pub mod index;
pub mod notifications;
pub mod pagination;
pub mod policy;
pub mod session;
pub mod types;

#[cfg(feature = "desktop")]
pub mod commands;

#[cfg(feature = "desktop")]
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

/// Install the global `tracing` subscriber. `RUST_LOG` wins over the configured level.
/// Calling it twice is harmless: the second call reports an error and changes nothing.
pub fn init_logging(config: &AppConfig) -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .try_init()
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// All runtime state shared across Tauri commands.
#[cfg(feature = "desktop")]
pub struct AppState {
    pub config: AppConfig,
    /// Entity collections and persisted notifications.
    pub store: Arc<db::SqliteStore>,
    /// Present once a user has signed in. Wrapped in Arc so commands can clone
    /// it out of the mutex and await without holding the lock.
    pub session: Option<Arc<session::Session>>,
}

/// Type alias used in Tauri command signatures.
#[cfg(feature = "desktop")]
pub type AppMutex = tokio::sync::Mutex<AppState>;

#[cfg(feature = "desktop")]
pub fn run() {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid configuration, using defaults: {e:#}");
            AppConfig::default()
        }
    };
    if let Err(e) = init_logging(&config) {
        eprintln!("logging already initialised: {e}");
    }

    let store = match db::SqliteStore::open(&config.db_path()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("failed to open data store: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(db = %config.db_path().display(), "data store ready");

    tauri::Builder::default()
        .manage(AppMutex::new(AppState {
            config,
            store,
            session: None,
        }))
        .invoke_handler(tauri::generate_handler![
            commands::start_session,
            commands::end_session,
            commands::search_input,
            commands::search_results,
            commands::restore_search_focus,
            commands::list_search_input,
            commands::change_page,
            commands::list_view,
            commands::retry_list,
            commands::get_entity,
            commands::save_entity,
            commands::delete_entity,
            commands::get_notifications,
            commands::click_notification,
            commands::mark_all_notifications_read,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
