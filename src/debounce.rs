use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

struct Shared {
    debounced: watch::Sender<String>,
    /// Bumped on every input; a timer only publishes if it is still the latest.
    generation: AtomicU64,
    publishes: AtomicUsize,
}

impl Shared {
    fn publish(&self, value: String) {
        tracing::debug!(query = %value, "publishing debounced query");
        self.publishes.fetch_add(1, Ordering::SeqCst);
        self.debounced.send_replace(value);
    }
}

/// Coalesces bursts of keystrokes into one published value after a quiet period.
///
/// Must be driven from inside a Tokio runtime: each input arms a timer task.
pub struct Debouncer {
    quiet: Duration,
    raw: Mutex<String>,
    pending: Mutex<Option<JoinHandle<()>>>,
    shared: Arc<Shared>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        let (tx, _rx) = watch::channel(String::new());
        Self {
            quiet,
            raw: Mutex::new(String::new()),
            pending: Mutex::new(None),
            shared: Arc::new(Shared {
                debounced: tx,
                generation: AtomicU64::new(0),
                publishes: AtomicUsize::new(0),
            }),
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet
    }

    /// Record a keystroke. Cancels the pending timer and arms a new one.
    /// A blank value is published immediately so results clear without waiting.
    pub fn on_input(&self, raw: impl Into<String>) {
        let raw = raw.into();
        *self.raw.lock().unwrap_or_else(PoisonError::into_inner) = raw.clone();

        if let Some(handle) = self.take_pending() {
            handle.abort();
        }
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if raw.trim().is_empty() {
            self.shared.publish(String::new());
            return;
        }

        let shared = Arc::clone(&self.shared);
        let quiet = self.quiet;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            if shared.generation.load(Ordering::SeqCst) == generation {
                shared.publish(raw);
            }
        });
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// The latest keystroke value, published or not.
    pub fn raw(&self) -> String {
        self.raw.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The last published value.
    pub fn debounced(&self) -> String {
        self.shared.debounced.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.shared.debounced.subscribe()
    }

    /// How many values have been published downstream so far.
    pub fn publish_count(&self) -> usize {
        self.shared.publishes.load(Ordering::SeqCst)
    }

    /// True while a timer is armed and has not fired yet.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn take_pending(&self) -> Option<JoinHandle<()>> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(handle) = self.take_pending() {
            handle.abort();
        }
    }
}

/// Whether the search input must get focus back after a re-render.
/// Captured before the update because the list re-render may remount the input;
/// the restore only becomes due once the debounced results have been applied.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FocusIntent {
    was_focused: bool,
    render_due: bool,
}

impl FocusIntent {
    /// A new keystroke supersedes any render still waiting to be acknowledged.
    pub fn remember(&mut self, focused: bool) {
        self.was_focused = focused;
        self.render_due = false;
    }

    /// Called by the consumer that applied a debounced update.
    pub fn arm(&mut self) {
        self.render_due = true;
    }

    pub fn is_pending(&self) -> bool {
        self.was_focused
    }

    /// Returns true once per captured focus, after the debounced update landed.
    pub fn take_restore(&mut self) -> bool {
        if !(self.was_focused && self.render_due) {
            return false;
        }
        *self = Self::default();
        true
    }
}
