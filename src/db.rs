use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::{AppError, AppResult};
use crate::index::matches_query;
use crate::types::{Entity, EntityKind, Listing, Notification, Role};

/// CRUD access to the entity collections. Calls are blocking; async callers
/// run them on the blocking pool.
pub trait EntityStore: Send + Sync {
    /// One page of `kind`, 1-based, plus the total count for that kind.
    fn list(&self, kind: EntityKind, page: usize, page_size: usize) -> AppResult<Listing>;
    fn get_by_id(&self, kind: EntityKind, id: &str) -> AppResult<Option<Entity>>;
    /// Every record of `kind` matching `term`, unpaginated.
    fn search(&self, kind: EntityKind, term: &str) -> AppResult<Listing>;
    /// Full snapshot of one corpus, used by the header quick search.
    fn snapshot(&self, kind: EntityKind) -> AppResult<Vec<Entity>>;
    fn create(&self, entity: &Entity) -> AppResult<()>;
    /// Replaces an existing record. `NotFound` if the id is unknown.
    fn update(&self, entity: &Entity) -> AppResult<()>;
    /// Returns false when nothing was deleted.
    fn delete(&self, kind: EntityKind, id: &str) -> AppResult<bool>;
}

/// Persisted notification lists, one per role.
pub trait NotificationRepository: Send + Sync {
    /// `None` when nothing was ever persisted for the role.
    fn load_notifications(&self, role: Role) -> AppResult<Option<Vec<Notification>>>;
    fn save_notifications(&self, role: Role, notifications: &[Notification]) -> AppResult<()>;
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS entities (
    kind       TEXT NOT NULL,
    id         TEXT NOT NULL,
    body       TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (kind, id)
);
CREATE TABLE IF NOT EXISTS notifications (
    role       TEXT PRIMARY KEY,
    body       TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// SQLite-backed store. Records are kept as JSON bodies keyed by (kind, id);
/// insertion order is the listing order.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> AppResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> AppResult<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> AppResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    /// Bodies for one kind in listing order. Malformed rows are skipped with a warning.
    fn load_bodies(conn: &Connection, kind: EntityKind) -> AppResult<Vec<String>> {
        let mut stmt = conn.prepare("SELECT body FROM entities WHERE kind = ?1 ORDER BY rowid")?;
        let bodies = stmt
            .query_map([kind.as_str()], |row| row.get::<_, String>(0))?
            .filter_map(|r| {
                r.map_err(|e| tracing::warn!("Skipping malformed row: {e}"))
                    .ok()
            })
            .collect();
        Ok(bodies)
    }
}

fn decode_lenient(kind: EntityKind, bodies: Vec<String>) -> Vec<Entity> {
    bodies
        .into_iter()
        .filter_map(|body| {
            serde_json::from_str::<Entity>(&body)
                .map_err(|e| tracing::warn!(kind = kind.as_str(), "Skipping undecodable record: {e}"))
                .ok()
        })
        .collect()
}

fn offset_for(page: usize, page_size: usize) -> usize {
    page.max(1).saturating_sub(1).saturating_mul(page_size)
}

impl EntityStore for SqliteStore {
    fn list(&self, kind: EntityKind, page: usize, page_size: usize) -> AppResult<Listing> {
        let bodies = Self::load_bodies(&*self.conn()?, kind)?;
        // The count covers decodable records only, so every promised page exists.
        let records = decode_lenient(kind, bodies);
        let count = records.len();
        let items = records
            .into_iter()
            .skip(offset_for(page, page_size))
            .take(page_size)
            .collect();
        Ok(Listing { items, count })
    }

    fn get_by_id(&self, kind: EntityKind, id: &str) -> AppResult<Option<Entity>> {
        let conn = self.conn()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM entities WHERE kind = ?1 AND id = ?2",
                params![kind.as_str(), id],
                |row| row.get(0),
            )
            .optional()?;
        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    fn search(&self, kind: EntityKind, term: &str) -> AppResult<Listing> {
        let bodies = Self::load_bodies(&*self.conn()?, kind)?;
        let needle = term.trim().to_lowercase();
        let items: Vec<Entity> = decode_lenient(kind, bodies)
            .into_iter()
            .filter(|entity| matches_query(entity, &needle))
            .collect();
        Ok(Listing {
            count: items.len(),
            items,
        })
    }

    fn snapshot(&self, kind: EntityKind) -> AppResult<Vec<Entity>> {
        let bodies = Self::load_bodies(&*self.conn()?, kind)?;
        // Strict: a corrupt corpus is reported so the caller can skip it as a whole.
        bodies
            .iter()
            .map(|body| {
                serde_json::from_str::<Entity>(body).map_err(|e| AppError::Corpus {
                    kind,
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    fn create(&self, entity: &Entity) -> AppResult<()> {
        let body = serde_json::to_string(entity)?;
        self.conn()?.execute(
            "INSERT INTO entities (kind, id, body, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                entity.kind().as_str(),
                entity.id(),
                body,
                entity.created_at().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn update(&self, entity: &Entity) -> AppResult<()> {
        let body = serde_json::to_string(entity)?;
        let changed = self.conn()?.execute(
            "UPDATE entities SET body = ?3 WHERE kind = ?1 AND id = ?2",
            params![entity.kind().as_str(), entity.id(), body],
        )?;
        if changed == 0 {
            return Err(AppError::NotFound(format!(
                "{} {}",
                entity.kind().as_str(),
                entity.id()
            )));
        }
        Ok(())
    }

    fn delete(&self, kind: EntityKind, id: &str) -> AppResult<bool> {
        let changed = self.conn()?.execute(
            "DELETE FROM entities WHERE kind = ?1 AND id = ?2",
            params![kind.as_str(), id],
        )?;
        Ok(changed > 0)
    }
}

impl NotificationRepository for SqliteStore {
    fn load_notifications(&self, role: Role) -> AppResult<Option<Vec<Notification>>> {
        let body: Option<String> = self
            .conn()?
            .query_row(
                "SELECT body FROM notifications WHERE role = ?1",
                [role.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    fn save_notifications(&self, role: Role, notifications: &[Notification]) -> AppResult<()> {
        let body = serde_json::to_string(notifications)?;
        self.conn()?.execute(
            "INSERT INTO notifications (role, body, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(role) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            params![role.as_str(), body, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

/// In-memory store for tests and demos. Individual corpora can be made to fail
/// to exercise error paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entities: RwLock<HashMap<EntityKind, Vec<Entity>>>,
    notifications: RwLock<HashMap<Role, Vec<Notification>>>,
    failing: RwLock<HashSet<EntityKind>>,
    snapshot_calls: AtomicUsize,
}

fn poisoned<T>(_: T) -> AppError {
    AppError::Internal("store lock poisoned".to_string())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entities(entities: impl IntoIterator<Item = Entity>) -> AppResult<Self> {
        let store = Self::new();
        for entity in entities {
            store.create(&entity)?;
        }
        Ok(store)
    }

    /// Every read of `kind` fails with `Fetch` until `recover` is called.
    pub fn fail_on(&self, kind: EntityKind) -> AppResult<()> {
        self.failing.write().map_err(poisoned)?.insert(kind);
        Ok(())
    }

    pub fn recover(&self, kind: EntityKind) -> AppResult<()> {
        self.failing.write().map_err(poisoned)?.remove(&kind);
        Ok(())
    }

    /// Number of `snapshot` calls served so far.
    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }

    fn check(&self, kind: EntityKind) -> AppResult<()> {
        if self.failing.read().map_err(poisoned)?.contains(&kind) {
            return Err(AppError::Fetch(format!("{} backend unavailable", kind.as_str())));
        }
        Ok(())
    }

    fn corpus(&self, kind: EntityKind) -> AppResult<Vec<Entity>> {
        self.check(kind)?;
        Ok(self
            .entities
            .read()
            .map_err(poisoned)?
            .get(&kind)
            .cloned()
            .unwrap_or_default())
    }
}

impl EntityStore for MemoryStore {
    fn list(&self, kind: EntityKind, page: usize, page_size: usize) -> AppResult<Listing> {
        let all = self.corpus(kind)?;
        let count = all.len();
        let items = all
            .into_iter()
            .skip(offset_for(page, page_size))
            .take(page_size)
            .collect();
        Ok(Listing { items, count })
    }

    fn get_by_id(&self, kind: EntityKind, id: &str) -> AppResult<Option<Entity>> {
        Ok(self.corpus(kind)?.into_iter().find(|e| e.id() == id))
    }

    fn search(&self, kind: EntityKind, term: &str) -> AppResult<Listing> {
        let needle = term.trim().to_lowercase();
        let items: Vec<Entity> = self
            .corpus(kind)?
            .into_iter()
            .filter(|entity| matches_query(entity, &needle))
            .collect();
        Ok(Listing {
            count: items.len(),
            items,
        })
    }

    fn snapshot(&self, kind: EntityKind) -> AppResult<Vec<Entity>> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        self.corpus(kind).map_err(|e| AppError::Corpus {
            kind,
            reason: e.to_string(),
        })
    }

    fn create(&self, entity: &Entity) -> AppResult<()> {
        let mut entities = self.entities.write().map_err(poisoned)?;
        let corpus = entities.entry(entity.kind()).or_default();
        if corpus.iter().any(|e| e.id() == entity.id()) {
            return Err(AppError::Storage(format!(
                "duplicate {} id {}",
                entity.kind().as_str(),
                entity.id()
            )));
        }
        corpus.push(entity.clone());
        Ok(())
    }

    fn update(&self, entity: &Entity) -> AppResult<()> {
        let mut entities = self.entities.write().map_err(poisoned)?;
        let slot = entities
            .get_mut(&entity.kind())
            .and_then(|corpus| corpus.iter_mut().find(|e| e.id() == entity.id()))
            .ok_or_else(|| {
                AppError::NotFound(format!("{} {}", entity.kind().as_str(), entity.id()))
            })?;
        *slot = entity.clone();
        Ok(())
    }

    fn delete(&self, kind: EntityKind, id: &str) -> AppResult<bool> {
        let mut entities = self.entities.write().map_err(poisoned)?;
        let Some(corpus) = entities.get_mut(&kind) else {
            return Ok(false);
        };
        let before = corpus.len();
        corpus.retain(|e| e.id() != id);
        Ok(corpus.len() != before)
    }
}

impl NotificationRepository for MemoryStore {
    fn load_notifications(&self, role: Role) -> AppResult<Option<Vec<Notification>>> {
        Ok(self.notifications.read().map_err(poisoned)?.get(&role).cloned())
    }

    fn save_notifications(&self, role: Role, notifications: &[Notification]) -> AppResult<()> {
        self.notifications
            .write()
            .map_err(poisoned)?
            .insert(role, notifications.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{EntityStore, MemoryStore, NotificationRepository, SqliteStore};
    use crate::errors::AppError;
    use crate::types::{Document, Entity, EntityKind, Notification, NotificationKind, Project, Role};
    use chrono::Utc;

    fn project(id: &str, name: &str) -> Entity {
        Entity::Project(Project {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            code: Some(format!("PRJ-{id}")),
            status: None,
            created_at: Utc::now(),
        })
    }

    fn seed(store: &dyn EntityStore, n: usize) {
        seed_from(store, 1, n);
    }

    fn seed_from(store: &dyn EntityStore, first: usize, last: usize) {
        for i in first..=last {
            store.create(&project(&i.to_string(), &format!("Project {i}"))).unwrap();
        }
    }

    #[test]
    fn sqlite_lists_pages_in_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("hub.sqlite")).unwrap();
        seed(&store, 12);

        let page = store.list(EntityKind::Project, 3, 5).unwrap();
        assert_eq!(page.count, 12);
        let ids: Vec<&str> = page.items.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["11", "12"]);

        let beyond = store.list(EntityKind::Project, 9, 5).unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.count, 12);
    }

    #[test]
    fn sqlite_crud_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create(&project("p1", "Chantier Nord")).unwrap();
        assert!(store.create(&project("p1", "dup")).is_err());

        store.update(&project("p1", "Chantier Sud")).unwrap();
        let fetched = store.get_by_id(EntityKind::Project, "p1").unwrap().unwrap();
        assert_eq!(fetched.title(), "Chantier Sud");

        let missing = store.update(&project("nope", "x"));
        assert!(matches!(missing, Err(AppError::NotFound(_))));

        assert!(store.delete(EntityKind::Project, "p1").unwrap());
        assert!(!store.delete(EntityKind::Project, "p1").unwrap());
        assert!(store.get_by_id(EntityKind::Project, "p1").unwrap().is_none());
    }

    #[test]
    fn sqlite_search_matches_fields_case_insensitively() {
        let store = SqliteStore::open_in_memory().unwrap();
        seed(&store, 3);
        store
            .create(&Entity::Document(Document {
                id: "d1".to_string(),
                project_id: None,
                title: "Plan".to_string(),
                description: None,
                filename: Some("RAPPORT-final.pdf".to_string()),
                created_at: Utc::now(),
            }))
            .unwrap();

        assert_eq!(store.search(EntityKind::Project, "prj-2").unwrap().count, 1);
        assert_eq!(store.search(EntityKind::Document, "rapport").unwrap().count, 1);
        assert_eq!(store.search(EntityKind::Document, "absent").unwrap().count, 0);
    }

    #[test]
    fn sqlite_snapshot_fails_on_corrupt_corpus() {
        let store = SqliteStore::open_in_memory().unwrap();
        seed(&store, 2);
        store
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO entities (kind, id, body, created_at) VALUES ('document', 'bad', '{oops', '')",
                [],
            )
            .unwrap();

        assert!(matches!(
            store.snapshot(EntityKind::Document),
            Err(AppError::Corpus { kind: EntityKind::Document, .. })
        ));
        assert_eq!(store.snapshot(EntityKind::Project).unwrap().len(), 2);
        // Listing stays usable and skips the bad row.
        assert!(store.list(EntityKind::Document, 1, 5).unwrap().items.is_empty());
    }

    #[test]
    fn sqlite_list_counts_only_decodable_records() {
        let store = SqliteStore::open_in_memory().unwrap();
        seed(&store, 2);
        store
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO entities (kind, id, body, created_at) VALUES ('project', 'bad', '{oops', '')",
                [],
            )
            .unwrap();
        seed_from(&store, 3, 6);

        let first = store.list(EntityKind::Project, 1, 5).unwrap();
        assert_eq!(first.count, 6);
        assert_eq!(first.items.len(), 5);
        let second = store.list(EntityKind::Project, 2, 5).unwrap();
        let ids: Vec<&str> = second.items.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["6"]);
    }

    #[test]
    fn notifications_persist_per_role() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hub.sqlite");
        let note = Notification {
            id: "n1".to_string(),
            user_id: "u1".to_string(),
            title: "Hello".to_string(),
            message: "World".to_string(),
            kind: NotificationKind::Info,
            read: false,
            created_at: Utc::now(),
            link: Some("/projects/1".to_string()),
        };
        {
            let store = SqliteStore::open(&path).unwrap();
            assert!(store.load_notifications(Role::Admin).unwrap().is_none());
            store.save_notifications(Role::Admin, &[note.clone()]).unwrap();
            store.save_notifications(Role::Admin, &[note.clone()]).unwrap();
        }
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.load_notifications(Role::Admin).unwrap(), Some(vec![note]));
        assert!(reopened.load_notifications(Role::Chef).unwrap().is_none());
    }

    #[test]
    fn memory_store_failure_injection() {
        let store = MemoryStore::new();
        seed(&store, 2);
        store.fail_on(EntityKind::Project).unwrap();
        assert!(matches!(
            store.list(EntityKind::Project, 1, 5),
            Err(AppError::Fetch(_))
        ));
        store.recover(EntityKind::Project).unwrap();
        assert_eq!(store.list(EntityKind::Project, 1, 5).unwrap().count, 2);
    }
}
