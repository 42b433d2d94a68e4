use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::db::NotificationRepository;
use crate::errors::{AppError, AppResult};
use crate::policy::RolePolicy;
use crate::types::{EntityKind, Notification, NotificationKind, Role};

/// Bell icon render state. The badge count is never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BellState {
    Idle,
    Unread { count: usize },
}

/// Build a fresh, unread notification with a generated id.
pub fn compose(
    user_id: &str,
    title: impl Into<String>,
    message: impl Into<String>,
    kind: NotificationKind,
    link: Option<String>,
) -> Notification {
    Notification {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        title: title.into(),
        message: message.into(),
        kind,
        read: false,
        created_at: Utc::now(),
        link,
    }
}

/// Sample notifications for a first session: one welcome message plus the
/// role's own templates, newest first. Pure: same inputs, same output.
pub fn seed_notifications(role: Role, user_id: &str, now: DateTime<Utc>) -> Vec<Notification> {
    let policy = RolePolicy::for_role(role);
    let mut templates: Vec<(&str, &str, NotificationKind, Option<String>)> = vec![(
        "Bienvenue",
        "Bienvenue sur votre espace de gestion de projets.",
        NotificationKind::Info,
        None,
    )];

    match role {
        Role::Admin => {
            templates.push((
                "Nouvel utilisateur",
                "Un compte utilisateur attend votre validation.",
                NotificationKind::Warning,
                Some(format!("{}/{}", policy.link_prefix(), EntityKind::User.path_segment())),
            ));
            templates.push((
                "Sauvegarde terminée",
                "La sauvegarde hebdomadaire des données s'est terminée avec succès.",
                NotificationKind::Success,
                None,
            ));
        }
        Role::Chef => {
            templates.push((
                "Incident signalé",
                "Un incident a été signalé sur l'un de vos projets.",
                NotificationKind::Warning,
                Some(format!("{}/{}", policy.link_prefix(), EntityKind::Incident.path_segment())),
            ));
            templates.push((
                "Réunion planifiée",
                "Une réunion de suivi est prévue demain à 10h.",
                NotificationKind::Info,
                Some(format!("{}/{}", policy.link_prefix(), EntityKind::Meeting.path_segment())),
            ));
            templates.push((
                "Document validé",
                "Le document de cadrage a été validé.",
                NotificationKind::Success,
                Some(format!("{}/{}", policy.link_prefix(), EntityKind::Document.path_segment())),
            ));
        }
        Role::Employee => {
            templates.push((
                "Nouvelle tâche",
                "Une nouvelle tâche vous a été assignée.",
                NotificationKind::Info,
                Some(format!("{}/{}", policy.link_prefix(), EntityKind::Project.path_segment())),
            ));
            templates.push((
                "Rappel de réunion",
                "N'oubliez pas la réunion d'équipe de cet après-midi.",
                NotificationKind::Warning,
                Some(format!("{}/{}", policy.link_prefix(), EntityKind::Meeting.path_segment())),
            ));
        }
        Role::Responsable => {
            templates.push((
                "Incident critique",
                "Un incident critique nécessite votre attention.",
                NotificationKind::Error,
                Some(format!("{}/{}", policy.link_prefix(), EntityKind::Incident.path_segment())),
            ));
            templates.push((
                "Rapport disponible",
                "Le rapport mensuel des incidents est disponible.",
                NotificationKind::Info,
                None,
            ));
        }
    }

    templates
        .into_iter()
        .enumerate()
        .map(|(i, (title, message, kind, link))| Notification {
            id: format!("seed-{}-{}", role.as_str(), i + 1),
            user_id: user_id.to_string(),
            title: title.to_string(),
            message: message.to_string(),
            kind,
            read: false,
            created_at: now - Duration::minutes(i as i64 * 5),
            link,
        })
        .collect()
}

/// The session's notification list with read/unread tracking.
/// Every mutation is written back through the repository.
pub struct NotificationInbox {
    repo: Arc<dyn NotificationRepository>,
    role: Role,
    items: Vec<Notification>,
    unread: usize,
}

impl NotificationInbox {
    /// Load the persisted list for `role`, seeding and persisting it the first time.
    pub fn load(repo: Arc<dyn NotificationRepository>, role: Role, user_id: &str) -> AppResult<Self> {
        let items = match repo.load_notifications(role)? {
            Some(items) => items,
            None => {
                let seeded = seed_notifications(role, user_id, Utc::now());
                tracing::info!(role = role.as_str(), count = seeded.len(), "seeding notifications");
                repo.save_notifications(role, &seeded)?;
                seeded
            }
        };
        let mut inbox = Self {
            repo,
            role,
            items,
            unread: 0,
        };
        inbox.recount();
        Ok(inbox)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.items
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    pub fn bell(&self) -> BellState {
        match self.unread {
            0 => BellState::Idle,
            count => BellState::Unread { count },
        }
    }

    /// Mark one entry read and return the link to navigate to, if any.
    pub fn mark_read(&mut self, index: usize) -> AppResult<Option<String>> {
        let len = self.items.len();
        let mut next = self.items.clone();
        let item = next
            .get_mut(index)
            .ok_or_else(|| AppError::NotFound(format!("notification #{index} of {len}")))?;
        item.read = true;
        let link = item.link.clone();
        self.commit(next)?;
        Ok(link)
    }

    pub fn mark_all_read(&mut self) -> AppResult<()> {
        if self.unread == 0 {
            return Ok(());
        }
        let mut next = self.items.clone();
        for item in &mut next {
            item.read = true;
        }
        self.commit(next)
    }

    /// Insert a notification delivered by the backend at the top of the list.
    pub fn push(&mut self, notification: Notification) -> AppResult<()> {
        let mut next = Vec::with_capacity(self.items.len() + 1);
        next.push(notification);
        next.extend(self.items.iter().cloned());
        self.commit(next)
    }

    /// Persist `next` first; the in-memory list only changes once the save succeeded.
    fn commit(&mut self, next: Vec<Notification>) -> AppResult<()> {
        self.repo.save_notifications(self.role, &next)?;
        self.items = next;
        self.recount();
        Ok(())
    }

    fn recount(&mut self) {
        self.unread = self.items.iter().filter(|n| !n.read).count();
    }
}
