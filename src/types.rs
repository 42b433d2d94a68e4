use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who is signed in. Drives corpus visibility, link prefixes and seed notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Chef,
    Employee,
    Responsable,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Chef, Role::Employee, Role::Responsable];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Chef => "chef",
            Role::Employee => "employee",
            Role::Responsable => "responsable",
        }
    }

    /// Case-insensitive. Accepts the long "chef-de-projet" spelling used by the web client.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "chef" | "chef-de-projet" | "chef_de_projet" => Some(Role::Chef),
            "employee" | "employe" => Some(Role::Employee),
            "responsable" => Some(Role::Responsable),
            _ => None,
        }
    }
}

/// Entity types. Declaration order is the display order of search result groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Project,
    Subproject,
    Meeting,
    Document,
    Incident,
    User,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Project,
        EntityKind::Subproject,
        EntityKind::Meeting,
        EntityKind::Document,
        EntityKind::Incident,
        EntityKind::User,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Project => "project",
            EntityKind::Subproject => "subproject",
            EntityKind::Meeting => "meeting",
            EntityKind::Document => "document",
            EntityKind::Incident => "incident",
            EntityKind::User => "user",
        }
    }

    /// Route segment used when building result links.
    pub fn path_segment(self) -> &'static str {
        match self {
            EntityKind::Project => "projects",
            EntityKind::Subproject => "subprojects",
            EntityKind::Meeting => "meetings",
            EntityKind::Document => "documents",
            EntityKind::Incident => "incidents",
            EntityKind::User => "users",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value || kind.path_segment() == value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubProject {
    pub id: String,
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub firstname: String,
    pub email: String,
    pub role: Role,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Any record held by the entity store, tagged with its kind on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Entity {
    Project(Project),
    Subproject(SubProject),
    Meeting(Meeting),
    Document(Document),
    Incident(Incident),
    User(User),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Project(_) => EntityKind::Project,
            Entity::Subproject(_) => EntityKind::Subproject,
            Entity::Meeting(_) => EntityKind::Meeting,
            Entity::Document(_) => EntityKind::Document,
            Entity::Incident(_) => EntityKind::Incident,
            Entity::User(_) => EntityKind::User,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Entity::Project(p) => &p.id,
            Entity::Subproject(s) => &s.id,
            Entity::Meeting(m) => &m.id,
            Entity::Document(d) => &d.id,
            Entity::Incident(i) => &i.id,
            Entity::User(u) => &u.id,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Entity::Project(p) => p.created_at,
            Entity::Subproject(s) => s.created_at,
            Entity::Meeting(m) => m.created_at,
            Entity::Document(d) => d.created_at,
            Entity::Incident(i) => i.created_at,
            Entity::User(u) => u.created_at,
        }
    }

    /// Display title. Users show as "Firstname Name".
    pub fn title(&self) -> String {
        match self {
            Entity::Project(p) => p.name.clone(),
            Entity::Subproject(s) => s.name.clone(),
            Entity::Meeting(m) => m.title.clone(),
            Entity::Document(d) => d.title.clone(),
            Entity::Incident(i) => i.title.clone(),
            Entity::User(u) => format!("{} {}", u.firstname, u.name),
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Entity::Project(p) => p.description.as_deref(),
            Entity::Subproject(s) => s.description.as_deref(),
            Entity::Meeting(m) => m.description.as_deref(),
            Entity::Document(d) => d.description.as_deref(),
            Entity::Incident(i) => i.description.as_deref(),
            Entity::User(u) => Some(u.email.as_str()),
        }
    }

    /// The fixed set of fields a text query is matched against for this kind.
    pub fn search_fields(&self) -> Vec<&str> {
        let fields: [Option<&str>; 4] = match self {
            Entity::Project(p) => [
                Some(p.name.as_str()),
                p.description.as_deref(),
                Some(p.id.as_str()),
                p.code.as_deref(),
            ],
            Entity::Subproject(s) => [
                Some(s.name.as_str()),
                s.description.as_deref(),
                Some(s.id.as_str()),
                s.code.as_deref(),
            ],
            Entity::Meeting(m) => [
                Some(m.title.as_str()),
                m.description.as_deref(),
                Some(m.id.as_str()),
                m.location.as_deref(),
            ],
            Entity::Document(d) => [
                Some(d.title.as_str()),
                d.description.as_deref(),
                Some(d.id.as_str()),
                d.filename.as_deref(),
            ],
            Entity::Incident(i) => [
                Some(i.title.as_str()),
                i.description.as_deref(),
                Some(i.id.as_str()),
                i.status.as_deref(),
            ],
            Entity::User(u) => [
                Some(u.name.as_str()),
                Some(u.firstname.as_str()),
                Some(u.email.as_str()),
                Some(u.id.as_str()),
            ],
        };
        fields.into_iter().flatten().collect()
    }
}

/// One page (or one flat search) worth of records plus the store-side total.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub items: Vec<Entity>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub kind: EntityKind,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultGroup {
    pub kind: EntityKind,
    pub items: Vec<SearchResult>,
}

/// Where the header search stands for the query it carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed,
}

/// Search output grouped by kind in display order.
/// `skipped` lists kinds whose corpus could not be scanned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub query: String,
    pub status: SearchStatus,
    pub groups: Vec<ResultGroup>,
    pub skipped: Vec<EntityKind>,
}

impl SearchResults {
    /// A scan for `query` is in flight; no older matches are carried.
    pub fn loading(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            status: SearchStatus::Loading,
            ..Self::default()
        }
    }

    pub fn failed(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            status: SearchStatus::Failed,
            ..Self::default()
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == SearchStatus::Loading
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.items.is_empty())
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.items.len()).sum()
    }

    pub fn group(&self, kind: EntityKind) -> Option<&ResultGroup> {
        self.groups.iter().find(|g| g.kind == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SearchResult> {
        self.groups.iter().flat_map(|g| g.items.iter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Warning,
    Error,
    Success,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}
