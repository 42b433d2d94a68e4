use serde::Serialize;

use crate::types::{EntityKind, Role};

/// Profile values the header falls back to when the user record is incomplete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileDefaults {
    pub display_name: &'static str,
    pub landing_path: &'static str,
}

/// Role-specific behaviour, selected once when a session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolePolicy {
    role: Role,
}

impl RolePolicy {
    pub fn for_role(role: Role) -> Self {
        Self { role }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether the quick search may scan this corpus for the current role.
    pub fn can_search(&self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::Incident => true,
            EntityKind::User => self.role == Role::Admin,
            EntityKind::Project
            | EntityKind::Subproject
            | EntityKind::Meeting
            | EntityKind::Document => self.role != Role::Responsable,
        }
    }

    pub fn visible_kinds(&self) -> Vec<EntityKind> {
        EntityKind::ALL
            .into_iter()
            .filter(|kind| self.can_search(*kind))
            .collect()
    }

    pub fn link_prefix(&self) -> &'static str {
        match self.role {
            Role::Admin => "",
            Role::Chef => "/chef",
            Role::Employee => "/employee",
            Role::Responsable => "/responsable",
        }
    }

    pub fn link(&self, kind: EntityKind, id: &str) -> String {
        format!("{}/{}/{}", self.link_prefix(), kind.path_segment(), id)
    }

    pub fn profile_defaults(&self) -> ProfileDefaults {
        match self.role {
            Role::Admin => ProfileDefaults {
                display_name: "Administrateur",
                landing_path: "/dashboard",
            },
            Role::Chef => ProfileDefaults {
                display_name: "Chef de projet",
                landing_path: "/chef/dashboard",
            },
            Role::Employee => ProfileDefaults {
                display_name: "Employé",
                landing_path: "/employee/dashboard",
            },
            Role::Responsable => ProfileDefaults {
                display_name: "Responsable",
                landing_path: "/responsable/dashboard",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RolePolicy;
    use crate::types::{EntityKind, Role};

    #[test]
    fn responsable_only_sees_incidents() {
        let policy = RolePolicy::for_role(Role::Responsable);
        assert_eq!(policy.visible_kinds(), vec![EntityKind::Incident]);
    }

    #[test]
    fn only_admin_searches_users() {
        for role in Role::ALL {
            let policy = RolePolicy::for_role(role);
            assert_eq!(policy.can_search(EntityKind::User), role == Role::Admin);
            assert!(policy.can_search(EntityKind::Incident));
        }
    }

    #[test]
    fn links_are_role_prefixed() {
        assert_eq!(
            RolePolicy::for_role(Role::Admin).link(EntityKind::Project, "7"),
            "/projects/7"
        );
        assert_eq!(
            RolePolicy::for_role(Role::Employee).link(EntityKind::Project, "7"),
            "/employee/projects/7"
        );
        assert_eq!(
            RolePolicy::for_role(Role::Responsable).link(EntityKind::Incident, "3"),
            "/responsable/incidents/3"
        );
    }
}
