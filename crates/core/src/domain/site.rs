use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiteId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    SiteEngineer,
    ProjectManager,
    Procurement,
    Storekeeper,
    Admin,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SiteEngineer => "site_engineer",
            Self::ProjectManager => "project_manager",
            Self::Procurement => "procurement",
            Self::Storekeeper => "storekeeper",
            Self::Admin => "admin",
        }
    }
}

/// Identity of the caller. Authentication and project access checks happen
/// before a value of this type is constructed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: ActorRole) -> Self {
        Self { user_id: user_id.into(), role }
    }
}
