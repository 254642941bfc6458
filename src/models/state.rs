//! Store state published to consumers.

use serde::{Deserialize, Serialize};

use super::Project;

/// Classified subscription failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum SyncErrorKind {
    /// Transient network or service fault.
    Connection,
    /// The identity lacks access to a location. Not retried.
    Permission,
}

impl SyncErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncErrorKind::Connection => "connection",
            SyncErrorKind::Permission => "permission",
        }
    }
}

impl std::fmt::Display for SyncErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a consumer needs to render the project list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreState {
    pub projects: Vec<Project>,
    pub active_project: Option<Project>,
    pub active_project_id: Option<String>,
    pub loading: bool,
    pub error: Option<SyncErrorKind>,
}

impl StoreState {
    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }
}
