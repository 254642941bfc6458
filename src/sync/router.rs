//! Write routing for the networked store.
//!
//! A write goes to the location its record was read from. Remote failures are
//! logged and swallowed: the caller sees a no-op and the next snapshot shows
//! the true state.

use std::sync::Arc;

use serde_json::Value;

use crate::models::{
    new_project_fields, sanitize_update, timestamp, Fields, Identity, Origin, Project,
};
use crate::remote::{DocumentService, Location};

/// Where a write for a given id lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub location: Location,
    pub origin: Origin,
}

/// Origin of records this client creates.
pub const CREATE_ORIGIN: Origin = Origin::Legacy;

pub struct WriteRouter {
    service: Arc<dyn DocumentService>,
}

impl WriteRouter {
    pub fn new(service: Arc<dyn DocumentService>) -> Self {
        Self { service }
    }

    /// Recover the origin of `id` from the merged list. Unknown ids (not yet
    /// echoed back) are assumed to live where new records are created.
    pub fn resolve_target(&self, owner: &Identity, projects: &[Project], id: &str) -> Target {
        let origin = projects
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.origin)
            .unwrap_or(CREATE_ORIGIN);

        let location = match origin {
            Origin::Shared => Location::Shared,
            Origin::Legacy | Origin::Local => Location::Owner {
                uid: owner.uid.clone(),
            },
        };

        Target { location, origin }
    }

    /// Create a project in the owner's collection with the full default scaffold.
    pub async fn create(&self, owner: &Identity, name: &str, url: Option<&str>) -> Option<Project> {
        let now = timestamp::now();
        let fields = new_project_fields(owner, name, url, &now);
        let location = Location::Owner {
            uid: owner.uid.clone(),
        };

        match self.service.create(&location, fields.clone()).await {
            Ok(id) => {
                tracing::info!(%id, "Created project");
                Some(Project::from_record(id, CREATE_ORIGIN, fields))
            }
            Err(e) => {
                tracing::error!(name, "Failed to create project: {}", e);
                None
            }
        }
    }

    /// Merge `fields` into the record and stamp `updatedAt`.
    pub async fn update(&self, owner: &Identity, projects: &[Project], id: &str, fields: Fields) {
        let target = self.resolve_target(owner, projects, id);
        let previous = projects
            .iter()
            .find(|p| p.id == id)
            .and_then(|p| p.fields.get("updatedAt"));

        let mut fields = sanitize_update(fields);
        fields.insert(
            "updatedAt".to_string(),
            Value::String(timestamp::next_after(previous)),
        );

        if let Err(e) = self.service.update(&target.location, id, fields).await {
            tracing::error!(id, origin = %target.origin, "Failed to update project: {}", e);
        }
    }

    pub async fn rename(&self, owner: &Identity, projects: &[Project], id: &str, name: &str) {
        let mut fields = Fields::new();
        fields.insert("name".to_string(), Value::String(name.to_string()));
        self.update(owner, projects, id, fields).await;
    }

    pub async fn delete(&self, owner: &Identity, projects: &[Project], id: &str) {
        let target = self.resolve_target(owner, projects, id);

        if let Err(e) = self.service.delete(&target.location, id).await {
            tracing::error!(id, origin = %target.origin, "Failed to delete project: {}", e);
        }
    }
}
