//! Project model matching the frontend Project interface.
//!
//! Only `id` and `origin` are structural. Every other field lives in an opaque
//! JSON object so feature data (checklist state, history arrays, settings)
//! round-trips untouched, and so a record with a malformed field still loads.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::member::{MemberRole, ProjectMember};
use super::timestamp;
use super::Identity;

/// Opaque top-level fields of a stored record.
pub type Fields = Map<String, Value>;

/// Which location a project record was read from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Per-owner collection (`users/{uid}/projects`).
    #[default]
    Legacy,
    /// Team collection filtered by membership.
    Shared,
    /// Local fallback store.
    Local,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Legacy => "legacy",
            Origin::Shared => "shared",
            Origin::Local => "local",
        }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field names that belong to the record envelope and are never written back.
pub const RESERVED_FIELDS: [&str; 2] = ["id", "origin"];

/// A project as seen by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: String,
    #[serde(default)]
    pub origin: Origin,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Project {
    /// Build a project from a stored record, tagging it with the origin it was read from.
    pub fn from_record(id: impl Into<String>, origin: Origin, mut fields: Fields) -> Self {
        for key in RESERVED_FIELDS {
            fields.remove(key);
        }
        Self {
            id: id.into(),
            origin,
            fields,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.fields.get("name").and_then(Value::as_str)
    }

    /// `createdAt` as epoch milliseconds, if it parses.
    pub fn created_at_millis(&self) -> Option<i64> {
        self.fields.get("createdAt").and_then(timestamp::to_millis)
    }

    /// `updatedAt` as epoch milliseconds, if it parses.
    pub fn updated_at_millis(&self) -> Option<i64> {
        self.fields.get("updatedAt").and_then(timestamp::to_millis)
    }

    /// Checklist state for one item. Missing or non-boolean entries read as unchecked.
    pub fn is_checked(&self, item_key: &str) -> bool {
        self.fields
            .get("checklist")
            .and_then(|c| c.get(item_key))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Default settings sub-document for new projects.
pub fn default_settings() -> Value {
    json!({
        "notificationsEnabled": true,
        "reminderFrequency": "weekly",
        "timezone": "UTC",
    })
}

/// Full field scaffold for a newly created project.
///
/// Every feature section is initialized to its empty shape so readers never
/// have to null-check top-level sections.
pub fn new_project_fields(owner: &Identity, name: &str, url: Option<&str>, now: &str) -> Fields {
    let creator = ProjectMember {
        uid: owner.uid.clone(),
        email: owner.email.clone(),
        display_name: owner.display_name.clone(),
        role: MemberRole::Admin,
        added_at: now.to_string(),
    };

    let record = json!({
        "name": name,
        "url": url.unwrap_or_default(),
        "ownerId": owner.uid,
        "memberIds": [owner.uid],
        "members": [creator],
        "createdAt": now,
        "updatedAt": now,
        "checklist": {},
        "notes": {},
        "auditHistory": [],
        "scoreHistory": [],
        "settings": default_settings(),
    });

    match record {
        Value::Object(fields) => fields,
        _ => Fields::new(),
    }
}

/// Drop keys the caller is not allowed to set on update.
pub fn sanitize_update(mut fields: Fields) -> Fields {
    for key in RESERVED_FIELDS {
        fields.remove(key);
    }
    fields.remove("updatedAt");
    fields
}
