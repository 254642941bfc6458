//! The project store facade.
//!
//! Application code only sees [`ProjectStore`]. Which implementation backs it
//! is decided once by [`open_store`] from configuration and never changes.

mod local;
mod remote;

pub use local::*;
pub use remote::*;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::config::Config;
use crate::db::{init_database, KeyValueStore};
use crate::errors::OpenStoreError;
use crate::models::{Fields, Identity, Project, StoreState, SyncErrorKind};

/// Which implementation backs the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    Local,
    Remote,
}

/// The contract every consumer of project data uses.
///
/// Writes never fail from the caller's point of view; their effect shows up
/// in the next published state.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    fn mode(&self) -> StoreMode;

    /// Subscribe to state changes.
    fn watch(&self) -> watch::Receiver<StoreState>;

    fn state(&self) -> StoreState {
        let rx = self.watch();
        let current = rx.borrow();
        current.clone()
    }

    fn projects(&self) -> Vec<Project> {
        self.state().projects
    }

    fn active_project(&self) -> Option<Project> {
        self.state().active_project
    }

    fn active_project_id(&self) -> Option<String> {
        self.state().active_project_id
    }

    fn loading(&self) -> bool {
        self.state().loading
    }

    fn error(&self) -> Option<SyncErrorKind> {
        self.state().error
    }

    /// Switch to another identity (or sign out with `None`).
    async fn set_identity(&self, identity: Option<Identity>);

    async fn set_active_project_id(&self, id: Option<String>);

    async fn create_project(&self, name: &str, url: Option<&str>) -> Option<Project>;

    async fn update_project(&self, id: &str, fields: Fields);

    async fn delete_project(&self, id: &str);

    async fn rename_project(&self, id: &str, name: &str) {
        let mut fields = Fields::new();
        fields.insert("name".to_string(), Value::String(name.to_string()));
        self.update_project(id, fields).await;
    }

    /// Release subscriptions and connections held by the store.
    async fn shutdown(&self) {}

    /// Flip one checklist item on the active project.
    async fn toggle_check_item(&self, item_key: &str) {
        let Some(project) = self.active_project() else {
            tracing::debug!(item_key, "No active project to toggle");
            return;
        };

        let mut checklist = project
            .fields
            .get("checklist")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let checked = project.is_checked(item_key);
        checklist.insert(item_key.to_string(), Value::Bool(!checked));

        let mut fields = Fields::new();
        fields.insert("checklist".to_string(), Value::Object(checklist));
        self.update_project(&project.id, fields).await;
    }
}

/// Open the store selected by `config`.
///
/// A remote store is used when a non-placeholder remote URL is configured;
/// otherwise projects live in the local key/value database.
pub async fn open_store(config: &Config) -> Result<Arc<dyn ProjectStore>, OpenStoreError> {
    match config.remote() {
        Some(url) => {
            tracing::info!("Remote backend configured; using networked project store");
            let service = crate::remote::connect(url, config.poll_interval).await?;
            Ok(Arc::new(RemoteProjectStore::spawn(
                service,
                config.first_push_timeout,
            )))
        }
        None => {
            tracing::info!("No remote backend configured; using local project store");
            let pool = init_database(&config.db_path).await?;
            let store = LocalProjectStore::open(KeyValueStore::new(pool)).await;
            Ok(Arc::new(store))
        }
    }
}
