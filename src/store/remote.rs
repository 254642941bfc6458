//! Networked store: subscription loop plus write router.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use super::{ProjectStore, StoreMode};
use crate::models::{Fields, Identity, Project, StoreState};
use crate::remote::DocumentService;
use crate::sync::{Command, SubscriptionManager, WriteRouter};

/// Project store backed by a remote document service.
///
/// Reads come from the subscription loop's published state. Writes go to the
/// service through the router and never touch that state directly.
pub struct RemoteProjectStore {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<StoreState>,
    identity: RwLock<Option<Identity>>,
    router: WriteRouter,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RemoteProjectStore {
    pub fn spawn(service: Arc<dyn DocumentService>, first_push_timeout: Duration) -> Self {
        let (commands, state, task) =
            SubscriptionManager::spawn(service.clone(), first_push_timeout);
        Self {
            commands,
            state,
            identity: RwLock::new(None),
            router: WriteRouter::new(service),
            task: Mutex::new(Some(task)),
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::error!("Subscription loop is not running");
        }
    }

    /// The signed-in identity, or `None` after logging why the write is skipped.
    async fn writer(&self, operation: &str) -> Option<Identity> {
        let identity = self.identity.read().await.clone();
        if identity.is_none() {
            tracing::warn!(operation, "Write skipped: no signed-in identity");
        }
        identity
    }

    fn current_projects(&self) -> Vec<Project> {
        self.state.borrow().projects.clone()
    }
}

impl Drop for RemoteProjectStore {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

#[async_trait]
impl ProjectStore for RemoteProjectStore {
    fn mode(&self) -> StoreMode {
        StoreMode::Remote
    }

    fn watch(&self) -> watch::Receiver<StoreState> {
        self.state.clone()
    }

    async fn set_identity(&self, identity: Option<Identity>) {
        *self.identity.write().await = identity.clone();
        self.send(Command::SetIdentity(identity));
    }

    async fn set_active_project_id(&self, id: Option<String>) {
        self.send(Command::Select(id));
    }

    async fn create_project(&self, name: &str, url: Option<&str>) -> Option<Project> {
        let owner = self.writer("create").await?;
        let project = self.router.create(&owner, name, url).await?;
        self.send(Command::SelectPending(project.id.clone()));
        Some(project)
    }

    async fn update_project(&self, id: &str, fields: Fields) {
        let Some(owner) = self.writer("update").await else {
            return;
        };
        self.router
            .update(&owner, &self.current_projects(), id, fields)
            .await;
    }

    async fn delete_project(&self, id: &str) {
        let Some(owner) = self.writer("delete").await else {
            return;
        };
        self.router
            .delete(&owner, &self.current_projects(), id)
            .await;
    }

    async fn rename_project(&self, id: &str, name: &str) {
        let Some(owner) = self.writer("rename").await else {
            return;
        };
        self.router
            .rename(&owner, &self.current_projects(), id, name)
            .await;
    }

    async fn shutdown(&self) {
        *self.identity.write().await = None;
        let Some(task) = self.task.lock().await.take() else {
            return;
        };
        self.send(Command::Shutdown);
        if let Err(e) = task.await {
            tracing::error!("Subscription loop ended abnormally: {}", e);
        }
    }
}
