//! Local fallback store.
//!
//! Used when no remote backend is configured. Projects are persisted in the
//! key/value database under per-identity keys and published through the same
//! state channel and selection rules as the networked store.

use tokio::sync::{watch, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use super::{ProjectStore, StoreMode};
use crate::db::KeyValueStore;
use crate::models::{
    new_project_fields, sanitize_update, timestamp, Fields, Identity, Origin, Project, StoreState,
};
use crate::sync::reconcile::sort_newest_first;
use crate::sync::ActiveSelection;

/// Owner recorded on projects created while nobody is signed in.
const ANONYMOUS_OWNER: &str = "local";

/// Storage keys for one identity. Signed-in keys are `projects:{uid}` and
/// `activeProjectId:{uid}`; the signed-out keys lack that prefix so no uid can
/// reach them.
struct Keys {
    projects: String,
    active: String,
}

impl Keys {
    fn for_identity(identity: Option<&Identity>) -> Self {
        match identity {
            Some(identity) => Self {
                projects: format!("projects:{}", identity.uid),
                active: format!("activeProjectId:{}", identity.uid),
            },
            None => Self {
                projects: "anonymous/projects".to_string(),
                active: "anonymous/activeProjectId".to_string(),
            },
        }
    }
}

struct LocalState {
    identity: Option<Identity>,
    keys: Keys,
    projects: Vec<Project>,
    selection: ActiveSelection,
}

impl LocalState {
    fn owner(&self) -> Identity {
        self.identity
            .clone()
            .unwrap_or_else(|| Identity::new(ANONYMOUS_OWNER))
    }

    fn snapshot(&self) -> StoreState {
        StoreState {
            projects: self.projects.clone(),
            active_project: self.selection.active_project(&self.projects).cloned(),
            active_project_id: self.selection.active_id().map(str::to_string),
            loading: false,
            error: None,
        }
    }
}

/// Project store backed only by local persistence.
pub struct LocalProjectStore {
    kv: KeyValueStore,
    inner: Mutex<LocalState>,
    state: watch::Sender<StoreState>,
}

impl LocalProjectStore {
    /// Open the store signed out.
    pub async fn open(kv: KeyValueStore) -> Self {
        let inner = load(&kv, None).await;
        let (state, _) = watch::channel(inner.snapshot());
        Self {
            kv,
            inner: Mutex::new(inner),
            state,
        }
    }

    async fn persist(&self, inner: &LocalState) {
        let keys = &inner.keys;
        if let Err(e) = self.kv.set(&keys.projects, &inner.projects).await {
            tracing::error!(key = %keys.projects, "Failed to persist projects: {}", e);
        }
        if let Err(e) = self
            .kv
            .set(&keys.active, &inner.selection.active_id())
            .await
        {
            tracing::error!(key = %keys.active, "Failed to persist active project: {}", e);
        }
    }

    fn publish(&self, inner: &LocalState) {
        self.state.send_replace(inner.snapshot());
    }
}

async fn load(kv: &KeyValueStore, identity: Option<Identity>) -> LocalState {
    let keys = Keys::for_identity(identity.as_ref());

    let mut projects: Vec<Project> = kv
        .get(&keys.projects, Vec::new())
        .await
        .unwrap_or_else(|e| {
            tracing::error!(key = %keys.projects, "Failed to load projects: {}", e);
            Vec::new()
        });
    for project in &mut projects {
        project.origin = Origin::Local;
    }
    sort_newest_first(&mut projects);

    let active_id: Option<String> = kv
        .get(&keys.active, None)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(key = %keys.active, "Failed to load active project: {}", e);
            None
        });
    let mut selection = ActiveSelection::restored(active_id);
    selection.resolve(&projects);

    tracing::debug!(key = %keys.projects, count = projects.len(), "Loaded local projects");

    LocalState {
        identity,
        keys,
        projects,
        selection,
    }
}

#[async_trait]
impl ProjectStore for LocalProjectStore {
    fn mode(&self) -> StoreMode {
        StoreMode::Local
    }

    fn watch(&self) -> watch::Receiver<StoreState> {
        self.state.subscribe()
    }

    async fn set_identity(&self, identity: Option<Identity>) {
        let mut inner = self.inner.lock().await;
        if inner.identity == identity {
            return;
        }
        *inner = load(&self.kv, identity).await;
        self.publish(&inner);
    }

    async fn set_active_project_id(&self, id: Option<String>) {
        let mut inner = self.inner.lock().await;
        let LocalState {
            projects,
            selection,
            ..
        } = &mut *inner;
        selection.select(id);
        selection.resolve(projects);
        self.persist(&inner).await;
        self.publish(&inner);
    }

    async fn create_project(&self, name: &str, url: Option<&str>) -> Option<Project> {
        let mut inner = self.inner.lock().await;
        let now = timestamp::now();
        let fields = new_project_fields(&inner.owner(), name, url, &now);
        let project = Project::from_record(uuid::Uuid::new_v4().to_string(), Origin::Local, fields);

        let LocalState {
            projects,
            selection,
            ..
        } = &mut *inner;
        projects.push(project.clone());
        sort_newest_first(projects);
        selection.select(Some(project.id.clone()));
        selection.resolve(projects);

        self.persist(&inner).await;
        self.publish(&inner);
        tracing::info!(id = %project.id, "Created local project");
        Some(project)
    }

    async fn update_project(&self, id: &str, fields: Fields) {
        let mut inner = self.inner.lock().await;
        let Some(project) = inner.projects.iter_mut().find(|p| p.id == id) else {
            tracing::warn!(id, "Update for unknown local project ignored");
            return;
        };

        let stamp = timestamp::next_after(project.fields.get("updatedAt"));
        for (key, value) in sanitize_update(fields) {
            project.fields.insert(key, value);
        }
        project
            .fields
            .insert("updatedAt".to_string(), Value::String(stamp));

        self.persist(&inner).await;
        self.publish(&inner);
    }

    async fn delete_project(&self, id: &str) {
        let mut inner = self.inner.lock().await;
        let LocalState {
            projects,
            selection,
            ..
        } = &mut *inner;
        let before = projects.len();
        projects.retain(|p| p.id != id);
        if projects.len() == before {
            tracing::warn!(id, "Delete for unknown local project ignored");
            return;
        }
        selection.resolve(projects);

        self.persist(&inner).await;
        self.publish(&inner);
    }

    async fn shutdown(&self) {
        self.kv.close().await;
    }
}
