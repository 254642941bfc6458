//! Remote document service seam.
//!
//! The backend protocol is opaque to the sync layer: it only needs live
//! subscriptions that deliver whole snapshots, plus create/update/delete.

mod memory;
mod sqlite;

pub use memory::*;
pub use sqlite::*;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::errors::RemoteError;
use crate::models::{Fields, Origin};

/// Collection holding team projects.
pub const SHARED_COLLECTION: &str = "projects";

/// A writable location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// The per-owner collection `users/{uid}/projects`.
    Owner { uid: String },
    /// The shared team collection.
    Shared,
}

impl Location {
    pub fn collection(&self) -> String {
        match self {
            Location::Owner { uid } => format!("users/{}/projects", uid),
            Location::Shared => SHARED_COLLECTION.to_string(),
        }
    }
}

/// A live subscription target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Every record in the owner's collection.
    OwnedBy(String),
    /// Shared records whose `memberIds` contain the identity.
    MemberOf(String),
}

impl Query {
    pub fn location(&self) -> Location {
        match self {
            Query::OwnedBy(uid) => Location::Owner { uid: uid.clone() },
            Query::MemberOf(_) => Location::Shared,
        }
    }

    /// The origin tag records delivered by this subscription carry.
    pub fn origin(&self) -> Origin {
        match self {
            Query::OwnedBy(_) => Origin::Legacy,
            Query::MemberOf(_) => Origin::Shared,
        }
    }

    /// Whether a record stored at this query's location is part of its result.
    pub fn matches(&self, fields: &Fields) -> bool {
        match self {
            Query::OwnedBy(_) => true,
            Query::MemberOf(uid) => fields
                .get("memberIds")
                .and_then(Value::as_array)
                .is_some_and(|ids| ids.iter().any(|id| id.as_str() == Some(uid.as_str()))),
        }
    }
}

/// A stored record as delivered by a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

/// One event on a subscription.
#[derive(Debug, Clone)]
pub enum Push {
    /// The complete current result set, replacing any earlier one.
    Snapshot(Vec<Document>),
    /// The subscription failed; later snapshots may still follow.
    Failed(RemoteError),
}

/// Receiving end of a live subscription.
///
/// Dropping the feed unsubscribes: the receiver closes and any producer task
/// is aborted, so nothing is delivered after teardown.
pub struct Feed {
    events: mpsc::UnboundedReceiver<Push>,
    producer: Option<JoinHandle<()>>,
}

impl Feed {
    pub fn new(events: mpsc::UnboundedReceiver<Push>) -> Self {
        Self {
            events,
            producer: None,
        }
    }

    pub fn with_producer(events: mpsc::UnboundedReceiver<Push>, producer: JoinHandle<()>) -> Self {
        Self {
            events,
            producer: Some(producer),
        }
    }

    /// Next event, or `None` once the producer has gone away.
    pub async fn next(&mut self) -> Option<Push> {
        self.events.recv().await
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        self.events.close();
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}

/// The remote document service contract.
#[async_trait]
pub trait DocumentService: Send + Sync {
    /// Open a live subscription. The first snapshot is delivered as soon as it is available.
    async fn subscribe(&self, query: Query) -> Result<Feed, RemoteError>;

    /// Store a new record and return its id.
    async fn create(&self, location: &Location, fields: Fields) -> Result<String, RemoteError>;

    /// Shallow-merge `fields` into an existing record.
    async fn update(&self, location: &Location, id: &str, fields: Fields)
        -> Result<(), RemoteError>;

    async fn delete(&self, location: &Location, id: &str) -> Result<(), RemoteError>;
}

/// Connect to the document service named by a remote URL.
///
/// `memory:` starts an in-process emulator; `sqlite:<path>` opens a shared
/// document database, re-read every `poll_interval` for foreign writes.
pub async fn connect(
    url: &str,
    poll_interval: std::time::Duration,
) -> Result<Arc<dyn DocumentService>, RemoteError> {
    if url == "memory:" || url == "memory://" {
        tracing::info!("Using in-process document emulator");
        return Ok(Arc::new(MemoryDocumentService::new()));
    }

    if let Some(path) = url.strip_prefix("sqlite:") {
        let path = path.trim_start_matches("//");
        tracing::info!("Using shared document database at {}", path);
        let pool = crate::db::init_document_database(Path::new(path)).await?;
        return Ok(Arc::new(SqliteDocumentService::new(pool, poll_interval)));
    }

    Err(RemoteError::connection(format!(
        "unsupported remote URL scheme: {}",
        url
    )))
}

/// Shallow merge: top-level keys in `changes` replace those in `target`.
pub(crate) fn merge_fields(target: &mut Fields, changes: Fields) {
    for (key, value) in changes {
        target.insert(key, value);
    }
}
