//! In-process document service.
//!
//! Pushes a fresh snapshot to every matching subscriber synchronously on each
//! write. Used as the `memory:` emulator and as the fake backend in tests,
//! with hooks to deny access, fail writes, stall first pushes and inject
//! subscription errors.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use super::{merge_fields, Document, DocumentService, Feed, Location, Push, Query};
use crate::errors::RemoteError;
use crate::models::Fields;

struct Subscriber {
    query: Query,
    tx: mpsc::UnboundedSender<Push>,
}

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, BTreeMap<String, Fields>>,
    subscribers: Vec<Subscriber>,
    denied: HashSet<String>,
    write_failure: Option<RemoteError>,
    stalled: bool,
}

impl MemoryState {
    fn snapshot(&self, query: &Query) -> Vec<Document> {
        self.collections
            .get(&query.location().collection())
            .map(|docs| {
                docs.iter()
                    .filter(|(_, fields)| query.matches(fields))
                    .map(|(id, fields)| Document {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn notify(&mut self, collection: &str) {
        self.subscribers.retain(|s| !s.tx.is_closed());
        if self.stalled {
            return;
        }
        for subscriber in &self.subscribers {
            if subscriber.query.location().collection() == collection {
                let docs = self.snapshot(&subscriber.query);
                let _ = subscriber.tx.send(Push::Snapshot(docs));
            }
        }
    }

    fn check_write(&self, collection: &str) -> Result<(), RemoteError> {
        if self.denied.contains(collection) {
            return Err(RemoteError::permission(format!(
                "write to {} denied",
                collection
            )));
        }
        match &self.write_failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Document service held entirely in memory.
#[derive(Default)]
pub struct MemoryDocumentService {
    state: Mutex<MemoryState>,
}

impl MemoryDocumentService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl MemoryDocumentService {
    /// Store a record directly, bypassing write hooks, and notify subscribers.
    pub async fn insert(&self, location: &Location, id: &str, fields: Fields) {
        let mut state = self.state.lock().await;
        let collection = location.collection();
        state
            .collections
            .entry(collection.clone())
            .or_default()
            .insert(id.to_string(), fields);
        state.notify(&collection);
    }

    pub async fn get(&self, location: &Location, id: &str) -> Option<Fields> {
        let state = self.state.lock().await;
        state
            .collections
            .get(&location.collection())
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// Deny all access to `location`: subscriptions report a permission error, writes fail.
    pub async fn deny(&self, location: &Location) {
        self.state.lock().await.denied.insert(location.collection());
    }

    /// Make every subsequent write fail with `error` (or succeed again with `None`).
    pub async fn fail_writes(&self, error: Option<RemoteError>) {
        self.state.lock().await.write_failure = error;
    }

    /// Stop delivering snapshots until released; models a stalled backend.
    pub async fn stall(&self, stalled: bool) {
        let mut state = self.state.lock().await;
        state.stalled = stalled;
        if !stalled {
            let collections: Vec<String> = state
                .subscribers
                .iter()
                .map(|s| s.query.location().collection())
                .collect();
            for collection in collections {
                state.notify(&collection);
            }
        }
    }

    /// Deliver an error to every live subscriber of `location`.
    pub async fn emit_error(&self, location: &Location, error: RemoteError) {
        let state = self.state.lock().await;
        let collection = location.collection();
        for subscriber in &state.subscribers {
            if subscriber.query.location().collection() == collection {
                let _ = subscriber.tx.send(Push::Failed(error.clone()));
            }
        }
    }

    /// Number of subscriptions whose receivers are still open.
    pub async fn live_subscriptions(&self) -> usize {
        let state = self.state.lock().await;
        state
            .subscribers
            .iter()
            .filter(|s| !s.tx.is_closed())
            .count()
    }
}

#[async_trait]
impl DocumentService for MemoryDocumentService {
    async fn subscribe(&self, query: Query) -> Result<Feed, RemoteError> {
        let mut state = self.state.lock().await;
        let (tx, rx) = mpsc::unbounded_channel();
        let collection = query.location().collection();

        if state.denied.contains(&collection) {
            let _ = tx.send(Push::Failed(RemoteError::permission(format!(
                "missing or insufficient permissions for {}",
                collection
            ))));
            return Ok(Feed::new(rx));
        }

        if !state.stalled {
            let _ = tx.send(Push::Snapshot(state.snapshot(&query)));
        }
        state.subscribers.push(Subscriber { query, tx });

        Ok(Feed::new(rx))
    }

    async fn create(&self, location: &Location, fields: Fields) -> Result<String, RemoteError> {
        let mut state = self.state.lock().await;
        let collection = location.collection();
        state.check_write(&collection)?;

        let id = uuid::Uuid::new_v4().to_string();
        state
            .collections
            .entry(collection.clone())
            .or_default()
            .insert(id.clone(), fields);
        state.notify(&collection);

        Ok(id)
    }

    async fn update(
        &self,
        location: &Location,
        id: &str,
        fields: Fields,
    ) -> Result<(), RemoteError> {
        let mut state = self.state.lock().await;
        let collection = location.collection();
        state.check_write(&collection)?;

        let existing = state
            .collections
            .get_mut(&collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| RemoteError::connection(format!("no document {} in {}", id, collection)))?;
        merge_fields(existing, fields);
        state.notify(&collection);

        Ok(())
    }

    async fn delete(&self, location: &Location, id: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock().await;
        let collection = location.collection();
        state.check_write(&collection)?;

        if let Some(docs) = state.collections.get_mut(&collection) {
            docs.remove(id);
        }
        state.notify(&collection);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncErrorKind;
    use serde_json::{json, Value};

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn owner() -> Location {
        Location::Owner { uid: "u1".into() }
    }

    async fn next_snapshot(feed: &mut Feed) -> Vec<Document> {
        match feed.next().await {
            Some(Push::Snapshot(docs)) => docs,
            other => panic!("expected snapshot, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_subscribe_delivers_initial_and_subsequent_snapshots() {
        let service = MemoryDocumentService::new();
        let mut feed = service.subscribe(Query::OwnedBy("u1".into())).await.unwrap();
        assert!(next_snapshot(&mut feed).await.is_empty());

        let id = service
            .create(&owner(), fields(json!({ "name": "A" })))
            .await
            .unwrap();
        let docs = next_snapshot(&mut feed).await;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, id);

        service
            .update(&owner(), &id, fields(json!({ "name": "B" })))
            .await
            .unwrap();
        let docs = next_snapshot(&mut feed).await;
        assert_eq!(docs[0].fields["name"], "B");

        service.delete(&owner(), &id).await.unwrap();
        assert!(next_snapshot(&mut feed).await.is_empty());
    }

    #[tokio::test]
    async fn test_shared_subscription_filters_by_membership() {
        let service = MemoryDocumentService::new();
        service
            .insert(&Location::Shared, "mine", fields(json!({ "memberIds": ["u1"] })))
            .await;
        service
            .insert(&Location::Shared, "theirs", fields(json!({ "memberIds": ["u2"] })))
            .await;

        let mut feed = service.subscribe(Query::MemberOf("u1".into())).await.unwrap();
        let docs = next_snapshot(&mut feed).await;

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "mine");
    }

    #[tokio::test]
    async fn test_denied_location_reports_permission_error() {
        let service = MemoryDocumentService::new();
        service.deny(&Location::Shared).await;

        let mut feed = service.subscribe(Query::MemberOf("u1".into())).await.unwrap();
        match feed.next().await {
            Some(Push::Failed(err)) => assert_eq!(err.kind, SyncErrorKind::Permission),
            other => panic!("expected failure, got {:?}", other),
        }

        let err = service
            .create(&Location::Shared, Fields::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, SyncErrorKind::Permission);
    }

    #[tokio::test]
    async fn test_dropped_feed_is_pruned() {
        let service = MemoryDocumentService::new();
        let feed = service.subscribe(Query::OwnedBy("u1".into())).await.unwrap();
        assert_eq!(service.live_subscriptions().await, 1);

        drop(feed);
        assert_eq!(service.live_subscriptions().await, 0);
    }

    #[tokio::test]
    async fn test_update_missing_document_fails() {
        let service = MemoryDocumentService::new();
        let result = service.update(&owner(), "nope", Fields::new()).await;
        assert!(result.is_err());
    }
}
