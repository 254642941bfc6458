//! Document service over a shared SQLite database.
//!
//! Writes made through this handle wake subscribers immediately. Writes made
//! by other clients sharing the file are picked up by a periodic re-read.
//! A subscriber only pushes when its result set actually changed.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tokio::sync::{mpsc, watch};

use super::{merge_fields, Document, DocumentService, Feed, Location, Push, Query};
use crate::errors::RemoteError;
use crate::models::Fields;

/// Document service backed by the `documents` table.
pub struct SqliteDocumentService {
    pool: SqlitePool,
    poll_interval: Duration,
    revision: watch::Sender<u64>,
}

impl SqliteDocumentService {
    pub fn new(pool: SqlitePool, poll_interval: Duration) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            pool,
            poll_interval,
            revision,
        }
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }
}

async fn load_fields(
    conn: &mut SqliteConnection,
    collection: &str,
    id: &str,
) -> Result<Option<Fields>, RemoteError> {
    let row = sqlx::query("SELECT data FROM documents WHERE collection = ? AND id = ?")
        .bind(collection)
        .bind(id)
        .fetch_optional(conn)
        .await?;

    match row {
        Some(row) => {
            let raw: String = row.get("data");
            Ok(Some(decode_fields(id, &raw)))
        }
        None => Ok(None),
    }
}

/// Decode a stored record. A record that is not a JSON object loads with no fields.
fn decode_fields(id: &str, raw: &str) -> Fields {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(fields)) => fields,
        Ok(_) | Err(_) => {
            tracing::warn!(id, "Stored document is not a JSON object");
            Fields::new()
        }
    }
}

async fn load_snapshot(pool: &SqlitePool, query: &Query) -> Result<Vec<Document>, RemoteError> {
    let rows = sqlx::query("SELECT id, data FROM documents WHERE collection = ? ORDER BY id")
        .bind(query.location().collection())
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let id: String = row.get("id");
            let raw: String = row.get("data");
            let fields = decode_fields(&id, &raw);
            Document { id, fields }
        })
        .filter(|doc| query.matches(&doc.fields))
        .collect())
}

async fn run_subscription(
    pool: SqlitePool,
    query: Query,
    tx: mpsc::UnboundedSender<Push>,
    mut revisions: watch::Receiver<u64>,
    poll_interval: Duration,
) {
    let mut last: Option<Vec<Document>> = None;
    let mut failing = false;

    loop {
        match load_snapshot(&pool, &query).await {
            Ok(docs) => {
                if failing || last.as_ref() != Some(&docs) {
                    if tx.send(Push::Snapshot(docs.clone())).is_err() {
                        break;
                    }
                    last = Some(docs);
                    failing = false;
                }
            }
            Err(err) => {
                if !failing {
                    tracing::warn!(?query, "Subscription read failed: {}", err);
                    if tx.send(Push::Failed(err)).is_err() {
                        break;
                    }
                }
                failing = true;
            }
        }

        tokio::select! {
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(poll_interval) => {}
            _ = tx.closed() => break,
        }
    }

    tracing::debug!(?query, "Subscription task stopped");
}

#[async_trait]
impl DocumentService for SqliteDocumentService {
    async fn subscribe(&self, query: Query) -> Result<Feed, RemoteError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let producer = tokio::spawn(run_subscription(
            self.pool.clone(),
            query,
            tx,
            self.revision.subscribe(),
            self.poll_interval,
        ));
        Ok(Feed::with_producer(rx, producer))
    }

    async fn create(&self, location: &Location, fields: Fields) -> Result<String, RemoteError> {
        let id = uuid::Uuid::new_v4().to_string();
        let data = serde_json::to_string(&fields)?;

        sqlx::query("INSERT INTO documents (collection, id, data) VALUES (?, ?, ?)")
            .bind(location.collection())
            .bind(&id)
            .bind(&data)
            .execute(&self.pool)
            .await?;

        self.bump();
        Ok(id)
    }

    async fn update(
        &self,
        location: &Location,
        id: &str,
        fields: Fields,
    ) -> Result<(), RemoteError> {
        let collection = location.collection();

        // Read and write under the write lock so concurrent merges into the
        // same record cannot drop each other's fields.
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let mut existing = load_fields(&mut *tx, &collection, id)
            .await?
            .ok_or_else(|| RemoteError::connection(format!("no document {} in {}", id, collection)))?;
        merge_fields(&mut existing, fields);
        let data = serde_json::to_string(&existing)?;

        sqlx::query("UPDATE documents SET data = ? WHERE collection = ? AND id = ?")
            .bind(&data)
            .bind(&collection)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.bump();
        Ok(())
    }

    async fn delete(&self, location: &Location, id: &str) -> Result<(), RemoteError> {
        sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(location.collection())
            .bind(id)
            .execute(&self.pool)
            .await?;

        self.bump();
        Ok(())
    }
}
