//! Integration tests for the project sync API.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::Config;
use crate::remote::{Location, MemoryDocumentService};
use crate::store::{self, ProjectStore, RemoteProjectStore};
use crate::{create_router, AppState};

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    _temp_dir: TempDir,
}

impl TestFixture {
    /// Server backed by the local store (no remote configured).
    async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = Config::for_tests(temp_dir.path().join("test.sqlite"));
        let store = store::open_store(&config)
            .await
            .expect("Failed to open store");
        Self::serve(store, temp_dir).await
    }

    /// Server backed by the networked store over an in-memory document service.
    async fn remote(service: Arc<MemoryDocumentService>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store: Arc<dyn ProjectStore> = Arc::new(RemoteProjectStore::spawn(
            service,
            Duration::from_millis(200),
        ));
        Self::serve(store, temp_dir).await
    }

    async fn serve(store: Arc<dyn ProjectStore>, temp_dir: TempDir) -> Self {
        let app = create_router(AppState { store });

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        TestFixture {
            client: Client::new(),
            base_url,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn state(&self) -> Value {
        let resp = self
            .client
            .get(self.url("/api/state"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["data"].clone()
    }

    /// Poll `/api/state` until `predicate` holds; remote writes land asynchronously.
    async fn wait_for_state(&self, predicate: impl Fn(&Value) -> bool) -> Value {
        for _ in 0..50 {
            let state = self.state().await;
            if predicate(&state) {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("state never reached the expected shape: {}", self.state().await);
    }

    async fn sign_in(&self, uid: &str) -> Value {
        let resp = self
            .client
            .put(self.url("/api/session"))
            .json(&json!({ "uid": uid, "displayName": "Tester" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["data"].clone()
    }

    async fn create(&self, name: &str) -> Value {
        let resp = self
            .client
            .post(self.url("/api/projects"))
            .json(&json!({ "name": name, "url": "example.com" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["success"], true);
        body["data"].clone()
    }
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_initial_state_is_empty() {
    let fixture = TestFixture::new().await;

    let state = fixture.state().await;
    assert_eq!(state["projects"], json!([]));
    assert_eq!(state["activeProject"], Value::Null);
    assert_eq!(state["activeProjectId"], Value::Null);
    assert_eq!(state["loading"], false);
    assert_eq!(state["error"], Value::Null);
}

#[tokio::test]
async fn test_project_lifecycle() {
    let fixture = TestFixture::new().await;
    fixture.sign_in("alice").await;

    // Create
    let project = fixture.create("Marketing Site").await;
    let id = project["id"].as_str().unwrap().to_string();
    assert_eq!(project["name"], "Marketing Site");
    assert_eq!(project["url"], "example.com");
    assert_eq!(project["origin"], "local");
    assert_eq!(project["ownerId"], "alice");
    assert_eq!(project["members"][0]["role"], "admin");

    let state = fixture.state().await;
    assert_eq!(state["activeProjectId"], id.as_str());
    assert_eq!(state["activeProject"]["id"], id.as_str());

    // Patch opaque fields
    let resp = fixture
        .client
        .patch(fixture.url(&format!("/api/projects/{}", id)))
        .json(&json!({ "scoreHistory": [{ "score": 88 }], "id": "hijack" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Rename
    let resp = fixture
        .client
        .put(fixture.url(&format!("/api/projects/{}/name", id)))
        .json(&json!({ "name": "  Renamed  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Toggle a checklist item on the active project
    let resp = fixture
        .client
        .post(fixture.url("/api/checklist/https/toggle"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let state = fixture.state().await;
    let active = &state["activeProject"];
    assert_eq!(active["id"], id.as_str());
    assert_eq!(active["name"], "Renamed");
    assert_eq!(active["scoreHistory"], json!([{ "score": 88 }]));
    assert_eq!(active["checklist"]["https"], true);
    assert_ne!(active["updatedAt"], project["updatedAt"]);

    // Delete
    let resp = fixture
        .client
        .delete(fixture.url(&format!("/api/projects/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let state = fixture.state().await;
    assert_eq!(state["projects"], json!([]));
    assert_eq!(state["activeProjectId"], Value::Null);
}

#[tokio::test]
async fn test_projects_listed_newest_first() {
    let fixture = TestFixture::new().await;

    let first = fixture.create("First").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = fixture.create("Second").await;

    let state = fixture.state().await;
    assert_eq!(state["projects"][0]["id"], second["id"]);
    assert_eq!(state["projects"][1]["id"], first["id"]);
}

#[tokio::test]
async fn test_set_active_project() {
    let fixture = TestFixture::new().await;
    let first = fixture.create("First").await;
    fixture.create("Second").await;

    let resp = fixture
        .client
        .put(fixture.url("/api/active"))
        .json(&json!({ "id": first["id"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["activeProjectId"], first["id"]);
    assert_eq!(body["data"]["activeProject"]["name"], "First");
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let fixture = TestFixture::new().await;

    fixture.sign_in("alice").await;
    fixture.create("Alice's").await;

    let state = fixture.sign_in("bob").await;
    assert_eq!(state["projects"], json!([]));

    let state = fixture.sign_in("alice").await;
    assert_eq!(state["projects"][0]["name"], "Alice's");

    let resp = fixture
        .client
        .delete(fixture.url("/api/session"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["projects"], json!([]));
}

#[tokio::test]
async fn test_validation_errors() {
    let fixture = TestFixture::new().await;

    // Blank project name
    let resp = fixture
        .client
        .post(fixture.url("/api/projects"))
        .json(&json!({ "name": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    // Blank rename
    let project = fixture.create("Site").await;
    let resp = fixture
        .client
        .put(fixture.url(&format!("/api/projects/{}/name", project["id"].as_str().unwrap())))
        .json(&json!({ "name": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Blank uid
    let resp = fixture
        .client
        .put(fixture.url("/api/session"))
        .json(&json!({ "uid": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    // Patch body must be an object
    let resp = fixture
        .client
        .patch(fixture.url(&format!("/api/projects/{}", project["id"].as_str().unwrap())))
        .json(&json!(["not", "an", "object"]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_not_found_errors() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .put(fixture.url("/api/active"))
        .json(&json!({ "id": "ghost" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    // Writes to unknown projects are accepted and ignored
    let resp = fixture
        .client
        .delete(fixture.url("/api/projects/ghost"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_remote_merges_owner_and_shared_collections() {
    let service = Arc::new(MemoryDocumentService::new());
    let owner = Location::Owner {
        uid: "alice".to_string(),
    };
    let Value::Object(legacy) = json!({ "name": "Legacy", "createdAt": "2023-01-01T00:00:00Z" }) else {
        unreachable!()
    };
    let Value::Object(shared) = json!({
        "name": "Team",
        "memberIds": ["alice", "bob"],
        "createdAt": "2024-01-01T00:00:00Z",
    }) else {
        unreachable!()
    };
    service.insert(&owner, "p-legacy", legacy).await;
    service.insert(&Location::Shared, "p-team", shared).await;

    let fixture = TestFixture::remote(service.clone()).await;

    let state = fixture.state().await;
    assert_eq!(state["loading"], false);
    assert_eq!(state["projects"], json!([]));

    fixture.sign_in("alice").await;
    let state = fixture
        .wait_for_state(|s| s["loading"] == false && s["projects"].as_array().map_or(0, Vec::len) == 2)
        .await;
    assert_eq!(state["projects"][0]["id"], "p-team");
    assert_eq!(state["projects"][0]["origin"], "shared");
    assert_eq!(state["projects"][1]["origin"], "legacy");
    assert_eq!(state["activeProjectId"], "p-team");
    assert_eq!(state["error"], Value::Null);

    // Renaming the shared project writes to the shared collection
    fixture
        .client
        .put(fixture.url("/api/projects/p-team/name"))
        .json(&json!({ "name": "Team (renamed)" }))
        .send()
        .await
        .unwrap();
    fixture
        .wait_for_state(|s| s["projects"][0]["name"] == "Team (renamed)")
        .await;
    let stored = service.get(&Location::Shared, "p-team").await.unwrap();
    assert_eq!(stored["name"], "Team (renamed)");
    assert!(service.get(&owner, "p-team").await.is_none());
}

#[tokio::test]
async fn test_remote_create_lands_in_owner_collection() {
    let service = Arc::new(MemoryDocumentService::new());
    let fixture = TestFixture::remote(service.clone()).await;
    fixture.sign_in("alice").await;
    fixture.wait_for_state(|s| s["loading"] == false).await;

    let project = fixture.create("Fresh").await;
    let id = project["id"].as_str().unwrap().to_string();
    assert_eq!(project["origin"], "legacy");

    let state = fixture
        .wait_for_state(|s| s["activeProject"]["id"] == id.as_str())
        .await;
    assert_eq!(state["activeProject"]["name"], "Fresh");

    let owner = Location::Owner {
        uid: "alice".to_string(),
    };
    assert!(service.get(&owner, &id).await.is_some());
}

#[tokio::test]
async fn test_remote_permission_error_is_surfaced() {
    let service = Arc::new(MemoryDocumentService::new());
    service.deny(&Location::Shared).await;
    let fixture = TestFixture::remote(service).await;

    fixture.sign_in("alice").await;
    let state = fixture.wait_for_state(|s| s["loading"] == false).await;
    assert_eq!(state["error"], "permission");
    assert_eq!(state["projects"], json!([]));
}
