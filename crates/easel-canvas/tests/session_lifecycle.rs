//! End-to-end lifecycle flows over a real (in-memory) SQLite backend.

use std::sync::Arc;

use easel_canvas::{
    CanvasDraft, CanvasRepository, EditSession, EditSessionStatus, SessionManager, SqliteStorage,
    Storage,
};
use easel_core::config::CanvasConfig;
use easel_core::error::Error;
use easel_core::event_bus::EventBus;

struct App {
    storage: Arc<SqliteStorage>,
    repository: CanvasRepository,
    manager: SessionManager,
}

async fn app() -> App {
    let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
    let config = CanvasConfig::default();
    let repository = CanvasRepository::new(storage.clone(), config.clone());
    let manager = SessionManager::new(
        storage.clone(),
        repository.clone(),
        EventBus::default(),
        config,
    );
    App {
        storage,
        repository,
        manager,
    }
}

fn draft(title: &str, content: &str, created_by: &str) -> CanvasDraft {
    CanvasDraft {
        title: title.to_string(),
        content: content.to_string(),
        created_by: created_by.to_string(),
    }
}

#[tokio::test]
async fn start_edit_commit_persists_canvas_and_session() {
    let app = app().await;
    let canvas = app
        .repository
        .create(draft("Sprint Notes", "initial", "alice"))
        .await
        .unwrap();

    let session = app
        .manager
        .start_session(canvas.id, "bob", 10)
        .await
        .unwrap();
    app.manager
        .update_draft(session.id, "halfway there")
        .await
        .unwrap();
    let committed = app
        .manager
        .commit(session.id, "final text", Some("Sprint Notes v2".to_string()))
        .await
        .unwrap();
    assert_eq!(committed.title, "Sprint Notes v2");

    // durable canvas row carries the edit and both author fields
    let stored = app.repository.get(canvas.id).await.unwrap();
    assert_eq!(stored.content, "final text");
    assert_eq!(stored.created_by, "alice");
    assert_eq!(stored.last_edited_by.as_deref(), Some("bob"));

    // durable session row reached its terminal status
    let row = app.storage.fetch_session(session.id).await.unwrap().unwrap();
    assert_eq!(row.status, EditSessionStatus::Saved);

    // the canvas lock is free again
    app.manager
        .start_session(canvas.id, "carol", 10)
        .await
        .unwrap();
}

#[tokio::test]
async fn concurrent_editors_are_rejected_until_cancel() {
    let app = app().await;
    let canvas = app
        .repository
        .create(draft("Shared Doc", "content", "alice"))
        .await
        .unwrap();

    let session = app
        .manager
        .start_session(canvas.id, "alice", 10)
        .await
        .unwrap();
    let err = app
        .manager
        .start_session(canvas.id, "bob", 10)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SessionConflict { held_by, .. } if held_by == "alice"));

    app.manager.cancel(session.id).await.unwrap();

    // cancellation discarded the draft; the canvas is untouched
    let stored = app.repository.get(canvas.id).await.unwrap();
    assert_eq!(stored.content, "content");
    let row = app.storage.fetch_session(session.id).await.unwrap().unwrap();
    assert_eq!(row.status, EditSessionStatus::Cancelled);

    app.manager
        .start_session(canvas.id, "bob", 10)
        .await
        .unwrap();
}

#[tokio::test]
async fn startup_sweep_expires_orphaned_rows() {
    let app = app().await;
    let canvas = app
        .repository
        .create(draft("Orphans", "content", "alice"))
        .await
        .unwrap();

    // simulate a session left behind by a crashed process
    let orphan = EditSession::new(canvas.id, "alice", 10);
    app.storage.insert_session(&orphan).await.unwrap();

    let swept = app.storage.expire_stale_sessions().await.unwrap();
    assert_eq!(swept, 1);
    let row = app.storage.fetch_session(orphan.id).await.unwrap().unwrap();
    assert_eq!(row.status, EditSessionStatus::Expired);
}

#[tokio::test]
async fn deleting_a_canvas_cascades_to_its_sessions() {
    let app = app().await;
    let canvas = app
        .repository
        .create(draft("Doomed", "content", "alice"))
        .await
        .unwrap();
    let session = app
        .manager
        .start_session(canvas.id, "alice", 10)
        .await
        .unwrap();
    app.manager.commit(session.id, "kept", None).await.unwrap();

    app.repository.delete(canvas.id).await.unwrap();
    assert!(app.storage.fetch_session(session.id).await.unwrap().is_none());
}

#[tokio::test]
async fn search_and_listing_surface_committed_edits() {
    let app = app().await;
    let canvas = app
        .repository
        .create(draft("Plans", "nothing yet", "alice"))
        .await
        .unwrap();
    app.repository
        .create(draft("Other", "unrelated", "bob"))
        .await
        .unwrap();

    let session = app
        .manager
        .start_session(canvas.id, "alice", 10)
        .await
        .unwrap();
    app.manager
        .commit(session.id, "ship the beta in october", None)
        .await
        .unwrap();

    let hits = app.repository.search("beta", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, canvas.id);

    // the committed canvas floats to the top of the listing
    let page = app.repository.list(10, 0).await.unwrap();
    assert_eq!(page.items[0].id, canvas.id);
    assert!(!page.has_more);

    let alices = app.repository.by_user("alice", 10).await.unwrap();
    assert_eq!(alices.len(), 1);
}
