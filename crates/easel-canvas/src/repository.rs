//! Validated canvas data access.
//!
//! Thin layer over [`Storage`]: payloads are validated before any storage
//! call, missing records map to `CanvasNotFound`, and every edit stamps the
//! last-editor fields. Session state is never touched here; that belongs to
//! the session manager.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use easel_core::config::CanvasConfig;
use easel_core::error::{Error, Result};
use easel_core::validation::validate_canvas_fields;

use crate::canvas::{Canvas, CanvasDraft, CanvasPatch, Page};
use crate::storage::Storage;

/// Canvas repository.
#[derive(Clone)]
pub struct CanvasRepository {
    storage: Arc<dyn Storage>,
    config: CanvasConfig,
}

impl CanvasRepository {
    /// Create a repository over a storage backend.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, config: CanvasConfig) -> Self {
        Self { storage, config }
    }

    /// Create a canvas after validating its title and content.
    pub async fn create(&self, draft: CanvasDraft) -> Result<Canvas> {
        let violations = validate_canvas_fields(
            Some(&draft.title),
            Some(&draft.content),
            self.config.max_content_length,
        );
        if !violations.is_empty() {
            return Err(Error::validation(violations));
        }

        let canvas = Canvas::new(draft);
        self.storage.insert_canvas(&canvas).await?;
        debug!(canvas_id = %canvas.id, created_by = %canvas.created_by, "canvas created");
        Ok(canvas)
    }

    /// Fetch a canvas by id.
    pub async fn get(&self, id: Uuid) -> Result<Canvas> {
        self.storage
            .fetch_canvas(id)
            .await?
            .ok_or(Error::CanvasNotFound(id))
    }

    /// Apply a validated edit and persist the full record.
    pub async fn update(&self, id: Uuid, patch: CanvasPatch) -> Result<Canvas> {
        let violations = validate_canvas_fields(
            patch.title.as_deref(),
            patch.content.as_deref(),
            self.config.max_content_length,
        );
        if !violations.is_empty() {
            return Err(Error::validation(violations));
        }

        let mut canvas = self.get(id).await?;
        canvas.apply(patch);
        // deleted out from under us between the fetch and the write
        if !self.storage.update_canvas(&canvas).await? {
            return Err(Error::CanvasNotFound(id));
        }
        debug!(canvas_id = %id, "canvas updated");
        Ok(canvas)
    }

    /// Delete a canvas; its session rows cascade away with it.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if self.storage.delete_canvas(id).await? {
            debug!(canvas_id = %id, "canvas deleted");
            Ok(())
        } else {
            Err(Error::CanvasNotFound(id))
        }
    }

    /// Page through canvases, most recently updated first.
    pub async fn list(&self, limit: u32, offset: u32) -> Result<Page<Canvas>> {
        // fetch one extra row to learn whether another page exists
        let mut items = self
            .storage
            .list_canvases(limit.saturating_add(1), offset)
            .await?;
        let has_more = items.len() as u64 > u64::from(limit);
        items.truncate(limit as usize);
        Ok(Page { items, has_more })
    }

    /// Case-insensitive substring search over titles and content.
    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<Canvas>> {
        self.storage.search_canvases(query, limit).await
    }

    /// Canvases created by a user, most recently updated first.
    pub async fn by_user(&self, user_id: &str, limit: u32) -> Result<Vec<Canvas>> {
        self.storage.canvases_by_user(user_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, MockStorage};

    fn repository() -> CanvasRepository {
        CanvasRepository::new(Arc::new(MemoryStorage::new()), CanvasConfig::default())
    }

    fn draft(title: &str, content: &str) -> CanvasDraft {
        CanvasDraft {
            title: title.to_string(),
            content: content.to_string(),
            created_by: "alice".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_rejects_short_title() {
        let repo = repository();
        let err = repo.create(draft("ab", "content")).await.unwrap_err();
        match err {
            Error::ValidationFailed { violations } => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].field, "title");
            }
            other => panic!("expected validation failure, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_create_collects_every_violation() {
        let repo = repository();
        let err = repo.create(draft("ab", "")).await.unwrap_err();
        match err {
            Error::ValidationFailed { violations } => assert_eq!(violations.len(), 2),
            other => panic!("expected validation failure, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = repository();
        let created = repo.create(draft("Notes", "hello")).await.unwrap();
        let fetched = repo.get(created.id).await.unwrap();
        assert_eq!(fetched.title, "Notes");
    }

    #[tokio::test]
    async fn test_get_missing_is_canvas_not_found() {
        let repo = repository();
        let err = repo.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::CanvasNotFound(_)));
    }

    #[tokio::test]
    async fn test_update_validates_before_storage() {
        let repo = repository();
        let canvas = repo.create(draft("Notes", "hello")).await.unwrap();

        let err = repo
            .update(
                canvas.id,
                CanvasPatch {
                    title: Some("ab".to_string()),
                    content: None,
                    edited_by: "bob".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ValidationFailed { .. }));

        // nothing was written
        let unchanged = repo.get(canvas.id).await.unwrap();
        assert_eq!(unchanged.title, "Notes");
        assert!(unchanged.last_edited_by.is_none());
    }

    #[tokio::test]
    async fn test_update_stamps_last_editor() {
        let repo = repository();
        let canvas = repo.create(draft("Notes", "hello")).await.unwrap();

        let updated = repo
            .update(
                canvas.id,
                CanvasPatch {
                    title: None,
                    content: Some("hello world".to_string()),
                    edited_by: "bob".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.content, "hello world");
        assert_eq!(updated.created_by, "alice");
        assert_eq!(updated.last_edited_by.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_delete_then_get_fails() {
        let repo = repository();
        let canvas = repo.create(draft("Notes", "hello")).await.unwrap();
        repo.delete(canvas.id).await.unwrap();
        assert!(matches!(
            repo.get(canvas.id).await.unwrap_err(),
            Error::CanvasNotFound(_)
        ));
        assert!(matches!(
            repo.delete(canvas.id).await.unwrap_err(),
            Error::CanvasNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_backend_failures_surface_as_storage_unavailable() {
        let mut storage = MockStorage::new();
        storage
            .expect_fetch_canvas()
            .returning(|_| Err(Error::storage("backend down")));

        let repo = CanvasRepository::new(Arc::new(storage), CanvasConfig::default());
        let err = repo.get(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code(), "storage_unavailable");
    }

    #[tokio::test]
    async fn test_list_reports_has_more() {
        let repo = repository();
        for i in 0..3 {
            repo.create(draft(&format!("Canvas {i}"), "content"))
                .await
                .unwrap();
        }

        let page = repo.list(2, 0).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.has_more);

        let rest = repo.list(2, 2).await.unwrap();
        assert_eq!(rest.items.len(), 1);
        assert!(!rest.has_more);
    }
}
