//! Durable storage for canvases and edit sessions.
//!
//! [`Storage`] is the boundary the repository and session manager write
//! through. A backend is constructed once at startup and injected; nothing
//! here is a global. `SqliteStorage` is the production backend;
//! `MemoryStorage` backs tests and ephemeral runs.
//!
//! Not-found is `Ok(None)`/`Ok(false)` at this layer, never an error;
//! backend failures surface as `StorageUnavailable`. Session rows persist
//! scheduling metadata only; draft text lives in memory until it is
//! autosaved or committed into the canvas row.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use easel_core::error::{Error, Result};

use crate::canvas::Canvas;
use crate::session::{EditSession, EditSessionStatus};

/// Storage boundary for canvases and edit sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert a new canvas record.
    async fn insert_canvas(&self, canvas: &Canvas) -> Result<()>;

    /// Fetch a canvas by id.
    async fn fetch_canvas(&self, id: Uuid) -> Result<Option<Canvas>>;

    /// Overwrite an existing canvas record. Returns false for unknown ids.
    async fn update_canvas(&self, canvas: &Canvas) -> Result<bool>;

    /// Delete a canvas; its session rows cascade away with it. Returns false
    /// for unknown ids.
    async fn delete_canvas(&self, id: Uuid) -> Result<bool>;

    /// List canvases ordered by `updated_at` descending.
    async fn list_canvases(&self, limit: u32, offset: u32) -> Result<Vec<Canvas>>;

    /// Canvases whose title or content contains `query` (case-insensitive
    /// substring), most recently updated first.
    async fn search_canvases(&self, query: &str, limit: u32) -> Result<Vec<Canvas>>;

    /// Canvases created by `user_id`, most recently updated first.
    async fn canvases_by_user(&self, user_id: &str, limit: u32) -> Result<Vec<Canvas>>;

    /// Insert a new edit-session record.
    async fn insert_session(&self, session: &EditSession) -> Result<()>;

    /// Overwrite an edit session's status and activity timestamps. Returns
    /// false for unknown ids.
    async fn update_session(&self, session: &EditSession) -> Result<bool>;

    /// Fetch an edit session by id.
    async fn fetch_session(&self, id: Uuid) -> Result<Option<EditSession>>;

    /// Mark every `active` session row `expired` (crash-recovery sweep for
    /// sessions whose timers died with a previous process). Returns how many
    /// rows changed.
    async fn expire_stale_sessions(&self) -> Result<u64>;
}

fn db_err(e: sqlx::Error) -> Error {
    Error::storage(e.to_string())
}

// ---------------------------------------------------------------------------
// SQLite backend
// ---------------------------------------------------------------------------

const SCHEMA: [&str; 7] = [
    "CREATE TABLE IF NOT EXISTS canvases (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        created_by TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        last_edited_by TEXT,
        last_edited_at TEXT
    )",
    "CREATE TABLE IF NOT EXISTS edit_sessions (
        id TEXT PRIMARY KEY,
        canvas_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        status TEXT NOT NULL,
        started_at TEXT NOT NULL,
        last_activity_at TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        FOREIGN KEY (canvas_id) REFERENCES canvases (id) ON DELETE CASCADE
    )",
    "CREATE INDEX IF NOT EXISTS idx_canvases_created_by ON canvases (created_by)",
    "CREATE INDEX IF NOT EXISTS idx_canvases_updated_at ON canvases (updated_at)",
    "CREATE INDEX IF NOT EXISTS idx_edit_sessions_canvas_id ON edit_sessions (canvas_id)",
    "CREATE INDEX IF NOT EXISTS idx_edit_sessions_user_id ON edit_sessions (user_id)",
    "CREATE INDEX IF NOT EXISTS idx_edit_sessions_status ON edit_sessions (status)",
];

/// SQLite-backed storage.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) the database at `path` and initialize the schema.
    pub async fn from_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::storage(format!("mkdir {}: {e}", parent.display())))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let storage = Self { pool };
        storage.init().await?;
        info!("canvas store initialized at {}", path.display());
        Ok(storage)
    }

    /// In-memory database (tests, ephemeral runs).
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await
            .map_err(db_err)?;

        let storage = Self { pool };
        storage.init().await?;
        debug!("in-memory canvas store initialized");
        Ok(storage)
    }

    /// Create tables and indexes if they do not exist.
    async fn init(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::storage(format!("corrupt timestamp {raw:?}: {e}")))
}

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::storage(format!("corrupt id {raw:?}: {e}")))
}

fn canvas_from_row(row: &SqliteRow) -> Result<Canvas> {
    let last_edited_at: Option<String> = row.get("last_edited_at");
    Ok(Canvas {
        id: parse_id(&row.get::<String, _>("id"))?,
        title: row.get("title"),
        content: row.get("content"),
        created_by: row.get("created_by"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
        last_edited_by: row.get("last_edited_by"),
        last_edited_at: last_edited_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

fn session_from_row(row: &SqliteRow) -> Result<EditSession> {
    let status_raw: String = row.get("status");
    let status = EditSessionStatus::parse(&status_raw)
        .ok_or_else(|| Error::storage(format!("corrupt session status {status_raw:?}")))?;
    let last_activity_at = parse_timestamp(&row.get::<String, _>("last_activity_at"))?;
    let expires_at = parse_timestamp(&row.get::<String, _>("expires_at"))?;
    Ok(EditSession {
        id: parse_id(&row.get::<String, _>("id"))?,
        canvas_id: parse_id(&row.get::<String, _>("canvas_id"))?,
        user_id: row.get("user_id"),
        status,
        started_at: parse_timestamp(&row.get::<String, _>("started_at"))?,
        last_activity_at,
        expires_at,
        // not a column; the window is implied by the two timestamps
        timeout_minutes: (expires_at - last_activity_at).num_minutes().max(1),
        draft_content: None,
    })
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn insert_canvas(&self, canvas: &Canvas) -> Result<()> {
        sqlx::query(
            "INSERT INTO canvases
             (id, title, content, created_by, created_at, updated_at, last_edited_by, last_edited_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(canvas.id.to_string())
        .bind(&canvas.title)
        .bind(&canvas.content)
        .bind(&canvas.created_by)
        .bind(canvas.created_at.to_rfc3339())
        .bind(canvas.updated_at.to_rfc3339())
        .bind(canvas.last_edited_by.as_deref())
        .bind(canvas.last_edited_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn fetch_canvas(&self, id: Uuid) -> Result<Option<Canvas>> {
        let row = sqlx::query("SELECT * FROM canvases WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(canvas_from_row).transpose()
    }

    async fn update_canvas(&self, canvas: &Canvas) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE canvases
             SET title = ?, content = ?, updated_at = ?, last_edited_by = ?, last_edited_at = ?
             WHERE id = ?",
        )
        .bind(&canvas.title)
        .bind(&canvas.content)
        .bind(canvas.updated_at.to_rfc3339())
        .bind(canvas.last_edited_by.as_deref())
        .bind(canvas.last_edited_at.map(|t| t.to_rfc3339()))
        .bind(canvas.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_canvas(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM canvases WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_canvases(&self, limit: u32, offset: u32) -> Result<Vec<Canvas>> {
        let rows = sqlx::query(
            "SELECT * FROM canvases ORDER BY updated_at DESC LIMIT ? OFFSET ?",
        )
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(canvas_from_row).collect()
    }

    async fn search_canvases(&self, query: &str, limit: u32) -> Result<Vec<Canvas>> {
        let pattern = format!("%{query}%");
        let rows = sqlx::query(
            "SELECT * FROM canvases
             WHERE title LIKE ? OR content LIKE ?
             ORDER BY updated_at DESC LIMIT ?",
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(canvas_from_row).collect()
    }

    async fn canvases_by_user(&self, user_id: &str, limit: u32) -> Result<Vec<Canvas>> {
        let rows = sqlx::query(
            "SELECT * FROM canvases WHERE created_by = ? ORDER BY updated_at DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(canvas_from_row).collect()
    }

    async fn insert_session(&self, session: &EditSession) -> Result<()> {
        sqlx::query(
            "INSERT INTO edit_sessions
             (id, canvas_id, user_id, status, started_at, last_activity_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session.id.to_string())
        .bind(session.canvas_id.to_string())
        .bind(&session.user_id)
        .bind(session.status.as_str())
        .bind(session.started_at.to_rfc3339())
        .bind(session.last_activity_at.to_rfc3339())
        .bind(session.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_session(&self, session: &EditSession) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE edit_sessions
             SET status = ?, last_activity_at = ?, expires_at = ?
             WHERE id = ?",
        )
        .bind(session.status.as_str())
        .bind(session.last_activity_at.to_rfc3339())
        .bind(session.expires_at.to_rfc3339())
        .bind(session.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn fetch_session(&self, id: Uuid) -> Result<Option<EditSession>> {
        let row = sqlx::query("SELECT * FROM edit_sessions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn expire_stale_sessions(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE edit_sessions SET status = 'expired' WHERE status = 'active'",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryInner {
    canvases: HashMap<Uuid, Canvas>,
    sessions: HashMap<Uuid, EditSession>,
}

/// In-memory storage for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryStorage {
    /// Create an empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_by_update(mut canvases: Vec<Canvas>) -> Vec<Canvas> {
    canvases.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    canvases
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn insert_canvas(&self, canvas: &Canvas) -> Result<()> {
        self.inner
            .write()
            .await
            .canvases
            .insert(canvas.id, canvas.clone());
        Ok(())
    }

    async fn fetch_canvas(&self, id: Uuid) -> Result<Option<Canvas>> {
        Ok(self.inner.read().await.canvases.get(&id).cloned())
    }

    async fn update_canvas(&self, canvas: &Canvas) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.canvases.get_mut(&canvas.id) {
            Some(existing) => {
                *existing = canvas.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_canvas(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let removed = inner.canvases.remove(&id).is_some();
        if removed {
            inner.sessions.retain(|_, s| s.canvas_id != id);
        }
        Ok(removed)
    }

    async fn list_canvases(&self, limit: u32, offset: u32) -> Result<Vec<Canvas>> {
        let canvases = self.inner.read().await.canvases.values().cloned().collect();
        Ok(sorted_by_update(canvases)
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn search_canvases(&self, query: &str, limit: u32) -> Result<Vec<Canvas>> {
        let needle = query.to_lowercase();
        let canvases = self
            .inner
            .read()
            .await
            .canvases
            .values()
            .filter(|c| {
                c.title.to_lowercase().contains(&needle)
                    || c.content.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        Ok(sorted_by_update(canvases)
            .into_iter()
            .take(limit as usize)
            .collect())
    }

    async fn canvases_by_user(&self, user_id: &str, limit: u32) -> Result<Vec<Canvas>> {
        let canvases = self
            .inner
            .read()
            .await
            .canvases
            .values()
            .filter(|c| c.created_by == user_id)
            .cloned()
            .collect();
        Ok(sorted_by_update(canvases)
            .into_iter()
            .take(limit as usize)
            .collect())
    }

    async fn insert_session(&self, session: &EditSession) -> Result<()> {
        self.inner
            .write()
            .await
            .sessions
            .insert(session.id, session.clone());
        Ok(())
    }

    async fn update_session(&self, session: &EditSession) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.sessions.get_mut(&session.id) {
            Some(existing) => {
                *existing = session.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn fetch_session(&self, id: Uuid) -> Result<Option<EditSession>> {
        Ok(self.inner.read().await.sessions.get(&id).cloned())
    }

    async fn expire_stale_sessions(&self) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let mut swept = 0;
        for session in inner.sessions.values_mut() {
            if session.status == EditSessionStatus::Active {
                session.status = EditSessionStatus::Expired;
                swept += 1;
            }
        }
        Ok(swept)
    }
}
