//! Edit-session types and the in-memory session registry.
//!
//! The registry is the authoritative view of live sessions. The id map and
//! the active-canvas index sit behind one lock, so the conflict check plus
//! insert, and every status compare-and-set, are single atomic steps. This
//! is where the one-active-session-per-canvas invariant is enforced.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use easel_core::error::{Error, Result};

/// Status of an edit session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditSessionStatus {
    /// Session is open and holds the canvas's edit lock
    Active,
    /// Session timed out waiting for activity
    Expired,
    /// Session committed its content
    Saved,
    /// Session was abandoned by the editor
    Cancelled,
}

impl EditSessionStatus {
    /// Database/string form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Saved => "saved",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the database form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "expired" => Some(Self::Expired),
            "saved" => Some(Self::Saved),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Terminal states admit no further transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl std::fmt::Display for EditSessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single edit session over a canvas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditSession {
    /// Unique session identifier
    pub id: Uuid,

    /// Canvas being edited
    pub canvas_id: Uuid,

    /// Editing user
    pub user_id: String,

    /// Current status
    pub status: EditSessionStatus,

    /// When editing began
    pub started_at: DateTime<Utc>,

    /// Last recorded editor activity
    pub last_activity_at: DateTime<Utc>,

    /// When the session expires absent further activity
    pub expires_at: DateTime<Utc>,

    /// Inactivity timeout, in minutes
    pub timeout_minutes: i64,

    /// Uncommitted draft text awaiting the next autosave; held in memory
    /// only and discarded on cancel or expiry
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub draft_content: Option<String>,
}

impl EditSession {
    /// Open a new active session.
    #[must_use]
    pub fn new(canvas_id: Uuid, user_id: impl Into<String>, timeout_minutes: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            canvas_id,
            user_id: user_id.into(),
            status: EditSessionStatus::Active,
            started_at: now,
            last_activity_at: now,
            expires_at: now + Duration::minutes(timeout_minutes),
            timeout_minutes,
            draft_content: None,
        }
    }

    /// Record activity: refresh `last_activity_at` and push `expires_at` out
    /// by the session's timeout.
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.last_activity_at = now;
        self.expires_at = now + Duration::minutes(self.timeout_minutes);
    }

    /// Whether `expires_at` has passed as of `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Default)]
struct StoreInner {
    sessions: HashMap<Uuid, EditSession>,
    /// Canvas id -> session id, Active sessions only; at most one entry per canvas
    active_by_canvas: HashMap<Uuid, Uuid>,
}

/// In-memory registry of edit sessions with an active-canvas index.
#[derive(Default)]
pub struct SessionStore {
    inner: RwLock<StoreInner>,
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new Active session, enforcing one active session per canvas.
    ///
    /// The conflict check and the insert happen under one write lock; no
    /// other insert for the same canvas can interleave.
    pub async fn insert_active(&self, session: EditSession) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(holder) = inner.active_by_canvas.get(&session.canvas_id) {
            let held_by = inner
                .sessions
                .get(holder)
                .map(|s| s.user_id.clone())
                .unwrap_or_default();
            return Err(Error::SessionConflict {
                canvas_id: session.canvas_id,
                held_by,
            });
        }
        inner.active_by_canvas.insert(session.canvas_id, session.id);
        inner.sessions.insert(session.id, session);
        Ok(())
    }

    /// Fetch a session snapshot.
    pub async fn get(&self, id: Uuid) -> Option<EditSession> {
        self.inner.read().await.sessions.get(&id).cloned()
    }

    /// The Active session on a canvas, if any.
    pub async fn active_for_canvas(&self, canvas_id: Uuid) -> Option<EditSession> {
        let inner = self.inner.read().await;
        inner
            .active_by_canvas
            .get(&canvas_id)
            .and_then(|id| inner.sessions.get(id))
            .cloned()
    }

    /// Mutate an Active session in place (activity refresh, draft update).
    ///
    /// Fails for unknown or terminal sessions; returns the updated snapshot.
    pub async fn update<F>(&self, id: Uuid, f: F) -> Result<EditSession>
    where
        F: FnOnce(&mut EditSession),
    {
        let mut inner = self.inner.write().await;
        let session = inner.sessions.get_mut(&id).ok_or(Error::SessionNotFound(id))?;
        if session.status.is_terminal() {
            return Err(Error::SessionAlreadyTerminal(id));
        }
        f(session);
        Ok(session.clone())
    }

    /// Compare-and-set transition out of Active into a terminal state.
    ///
    /// Exactly one caller can win any given transition; every later attempt
    /// sees `SessionAlreadyTerminal`. Winning discards the draft and releases
    /// the canvas's active-index entry.
    pub async fn transition(&self, id: Uuid, to: EditSessionStatus) -> Result<EditSession> {
        debug_assert!(to.is_terminal());
        let mut inner = self.inner.write().await;
        let session = inner.sessions.get_mut(&id).ok_or(Error::SessionNotFound(id))?;
        if session.status.is_terminal() {
            return Err(Error::SessionAlreadyTerminal(id));
        }
        session.status = to;
        session.draft_content = None;
        let snapshot = session.clone();
        inner.active_by_canvas.remove(&snapshot.canvas_id);
        Ok(snapshot)
    }

    /// Drop a session entirely (rollback of a failed start).
    pub async fn remove(&self, id: Uuid) -> Option<EditSession> {
        let mut inner = self.inner.write().await;
        let session = inner.sessions.remove(&id)?;
        if inner.active_by_canvas.get(&session.canvas_id) == Some(&id) {
            inner.active_by_canvas.remove(&session.canvas_id);
        }
        Some(session)
    }

    /// Discard terminal sessions whose last activity is older than
    /// `retention`. Returns how many were discarded.
    pub async fn prune_terminal(&self, retention: Duration) -> usize {
        let cutoff = Utc::now() - retention;
        let mut inner = self.inner.write().await;
        let before = inner.sessions.len();
        inner
            .sessions
            .retain(|_, s| !(s.status.is_terminal() && s.last_activity_at < cutoff));
        before - inner.sessions.len()
    }

    /// Number of tracked sessions, terminal ones included.
    pub async fn len(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    /// Whether the store tracks no sessions at all.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.sessions.is_empty()
    }

    /// Number of Active sessions.
    pub async fn active_len(&self) -> usize {
        self.inner.read().await.active_by_canvas.len()
    }
}
