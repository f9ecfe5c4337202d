//! Session lifecycle management.
//!
//! [`SessionManager`] owns every edit session: it arbitrates exclusive access
//! per canvas, schedules expiry and autosave timers, writes drafts and
//! commits through the canvas repository, mirrors session records into
//! durable storage, and announces lifecycle edges on the event bus.
//!
//! Every state transition on a session, user-driven or timer-driven, runs
//! under that session's serialization lock, so a timer firing and a user
//! action arriving at the same moment cannot both win; the registry's
//! compare-and-set is the final arbiter. Sessions on different canvases share
//! no lock. The registry lock is never held across a storage call; durable
//! writes happen with only the per-session lock held.
//!
//! Timer tasks capture a session id (expiry timers also carry a generation
//! counter) and re-fetch current state when they fire. Rescheduling aborts
//! the previous timer task and bumps the generation, so a timer that already
//! woke up but has not yet run is discarded by the generation check.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use easel_core::config::CanvasConfig;
use easel_core::error::{Error, Result};
use easel_core::event_bus::{CanvasEvent, EventBus, SessionEndReason};
use easel_core::validation::validate_canvas_fields;

use crate::canvas::{Canvas, CanvasPatch};
use crate::repository::CanvasRepository;
use crate::session::{EditSession, EditSessionStatus, SessionStore};
use crate::storage::Storage;

/// Timers armed for one active session.
struct SessionTimers {
    /// Expiry generation; bumped on every reschedule
    epoch: u64,
    expiry: JoinHandle<()>,
    autosave: JoinHandle<()>,
}

struct Inner {
    sessions: SessionStore,
    storage: Arc<dyn Storage>,
    repository: CanvasRepository,
    events: EventBus,
    config: CanvasConfig,
    timers: Mutex<HashMap<Uuid, SessionTimers>>,
    /// Per-session serialization locks, created on demand
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

/// Edit-session lifecycle manager. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Create a manager over a storage backend, repository, and event bus.
    #[must_use]
    pub fn new(
        storage: Arc<dyn Storage>,
        repository: CanvasRepository,
        events: EventBus,
        config: CanvasConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: SessionStore::new(),
                storage,
                repository,
                events,
                config,
                timers: Mutex::new(HashMap::new()),
                locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Open an exclusive edit session on a canvas.
    ///
    /// Fails with `SessionConflict` while any session on the canvas is
    /// active, regardless of which user asks: editing is exclusive, not
    /// merged. On success the expiry and autosave timers are armed and a
    /// `SessionStarted` event goes out.
    pub async fn start_session(
        &self,
        canvas_id: Uuid,
        user_id: impl Into<String>,
        timeout_minutes: i64,
    ) -> Result<EditSession> {
        if timeout_minutes <= 0 {
            return Err(Error::invalid_config("timeout_minutes", "must be positive"));
        }
        let user_id = user_id.into();

        // sessions reference canvases by foreign key; fail fast here rather
        // than at the first autosave write
        self.inner.repository.get(canvas_id).await?;

        let session = EditSession::new(canvas_id, user_id.clone(), timeout_minutes);
        let session_id = session.id;
        self.inner.sessions.insert_active(session.clone()).await?;

        if let Err(e) = self.inner.storage.insert_session(&session).await {
            // no durable record, no session: release the canvas lock again
            self.inner.sessions.remove(session_id).await;
            return Err(e);
        }

        self.arm_timers(&session).await;
        self.inner.events.publish(CanvasEvent::SessionStarted {
            session_id,
            canvas_id,
            user_id,
            timestamp: Utc::now(),
        });
        info!(%session_id, %canvas_id, timeout_minutes, "edit session started");
        Ok(session)
    }

    /// Record editor activity, pushing the expiry deadline out.
    pub async fn record_activity(&self, session_id: Uuid) -> Result<()> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;
        self.touch_session(session_id, None).await.map(|_| ())
    }

    /// Stage draft content for the next autosave. Counts as activity.
    pub async fn update_draft(&self, session_id: Uuid, content: impl Into<String>) -> Result<()> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;
        self.touch_session(session_id, Some(content.into()))
            .await
            .map(|_| ())
    }

    /// Shared body of activity updates; the caller holds the session lock.
    async fn touch_session(&self, session_id: Uuid, draft: Option<String>) -> Result<EditSession> {
        let session = self
            .inner
            .sessions
            .update(session_id, |s| {
                s.touch();
                if let Some(draft) = draft {
                    s.draft_content = Some(draft);
                }
            })
            .await?;

        self.reschedule_expiry(&session).await;

        // activity is recoverable; a failed mirror write heals on the next one
        if let Err(e) = self.inner.storage.update_session(&session).await {
            warn!(%session_id, error = %e, "failed to persist session activity");
        }
        Ok(session)
    }

    /// Write the staged draft through to the canvas without ending the
    /// session.
    ///
    /// Timer-driven, and callable directly to force a save point. A session
    /// with no staged draft is a no-op. Failures leave the session active;
    /// the autosave loop logs them and the next tick retries.
    pub async fn auto_save(&self, session_id: Uuid) -> Result<()> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let session = self
            .inner
            .sessions
            .get(session_id)
            .await
            .ok_or(Error::SessionNotFound(session_id))?;
        if session.status.is_terminal() {
            return Err(Error::SessionAlreadyTerminal(session_id));
        }
        let Some(draft) = session.draft_content else {
            debug!(%session_id, "autosave skipped, no draft staged");
            return Ok(());
        };

        let patch = CanvasPatch {
            title: None,
            content: Some(draft),
            edited_by: session.user_id.clone(),
        };
        self.inner.repository.update(session.canvas_id, patch).await?;

        // the draft is on the canvas now; don't rewrite it every tick
        let _ = self
            .inner
            .sessions
            .update(session_id, |s| s.draft_content = None)
            .await;

        self.inner.events.publish(CanvasEvent::CanvasUpdated {
            canvas_id: session.canvas_id,
            user_id: session.user_id,
            timestamp: Utc::now(),
        });
        debug!(%session_id, canvas_id = %session.canvas_id, "draft autosaved");
        Ok(())
    }

    /// Commit final content (and optionally a new title), ending the session.
    ///
    /// Validation runs before anything durable happens. A storage failure
    /// leaves the session active with its timers armed, so the commit can be
    /// retried; data loss is never silent.
    pub async fn commit(
        &self,
        session_id: Uuid,
        content: impl Into<String>,
        title: Option<String>,
    ) -> Result<Canvas> {
        let content = content.into();
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let session = self
            .inner
            .sessions
            .get(session_id)
            .await
            .ok_or(Error::SessionNotFound(session_id))?;
        if session.status.is_terminal() {
            return Err(Error::SessionAlreadyTerminal(session_id));
        }

        let violations = validate_canvas_fields(
            title.as_deref(),
            Some(&content),
            self.inner.config.max_content_length,
        );
        if !violations.is_empty() {
            return Err(Error::validation(violations));
        }

        let patch = CanvasPatch {
            title,
            content: Some(content),
            edited_by: session.user_id.clone(),
        };
        // session stays active (timers and all) if this write fails
        let canvas = self.inner.repository.update(session.canvas_id, patch).await?;

        // finalize; a session terminalized while the write was in flight
        // loses here and the caller sees a conflict
        let session = self
            .inner
            .sessions
            .transition(session_id, EditSessionStatus::Saved)
            .await?;

        self.inner.events.publish(CanvasEvent::CanvasUpdated {
            canvas_id: canvas.id,
            user_id: session.user_id.clone(),
            timestamp: Utc::now(),
        });
        self.finish_session(&session, SessionEndReason::Saved).await;
        info!(%session_id, canvas_id = %canvas.id, "edit session committed");
        Ok(canvas)
    }

    /// Abandon the session, discarding any staged draft.
    pub async fn cancel(&self, session_id: Uuid) -> Result<()> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let session = self
            .inner
            .sessions
            .transition(session_id, EditSessionStatus::Cancelled)
            .await?;
        self.finish_session(&session, SessionEndReason::Cancelled).await;
        info!(%session_id, canvas_id = %session.canvas_id, "edit session cancelled");
        Ok(())
    }

    /// Timer-driven expiry. `epoch` identifies the timer generation that
    /// fired; after a reschedule an older generation is a no-op, as is losing
    /// the race to a commit or cancel.
    pub(crate) async fn expire(&self, session_id: Uuid, epoch: u64) {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        {
            let mut timers = self.inner.timers.lock().await;
            match timers.get(&session_id) {
                Some(t) if t.epoch == epoch => {}
                _ => {
                    debug!(%session_id, epoch, "stale expiry timer ignored");
                    return;
                }
            }
            // retire the timer entry here rather than in finish_session: this
            // function runs inside the expiry task itself, and the usual abort
            // path would cancel it mid-finish
            if let Some(entry) = timers.remove(&session_id) {
                entry.autosave.abort();
            }
        }

        match self
            .inner
            .sessions
            .transition(session_id, EditSessionStatus::Expired)
            .await
        {
            Ok(session) => {
                self.finish_session(&session, SessionEndReason::Timeout).await;
                info!(%session_id, canvas_id = %session.canvas_id, "edit session expired");
            }
            Err(_) => debug!(%session_id, "expiry lost the race to another transition"),
        }
    }

    /// Snapshot of a session.
    pub async fn session(&self, session_id: Uuid) -> Option<EditSession> {
        self.inner.sessions.get(session_id).await
    }

    /// The active session on a canvas, if any.
    pub async fn active_session_for(&self, canvas_id: Uuid) -> Option<EditSession> {
        self.inner.sessions.active_for_canvas(canvas_id).await
    }

    /// Spawn a background sweep that discards long-terminal sessions (and
    /// their serialization locks) from memory. The durable rows remain.
    pub fn start_janitor(&self, period: StdDuration, retention: StdDuration) -> JoinHandle<()> {
        let manager = self.clone();
        let retention =
            Duration::from_std(retention).unwrap_or_else(|_| Duration::days(3650));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // the first tick completes immediately
            loop {
                interval.tick().await;
                let pruned = manager.inner.sessions.prune_terminal(retention).await;
                manager.prune_locks().await;
                if pruned > 0 {
                    debug!(pruned, "terminal sessions pruned");
                }
            }
        })
    }

    /// Abort every armed timer (process shutdown).
    pub async fn shutdown(&self) {
        let mut timers = self.inner.timers.lock().await;
        for (_, t) in timers.drain() {
            t.expiry.abort();
            t.autosave.abort();
        }
        info!("session timers stopped");
    }

    // -- terminal-transition tail ------------------------------------------

    /// Timers down, durable mirror, event out. `session` already carries its
    /// terminal status.
    async fn finish_session(&self, session: &EditSession, reason: SessionEndReason) {
        self.cancel_timers(session.id).await;
        if let Err(e) = self.inner.storage.update_session(session).await {
            warn!(session_id = %session.id, error = %e, "failed to persist terminal session state");
        }
        self.inner.events.publish(CanvasEvent::SessionEnded {
            session_id: session.id,
            canvas_id: session.canvas_id,
            user_id: session.user_id.clone(),
            reason,
            timestamp: Utc::now(),
        });
    }

    // -- timers -------------------------------------------------------------

    async fn arm_timers(&self, session: &EditSession) {
        let expiry = self.spawn_expiry(session.id, 0, session.timeout_minutes);
        let autosave = self.spawn_autosave(session.id);
        self.inner.timers.lock().await.insert(
            session.id,
            SessionTimers {
                epoch: 0,
                expiry,
                autosave,
            },
        );
    }

    /// Cancel-and-reissue the expiry timer; never additive.
    async fn reschedule_expiry(&self, session: &EditSession) {
        let mut timers = self.inner.timers.lock().await;
        let Some(entry) = timers.get_mut(&session.id) else {
            return;
        };
        entry.epoch += 1;
        entry.expiry.abort();
        entry.expiry = self.spawn_expiry(session.id, entry.epoch, session.timeout_minutes);
    }

    fn spawn_expiry(&self, session_id: Uuid, epoch: u64, timeout_minutes: i64) -> JoinHandle<()> {
        let manager = self.clone();
        let delay = Duration::minutes(timeout_minutes)
            .to_std()
            .unwrap_or(StdDuration::ZERO);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.expire(session_id, epoch).await;
        })
    }

    fn spawn_autosave(&self, session_id: Uuid) -> JoinHandle<()> {
        let manager = self.clone();
        let period = StdDuration::from_secs(self.inner.config.auto_save_interval_seconds);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // the first tick completes immediately
            loop {
                interval.tick().await;
                match manager.auto_save(session_id).await {
                    Ok(()) => {}
                    Err(Error::SessionNotFound(_) | Error::SessionAlreadyTerminal(_)) => break,
                    // the session keeps going; the next tick retries
                    Err(e) => warn!(%session_id, error = %e, "autosave failed"),
                }
            }
        })
    }

    async fn cancel_timers(&self, session_id: Uuid) {
        if let Some(t) = self.inner.timers.lock().await.remove(&session_id) {
            t.expiry.abort();
            t.autosave.abort();
        }
    }

    // -- per-session serialization -----------------------------------------

    async fn session_lock(&self, session_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.inner.locks.lock().await;
        locks
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop locks whose sessions are gone or terminal. Holders keep their
    /// `Arc` until they finish; terminal status checks stay correct either
    /// way because the registry's compare-and-set is the final arbiter.
    async fn prune_locks(&self) {
        let ids: Vec<Uuid> = self.inner.locks.lock().await.keys().copied().collect();
        for id in ids {
            let keep = matches!(
                self.inner.sessions.get(id).await,
                Some(s) if !s.status.is_terminal()
            );
            if !keep {
                self.inner.locks.lock().await.remove(&id);
            }
        }
    }
}
