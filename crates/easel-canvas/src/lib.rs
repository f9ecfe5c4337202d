//! Easel Canvas - Edit-Session Engine
//!
//! This crate implements the collaborative-canvas engine:
//! - Canvas: Document types (create/edit payloads, pagination)
//! - Storage: Durable backends for canvases and sessions (SQLite, in-memory)
//! - Repository: Validated canvas data access
//! - Session: Edit-session types and the in-memory session registry
//! - Manager: Session lifecycle, exclusivity, timers, autosave
//!
//! Editing is exclusive: at most one active session per canvas at any
//! instant. The manager enforces that invariant, expires idle sessions,
//! autosaves staged drafts, and announces every lifecycle edge on the
//! `easel-core` event bus.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod canvas;
pub mod manager;
pub mod repository;
pub mod session;
pub mod storage;

pub use canvas::{Canvas, CanvasDraft, CanvasPatch, Page};
pub use manager::SessionManager;
pub use repository::CanvasRepository;
pub use session::{EditSession, EditSessionStatus, SessionStore};
pub use storage::{MemoryStorage, SqliteStorage, Storage};
