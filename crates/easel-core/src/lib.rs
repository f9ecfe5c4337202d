//! Easel Core - Shared Foundations
//!
//! This crate provides the shared foundations for the Easel canvas engine:
//! - Config: Typed configuration with file/environment layering
//! - Error: Error taxonomy and chat-facing message formatting
//! - Event bus: Broadcast lifecycle events for gateway consumers
//! - Validation: Field-level checks for canvas titles and content

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod event_bus;
pub mod validation;

pub use config::{load_config, AppConfig, AppSettings, CanvasConfig, DatabaseConfig};
pub use error::{Error, Result, UserFriendlyError};
pub use event_bus::{CanvasEvent, EventBus, SessionEndReason};
pub use validation::{
    validate_canvas_fields, validate_content, validate_title, FieldViolation, TITLE_MAX_LEN,
    TITLE_MIN_LEN,
};
