//! Canvas document types.
//!
//! A canvas is a plain-text document owned by the user who created it and
//! mutated only through autosaves and committed edit sessions. The original
//! author and the most recent editor are tracked as separate fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A canvas document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Canvas {
    /// Unique identifier
    pub id: Uuid,

    /// Document title
    pub title: String,

    /// Document body
    pub content: String,

    /// User who created the canvas; never changes
    pub created_by: String,

    /// When the canvas was created
    pub created_at: DateTime<Utc>,

    /// When the canvas last changed
    pub updated_at: DateTime<Utc>,

    /// Most recent editor, if the canvas was ever edited after creation
    pub last_edited_by: Option<String>,

    /// When the most recent edit landed
    pub last_edited_at: Option<DateTime<Utc>>,
}

impl Canvas {
    /// Create a new canvas from a draft payload.
    #[must_use]
    pub fn new(draft: CanvasDraft) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: draft.title,
            content: draft.content,
            created_by: draft.created_by,
            created_at: now,
            updated_at: now,
            last_edited_by: None,
            last_edited_at: None,
        }
    }

    /// Apply an edit, stamping `updated_at` and the last-editor fields.
    pub fn apply(&mut self, patch: CanvasPatch) {
        let now = Utc::now();
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(content) = patch.content {
            self.content = content;
        }
        self.last_edited_by = Some(patch.edited_by);
        self.last_edited_at = Some(now);
        self.updated_at = now;
    }

    /// Content preview truncated to `len` characters.
    #[must_use]
    pub fn preview(&self, len: usize) -> String {
        if self.content.chars().count() <= len {
            self.content.clone()
        } else {
            let cut: String = self.content.chars().take(len).collect();
            format!("{cut}…")
        }
    }
}

/// Payload for creating a canvas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasDraft {
    /// Document title
    pub title: String,
    /// Initial content
    pub content: String,
    /// Creating user
    pub created_by: String,
}

/// Payload for editing a canvas. `None` fields keep their current value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasPatch {
    /// Replacement title, if changing
    pub title: Option<String>,
    /// Replacement content, if changing
    pub content: Option<String>,
    /// User making the edit
    pub edited_by: String,
}

/// One page of a listing, with a flag for further pages.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Whether more items exist past this page
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> CanvasDraft {
        CanvasDraft {
            title: "Meeting Notes".to_string(),
            content: "agenda".to_string(),
            created_by: "alice".to_string(),
        }
    }

    #[test]
    fn test_new_canvas_has_no_editor() {
        let canvas = Canvas::new(draft());
        assert_eq!(canvas.created_by, "alice");
        assert_eq!(canvas.created_at, canvas.updated_at);
        assert!(canvas.last_edited_by.is_none());
        assert!(canvas.last_edited_at.is_none());
    }

    #[test]
    fn test_apply_stamps_editor_and_keeps_author() {
        let mut canvas = Canvas::new(draft());
        canvas.apply(CanvasPatch {
            title: None,
            content: Some("minutes".to_string()),
            edited_by: "bob".to_string(),
        });

        assert_eq!(canvas.title, "Meeting Notes");
        assert_eq!(canvas.content, "minutes");
        assert_eq!(canvas.created_by, "alice");
        assert_eq!(canvas.last_edited_by.as_deref(), Some("bob"));
        assert!(canvas.last_edited_at.is_some());
        assert!(canvas.updated_at >= canvas.created_at);
    }

    #[test]
    fn test_preview_truncates_on_characters() {
        let mut canvas = Canvas::new(draft());
        canvas.content = "äbcdefgh".to_string();
        assert_eq!(canvas.preview(4), "äbcd…");
        assert_eq!(canvas.preview(100), "äbcdefgh");
    }
}
