//! Editor-side text documents
//!
//! The editor owns its buffers. Live documents only hold a shared handle and
//! read the current text when they need it.

use livedev_protocol::TextPosition;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::DocumentError;
use crate::markup::offset_at;
use crate::Result;

/// Extensions of HTML pages that can be opened without a server
pub const STATIC_HTML_EXTENSIONS: &[&str] = &["htm", "html"];

/// Extensions of pages that need the project's own server to render
pub const SERVER_HTML_EXTENSIONS: &[&str] = &[
    "php", "php3", "php4", "php5", "phtm", "phtml", "cfm", "cfml", "asp", "aspx", "jsp", "jspx",
    "shtm", "shtml",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Html,
    Css,
    JavaScript,
    Other,
}

impl Language {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "css" => Language::Css,
            "js" | "mjs" => Language::JavaScript,
            e if STATIC_HTML_EXTENSIONS.contains(&e) || SERVER_HTML_EXTENSIONS.contains(&e) => {
                Language::Html
            }
            _ => Language::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Html => "html",
            Language::Css => "css",
            Language::JavaScript => "javascript",
            Language::Other => "other",
        }
    }
}

/// One edit as reported by the editor. `from`/`to` refer to the text before
/// the edit was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChange {
    pub from: TextPosition,
    pub to: TextPosition,
    pub text: String,
}

impl DocumentChange {
    pub fn insert(at: TextPosition, text: impl Into<String>) -> Self {
        Self {
            from: at,
            to: at,
            text: text.into(),
        }
    }
}

pub trait TextDocument: Send + Sync {
    fn path(&self) -> &Path;
    fn text(&self) -> String;
    fn is_dirty(&self) -> bool;

    fn language(&self) -> Language {
        Language::from_path(self.path())
    }
}

pub type SharedDocument = Arc<dyn TextDocument>;

struct BufferState {
    text: String,
    dirty: bool,
}

/// Plain in-memory buffer, for hosts without their own document model
pub struct InMemoryDocument {
    path: PathBuf,
    state: RwLock<BufferState>,
}

impl InMemoryDocument {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            state: RwLock::new(BufferState {
                text: text.into(),
                dirty: false,
            }),
        }
    }

    pub fn shared(path: impl Into<PathBuf>, text: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(path, text))
    }

    pub fn set_text(&self, text: impl Into<String>) {
        let mut state = self.state.write();
        state.text = text.into();
        state.dirty = true;
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.state.write().dirty = dirty;
    }

    /// Apply an edit and mark the buffer dirty
    pub fn apply(&self, change: &DocumentChange) -> Result<()> {
        let mut state = self.state.write();
        let from = offset_at(&state.text, change.from).ok_or(DocumentError::PositionOutOfRange {
            line: change.from.line,
            ch: change.from.ch,
        })?;
        let to = offset_at(&state.text, change.to).ok_or(DocumentError::PositionOutOfRange {
            line: change.to.line,
            ch: change.to.ch,
        })?;
        let (from, to) = if from <= to { (from, to) } else { (to, from) };

        state.text.replace_range(from..to, &change.text);
        state.dirty = true;
        Ok(())
    }
}

impl TextDocument for InMemoryDocument {
    fn path(&self) -> &Path {
        &self.path
    }

    fn text(&self) -> String {
        self.state.read().text.clone()
    }

    fn is_dirty(&self) -> bool {
        self.state.read().dirty
    }
}
