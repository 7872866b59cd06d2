//! Interfaces the embedding editor provides to a session

use async_trait::async_trait;
use livedev_documents::{DocumentChange, SharedDocument};
use livedev_protocol::TextPosition;
use std::path::{Path, PathBuf};

use crate::Result;

/// Project and open documents, as seen by the editor
#[async_trait]
pub trait Workspace: Send + Sync {
    fn project_root(&self) -> PathBuf;

    /// Document in the focused editor, if any
    fn current_document(&self) -> Option<SharedDocument>;

    /// Open (or load) the document backing `path`
    async fn document_for_path(&self, path: &Path) -> Option<SharedDocument>;

    /// Every file in the project, in project order
    async fn all_files(&self) -> Vec<PathBuf>;

    /// Make sure `document` has an editor so edits reach it
    fn ensure_editor(&self, document: &SharedDocument);
}

/// Reasons `open` can fail that the user is told about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupFailure {
    NeedHtmlFile,
    ServerNotReady,
}

#[async_trait]
pub trait Dialogs: Send + Sync {
    fn show_error(&self, failure: SetupFailure);

    /// Ask for the URL of the project's own server; `None` when dismissed
    async fn prompt_base_url(&self, project_root: &Path) -> Option<String>;
}

pub trait Launcher: Send + Sync {
    fn launch(&self, url: &str) -> Result<()>;
}

/// Editor notifications relayed to the session
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    CurrentFileChanged,
    DocumentChanged {
        path: PathBuf,
        change: DocumentChange,
    },
    DirtyFlagChanged {
        path: PathBuf,
        is_dirty: bool,
    },
    DocumentSaved {
        path: PathBuf,
    },
    FileDeleted {
        path: PathBuf,
    },
    CursorMoved {
        path: PathBuf,
        cursor: TextPosition,
    },
    BeforeProjectClose,
    BeforeAppClose,
}
