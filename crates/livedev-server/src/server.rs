//! Server contract and the live document registry shared by implementations

use futures_util::future::BoxFuture;
use livedev_documents::{ResponseData, SharedLiveDocument};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::Result;

pub type ReadyFuture = BoxFuture<'static, Result<()>>;

/// Live documents registered with a server, keyed by path
#[derive(Default)]
pub struct DocumentRegistry {
    docs: RwLock<HashMap<PathBuf, SharedLiveDocument>>,
    running: RwLock<bool>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, doc: SharedLiveDocument) {
        let path = doc.read().path().to_path_buf();
        tracing::debug!(path = %path.display(), "Registered live document with server");
        self.docs.write().insert(path, doc);
    }

    pub fn remove(&self, doc: &SharedLiveDocument) {
        let path = doc.read().path().to_path_buf();
        self.docs.write().remove(&path);
    }

    pub fn get(&self, path: &Path) -> Option<SharedLiveDocument> {
        self.docs.read().get(path).cloned()
    }

    pub fn clear(&self) {
        self.docs.write().clear();
    }

    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    pub fn set_running(&self, running: bool) {
        *self.running.write() = running;
    }

    pub fn is_running(&self) -> bool {
        *self.running.read()
    }
}

pub trait LiveServer: Send + Sync {
    /// Short name for logs
    fn kind(&self) -> &'static str;

    fn root(&self) -> &Path;

    fn registry(&self) -> &DocumentRegistry;

    fn path_to_url(&self, path: &Path) -> Option<String>;

    fn url_to_path(&self, url: &str) -> Option<PathBuf>;

    /// Whether this server can preview `path` as a page
    fn can_serve(&self, path: &Path) -> bool;

    /// Resolves once requests can be made; `None` when the server cannot
    /// report readiness at all
    fn ready_to_serve(&self) -> Option<ReadyFuture>;

    fn base_url(&self) -> String;

    fn add(&self, doc: SharedLiveDocument) {
        self.registry().add(doc);
    }

    fn remove(&self, doc: &SharedLiveDocument) {
        self.registry().remove(doc);
    }

    fn get(&self, path: &Path) -> Option<SharedLiveDocument> {
        self.registry().get(path)
    }

    fn clear(&self) {
        self.registry().clear();
    }

    fn start(&self) {
        self.registry().set_running(true);
        tracing::info!(kind = self.kind(), base_url = %self.base_url(), "Server started");
    }

    fn stop(&self) {
        self.registry().set_running(false);
        tracing::info!(kind = self.kind(), "Server stopped");
    }

    fn is_running(&self) -> bool {
        self.registry().is_running()
    }

    /// Body for a request to `url`, when a registered live document owns it
    fn response_for(&self, url: &str) -> Option<ResponseData> {
        let path = self.url_to_path(url)?;
        let doc = self.get(&path)?;
        let data = doc.read().response_data();
        Some(data)
    }
}

pub type SharedServer = Arc<dyn LiveServer>;

/// Whether `path` lies inside `root`
pub(crate) fn is_under(root: &Path, path: &Path) -> bool {
    path.starts_with(root) && path != root
}
