//! Live document contract and shared plumbing

use livedev_protocol::{LiveDevProtocol, RelatedDocuments, ResponseHandle, TextPosition};
use parking_lot::RwLock;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use crate::css::CssDocument;
use crate::document::{DocumentChange, Language, SharedDocument};
use crate::error::DocumentError;
use crate::html::HtmlDocument;
use crate::markup::SyncError;
use crate::Result;

/// Maps a project path to the URL the current server serves it at
pub type UrlResolver = Arc<dyn Fn(&Path) -> Option<String> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiveDocumentKind {
    Css,
    Html,
}

impl LiveDocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiveDocumentKind::Css => "css",
            LiveDocumentKind::Html => "html",
        }
    }
}

/// Result of feeding an edit to a live document
#[must_use = "an error status change must be reflected in the session status"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Unchanged,
    ErrorStatusChanged { has_errors: bool },
}

impl SyncOutcome {
    fn between(had_errors: bool, has_errors: bool) -> Self {
        if had_errors == has_errors {
            SyncOutcome::Unchanged
        } else {
            SyncOutcome::ErrorStatusChanged { has_errors }
        }
    }
}

/// Body to serve for a live document's URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseData {
    pub body: String,
}

/// Browser report about resources loaded by the page
#[derive(Debug, Clone, PartialEq)]
pub enum RelatedUpdate {
    Related(RelatedDocuments),
    StylesheetAdded(String),
    StylesheetRemoved(String),
    ScriptAdded(String),
    ScriptRemoved(String),
}

pub trait LiveDocument: Send + Sync {
    fn document(&self) -> &SharedDocument;

    fn path(&self) -> &Path {
        self.document().path()
    }

    /// URL the current server serves this document at
    fn url(&self) -> Option<String>;

    fn kind(&self) -> LiveDocumentKind;

    /// Whether edits show up in the browser without a reload
    fn is_live_editing_enabled(&self) -> bool;

    /// Whether `path` is this document or something the page loaded
    fn is_related(&self, path: &Path) -> bool;

    fn errors(&self) -> &[SyncError];

    fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }

    /// Push one editor change to the browser
    fn on_change(&mut self, change: &DocumentChange) -> SyncOutcome;

    /// Push the whole current text, if this document is live
    fn update_browser(&mut self);

    fn response_data(&self) -> ResponseData;

    fn set_instrumentation_enabled(&mut self, enabled: bool);

    fn apply_related(&mut self, update: RelatedUpdate);

    /// Root stylesheets that pulled this document into the page
    fn roots(&self) -> &[String] {
        &[]
    }

    /// Root stylesheets that must be pushed again for the last edit to show,
    /// cleared by the call
    fn take_stale_roots(&mut self) -> Vec<String> {
        Vec::new()
    }

    /// Highlight whatever the cursor is on in the browser
    fn update_highlight(&mut self, cursor: TextPosition);

    fn hide_highlight(&mut self);

    fn redraw_highlights(&self);

    /// Stop syncing. Later calls are no-ops.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

pub type SharedLiveDocument = Arc<RwLock<dyn LiveDocument>>;

/// Create the live document variant for `document`'s language
pub fn create_live_document(
    document: SharedDocument,
    protocol: LiveDevProtocol,
    resolver: UrlResolver,
    roots: Vec<String>,
) -> Result<SharedLiveDocument> {
    match document.language() {
        Language::Css => Ok(Arc::new(RwLock::new(CssDocument::new(
            document, protocol, resolver, roots,
        )))),
        Language::Html => Ok(Arc::new(RwLock::new(HtmlDocument::new(
            document, protocol, resolver,
        )))),
        _ => Err(DocumentError::Unsupported(document.path().to_path_buf())),
    }
}

/// State common to every live document variant
pub(crate) struct LiveBase {
    pub(crate) document: SharedDocument,
    pub(crate) protocol: LiveDevProtocol,
    resolver: UrlResolver,
    pub(crate) errors: Vec<SyncError>,
    highlighted: Option<String>,
    pub(crate) closed: bool,
}

impl LiveBase {
    pub(crate) fn new(
        document: SharedDocument,
        protocol: LiveDevProtocol,
        resolver: UrlResolver,
    ) -> Self {
        Self {
            document,
            protocol,
            resolver,
            errors: Vec::new(),
            highlighted: None,
            closed: false,
        }
    }

    pub(crate) fn url(&self) -> Option<String> {
        (self.resolver)(self.document.path())
    }

    pub(crate) fn url_for(&self, path: &Path) -> Option<String> {
        (self.resolver)(path)
    }

    /// Replace the error list and report whether the error state flipped
    pub(crate) fn set_errors(&mut self, errors: Vec<SyncError>) -> SyncOutcome {
        let had_errors = !self.errors.is_empty();
        self.errors = errors;
        let outcome = SyncOutcome::between(had_errors, !self.errors.is_empty());

        if let SyncOutcome::ErrorStatusChanged { has_errors } = outcome {
            tracing::debug!(
                path = %self.document.path().display(),
                has_errors,
                count = self.errors.len(),
                "Live document error status changed"
            );
        }
        outcome
    }

    pub(crate) fn evaluate(&self, expression: String) {
        fire(self.protocol.evaluate(expression), "Runtime.evaluate");
    }

    pub(crate) fn highlight(&mut self, expression: String, selector: String) {
        if self.closed {
            return;
        }
        self.evaluate(expression);
        self.highlighted = Some(selector);
    }

    pub(crate) fn hide_highlight(&mut self) {
        if self.closed {
            return;
        }
        self.highlighted = None;
        self.evaluate("_LD.hideHighlight()".to_string());
    }

    pub(crate) fn redraw_highlights(&self) {
        if self.closed || self.highlighted.is_none() {
            return;
        }
        self.evaluate("_LD.redrawHighlights()".to_string());
    }

    pub(crate) fn close(&mut self) {
        if self.closed {
            return;
        }
        self.hide_highlight();
        self.errors.clear();
        self.closed = true;
        tracing::debug!(path = %self.document.path().display(), "Closed live document");
    }
}

/// Quote a string as a JS literal
pub(crate) fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// Send without waiting for the reply; failures only matter for logging
pub(crate) fn fire(result: livedev_protocol::Result<ResponseHandle>, kind: &'static str) {
    if let Err(e) = result {
        tracing::debug!(kind, error = %e, "Protocol message not sent");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::InMemoryDocument;
    use livedev_protocol::event_channel;

    fn protocol() -> LiveDevProtocol {
        let (tx, _rx) = event_channel();
        LiveDevProtocol::new(tx)
    }

    fn resolver() -> UrlResolver {
        Arc::new(|path: &Path| Some(format!("http://localhost{}", path.display())))
    }

    #[test]
    fn test_create_by_language() {
        let css = create_live_document(
            InMemoryDocument::shared("/site/a.css", ""),
            protocol(),
            resolver(),
            vec![],
        )
        .unwrap();
        assert_eq!(css.read().kind(), LiveDocumentKind::Css);
        assert_eq!(css.read().url().as_deref(), Some("http://localhost/site/a.css"));

        let html = create_live_document(
            InMemoryDocument::shared("/site/index.php", ""),
            protocol(),
            resolver(),
            vec![],
        )
        .unwrap();
        assert_eq!(html.read().kind(), LiveDocumentKind::Html);

        let err = create_live_document(
            InMemoryDocument::shared("/site/app.js", ""),
            protocol(),
            resolver(),
            vec![],
        )
        .err()
        .unwrap();
        assert!(matches!(err, DocumentError::Unsupported(_)));
    }

    #[test]
    fn test_sync_outcome_between() {
        assert_eq!(SyncOutcome::between(false, false), SyncOutcome::Unchanged);
        assert_eq!(
            SyncOutcome::between(false, true),
            SyncOutcome::ErrorStatusChanged { has_errors: true }
        );
        assert_eq!(
            SyncOutcome::between(true, false),
            SyncOutcome::ErrorStatusChanged { has_errors: false }
        );
    }

    #[test]
    fn test_js_string_escapes() {
        assert_eq!(js_string("a \"b\""), r#""a \"b\"""#);
    }
}
