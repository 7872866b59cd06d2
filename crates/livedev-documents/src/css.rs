//! Live stylesheet
//!
//! Every valid edit replaces the whole stylesheet in the browser. Invalid
//! text is held back until it parses again. A stylesheet pulled in through
//! `@import` has no `<link>` of its own, so its roots are pushed instead.

use livedev_protocol::{LiveDevProtocol, TextPosition};
use std::path::Path;

use crate::document::{DocumentChange, SharedDocument};
use crate::live::{
    fire, js_string, LiveBase, LiveDocument, LiveDocumentKind, RelatedUpdate, ResponseData,
    SyncOutcome, UrlResolver,
};
use crate::markup::{check_css, css_selector_at, offset_at, SyncError};

pub struct CssDocument {
    base: LiveBase,
    roots: Vec<String>,
    /// Roots to push again for the last valid edit
    stale_roots: Vec<String>,
}

impl CssDocument {
    pub fn new(
        document: SharedDocument,
        protocol: LiveDevProtocol,
        resolver: UrlResolver,
        roots: Vec<String>,
    ) -> Self {
        Self {
            base: LiveBase::new(document, protocol, resolver),
            roots,
            stale_roots: Vec::new(),
        }
    }

    /// Validate the current text and push it when it is safe to
    fn sync(&mut self) -> SyncOutcome {
        let text = self.base.document.text();
        let outcome = self.base.set_errors(check_css(&text));

        if !self.base.errors.is_empty() {
            return outcome;
        }
        let Some(url) = self.base.url() else {
            tracing::warn!(
                path = %self.base.document.path().display(),
                "Stylesheet has no served URL"
            );
            return outcome;
        };

        let linked = self.roots.is_empty() || self.roots.contains(&url);
        for root in self.roots.iter().filter(|root| **root != url) {
            if !self.stale_roots.contains(root) {
                self.stale_roots.push(root.clone());
            }
        }
        if linked {
            fire(
                self.base.protocol.set_stylesheet_text(url, text),
                "CSS.setStylesheetText",
            );
        }

        outcome
    }
}

impl LiveDocument for CssDocument {
    fn document(&self) -> &SharedDocument {
        &self.base.document
    }

    fn url(&self) -> Option<String> {
        self.base.url()
    }

    fn kind(&self) -> LiveDocumentKind {
        LiveDocumentKind::Css
    }

    fn is_live_editing_enabled(&self) -> bool {
        true
    }

    fn is_related(&self, path: &Path) -> bool {
        self.base.document.path() == path
    }

    fn errors(&self) -> &[SyncError] {
        &self.base.errors
    }

    fn on_change(&mut self, _change: &DocumentChange) -> SyncOutcome {
        if self.base.closed {
            return SyncOutcome::Unchanged;
        }
        self.sync()
    }

    fn update_browser(&mut self) {
        if self.base.closed {
            return;
        }
        // Error status is reported through on_change
        let _ = self.sync();
    }

    fn response_data(&self) -> ResponseData {
        ResponseData {
            body: self.base.document.text(),
        }
    }

    fn set_instrumentation_enabled(&mut self, _enabled: bool) {}

    fn apply_related(&mut self, _update: RelatedUpdate) {}

    fn roots(&self) -> &[String] {
        &self.roots
    }

    fn take_stale_roots(&mut self) -> Vec<String> {
        std::mem::take(&mut self.stale_roots)
    }

    fn update_highlight(&mut self, cursor: TextPosition) {
        let text = self.base.document.text();
        let selector = offset_at(&text, cursor).and_then(|offset| css_selector_at(&text, offset));

        match selector {
            Some(selector) => {
                let expression = format!("_LD.highlightRule({})", js_string(&selector));
                self.base.highlight(expression, selector);
            }
            None => self.base.hide_highlight(),
        }
    }

    fn hide_highlight(&mut self) {
        self.base.hide_highlight();
    }

    fn redraw_highlights(&self) {
        self.base.redraw_highlights();
    }

    fn close(&mut self) {
        self.base.close();
    }

    fn is_closed(&self) -> bool {
        self.base.closed
    }
}
