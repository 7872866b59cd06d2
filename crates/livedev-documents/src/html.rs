//! Live HTML page
//!
//! Without instrumentation the page is only reloaded on save. With it, each
//! edit is forwarded as a text patch while the markup stays well formed, and
//! the whole text is resent once it becomes well formed again.

use livedev_protocol::{LiveDevProtocol, RelatedDocuments, TextPosition};
use std::path::Path;

use crate::document::{DocumentChange, SharedDocument};
use crate::live::{
    fire, js_string, LiveBase, LiveDocument, LiveDocumentKind, RelatedUpdate, ResponseData,
    SyncOutcome, UrlResolver,
};
use crate::markup::{check_html, instrument_html, offset_at, tag_id_at, tag_id_selector, SyncError};

pub struct HtmlDocument {
    base: LiveBase,
    instrumentation_enabled: bool,
    related: RelatedDocuments,
}

impl HtmlDocument {
    pub fn new(document: SharedDocument, protocol: LiveDevProtocol, resolver: UrlResolver) -> Self {
        Self {
            base: LiveBase::new(document, protocol, resolver),
            instrumentation_enabled: false,
            related: RelatedDocuments::default(),
        }
    }

    /// Stylesheets and scripts the page reported loading
    pub fn related(&self) -> &RelatedDocuments {
        &self.related
    }

    fn push_full_text(&self, text: String) {
        if let Some(url) = self.base.url() {
            fire(
                self.base.protocol.set_document_text(url, text),
                "Document.setText",
            );
        }
    }
}

impl LiveDocument for HtmlDocument {
    fn document(&self) -> &SharedDocument {
        &self.base.document
    }

    fn url(&self) -> Option<String> {
        self.base.url()
    }

    fn kind(&self) -> LiveDocumentKind {
        LiveDocumentKind::Html
    }

    fn is_live_editing_enabled(&self) -> bool {
        self.instrumentation_enabled
    }

    fn is_related(&self, path: &Path) -> bool {
        if self.base.document.path() == path {
            return true;
        }
        match self.base.url_for(path) {
            Some(url) => {
                self.related.scripts.contains(&url) || self.related.stylesheets.contains_key(&url)
            }
            None => false,
        }
    }

    fn errors(&self) -> &[SyncError] {
        &self.base.errors
    }

    fn on_change(&mut self, change: &DocumentChange) -> SyncOutcome {
        if self.base.closed || !self.instrumentation_enabled {
            return SyncOutcome::Unchanged;
        }

        let text = self.base.document.text();
        let had_errors = !self.base.errors.is_empty();
        let outcome = self.base.set_errors(check_html(&text));

        if self.base.errors.is_empty() {
            if had_errors {
                // Patches made while broken were dropped; resend everything
                self.push_full_text(text);
            } else if let Some(url) = self.base.url() {
                fire(
                    self.base.protocol.apply_edit(
                        url,
                        change.from,
                        change.to,
                        change.text.clone(),
                    ),
                    "Document.applyEdit",
                );
            }
        }

        outcome
    }

    fn update_browser(&mut self) {
        if self.base.closed || !self.instrumentation_enabled || !self.base.errors.is_empty() {
            return;
        }
        self.push_full_text(self.base.document.text());
    }

    fn response_data(&self) -> ResponseData {
        let text = self.base.document.text();
        let body = if self.instrumentation_enabled {
            instrument_html(&text, &self.base.protocol.remote_script())
        } else {
            text
        };
        ResponseData { body }
    }

    fn set_instrumentation_enabled(&mut self, enabled: bool) {
        if enabled && !self.instrumentation_enabled {
            let text = self.base.document.text();
            // Start from the current error state so the first edit compares
            // against it
            let _ = self.base.set_errors(check_html(&text));
        }
        self.instrumentation_enabled = enabled;
    }

    fn apply_related(&mut self, update: RelatedUpdate) {
        match update {
            RelatedUpdate::Related(related) => self.related = related,
            RelatedUpdate::StylesheetAdded(href) => {
                self.related.stylesheets.entry(href).or_default();
            }
            RelatedUpdate::StylesheetRemoved(href) => {
                self.related.stylesheets.remove(&href);
            }
            RelatedUpdate::ScriptAdded(src) => {
                self.related.scripts.insert(src);
            }
            RelatedUpdate::ScriptRemoved(src) => {
                self.related.scripts.remove(&src);
            }
        }
    }

    fn update_highlight(&mut self, cursor: TextPosition) {
        let text = self.base.document.text();
        let id = offset_at(&text, cursor).and_then(|offset| tag_id_at(&text, offset));

        match id {
            Some(id) => {
                let selector = tag_id_selector(id);
                let expression = format!("_LD.highlight({})", js_string(&selector));
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
