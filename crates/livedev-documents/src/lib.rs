//! Live Development documents
//!
//! A live document mirrors one editor buffer and pushes its changes to the
//! connected browser. Stylesheets are always live; HTML is live only once
//! instrumentation is enabled, otherwise it needs a reload on save.

mod css;
mod document;
mod error;
mod html;
mod live;
pub mod markup;

pub use css::CssDocument;
pub use document::{
    DocumentChange, InMemoryDocument, Language, SharedDocument, TextDocument,
    SERVER_HTML_EXTENSIONS, STATIC_HTML_EXTENSIONS,
};
pub use error::DocumentError;
pub use html::HtmlDocument;
pub use live::{
    create_live_document, LiveDocument, LiveDocumentKind, RelatedUpdate, ResponseData,
    SharedLiveDocument, SyncOutcome, UrlResolver,
};
pub use markup::SyncError;

pub type Result<T> = std::result::Result<T, DocumentError>;
