//! Wire messages exchanged with the browser
//!
//! Every message is a JSON object discriminated by `type`. The remote side
//! historically used `method` for the same purpose, so both keys are accepted
//! on input. Messages carrying an `id` are replies to an earlier request.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::ProtocolError;
use crate::Result;

/// Opaque connection identifier assigned by the transport
pub type ClientId = u64;

/// Zero-based line/column position in an editor document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextPosition {
    pub line: u32,
    pub ch: u32,
}

impl TextPosition {
    pub fn new(line: u32, ch: u32) -> Self {
        Self { line, ch }
    }
}

/// Documents the browser reports as loaded by the live page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelatedDocuments {
    /// Stylesheet URL -> URLs of the root stylesheets that pulled it in
    pub stylesheets: BTreeMap<String, Vec<String>>,
    /// External script URLs
    pub scripts: BTreeSet<String>,
}

impl RelatedDocuments {
    fn from_value(value: Option<&Value>) -> Self {
        let mut related = Self::default();
        let Some(Value::Object(obj)) = value else {
            return related;
        };

        if let Some(Value::Object(sheets)) = obj.get("stylesheets") {
            for (url, roots) in sheets {
                related
                    .stylesheets
                    .insert(url.clone(), flatten_roots(Some(roots)));
            }
        }

        if let Some(Value::Object(scripts)) = obj.get("scripts") {
            related.scripts.extend(scripts.keys().cloned());
        }

        related
    }

    pub fn is_empty(&self) -> bool {
        self.stylesheets.is_empty() && self.scripts.is_empty()
    }
}

/// Decoded browser -> session message
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Connect { url: String },
    Close,
    DocumentRelated { related: RelatedDocuments },
    StylesheetAdded { href: String, roots: Vec<String> },
    StylesheetRemoved { href: String },
    ScriptAdded { src: String },
    ScriptRemoved { src: String },
    /// Reply to a request we sent; `Err` carries the remote error payload
    Reply {
        id: u64,
        result: std::result::Result<Value, Value>,
    },
    Unknown { kind: String },
}

impl InboundMessage {
    pub fn decode(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(obj) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        if let Some(id) = obj.get("id").and_then(Value::as_u64) {
            let result = match obj.get("error") {
                Some(error) if !error.is_null() => Err(error.clone()),
                _ => Ok(obj.get("result").cloned().unwrap_or(Value::Null)),
            };
            return Ok(Self::Reply { id, result });
        }

        let kind = obj
            .get("type")
            .or_else(|| obj.get("method"))
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?;

        let message = match kind {
            "connect" => Self::Connect {
                url: string_field(&obj, kind, "url")?,
            },
            "close" => Self::Close,
            "Document.Related" | "DocumentRelated" => Self::DocumentRelated {
                related: RelatedDocuments::from_value(obj.get("related")),
            },
            "Stylesheet.Added" | "StylesheetAdded" => Self::StylesheetAdded {
                href: string_field(&obj, kind, "href")?,
                roots: flatten_roots(obj.get("roots")),
            },
            "Stylesheet.Removed" | "StylesheetRemoved" => Self::StylesheetRemoved {
                href: string_field(&obj, kind, "href")?,
            },
            "Script.Added" | "ScriptAdded" => Self::ScriptAdded {
                src: string_field(&obj, kind, "src")?,
            },
            "Script.Removed" | "ScriptRemoved" => Self::ScriptRemoved {
                src: string_field(&obj, kind, "src")?,
            },
            other => Self::Unknown {
                kind: other.to_string(),
            },
        };

        Ok(message)
    }
}

fn string_field(obj: &Map<String, Value>, kind: &str, field: &'static str) -> Result<String> {
    obj.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ProtocolError::MissingField {
            kind: kind.to_string(),
            field,
        })
}

/// Roots arrive either flat (`["a.css"]`) or nested one level deeper
/// (`[["a.css"]]`) depending on which browser-side observer sent them.
fn flatten_roots(value: Option<&Value>) -> Vec<String> {
    fn collect(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::String(s) => out.push(s.clone()),
            Value::Array(items) => items.iter().for_each(|item| collect(item, out)),
            _ => {}
        }
    }

    let mut roots = Vec::new();
    if let Some(value) = value {
        collect(value, &mut roots);
    }
    roots
}

/// Session -> browser message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "Page.reload")]
    Reload {
        #[serde(rename = "ignoreCache")]
        ignore_cache: bool,
    },
    #[serde(rename = "Page.navigate")]
    Navigate { url: String },
    #[serde(rename = "Runtime.evaluate")]
    Evaluate { expression: String },
    #[serde(rename = "CSS.setStylesheetText")]
    SetStylesheetText { url: String, text: String },
    #[serde(rename = "CSS.getStylesheetText")]
    GetStylesheetText { url: String },
    #[serde(rename = "Document.setText")]
    SetDocumentText { url: String, text: String },
    #[serde(rename = "Document.applyEdit")]
    ApplyEdit {
        url: String,
        from: TextPosition,
        to: TextPosition,
        text: String,
    },
}

impl OutboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Reload { .. } => "Page.reload",
            OutboundMessage::Navigate { .. } => "Page.navigate",
            OutboundMessage::Evaluate { .. } => "Runtime.evaluate",
            OutboundMessage::SetStylesheetText { .. } => "CSS.setStylesheetText",
            OutboundMessage::GetStylesheetText { .. } => "CSS.getStylesheetText",
            OutboundMessage::SetDocumentText { .. } => "Document.setText",
            OutboundMessage::ApplyEdit { .. } => "Document.applyEdit",
        }
    }

    /// Serialize with the request id the reply will be matched against
    pub fn encode(&self, id: u64) -> Result<String> {
        #[derive(Serialize)]
        struct Envelope<'a> {
            id: u64,
            #[serde(flatten)]
            message: &'a OutboundMessage,
        }

        Ok(serde_json::to_string(&Envelope { id, message: self })?)
    }
}
