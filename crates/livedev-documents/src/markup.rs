//! Lightweight HTML and CSS scanners
//!
//! These are not full parsers. They find enough structure to decide whether
//! an edit can be pushed safely (balanced tags, braces, comments, strings),
//! to number elements for instrumentation, and to map a cursor position to
//! the element or rule under it.

use livedev_protocol::TextPosition;
use serde::Serialize;

/// A problem that prevents the document from being synced to the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncError {
    /// Zero-based line the problem starts on
    pub line: u32,
    pub message: String,
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const OPTIONAL_END_ELEMENTS: &[&str] = &[
    "body", "colgroup", "dd", "dt", "head", "html", "li", "optgroup", "option", "p", "rb", "rp",
    "rt", "tbody", "td", "tfoot", "th", "thead", "tr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Attribute written on every element of served markup
pub const TAG_ID_ATTR: &str = "data-brackets-id";

fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

fn has_optional_end(name: &str) -> bool {
    OPTIONAL_END_ELEMENTS.contains(&name)
}

/// Byte offset of a line/column position. Columns count characters.
pub fn offset_at(text: &str, pos: TextPosition) -> Option<usize> {
    let mut line_start = 0;
    if pos.line > 0 {
        let mut line = 0;
        let mut found = false;
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line += 1;
                if line == pos.line {
                    line_start = i + 1;
                    found = true;
                    break;
                }
            }
        }
        if !found {
            return None;
        }
    }

    let line_text = text[line_start..].split('\n').next().unwrap_or("");
    let mut ch = 0;
    for (idx, _) in line_text.char_indices() {
        if ch == pos.ch {
            return Some(line_start + idx);
        }
        ch += 1;
    }
    (ch == pos.ch).then_some(line_start + line_text.len())
}

/// Line/column of a byte offset, clamped to the text
pub fn position_at(text: &str, offset: usize) -> TextPosition {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }

    let before = &text[..offset];
    let line = before.matches('\n').count() as u32;
    let ch = before
        .rsplit('\n')
        .next()
        .map(|l| l.chars().count())
        .unwrap_or(0) as u32;
    TextPosition { line, ch }
}

fn error_at(text: &str, offset: usize, message: impl Into<String>) -> SyncError {
    SyncError {
        line: position_at(text, offset).line,
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// HTML

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tag {
    Open {
        name: String,
        start: usize,
        name_end: usize,
        end: usize,
        self_closing: bool,
    },
    Close {
        name: String,
        start: usize,
        end: usize,
    },
}

impl Tag {
    fn start(&self) -> usize {
        match self {
            Tag::Open { start, .. } | Tag::Close { start, .. } => *start,
        }
    }

    fn end(&self) -> usize {
        match self {
            Tag::Open { end, .. } | Tag::Close { end, .. } => *end,
        }
    }
}

/// Index just past the `>` closing a tag, honoring quoted attribute values
fn find_tag_end(bytes: &[u8], from: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate().skip(from) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'>' => return Some(i + 1),
                _ => {}
            },
        }
    }
    None
}

fn scan_tags(text: &str) -> (Vec<Tag>, Vec<SyncError>) {
    let bytes = text.as_bytes();
    let mut tags = Vec::new();
    let mut errors = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }

        let rest = &text[i..];
        if rest.starts_with("<!--") {
            match rest[4..].find("-->") {
                Some(e) => i += 4 + e + 3,
                None => {
                    errors.push(error_at(text, i, "Unterminated comment"));
                    break;
                }
            }
            continue;
        }
        if rest.starts_with("<!") || rest.starts_with("<?") {
            match find_tag_end(bytes, i + 2) {
                Some(e) => i = e,
                None => {
                    errors.push(error_at(text, i, "Unterminated declaration"));
                    break;
                }
            }
            continue;
        }

        let closing = bytes.get(i + 1) == Some(&b'/');
        let name_start = if closing { i + 2 } else { i + 1 };
        if !bytes.get(name_start).is_some_and(u8::is_ascii_alphabetic) {
            // A lone '<' is text
            i += 1;
            continue;
        }
        let name_end = name_start
            + bytes[name_start..]
                .iter()
                .take_while(|b| b.is_ascii_alphanumeric() || **b == b'-' || **b == b':')
                .count();
        let name = text[name_start..name_end].to_ascii_lowercase();

        let Some(end) = find_tag_end(bytes, name_end) else {
            errors.push(error_at(text, i, format!("Unterminated tag <{name}>")));
            break;
        };

        if closing {
            tags.push(Tag::Close {
                name,
                start: i,
                end,
            });
            i = end;
            continue;
        }

        let self_closing = end >= 2 && bytes[end - 2] == b'/';
        let raw_text = !self_closing && RAW_TEXT_ELEMENTS.contains(&name.as_str());
        let close_pattern = format!("</{name}");
        tags.push(Tag::Open {
            name,
            start: i,
            name_end,
            end,
            self_closing,
        });
        i = end;

        if raw_text {
            // Unclosed raw text runs to the end and is reported as an
            // unclosed element by the caller
            match text[end..].to_ascii_lowercase().find(&close_pattern) {
                Some(p) => i = end + p,
                None => break,
            }
        }
    }

    (tags, errors)
}

/// Check markup for problems that would make incremental DOM edits unsafe
pub fn check_html(text: &str) -> Vec<SyncError> {
    let (tags, mut errors) = scan_tags(text);
    let mut stack: Vec<(String, usize)> = Vec::new();

    for tag in tags {
        match tag {
            Tag::Open {
                name,
                start,
                self_closing,
                ..
            } => {
                if !is_void(&name) && !self_closing {
                    stack.push((name, start));
                }
            }
            Tag::Close { name, start, .. } => {
                if is_void(&name) {
                    continue;
                }
                match stack.iter().rposition(|(open, _)| *open == name) {
                    Some(pos) if stack[pos + 1..].iter().all(|(n, _)| has_optional_end(n)) => {
                        stack.truncate(pos);
                    }
                    _ => errors.push(error_at(
                        text,
                        start,
                        format!("Unexpected closing tag </{name}>"),
                    )),
                }
            }
        }
    }

    for (name, start) in stack {
        if !has_optional_end(&name) {
            errors.push(error_at(text, start, format!("Unclosed element <{name}>")));
        }
    }

    errors.sort_by_key(|e| e.line);
    errors
}

/// Number every element and inject `remote_script` into the head (or body,
/// or the very start when the page has neither)
pub fn instrument_html(text: &str, remote_script: &str) -> String {
    let (tags, _) = scan_tags(text);
    let mut inserts: Vec<(usize, String)> = Vec::new();
    let mut next_id = 0u32;
    let mut head_end = None;
    let mut body_end = None;

    for tag in &tags {
        if let Tag::Open {
            name,
            name_end,
            end,
            ..
        } = tag
        {
            next_id += 1;
            inserts.push((*name_end, format!(" {TAG_ID_ATTR}=\"{next_id}\"")));
            match name.as_str() {
                "head" if head_end.is_none() => head_end = Some(*end),
                "body" if body_end.is_none() => body_end = Some(*end),
                _ => {}
            }
        }
    }

    if !remote_script.is_empty() {
        let at = head_end.or(body_end).unwrap_or(0);
        inserts.push((at, remote_script.to_string()));
    }

    // Stable sort keeps a script insert after an id insert at the same offset
    inserts.sort_by_key(|(at, _)| *at);

    let mut out = String::with_capacity(text.len() + inserts.len() * 24);
    let mut copied = 0;
    for (at, insert) in inserts {
        out.push_str(&text[copied..at]);
        out.push_str(&insert);
        copied = at;
    }
    out.push_str(&text[copied..]);
    out
}

/// Instrumentation id of the innermost element containing `offset`
pub fn tag_id_at(text: &str, offset: usize) -> Option<u32> {
    let (tags, _) = scan_tags(text);
    let mut next_id = 0u32;
    let mut stack: Vec<(String, u32)> = Vec::new();

    for tag in &tags {
        if tag.start() > offset {
            break;
        }
        let inside = offset < tag.end();

        match tag {
            Tag::Open {
                name, self_closing, ..
            } => {
                next_id += 1;
                if inside {
                    return Some(next_id);
                }
                if !is_void(name) && !self_closing {
                    stack.push((name.clone(), next_id));
                }
            }
            Tag::Close { name, .. } => {
                let pos = stack.iter().rposition(|(open, _)| open == name);
                if inside {
                    return pos.map(|p| stack[p].1);
                }
                if let Some(p) = pos {
                    stack.truncate(p);
                }
            }
        }
    }

    stack.last().map(|(_, id)| *id)
}

/// Selector matching an instrumented element
pub fn tag_id_selector(id: u32) -> String {
    format!("[{TAG_ID_ATTR}='{id}']")
}

// ---------------------------------------------------------------------------
// CSS

/// Walk CSS outside comments and strings, calling `visit` for `{`, `}` and `;`
fn walk_css(text: &str, mut visit: impl FnMut(usize, u8)) -> Vec<SyncError> {
    let bytes = text.as_bytes();
    let mut errors = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => match text[i + 2..].find("*/") {
                Some(e) => i += 2 + e + 2,
                None => {
                    errors.push(error_at(text, i, "Unterminated comment"));
                    break;
                }
            },
            quote @ (b'"' | b'\'') => {
                let start = i;
                i += 1;
                let mut closed = false;
                while i < bytes.len() {
                    match bytes[i] {
                        b'\\' => i += 2,
                        b'\n' => break,
                        b if b == quote => {
                            closed = true;
                            i += 1;
                            break;
                        }
                        _ => i += 1,
                    }
                }
                if !closed {
                    errors.push(error_at(text, start, "Unterminated string"));
                }
            }
            b @ (b'{' | b'}' | b';') => {
                visit(i, b);
                i += 1;
            }
            _ => i += 1,
        }
    }

    errors
}

/// Check a stylesheet for problems that would make pushing it unsafe
pub fn check_css(text: &str) -> Vec<SyncError> {
    let mut open_blocks: Vec<usize> = Vec::new();
    let mut stray = Vec::new();

    let mut errors = walk_css(text, |at, b| match b {
        b'{' => open_blocks.push(at),
        b'}' => {
            if open_blocks.pop().is_none() {
                stray.push(at);
            }
        }
        _ => {}
    });

    errors.extend(
        stray
            .into_iter()
            .map(|at| error_at(text, at, "Unexpected '}'")),
    );
    errors.extend(
        open_blocks
            .into_iter()
            .map(|at| error_at(text, at, "Unclosed block")),
    );
    errors.sort_by_key(|e| e.line);
    errors
}

/// Selector of the innermost style rule at `offset`, either in its selector
/// text or inside its declaration block. At-rules are skipped.
pub fn css_selector_at(text: &str, offset: usize) -> Option<String> {
    let mut segment_start = 0;
    let mut blocks: Vec<(String, usize)> = Vec::new();
    let mut found: Option<String> = None;

    walk_css(text, |at, b| {
        match b {
            b'{' => {
                let raw = &text[segment_start..at];
                let selector = clean_selector(raw);
                let selector_start = segment_start + (raw.len() - raw.trim_start().len());
                if found.is_none()
                    && (selector_start..=at).contains(&offset)
                    && !selector.starts_with('@')
                    && !selector.is_empty()
                {
                    found = Some(selector.clone());
                }
                blocks.push((selector, at));
            }
            b'}' => {
                if let Some((selector, start)) = blocks.pop() {
                    if found.is_none()
                        && start < offset
                        && offset <= at
                        && !selector.starts_with('@')
                        && !selector.is_empty()
                    {
                        found = Some(selector);
                    }
                }
            }
            _ => {}
        }
        segment_start = at + 1;
    });

    found
}

/// Strip comments and collapse whitespace
fn clean_selector(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        rest = match rest[start + 2..].find("*/") {
            Some(end) => &rest[start + 2 + end + 2..],
            None => "",
        };
    }
    out.push_str(rest);
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
