//! File extension classification

use std::path::Path;

use livedev_documents::{SERVER_HTML_EXTENSIONS, STATIC_HTML_EXTENSIONS};

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// `.html`/`.htm`: viewable straight from disk
pub fn is_static_html_file_ext(path: &Path) -> bool {
    extension(path).is_some_and(|e| STATIC_HTML_EXTENSIONS.contains(&e.as_str()))
}

/// Pages rendered by a server-side runtime (php, asp, jsp, ...)
pub fn is_server_html_file_ext(path: &Path) -> bool {
    extension(path).is_some_and(|e| SERVER_HTML_EXTENSIONS.contains(&e.as_str()))
}

pub fn is_html_file_ext(path: &Path) -> bool {
    is_static_html_file_ext(path) || is_server_html_file_ext(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(is_static_html_file_ext(Path::new("/a/index.HTM")));
        assert!(!is_static_html_file_ext(Path::new("/a/index.php")));
        assert!(is_server_html_file_ext(Path::new("/a/index.php5")));
        assert!(is_server_html_file_ext(Path::new("/a/page.shtml")));
        assert!(is_html_file_ext(Path::new("page.jspx")));
        assert!(!is_html_file_ext(Path::new("style.css")));
        assert!(!is_html_file_ext(Path::new("html")));
    }
}
