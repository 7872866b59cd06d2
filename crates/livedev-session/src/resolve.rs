//! Finding a page to preview when the current file is not one

use livedev_server::{is_server_html_file_ext, is_static_html_file_ext};
use std::path::{Path, PathBuf};

fn is_index_candidate(path: &Path, allow_server_pages: bool) -> bool {
    let is_index = path
        .file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.eq_ignore_ascii_case("index"));

    is_index
        && (is_static_html_file_ext(path)
            || (allow_server_pages && is_server_html_file_ext(path)))
}

/// Search `start`, then each parent up to `root`, for an index page.
/// Within a folder the first match in `files` order wins.
pub fn find_index_file(
    files: &[PathBuf],
    start: &Path,
    root: &Path,
    allow_server_pages: bool,
) -> Option<PathBuf> {
    let mut folder = start;
    loop {
        let found = files
            .iter()
            .find(|f| f.parent() == Some(folder) && is_index_candidate(f, allow_server_pages));
        if let Some(found) = found {
            return Some(found.clone());
        }

        if folder == root || !folder.starts_with(root) {
            return None;
        }
        folder = folder.parent()?;
    }
}
