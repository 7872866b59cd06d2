//! Server that opens pages straight from disk through `file:` URLs

use futures_util::FutureExt;
use std::path::{Path, PathBuf};
use url::Url;

use crate::file_ext::is_static_html_file_ext;
use crate::server::{is_under, DocumentRegistry, LiveServer, ReadyFuture};

pub struct FileServer {
    root: PathBuf,
    registry: DocumentRegistry,
}

impl FileServer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            registry: DocumentRegistry::new(),
        }
    }
}

impl LiveServer for FileServer {
    fn kind(&self) -> &'static str {
        "file"
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    fn path_to_url(&self, path: &Path) -> Option<String> {
        if !is_under(&self.root, path) {
            return None;
        }
        Url::from_file_path(path).ok().map(String::from)
    }

    fn url_to_path(&self, url: &str) -> Option<PathBuf> {
        let url = Url::parse(url).ok()?;
        if url.scheme() != "file" {
            return None;
        }
        let path = url.to_file_path().ok()?;
        is_under(&self.root, &path).then_some(path)
    }

    fn can_serve(&self, path: &Path) -> bool {
        is_under(&self.root, path) && is_static_html_file_ext(path)
    }

    fn ready_to_serve(&self) -> Option<ReadyFuture> {
        Some(futures_util::future::ready(Ok(())).boxed())
    }

    fn base_url(&self) -> String {
        Url::from_directory_path(&self.root)
            .map(String::from)
            .unwrap_or_default()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_path_url_mapping() {
        let server = FileServer::new("/home/me/site");

        let url = server
            .path_to_url(Path::new("/home/me/site/my page.html"))
            .unwrap();
        assert_eq!(url, "file:///home/me/site/my%20page.html");
        assert_eq!(
            server.url_to_path(&url),
            Some(PathBuf::from("/home/me/site/my page.html"))
        );

        assert_eq!(server.path_to_url(Path::new("/etc/passwd")), None);
        assert_eq!(server.url_to_path("file:///etc/passwd"), None);
        assert_eq!(server.url_to_path("http://localhost/site/a.html"), None);
        assert_eq!(server.base_url(), "file:///home/me/site/");
    }

    #[test]
    fn test_can_serve_static_html_only() {
        let server = FileServer::new("/home/me/site");
        assert!(server.can_serve(Path::new("/home/me/site/index.html")));
        assert!(server.can_serve(Path::new("/home/me/site/sub/a.htm")));
        assert!(!server.can_serve(Path::new("/home/me/site/index.php")));
        assert!(!server.can_serve(Path::new("/home/me/site/main.css")));
        assert!(!server.can_serve(Path::new("/home/other/index.html")));
    }

    #[tokio::test]
    async fn test_always_ready() {
        let server = FileServer::new("/home/me/site");
        server.ready_to_serve().unwrap().await.unwrap();
        assert!(!server.is_running());
        server.start();
        assert!(server.is_running());
        server.stop();
        assert!(!server.is_running());
    }
}
