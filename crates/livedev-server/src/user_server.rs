//! Server for projects running their own development server
//!
//! Project files map onto the configured base URL by their project-relative
//! path. The server itself is external; readiness is checked with a probe.

use futures_util::FutureExt;
use reqwest::redirect::Policy;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::ServerError;
use crate::file_ext::is_html_file_ext;
use crate::server::{is_under, DocumentRegistry, LiveServer, ReadyFuture};
use crate::Result;

const PROBE_TIMEOUT: Duration = Duration::from_secs(6);

pub struct UserServer {
    root: PathBuf,
    base_url: Url,
    probe: bool,
    registry: DocumentRegistry,
}

impl UserServer {
    /// `base_url` gets a trailing slash so relative paths append to it
    pub fn new(root: impl Into<PathBuf>, base_url: &str, probe: bool) -> Result<Self> {
        let trimmed = base_url.trim();
        let normalized = if trimmed.ends_with('/') {
            trimmed.to_string()
        } else {
            format!("{trimmed}/")
        };
        let base_url = Url::parse(&normalized).map_err(|source| ServerError::InvalidBaseUrl {
            url: trimmed.to_string(),
            source,
        })?;

        Ok(Self {
            root: root.into(),
            base_url,
            probe,
            registry: DocumentRegistry::new(),
        })
    }

    fn relative_url_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(segment) => {
                    segments.push(urlencoding::encode(segment.to_str()?).into_owned());
                }
                _ => return None,
            }
        }
        Some(segments.join("/"))
    }
}

/// HEAD the base URL, falling back to a one-byte GET for servers that
/// reject HEAD. Any HTTP response counts as ready.
async fn probe(url: Url) -> Result<()> {
    let client = reqwest::Client::builder()
        .redirect(Policy::limited(5))
        .timeout(PROBE_TIMEOUT)
        .build()?;

    let response = match client.head(url.clone()).send().await {
        Ok(resp) => Ok(resp),
        Err(_) => {
            client
                .get(url.clone())
                .header(reqwest::header::RANGE, "bytes=0-0")
                .send()
                .await
        }
    };

    match response {
        Ok(resp) => {
            tracing::debug!(url = %url, status = resp.status().as_u16(), "User server responded");
            Ok(())
        }
        Err(source) => {
            tracing::warn!(url = %url, error = %source, "User server not reachable");
            Err(ServerError::Unreachable {
                url: url.to_string(),
                source,
            })
        }
    }
}

impl LiveServer for UserServer {
    fn kind(&self) -> &'static str {
        "user"
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
        let relative = self.relative_url_path(path)?;
        self.base_url.join(&relative).ok().map(String::from)
    }

    fn url_to_path(&self, url: &str) -> Option<PathBuf> {
        let mut url = Url::parse(url).ok()?;
        url.set_query(None);
        url.set_fragment(None);

        let relative = url.as_str().strip_prefix(self.base_url.as_str())?;
        let mut path = self.root.clone();
        for segment in relative.split('/').filter(|s| !s.is_empty()) {
            let decoded = urlencoding::decode(segment).ok()?;
            if decoded == ".." || decoded.contains('/') {
                return None;
            }
            path.push(&*decoded);
        }
        is_under(&self.root, &path).then_some(path)
    }

    fn can_serve(&self, path: &Path) -> bool {
        is_under(&self.root, path) && is_html_file_ext(path)
    }

    fn ready_to_serve(&self) -> Option<ReadyFuture> {
        if !self.probe {
            return Some(futures_util::future::ready(Ok(())).boxed());
        }
        Some(probe(self.base_url.clone()).boxed())
    }

    fn base_url(&self) -> String {
        self.base_url.to_string()
    }
}
