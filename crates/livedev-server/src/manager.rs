//! Server selection
//!
//! Providers are tried from highest to lowest priority. The first one that
//! produces a server able to serve the requested path wins.

use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::file_server::FileServer;
use crate::server::SharedServer;
use crate::user_server::UserServer;

pub const FILE_SERVER_PRIORITY: i32 = 0;
pub const USER_SERVER_PRIORITY: i32 = 99;

/// What a provider needs to build a server for one project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub root: PathBuf,
    pub base_url: Option<String>,
    /// Check that a user server answers before opening the browser
    pub probe: bool,
}

pub type ServerFactory = Arc<dyn Fn(&ServerConfig) -> Option<SharedServer> + Send + Sync>;

struct Provider {
    name: String,
    priority: i32,
    create: ServerFactory,
}

#[derive(Clone, Default)]
pub struct ServerManager {
    providers: Arc<RwLock<Vec<Provider>>>,
}

impl ServerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// File server plus, when the project has a base URL, the user server
    pub fn with_defaults() -> Self {
        let manager = Self::new();

        manager.register(
            "file",
            FILE_SERVER_PRIORITY,
            Arc::new(|config: &ServerConfig| {
                Some(Arc::new(FileServer::new(config.root.clone())) as SharedServer)
            }),
        );

        manager.register(
            "user",
            USER_SERVER_PRIORITY,
            Arc::new(|config: &ServerConfig| {
                let base_url = config.base_url.as_deref()?;
                match UserServer::new(config.root.clone(), base_url, config.probe) {
                    Ok(server) => Some(Arc::new(server) as SharedServer),
                    Err(e) => {
                        tracing::warn!(base_url, error = %e, "Ignoring unusable base URL");
                        None
                    }
                }
            }),
        );

        manager
    }

    /// Register a provider, replacing any with the same name
    pub fn register(&self, name: impl Into<String>, priority: i32, create: ServerFactory) {
        let name = name.into();
        let mut providers = self.providers.write();
        providers.retain(|p| p.name != name);
        providers.push(Provider {
            name,
            priority,
            create,
        });
        // Highest priority first; equal priorities keep registration order
        providers.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    pub fn unregister(&self, name: &str) {
        self.providers.write().retain(|p| p.name != name);
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers
            .read()
            .iter()
            .map(|p| p.name.clone())
            .collect()
    }

    pub fn get_server(&self, path: &Path, config: &ServerConfig) -> Option<SharedServer> {
        let factories: Vec<(String, ServerFactory)> = self
            .providers
            .read()
            .iter()
            .map(|p| (p.name.clone(), Arc::clone(&p.create)))
            .collect();

        for (name, create) in factories {
            if let Some(server) = create(config) {
                if server.can_serve(path) {
                    tracing::debug!(provider = %name, path = %path.display(), "Selected server");
                    return Some(server);
                }
            }
        }

        None
    }
}
