//! Live development configuration

use livedev_session::SessionOptions;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CoreError;
use crate::Result;

pub const DEFAULT_WEBSOCKET_PORT: u16 = 8125;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the database file
    pub database_path: PathBuf,
    /// Close a session whose browser has not connected after this long
    pub connect_timeout_ms: Option<u64>,
    /// Push HTML edits into the page instead of reloading on save
    pub html_live_edit: bool,
    /// Highlight default until the user changes it
    pub highlight: bool,
    /// Where the WebSocket transport listens for pages
    pub websocket_addr: SocketAddr,
    /// Check that a project's own server answers before launching
    pub probe_user_server: bool,
}

impl Config {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            database_path: data_dir.join("livedev.db"),
            connect_timeout_ms: None,
            html_live_edit: false,
            highlight: true,
            websocket_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_WEBSOCKET_PORT)),
            probe_user_server: true,
        }
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("livedev"))
            .unwrap_or_else(|| PathBuf::from(".livedev"))
    }

    /// Load from a JSON file; missing keys keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        if config.connect_timeout_ms == Some(0) {
            return Err(CoreError::Config(format!(
                "{}: connect_timeout_ms must be positive",
                path.display()
            )));
        }
        Ok(config)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            html_live_edit: self.html_live_edit,
            probe_user_server: self.probe_user_server,
            highlight: self.highlight,
            connect_timeout: self.connect_timeout_ms.map(Duration::from_millis),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::data_dir())
    }
}

// Platform data directory lookup
mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("LOCALAPPDATA").ok().map(PathBuf::from)
        }
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            None
        }
    }
}
