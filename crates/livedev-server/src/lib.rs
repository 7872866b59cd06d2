//! Live Development servers
//!
//! A server decides which project files can be previewed and at which URL.
//! It also keeps the live documents it serves, keyed by path, so a host
//! that serves page bodies itself can look up the instrumented markup.

mod error;
mod file_ext;
mod file_server;
mod manager;
mod server;
mod user_server;

pub use error::ServerError;
pub use file_ext::{is_html_file_ext, is_server_html_file_ext, is_static_html_file_ext};
pub use file_server::FileServer;
pub use manager::{ServerConfig, ServerFactory, ServerManager, FILE_SERVER_PRIORITY, USER_SERVER_PRIORITY};
pub use server::{DocumentRegistry, LiveServer, ReadyFuture, SharedServer};
pub use user_server::UserServer;

pub type Result<T> = std::result::Result<T, ServerError>;
