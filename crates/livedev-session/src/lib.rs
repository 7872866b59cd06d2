//! Live Development session
//!
//! The session ties the pieces together:
//! - picks the page to preview and a server for it
//! - launches the browser and tracks its connections
//! - relays editor edits to live documents
//! - reports status changes to the host

mod error;
mod host;
mod launcher;
mod manager;
mod resolve;
mod status;

pub use error::SessionError;
pub use host::{Dialogs, HostEvent, Launcher, SetupFailure, Workspace};
pub use launcher::SystemLauncher;
pub use manager::{SessionManager, SessionOptions, HIGHLIGHT_SETTING};
pub use resolve::find_index_file;
pub use status::{CloseReason, LiveStatus, StatusChange};

pub type Result<T> = std::result::Result<T, SessionError>;
