//! Live Development storage layer
//!
//! SQLite-backed persistence for the few pieces of live development state
//! that outlive a session: global preferences (such as live highlighting)
//! and the per-project base URL used when the project runs its own server.

mod database;
mod error;
mod migrations;
mod project;

pub use database::Database;
pub use error::StorageError;
pub use project::ProjectSettings;

pub type Result<T> = std::result::Result<T, StorageError>;
