//! Document error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("No live document type for {0}")]
    Unsupported(PathBuf),

    #[error("Position {line}:{ch} is outside the document")]
    PositionOutOfRange { line: u32, ch: u32 },
}
