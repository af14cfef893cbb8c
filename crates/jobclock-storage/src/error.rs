use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MirrorError {
    /// The mirror file is missing or could not be opened (locked, unreadable).
    #[error("mirror unavailable at {}: {reason}", .path.display())]
    Unavailable { path: PathBuf, reason: String },
    #[error("mirror backend error: {0}")]
    Backend(String),
}

impl MirrorError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, MirrorError::Unavailable { .. })
    }
}

pub type MirrorResult<T> = Result<T, MirrorError>;
