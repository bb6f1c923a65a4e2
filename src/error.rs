use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("unknown view: {0}")]
    UnknownView(String),

    #[error("unknown sort order: {0}")]
    UnknownOrder(String),

    #[error("id/path maps diverged for id {id} at {path}")]
    Inconsistent { id: String, path: PathBuf },

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;
