use thiserror::Error;

/// Result type alias for dispatch operations
pub type Result<T, E = DispatchError> = std::result::Result<T, E>;

/// Errors raised while querying or archiving a workspace
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("invalid pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        source: globset::Error,
    },

    #[error("failed to walk workspace: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkspaceError {
    /// True when the archive stream was closed by its reader. The producer
    /// fails this way whenever the upload side gave up first.
    pub fn is_stream_closed(&self) -> bool {
        match self {
            WorkspaceError::Io(e) => e.kind() == std::io::ErrorKind::BrokenPipe,
            WorkspaceError::Zip(zip::result::ZipError::Io(e)) => {
                e.kind() == std::io::ErrorKind::BrokenPipe
            }
            _ => false,
        }
    }
}

/// Errors that can fail a single report category. None of these escape
/// `dispatch`: each one is folded into that category's result.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("could not list workspace files: {0}")]
    Enumeration(#[source] WorkspaceError),

    #[error("could not archive report files: {0}")]
    Archive(#[source] WorkspaceError),

    #[error("could not reach the service: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service responded with HTTP {status}: {body}")]
    Service { status: u16, body: String },

    #[error("dispatch task failed: {0}")]
    Task(String),
}

impl DispatchError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            DispatchError::Service { status, .. } => Some(*status),
            _ => None,
        }
    }
}
