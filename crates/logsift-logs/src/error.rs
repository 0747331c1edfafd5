use logsift_types::{ChunkError, StoreError};

/// Reading an object's lines failed
///
/// Every variant ends the affected object's line stream.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("object fetch returned status {0}")]
    BadStatus(u16),

    #[error("object read failed: {0}")]
    Read(#[from] ChunkError),

    #[error("bad compressed data: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("object fetch failed: {0}")]
    Store(#[from] StoreError),
}

impl DownloadError {
    /// HTTP-like status of the failed fetch, where one is known
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::BadStatus(status) => Some(*status),
            _ => None,
        }
    }
}
