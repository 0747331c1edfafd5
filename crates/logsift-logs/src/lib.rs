//! Log object processing for logsift
//!
//! This crate turns remote log objects into lines (with optional gzip
//! decompression) and selects objects out of a container listing by
//! date-hour window.

mod error;
mod listing;
mod reader;

pub use error::DownloadError;
pub use listing::{DateHour, ListingWindow, container_listing};
pub use reader::{Compression, DecompressionSession, ObjectLines, read_object_lines};

// Re-export types used in our public API
pub use logsift_types::{ChunkError, ObjectPath, StoreError};
