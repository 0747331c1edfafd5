//! Shared types for logsift
//!
//! This crate contains data structures used across multiple logsift crates.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Object Store Types
// ============================================================================

/// Fully-qualified location of one object in the remote store
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectPath {
    pub account: String,
    pub container: String,
    pub object: String,
}

impl ObjectPath {
    pub fn new(
        account: impl Into<String>,
        container: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            container: container.into(),
            object: object.into(),
        }
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.account, self.container, self.object)
    }
}

/// One row of a container listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    /// Object name within the container
    pub name: String,

    /// Object size in bytes (as stored, i.e. compressed size for .gz objects)
    pub bytes: u64,

    /// Last modification time, if the store reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl ListingEntry {
    pub fn new(name: impl Into<String>, bytes: u64) -> Self {
        Self {
            name: name.into(),
            bytes,
            last_modified: None,
        }
    }

    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(last_modified);
        self
    }
}

/// Stream of raw body chunks as they arrive from the store
pub type ChunkStream = BoxStream<'static, Result<Bytes, ChunkError>>;

/// Response to an object fetch: an HTTP-like status plus the body stream
pub struct FetchResponse {
    pub status: u16,
    pub body: ChunkStream,
}

impl FetchResponse {
    pub fn new(status: u16, body: ChunkStream) -> Self {
        Self { status, body }
    }

    /// Build a bodiless response carrying only a status (404, 503, ...)
    pub fn status_only(status: u16) -> Self {
        Self {
            status,
            body: Box::pin(futures::stream::empty()),
        }
    }

    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Failure while pulling the next chunk off an object body
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("timed out waiting for the next chunk")]
    Timeout,

    #[error("chunk read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a store call itself (as opposed to a non-2xx status)
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("container {account}/{container} not found")]
    ContainerNotFound { account: String, container: String },

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}
