//! Object store access for logsift
//!
//! This crate defines the narrow interface logsift needs from a remote object
//! store (fetch one object, list one container) and ships two implementations:
//! an in-memory store with fault injection and a directory-backed store.

mod client;
mod fs;
mod memory;

pub use client::ObjectStore;
pub use fs::FsStore;
pub use memory::{Fault, MemoryStore};

// Re-export types that are used in our public API
pub use logsift_types::{
    ChunkError, ChunkStream, FetchResponse, ListingEntry, ObjectPath, StoreError,
};
