use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::RwLock;

use logsift_types::{ChunkError, FetchResponse, ListingEntry, StoreError};

use crate::client::{ObjectStore, in_marker_range};

/// Default size of the chunks an object body is split into
const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// A failure to replay when an object is fetched
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Answer the fetch with this status and no body
    Status(u16),

    /// Deliver this many chunks, then fail with a read timeout
    TimeoutAfter(usize),
}

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    fault: Option<Fault>,
}

type ContainerKey = (String, String);

/// In-memory object store
///
/// Cheap to clone; clones share the same objects. Bodies are served in fixed
/// size chunks so readers see realistic chunk boundaries.
#[derive(Clone)]
pub struct MemoryStore {
    containers: Arc<RwLock<HashMap<ContainerKey, BTreeMap<String, StoredObject>>>>,
    chunk_size: usize,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            containers: Arc::new(RwLock::new(HashMap::new())),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Serve bodies in chunks of `chunk_size` bytes (minimum 1)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Create an empty container (no-op if it exists)
    pub fn create_container(&self, account: &str, container: &str) {
        self.containers
            .write()
            .entry((account.to_string(), container.to_string()))
            .or_default();
    }

    /// Store an object, creating its container on demand
    pub fn put(&self, account: &str, container: &str, name: &str, data: impl Into<Bytes>) {
        self.containers
            .write()
            .entry((account.to_string(), container.to_string()))
            .or_default()
            .insert(
                name.to_string(),
                StoredObject {
                    data: data.into(),
                    fault: None,
                },
            );
    }

    /// Make every later fetch of an existing object fail as described
    pub fn inject_fault(&self, account: &str, container: &str, name: &str, fault: Fault) {
        let mut containers = self.containers.write();
        if let Some(object) = containers
            .get_mut(&(account.to_string(), container.to_string()))
            .and_then(|objects| objects.get_mut(name))
        {
            object.fault = Some(fault);
        }
    }

    fn chunks(&self, data: &Bytes) -> Vec<Bytes> {
        (0..data.len())
            .step_by(self.chunk_size)
            .map(|start| data.slice(start..(start + self.chunk_size).min(data.len())))
            .collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn fetch(
        &self,
        account: &str,
        container: &str,
        object: &str,
    ) -> Result<FetchResponse, StoreError> {
        let stored = self
            .containers
            .read()
            .get(&(account.to_string(), container.to_string()))
            .and_then(|objects| objects.get(object))
            .cloned();

        let Some(stored) = stored else {
            return Ok(FetchResponse::status_only(404));
        };

        let mut body: Vec<Result<Bytes, ChunkError>> =
            self.chunks(&stored.data).into_iter().map(Ok).collect();

        match stored.fault {
            Some(Fault::Status(status)) => return Ok(FetchResponse::status_only(status)),
            Some(Fault::TimeoutAfter(delivered)) => {
                body.truncate(delivered);
                body.push(Err(ChunkError::Timeout));
            }
            None => {}
        }

        Ok(FetchResponse::new(200, futures::stream::iter(body).boxed()))
    }

    async fn list(
        &self,
        account: &str,
        container: &str,
        marker: Option<&str>,
        end_marker: Option<&str>,
    ) -> Result<Vec<ListingEntry>, StoreError> {
        let containers = self.containers.read();
        let objects = containers
            .get(&(account.to_string(), container.to_string()))
            .ok_or_else(|| StoreError::ContainerNotFound {
                account: account.to_string(),
                container: container.to_string(),
            })?;

        Ok(objects
            .iter()
            .filter(|(name, _)| in_marker_range(name, marker, end_marker))
            .map(|(name, object)| ListingEntry::new(name.clone(), object.data.len() as u64))
            .collect())
    }
}
