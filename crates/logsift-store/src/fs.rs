use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

use logsift_types::{ChunkError, ChunkStream, FetchResponse, ListingEntry, StoreError};

use crate::client::{ObjectStore, in_marker_range};

/// Default read size for object bodies
const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Object store backed by a local directory tree
///
/// Objects live at `<root>/<account>/<container>/<object>`; object names may
/// contain `/`, which maps onto nested directories.
#[derive(Clone, Debug)]
pub struct FsStore {
    root: PathBuf,
    chunk_size: usize,
    read_timeout: Option<Duration>,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            read_timeout: None,
        }
    }

    /// Read bodies in chunks of `chunk_size` bytes (minimum 1)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Fail a body read with a timeout if no chunk arrives within `timeout`
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn container_dir(&self, account: &str, container: &str) -> Option<PathBuf> {
        if !is_plain_segment(account) || !is_plain_segment(container) {
            return None;
        }
        Some(self.root.join(account).join(container))
    }
}

/// A single path component with no separators or dot-dot tricks
fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty()
        && matches!(
            Path::new(segment).components().collect::<Vec<_>>().as_slice(),
            [Component::Normal(_)]
        )
}

/// An object name made only of normal components
fn is_safe_object_name(name: &str) -> bool {
    !name.is_empty()
        && Path::new(name)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// Wrap a body so that waiting longer than `timeout` for a chunk ends it
fn with_read_timeout(body: ChunkStream, timeout: Duration) -> ChunkStream {
    futures::stream::unfold(Some(body), move |state| async move {
        let Some(mut body) = state else {
            return None;
        };
        match tokio::time::timeout(timeout, body.next()).await {
            Ok(Some(item)) => Some((item, Some(body))),
            Ok(None) => None,
            Err(_) => Some((Err(ChunkError::Timeout), None)),
        }
    })
    .boxed()
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn fetch(
        &self,
        account: &str,
        container: &str,
        object: &str,
    ) -> Result<FetchResponse, StoreError> {
        let Some(dir) = self.container_dir(account, container) else {
            return Ok(FetchResponse::status_only(400));
        };
        if !is_safe_object_name(object) {
            return Ok(FetchResponse::status_only(400));
        }

        let path = dir.join(object);
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "object not found");
                return Ok(FetchResponse::status_only(404));
            }
            Err(e) => return Err(StoreError::Io(e)),
        };
        if file.metadata().await?.is_dir() {
            return Ok(FetchResponse::status_only(404));
        }

        let mut body = ReaderStream::with_capacity(file, self.chunk_size)
            .map_err(ChunkError::from)
            .boxed();
        if let Some(timeout) = self.read_timeout {
            body = with_read_timeout(body, timeout);
        }

        Ok(FetchResponse::new(200, body))
    }

    async fn list(
        &self,
        account: &str,
        container: &str,
        marker: Option<&str>,
        end_marker: Option<&str>,
    ) -> Result<Vec<ListingEntry>, StoreError> {
        let not_found = || StoreError::ContainerNotFound {
            account: account.to_string(),
            container: container.to_string(),
        };
        let dir = self.container_dir(account, container).ok_or_else(not_found)?;
        if !tokio::fs::try_exists(&dir).await? {
            return Err(not_found());
        }

        let mut entries = Vec::new();
        let mut pending = vec![(dir, String::new())];

        while let Some((dir, prefix)) = pending.pop() {
            let mut read_dir = tokio::fs::read_dir(&dir).await?;
            while let Some(dirent) = read_dir.next_entry().await? {
                let file_name = dirent.file_name().to_string_lossy().into_owned();
                let name = if prefix.is_empty() {
                    file_name
                } else {
                    format!("{prefix}/{file_name}")
                };

                let metadata = dirent.metadata().await?;
                if metadata.is_dir() {
                    pending.push((dirent.path(), name));
                    continue;
                }
                if !in_marker_range(&name, marker, end_marker) {
                    continue;
                }

                let mut entry = ListingEntry::new(name, metadata.len());
                if let Ok(modified) = metadata.modified() {
                    entry = entry.with_last_modified(DateTime::<Utc>::from(modified));
                }
                entries.push(entry);
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
