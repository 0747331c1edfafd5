use std::collections::VecDeque;
use std::io::{self, Write};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use flate2::write::GzDecoder;
use futures::stream::{FusedStream, Stream, StreamExt};
use tracing::{debug, warn};

use logsift_store::ObjectStore;
use logsift_types::{ChunkStream, ObjectPath};

use crate::error::DownloadError;

/// Compression applied to a stored log object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
}

impl Compression {
    /// Detect compression from an object name
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".gz") || lower.ends_with(".gzip") {
            Compression::Gzip
        } else {
            Compression::None
        }
    }

    pub fn is_gzip(self) -> bool {
        self == Compression::Gzip
    }
}

/// Per-object line reassembly state
///
/// Holds the streaming gzip decoder (when the object is compressed) and the
/// bytes of the trailing line fragment seen so far. The fragment never
/// contains a newline.
pub struct DecompressionSession {
    decoder: Option<GzDecoder<Vec<u8>>>,
    carry: Vec<u8>,
    /// Any compressed input at all has been written to the decoder
    started: bool,
    /// The gzip member ended and its trailer checked out
    stream_ended: bool,
    failed: bool,
}

fn already_failed() -> DownloadError {
    DownloadError::Decompress(io::Error::new(
        io::ErrorKind::InvalidData,
        "decompression already failed",
    ))
}

impl DecompressionSession {
    pub fn new(compressed: bool) -> Self {
        Self {
            decoder: compressed.then(|| GzDecoder::new(Vec::new())),
            carry: Vec::new(),
            started: false,
            stream_ended: false,
            failed: false,
        }
    }

    /// Feed one raw chunk, returning every line it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<String>, DownloadError> {
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(split_lines(&mut self.carry, chunk));
        };
        if self.failed {
            return Err(already_failed());
        }
        if self.stream_ended || chunk.is_empty() {
            return Ok(Vec::new());
        }
        self.started = true;

        let mut input = chunk;
        let mut reached_end = false;
        while !input.is_empty() {
            match decoder.write(input) {
                Ok(0) => {
                    // Anything after the end of the gzip member is ignored
                    debug!(ignored = input.len(), "data after end of gzip stream");
                    reached_end = true;
                    break;
                }
                Ok(written) => input = &input[written..],
                Err(e) => {
                    self.failed = true;
                    return Err(DownloadError::Decompress(e));
                }
            }
        }

        // try_finish checks the CRC32 and size trailer; flush does not
        let settled = if reached_end {
            decoder.try_finish()
        } else {
            decoder.flush()
        };
        if let Err(e) = settled {
            self.failed = true;
            return Err(DownloadError::Decompress(e));
        }
        self.stream_ended = reached_end;

        let inflated = std::mem::take(decoder.get_mut());
        Ok(split_lines(&mut self.carry, &inflated))
    }

    /// End of input: verify the gzip trailer and return the remaining lines
    ///
    /// A compressed object that stops before its trailer, or whose trailer
    /// does not match the inflated data, fails here. An object with no
    /// bytes at all is empty, not truncated.
    pub fn finish(&mut self) -> Result<Vec<String>, DownloadError> {
        if self.failed {
            return Err(already_failed());
        }

        let mut lines = Vec::new();
        if let Some(decoder) = self.decoder.as_mut() {
            if self.started && !self.stream_ended {
                if let Err(e) = decoder.try_finish() {
                    self.failed = true;
                    return Err(DownloadError::Decompress(e));
                }
                self.stream_ended = true;
                let inflated = std::mem::take(decoder.get_mut());
                lines = split_lines(&mut self.carry, &inflated);
            }
        }

        if !self.carry.is_empty() {
            let last = std::mem::take(&mut self.carry);
            lines.push(String::from_utf8_lossy(&last).into_owned());
        }
        Ok(lines)
    }
}

/// Split `data` on newlines, prefixing the first piece with `carry` and
/// leaving the unterminated tail in `carry`
fn split_lines(carry: &mut Vec<u8>, data: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut rest = data;

    while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
        carry.extend_from_slice(&rest[..pos]);
        lines.push(String::from_utf8_lossy(carry).into_owned());
        carry.clear();
        rest = &rest[pos + 1..];
    }
    carry.extend_from_slice(rest);

    lines
}

/// Lines of one remote object, produced as its chunks arrive
///
/// Yields `Ok(line)` with the newline stripped. The first `Err` ends the
/// stream; nothing after the failing chunk is produced.
pub struct ObjectLines {
    path: ObjectPath,
    body: Option<ChunkStream>,
    session: DecompressionSession,
    ready: VecDeque<String>,
    bytes_read: u64,
    lines_read: u64,
}

impl ObjectLines {
    pub fn new(path: ObjectPath, body: ChunkStream, compressed: bool) -> Self {
        Self {
            path,
            body: Some(body),
            session: DecompressionSession::new(compressed),
            ready: VecDeque::new(),
            bytes_read: 0,
            lines_read: 0,
        }
    }

    /// Raw (possibly compressed) bytes pulled from the store so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Lines handed out so far
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    fn emit(&mut self, line: String) -> Poll<Option<Result<String, DownloadError>>> {
        self.lines_read += 1;
        Poll::Ready(Some(Ok(line)))
    }
}

impl Stream for ObjectLines {
    type Item = Result<String, DownloadError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if let Some(line) = this.ready.pop_front() {
                return this.emit(line);
            }
            let Some(body) = this.body.as_mut() else {
                return Poll::Ready(None);
            };

            match ready!(body.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => {
                    this.bytes_read += chunk.len() as u64;
                    match this.session.feed(&chunk) {
                        Ok(lines) => this.ready.extend(lines),
                        Err(e) => {
                            debug!(object = %this.path, error = %e, "bad compressed data");
                            this.body = None;
                            return Poll::Ready(Some(Err(e)));
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!(object = %this.path, error = %e, "object read failed");
                    this.body = None;
                    return Poll::Ready(Some(Err(DownloadError::Read(e))));
                }
                None => {
                    this.body = None;
                    match this.session.finish() {
                        Ok(lines) => this.ready.extend(lines),
                        Err(e) => {
                            debug!(object = %this.path, error = %e, "bad compressed data");
                            return Poll::Ready(Some(Err(e)));
                        }
                    }
                }
            }
        }
    }
}

impl FusedStream for ObjectLines {
    fn is_terminated(&self) -> bool {
        self.body.is_none() && self.ready.is_empty()
    }
}

/// Fetch an object and stream its lines
///
/// Statuses outside `[200, 300)` fail with `DownloadError::BadStatus`.
pub async fn read_object_lines<S: ObjectStore + ?Sized>(
    store: &S,
    account: &str,
    container: &str,
    object: &str,
    compressed: bool,
) -> Result<ObjectLines, DownloadError> {
    let path = ObjectPath::new(account, container, object);
    let response = store.fetch(account, container, object).await?;

    if !response.is_success() {
        debug!(object = %path, status = response.status, "object fetch rejected");
        return Err(DownloadError::BadStatus(response.status));
    }

    Ok(ObjectLines::new(path, response.body, compressed))
}
