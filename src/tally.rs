//! Per-object line and byte counting, run on the collation pool

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::TryStreamExt;
use serde::Serialize;
use tokio::runtime::{Builder, Runtime};

use logsift_logs::{Compression, read_object_lines};
use logsift_pool::{EntryPoint, Processor};
use logsift_store::ObjectStore;

/// Name of the counting entry point
pub const TALLY: &str = "tally";

/// Counts for one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectTally {
    pub object: String,
    pub lines: u64,
    /// Bytes as stored, before decompression
    pub bytes: u64,
}

/// Worker-side processor reading objects from one container
///
/// Each worker owns a current-thread runtime to drive the async reader.
pub struct TallyProcessor {
    store: Arc<dyn ObjectStore>,
    account: String,
    container: String,
    runtime: Runtime,
}

impl TallyProcessor {
    pub fn new(store: Arc<dyn ObjectStore>, account: &str, container: &str) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to build worker runtime")?;
        Ok(Self {
            store,
            account: account.to_string(),
            container: container.to_string(),
            runtime,
        })
    }

    fn tally(&mut self, object: &String) -> Result<ObjectTally> {
        let compressed = Compression::from_name(object).is_gzip();
        self.runtime.block_on(async {
            let mut lines = read_object_lines(
                self.store.as_ref(),
                &self.account,
                &self.container,
                object,
                compressed,
            )
            .await
            .with_context(|| format!("Failed to fetch {object}"))?;

            while lines
                .try_next()
                .await
                .with_context(|| format!("Failed to read {object}"))?
                .is_some()
            {}

            Ok(ObjectTally {
                object: object.clone(),
                lines: lines.lines_read(),
                bytes: lines.bytes_read(),
            })
        })
    }
}

impl Processor for TallyProcessor {
    type Item = String;
    type Output = ObjectTally;

    fn entry_point(&self, name: &str) -> Option<EntryPoint<Self>> {
        match name {
            TALLY => Some(Self::tally),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logsift_store::{Fault, MemoryStore};

    fn processor(store: MemoryStore) -> TallyProcessor {
        TallyProcessor::new(Arc::new(store), "acct", "logs").unwrap()
    }

    #[test]
    fn test_tally_plain_object() {
        let store = MemoryStore::new().with_chunk_size(4);
        store.create_container("acct", "logs");
        store.put("acct", "logs", "a.log", "one\ntwo\nthree");

        let mut p = processor(store);
        let method = p.entry_point(TALLY).unwrap();
        let tally = method(&mut p, &"a.log".to_string()).unwrap();
        assert_eq!(
            tally,
            ObjectTally {
                object: "a.log".to_string(),
                lines: 3,
                bytes: 13,
            }
        );
    }

    #[test]
    fn test_tally_detects_gzip_by_name() {
        use flate2::{Compression as Level, write::GzEncoder};
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Level::default());
        encoder.write_all(b"a\nb\nc\nd\n").unwrap();
        let gz = encoder.finish().unwrap();
        let stored = gz.len() as u64;

        let store = MemoryStore::new();
        store.create_container("acct", "logs");
        store.put("acct", "logs", "2020/01/01/00/x.gz", gz);

        let mut p = processor(store);
        let tally = p.tally(&"2020/01/01/00/x.gz".to_string()).unwrap();
        assert_eq!(tally.lines, 4);
        assert_eq!(tally.bytes, stored);
    }

    #[test]
    fn test_tally_failures_carry_object_name() {
        let store = MemoryStore::new();
        store.create_container("acct", "logs");
        store.put("acct", "logs", "busy.log", "x\n");
        store.inject_fault("acct", "logs", "busy.log", Fault::Status(503));

        let mut p = processor(store);
        let err = p.tally(&"busy.log".to_string()).unwrap_err();
        assert!(format!("{err:#}").contains("busy.log"));
        assert!(p.tally(&"missing.log".to_string()).is_err());
    }

    #[test]
    fn test_unknown_entry_point() {
        let p = processor(MemoryStore::new());
        assert!(p.entry_point("summarize").is_none());
    }
}
