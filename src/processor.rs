//! High-level entry points for log processing runs

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{Instrument, info, info_span};

use logsift_logs::{DownloadError, ObjectLines, StoreError, container_listing, read_object_lines};
use logsift_pool::{Collation, PoolError, Processor, collate};
use logsift_store::ObjectStore;

use crate::config::ProcessorConfig;
use crate::tally::{ObjectTally, TALLY, TallyProcessor};

/// Ties an object store to the processing settings of one run
#[derive(Clone)]
pub struct LogProcessor {
    store: Arc<dyn ObjectStore>,
    config: ProcessorConfig,
}

/// Outcome of tallying a window of objects
#[derive(Debug, Default)]
pub struct TallyReport {
    /// Completed tallies, in completion order
    pub tallies: Vec<ObjectTally>,
    /// Objects whose tally failed and was skipped
    pub failed: usize,
}

impl LogProcessor {
    pub fn new(store: Arc<dyn ObjectStore>, config: ProcessorConfig) -> Self {
        Self { store, config }
    }

    /// Stream the lines of one object
    pub async fn get_object_data(
        &self,
        account: &str,
        container: &str,
        object: &str,
        compressed: bool,
    ) -> Result<ObjectLines, DownloadError> {
        read_object_lines(self.store.as_ref(), account, container, object, compressed).await
    }

    /// Names in `container` inside the `YYYYMMDDHH` window, minus `exclusions`
    pub async fn get_container_listing(
        &self,
        account: &str,
        container: &str,
        start: Option<&str>,
        end: Option<&str>,
        exclusions: Option<&HashSet<String>>,
    ) -> Result<Vec<String>, StoreError> {
        let empty = HashSet::new();
        container_listing(
            self.store.as_ref(),
            account,
            container,
            start,
            end,
            exclusions.unwrap_or(&empty),
        )
        .await
    }

    /// Fan `items` out over the configured worker pool
    pub fn collate<P, F, I>(
        &self,
        factory: F,
        entry_point: &str,
        items: I,
    ) -> Result<Collation<P::Item, P::Output>, PoolError>
    where
        P: Processor + 'static,
        P::Item: Debug + Send + 'static,
        P::Output: Send + 'static,
        F: Fn() -> anyhow::Result<P> + Send + Sync + 'static,
        I: IntoIterator<Item = P::Item>,
    {
        collate(factory, entry_point, items, self.config.collate_options())
    }

    /// List a window of objects and count the lines and bytes of each
    pub async fn tally_window(
        &self,
        account: &str,
        container: &str,
        start: Option<&str>,
        end: Option<&str>,
        exclusions: Option<&HashSet<String>>,
    ) -> Result<TallyReport> {
        let span = info_span!("log_processor", route = %self.config.log_route, account, container);

        async {
            let names = self
                .get_container_listing(account, container, start, end, exclusions)
                .await
                .with_context(|| format!("Failed to list {account}/{container}"))?;
            info!(objects = names.len(), workers = self.config.worker_count, "tallying window");

            let store = Arc::clone(&self.store);
            let (account, container) = (account.to_string(), container.to_string());
            let collation = self.collate(
                move || TallyProcessor::new(Arc::clone(&store), &account, &container),
                TALLY,
                names,
            )?;

            // The collector blocks between polls
            let span = tracing::Span::current();
            let report = tokio::task::spawn_blocking(move || {
                let _entered = span.enter();
                let mut collation = collation;
                let tallies: Vec<ObjectTally> = collation.by_ref().map(|(_, tally)| tally).collect();
                TallyReport {
                    tallies,
                    failed: collation.failed(),
                }
            })
            .await
            .context("Collector task failed")?;

            info!(completed = report.tallies.len(), failed = report.failed, "tally complete");
            Ok(report)
        }
        .instrument(span)
        .await
    }
}
