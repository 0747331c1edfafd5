use std::any::Any;
use std::fmt::Debug;
use std::iter::FusedIterator;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use tracing::{debug, error, warn};

use crate::error::{Outcome, PoolError, ProcessingFailure};
use crate::processor::{EntryPoint, Processor};

/// Sleep between empty polls of the result channel
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Tuning for a collation run
#[derive(Clone, Debug)]
pub struct CollateOptions {
    /// Number of worker threads (at least 1)
    pub workers: usize,

    /// How long the collector sleeps when no result is ready
    pub poll_interval: Duration,

    /// Catch panics in the entry point and report them as failures
    ///
    /// Off by default: a panic ends that worker and its in-flight item is
    /// lost, while the remaining workers carry on.
    pub recover_panics: bool,
}

impl CollateOptions {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_recover_panics(mut self, recover_panics: bool) -> Self {
        self.recover_panics = recover_panics;
        self
    }
}

impl Default for CollateOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            poll_interval: DEFAULT_POLL_INTERVAL,
            recover_panics: false,
        }
    }
}

/// Message on the work channel
enum Dispatch<T> {
    Work(T),
    Stop,
}

/// Run `entry_point` over every item on `options.workers` threads
///
/// Every worker builds its own processor with `factory`. All items are queued
/// up front, followed by one stop sentinel per worker. The returned
/// [`Collation`] yields `(item, output)` pairs as they complete; failed
/// invocations are logged and skipped.
pub fn collate<P, F, I>(
    factory: F,
    entry_point: &str,
    items: I,
    options: CollateOptions,
) -> Result<Collation<P::Item, P::Output>, PoolError>
where
    P: Processor + 'static,
    P::Item: Debug + Send + 'static,
    P::Output: Send + 'static,
    F: Fn() -> anyhow::Result<P> + Send + Sync + 'static,
    I: IntoIterator<Item = P::Item>,
{
    if options.workers == 0 {
        return Err(PoolError::NoWorkers);
    }

    let (work_tx, work_rx) = unbounded::<Dispatch<P::Item>>();
    let (result_tx, result_rx) = unbounded();
    let factory = Arc::new(factory);
    let entry_point: Arc<str> = Arc::from(entry_point);

    let mut workers = Vec::with_capacity(options.workers);
    for id in 0..options.workers {
        let factory = Arc::clone(&factory);
        let entry_point = Arc::clone(&entry_point);
        let work_rx = work_rx.clone();
        let result_tx = result_tx.clone();
        let recover_panics = options.recover_panics;

        let handle = thread::Builder::new()
            .name(format!("collate-{id}"))
            .spawn(move || {
                worker_loop::<P, F>(
                    id,
                    &*factory,
                    &entry_point,
                    work_rx,
                    result_tx,
                    recover_panics,
                )
            })
            .map_err(|source| PoolError::Spawn { id, source })?;
        workers.push(handle);
    }
    drop(result_tx);

    let mut queued = 0usize;
    for item in items {
        // Unbounded, and `work_rx` is still alive here, so this cannot fail
        let _ = work_tx.send(Dispatch::Work(item));
        queued += 1;
    }
    for _ in 0..options.workers {
        let _ = work_tx.send(Dispatch::Stop);
    }
    debug!(
        entry_point = &*entry_point,
        workers = options.workers,
        queued,
        "work dispatched"
    );

    Ok(Collation {
        results: result_rx,
        workers,
        poll_interval: options.poll_interval,
        yielded: 0,
        failed: 0,
        done: false,
    })
}

fn worker_loop<P, F>(
    id: usize,
    factory: &F,
    entry_point: &str,
    work_rx: Receiver<Dispatch<P::Item>>,
    result_tx: Sender<(P::Item, Outcome<P::Output>)>,
    recover_panics: bool,
) where
    P: Processor,
    F: Fn() -> anyhow::Result<P>,
{
    let mut processor = match factory() {
        Ok(processor) => processor,
        Err(e) => {
            let reason = format!("{e:#}");
            error!(worker = id, error = %reason, "failed to build processor, worker exiting");
            return;
        }
    };

    let mut processed = 0usize;
    while let Ok(Dispatch::Work(item)) = work_rx.recv() {
        let Some(method) = processor.entry_point(entry_point) else {
            warn!(worker = id, entry_point, "processor has no such entry point, worker exiting");
            return;
        };

        let outcome = invoke(&mut processor, method, &item, recover_panics);
        if result_tx.send((item, outcome)).is_err() {
            debug!(worker = id, "collation dropped, worker exiting");
            return;
        }
        processed += 1;
    }

    debug!(worker = id, processed, "worker finished");
}

fn invoke<P: Processor>(
    processor: &mut P,
    method: EntryPoint<P>,
    item: &P::Item,
    recover_panics: bool,
) -> Outcome<P::Output> {
    if !recover_panics {
        return method(processor, item).map_err(|e| ProcessingFailure::error(&e));
    }

    match panic::catch_unwind(AssertUnwindSafe(|| method(processor, item))) {
        Ok(result) => result.map_err(|e| ProcessingFailure::error(&e)),
        Err(payload) => Err(ProcessingFailure::panic(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Results of a running collation, in completion order
///
/// Iterating yields successful `(item, output)` pairs and logs failures.
/// Iteration ends once every worker has exited and no result is left.
/// Dropping it early makes each worker stop after its current item.
pub struct Collation<T, O> {
    results: Receiver<(T, Outcome<O>)>,
    workers: Vec<JoinHandle<()>>,
    poll_interval: Duration,
    yielded: usize,
    failed: usize,
    done: bool,
}

impl<T: Debug, O> Collation<T, O> {
    /// Successful outcomes handed out so far
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Failed outcomes logged so far
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Iterate every outcome, failures included, without logging them
    pub fn into_outcomes(self) -> Outcomes<T, O> {
        Outcomes { inner: self }
    }

    fn next_outcome(&mut self) -> Option<(T, Outcome<O>)> {
        while !self.done {
            match self.results.try_recv() {
                Ok(pair) => return Some(pair),
                Err(TryRecvError::Empty) => {
                    let all_exited = self.workers.iter().all(JoinHandle::is_finished);
                    if all_exited && self.results.is_empty() {
                        self.finish();
                    } else {
                        thread::sleep(self.poll_interval);
                    }
                }
                Err(TryRecvError::Disconnected) => self.finish(),
            }
        }
        None
    }

    fn finish(&mut self) {
        for (id, handle) in self.workers.drain(..).enumerate() {
            if handle.join().is_err() {
                warn!(worker = id, "worker crashed, its in-flight item was lost");
            }
        }
        self.done = true;
        debug!(
            yielded = self.yielded,
            failed = self.failed,
            "collation finished"
        );
    }
}

impl<T: Debug, O> Iterator for Collation<T, O> {
    type Item = (T, O);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((item, outcome)) = self.next_outcome() {
            match outcome {
                Ok(output) => {
                    self.yielded += 1;
                    return Some((item, output));
                }
                Err(failure) => {
                    self.failed += 1;
                    error!(item = ?item, kind = %failure.kind, "processing failed: {}", failure.message);
                }
            }
        }
        None
    }
}

impl<T: Debug, O> FusedIterator for Collation<T, O> {}

/// Every outcome of a collation, failures included
pub struct Outcomes<T, O> {
    inner: Collation<T, O>,
}

impl<T: Debug, O> Iterator for Outcomes<T, O> {
    type Item = (T, Outcome<O>);

    fn next(&mut self) -> Option<Self::Item> {
        let (item, outcome) = self.inner.next_outcome()?;
        match &outcome {
            Ok(_) => self.inner.yielded += 1,
            Err(_) => self.inner.failed += 1,
        }
        Some((item, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Positional work item: (index, multiplier)
    type Args = (u32, u32);

    #[derive(Default)]
    struct Multiplier {
        calls: usize,
    }

    impl Multiplier {
        fn multiply(&mut self, item: &Args) -> anyhow::Result<u32> {
            self.calls += 1;
            Ok(item.0 * item.1)
        }

        fn fail_on_five(&mut self, item: &Args) -> anyhow::Result<u32> {
            if item.0 == 5 {
                anyhow::bail!("item five is cursed");
            }
            self.multiply(item)
        }

        fn panic_on_five(&mut self, item: &Args) -> anyhow::Result<u32> {
            if item.0 == 5 {
                panic!("worker blew up on five");
            }
            self.multiply(item)
        }

        fn count_calls(&mut self, _item: &Args) -> anyhow::Result<u32> {
            self.calls += 1;
            Ok(self.calls as u32)
        }
    }

    impl Processor for Multiplier {
        type Item = Args;
        type Output = u32;

        fn entry_point(&self, name: &str) -> Option<EntryPoint<Self>> {
            let method: EntryPoint<Self> = match name {
                "multiply" => Self::multiply,
                "fail_on_five" => Self::fail_on_five,
                "panic_on_five" => Self::panic_on_five,
                "count_calls" => Self::count_calls,
                _ => return None,
            };
            Some(method)
        }
    }

    fn items() -> Vec<Args> {
        (1..=10).map(|i| (i, 3)).collect()
    }

    fn fast(workers: usize) -> CollateOptions {
        CollateOptions::new(workers).with_poll_interval(Duration::from_millis(1))
    }

    #[test]
    fn test_every_item_exactly_once() {
        let collation =
            collate(|| Ok(Multiplier::default()), "multiply", items(), fast(3)).unwrap();

        let mut results: Vec<(Args, u32)> = collation.collect();
        results.sort();
        assert_eq!(results.len(), 10);
        for (i, ((index, factor), product)) in results.into_iter().enumerate() {
            assert_eq!(index, i as u32 + 1);
            assert_eq!(product, index * factor);
        }
    }

    #[test]
    fn test_failed_item_is_logged_and_skipped() {
        let mut collation =
            collate(|| Ok(Multiplier::default()), "fail_on_five", items(), fast(3)).unwrap();

        let mut indexes: Vec<u32> = collation.by_ref().map(|((index, _), _)| index).collect();
        indexes.sort();
        assert_eq!(indexes, vec![1, 2, 3, 4, 6, 7, 8, 9, 10]);
        assert_eq!(collation.yielded(), 9);
        assert_eq!(collation.failed(), 1);
    }

    #[test]
    fn test_outcomes_expose_failures() {
        let collation =
            collate(|| Ok(Multiplier::default()), "fail_on_five", items(), fast(2)).unwrap();

        let failures: Vec<(Args, ProcessingFailure)> = collation
            .into_outcomes()
            .filter_map(|(item, outcome)| outcome.err().map(|f| (item, f)))
            .collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, (5, 3));
        assert_eq!(failures[0].1.kind, FailureKind::Error);
        assert!(failures[0].1.message.contains("cursed"));
    }

    #[test]
    fn test_missing_entry_point_yields_nothing() {
        let collation =
            collate(|| Ok(Multiplier::default()), "no_such_method", items(), fast(3)).unwrap();
        assert_eq!(collation.count(), 0);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = collate(|| Ok(Multiplier::default()), "multiply", items(), fast(0));
        assert!(matches!(result, Err(PoolError::NoWorkers)));
    }

    #[test]
    fn test_empty_input_terminates() {
        let collation =
            collate(|| Ok(Multiplier::default()), "multiply", Vec::new(), fast(4)).unwrap();
        assert_eq!(collation.count(), 0);
    }

    #[test]
    fn test_failed_construction_only_loses_that_worker() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let factory = move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("no processor for you");
            }
            Ok(Multiplier::default())
        };

        let collation = collate(factory, "multiply", items(), fast(3)).unwrap();
        assert_eq!(collation.count(), 10);
        assert_eq!(built.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_all_constructions_failing_terminates() {
        let factory = || -> anyhow::Result<Multiplier> { anyhow::bail!("broken") };
        let collation = collate(factory, "multiply", items(), fast(2)).unwrap();
        assert_eq!(collation.count(), 0);
    }

    #[test]
    fn test_worker_crash_loses_only_its_item() {
        let collation =
            collate(|| Ok(Multiplier::default()), "panic_on_five", items(), fast(3)).unwrap();

        let mut indexes: Vec<u32> = collation.map(|((index, _), _)| index).collect();
        indexes.sort();
        assert_eq!(indexes, vec![1, 2, 3, 4, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn test_recovered_panic_is_a_failure() {
        let options = fast(2).with_recover_panics(true);
        let collation =
            collate(|| Ok(Multiplier::default()), "panic_on_five", items(), options).unwrap();

        let outcomes: Vec<(Args, Outcome<u32>)> = collation.into_outcomes().collect();
        assert_eq!(outcomes.len(), 10);

        let failure = outcomes
            .iter()
            .find_map(|(_, outcome)| outcome.as_ref().err())
            .unwrap();
        assert_eq!(failure.kind, FailureKind::Panic);
        assert_eq!(failure.message, "worker blew up on five");
    }

    #[test]
    fn test_processor_state_stays_with_its_worker() {
        let collation =
            collate(|| Ok(Multiplier::default()), "count_calls", items(), fast(1)).unwrap();

        let calls: Vec<u32> = collation.map(|(_, calls)| calls).collect();
        assert_eq!(calls, (1..=10).collect::<Vec<u32>>());
    }

    #[test]
    fn test_duplicates_processed_independently() {
        let work = vec![(2, 2), (2, 2), (2, 2)];
        let collation = collate(|| Ok(Multiplier::default()), "multiply", work, fast(2)).unwrap();
        assert_eq!(collation.map(|(_, product)| product).sum::<u32>(), 12);
    }

    #[test]
    fn test_dropping_early_does_not_hang() {
        let mut collation =
            collate(|| Ok(Multiplier::default()), "multiply", items(), fast(2)).unwrap();
        assert!(collation.next().is_some());
        drop(collation);
    }
}
