use std::{
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, OnceLock,
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::{
    dictionary::Dictionary,
    error::{SecSuiteError, SecSuiteResult},
    event::{Event, EventHandle},
    hash::Oracle,
    source::{CandidateSource, Partition, Shard},
    wordlist::WordlistEntry,
    DEFAULT_PROGRESS_INTERVAL_MS, DEFAULT_WORKERS, QUEUE_BATCHES_PER_WORKER,
};

/// The outcome of a search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchResult {
    /// A candidate was verified by the oracle.
    Found(String),
    /// Every candidate was verified without success.
    NotFound,
    /// The search was cancelled or timed out before a match was found.
    Cancelled,
}

impl SearchResult {
    /// Returns the password found, if any.
    pub fn password(&self) -> Option<&str> {
        match self {
            Self::Found(password) => Some(password),
            Self::NotFound | Self::Cancelled => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// A search result, along with statistics about the search.
#[derive(Clone, Debug)]
pub struct SearchReport {
    pub result: SearchResult,
    /// The number of candidates verified.
    pub attempts: u64,
    /// The line of the password found in a dictionary.
    pub position: Option<u64>,
    pub elapsed: Duration,
}

/// A token to cancel a running search from another thread.
/// Cancelling is idempotent.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// The signal checked by every worker before each verification.
struct StopSignal<'a> {
    found: AtomicBool,
    /// Raised when a worker panics.
    failed: AtomicBool,
    interrupted: AtomicBool,
    token: &'a CancellationToken,
    deadline: Option<Instant>,
}

impl StopSignal<'_> {
    fn is_stopped(&self) -> bool {
        if self.found.load(Ordering::Acquire) || self.failed.load(Ordering::Acquire) {
            return true;
        }

        if self.token.is_cancelled() || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
        {
            self.interrupted.store(true, Ordering::Release);
            return true;
        }

        false
    }
}

/// Stops every worker of a search when the thread holding it unwinds.
struct PanicGuard<'s, 'a>(&'s StopSignal<'a>);

impl Drop for PanicGuard<'_, '_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.failed.store(true, Ordering::Release);
        }
    }
}

/// A password found by a worker.
#[derive(Debug)]
struct Hit {
    password: String,
    position: Option<u64>,
}

/// The state shared by the workers of a search.
struct SearchState<'a> {
    stop: StopSignal<'a>,
    /// Written at most once, by the first worker finding a match.
    slot: OnceLock<Hit>,
    attempts: AtomicU64,
}

impl SearchState<'_> {
    /// Publishes a match and stops every worker.
    /// Returns false if another match was already published, in which case this one is discarded.
    fn publish(&self, password: String, position: Option<u64>) -> bool {
        let published = self.slot.set(Hit { password, position }).is_ok();

        if published {
            self.stop.found.store(true, Ordering::Release);
        } else {
            debug!("a match was already published, discarding this one");
        }

        published
    }

    fn run_shard<O: Oracle + ?Sized>(&self, mut shard: Shard, oracle: &O) {
        let _guard = PanicGuard(&self.stop);

        while !self.stop.is_stopped() {
            let Some(candidate) = shard.next() else {
                return;
            };

            self.attempts.fetch_add(1, Ordering::Relaxed);
            if oracle.verify(&candidate) {
                self.publish(candidate, None);
                return;
            }
        }
    }

    fn run_stream<O: Oracle + ?Sized>(&self, receiver: Receiver<Vec<WordlistEntry>>, oracle: &O) {
        let _guard = PanicGuard(&self.stop);

        // the iterator ends when the producer closes the channel
        for batch in receiver.iter() {
            for entry in batch {
                if self.stop.is_stopped() {
                    return;
                }

                self.attempts.fetch_add(1, Ordering::Relaxed);
                if oracle.verify(&entry.word) {
                    self.publish(entry.word, Some(entry.line));
                    return;
                }
            }
        }
    }
}

/// Fans a candidate source out to parallel workers, until a candidate is verified.
#[derive(Clone, Debug)]
pub struct Coordinator {
    workers: usize,
    timeout: Option<Duration>,
    progress_interval: Duration,
    token: CancellationToken,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(DEFAULT_WORKERS),
            timeout: None,
            progress_interval: Duration::from_millis(DEFAULT_PROGRESS_INTERVAL_MS),
            token: CancellationToken::new(),
        }
    }
}

impl Coordinator {
    /// Creates a new Coordinator using every available core.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of workers.
    pub fn workers(mut self, workers: usize) -> Self {
        if workers == 0 {
            warn!("a search needs at least one worker, using a single worker");
        }
        self.workers = workers.max(1);

        self
    }

    /// Stops the search after the given duration.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);

        self
    }

    /// Sets the interval between two progress events.
    pub fn progress_interval(mut self, progress_interval: Duration) -> Self {
        self.progress_interval = progress_interval;

        self
    }

    /// Uses an existing cancellation token.
    /// Replacing a cancelled token is the way to search again with this coordinator.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.token = token;

        self
    }

    /// Returns the token cancelling the searches of this coordinator.
    /// The token is shared by every search of the coordinator and is never reset:
    /// once cancelled, the following searches are cancelled before they start.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Searches for a candidate verified by the oracle.
    pub fn search<O: Oracle + ?Sized>(
        &self,
        source: &CandidateSource,
        oracle: &O,
    ) -> SecSuiteResult<SearchReport> {
        self.run(source, oracle, None)
    }

    /// Searches for a candidate verified by the oracle, sending progress events along the way.
    pub fn search_with_events<O: Oracle + ?Sized>(
        &self,
        source: &CandidateSource,
        oracle: &O,
        events: Sender<Event>,
    ) -> SecSuiteResult<SearchReport> {
        self.run(source, oracle, Some(&events))
    }

    /// Searches on a background thread.
    /// Returns an handle to get the progress events and the report.
    pub fn search_nonblocking<O>(self, source: CandidateSource, oracle: O) -> EventHandle<SearchReport>
    where
        O: Oracle + Send + 'static,
    {
        let (sender, receiver) = unbounded();
        let thread_handle =
            thread::spawn(move || self.search_with_events(&source, &oracle, sender));

        EventHandle {
            thread_handle,
            receiver,
        }
    }

    fn run<O: Oracle + ?Sized>(
        &self,
        source: &CandidateSource,
        oracle: &O,
        events: Option<&Sender<Event>>,
    ) -> SecSuiteResult<SearchReport> {
        let start = Instant::now();
        let state = SearchState {
            stop: StopSignal {
                found: AtomicBool::new(false),
                failed: AtomicBool::new(false),
                interrupted: AtomicBool::new(false),
                token: &self.token,
                deadline: self.timeout.map(|timeout| start + timeout),
            },
            slot: OnceLock::new(),
            attempts: AtomicU64::new(0),
        };

        info!(
            source = source.name(),
            workers = self.workers,
            "starting the search"
        );

        thread::scope(|s| {
            let (done_sender, done_receiver) = bounded::<()>(0);
            let reporter = events.map(|events| {
                let state = &state;
                let total = source.total();
                s.spawn(move || self.report(state, total, events, done_receiver))
            });

            let outcome = match source.partition(self.workers) {
                Partition::Shards(shards) => {
                    debug!(shards = shards.len(), "spawning the workers");

                    let handles: Vec<_> = shards
                        .into_iter()
                        .map(|shard| {
                            let state = &state;
                            s.spawn(move || state.run_shard(shard, oracle))
                        })
                        .collect();

                    join_workers(handles)
                }
                Partition::Stream(dictionary) => self.stream(s, &state, dictionary, oracle),
            };

            drop(done_sender);
            if let Some(reporter) = reporter {
                reporter.join().map_err(|_| SecSuiteError::WorkerPanic)?;
            }

            outcome
        })?;

        let attempts = state.attempts.load(Ordering::Relaxed);
        let interrupted = state.stop.interrupted.load(Ordering::Acquire);
        let (result, position) = match state.slot.into_inner() {
            Some(hit) => (SearchResult::Found(hit.password), hit.position),
            None if interrupted => (SearchResult::Cancelled, None),
            None => (SearchResult::NotFound, None),
        };

        if let Some(events) = events {
            events.send(Event::Attempts(attempts)).ok();
        }

        let elapsed = start.elapsed();
        info!(?result, attempts, ?elapsed, "search finished");

        Ok(SearchReport {
            result,
            attempts,
            position,
            elapsed,
        })
    }

    /// Runs a dictionary search: one producer reading the file and
    /// the workers consuming its batches through a bounded queue.
    fn stream<'scope, 'env, O: Oracle + ?Sized>(
        &'env self,
        s: &'scope thread::Scope<'scope, 'env>,
        state: &'env SearchState<'env>,
        dictionary: &'env Dictionary,
        oracle: &'env O,
    ) -> SecSuiteResult<()> {
        let (sender, receiver) = bounded(self.workers * QUEUE_BATCHES_PER_WORKER);

        let handles: Vec<_> = (0..self.workers)
            .map(|_| {
                let receiver = receiver.clone();
                s.spawn(move || state.run_stream(receiver, oracle))
            })
            .collect();
        // the consumers must hold the only receivers, so that the producer stops when they are gone
        drop(receiver);

        let producer = s.spawn(move || {
            let _guard = PanicGuard(&state.stop);
            dictionary.produce(sender, || state.stop.is_stopped())
        });

        let consumers = join_workers(handles);
        let produced = producer.join().map_err(|_| SecSuiteError::WorkerPanic)?;

        consumers?;
        produced
    }

    /// Samples the number of attempts until the search is done.
    fn report(
        &self,
        state: &SearchState,
        total: Option<u128>,
        events: &Sender<Event>,
        done: Receiver<()>,
    ) {
        loop {
            match done.recv_timeout(self.progress_interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let attempts = state.attempts.load(Ordering::Relaxed);
                    events.send(Event::Attempts(attempts)).ok();

                    if let Some(total) = total.filter(|&total| total > 0) {
                        let progress = attempts as f64 / total as f64 * 100.;
                        events.send(Event::Progress(progress.min(100.))).ok();
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }
}

fn join_workers(handles: Vec<thread::ScopedJoinHandle<'_, ()>>) -> SecSuiteResult<()> {
    let mut panicked = false;

    for handle in handles {
        panicked |= handle.join().is_err();
    }

    if panicked {
        Err(SecSuiteError::WorkerPanic)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Write,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use tempfile::NamedTempFile;

    use super::*;
    use crate::{
        bruteforce::BruteForce,
        charset::Charset,
        hash::{HashFunction, Target},
    };

    fn brute_force(chars: &str, min: usize, max: usize) -> CandidateSource {
        BruteForce::new(Charset::new(chars).unwrap(), min, max)
            .unwrap()
            .into()
    }

    fn sha256_target(password: &str) -> Target {
        Target::new(&HashFunction::Sha256.hash(password).unwrap(), HashFunction::Sha256)
    }

    #[test]
    fn test_found() {
        let source = brute_force("abcd", 4, 4);
        let report = Coordinator::new()
            .workers(3)
            .search(&source, &sha256_target("abca"))
            .unwrap();

        assert_eq!(SearchResult::Found("abca".to_owned()), report.result);
        assert_eq!(None, report.position);
        assert!(report.attempts >= 1 && report.attempts <= 256);
    }

    #[test]
    fn test_not_found_exhausts_every_shard() {
        let source = brute_force("abc", 1, 3);
        let calls = AtomicUsize::new(0);
        let oracle = |_: &str| {
            calls.fetch_add(1, Ordering::Relaxed);
            false
        };

        let report = Coordinator::new()
            .workers(2)
            .search(&source, &oracle)
            .unwrap();

        assert_eq!(SearchResult::NotFound, report.result);
        assert_eq!(3 + 9 + 27, report.attempts);
        assert_eq!(39, calls.load(Ordering::Relaxed));
    }

    #[test]
    fn test_single_publication() {
        let source = brute_force("abcdef", 1, 4);

        // every candidate matches, but only one can be published
        let report = Coordinator::new()
            .workers(6)
            .search(&source, &|_: &str| true)
            .unwrap();

        assert!(report.result.is_found());
        assert!(report.attempts <= 6);
    }

    #[test]
    fn test_publish_once() {
        let token = CancellationToken::new();
        let state = SearchState {
            stop: StopSignal {
                found: AtomicBool::new(false),
                failed: AtomicBool::new(false),
                interrupted: AtomicBool::new(false),
                token: &token,
                deadline: None,
            },
            slot: OnceLock::new(),
            attempts: AtomicU64::new(0),
        };

        assert!(state.publish("first".to_owned(), None));
        assert!(state.stop.is_stopped());
        assert!(!state.publish("second".to_owned(), Some(2)));
        assert_eq!("first", state.slot.get().unwrap().password);
        assert!(!state.stop.interrupted.load(Ordering::Acquire));
    }

    #[test]
    fn test_cancelled_before_start() {
        let source = brute_force("abc", 1, 3);
        let coordinator = Coordinator::new().workers(2);
        coordinator.token().cancel();
        coordinator.token().cancel();

        let report = coordinator.search(&source, &|_: &str| true).unwrap();

        assert_eq!(SearchResult::Cancelled, report.result);
        assert_eq!(0, report.attempts);
    }

    #[test]
    fn test_timeout() {
        let source = brute_force("abcdefghij", 1, 8);
        let oracle = |_: &str| {
            thread::sleep(Duration::from_millis(1));
            false
        };

        let report = Coordinator::new()
            .workers(2)
            .timeout(Duration::from_millis(50))
            .search(&source, &oracle)
            .unwrap();

        assert_eq!(SearchResult::Cancelled, report.result);
        assert!(report.elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let source = brute_force("abcdefghij", 1, 8);
        let coordinator = Coordinator::new().workers(2);
        let token = coordinator.token();

        let handle = coordinator.search_nonblocking(source, |_: &str| {
            thread::sleep(Duration::from_millis(1));
            false
        });
        thread::sleep(Duration::from_millis(20));
        token.cancel();

        let report = handle.join().unwrap();
        assert_eq!(SearchResult::Cancelled, report.result);
    }

    #[test]
    fn test_worker_panic() {
        let source = brute_force("abc", 1, 2);
        let result = Coordinator::new()
            .workers(2)
            .search(&source, &|candidate: &str| {
                if candidate == "b" {
                    panic!("oracle failure");
                }
                false
            });

        assert!(matches!(result, Err(SecSuiteError::WorkerPanic)));
    }

    #[test]
    fn test_worker_panic_stops_the_peers() {
        // the shard starting with 'b' would take much longer than the timeout to exhaust
        let source = brute_force("ab", 1, 40);
        let start = Instant::now();
        let result = Coordinator::new()
            .workers(2)
            .timeout(Duration::from_secs(30))
            .search(&source, &|candidate: &str| {
                if candidate == "a" {
                    panic!("oracle failure");
                }
                false
            });

        assert!(matches!(result, Err(SecSuiteError::WorkerPanic)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_dictionary_worker_panic() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "boom").unwrap();
        for i in 0..200_000 {
            writeln!(file, "word{i}").unwrap();
        }

        let dictionary = Dictionary::new(file.path()).unwrap().batch_size(8);
        let source = CandidateSource::from(dictionary);
        let start = Instant::now();
        let result = Coordinator::new()
            .workers(3)
            .timeout(Duration::from_secs(30))
            .search(&source, &|candidate: &str| {
                if candidate == "boom" {
                    panic!("oracle failure");
                }
                thread::sleep(Duration::from_millis(1));
                false
            });

        assert!(matches!(result, Err(SecSuiteError::WorkerPanic)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_cancelled_token_is_kept() {
        let source = brute_force("abc", 1, 2);
        let coordinator = Coordinator::new().workers(2);
        coordinator.token().cancel();

        for _ in 0..2 {
            let report = coordinator.search(&source, &|_: &str| false).unwrap();
            assert_eq!(SearchResult::Cancelled, report.result);
        }

        let coordinator = coordinator.cancellation_token(CancellationToken::new());
        let report = coordinator.search(&source, &|_: &str| false).unwrap();
        assert_eq!(SearchResult::NotFound, report.result);
        assert_eq!(3 + 9, report.attempts);
    }

    #[test]
    fn test_dictionary() {
        let mut file = NamedTempFile::new().unwrap();
        for i in 0..5000 {
            writeln!(file, "word{i}").unwrap();
        }
        writeln!(file).unwrap();
        writeln!(file, "abca").unwrap();

        let dictionary = Dictionary::new(file.path()).unwrap().batch_size(100);
        let source = CandidateSource::from(dictionary);

        let report = Coordinator::new()
            .workers(4)
            .search(&source, &sha256_target("abca"))
            .unwrap();
        assert_eq!(SearchResult::Found("abca".to_owned()), report.result);
        assert_eq!(Some(5002), report.position);

        let report = Coordinator::new()
            .workers(4)
            .search(&source, &sha256_target("missing"))
            .unwrap();
        assert_eq!(SearchResult::NotFound, report.result);
        assert_eq!(5001, report.attempts);
    }

    #[test]
    fn test_dictionary_early_stop() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "abca").unwrap();
        for i in 0..100_000 {
            writeln!(file, "word{i}").unwrap();
        }

        let dictionary = Dictionary::new(file.path()).unwrap().batch_size(16);
        let source = CandidateSource::from(dictionary);

        let report = Coordinator::new()
            .workers(2)
            .search(&source, &|candidate: &str| candidate == "abca")
            .unwrap();

        assert_eq!(Some("abca"), report.result.password());
        assert_eq!(Some(1), report.position);
        assert!(report.attempts < 100_000);
    }

    fn large_dictionary() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for i in 0..200_000 {
            writeln!(file, "word{i}").unwrap();
        }

        file
    }

    fn slow_oracle(_: &str) -> bool {
        thread::sleep(Duration::from_millis(1));
        false
    }

    #[test]
    fn test_dictionary_cancelled() {
        let file = large_dictionary();
        let source = CandidateSource::from(Dictionary::new(file.path()).unwrap().batch_size(8));

        let coordinator = Coordinator::new().workers(3);
        let token = coordinator.token();
        let handle = coordinator.search_nonblocking(source, slow_oracle);

        thread::sleep(Duration::from_millis(50));
        token.cancel();
        let cancelled_at = Instant::now();

        let report = handle.join().unwrap();
        assert_eq!(SearchResult::Cancelled, report.result);
        assert_eq!(None, report.position);
        assert!(report.attempts < 200_000);
        assert!(cancelled_at.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_dictionary_timeout() {
        let file = large_dictionary();
        let source = CandidateSource::from(Dictionary::new(file.path()).unwrap().batch_size(8));

        let report = Coordinator::new()
            .workers(3)
            .timeout(Duration::from_millis(50))
            .search(&source, &slow_oracle)
            .unwrap();

        assert_eq!(SearchResult::Cancelled, report.result);
        assert!(report.attempts < 200_000);
        assert!(report.elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_events() {
        let source = brute_force("abcd", 1, 4);
        let (sender, receiver) = unbounded();

        let report = Coordinator::new()
            .workers(2)
            .progress_interval(Duration::from_millis(1))
            .search_with_events(&source, &|_: &str| false, sender)
            .unwrap();

        let events: Vec<Event> = receiver.iter().collect();
        assert_eq!(Some(&Event::Attempts(report.attempts)), events.last());
        assert!(events.iter().all(|event| match event {
            Event::Progress(progress) => (0. ..=100.).contains(progress),
            _ => true,
        }));
    }

    #[test]
    fn test_nonblocking() {
        let source = brute_force("xyz", 3, 3);
        let handle = Coordinator::new()
            .workers(2)
            .search_nonblocking(source, sha256_target("zyx"));

        while handle.recv().is_some() {}

        let report = handle.join().unwrap();
        assert_eq!(Some("zyx"), report.result.password());
    }
}
