//! Fixtures for testing the oplog fetcher.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Once;
use std::time::Duration;
use std::time::Instant;

use memoplog::MemSyncSource;
use oplog_fetcher::Config;
use oplog_fetcher::DataReplicatorExternalState;
use oplog_fetcher::DocumentsInfo;
use oplog_fetcher::EnqueueDocumentsFn;
use oplog_fetcher::FetcherError;
use oplog_fetcher::HostAndPort;
use oplog_fetcher::OnShutdownCallbackFn;
use oplog_fetcher::OpTime;
use oplog_fetcher::OplogEntry;
use oplog_fetcher::OplogFetcher;
use oplog_fetcher::ReplMetadata;
use oplog_fetcher::ReplSetConfig;
use oplog_fetcher::RestartDecisionDefault;
use oplog_fetcher::StartingPoint;
use oplog_fetcher::Timestamp;

pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn op_time(secs: u32, term: i64) -> OpTime {
    OpTime::new(Timestamp::new(secs, 0), term)
}

/// One call to the enqueue function, as observed by the apply side.
#[derive(Debug, Clone)]
pub struct EnqueuedBatch {
    pub documents: Vec<OplogEntry>,
    pub info: DocumentsInfo,
}

impl EnqueuedBatch {
    /// `(secs, term)` of every enqueued document, for compact assertions.
    pub fn op_times(&self) -> Vec<(u32, i64)> {
        self.documents
            .iter()
            .map(|d| {
                let op_time = d.op_time().expect("enqueued documents carry optimes");
                (op_time.timestamp().secs, op_time.term())
            })
            .collect()
    }
}

/// External state double that records every forwarded metadata record and
/// can be scripted to revoke the sync source after a number of replies.
pub struct RecordingExternalState {
    processed: Mutex<Vec<ReplMetadata>>,
    stop_after: Option<usize>,
}

impl RecordingExternalState {
    pub fn new(stop_after: Option<usize>) -> Self {
        RecordingExternalState {
            processed: Mutex::new(Vec::new()),
            stop_after,
        }
    }

    pub fn processed(&self) -> Vec<ReplMetadata> {
        self.processed.lock().unwrap().clone()
    }
}

impl DataReplicatorExternalState for RecordingExternalState {
    fn process_metadata(&self, metadata: &ReplMetadata) {
        self.processed.lock().unwrap().push(metadata.clone());
    }

    fn should_stop_fetching(&self, _source: &HostAndPort, _metadata: &ReplMetadata) -> bool {
        match self.stop_after {
            Some(n) => self.processed.lock().unwrap().len() >= n,
            None => false,
        }
    }
}

pub struct HarnessBuilder {
    last_fetched: OpTime,
    required_rbid: i64,
    require_fresher_sync_source: bool,
    batch_size: u64,
    starting_point: StartingPoint,
    max_restarts: Option<u64>,
    election_timeout: u64,
    current_term: Option<i64>,
    stop_fetching_after: Option<usize>,
    enqueue_error: Option<FetcherError>,
    on_enqueue: Option<Box<dyn Fn() + Send + Sync>>,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        HarnessBuilder {
            last_fetched: op_time(100, 1),
            required_rbid: 7,
            require_fresher_sync_source: false,
            batch_size: 256,
            starting_point: StartingPoint::SkipFirstDoc,
            max_restarts: None,
            election_timeout: 200,
            current_term: Some(1),
            stop_fetching_after: None,
            enqueue_error: None,
            on_enqueue: None,
        }
    }
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_fetched(mut self, op_time: OpTime) -> Self {
        self.last_fetched = op_time;
        self
    }

    pub fn required_rbid(mut self, rbid: i64) -> Self {
        self.required_rbid = rbid;
        self
    }

    pub fn require_fresher_sync_source(mut self) -> Self {
        self.require_fresher_sync_source = true;
        self
    }

    pub fn starting_point(mut self, starting_point: StartingPoint) -> Self {
        self.starting_point = starting_point;
        self
    }

    pub fn max_restarts(mut self, max_restarts: u64) -> Self {
        self.max_restarts = Some(max_restarts);
        self
    }

    pub fn stop_fetching_after(mut self, replies: usize) -> Self {
        self.stop_fetching_after = Some(replies);
        self
    }

    pub fn enqueue_error(mut self, err: FetcherError) -> Self {
        self.enqueue_error = Some(err);
        self
    }

    pub fn on_enqueue(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_enqueue = Some(Box::new(hook));
        self
    }

    pub fn build(self) -> FetcherHarness {
        init_test_tracing();

        let config = Arc::new(Config::default().validate().expect("default config is valid"));
        let source_addr = HostAndPort::new("test-sync-source", 27017);
        let source = MemSyncSource::new();

        let restart_decision = match self.max_restarts {
            Some(n) => RestartDecisionDefault::new(n),
            None => RestartDecisionDefault::steady_state(&config),
        };

        let external_state = Arc::new(RecordingExternalState::new(self.stop_fetching_after));

        let batches: Arc<Mutex<Vec<EnqueuedBatch>>> = Arc::new(Mutex::new(Vec::new()));
        let enqueue_error = Mutex::new(self.enqueue_error);
        let on_enqueue = self.on_enqueue;
        let enqueue_fn: EnqueueDocumentsFn = {
            let batches = batches.clone();
            Box::new(move |documents, info| {
                batches.lock().unwrap().push(EnqueuedBatch {
                    documents: documents.to_vec(),
                    info: info.clone(),
                });
                if let Some(hook) = &on_enqueue {
                    hook();
                }
                if let Some(err) = enqueue_error.lock().unwrap().take() {
                    return Err(err);
                }
                Ok(())
            })
        };

        let shutdown_statuses: Arc<Mutex<Vec<Result<(), FetcherError>>>> = Arc::new(Mutex::new(Vec::new()));
        let on_shutdown: OnShutdownCallbackFn = {
            let statuses = shutdown_statuses.clone();
            Box::new(move |status| {
                statuses.lock().unwrap().push(status);
            })
        };

        let fetcher = OplogFetcher::new(
            config,
            self.last_fetched,
            source_addr.clone(),
            ReplSetConfig::new("rs0", self.election_timeout, self.current_term),
            Box::new(restart_decision),
            self.required_rbid,
            self.require_fresher_sync_source,
            external_state.clone(),
            enqueue_fn,
            on_shutdown,
            self.batch_size,
            self.starting_point,
            source.clone(),
        );

        FetcherHarness {
            fetcher: Arc::new(fetcher),
            source,
            source_addr,
            batches,
            shutdown_statuses,
            external_state,
        }
    }
}

/// A fetcher wired to a scripted [`MemSyncSource`], with the apply side and
/// the shutdown callback recorded for assertions.
pub struct FetcherHarness {
    pub fetcher: Arc<OplogFetcher<MemSyncSource>>,
    pub source: MemSyncSource,
    pub source_addr: HostAndPort,
    pub batches: Arc<Mutex<Vec<EnqueuedBatch>>>,
    pub shutdown_statuses: Arc<Mutex<Vec<Result<(), FetcherError>>>>,
    pub external_state: Arc<RecordingExternalState>,
}

impl FetcherHarness {
    pub fn start(&self) -> Result<(), FetcherError> {
        self.fetcher.start()
    }

    /// Waits for the terminal state; panics if it takes unreasonably long.
    pub async fn join(&self) {
        tokio::time::timeout(Duration::from_secs(10), self.fetcher.join())
            .await
            .expect("oplog fetcher did not finish in time");
    }

    /// Waits for the terminal state and returns the single delivered
    /// shutdown status.
    pub async fn join_status(&self) -> Result<(), FetcherError> {
        self.join().await;
        let statuses = self.shutdown_statuses();
        assert_eq!(1, statuses.len(), "expect exactly one shutdown callback");
        statuses.into_iter().next().expect("one status")
    }

    pub fn enqueued(&self) -> Vec<EnqueuedBatch> {
        self.batches.lock().unwrap().clone()
    }

    pub fn shutdown_statuses(&self) -> Vec<Result<(), FetcherError>> {
        self.shutdown_statuses.lock().unwrap().clone()
    }

    /// Polls until `n` enqueue calls have been observed.
    pub async fn wait_for_enqueued(&self, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if self.enqueued().len() >= n {
                return;
            }
            if Instant::now() > deadline {
                panic!(
                    "timed out waiting for {} enqueued batches, have {}",
                    n,
                    self.enqueued().len()
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
