//! The oplog fetcher: lifecycle handle and cursor-driving task.

mod driver;

use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;

use crate::config::Config;
use crate::entry::OplogEntry;
use crate::error::FetcherError;
use crate::external_state::DataReplicatorExternalState;
use crate::fetcher::driver::Driver;
use crate::metrics::FetcherMetrics;
use crate::network::OplogConnection;
use crate::op_time::OpTime;
use crate::query::make_find_query;
use crate::repl_set_config::ReplSetConfig;
use crate::restart::RestartDecision;
use crate::source::HostAndPort;
use crate::validate::DocumentsInfo;
use crate::validate::StartingPoint;

/// Type of function that accepts a run of operations from the current batch,
/// together with statistics on them, and copies the operations into a buffer
/// consumed by the next stage of the replication process.
///
/// A non-OK return is fatal: the fetcher terminates with that status.
pub type EnqueueDocumentsFn = Box<dyn Fn(&[OplogEntry], &DocumentsInfo) -> Result<(), FetcherError> + Send + Sync>;

/// Type of function called once on shutdown with the final fetcher status.
///
/// The status is `Ok(())` iff the sync source closed the cursor cleanly.
/// The function is called zero times if `start()` fails and exactly once
/// after `start()` returns success.
pub type OnShutdownCallbackFn = Box<dyn FnOnce(Result<(), FetcherError>) + Send>;

/// Lifecycle of the fetcher. Transitions are one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetcherState {
    PreStart,
    Running,
    ShuttingDown,
    Complete,
}

impl Display for FetcherState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FetcherState::PreStart => "PreStart",
            FetcherState::Running => "Running",
            FetcherState::ShuttingDown => "ShuttingDown",
            FetcherState::Complete => "Complete",
        };
        write!(f, "{}", s)
    }
}

/// Mutable fetcher state, guarded by the one fetcher mutex.
pub(crate) struct SharedState {
    pub(crate) state: FetcherState,

    /// The frontier: optime of the last oplog entry fetched and processed.
    /// Never decreases.
    pub(crate) last_fetched: OpTime,

    /// Raw metadata document of the last reply that carried one.
    pub(crate) metadata_obj: Value,
}

/// Everything the driver task takes ownership of when `start()` schedules it.
struct Startup<C: OplogConnection> {
    connection: C,
    restart_decision: Box<dyn RestartDecision>,
    external_state: Arc<dyn DataReplicatorExternalState>,
    enqueue_documents_fn: EnqueueDocumentsFn,
    on_shutdown: OnShutdownCallbackFn,
    cancel_rx: watch::Receiver<bool>,
    metrics_tx: watch::Sender<FetcherMetrics>,
}

/// The oplog fetcher, once started, reads operations from a remote oplog
/// using a tailable, awaitData, exhaust cursor.
///
/// The initial `find` command is generated from the last fetched optime.
/// Metadata forwarded by the sync source in each response is handed to the
/// [`DataReplicatorExternalState`]. The first batch of every cursor is
/// checked for continuity with the last fetched operation, and every batch
/// is validated for ordering before its operations are pushed onto the apply
/// buffer through the enqueue function.
///
/// When there is an error, a new cursor is created by issuing a new `find`,
/// subject to the [`RestartDecision`] policy. If the sync source is no
/// longer eligible or the fetcher was shut down, the shutdown callback is
/// invoked with the terminal status.
pub struct OplogFetcher<C: OplogConnection> {
    config: Arc<Config>,
    source: HostAndPort,
    repl_set_config: ReplSetConfig,
    batch_size: u64,
    starting_point: StartingPoint,
    required_rbid: i64,
    require_fresher_sync_source: bool,

    shared: Arc<Mutex<SharedState>>,

    cancel_tx: watch::Sender<bool>,
    done_tx: Arc<watch::Sender<bool>>,
    done_rx: watch::Receiver<bool>,
    metrics_rx: watch::Receiver<FetcherMetrics>,

    /// Consumed by `start()`; `None` afterwards.
    startup: Mutex<Option<Startup<C>>>,
}

impl<C: OplogConnection> OplogFetcher<C> {
    /// Creates a fetcher that will tail `source`'s oplog starting at
    /// `last_fetched`. Nothing runs until [`start()`](Self::start).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        last_fetched: OpTime,
        source: HostAndPort,
        repl_set_config: ReplSetConfig,
        restart_decision: Box<dyn RestartDecision>,
        required_rbid: i64,
        require_fresher_sync_source: bool,
        external_state: Arc<dyn DataReplicatorExternalState>,
        enqueue_documents_fn: EnqueueDocumentsFn,
        on_shutdown: OnShutdownCallbackFn,
        batch_size: u64,
        starting_point: StartingPoint,
        connection: C,
    ) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);
        let (metrics_tx, metrics_rx) = watch::channel(FetcherMetrics {
            last_fetched,
            ..Default::default()
        });

        let shared = Arc::new(Mutex::new(SharedState {
            state: FetcherState::PreStart,
            last_fetched,
            metadata_obj: Value::Null,
        }));

        OplogFetcher {
            config,
            source,
            repl_set_config,
            batch_size,
            starting_point,
            required_rbid,
            require_fresher_sync_source,
            shared,
            cancel_tx,
            done_tx: Arc::new(done_tx),
            done_rx,
            metrics_rx,
            startup: Mutex::new(Some(Startup {
                connection,
                restart_decision,
                external_state,
                enqueue_documents_fn,
                on_shutdown,
                cancel_rx,
                metrics_tx,
            })),
        }
    }

    /// Spawns the cursor-driver task and transitions to `Running`.
    ///
    /// Fails with `IllegalState` when called more than once, or after
    /// `shutdown()`. On failure nothing is scheduled and the shutdown
    /// callback will never be invoked.
    pub fn start(&self) -> Result<(), FetcherError> {
        let startup = {
            let mut shared = self.shared.lock().unwrap();
            if shared.state != FetcherState::PreStart {
                return Err(FetcherError::IllegalState {
                    reason: format!("oplog fetcher cannot start in state {}", shared.state),
                });
            }

            let startup = match self.startup.lock().unwrap().take() {
                Some(s) => s,
                None => {
                    return Err(FetcherError::IllegalState {
                        reason: "oplog fetcher already started".to_string(),
                    });
                }
            };

            shared.state = FetcherState::Running;
            startup
        };

        tracing::info!("starting oplog fetcher: source={}, {}", self.source, self.tail_summary());

        let driver = Driver {
            config: self.config.clone(),
            source: self.source.clone(),
            term: self.repl_set_config.current_term,
            batch_size: self.batch_size,
            await_data_timeout: self.repl_set_config.await_data_timeout(),
            required_rbid: self.required_rbid,
            require_fresher_sync_source: self.require_fresher_sync_source,
            starting_point: self.starting_point,
            shared: self.shared.clone(),
            connection: startup.connection,
            cursor: None,
            backoff: None,
            first_batch: true,
            restart_decision: startup.restart_decision,
            external_state: startup.external_state,
            enqueue_documents_fn: startup.enqueue_documents_fn,
            on_shutdown: Some(startup.on_shutdown),
            cancel_rx: startup.cancel_rx,
            done_tx: self.done_tx.clone(),
            metrics: FetcherMetrics {
                last_fetched: self.last_op_time_fetched(),
                ..Default::default()
            },
            metrics_tx: startup.metrics_tx,
        };

        tokio::spawn(driver.run());
        Ok(())
    }

    /// Interrupts fetching. Safe to call from any thread, including from
    /// inside the enqueue callback; does not block.
    ///
    /// The driver observes the cancel signal at its next suspension point
    /// and finishes with a canceled status. A fetcher that was never started
    /// completes immediately and its shutdown callback is never invoked.
    pub fn shutdown(&self) {
        let prev = {
            let mut shared = self.shared.lock().unwrap();
            let prev = shared.state;
            match shared.state {
                FetcherState::PreStart => shared.state = FetcherState::Complete,
                FetcherState::Running => shared.state = FetcherState::ShuttingDown,
                FetcherState::ShuttingDown | FetcherState::Complete => {}
            }
            prev
        };

        match prev {
            FetcherState::PreStart => {
                self.done_tx.send(true).ok();
            }
            FetcherState::Running => {
                tracing::info!("shutting down oplog fetcher: source={}", self.source);
                self.cancel_tx.send(true).ok();
            }
            FetcherState::ShuttingDown | FetcherState::Complete => {}
        }
    }

    /// Waits until the fetcher reaches its terminal state. The shutdown
    /// callback has been delivered by the time this returns (unless the
    /// fetcher was never started).
    pub async fn join(&self) {
        let mut done_rx = self.done_rx.clone();
        loop {
            if *done_rx.borrow_and_update() {
                return;
            }
            if done_rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Whether the fetcher is between a successful `start()` and its
    /// terminal state.
    pub fn is_active(&self) -> bool {
        matches!(self.state(), FetcherState::Running | FetcherState::ShuttingDown)
    }

    pub fn state(&self) -> FetcherState {
        self.shared.lock().unwrap().state
    }

    /// The optime of the last oplog entry fetched and processed.
    pub fn last_op_time_fetched(&self) -> OpTime {
        self.shared.lock().unwrap().last_fetched
    }

    /// The `find` command the fetcher would issue right now to establish a
    /// new cursor.
    pub fn find_query(&self) -> Value {
        make_find_query(
            self.last_op_time_fetched(),
            self.repl_set_config.current_term,
            self.batch_size,
            self.config.initial_find_timeout(),
        )
    }

    /// How long the sync source may block a batch request awaiting new data.
    pub fn await_data_timeout(&self) -> Duration {
        self.repl_set_config.await_data_timeout()
    }

    /// Raw metadata document of the last reply that carried one, for
    /// diagnostics.
    pub fn last_reply_metadata(&self) -> Value {
        self.shared.lock().unwrap().metadata_obj.clone()
    }

    /// Watch channel carrying the latest [`FetcherMetrics`] snapshot.
    pub fn metrics(&self) -> watch::Receiver<FetcherMetrics> {
        self.metrics_rx.clone()
    }

    fn tail_summary(&self) -> String {
        format!(
            "last fetched optime: {}, batch size: {}, await data timeout: {:?}",
            self.last_op_time_fetched(),
            self.batch_size,
            self.await_data_timeout()
        )
    }
}

impl<C: OplogConnection> Display for OplogFetcher<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let (state, last_fetched) = {
            let shared = self.shared.lock().unwrap();
            (shared.state, shared.last_fetched)
        };
        write!(
            f,
            "OplogFetcher -- state: {}, source: {}, last fetched optime: {}",
            state, self.source, last_fetched
        )
    }
}
