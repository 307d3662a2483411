//! The cursor-driving task.

use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::Config;
use crate::error::BadValue;
use crate::error::CallbackCanceled;
use crate::error::FetcherError;
use crate::error::InvalidSyncSource;
use crate::external_state::DataReplicatorExternalState;
use crate::failpoint::STOP_REPL_PRODUCER;
use crate::fetcher::EnqueueDocumentsFn;
use crate::fetcher::FetcherState;
use crate::fetcher::OnShutdownCallbackFn;
use crate::fetcher::SharedState;
use crate::metadata::ReplMetadata;
use crate::metrics::FetcherMetrics;
use crate::network::Backoff;
use crate::network::CursorBatch;
use crate::network::OplogConnection;
use crate::network::OplogCursor;
use crate::op_time::OpTime;
use crate::query::make_find_query;
use crate::query::make_metadata_request;
use crate::restart::FetcherDiagnostics;
use crate::restart::RestartDecision;
use crate::source::HostAndPort;
use crate::validate::validate_documents;
use crate::validate::StartingPoint;

/// How often the driver re-checks an enabled `stopReplProducer` failpoint.
const STOP_REPL_PRODUCER_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Fallback restart delay if a [`Backoff`] iterator runs dry despite its
/// infinite contract.
const DEFAULT_RESTART_BACKOFF: Duration = Duration::from_millis(500);

/// The task that owns the connection and cursor. It runs the query loop
/// sequentially: open a cursor, drain its batches, validate and enqueue each
/// one, and recreate the cursor on recoverable errors.
pub(crate) struct Driver<C: OplogConnection> {
    pub(super) config: Arc<Config>,
    pub(super) source: HostAndPort,
    pub(super) term: Option<i64>,
    pub(super) batch_size: u64,
    pub(super) await_data_timeout: Duration,
    pub(super) required_rbid: i64,
    pub(super) require_fresher_sync_source: bool,
    pub(super) starting_point: StartingPoint,

    pub(super) shared: Arc<Mutex<SharedState>>,

    pub(super) connection: C,
    pub(super) cursor: Option<C::Cursor>,
    pub(super) backoff: Option<Backoff>,

    /// True until the current cursor's first batch is validated. Reset on
    /// every cursor recreation: a new `find` re-fetches the boundary entry.
    pub(super) first_batch: bool,

    pub(super) restart_decision: Box<dyn RestartDecision>,
    pub(super) external_state: Arc<dyn DataReplicatorExternalState>,
    pub(super) enqueue_documents_fn: EnqueueDocumentsFn,
    pub(super) on_shutdown: Option<OnShutdownCallbackFn>,

    pub(super) cancel_rx: watch::Receiver<bool>,
    pub(super) done_tx: Arc<watch::Sender<bool>>,

    pub(super) metrics: FetcherMetrics,
    pub(super) metrics_tx: watch::Sender<FetcherMetrics>,
}

/// Race `fut` against the shutdown signal. A shutdown observed before or
/// during the wait surfaces as a canceled error; the in-flight future is
/// dropped, which aborts the underlying network operation.
async fn cancelable<T, F>(cancel_rx: &mut watch::Receiver<bool>, fut: F) -> Result<T, FetcherError>
where F: Future<Output = Result<T, FetcherError>> {
    if *cancel_rx.borrow() {
        return Err(CallbackCanceled::new("oplog fetcher shutting down").into());
    }

    tokio::select! {
        _ = cancel_rx.changed() => Err(CallbackCanceled::new("oplog fetcher shutting down").into()),
        res = fut => res,
    }
}

impl<C: OplogConnection> Driver<C> {
    /// Runs the query loop to completion, then delivers the terminal status.
    pub(crate) async fn run(mut self) {
        let result = self.run_query().await;

        // Release the cursor before announcing completion.
        self.cursor = None;

        {
            let mut shared = self.shared.lock().unwrap();
            shared.state = FetcherState::Complete;
        }

        match &result {
            Ok(()) => tracing::info!("oplog fetcher finished: source={}", self.source),
            Err(err) => tracing::info!("oplog fetcher finished: source={}, status: {}", self.source, err),
        }

        if let Some(on_shutdown) = self.on_shutdown.take() {
            on_shutdown(result);
        }

        self.done_tx.send(true).ok();
    }

    #[tracing::instrument(level = "debug", skip_all, fields(source = display(&self.source)))]
    async fn run_query(&mut self) -> Result<(), FetcherError> {
        self.create_new_cursor(true).await?;

        loop {
            self.check_shutdown()?;

            if STOP_REPL_PRODUCER.should_fail() {
                // Behave as if the cursor keeps returning empty batches
                // until the failpoint is cleared.
                tracing::debug!("stopReplProducer enabled, not fetching");
                cancelable(&mut self.cancel_rx, async {
                    tokio::time::sleep(STOP_REPL_PRODUCER_POLL_INTERVAL).await;
                    Ok(())
                })
                .await?;
                continue;
            }

            match self.get_next_batch().await {
                Ok(Some(batch)) => self.on_successful_batch(batch)?,
                Ok(None) => {
                    tracing::info!("oplog fetcher reached end of stream from {}", self.source);
                    return Ok(());
                }
                Err(err) => {
                    if err.is_canceled() || !err.is_recoverable() {
                        return Err(err);
                    }

                    tracing::warn!("error getting next batch from {}: {}", self.source, err);
                    self.cursor = None;

                    if !self.check_restart(&err) {
                        return Err(err);
                    }
                    self.sleep_backoff().await?;
                    self.create_new_cursor(false).await?;
                }
            }
        }
    }

    /// Issues a `find` on the sync source's oplog and establishes a
    /// tailable, awaitData, exhaust cursor. Recoverable failures are retried
    /// with the short deadline, as far as the restart policy allows.
    async fn create_new_cursor(&mut self, initial_find: bool) -> Result<(), FetcherError> {
        let metadata_request = make_metadata_request();
        let mut max_time = if initial_find {
            self.config.initial_find_timeout()
        } else {
            self.config.retried_find_timeout()
        };

        loop {
            let find_cmd = make_find_query(self.last_op_time_fetched(), self.term, self.batch_size, max_time);
            tracing::debug!("creating oplog cursor on {}: {}", self.source, find_cmd);

            let res = cancelable(
                &mut self.cancel_rx,
                self.connection.open_cursor(&self.source, &find_cmd, &metadata_request),
            )
            .await;

            match res {
                Ok(cursor) => {
                    self.cursor = Some(cursor);
                    self.first_batch = true;
                    return Ok(());
                }
                Err(err) => {
                    if err.is_canceled() || !err.is_recoverable() {
                        return Err(err);
                    }

                    tracing::warn!("error creating oplog cursor on {}: {}", self.source, err);
                    if !self.check_restart(&err) {
                        return Err(err);
                    }
                    max_time = self.config.retried_find_timeout();
                    self.sleep_backoff().await?;
                }
            }
        }
    }

    async fn get_next_batch(&mut self) -> Result<Option<CursorBatch>, FetcherError> {
        let cursor = match self.cursor.as_mut() {
            Some(cursor) => cursor,
            None => {
                return Err(FetcherError::IllegalState {
                    reason: "no oplog cursor to read from".to_string(),
                });
            }
        };

        cancelable(&mut self.cancel_rx, cursor.next_batch(self.await_data_timeout)).await
    }

    /// Processes one successful cursor response: validate, run the
    /// first-batch sync source checks, forward metadata, enqueue, and
    /// advance the frontier.
    fn on_successful_batch(&mut self, batch: CursorBatch) -> Result<(), FetcherError> {
        let CursorBatch { documents, metadata } = batch;

        let last_fetched = self.last_op_time_fetched();
        tracing::debug!(
            "oplog fetcher read {} operations from {}, first batch: {}",
            documents.len(),
            self.source,
            self.first_batch
        );

        let info = validate_documents(&documents, self.first_batch, last_fetched.timestamp(), self.starting_point)?;

        let parsed = if metadata.is_null() {
            None
        } else {
            Some(ReplMetadata::parse(&metadata)?)
        };

        if self.first_batch && !documents.is_empty() {
            // The sync source must prove it actually is ahead of us: the
            // first batch has to hold an entry past the boundary document.
            if self.require_fresher_sync_source && documents.len() < 2 {
                return Err(InvalidSyncSource::new(
                    self.source.clone(),
                    format!("sync source is not ahead of our last fetched optime {}", last_fetched),
                )
                .into());
            }

            // A rollback on the source since it was selected invalidates it.
            let rbid = match &parsed {
                Some(md) => md.rbid(),
                None => {
                    return Err(BadValue::from_message(format!(
                        "first batch from {} carried no replication metadata",
                        self.source
                    ))
                    .into());
                }
            };
            if rbid != self.required_rbid {
                return Err(InvalidSyncSource::new(
                    self.source.clone(),
                    format!(
                        "rollback id changed from {} to {} since the sync source was selected",
                        self.required_rbid, rbid
                    ),
                )
                .into());
            }
        }

        if let Some(parsed) = &parsed {
            {
                let mut shared = self.shared.lock().unwrap();
                shared.metadata_obj = metadata;
            }
            self.external_state.process_metadata(parsed);
            if self.external_state.should_stop_fetching(&self.source, parsed) {
                return Err(InvalidSyncSource::new(
                    self.source.clone(),
                    "sync source was rejected by the replication coordinator",
                )
                .into());
            }
        }

        let to_apply = if !documents.is_empty() && self.first_batch && self.starting_point == StartingPoint::SkipFirstDoc
        {
            &documents[1..]
        } else {
            &documents[..]
        };

        if !to_apply.is_empty() {
            // Shutdown may have been requested while the batch was in
            // flight; nothing must reach the apply buffer after that.
            self.check_shutdown()?;
            (self.enqueue_documents_fn)(to_apply, &info)?;
        }

        if !documents.is_empty() {
            {
                let mut shared = self.shared.lock().unwrap();
                shared.last_fetched = info.last_document;
            }
            self.first_batch = false;
            // The boundary entry of any later cursor is already applied.
            self.starting_point = StartingPoint::SkipFirstDoc;
        }

        self.restart_decision.fetch_successful();
        self.backoff = None;

        self.metrics.batches_received += 1;
        self.metrics.network_document_count += info.network_document_count as u64;
        self.metrics.network_document_bytes += info.network_document_bytes as u64;
        self.metrics.documents_enqueued += to_apply.len() as u64;
        self.metrics.last_fetched = self.last_op_time_fetched();
        self.metrics_tx.send(self.metrics.clone()).ok();

        Ok(())
    }

    /// Consults the restart policy about a recoverable error.
    fn check_restart(&mut self, err: &FetcherError) -> bool {
        let diagnostics = FetcherDiagnostics {
            source: self.source.clone(),
            last_fetched: self.last_op_time_fetched(),
        };

        if !self.restart_decision.should_continue(&diagnostics, err) {
            return false;
        }

        self.metrics.restarts += 1;
        self.metrics_tx.send(self.metrics.clone()).ok();
        true
    }

    /// Sleeps one backoff step before the next cursor-recreation attempt.
    async fn sleep_backoff(&mut self) -> Result<(), FetcherError> {
        if self.backoff.is_none() {
            self.backoff = Some(self.connection.backoff());
        }
        let delay = self.backoff.as_mut().and_then(|b| b.next()).unwrap_or(DEFAULT_RESTART_BACKOFF);

        cancelable(&mut self.cancel_rx, async {
            tokio::time::sleep(delay).await;
            Ok(())
        })
        .await
    }

    fn check_shutdown(&self) -> Result<(), FetcherError> {
        if *self.cancel_rx.borrow() {
            return Err(CallbackCanceled::new("oplog fetcher shutting down").into());
        }
        Ok(())
    }

    fn last_op_time_fetched(&self) -> OpTime {
        self.shared.lock().unwrap().last_fetched
    }
}
