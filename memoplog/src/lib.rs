//! An in-memory, scripted sync source for testing the oplog fetcher.
//!
//! A [`MemSyncSource`] is driven by a script: each cursor open consumes the
//! next scripted outcome (a cursor with its own response sequence, or a
//! failure), and records the `find` command it was issued so tests can
//! assert on the wire surface. A cursor whose script runs dry behaves like a
//! quiet tailable source: it blocks for the await-data window and replies
//! with an empty batch.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use oplog_fetcher::Backoff;
use oplog_fetcher::CursorBatch;
use oplog_fetcher::FetcherError;
use oplog_fetcher::HostAndPort;
use oplog_fetcher::OpTime;
use oplog_fetcher::OplogConnection;
use oplog_fetcher::OplogCursor;
use oplog_fetcher::OplogEntry;
use oplog_fetcher::Timestamp;
use serde_json::json;
use serde_json::Value;


/// One scripted cursor response.
#[derive(Debug)]
pub enum CursorResponse {
    /// Deliver a batch of documents with the given reply metadata.
    Batch(CursorBatch),

    /// Fail the batch request.
    Error(FetcherError),

    /// Close the cursor cleanly.
    EndOfStream,

    /// Never reply; the request stays pending until the fetcher is shut
    /// down and the in-flight future is dropped.
    Hang,
}

#[derive(Debug, Default)]
struct Inner {
    /// One entry per expected `open_cursor` call.
    opens: VecDeque<Result<VecDeque<CursorResponse>, FetcherError>>,

    /// Every `find` command received, in order.
    find_commands: Vec<Value>,

    /// Every request-metadata document received, in order.
    metadata_requests: Vec<Value>,

    restart_backoff: Duration,
}

/// A scripted oplog sync source kept entirely in memory.
///
/// Clones share the same script and record log, so a test can keep one
/// handle while the fetcher owns another.
#[derive(Debug, Clone)]
pub struct MemSyncSource {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemSyncSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemSyncSource {
    pub fn new() -> Self {
        MemSyncSource {
            inner: Arc::new(Mutex::new(Inner {
                // Keep scripted restart sequences fast.
                restart_backoff: Duration::from_millis(10),
                ..Default::default()
            })),
        }
    }

    /// Scripts the next cursor open to succeed, delivering `responses` in
    /// order.
    pub fn script_cursor(&self, responses: Vec<CursorResponse>) {
        let mut inner = self.inner.lock().unwrap();
        inner.opens.push_back(Ok(responses.into()));
    }

    /// Scripts the next cursor open to fail with `err`.
    pub fn script_open_error(&self, err: FetcherError) {
        let mut inner = self.inner.lock().unwrap();
        inner.opens.push_back(Err(err));
    }

    /// Overrides the constant restart backoff advertised to the fetcher.
    pub fn set_restart_backoff(&self, backoff: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.restart_backoff = backoff;
    }

    /// All `find` commands received so far.
    pub fn find_commands(&self) -> Vec<Value> {
        self.inner.lock().unwrap().find_commands.clone()
    }

    /// All request-metadata documents received so far.
    pub fn metadata_requests(&self) -> Vec<Value> {
        self.inner.lock().unwrap().metadata_requests.clone()
    }
}

#[async_trait]
impl OplogConnection for MemSyncSource {
    type Cursor = MemOplogCursor;

    async fn open_cursor(
        &mut self,
        _source: &HostAndPort,
        find_cmd: &Value,
        metadata_request: &Value,
    ) -> Result<Self::Cursor, FetcherError> {
        let mut inner = self.inner.lock().unwrap();
        inner.find_commands.push(find_cmd.clone());
        inner.metadata_requests.push(metadata_request.clone());

        match inner.opens.pop_front() {
            Some(Ok(responses)) => Ok(MemOplogCursor { responses }),
            Some(Err(err)) => Err(err),
            // Unscripted open: an empty cursor, which idles like a quiet
            // tailable source.
            None => Ok(MemOplogCursor {
                responses: VecDeque::new(),
            }),
        }
    }

    fn backoff(&self) -> Backoff {
        let backoff = self.inner.lock().unwrap().restart_backoff;
        Backoff::new(std::iter::repeat(backoff))
    }
}

/// A cursor replaying its scripted responses.
#[derive(Debug)]
pub struct MemOplogCursor {
    responses: VecDeque<CursorResponse>,
}

#[async_trait]
impl OplogCursor for MemOplogCursor {
    async fn next_batch(&mut self, await_data_timeout: Duration) -> Result<Option<CursorBatch>, FetcherError> {
        match self.responses.pop_front() {
            Some(CursorResponse::Batch(batch)) => Ok(Some(batch)),
            Some(CursorResponse::Error(err)) => Err(err),
            Some(CursorResponse::EndOfStream) => Ok(None),
            Some(CursorResponse::Hang) => std::future::pending().await,
            None => {
                // Script exhausted: behave like a source with no new
                // entries, replying empty after the await-data window.
                tokio::time::sleep(await_data_timeout).await;
                Ok(Some(CursorBatch::new(Vec::new(), Value::Null)))
            }
        }
    }
}

/// Builds an oplog entry at `(secs, term)` with a fixed shape, the way a
/// no-op write would appear on the wire.
pub fn oplog_entry(secs: u32, term: i64) -> OplogEntry {
    OplogEntry::new(json!({
        "ts": {"secs": secs, "inc": 0},
        "t": term,
        "op": "i",
        "ns": "test.coll",
        "o": {"_id": secs},
    }))
}

/// Builds a full reply-metadata document whose `$oplogQueryData` carries
/// `rbid` and whose optimes all sit at `last_applied`.
pub fn reply_metadata(rbid: i64, last_applied: OpTime) -> Value {
    json!({
        "$replData": {
            "term": last_applied.term(),
            "lastOpCommitted": last_applied,
            "lastOpVisible": last_applied,
            "configVersion": 2,
            "primaryIndex": 0,
            "syncSourceIndex": -1,
            "isPrimary": true,
        },
        "$oplogQueryData": {
            "rbid": rbid,
            "lastOpApplied": last_applied,
            "lastOpCommitted": last_applied,
            "primaryIndex": 0,
            "syncSourceIndex": -1,
        },
    })
}

/// `Batch` response of entries at `(secs, term)` pairs, with metadata from
/// [`reply_metadata`] positioned at the last entry.
pub fn batch(rbid: i64, entries: &[(u32, i64)]) -> CursorResponse {
    let documents: Vec<OplogEntry> = entries.iter().map(|(secs, term)| oplog_entry(*secs, *term)).collect();

    let last_applied = entries
        .last()
        .map(|(secs, term)| OpTime::new(Timestamp::new(*secs, 0), *term))
        .unwrap_or_default();

    CursorResponse::Batch(CursorBatch::new(documents, reply_metadata(rbid, last_applied)))
}
