//! The connection seam between the fetcher and the remote database client.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::entry::OplogEntry;
use crate::error::FetcherError;
use crate::source::HostAndPort;

/// A backoff instance that is an infinite iterator of durations to sleep
/// before the next cursor-recreation attempt after a recoverable error.
pub struct Backoff {
    inner: Box<dyn Iterator<Item = Duration> + Send + 'static>,
}

impl Backoff {
    pub fn new(iter: impl Iterator<Item = Duration> + Send + 'static) -> Self {
        Self { inner: Box::new(iter) }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// One cursor response: an ordered run of oplog entries plus the reply
/// metadata document (`Value::Null` when the response carried none).
///
/// Batches are never reordered. An empty `documents` vector is a legal
/// response from a tailable cursor whose await-data window elapsed.
#[derive(Debug, Clone)]
pub struct CursorBatch {
    pub documents: Vec<OplogEntry>,
    pub metadata: Value,
}

impl CursorBatch {
    pub fn new(documents: Vec<OplogEntry>, metadata: Value) -> Self {
        CursorBatch { documents, metadata }
    }
}

/// A client connection to a sync source, able to establish oplog cursors.
///
/// A single connection instance talks to a single sync source. The transport
/// behind it is opaque to the fetcher; implementations translate their own
/// failure modes into [`FetcherError`] variants so the restart policy can
/// classify them.
#[async_trait]
pub trait OplogConnection: Send + 'static {
    type Cursor: OplogCursor;

    /// Issues `find_cmd` with `metadata_request` attached and returns the
    /// resulting tailable, awaitData, exhaust cursor.
    async fn open_cursor(
        &mut self,
        source: &HostAndPort,
        find_cmd: &Value,
        metadata_request: &Value,
    ) -> Result<Self::Cursor, FetcherError>;

    /// Build a backoff instance consulted between cursor-recreation attempts
    /// when errors persist.
    ///
    /// The backoff is an infinite iterator that returns the ith sleep
    /// interval before the ith attempt. The instance is dropped after a
    /// successful batch.
    ///
    /// By default, it returns a constant backoff of 500 ms.
    fn backoff(&self) -> Backoff {
        Backoff::new(std::iter::repeat(Duration::from_millis(500)))
    }
}

/// A live cursor over the remote oplog.
#[async_trait]
pub trait OplogCursor: Send + 'static {
    /// Receives the next batch pushed by the exhaust cursor.
    ///
    /// Returns `Ok(None)` when the server closed the cursor cleanly (end of
    /// stream). The remote may block for at most `await_data_timeout`
    /// waiting for new entries before replying with an empty batch.
    async fn next_batch(&mut self, await_data_timeout: Duration) -> Result<Option<CursorBatch>, FetcherError>;
}
