//! Observable counters describing the fetcher's progress.

use crate::op_time::OpTime;

/// A snapshot of the fetcher's counters, published through a watch channel
/// after every processed batch.
///
/// Obtain a receiver with [`OplogFetcher::metrics`](crate::OplogFetcher::metrics);
/// the referenced value is always the latest snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct FetcherMetrics {
    /// Responses received from the sync source, including empty ones.
    pub batches_received: u64,

    /// Documents observed on the wire.
    pub network_document_count: u64,

    /// Bytes of documents observed on the wire.
    pub network_document_bytes: u64,

    /// Documents handed to the apply pipeline.
    pub documents_enqueued: u64,

    /// Cursor recreations since the fetcher started.
    pub restarts: u64,

    /// The frontier: highest optime handed downstream.
    pub last_fetched: OpTime,
}
