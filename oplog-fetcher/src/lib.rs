//! A tailing oplog producer for replica set replication.
//!
//! The [`OplogFetcher`], once started, reads operations from a remote sync
//! source's oplog using a tailable, awaitData, exhaust cursor. It validates
//! every batch against the locally known frontier, forwards the replication
//! metadata carried by each response to the
//! [`DataReplicatorExternalState`](external_state::DataReplicatorExternalState),
//! and pushes the operations onto a buffer through the caller-supplied
//! enqueue function.
//!
//! When the cursor fails, the fetcher recreates it from the last fetched
//! optime, subject to a swappable [`RestartDecision`](restart::RestartDecision)
//! policy. When no further progress is possible, or [`OplogFetcher::shutdown`]
//! is called, the terminal status is delivered exactly once through the
//! shutdown callback.

#![allow(clippy::result_large_err)]
#![allow(clippy::uninlined_format_args)]

mod entry;
mod op_time;
mod query;
mod repl_set_config;
mod source;
mod validate;


pub mod config;
pub mod error;
pub mod external_state;
pub mod failpoint;
pub mod fetcher;
pub mod metadata;
pub mod metrics;
pub mod network;
pub mod restart;

pub use anyerror;
pub use anyerror::AnyError;

pub use crate::config::Config;
pub use crate::config::ConfigError;
pub use crate::entry::OplogEntry;
pub use crate::error::FetcherError;
pub use crate::external_state::DataReplicatorExternalState;
pub use crate::failpoint::FailPoint;
pub use crate::failpoint::STOP_REPL_PRODUCER;
pub use crate::fetcher::EnqueueDocumentsFn;
pub use crate::fetcher::FetcherState;
pub use crate::fetcher::OnShutdownCallbackFn;
pub use crate::fetcher::OplogFetcher;
pub use crate::metadata::OplogQueryMetadata;
pub use crate::metadata::ReplMetadata;
pub use crate::metadata::ReplSetMetadata;
pub use crate::metrics::FetcherMetrics;
pub use crate::network::Backoff;
pub use crate::network::CursorBatch;
pub use crate::network::OplogConnection;
pub use crate::network::OplogCursor;
pub use crate::op_time::OpTime;
pub use crate::op_time::Timestamp;
pub use crate::query::make_find_query;
pub use crate::query::make_metadata_request;
pub use crate::repl_set_config::ReplSetConfig;
pub use crate::restart::FetcherDiagnostics;
pub use crate::restart::RestartDecision;
pub use crate::restart::RestartDecisionDefault;
pub use crate::source::HostAndPort;
pub use crate::validate::validate_documents;
pub use crate::validate::DocumentsInfo;
pub use crate::validate::StartingPoint;
