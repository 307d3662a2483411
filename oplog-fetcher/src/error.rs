//! Error types exposed by this crate.

use std::error::Error;
use std::time::Duration;

use anyerror::AnyError;

use crate::op_time::OpTime;
use crate::op_time::Timestamp;
use crate::source::HostAndPort;

/// Oplog fetching was interrupted intentionally, by shutdown or task
/// cancellation. No further fetching action should be taken.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("oplog fetching canceled: {reason}")]
pub struct CallbackCanceled {
    reason: String,
}

impl CallbackCanceled {
    pub fn new(reason: impl ToString) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }
}

/// A transport-level failure talking to the sync source.
///
/// The restart policy decides whether a new cursor is worth attempting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("NetworkError: {source}")]
pub struct NetworkError {
    #[from]
    source: AnyError,
}

impl NetworkError {
    pub fn new<E: Error + 'static>(e: &E) -> Self {
        Self {
            source: AnyError::new(e),
        }
    }

    pub fn from_message(msg: impl ToString) -> Self {
        Self {
            source: AnyError::error(msg),
        }
    }
}

/// The remote did not respond within the `maxTimeMS` attached to the
/// request, or the await-data window elapsed without a reply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("exceeded time limit ({timeout:?}) during {action}")]
pub struct ExceededTimeLimit {
    pub action: String,
    pub timeout: Duration,
}

impl ExceededTimeLimit {
    pub fn new(action: impl ToString, timeout: Duration) -> Self {
        Self {
            action: action.to_string(),
            timeout,
        }
    }
}

/// The first batch from a new cursor does not begin at the last fetched
/// timestamp: the source's oldest available entry is already past our
/// frontier. Unrecoverable; the node must resync.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("our last optime fetched: {expected}; first optime received: {received}; the sync source no longer has the oplog entries we need")]
pub struct OplogStartMissing {
    pub expected: Timestamp,
    pub received: Timestamp,
}

/// Adjacent oplog entries violate the log's total order, either by
/// timestamp or by a decreasing term.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("out-of-order oplog entries: {next} is not after {prev}")]
pub struct OplogOutOfOrder {
    pub prev: OpTime,
    pub next: OpTime,
}

/// The sync source is no longer a valid upstream: it rolled back, is not
/// ahead of us, or was revoked by external policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid sync source {source}: {reason}")]
pub struct InvalidSyncSource {
    pub source: HostAndPort,
    pub reason: String,
}

impl InvalidSyncSource {
    pub fn new(source: HostAndPort, reason: impl ToString) -> Self {
        Self {
            source,
            reason: reason.to_string(),
        }
    }
}

/// A reply or document did not have the shape the protocol requires.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("BadValue: {source}")]
pub struct BadValue {
    #[from]
    source: AnyError,
}

impl BadValue {
    pub fn new<E: Error + 'static>(e: &E) -> Self {
        Self {
            source: AnyError::new(e),
        }
    }

    pub fn from_message(msg: impl ToString) -> Self {
        Self {
            source: AnyError::error(msg),
        }
    }
}

/// The sync source rejected our credentials.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unauthorized: {source}")]
pub struct Unauthorized {
    #[from]
    source: AnyError,
}

impl Unauthorized {
    pub fn new<E: Error + 'static>(e: &E) -> Self {
        Self {
            source: AnyError::new(e),
        }
    }

    pub fn from_message(msg: impl ToString) -> Self {
        Self {
            source: AnyError::error(msg),
        }
    }
}

/// Terminal status of the oplog fetcher, and the error type every internal
/// operation propagates.
///
/// [`FetcherError::is_recoverable`] tells whether the restart policy may
/// absorb the error by opening a new cursor; everything else bypasses the
/// policy and terminates the fetcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetcherError {
    #[error(transparent)]
    Canceled(#[from] CallbackCanceled),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    ExceededTimeLimit(#[from] ExceededTimeLimit),

    #[error(transparent)]
    OplogStartMissing(#[from] OplogStartMissing),

    #[error(transparent)]
    OplogOutOfOrder(#[from] OplogOutOfOrder),

    #[error(transparent)]
    InvalidSyncSource(#[from] InvalidSyncSource),

    #[error(transparent)]
    BadValue(#[from] BadValue),

    #[error(transparent)]
    Unauthorized(#[from] Unauthorized),

    /// An operation was attempted in a lifecycle state that forbids it,
    /// e.g. calling `start()` twice.
    #[error("illegal state: {reason}")]
    IllegalState { reason: String },
}

impl FetcherError {
    /// Whether the restart policy may absorb this error and reopen the
    /// cursor. Only transient transport conditions qualify.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FetcherError::Network(_) | FetcherError::ExceededTimeLimit(_))
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, FetcherError::Canceled(_))
    }
}
