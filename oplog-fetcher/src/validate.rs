//! Validation of batches received from the sync source.

use crate::entry::OplogEntry;
use crate::error::FetcherError;
use crate::error::OplogOutOfOrder;
use crate::error::OplogStartMissing;
use crate::op_time::OpTime;
use crate::op_time::Timestamp;

/// Whether the leading document of the first batch, which re-fetches the
/// entry at our frontier to prove continuity, is enqueued or skipped.
///
/// It is normally skipped: the entry was already applied. During initial
/// sync the boundary entry may still be needed by the applier, in which case
/// it is enqueued too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartingPoint {
    SkipFirstDoc,
    EnqueueFirstDoc,
}

/// Statistics on one batch of operations returned by the sync source.
///
/// The `network_*` counts cover everything observed on the wire; the
/// `to_apply_*` counts exclude a skipped leading document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentsInfo {
    pub network_document_count: usize,
    pub network_document_bytes: usize,
    pub to_apply_document_count: usize,
    pub to_apply_document_bytes: usize,
    pub last_document: OpTime,
}

/// Validates a batch of documents returned from tailing the remote oplog.
///
/// `first_batch` must be true if this is the first batch returned by the
/// current cursor; `last_ts` is the timestamp of the last entry fetched and
/// processed. Checks, in order:
///
/// - an empty batch is legal and short-circuits with zero counts;
/// - on the first batch, the leading document must sit exactly at `last_ts`;
/// - timestamps are strictly increasing, starting from `last_ts` for a
///   non-first batch;
/// - terms never decrease within the batch.
///
/// On success, returns statistics on the operations.
pub fn validate_documents(
    documents: &[OplogEntry],
    first_batch: bool,
    last_ts: Timestamp,
    starting_point: StartingPoint,
) -> Result<DocumentsInfo, FetcherError> {
    if documents.is_empty() {
        return Ok(DocumentsInfo {
            last_document: OpTime::from_timestamp(last_ts),
            ..Default::default()
        });
    }

    let mut info = DocumentsInfo {
        network_document_count: documents.len(),
        ..Default::default()
    };

    let mut prev_ts = last_ts;
    let mut prev_term: Option<i64> = None;

    for (i, doc) in documents.iter().enumerate() {
        info.network_document_bytes += doc.byte_size();

        let op_time = doc.op_time()?;

        if i == 0 && first_batch {
            // The query is from the greater than or equal to the last fetched
            // timestamp, so the first returned entry must be the one we
            // already have.
            if op_time.timestamp() != last_ts {
                return Err(OplogStartMissing {
                    expected: last_ts,
                    received: op_time.timestamp(),
                }
                .into());
            }
        } else if op_time.timestamp() <= prev_ts {
            return Err(OplogOutOfOrder {
                prev: OpTime::new(prev_ts, prev_term.unwrap_or(OpTime::UNINITIALIZED_TERM)),
                next: op_time,
            }
            .into());
        }

        if let Some(prev_term) = prev_term {
            if op_time.term() < prev_term {
                return Err(OplogOutOfOrder {
                    prev: OpTime::new(prev_ts, prev_term),
                    next: op_time,
                }
                .into());
            }
        }

        prev_ts = op_time.timestamp();
        prev_term = Some(op_time.term());
        info.last_document = op_time;
    }

    info.to_apply_document_count = info.network_document_count;
    info.to_apply_document_bytes = info.network_document_bytes;

    if first_batch && starting_point == StartingPoint::SkipFirstDoc {
        // The leading document was already applied; it only proved
        // continuity and will not be handed downstream again.
        info.to_apply_document_count -= 1;
        info.to_apply_document_bytes -= documents[0].byte_size();
    }

    Ok(info)
}
