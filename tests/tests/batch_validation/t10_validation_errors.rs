use anyhow::Result;
use memoplog::batch;
use memoplog::oplog_entry;
use memoplog::reply_metadata;
use memoplog::CursorResponse;
use oplog_fetcher::CursorBatch;
use oplog_fetcher::FetcherError;
use oplog_fetcher::OplogEntry;
use serde_json::json;

use crate::fixtures::op_time;
use crate::fixtures::HarnessBuilder;

/// A first batch that does not begin at our frontier means the source's
/// oplog has moved past us: nothing is enqueued and the fetcher dies with
/// `OplogStartMissing`.
#[tokio::test]
async fn continuity_failure() -> Result<()> {
    let harness = HarnessBuilder::new().last_fetched(op_time(100, 1)).build();
    harness.source.script_cursor(vec![batch(7, &[(105, 1), (110, 1)])]);

    harness.start()?;
    let status = harness.join_status().await;

    let err = status.unwrap_err();
    assert!(matches!(err, FetcherError::OplogStartMissing(_)), "{}", err);
    assert!(harness.enqueued().is_empty());
    Ok(())
}

/// Entries inside a batch must be strictly increasing by timestamp.
#[tokio::test]
async fn out_of_order_within_batch() -> Result<()> {
    let harness = HarnessBuilder::new().last_fetched(op_time(100, 1)).build();
    harness.source.script_cursor(vec![batch(7, &[(100, 1), (120, 1), (115, 1)])]);

    harness.start()?;
    let status = harness.join_status().await;

    let err = status.unwrap_err();
    assert!(matches!(err, FetcherError::OplogOutOfOrder(_)), "{}", err);
    assert!(harness.enqueued().is_empty());
    Ok(())
}

/// Terms may only grow along the log, even while timestamps advance.
#[tokio::test]
async fn term_regression_within_batch() -> Result<()> {
    let harness = HarnessBuilder::new().last_fetched(op_time(100, 1)).build();
    harness.source.script_cursor(vec![batch(7, &[(100, 1), (110, 2), (120, 1)])]);

    harness.start()?;
    let status = harness.join_status().await;

    let err = status.unwrap_err();
    assert!(matches!(err, FetcherError::OplogOutOfOrder(_)), "{}", err);
    assert!(harness.enqueued().is_empty());
    Ok(())
}

/// A document without an optime is a protocol violation, not a restartable
/// condition.
#[tokio::test]
async fn document_without_optime() -> Result<()> {
    let harness = HarnessBuilder::new().last_fetched(op_time(100, 1)).max_restarts(5).build();

    let documents = vec![oplog_entry(100, 1), OplogEntry::new(json!({"op": "n"}))];
    harness.source.script_cursor(vec![CursorResponse::Batch(CursorBatch::new(
        documents,
        reply_metadata(7, op_time(100, 1)),
    ))]);

    harness.start()?;
    let status = harness.join_status().await;

    let err = status.unwrap_err();
    assert!(matches!(err, FetcherError::BadValue(_)), "{}", err);

    // The validation failure bypassed the restart policy: one open only.
    assert_eq!(1, harness.source.find_commands().len());
    Ok(())
}

/// A non-OK return from the enqueue function is fatal and becomes the
/// terminal status.
#[tokio::test]
async fn enqueue_error_is_fatal() -> Result<()> {
    let harness = HarnessBuilder::new()
        .last_fetched(op_time(100, 1))
        .enqueue_error(FetcherError::IllegalState {
            reason: "apply buffer closed".to_string(),
        })
        .build();
    harness
        .source
        .script_cursor(vec![batch(7, &[(100, 1), (110, 1)]), CursorResponse::EndOfStream]);

    harness.start()?;
    let status = harness.join_status().await;

    match status.unwrap_err() {
        FetcherError::IllegalState { reason } => assert_eq!("apply buffer closed", reason),
        other => panic!("expected IllegalState, got: {}", other),
    }
    Ok(())
}
