use std::sync::Arc;
use std::sync::OnceLock;

use anyhow::Result;
use memoplog::batch;
use memoplog::CursorResponse;
use memoplog::MemSyncSource;
use oplog_fetcher::FetcherError;
use oplog_fetcher::FetcherState;
use oplog_fetcher::OplogFetcher;
use pretty_assertions::assert_eq;

use crate::fixtures::op_time;
use crate::fixtures::HarnessBuilder;

/// Shutdown while the driver is blocked waiting for the next batch: the wait
/// is interrupted, the terminal status is canceled, the callback fires
/// exactly once, and nothing further is enqueued.
#[tokio::test]
async fn shutdown_interrupts_blocked_batch_wait() -> Result<()> {
    let harness = HarnessBuilder::new().last_fetched(op_time(100, 1)).build();
    harness
        .source
        .script_cursor(vec![batch(7, &[(100, 1), (110, 1)]), CursorResponse::Hang]);

    harness.start()?;
    harness.wait_for_enqueued(1).await;

    harness.fetcher.shutdown();
    let status = harness.join_status().await;

    let err = status.unwrap_err();
    assert!(err.is_canceled(), "{}", err);

    assert_eq!(1, harness.enqueued().len());
    assert!(!harness.fetcher.is_active());
    assert_eq!(FetcherState::Complete, harness.fetcher.state());
    Ok(())
}

/// Shutting down twice delivers the callback once.
#[tokio::test]
async fn shutdown_is_idempotent() -> Result<()> {
    let harness = HarnessBuilder::new().last_fetched(op_time(100, 1)).build();
    harness.source.script_cursor(vec![CursorResponse::Hang]);

    harness.start()?;
    harness.fetcher.shutdown();
    harness.fetcher.shutdown();

    let status = harness.join_status().await;
    assert!(status.unwrap_err().is_canceled());
    Ok(())
}

/// A fetcher that is shut down before it was started completes without ever
/// invoking the shutdown callback, and can no longer be started.
#[tokio::test]
async fn shutdown_before_start() -> Result<()> {
    let harness = HarnessBuilder::new().build();

    harness.fetcher.shutdown();
    harness.join().await;

    assert!(harness.shutdown_statuses().is_empty());
    assert!(!harness.fetcher.is_active());

    let err = harness.start().unwrap_err();
    assert!(matches!(err, FetcherError::IllegalState { .. }), "{}", err);
    Ok(())
}

/// `start()` is idempotent-failing: the second call fails and does not
/// disturb the running fetcher.
#[tokio::test]
async fn double_start_fails() -> Result<()> {
    let harness = HarnessBuilder::new().build();
    harness.source.script_cursor(vec![CursorResponse::Hang]);

    harness.start()?;
    let err = harness.start().unwrap_err();
    assert!(matches!(err, FetcherError::IllegalState { .. }), "{}", err);
    assert!(harness.fetcher.is_active());

    harness.fetcher.shutdown();
    let status = harness.join_status().await;
    assert!(status.unwrap_err().is_canceled());
    Ok(())
}

/// Shutdown may be requested from inside the enqueue callback; the driver
/// observes it before touching the apply buffer again.
#[tokio::test]
async fn shutdown_from_enqueue_callback() -> Result<()> {
    let slot: Arc<OnceLock<Arc<OplogFetcher<MemSyncSource>>>> = Arc::new(OnceLock::new());

    let harness = HarnessBuilder::new()
        .last_fetched(op_time(100, 1))
        .on_enqueue({
            let slot = slot.clone();
            move || {
                if let Some(fetcher) = slot.get() {
                    fetcher.shutdown();
                }
            }
        })
        .build();
    harness.source.script_cursor(vec![
        batch(7, &[(100, 1), (110, 1)]),
        batch(7, &[(120, 1), (130, 1)]),
        CursorResponse::Hang,
    ]);

    slot.set(harness.fetcher.clone()).ok();
    harness.start()?;

    let status = harness.join_status().await;
    assert!(status.unwrap_err().is_canceled());
    assert_eq!(1, harness.enqueued().len());
    Ok(())
}
