use anyhow::Result;
use memoplog::batch;
use memoplog::CursorResponse;
use oplog_fetcher::error::NetworkError;
use oplog_fetcher::error::Unauthorized;
use oplog_fetcher::FetcherError;
use pretty_assertions::assert_eq;

use crate::fixtures::op_time;
use crate::fixtures::HarnessBuilder;

fn network_err() -> FetcherError {
    NetworkError::from_message("connection reset by peer").into()
}

/// Once consecutive failures exceed the budget, the error becomes terminal.
#[tokio::test]
async fn budget_exhaustion_is_terminal() -> Result<()> {
    let harness = HarnessBuilder::new().last_fetched(op_time(100, 1)).max_restarts(1).build();
    harness.source.script_open_error(network_err());
    harness.source.script_open_error(network_err());

    harness.start()?;
    let status = harness.join_status().await;

    let err = status.unwrap_err();
    assert!(matches!(err, FetcherError::Network(_)), "{}", err);
    assert!(harness.enqueued().is_empty());
    assert_eq!(2, harness.source.find_commands().len());
    Ok(())
}

/// A successful batch resets the consecutive-failure counter, so a budget of
/// one survives one failure before and one after the batch.
#[tokio::test]
async fn successful_batch_resets_budget() -> Result<()> {
    let harness = HarnessBuilder::new().last_fetched(op_time(100, 1)).max_restarts(1).build();
    harness.source.script_open_error(network_err());
    harness.source.script_cursor(vec![
        batch(7, &[(100, 1), (110, 1)]),
        CursorResponse::Error(network_err()),
    ]);
    harness
        .source
        .script_cursor(vec![batch(7, &[(110, 1), (120, 1)]), CursorResponse::EndOfStream]);

    harness.start()?;
    let status = harness.join_status().await;
    assert!(status.is_ok(), "status: {:?}", status);

    let enqueued = harness.enqueued();
    assert_eq!(2, enqueued.len());
    assert_eq!(vec![(110, 1)], enqueued[0].op_times());
    assert_eq!(vec![(120, 1)], enqueued[1].op_times());
    Ok(())
}

/// Authorization failures are fatal regardless of the remaining budget.
#[tokio::test]
async fn unauthorized_bypasses_restart_policy() -> Result<()> {
    let harness = HarnessBuilder::new().last_fetched(op_time(100, 1)).max_restarts(5).build();
    harness
        .source
        .script_open_error(Unauthorized::from_message("not authorized on local").into());

    harness.start()?;
    let status = harness.join_status().await;

    let err = status.unwrap_err();
    assert!(matches!(err, FetcherError::Unauthorized(_)), "{}", err);
    assert_eq!(1, harness.source.find_commands().len());
    Ok(())
}
