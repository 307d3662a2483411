//! The restart capability: decides whether a failed cursor is recreated.

use std::fmt::Display;
use std::fmt::Formatter;

use crate::config::Config;
use crate::error::FetcherError;
use crate::op_time::OpTime;
use crate::source::HostAndPort;

/// Read-only snapshot of the fetcher handed to the restart policy for
/// logging. The policy must not try to steer the fetcher through it.
#[derive(Debug, Clone)]
pub struct FetcherDiagnostics {
    pub source: HostAndPort,
    pub last_fetched: OpTime,
}

impl Display for FetcherDiagnostics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "source: {}, last fetched optime: {}", self.source, self.last_fetched)
    }
}

/// Defines in which situations the oplog fetcher recreates its cursor after
/// an error, instead of shutting down.
///
/// Steady-state replication and initial sync plug in different budgets; test
/// doubles plug in scripted answers. Fatal errors (validation failures,
/// authorization failures, cancellation) never reach the policy.
pub trait RestartDecision: Send + 'static {
    /// Called when getting the next batch failed with a recoverable error.
    /// Returning `false` makes the error terminal.
    fn should_continue(&mut self, fetcher: &FetcherDiagnostics, err: &FetcherError) -> bool;

    /// Called when a batch was successfully fetched, to reset any state
    /// tracking consecutive restarts.
    fn fetch_successful(&mut self);
}

/// The default restart policy: allows up to `max_restarts` consecutive
/// failures, counting from the last successful batch.
#[derive(Debug)]
pub struct RestartDecisionDefault {
    /// Restarts since the last successful oplog query response.
    num_restarts: u64,

    max_restarts: u64,
}

impl RestartDecisionDefault {
    pub fn new(max_restarts: u64) -> Self {
        RestartDecisionDefault {
            num_restarts: 0,
            max_restarts,
        }
    }

    /// Policy with the configured steady-state budget.
    pub fn steady_state(config: &Config) -> Self {
        Self::new(config.steady_state_max_fetcher_restarts)
    }

    /// Policy with the configured initial-sync budget.
    pub fn initial_sync(config: &Config) -> Self {
        Self::new(config.initial_sync_max_fetcher_restarts)
    }
}

impl RestartDecision for RestartDecisionDefault {
    fn should_continue(&mut self, fetcher: &FetcherDiagnostics, err: &FetcherError) -> bool {
        if self.num_restarts == self.max_restarts {
            tracing::error!(
                "error returned from oplog query (no more query restarts left): {}; {}",
                err,
                fetcher
            );
            return false;
        }

        self.num_restarts += 1;
        tracing::info!(
            "recreating cursor for oplog fetch due to error: {}; attempts remaining: {}; {}",
            err,
            self.max_restarts - self.num_restarts,
            fetcher
        );
        true
    }

    fn fetch_successful(&mut self) {
        self.num_restarts = 0;
    }
}
