use std::time::Duration;

use anyerror::AnyError;
use clap::Parser;

use crate::config::error::ConfigError;

/// Runtime configuration for an oplog fetcher.
///
/// `Config` controls the query deadlines and the restart budgets. Create a
/// configuration, optionally customize fields, validate it, and pass it to
/// [`OplogFetcher::new`](crate::OplogFetcher::new):
///
/// ```ignore
/// let config = Config {
///     retried_find_timeout: 1_000,
///     ..Default::default()
/// };
/// let config = Arc::new(config.validate()?);
/// ```
#[derive(Clone, Debug, Parser)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct Config {
    /// How long the initial `find` against a freshly selected sync source may
    /// run before timing out, in milliseconds.
    ///
    /// Cold-starting a cursor is allowed to be slow; this is deliberately
    /// much longer than `retried_find_timeout`.
    #[clap(long, default_value = "60000")]
    pub initial_find_timeout: u64,

    /// How long a `find` may run when the cursor is being recreated after an
    /// error, in milliseconds.
    ///
    /// A communication failure with an upstream node may mean it is
    /// unreachable, so the retried deadline is kept short.
    #[clap(long, default_value = "2000")]
    pub retried_find_timeout: u64,

    /// Restart budget of the default restart policy during steady-state
    /// replication.
    #[clap(long, default_value = "1")]
    pub steady_state_max_fetcher_restarts: u64,

    /// Restart budget of the default restart policy during initial sync,
    /// where losing the sync source is much more expensive.
    #[clap(long, default_value = "10")]
    pub initial_sync_max_fetcher_restarts: u64,
}

impl Default for Config {
    fn default() -> Self {
        <Self as Parser>::parse_from(Vec::<&'static str>::new())
    }
}

impl Config {
    /// Deadline for the initial `find` on a new sync source.
    pub fn initial_find_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_find_timeout)
    }

    /// Deadline for a `find` issued while recreating a failed cursor.
    pub fn retried_find_timeout(&self) -> Duration {
        Duration::from_millis(self.retried_find_timeout)
    }

    /// Build a `Config` instance from a series of command line arguments.
    ///
    /// The first element in `args` must be the application name.
    pub fn build(args: &[&str]) -> Result<Config, ConfigError> {
        let config = <Self as Parser>::try_parse_from(args).map_err(|e| ConfigError::ParseError {
            source: AnyError::from(&e),
            args: args.iter().map(|x| x.to_string()).collect(),
        })?;
        config.validate()
    }

    /// Validate the state of this config.
    pub fn validate(self) -> Result<Config, ConfigError> {
        if self.initial_find_timeout == 0 {
            return Err(ConfigError::TimeoutIs0 {
                timeout: "initial_find_timeout".to_string(),
            });
        }

        if self.retried_find_timeout == 0 {
            return Err(ConfigError::TimeoutIs0 {
                timeout: "retried_find_timeout".to_string(),
            });
        }

        if self.retried_find_timeout >= self.initial_find_timeout {
            return Err(ConfigError::FindTimeout {
                initial: self.initial_find_timeout,
                retried: self.retried_find_timeout,
            });
        }

        Ok(self)
    }
}
