use anyerror::AnyError;

/// Error variants related to configuration.
#[derive(Debug, thiserror::Error)]
#[derive(PartialEq, Eq)]
pub enum ConfigError {
    /// Failed to parse configuration from command-line arguments.
    #[error("ParseError: {source} while parsing ({args:?})")]
    ParseError {
        /// The underlying parse error.
        source: AnyError,
        /// The arguments that failed to parse.
        args: Vec<String>,
    },

    /// The retried find timeout is not smaller than the initial find timeout.
    #[error("find timeout: retried({retried}) must be < initial({initial})")]
    FindTimeout {
        /// Initial find timeout in milliseconds.
        initial: u64,
        /// Retried find timeout in milliseconds.
        retried: u64,
    },

    /// A timeout that must be positive was configured as zero.
    #[error("{timeout} must be > 0")]
    TimeoutIs0 {
        /// Name of the offending timeout field.
        timeout: String,
    },
}
