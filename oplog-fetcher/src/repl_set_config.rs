use std::time::Duration;

/// Read-only view of the replica set configuration, restricted to the fields
/// the fetcher consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct ReplSetConfig {
    /// Name of the replica set this node belongs to.
    pub replica_set_name: String,

    /// Election timeout of the set, in milliseconds.
    ///
    /// The await-data timeout for tailing the oplog is derived from this: a
    /// sync source is allowed to block a `getMore` for at most half an
    /// election timeout, so a dead source is noticed before an election
    /// would be.
    pub election_timeout: u64,

    /// The current term, attached to the `find` command so a stale reader is
    /// rejected by the remote. `None` omits the field.
    pub current_term: Option<i64>,
}

impl ReplSetConfig {
    pub fn new(replica_set_name: impl ToString, election_timeout: u64, current_term: Option<i64>) -> Self {
        ReplSetConfig {
            replica_set_name: replica_set_name.to_string(),
            election_timeout,
            current_term,
        }
    }

    pub fn election_timeout(&self) -> Duration {
        Duration::from_millis(self.election_timeout)
    }

    /// How long the sync source may block awaiting new oplog entries.
    pub fn await_data_timeout(&self) -> Duration {
        Duration::from_millis(self.election_timeout / 2)
    }
}
