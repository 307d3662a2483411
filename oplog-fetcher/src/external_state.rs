use crate::metadata::ReplMetadata;
use crate::source::HostAndPort;

/// Hooks into the replication coordinator consulted on every reply that
/// carries metadata.
///
/// This is how external policy observes the sync source's progress and, when
/// the source stops being a valid upstream (it is no longer primary, a
/// fresher source exists), revokes the stream mid-flight.
pub trait DataReplicatorExternalState: Send + Sync + 'static {
    /// Digest the replication metadata of one reply.
    fn process_metadata(&self, metadata: &ReplMetadata);

    /// Whether fetching from `source` must stop. Returning `true` terminates
    /// the fetcher with an invalid-sync-source status.
    fn should_stop_fetching(&self, source: &HostAndPort, metadata: &ReplMetadata) -> bool;
}
