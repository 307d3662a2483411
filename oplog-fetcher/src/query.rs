use std::time::Duration;

use serde_json::json;
use serde_json::Value;

use crate::op_time::OpTime;

/// Namespace of the replica set oplog on the sync source.
pub const OPLOG_NS: &str = "local.oplog.rs";

/// Builds the `find` command that establishes the tailable, awaitData,
/// exhaust cursor on the sync source's oplog.
///
/// The filter starts at `last_fetched` itself: the boundary entry is
/// re-fetched so the first batch can prove continuity with our frontier.
/// When the caller supplies a `term`, the sync source uses it to reject
/// readers whose term is stale.
pub fn make_find_query(last_fetched: OpTime, term: Option<i64>, batch_size: u64, max_time: Duration) -> Value {
    let mut cmd = json!({
        "find": OPLOG_NS,
        "filter": { "ts": { "$gte": last_fetched.timestamp() } },
        "tailable": true,
        "awaitData": true,
        "batchSize": batch_size,
        "maxTimeMS": max_time.as_millis() as u64,
    });

    if let Some(term) = term {
        if let Value::Object(fields) = &mut cmd {
            fields.insert("term".to_string(), json!(term));
        }
    }

    cmd
}

/// Builds the request-metadata document asking the sync source to attach
/// `$oplogQueryData` and `$replData` to every reply.
pub fn make_metadata_request() -> Value {
    json!({
        "$oplogQueryData": 1,
        "$replData": 1,
    })
}
