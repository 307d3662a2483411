//! Replication metadata attached by the sync source to every reply.

use serde_json::Value;

use crate::error::BadValue;
use crate::op_time::OpTime;

/// The `$replData` reply section: the sync source's view of the replica set.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct ReplSetMetadata {
    pub term: i64,

    #[serde(rename = "lastOpCommitted")]
    pub last_op_committed: OpTime,

    #[serde(rename = "lastOpVisible")]
    pub last_op_visible: OpTime,

    #[serde(rename = "configVersion")]
    pub config_version: i64,

    #[serde(rename = "primaryIndex")]
    pub primary_index: i64,

    #[serde(rename = "syncSourceIndex")]
    pub sync_source_index: i64,

    #[serde(rename = "isPrimary", default)]
    pub is_primary: bool,
}

/// The `$oplogQueryData` reply section: what an oplog reader needs to judge
/// its sync source.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct OplogQueryMetadata {
    /// Rollback identifier. Increments on every rollback of the remote; a
    /// change invalidates any previously selected sync source.
    pub rbid: i64,

    #[serde(rename = "lastOpApplied")]
    pub last_op_applied: OpTime,

    #[serde(rename = "lastOpCommitted")]
    pub last_op_committed: OpTime,

    #[serde(rename = "primaryIndex")]
    pub primary_index: i64,

    #[serde(rename = "syncSourceIndex")]
    pub sync_source_index: i64,
}

/// Both metadata sections of one reply, parsed into a structured record.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct ReplMetadata {
    #[serde(rename = "$replData")]
    pub repl_data: ReplSetMetadata,

    #[serde(rename = "$oplogQueryData")]
    pub oplog_query_data: OplogQueryMetadata,
}

impl ReplMetadata {
    /// Parses the raw reply metadata document. A reply missing either
    /// section, or carrying malformed optimes, is a protocol violation.
    pub fn parse(value: &Value) -> Result<Self, BadValue> {
        serde_json::from_value(value.clone()).map_err(|e| BadValue::new(&e))
    }

    pub fn rbid(&self) -> i64 {
        self.oplog_query_data.rbid
    }
}
