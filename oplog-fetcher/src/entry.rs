use std::fmt::Display;
use std::fmt::Formatter;

use serde_json::Value;

use crate::error::BadValue;
use crate::op_time::OpTime;

/// One oplog entry as received from the sync source.
///
/// The fetcher treats the entry as opaque: it only ever reads the `ts` and
/// `t` fields and the serialized size. Everything else is interpreted by the
/// apply pipeline downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct OplogEntry {
    doc: Value,
}

impl OplogEntry {
    pub fn new(doc: Value) -> Self {
        OplogEntry { doc }
    }

    /// The optime this entry was written at, from its `ts` and `t` fields.
    pub fn op_time(&self) -> Result<OpTime, BadValue> {
        let timestamp = match self.doc.get("ts") {
            Some(ts) => serde_json::from_value(ts.clone())
                .map_err(|e| BadValue::new(&e))?,
            None => {
                return Err(BadValue::from_message(format!(
                    "no 'ts' field in oplog entry: {}",
                    self.doc
                )));
            }
        };

        let term = match self.doc.get("t").and_then(Value::as_i64) {
            Some(t) => t,
            None => {
                return Err(BadValue::from_message(format!(
                    "no 't' field in oplog entry: {}",
                    self.doc
                )));
            }
        };

        Ok(OpTime::new(timestamp, term))
    }

    /// Serialized size of the entry, counted toward the batch byte totals.
    pub fn byte_size(&self) -> usize {
        self.doc.to_string().len()
    }

    pub fn document(&self) -> &Value {
        &self.doc
    }

    pub fn into_document(self) -> Value {
        self.doc
    }
}

impl Display for OplogEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.doc)
    }
}
