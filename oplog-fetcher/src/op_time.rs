use std::fmt::Display;
use std::fmt::Formatter;

/// A position in the oplog's total order, as stamped by the sync source.
///
/// Ordering is derived from `(secs, inc)`: `inc` disambiguates entries
/// written within the same wall-clock second.
#[derive(Debug, Default, Copy, Clone, PartialOrd, Ord, PartialEq, Eq, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct Timestamp {
    pub secs: u32,
    pub inc: u32,
}

impl Timestamp {
    pub fn new(secs: u32, inc: u32) -> Self {
        Timestamp { secs, inc }
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.secs, self.inc)
    }
}

/// The identity of an oplog entry: a timestamp and the term in which it was
/// written. Two `OpTime`s are equal iff both components match.
///
/// The serde field names are the wire names: an `OpTime` deserializes
/// directly out of an oplog entry document or a metadata optime field.
#[derive(Debug, Copy, Clone, PartialOrd, Ord, PartialEq, Eq, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct OpTime {
    #[serde(rename = "ts")]
    pub timestamp: Timestamp,

    #[serde(rename = "t")]
    pub term: i64,
}

impl OpTime {
    /// Term value for an optime whose term is not known, e.g. a bare
    /// timestamp packaged as an `OpTime`.
    pub const UNINITIALIZED_TERM: i64 = -1;

    pub fn new(timestamp: Timestamp, term: i64) -> Self {
        OpTime { timestamp, term }
    }

    /// Packages a bare timestamp without a known term.
    pub fn from_timestamp(timestamp: Timestamp) -> Self {
        OpTime {
            timestamp,
            term: Self::UNINITIALIZED_TERM,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn term(&self) -> i64 {
        self.term
    }
}

impl Default for OpTime {
    fn default() -> Self {
        OpTime {
            timestamp: Timestamp::default(),
            term: Self::UNINITIALIZED_TERM,
        }
    }
}

impl Display for OpTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, t: {})", self.timestamp, self.term)
    }
}
