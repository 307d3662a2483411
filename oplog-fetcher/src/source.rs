use std::fmt::Display;
use std::fmt::Formatter;
use std::str::FromStr;

use anyerror::AnyError;

/// Network identity of a sync source. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct HostAndPort {
    host: String,
    port: u16,
}

impl HostAndPort {
    pub fn new(host: impl ToString, port: u16) -> Self {
        HostAndPort {
            host: host.to_string(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Display for HostAndPort {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl std::error::Error for HostAndPort {}

impl FromStr for HostAndPort {
    type Err = AnyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AnyError::error(format!("expect 'host:port', got: '{}'", s)))?;

        if host.is_empty() {
            return Err(AnyError::error(format!("empty host in '{}'", s)));
        }

        let port = port
            .parse::<u16>()
            .map_err(|e| AnyError::error(format!("invalid port in '{}': {}", s, e)))?;

        Ok(HostAndPort::new(host, port))
    }
}
