//! Error taxonomy shared by the decoding, discovery and collection layers

use thiserror::Error;

/// Malformed or truncated instruction payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated payload reading {field}: needed {needed} bytes, {available} available")]
    Truncated {
        field: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("instruction is missing account #{index} ({role})")]
    MissingAccount { index: usize, role: &'static str },
}

/// Out-of-range index into a transaction's account-key table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("program index {index} out of range ({len} account keys)")]
    ProgramIndexOutOfRange { index: usize, len: usize },

    #[error("account index {index} out of range ({len} account keys)")]
    AccountIndexOutOfRange { index: usize, len: usize },
}

/// Failures at the network/persistence boundary.
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {endpoint}")]
    Status { status: u16, endpoint: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CollectorError {
    /// Network hiccups, rate limits and server-side errors are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            CollectorError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            CollectorError::Status { status, .. } => *status == 429 || *status >= 500,
            // -32099..=-32000: server-side node errors, -32603: internal error
            CollectorError::Rpc { code, .. } => matches!(*code, -32603 | -32099..=-32000),
            CollectorError::Io(_) => true,
            CollectorError::Parse(_) | CollectorError::NotFound(_) | CollectorError::RetriesExhausted { .. } => false,
        }
    }
}

impl From<serde_json::Error> for CollectorError {
    fn from(e: serde_json::Error) -> Self {
        CollectorError::Parse(e.to_string())
    }
}

/// Unrecoverable configuration problems.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_status_is_transient() {
        let err = CollectorError::Status { status: 429, endpoint: "rpc".to_string() };
        assert!(err.is_transient());

        let err = CollectorError::Status { status: 404, endpoint: "rpc".to_string() };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_exhausted_is_permanent() {
        let err = CollectorError::RetriesExhausted {
            operation: "getTransaction".to_string(),
            attempts: 5,
            last_error: "timeout".to_string(),
        };
        assert!(!err.is_transient());
        assert!(err.to_string().contains("5 attempts"));
    }
}
