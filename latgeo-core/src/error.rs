use std::io;

use thiserror::Error;

/// Failure of a single latency probe.
///
/// The orchestrator treats every variant the same way: the node is left out of
/// the ranked set.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("could not resolve {address}")]
    Resolve { address: String },

    #[error("no echo reply from {address} within {timeout_ms}ms")]
    NoResponse { address: String, timeout_ms: u128 },

    #[error("permission denied opening probe socket (raw ICMP needs root or CAP_NET_RAW)")]
    PermissionDenied,

    #[error("probe i/o failed: {0}")]
    Io(#[from] io::Error),
}

/// Conditions that end a run before any estimate can be made.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("target {address} is unreachable: {source}")]
    TargetUnreachable {
        address: String,
        #[source]
        source: ProbeError,
    },

    #[error("reference catalog is empty")]
    EmptyCatalog,

    #[error("none of the {attempted} reference nodes answered")]
    NoResponses { attempted: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {what}: {source}")]
    Parse {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<ConfigError> for io::Error {
    fn from(err: ConfigError) -> Self {
        let kind = match &err {
            ConfigError::Read { source, .. } => source.kind(),
            ConfigError::Parse { .. } | ConfigError::Invalid(_) => io::ErrorKind::InvalidData,
        };
        io::Error::new(kind, err)
    }
}

impl From<RunError> for io::Error {
    fn from(err: RunError) -> Self {
        let kind = match &err {
            RunError::TargetUnreachable { .. } => io::ErrorKind::NotConnected,
            RunError::EmptyCatalog => io::ErrorKind::InvalidInput,
            RunError::NoResponses { .. } => io::ErrorKind::TimedOut,
        };
        io::Error::new(kind, err)
    }
}
