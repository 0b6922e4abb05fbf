// src/core/errors.rs

//! Defines the primary error type for the reconfiguration core.

use std::num::ParseIntError;
use std::sync::Arc;
use thiserror::Error;

/// The main error enum: the reconfiguration protocol's own failure modes
/// plus the ambient I/O and (de)serialization failures a real deployment
/// hits.
///
/// Using `thiserror` gives clean error definitions and automatic `From`
/// impls.
#[derive(Error, Debug)]
pub enum GnsError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("encoding error: {0}")]
    Encoding(String),

    /// Lookup of a name with no reconfiguration record.
    #[error("NotFound: no record for '{0}'")]
    NotFound(String),

    /// Create for a name with an existing record.
    #[error("AlreadyExists: record for '{0}' already exists")]
    AlreadyExists(String),

    /// A control operation arrived while the record is not READY.
    #[error("Busy: '{0}' is mid-reconfiguration")]
    Busy(String),

    /// A state-transfer or drop request named an epoch the AR has no record of.
    #[error("BadEpoch: no local instance for ('{0}', epoch {1})")]
    BadEpoch(String, u32),

    /// A peer did not answer within the retransmit budget. The caller is
    /// informed only indirectly: the operation this wraps is still pending,
    /// never aborted, so this variant is for logging, not for surfacing
    /// a terminal failure to a client.
    #[error("TransientUnreachable: {0}")]
    TransientUnreachable(String),

    /// A node-map change that leaves no reconfigurator, or leaves the
    /// requesting node itself out of the map.
    #[error("InvalidConfig: {0}")]
    InvalidConfig(String),

    #[error("internal error: {0}")]
    Internal(String),
}

// `std::io::Error` is not `Clone`; wrap it in an `Arc` so `GnsError` can be.
impl Clone for GnsError {
    fn clone(&self) -> Self {
        match self {
            GnsError::Io(e) => GnsError::Io(Arc::clone(e)),
            GnsError::Encoding(s) => GnsError::Encoding(s.clone()),
            GnsError::NotFound(s) => GnsError::NotFound(s.clone()),
            GnsError::AlreadyExists(s) => GnsError::AlreadyExists(s.clone()),
            GnsError::Busy(s) => GnsError::Busy(s.clone()),
            GnsError::BadEpoch(s, e) => GnsError::BadEpoch(s.clone(), *e),
            GnsError::TransientUnreachable(s) => GnsError::TransientUnreachable(s.clone()),
            GnsError::InvalidConfig(s) => GnsError::InvalidConfig(s.clone()),
            GnsError::Internal(s) => GnsError::Internal(s.clone()),
        }
    }
}

impl PartialEq for GnsError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (GnsError::Io(a), GnsError::Io(b)) => a.to_string() == b.to_string(),
            (GnsError::Encoding(a), GnsError::Encoding(b)) => a == b,
            (GnsError::NotFound(a), GnsError::NotFound(b)) => a == b,
            (GnsError::AlreadyExists(a), GnsError::AlreadyExists(b)) => a == b,
            (GnsError::Busy(a), GnsError::Busy(b)) => a == b,
            (GnsError::BadEpoch(a, e1), GnsError::BadEpoch(b, e2)) => a == b && e1 == e2,
            (GnsError::TransientUnreachable(a), GnsError::TransientUnreachable(b)) => a == b,
            (GnsError::InvalidConfig(a), GnsError::InvalidConfig(b)) => a == b,
            (GnsError::Internal(a), GnsError::Internal(b)) => a == b,
            _ => false,
        }
    }
}

impl From<std::io::Error> for GnsError {
    fn from(e: std::io::Error) -> Self {
        GnsError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for GnsError {
    fn from(e: serde_json::Error) -> Self {
        GnsError::Encoding(format!("JSON error: {e}"))
    }
}

impl From<bincode::error::EncodeError> for GnsError {
    fn from(e: bincode::error::EncodeError) -> Self {
        GnsError::Encoding(format!("bincode encode error: {e}"))
    }
}

impl From<bincode::error::DecodeError> for GnsError {
    fn from(e: bincode::error::DecodeError) -> Self {
        GnsError::Encoding(format!("bincode decode error: {e}"))
    }
}

impl From<ParseIntError> for GnsError {
    fn from(e: ParseIntError) -> Self {
        GnsError::Internal(format!("parse error: {e}"))
    }
}
