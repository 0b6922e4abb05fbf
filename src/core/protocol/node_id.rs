// src/core/protocol/node_id.rs

//! The concrete node-identity representation used throughout the core.
//!
//! The source used a generic type parameter for node IDs with an inheritance
//! hierarchy behind it; per the re-architecture pointers this collapses to a
//! single concrete, short, opaque string.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The distinguished name used for reconfiguring the reconfigurator set
/// itself (spec §2, §8 testable scenario 5).
pub const NODE_CONFIG: &str = "NODE_CONFIG";
