// src/core/protocol/mod.rs

//! The wire protocol: node identity, the message envelope, and its codec.

pub mod codec;
pub mod messages;
pub mod node_id;

pub use codec::EnvelopeCodec;
pub use messages::{Envelope, ReplicaAddr};
pub use node_id::{NodeId, NODE_CONFIG};
