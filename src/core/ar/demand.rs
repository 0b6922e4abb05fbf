// src/core/ar/demand.rs

//! Active-Replica side of demand reporting (§4.2): folds application
//! requests into a per-name profile and, when the configured
//! [`DemandProfile`] policy says to, ships a report to a randomly chosen
//! RC.

use crate::core::demand::DemandProfile;
use crate::core::protocol::{Envelope, NodeId};
use dashmap::DashMap;
use rand::seq::SliceRandom;
use rand::thread_rng;

pub struct DemandReporter<P: DemandProfile> {
    policy: P,
    profiles: DashMap<String, P::Profile>,
}

impl<P: DemandProfile> DemandReporter<P> {
    pub fn new(policy: P) -> Self {
        Self {
            policy,
            profiles: DashMap::new(),
        }
    }

    /// Folds one request into `name`'s profile, returning an envelope to
    /// send to a randomly chosen RC if the policy now wants a report.
    pub fn observe(
        &self,
        name: &str,
        epoch: u32,
        sender: &NodeId,
        rc_nodes: &[NodeId],
        encode: impl FnOnce(&P::Profile) -> Vec<u8>,
    ) -> Option<(NodeId, Envelope)> {
        let existing = self.profiles.get(name).map(|r| r.clone());
        let updated = self.policy.register(existing, sender);
        let should_report = self.policy.should_report(&updated);
        let blob = if should_report {
            Some(encode(&updated))
        } else {
            None
        };
        self.profiles.insert(name.to_string(), updated);

        let blob = blob?;
        let target = rc_nodes.choose(&mut thread_rng())?.clone();
        Some((
            target,
            Envelope::DemandReport {
                service_name: name.to_string(),
                epoch_number: epoch,
                sender: sender.clone(),
                profile_blob: blob,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::demand::NullDemandProfile;

    #[test]
    fn null_policy_never_produces_a_report() {
        let reporter = DemandReporter::new(NullDemandProfile);
        let result = reporter.observe(
            "n0",
            0,
            &NodeId::new("a"),
            &[NodeId::new("rc-1")],
            |_| Vec::new(),
        );
        assert!(result.is_none());
    }
}
