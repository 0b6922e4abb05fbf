// src/core/rc/demand.rs

//! Reconfigurator-side half of demand reporting (§4.2, §9 design note
//! (d)): combines `DemandReport`s as they arrive and asks the
//! configured [`DemandProfile`] policy whether the combined picture now
//! warrants a `ChangeReplicas`.

use crate::core::demand::DemandProfile;
use crate::core::protocol::NodeId;
use dashmap::DashMap;

pub struct DemandAggregator<P: DemandProfile> {
    policy: P,
    combined: DashMap<String, P::Profile>,
}

impl<P: DemandProfile> DemandAggregator<P> {
    pub fn new(policy: P) -> Self {
        Self {
            policy,
            combined: DashMap::new(),
        }
    }

    /// Folds one `DemandReport`'s decoded profile into `name`'s combined
    /// picture, returning the replacement group if the policy now wants
    /// a reconfiguration.
    pub fn observe(
        &self,
        name: &str,
        incoming: P::Profile,
        current_actives: &[NodeId],
    ) -> Option<Vec<NodeId>> {
        let existing = self.combined.get(name).map(|r| r.clone());
        let combined = match existing {
            Some(prior) => self.policy.combine(prior, incoming),
            None => incoming,
        };
        let decision = self.policy.should_reconfigure(&combined, current_actives);
        self.combined.insert(name.to_string(), combined);
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::demand::NullDemandProfile;

    #[test]
    fn null_policy_never_requests_reconfiguration() {
        let aggregator = DemandAggregator::new(NullDemandProfile);
        let decision = aggregator.observe("n0", (), &[NodeId::new("a")]);
        assert!(decision.is_none());
    }
}
