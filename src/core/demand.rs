// src/core/demand.rs

//! The demand/placement policy hook (§4.2 "Demand Reporting", §9 design
//! note (d)): a narrow, pluggable capability for deciding when and how to
//! reconfigure a name's replica group based on observed load.
//!
//! Generalizes a single hardcoded failure-detection policy into a
//! pluggable trait with a null implementation, per design note (d)'s
//! `register`/`shouldReport`/`combine`/`shouldReconfigure` capability.

use crate::core::protocol::NodeId;
use std::fmt::Debug;

/// Per-name, per-request demand statistics. Opaque to the reconfiguration
/// core beyond what a `DemandProfile` implementation does with it.
pub trait DemandStats: Debug + Send + Sync {}

/// A pluggable policy for demand-driven reconfiguration. Implementations
/// are free to define their own profile representation; the core only
/// ever calls the methods below.
pub trait DemandProfile: Send + Sync {
    /// Opaque per-name accumulator type for this policy.
    type Profile: Clone + Send + Sync + Debug;

    /// Folds one observed application request into a profile, creating
    /// one if this is the first observation for the name.
    fn register(&self, existing: Option<Self::Profile>, sender: &NodeId) -> Self::Profile;

    /// Whether the accumulated profile should be reported to an RC now.
    fn should_report(&self, profile: &Self::Profile) -> bool;

    /// Merges two profiles, used when an RC combines reports from
    /// multiple members of the same replica group.
    fn combine(&self, a: Self::Profile, b: Self::Profile) -> Self::Profile;

    /// Whether the combined profile warrants a `ChangeReplicas`, and if
    /// so, the replacement group. Returning `None` means "no change".
    fn should_reconfigure(
        &self,
        profile: &Self::Profile,
        current_actives: &[NodeId],
    ) -> Option<Vec<NodeId>>;
}

/// The policy that must always exist and must never request
/// reconfiguration (§6 configuration surface: `demandProfileType` with a
/// "null" policy).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDemandProfile;

impl DemandProfile for NullDemandProfile {
    type Profile = ();

    fn register(&self, _existing: Option<()>, _sender: &NodeId) {}

    fn should_report(&self, _profile: &()) -> bool {
        false
    }

    fn combine(&self, _a: (), _b: ()) {}

    fn should_reconfigure(&self, _profile: &(), _current_actives: &[NodeId]) -> Option<Vec<NodeId>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_profile_never_reports_or_reconfigures() {
        let policy = NullDemandProfile;
        let sender = NodeId::new("ar-1");
        let profile = policy.register(None, &sender);
        assert!(!policy.should_report(&profile));
        assert_eq!(
            policy.should_reconfigure(&profile, &[NodeId::new("a")]),
            None
        );
    }
}
