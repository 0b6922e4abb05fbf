// src/core/rc/node_config.rs

//! Reconfiguring the Reconfigurator set itself (§2, §8 testable
//! scenario 5) is driven through the exact same record/statemachine
//! machinery as any other name, keyed under the distinguished
//! [`NODE_CONFIG`] name. This module only computes the replacement
//! group and the bootstrap record; `Reconfigurator` does the rest.

use crate::core::errors::GnsError;
use crate::core::messenger::PeerMessenger;
use crate::core::protocol::{NodeId, NODE_CONFIG};
use crate::core::rc::log::ControlLog;
use crate::core::rc::statemachine::Reconfigurator;
use crate::core::rc::store::RecordStore;

/// `ReconfigureRcNodeConfig(added, removed)`: computes the replacement
/// reconfigurator set and submits it as an ordinary `ChangeReplicas`
/// on `NODE_CONFIG`, bootstrapping the record on first use.
pub async fn reconfigure<L, S, M>(
    rc: &Reconfigurator<L, S, M>,
    added: Vec<NodeId>,
    removed: Vec<NodeId>,
) -> Result<(), GnsError>
where
    L: ControlLog + 'static,
    S: RecordStore + 'static,
    M: PeerMessenger + 'static,
{
    match rc.active_replicas(NODE_CONFIG).await {
        Ok(current) => {
            let next = apply_membership_change(&current, &added, &removed)?;
            rc.change_replicas(NODE_CONFIG, Some(next)).await
        }
        Err(GnsError::NotFound(_)) => {
            if added.is_empty() {
                return Err(GnsError::InvalidConfig(
                    "cannot bootstrap NODE_CONFIG with no reconfigurators".to_string(),
                ));
            }
            rc.create(NODE_CONFIG.to_string(), Vec::new(), added).await
        }
        Err(e) => Err(e),
    }
}

fn apply_membership_change(
    current: &[NodeId],
    added: &[NodeId],
    removed: &[NodeId],
) -> Result<Vec<NodeId>, GnsError> {
    let mut next: Vec<NodeId> = current
        .iter()
        .filter(|id| !removed.contains(id))
        .cloned()
        .collect();
    for id in added {
        if !next.contains(id) {
            next.push(id.clone());
        }
    }
    if next.is_empty() {
        return Err(GnsError::InvalidConfig(
            "ReconfigureRcNodeConfig would leave no reconfigurators".to_string(),
        ));
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|n| NodeId::new(*n)).collect()
    }

    #[test]
    fn adds_and_removes_members() {
        let current = ids(&["a", "b", "c"]);
        let next = apply_membership_change(&current, &ids(&["d"]), &ids(&["a"])).unwrap();
        assert_eq!(next, ids(&["b", "c", "d"]));
    }

    #[test]
    fn rejects_emptying_the_reconfigurator_set() {
        let current = ids(&["a"]);
        let err = apply_membership_change(&current, &[], &ids(&["a"])).unwrap_err();
        assert!(matches!(err, GnsError::InvalidConfig(_)));
    }
}
