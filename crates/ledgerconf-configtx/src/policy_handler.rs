//! Policy participant of every config transaction

use std::collections::BTreeMap;
use std::sync::Arc;

use ledgerconf_common::{ConfigTxError, GroupPath, MSP_KEY, Result};
use ledgerconf_policy::{MspConfig, MspManager, PolicyManager};
use tracing::debug;

use crate::handler::{PolicyHandler, Proposal};
use crate::resources::ResourcesBuilder;
use crate::tree::{ConfigGroup, ConfigPolicy};

/// Derives the membership a candidate tree would establish
pub trait MembershipSource: Send + Sync {
    fn membership(&self, tree: &ConfigGroup) -> Result<MspManager>;
}

impl<F> MembershipSource for F
where
    F: Fn(&ConfigGroup) -> Result<MspManager> + Send + Sync,
{
    fn membership(&self, tree: &ConfigGroup) -> Result<MspManager> {
        self(tree)
    }
}

/// Reads the `MSP` value of every group that carries one
#[derive(Debug, Clone, Copy, Default)]
pub struct MspValueMembership;

impl MembershipSource for MspValueMembership {
    fn membership(&self, tree: &ConfigGroup) -> Result<MspManager> {
        let mut configs = Vec::new();
        for (path, group) in tree.walk() {
            if let Some(value) = group.values.get(MSP_KEY) {
                let config = MspConfig::decode(&value.value)
                    .map_err(|reason| ConfigTxError::rejected(&path, MSP_KEY, reason))?;
                configs.push((path, config));
            }
        }
        MspManager::from_configs(configs.iter().map(|(path, config)| (path.clone(), config)))
            .map_err(|reason| ConfigTxError::rejected(&GroupPath::root(), MSP_KEY, reason))
    }
}

/// Index every group's policies of a tree
pub fn policy_manager_from_tree(tree: &ConfigGroup) -> PolicyManager {
    let mut manager = PolicyManager::new();
    for (path, group) in tree.walk() {
        let policies: BTreeMap<String, _> = group
            .policies
            .iter()
            .map(|(name, policy)| (name.clone(), policy.policy.clone()))
            .collect();
        manager.insert_group(path, policies, group.groups.keys().cloned());
    }
    manager
}

/// Checks each proposed policy on its own, then checks that no surviving
/// group of the candidate ends up with a mod policy nobody could satisfy.
pub struct TreePolicyHandler {
    membership: Arc<dyn MembershipSource>,
    proposed: usize,
    staged: Option<PolicyManager>,
}

impl TreePolicyHandler {
    pub fn new(membership: Arc<dyn MembershipSource>) -> Self {
        Self {
            membership,
            proposed: 0,
            staged: None,
        }
    }
}

impl PolicyHandler for TreePolicyHandler {
    fn propose_policy(
        &mut self,
        path: &GroupPath,
        key: &str,
        proposal: Proposal<'_, ConfigPolicy>,
    ) -> Result<()> {
        if let Proposal::Set(policy) = proposal {
            policy
                .policy
                .validate()
                .map_err(|reason| ConfigTxError::malformed_policy(path, key, reason))?;
        }
        self.proposed += 1;
        Ok(())
    }

    fn finalize(&mut self, candidate: &ConfigGroup, surviving: &[GroupPath]) -> Result<()> {
        let msp = self.membership.membership(candidate)?;
        let policies = policy_manager_from_tree(candidate);

        for path in surviving {
            let Some(group) = candidate.group(path) else {
                continue;
            };
            if group.mod_policy.is_empty() {
                return Err(ConfigTxError::malformed_policy(
                    path,
                    "mod_policy",
                    "group has no mod policy",
                ));
            }
            policies
                .check_satisfiable(path, &group.mod_policy, &msp)
                .map_err(|e| {
                    ConfigTxError::malformed_policy(
                        path,
                        &group.mod_policy,
                        format!("mod policy could never be satisfied: {}", e),
                    )
                })?;
        }

        debug!(
            proposed = self.proposed,
            checked = surviving.len(),
            groups = policies.group_count(),
            "Policy proposals accepted"
        );
        self.staged = Some(policies);
        Ok(())
    }

    fn commit_config(self: Box<Self>, resources: &mut ResourcesBuilder) {
        if let Some(policies) = self.staged {
            resources.set_policy_manager(policies);
        }
    }
}
