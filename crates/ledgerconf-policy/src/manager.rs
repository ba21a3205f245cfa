//! Policy manager
//!
//! Holds every policy of a channel tree, indexed by group path, and evaluates
//! named policies against a signer set.
//!
//! Policy names are resolved relative to the group that asks for them
//! (`Admins`) unless they are absolute (`/Application/Admins`).

use std::collections::{BTreeMap, BTreeSet};

use ledgerconf_common::GroupPath;
use tracing::debug;

use crate::MAX_REFERENCE_DEPTH;
use crate::msp::{MspManager, SignedIdentity};
use crate::policy::{PolicyDefinition, Principal};

/// Policy evaluation errors
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("policy '{name}' not found at {path}")]
    NotFound { path: GroupPath, name: String },

    #[error("invalid policy name '{0}'")]
    InvalidName(String),

    #[error("policy reference chain through '{0}' is cyclic or too deep")]
    ReferenceDepth(String),

    #[error("{0}")]
    Unsatisfied(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct GroupPolicies {
    policies: BTreeMap<String, PolicyDefinition>,
    children: BTreeSet<String>,
}

/// Policies of one channel configuration, indexed by group
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyManager {
    groups: BTreeMap<GroupPath, GroupPolicies>,
}

impl PolicyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a group with its policies and the names of its direct children
    pub fn insert_group<C>(
        &mut self,
        path: GroupPath,
        policies: BTreeMap<String, PolicyDefinition>,
        children: C,
    ) where
        C: IntoIterator<Item = String>,
    {
        self.groups.insert(
            path,
            GroupPolicies {
                policies,
                children: children.into_iter().collect(),
            },
        );
    }

    pub fn has_group(&self, path: &GroupPath) -> bool {
        self.groups.contains_key(path)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn policy_names(&self, path: &GroupPath) -> Vec<&str> {
        self.groups
            .get(path)
            .map(|g| g.policies.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Split a policy name into the group that owns it and its local name
    pub fn resolve_name(group: &GroupPath, name: &str) -> Result<(GroupPath, String), PolicyError> {
        if let Some(absolute) = name.strip_prefix('/') {
            let mut segments: Vec<&str> = absolute.split('/').collect();
            let local = segments.pop().unwrap_or_default();
            if local.is_empty() {
                return Err(PolicyError::InvalidName(name.to_string()));
            }
            let path = GroupPath::new(segments)
                .map_err(|_| PolicyError::InvalidName(name.to_string()))?;
            return Ok((path, local.to_string()));
        }
        if name.is_empty() || name.contains('/') {
            return Err(PolicyError::InvalidName(name.to_string()));
        }
        Ok((group.clone(), name.to_string()))
    }

    pub fn policy(&self, group: &GroupPath, name: &str) -> Option<&PolicyDefinition> {
        let (path, local) = Self::resolve_name(group, name).ok()?;
        self.groups.get(&path)?.policies.get(&local)
    }

    /// Evaluate `name` as seen from `group` against a signer set.
    ///
    /// Duplicate signers count once.
    pub fn evaluate(
        &self,
        group: &GroupPath,
        name: &str,
        signers: &[SignedIdentity],
        msp: &MspManager,
    ) -> Result<(), PolicyError> {
        let unique: BTreeSet<&SignedIdentity> = signers.iter().collect();
        let signers: Vec<&SignedIdentity> = unique.into_iter().collect();
        let result = self.evaluate_at(group, name, &signers, msp, 0);
        if let Err(e) = &result {
            debug!(group = %group, policy = %name, signers = signers.len(), "Policy evaluation failed: {}", e);
        }
        result
    }

    /// Whether the policy could ever be satisfied by the identities `msp` knows.
    ///
    /// Policies are monotone in the signer set, so this is the same as
    /// evaluating with every known identity signing.
    pub fn check_satisfiable(
        &self,
        group: &GroupPath,
        name: &str,
        msp: &MspManager,
    ) -> Result<(), PolicyError> {
        let everyone = msp.all_identities();
        self.evaluate(group, name, &everyone, msp)
    }

    fn evaluate_at(
        &self,
        group: &GroupPath,
        name: &str,
        signers: &[&SignedIdentity],
        msp: &MspManager,
        depth: usize,
    ) -> Result<(), PolicyError> {
        if depth > MAX_REFERENCE_DEPTH {
            return Err(PolicyError::ReferenceDepth(name.to_string()));
        }

        let (path, local) = Self::resolve_name(group, name)?;
        let owner = self.groups.get(&path);
        let definition = owner
            .and_then(|g| g.policies.get(&local))
            .ok_or_else(|| PolicyError::NotFound {
                path: path.clone(),
                name: local.clone(),
            })?;

        match definition {
            PolicyDefinition::Signature { n, principals } => {
                let matched = match_principals(principals, signers, msp);
                if matched >= *n {
                    Ok(())
                } else {
                    Err(PolicyError::Unsatisfied(format!(
                        "signature policy '{}' at {} matched {} of {} required principals",
                        local, path, matched, n
                    )))
                }
            }
            PolicyDefinition::ImplicitMeta { rule, sub_policy } => {
                let children = owner.map(|g| &g.children);
                let children: Vec<&String> = children.into_iter().flatten().collect();
                let threshold = rule.threshold(children.len());
                let satisfied = children
                    .iter()
                    .filter(|child| {
                        self.evaluate_at(&path.child(child), sub_policy, signers, msp, depth + 1)
                            .is_ok()
                    })
                    .count();
                if satisfied >= threshold {
                    Ok(())
                } else {
                    Err(PolicyError::Unsatisfied(format!(
                        "implicit meta policy '{}' at {} requires {} {} of {} sub policies, {} satisfied",
                        local,
                        path,
                        rule,
                        threshold,
                        children.len(),
                        satisfied
                    )))
                }
            }
            PolicyDefinition::Reference { target } => {
                self.evaluate_at(&path, target, signers, msp, depth + 1)
            }
        }
    }
}

/// Size of a maximum matching between principals and distinct signers.
///
/// Augmenting paths (Kuhn), so a signer picked early for one principal can be
/// moved to another when that frees it for a later principal.
fn match_principals(principals: &[Principal], signers: &[&SignedIdentity], msp: &MspManager) -> usize {
    let fits: Vec<Vec<usize>> = principals
        .iter()
        .map(|principal| {
            (0..signers.len())
                .filter(|&i| msp.satisfies(signers[i], principal))
                .collect()
        })
        .collect();

    // owner[i] is the principal currently holding signer i
    let mut owner: Vec<Option<usize>> = vec![None; signers.len()];
    let mut matched = 0;
    for principal in 0..principals.len() {
        let mut visited = vec![false; signers.len()];
        if augment(principal, &fits, &mut owner, &mut visited) {
            matched += 1;
        }
    }
    matched
}

fn augment(
    principal: usize,
    fits: &[Vec<usize>],
    owner: &mut [Option<usize>],
    visited: &mut [bool],
) -> bool {
    for &signer in &fits[principal] {
        if visited[signer] {
            continue;
        }
        visited[signer] = true;
        let free = match owner[signer] {
            None => true,
            Some(other) => augment(other, fits, owner, visited),
        };
        if free {
            owner[signer] = Some(principal);
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msp::MspConfig;
    use crate::policy::MetaRule;
    use proptest::prelude::*;

    fn path(s: &str) -> GroupPath {
        s.parse().unwrap()
    }

    fn org_msp(msp_id: &str, admins: &[&str]) -> MspConfig {
        MspConfig {
            msp_id: msp_id.to_string(),
            admins: admins.iter().map(|a| a.to_string()).collect(),
            members: vec![],
        }
    }

    /// Root with an Application group holding Org1 (3 admins) and Org2 (1 admin)
    fn fixture() -> (PolicyManager, MspManager) {
        let mut msp = MspManager::new();
        msp.upsert(path("/Application/Org1"), &org_msp("Org1MSP", &["a1", "a2", "a3"]));
        msp.upsert(path("/Application/Org2"), &org_msp("Org2MSP", &["b1"]));

        let mut policies = PolicyManager::new();
        policies.insert_group(
            GroupPath::root(),
            BTreeMap::from([(
                "Admins".to_string(),
                PolicyDefinition::reference("/Application/Admins"),
            )]),
            vec!["Application".to_string()],
        );
        policies.insert_group(
            path("/Application"),
            BTreeMap::from([(
                "Admins".to_string(),
                PolicyDefinition::implicit_meta(MetaRule::Majority, "Admins"),
            )]),
            vec!["Org1".to_string(), "Org2".to_string()],
        );
        policies.insert_group(
            path("/Application/Org1"),
            BTreeMap::from([
                (
                    "MAJORITY".to_string(),
                    PolicyDefinition::n_out_of(
                        2,
                        vec![
                            Principal::identity("Org1MSP", "a1"),
                            Principal::identity("Org1MSP", "a2"),
                            Principal::identity("Org1MSP", "a3"),
                        ],
                    ),
                ),
                (
                    "Admins".to_string(),
                    PolicyDefinition::n_out_of(1, vec![Principal::admin_of("Org1MSP")]),
                ),
            ]),
            Vec::<String>::new(),
        );
        policies.insert_group(
            path("/Application/Org2"),
            BTreeMap::from([(
                "Admins".to_string(),
                PolicyDefinition::n_out_of(1, vec![Principal::admin_of("Org2MSP")]),
            )]),
            Vec::<String>::new(),
        );
        (policies, msp)
    }

    #[test]
    fn test_resolve_name() {
        let group = path("/Application/Org1");
        assert_eq!(
            PolicyManager::resolve_name(&group, "Admins").unwrap(),
            (group.clone(), "Admins".to_string())
        );
        assert_eq!(
            PolicyManager::resolve_name(&group, "/Application/Admins").unwrap(),
            (path("/Application"), "Admins".to_string())
        );
        assert_eq!(
            PolicyManager::resolve_name(&group, "/Admins").unwrap(),
            (GroupPath::root(), "Admins".to_string())
        );
        assert!(PolicyManager::resolve_name(&group, "").is_err());
        assert!(PolicyManager::resolve_name(&group, "/Application/").is_err());
        assert!(PolicyManager::resolve_name(&group, "a/b").is_err());
    }

    #[test]
    fn test_signature_majority() {
        let (policies, msp) = fixture();
        let org1 = path("/Application/Org1");

        let two = vec![
            SignedIdentity::new("Org1MSP", "a1"),
            SignedIdentity::new("Org1MSP", "a3"),
        ];
        assert!(policies.evaluate(&org1, "MAJORITY", &two, &msp).is_ok());

        let one = vec![SignedIdentity::new("Org1MSP", "a1")];
        let err = policies.evaluate(&org1, "MAJORITY", &one, &msp).unwrap_err();
        assert!(matches!(err, PolicyError::Unsatisfied(_)));
    }

    /// Org1 with one admin and one plain member, guarded by a role principal
    /// that overlaps an identity principal
    fn overlapping() -> (PolicyManager, MspManager, GroupPath) {
        let org1 = path("/Application/Org1");
        let mut msp = MspManager::new();
        msp.upsert(
            org1.clone(),
            &MspConfig {
                msp_id: "Org1MSP".to_string(),
                admins: vec!["a1".to_string()],
                members: vec!["m1".to_string()],
            },
        );
        let mut policies = PolicyManager::new();
        policies.insert_group(
            org1.clone(),
            BTreeMap::from([(
                "P".to_string(),
                PolicyDefinition::n_out_of(
                    2,
                    vec![
                        Principal::member_of("Org1MSP"),
                        Principal::identity("Org1MSP", "a1"),
                    ],
                ),
            )]),
            Vec::<String>::new(),
        );
        (policies, msp, org1)
    }

    #[test]
    fn test_signature_overlapping_principals() {
        let (policies, msp, org1) = overlapping();

        // a1 fits both principals; m1 only the member role
        let signers = vec![
            SignedIdentity::new("Org1MSP", "a1"),
            SignedIdentity::new("Org1MSP", "m1"),
        ];
        assert!(policies.evaluate(&org1, "P", &signers, &msp).is_ok());
        assert!(policies.check_satisfiable(&org1, "P", &msp).is_ok());

        let admin_only = vec![SignedIdentity::new("Org1MSP", "a1")];
        let err = policies.evaluate(&org1, "P", &admin_only, &msp).unwrap_err();
        assert_eq!(
            err,
            PolicyError::Unsatisfied(
                "signature policy 'P' at /Application/Org1 matched 1 of 2 required principals"
                    .to_string()
            )
        );
    }

    #[test]
    fn test_signature_reassigns_earlier_match() {
        let mut msp = MspManager::new();
        let org1 = path("/Application/Org1");
        msp.upsert(org1.clone(), &org_msp("Org1MSP", &["a1", "a2"]));
        let mut policies = PolicyManager::new();
        policies.insert_group(
            org1.clone(),
            BTreeMap::from([(
                "P".to_string(),
                PolicyDefinition::n_out_of(
                    2,
                    vec![
                        Principal::admin_of("Org1MSP"),
                        Principal::identity("Org1MSP", "a1"),
                    ],
                ),
            )]),
            Vec::<String>::new(),
        );

        // The admin role has to move from a1 to a2 so a1 can cover itself
        let both = vec![
            SignedIdentity::new("Org1MSP", "a1"),
            SignedIdentity::new("Org1MSP", "a2"),
        ];
        assert!(policies.evaluate(&org1, "P", &both, &msp).is_ok());

        let a2_only = vec![SignedIdentity::new("Org1MSP", "a2")];
        assert!(policies.evaluate(&org1, "P", &a2_only, &msp).is_err());
    }

    #[test]
    fn test_duplicate_signers_count_once() {
        let (policies, msp) = fixture();
        let twice = vec![
            SignedIdentity::new("Org1MSP", "a1"),
            SignedIdentity::new("Org1MSP", "a1"),
        ];
        assert!(
            policies
                .evaluate(&path("/Application/Org1"), "MAJORITY", &twice, &msp)
                .is_err()
        );
    }

    #[test]
    fn test_implicit_meta_and_reference() {
        let (policies, msp) = fixture();

        // One of two orgs is not a majority
        let org1_only = vec![SignedIdentity::new("Org1MSP", "a2")];
        assert!(
            policies
                .evaluate(&path("/Application"), "Admins", &org1_only, &msp)
                .is_err()
        );

        let both = vec![
            SignedIdentity::new("Org1MSP", "a2"),
            SignedIdentity::new("Org2MSP", "b1"),
        ];
        assert!(
            policies
                .evaluate(&path("/Application"), "Admins", &both, &msp)
                .is_ok()
        );
        // Root Admins references the application policy
        assert!(policies.evaluate(&GroupPath::root(), "Admins", &both, &msp).is_ok());
    }

    #[test]
    fn test_missing_policy() {
        let (policies, msp) = fixture();
        let err = policies
            .evaluate(&GroupPath::root(), "Writers", &[], &msp)
            .unwrap_err();
        assert_eq!(
            err,
            PolicyError::NotFound {
                path: GroupPath::root(),
                name: "Writers".to_string()
            }
        );
    }

    #[test]
    fn test_reference_cycle_detected() {
        let mut policies = PolicyManager::new();
        policies.insert_group(
            GroupPath::root(),
            BTreeMap::from([
                ("A".to_string(), PolicyDefinition::reference("B")),
                ("B".to_string(), PolicyDefinition::reference("A")),
            ]),
            Vec::<String>::new(),
        );
        let err = policies
            .check_satisfiable(&GroupPath::root(), "A", &MspManager::new())
            .unwrap_err();
        assert!(matches!(err, PolicyError::ReferenceDepth(_)));
    }

    #[test]
    fn test_satisfiability() {
        let (mut policies, mut msp) = fixture();
        let org1 = path("/Application/Org1");
        assert!(policies.check_satisfiable(&org1, "MAJORITY", &msp).is_ok());
        assert!(
            policies
                .check_satisfiable(&path("/Application"), "Admins", &msp)
                .is_ok()
        );

        // Removing Org1's MSP leaves its signature policies unsatisfiable
        msp.remove(&org1);
        assert!(policies.check_satisfiable(&org1, "MAJORITY", &msp).is_err());

        // A policy naming a ghost identity can never be met
        policies.insert_group(
            path("/Application/Org2"),
            BTreeMap::from([(
                "Admins".to_string(),
                PolicyDefinition::n_out_of(1, vec![Principal::identity("Org2MSP", "ghost")]),
            )]),
            Vec::<String>::new(),
        );
        assert!(
            policies
                .check_satisfiable(&path("/Application/Org2"), "Admins", &msp)
                .is_err()
        );
    }

    #[test]
    fn test_policy_lookup() {
        let (policies, _) = fixture();
        assert!(policies.policy(&path("/Application/Org1"), "MAJORITY").is_some());
        assert!(
            policies
                .policy(&path("/Application/Org1"), "/Application/Admins")
                .is_some()
        );
        assert_eq!(policies.policy_names(&path("/Application/Org1")), vec!["Admins", "MAJORITY"]);
        assert_eq!(policies.group_count(), 4);
    }

    fn signer_subset() -> impl Strategy<Value = Vec<SignedIdentity>> {
        let known = vec![
            SignedIdentity::new("Org1MSP", "a1"),
            SignedIdentity::new("Org1MSP", "a2"),
            SignedIdentity::new("Org1MSP", "a3"),
            SignedIdentity::new("Org1MSP", "m1"),
            SignedIdentity::new("Org2MSP", "b1"),
            SignedIdentity::new("Org2MSP", "stranger"),
        ];
        proptest::sample::subsequence(known, 0..=6)
    }

    proptest! {
        #[test]
        fn evaluate_is_monotone_in_signers(small in signer_subset(), extra in signer_subset()) {
            let (mut policies, mut msp) = fixture();
            let org1 = path("/Application/Org1");
            msp.upsert(org1.clone(), &MspConfig {
                msp_id: "Org1MSP".to_string(),
                admins: vec!["a1".to_string(), "a2".to_string(), "a3".to_string()],
                members: vec!["m1".to_string()],
            });
            policies.insert_group(
                org1.clone(),
                BTreeMap::from([
                    (
                        "P".to_string(),
                        PolicyDefinition::n_out_of(
                            2,
                            vec![Principal::member_of("Org1MSP"), Principal::identity("Org1MSP", "a1")],
                        ),
                    ),
                    (
                        "Admins".to_string(),
                        PolicyDefinition::n_out_of(1, vec![Principal::admin_of("Org1MSP")]),
                    ),
                ]),
                Vec::<String>::new(),
            );

            let mut large = small.clone();
            large.extend(extra);
            for (group, name) in [
                (org1.clone(), "P"),
                (path("/Application"), "Admins"),
                (GroupPath::root(), "Admins"),
            ] {
                if policies.evaluate(&group, name, &small, &msp).is_ok() {
                    prop_assert!(policies.evaluate(&group, name, &large, &msp).is_ok());
                    prop_assert!(policies.check_satisfiable(&group, name, &msp).is_ok());
                }
            }
        }
    }
}
