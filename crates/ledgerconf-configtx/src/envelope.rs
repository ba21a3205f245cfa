//! Config update envelopes and their canonical mutation order

use std::collections::BTreeMap;

use bytes::Bytes;
use ledgerconf_common::{ConfigTxError, GroupPath, Result};
use ledgerconf_policy::{PolicyDefinition, SignedIdentity};
use serde::{Deserialize, Serialize};

use crate::tree::{ConfigGroup, ConfigValue};

/// A single edit carried by an envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MutationOp {
    /// Create the group, or change the mod policy of an existing one
    PutGroup { mod_policy: String },
    DeleteGroup,
    PutValue {
        key: String,
        #[serde(with = "crate::tree::base64_bytes")]
        value: Bytes,
    },
    DeleteValue { key: String },
    PutPolicy { key: String, policy: PolicyDefinition },
    DeletePolicy { key: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    pub path: GroupPath,
    #[serde(flatten)]
    pub op: MutationOp,
}

impl Mutation {
    pub fn new(path: GroupPath, op: MutationOp) -> Self {
        Self { path, op }
    }

    fn target(&self) -> Target {
        match &self.op {
            MutationOp::PutGroup { .. } | MutationOp::DeleteGroup => Target::Group(self.path.clone()),
            MutationOp::PutValue { key, .. } | MutationOp::DeleteValue { key } => {
                Target::Value(self.path.clone(), key.clone())
            }
            MutationOp::PutPolicy { key, .. } | MutationOp::DeletePolicy { key } => {
                Target::Policy(self.path.clone(), key.clone())
            }
        }
    }
}

/// A proposed change to one channel's configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEnvelope {
    pub chain_id: String,
    pub base_sequence: u64,
    #[serde(default)]
    pub mutations: Vec<Mutation>,
    /// Verified signers; signature checking happens before the envelope arrives
    #[serde(default)]
    pub signers: Vec<SignedIdentity>,
}

impl ConfigEnvelope {
    pub fn new(chain_id: impl Into<String>, base_sequence: u64) -> Self {
        Self {
            chain_id: chain_id.into(),
            base_sequence,
            ..Default::default()
        }
    }

    /// The envelope that would build `tree` from nothing. Recorded as the
    /// config envelope of a channel bootstrapped from a genesis tree.
    pub fn genesis(chain_id: impl Into<String>, sequence: u64, tree: &ConfigGroup) -> Self {
        let mut envelope = Self::new(chain_id, sequence);
        for (path, group) in tree.walk() {
            envelope = envelope.put_group(path.clone(), group.mod_policy.clone());
            for (key, value) in &group.values {
                envelope = envelope.put_value(path.clone(), key.clone(), value.value.clone());
            }
            for (key, policy) in &group.policies {
                envelope = envelope.put_policy(path.clone(), key.clone(), policy.policy.clone());
            }
        }
        envelope
    }

    pub fn put_group(mut self, path: GroupPath, mod_policy: impl Into<String>) -> Self {
        self.mutations.push(Mutation::new(
            path,
            MutationOp::PutGroup {
                mod_policy: mod_policy.into(),
            },
        ));
        self
    }

    pub fn delete_group(mut self, path: GroupPath) -> Self {
        self.mutations.push(Mutation::new(path, MutationOp::DeleteGroup));
        self
    }

    pub fn put_value(mut self, path: GroupPath, key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.mutations.push(Mutation::new(
            path,
            MutationOp::PutValue {
                key: key.into(),
                value: value.into(),
            },
        ));
        self
    }

    /// Put a value whose payload is the JSON encoding of `payload`
    pub fn put_json<T: Serialize>(
        self,
        path: GroupPath,
        key: impl Into<String>,
        payload: &T,
    ) -> std::result::Result<Self, serde_json::Error> {
        let value = ConfigValue::json(payload)?;
        Ok(self.put_value(path, key, value.value))
    }

    pub fn delete_value(mut self, path: GroupPath, key: impl Into<String>) -> Self {
        self.mutations
            .push(Mutation::new(path, MutationOp::DeleteValue { key: key.into() }));
        self
    }

    pub fn put_policy(mut self, path: GroupPath, key: impl Into<String>, policy: PolicyDefinition) -> Self {
        self.mutations.push(Mutation::new(
            path,
            MutationOp::PutPolicy {
                key: key.into(),
                policy,
            },
        ));
        self
    }

    pub fn delete_policy(mut self, path: GroupPath, key: impl Into<String>) -> Self {
        self.mutations
            .push(Mutation::new(path, MutationOp::DeletePolicy { key: key.into() }));
        self
    }

    pub fn signed_by(mut self, signer: SignedIdentity) -> Self {
        self.signers.push(signer);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Target {
    Group(GroupPath),
    Value(GroupPath, String),
    Policy(GroupPath, String),
}

impl Target {
    fn path(&self) -> &GroupPath {
        match self {
            Target::Group(path) | Target::Value(path, _) | Target::Policy(path, _) => path,
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Group(path) => write!(f, "group {}", path),
            Target::Value(path, key) => write!(f, "value '{}' at {}", key, path),
            Target::Policy(path, key) => write!(f, "policy '{}' at {}", key, path),
        }
    }
}

/// Mutations of one envelope in canonical order.
///
/// Group creations run shallowest first, then value and policy edits, then
/// group deletions deepest first. Each target appears at most once, so the
/// result of applying the set does not depend on the order the envelope
/// listed its mutations in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationSet {
    group_puts: Vec<(GroupPath, String)>,
    edits: Vec<Mutation>,
    group_deletes: Vec<GroupPath>,
}

impl MutationSet {
    pub fn normalize(mutations: &[Mutation]) -> Result<Self> {
        let mut targets: BTreeMap<Target, &Mutation> = BTreeMap::new();
        for mutation in mutations {
            validate_keys(mutation)?;
            let target = mutation.target();
            if targets.insert(target.clone(), mutation).is_some() {
                return Err(ConfigTxError::InvalidEnvelope(format!(
                    "conflicting mutations for {}",
                    target
                )));
            }
        }

        let deleted: Vec<&GroupPath> = targets
            .iter()
            .filter(|(_, m)| m.op == MutationOp::DeleteGroup)
            .map(|(t, _)| t.path())
            .collect();
        for (target, mutation) in &targets {
            // Nested deletions are redundant but harmless
            if mutation.op == MutationOp::DeleteGroup {
                continue;
            }
            let inside = deleted.iter().find(|d| target.path().starts_with(d));
            if let Some(deleted) = inside {
                return Err(ConfigTxError::InvalidEnvelope(format!(
                    "{} conflicts with the deletion of group {}",
                    target, deleted
                )));
            }
        }

        let mut set = MutationSet::default();
        for mutation in targets.into_values() {
            match &mutation.op {
                MutationOp::PutGroup { mod_policy } => {
                    set.group_puts.push((mutation.path.clone(), mod_policy.clone()))
                }
                MutationOp::DeleteGroup => set.group_deletes.push(mutation.path.clone()),
                _ => set.edits.push(mutation.clone()),
            }
        }
        set.group_puts
            .sort_by(|(a, _), (b, _)| a.depth().cmp(&b.depth()).then_with(|| a.cmp(b)));
        set.group_deletes
            .sort_by(|a, b| b.depth().cmp(&a.depth()).then_with(|| a.cmp(b)));
        Ok(set)
    }

    pub fn group_puts(&self) -> &[(GroupPath, String)] {
        &self.group_puts
    }

    pub fn edits(&self) -> &[Mutation] {
        &self.edits
    }

    pub fn group_deletes(&self) -> &[GroupPath] {
        &self.group_deletes
    }

    pub fn is_empty(&self) -> bool {
        self.group_puts.is_empty() && self.edits.is_empty() && self.group_deletes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.group_puts.len() + self.edits.len() + self.group_deletes.len()
    }
}

fn validate_keys(mutation: &Mutation) -> Result<()> {
    match &mutation.op {
        MutationOp::DeleteGroup if mutation.path.is_root() => Err(ConfigTxError::InvalidEnvelope(
            "the root group cannot be deleted".to_string(),
        )),
        MutationOp::PutValue { key, .. }
        | MutationOp::DeleteValue { key }
        | MutationOp::PutPolicy { key, .. }
        | MutationOp::DeletePolicy { key }
            if key.is_empty() =>
        {
            Err(ConfigTxError::InvalidEnvelope(format!(
                "mutation at {} has an empty key",
                mutation.path
            )))
        }
        _ => Ok(()),
    }
}
