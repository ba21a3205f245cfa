//! Channel configuration tree
//!
//! A committed tree is never mutated. Child groups are held behind `Arc`, so
//! a new version shares every subtree it did not change with its predecessor.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use ledgerconf_common::GroupPath;
use ledgerconf_policy::PolicyDefinition;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Opaque versioned payload, interpreted by exactly one handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigValue {
    #[serde(default)]
    pub version: u64,
    #[serde(with = "base64_bytes")]
    pub value: Bytes,
}

impl ConfigValue {
    pub fn new(value: impl Into<Bytes>) -> Self {
        Self {
            version: 0,
            value: value.into(),
        }
    }

    /// Encode a typed payload as JSON
    pub fn json<T: Serialize>(payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_vec(payload)?))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.value)
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }
}

/// Named authorization rule attached to a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPolicy {
    #[serde(default)]
    pub version: u64,
    pub policy: PolicyDefinition,
}

impl ConfigPolicy {
    pub fn new(policy: PolicyDefinition) -> Self {
        Self { version: 0, policy }
    }
}

/// A node of the configuration tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigGroup {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub mod_policy: String,
    #[serde(default)]
    pub groups: BTreeMap<String, Arc<ConfigGroup>>,
    #[serde(default)]
    pub values: BTreeMap<String, ConfigValue>,
    #[serde(default)]
    pub policies: BTreeMap<String, ConfigPolicy>,
}

impl ConfigGroup {
    pub fn new(mod_policy: impl Into<String>) -> Self {
        Self {
            mod_policy: mod_policy.into(),
            ..Default::default()
        }
    }

    pub fn with_group(mut self, name: impl Into<String>, group: ConfigGroup) -> Self {
        self.groups.insert(name.into(), Arc::new(group));
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: ConfigValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn with_policy(mut self, key: impl Into<String>, policy: PolicyDefinition) -> Self {
        self.policies.insert(key.into(), ConfigPolicy::new(policy));
        self
    }

    pub fn group(&self, path: &GroupPath) -> Option<&ConfigGroup> {
        let mut current = self;
        for segment in path.segments() {
            current = current.groups.get(segment)?;
        }
        Some(current)
    }

    /// Shared handle of a descendant group, `None` for the root itself
    pub fn group_arc(&self, path: &GroupPath) -> Option<&Arc<ConfigGroup>> {
        let (last, parents) = path.segments().split_last()?;
        let mut current = self;
        for segment in parents {
            current = current.groups.get(segment)?;
        }
        current.groups.get(last)
    }

    pub fn value(&self, path: &GroupPath, key: &str) -> Option<&ConfigValue> {
        self.group(path)?.values.get(key)
    }

    pub fn policy(&self, path: &GroupPath, key: &str) -> Option<&ConfigPolicy> {
        self.group(path)?.policies.get(key)
    }

    /// Every group with its path, parents before children, siblings sorted
    pub fn walk(&self) -> Vec<(GroupPath, &ConfigGroup)> {
        let mut out = Vec::new();
        let mut stack = vec![(GroupPath::root(), self)];
        while let Some((path, group)) = stack.pop() {
            for (name, child) in group.groups.iter().rev() {
                stack.push((path.child(name), child.as_ref()));
            }
            out.push((path, group));
        }
        out
    }

    /// Digest of the canonical JSON form. Maps are ordered, so equal trees
    /// always hash equally.
    pub fn digest(&self, hash: fn(&[u8]) -> Vec<u8>) -> Result<String, serde_json::Error> {
        let bytes = serde_json::to_vec(self)?;
        Ok(const_hex::encode(hash(&bytes)))
    }
}

/// Serializes `Bytes` as standard base64 text
pub(crate) mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
