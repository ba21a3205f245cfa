//! Policy definitions attached to configuration groups

use serde::{Deserialize, Serialize};

/// Role a principal requires within its MSP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MspRole {
    Admin,
    Member,
}

/// Something a signer must be in order to count toward a signature policy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Principal {
    /// One specific identity
    Identity { msp_id: String, id: String },
    /// Any identity holding a role in an MSP
    Role { msp_id: String, role: MspRole },
}

impl Principal {
    pub fn identity(msp_id: impl Into<String>, id: impl Into<String>) -> Self {
        Principal::Identity {
            msp_id: msp_id.into(),
            id: id.into(),
        }
    }

    pub fn admin_of(msp_id: impl Into<String>) -> Self {
        Principal::Role {
            msp_id: msp_id.into(),
            role: MspRole::Admin,
        }
    }

    pub fn member_of(msp_id: impl Into<String>) -> Self {
        Principal::Role {
            msp_id: msp_id.into(),
            role: MspRole::Member,
        }
    }

    pub fn msp_id(&self) -> &str {
        match self {
            Principal::Identity { msp_id, .. } | Principal::Role { msp_id, .. } => msp_id,
        }
    }
}

/// Aggregation rule of an implicit meta policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetaRule {
    Any,
    All,
    Majority,
}

impl MetaRule {
    /// Number of satisfied children required out of `children`
    pub fn threshold(self, children: usize) -> usize {
        match self {
            MetaRule::Any => 1,
            MetaRule::All => children,
            MetaRule::Majority => children / 2 + 1,
        }
    }
}

impl std::fmt::Display for MetaRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetaRule::Any => write!(f, "ANY"),
            MetaRule::All => write!(f, "ALL"),
            MetaRule::Majority => write!(f, "MAJORITY"),
        }
    }
}

/// A named authorization rule attached to a group
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyDefinition {
    /// At least `n` of `principals`, each matched by a distinct signer
    Signature { n: usize, principals: Vec<Principal> },
    /// `rule` applied over the `sub_policy` of every direct child group
    ImplicitMeta { rule: MetaRule, sub_policy: String },
    /// Delegates to another policy, relative (`Admins`) or absolute (`/Application/Admins`)
    Reference { target: String },
}

impl PolicyDefinition {
    pub fn n_out_of(n: usize, principals: Vec<Principal>) -> Self {
        PolicyDefinition::Signature { n, principals }
    }

    pub fn implicit_meta(rule: MetaRule, sub_policy: impl Into<String>) -> Self {
        PolicyDefinition::ImplicitMeta {
            rule,
            sub_policy: sub_policy.into(),
        }
    }

    pub fn reference(target: impl Into<String>) -> Self {
        PolicyDefinition::Reference {
            target: target.into(),
        }
    }

    /// Structural checks that do not depend on the rest of the tree
    pub fn validate(&self) -> Result<(), String> {
        match self {
            PolicyDefinition::Signature { n, principals } => {
                if *n > principals.len() {
                    return Err(format!(
                        "requires {} signatures but only lists {} principals",
                        n,
                        principals.len()
                    ));
                }
                for principal in principals {
                    if principal.msp_id().is_empty() {
                        return Err("principal has an empty msp_id".to_string());
                    }
                    if let Principal::Identity { id, .. } = principal
                        && id.is_empty()
                    {
                        return Err("identity principal has an empty id".to_string());
                    }
                }
                Ok(())
            }
            PolicyDefinition::ImplicitMeta { sub_policy, .. } => {
                if sub_policy.is_empty() {
                    return Err("implicit meta policy names no sub policy".to_string());
                }
                if sub_policy.contains('/') {
                    return Err(format!(
                        "implicit meta sub policy '{}' must be a plain name",
                        sub_policy
                    ));
                }
                Ok(())
            }
            PolicyDefinition::Reference { target } => {
                let name = target.rsplit('/').next().unwrap_or_default();
                if name.is_empty() {
                    return Err(format!("reference target '{}' names no policy", target));
                }
                if !target.starts_with('/') && target.contains('/') {
                    return Err(format!(
                        "relative reference '{}' must be a plain name",
                        target
                    ));
                }
                Ok(())
            }
        }
    }
}
