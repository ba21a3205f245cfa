//! Membership service model
//!
//! Certificates and signatures are verified upstream; here an identity is
//! simply an id string scoped by the MSP that vouches for it.

use std::collections::{BTreeMap, BTreeSet};

use ledgerconf_common::GroupPath;
use serde::{Deserialize, Serialize};

use crate::policy::{MspRole, Principal};

/// A verified signer attached to an update envelope
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SignedIdentity {
    pub msp_id: String,
    pub id: String,
}

impl SignedIdentity {
    pub fn new(msp_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            msp_id: msp_id.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for SignedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.msp_id, self.id)
    }
}

/// Payload of the `MSP` config value of an organization group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MspConfig {
    pub msp_id: String,
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub members: Vec<String>,
}

impl MspConfig {
    pub fn decode(bytes: &[u8]) -> Result<Self, String> {
        let config: MspConfig =
            serde_json::from_slice(bytes).map_err(|e| format!("invalid MSP payload: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.msp_id.trim().is_empty() {
            return Err("msp_id must not be empty".to_string());
        }
        if self.admins.is_empty() {
            return Err(format!("MSP '{}' declares no admins", self.msp_id));
        }
        if let Some(empty) = self.admins.iter().chain(&self.members).find(|id| id.is_empty()) {
            return Err(format!("MSP '{}' contains an empty identity '{}'", self.msp_id, empty));
        }
        Ok(())
    }
}

/// A committed membership service provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Msp {
    msp_id: String,
    admins: BTreeSet<String>,
    members: BTreeSet<String>,
}

impl Msp {
    pub fn from_config(config: &MspConfig) -> Self {
        Self {
            msp_id: config.msp_id.clone(),
            admins: config.admins.iter().cloned().collect(),
            members: config.members.iter().cloned().collect(),
        }
    }

    pub fn msp_id(&self) -> &str {
        &self.msp_id
    }

    pub fn is_admin(&self, id: &str) -> bool {
        self.admins.contains(id)
    }

    /// Admins are members too
    pub fn is_member(&self, id: &str) -> bool {
        self.admins.contains(id) || self.members.contains(id)
    }

    pub fn admins(&self) -> impl Iterator<Item = &str> {
        self.admins.iter().map(String::as_str)
    }

    /// Every known identity, admins first
    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.admins
            .iter()
            .chain(self.members.iter().filter(|m| !self.admins.contains(*m)))
            .map(String::as_str)
    }
}

/// Membership manager: every MSP of the channel, keyed by MSP id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MspManager {
    msps: BTreeMap<String, Msp>,
    owners: BTreeMap<GroupPath, String>,
}

impl MspManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from organization configs, rejecting an MSP id claimed twice
    pub fn from_configs<'a, I>(configs: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = (GroupPath, &'a MspConfig)>,
    {
        let mut manager = MspManager::new();
        for (org, config) in configs {
            if let Some(owner) = manager.owner_of(&config.msp_id)
                && owner != &org
            {
                return Err(format!(
                    "MSP id '{}' is declared by both {} and {}",
                    config.msp_id, owner, org
                ));
            }
            manager.upsert(org, config);
        }
        Ok(manager)
    }

    /// Install or replace the MSP owned by an organization group
    pub fn upsert(&mut self, org: GroupPath, config: &MspConfig) {
        if let Some(previous) = self.owners.insert(org, config.msp_id.clone())
            && previous != config.msp_id
        {
            self.msps.remove(&previous);
        }
        self.msps.insert(config.msp_id.clone(), Msp::from_config(config));
    }

    /// Drop the MSP owned by an organization group
    pub fn remove(&mut self, org: &GroupPath) -> Option<Msp> {
        let msp_id = self.owners.remove(org)?;
        self.msps.remove(&msp_id)
    }

    pub fn msp(&self, msp_id: &str) -> Option<&Msp> {
        self.msps.get(msp_id)
    }

    pub fn msp_for_org(&self, org: &GroupPath) -> Option<&Msp> {
        self.owners.get(org).and_then(|id| self.msps.get(id))
    }

    pub fn owner_of(&self, msp_id: &str) -> Option<&GroupPath> {
        self.owners
            .iter()
            .find(|(_, id)| id.as_str() == msp_id)
            .map(|(org, _)| org)
    }

    pub fn msp_ids(&self) -> impl Iterator<Item = &str> {
        self.msps.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.msps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.msps.is_empty()
    }

    /// Whether a signer satisfies a principal
    pub fn satisfies(&self, signer: &SignedIdentity, principal: &Principal) -> bool {
        match principal {
            Principal::Identity { msp_id, id } => {
                signer.msp_id == *msp_id
                    && signer.id == *id
                    && self.msp(msp_id).is_some_and(|msp| msp.is_member(id))
            }
            Principal::Role { msp_id, role } => {
                if signer.msp_id != *msp_id {
                    return false;
                }
                match (self.msp(msp_id), role) {
                    (Some(msp), MspRole::Admin) => msp.is_admin(&signer.id),
                    (Some(msp), MspRole::Member) => msp.is_member(&signer.id),
                    (None, _) => false,
                }
            }
        }
    }

    /// Every identity known to any MSP, in a stable order
    pub fn all_identities(&self) -> Vec<SignedIdentity> {
        self.msps
            .values()
            .flat_map(|msp| {
                msp.identities()
                    .map(move |id| SignedIdentity::new(msp.msp_id(), id))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org1() -> MspConfig {
        MspConfig {
            msp_id: "Org1MSP".to_string(),
            admins: vec!["admin1".to_string(), "admin2".to_string()],
            members: vec!["peer0".to_string()],
        }
    }

    fn path(s: &str) -> GroupPath {
        s.parse().unwrap()
    }

    #[test]
    fn test_decode_and_validate() {
        let bytes = org1().encode().unwrap();
        assert_eq!(MspConfig::decode(&bytes).unwrap(), org1());

        assert!(MspConfig::decode(b"not json").is_err());

        let mut no_admins = org1();
        no_admins.admins.clear();
        assert!(MspConfig::decode(&no_admins.encode().unwrap()).is_err());

        let mut no_id = org1();
        no_id.msp_id = " ".to_string();
        assert!(no_id.validate().is_err());
    }

    #[test]
    fn test_roles() {
        let msp = Msp::from_config(&org1());
        assert!(msp.is_admin("admin1"));
        assert!(!msp.is_admin("peer0"));
        assert!(msp.is_member("peer0"));
        assert!(msp.is_member("admin2"));
        assert!(!msp.is_member("stranger"));
        assert_eq!(msp.identities().count(), 3);
    }

    #[test]
    fn test_upsert_and_remove() {
        let mut manager = MspManager::new();
        let org = path("/Application/Org1");
        manager.upsert(org.clone(), &org1());
        assert!(manager.msp("Org1MSP").is_some());
        assert_eq!(manager.owner_of("Org1MSP"), Some(&org));

        let mut renamed = org1();
        renamed.msp_id = "Org1MSPv2".to_string();
        manager.upsert(org.clone(), &renamed);
        assert!(manager.msp("Org1MSP").is_none());
        assert_eq!(manager.msp_for_org(&org).unwrap().msp_id(), "Org1MSPv2");

        assert!(manager.remove(&org).is_some());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_duplicate_msp_id_rejected() {
        let config = org1();
        let result = MspManager::from_configs(vec![
            (path("/Application/Org1"), &config),
            (path("/Application/Org2"), &config),
        ]);
        assert!(result.unwrap_err().contains("declared by both"));

        let ok = MspManager::from_configs(vec![(path("/Application/Org1"), &config)]);
        assert_eq!(ok.unwrap().len(), 1);
    }

    #[test]
    fn test_satisfies() {
        let mut manager = MspManager::new();
        manager.upsert(path("/Application/Org1"), &org1());

        let admin = SignedIdentity::new("Org1MSP", "admin1");
        let peer = SignedIdentity::new("Org1MSP", "peer0");
        let foreign = SignedIdentity::new("Org2MSP", "admin1");

        let admin_role = Principal::Role {
            msp_id: "Org1MSP".to_string(),
            role: MspRole::Admin,
        };
        let member_role = Principal::Role {
            msp_id: "Org1MSP".to_string(),
            role: MspRole::Member,
        };

        assert!(manager.satisfies(&admin, &admin_role));
        assert!(!manager.satisfies(&peer, &admin_role));
        assert!(manager.satisfies(&peer, &member_role));
        assert!(!manager.satisfies(&foreign, &admin_role));

        let exact = Principal::Identity {
            msp_id: "Org1MSP".to_string(),
            id: "peer0".to_string(),
        };
        assert!(manager.satisfies(&peer, &exact));
        assert!(!manager.satisfies(&admin, &exact));
    }

    #[test]
    fn test_all_identities() {
        let mut manager = MspManager::new();
        manager.upsert(path("/Application/Org1"), &org1());
        manager.upsert(
            path("/Orderer/OrdererOrg"),
            &MspConfig {
                msp_id: "OrdererMSP".to_string(),
                admins: vec!["oadmin".to_string()],
                members: vec![],
            },
        );

        let all = manager.all_identities();
        assert_eq!(all.len(), 4);
        // Ordered by MSP id, admins first within an MSP
        assert_eq!(all[0], SignedIdentity::new("OrdererMSP", "oadmin"));
        assert_eq!(all[1], SignedIdentity::new("Org1MSP", "admin1"));
        assert_eq!(all[3], SignedIdentity::new("Org1MSP", "peer0"));
    }
}
