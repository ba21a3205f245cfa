//! Builder for the genesis tree of a standard channel

use std::collections::BTreeMap;
use std::time::Duration;

use ledgerconf_common::{
    ADMINS_POLICY, ANCHOR_PEERS_KEY, APPLICATION_GROUP, BATCH_SIZE_KEY, BATCH_TIMEOUT_KEY,
    BLOCK_DATA_HASHING_STRUCTURE_KEY, CONSENSUS_TYPE_KEY, HASHING_ALGORITHM_KEY, MSP_KEY,
    ORDERER_ADDRESSES_KEY, ORDERER_GROUP, READERS_POLICY, WRITERS_POLICY,
};
use ledgerconf_configtx::{AnchorPeer, BatchSize, ConfigGroup, HashingAlgorithm};
use ledgerconf_policy::{MetaRule, MspConfig, PolicyDefinition, Principal};

use crate::values::{
    AnchorPeersValue, BatchTimeoutValue, BlockDataHashingStructureValue, ConsensusTypeValue,
    HashingAlgorithmValue, OrdererAddressesValue, ValuePayload,
};

/// Readers, Writers and Admins aggregated over the child groups
fn with_implicit_meta_policies(group: ConfigGroup) -> ConfigGroup {
    group
        .with_policy(READERS_POLICY, PolicyDefinition::implicit_meta(MetaRule::Any, READERS_POLICY))
        .with_policy(WRITERS_POLICY, PolicyDefinition::implicit_meta(MetaRule::Any, WRITERS_POLICY))
        .with_policy(
            ADMINS_POLICY,
            PolicyDefinition::implicit_meta(MetaRule::Majority, ADMINS_POLICY),
        )
}

/// One organization of the genesis tree
#[derive(Debug, Clone)]
pub struct OrgProfile {
    name: String,
    msp: MspConfig,
    anchor_peers: Vec<AnchorPeer>,
    mod_policy: String,
    policies: BTreeMap<String, PolicyDefinition>,
}

impl OrgProfile {
    /// An organization whose admins administer it and whose members read and write
    pub fn new(name: impl Into<String>, msp: MspConfig) -> Self {
        let mut policies = BTreeMap::new();
        policies.insert(
            ADMINS_POLICY.to_string(),
            PolicyDefinition::n_out_of(1, vec![Principal::admin_of(&msp.msp_id)]),
        );
        policies.insert(
            READERS_POLICY.to_string(),
            PolicyDefinition::n_out_of(1, vec![Principal::member_of(&msp.msp_id)]),
        );
        policies.insert(
            WRITERS_POLICY.to_string(),
            PolicyDefinition::n_out_of(1, vec![Principal::member_of(&msp.msp_id)]),
        );
        Self {
            name: name.into(),
            msp,
            anchor_peers: Vec::new(),
            mod_policy: ADMINS_POLICY.to_string(),
            policies,
        }
    }

    pub fn with_anchor_peer(mut self, host: impl Into<String>, port: u32) -> Self {
        self.anchor_peers.push(AnchorPeer {
            host: host.into(),
            port,
        });
        self
    }

    pub fn with_policy(mut self, name: impl Into<String>, policy: PolicyDefinition) -> Self {
        self.policies.insert(name.into(), policy);
        self
    }

    pub fn with_mod_policy(mut self, mod_policy: impl Into<String>) -> Self {
        self.mod_policy = mod_policy.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn to_group(&self) -> ConfigGroup {
        let mut group = ConfigGroup::new(self.mod_policy.clone()).with_value(MSP_KEY, self.msp.to_value());
        if !self.anchor_peers.is_empty() {
            group = group.with_value(
                ANCHOR_PEERS_KEY,
                AnchorPeersValue {
                    anchor_peers: self.anchor_peers.clone(),
                }
                .to_value(),
            );
        }
        for (name, policy) in &self.policies {
            group = group.with_policy(name.clone(), policy.clone());
        }
        group
    }
}

/// Assembles the `/`, `/Orderer` and `/Application` groups of a new channel.
///
/// A section without organizations is left out, since its implicit meta
/// policies could never be satisfied.
#[derive(Debug, Clone)]
pub struct GenesisBuilder {
    hashing_algorithm: HashingAlgorithm,
    orderer_addresses: Vec<String>,
    consensus_type: String,
    batch_size: BatchSize,
    batch_timeout: Duration,
    orderer_orgs: Vec<OrgProfile>,
    application_orgs: Vec<OrgProfile>,
}

impl Default for GenesisBuilder {
    fn default() -> Self {
        Self {
            hashing_algorithm: HashingAlgorithm::default(),
            orderer_addresses: vec!["127.0.0.1:7050".to_string()],
            consensus_type: "solo".to_string(),
            batch_size: BatchSize {
                max_message_count: 10,
                absolute_max_bytes: 99 * 1024 * 1024,
                preferred_max_bytes: 512 * 1024,
            },
            batch_timeout: Duration::from_secs(2),
            orderer_orgs: Vec::new(),
            application_orgs: Vec::new(),
        }
    }
}

impl GenesisBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hashing_algorithm(mut self, algorithm: HashingAlgorithm) -> Self {
        self.hashing_algorithm = algorithm;
        self
    }

    pub fn orderer_addresses(mut self, addresses: Vec<String>) -> Self {
        self.orderer_addresses = addresses;
        self
    }

    pub fn consensus_type(mut self, consensus_type: impl Into<String>) -> Self {
        self.consensus_type = consensus_type.into();
        self
    }

    pub fn batch_size(mut self, batch_size: BatchSize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = timeout;
        self
    }

    pub fn orderer_org(mut self, org: OrgProfile) -> Self {
        self.orderer_orgs.push(org);
        self
    }

    pub fn application_org(mut self, org: OrgProfile) -> Self {
        self.application_orgs.push(org);
        self
    }

    pub fn build(&self) -> ConfigGroup {
        let mut root = with_implicit_meta_policies(ConfigGroup::new(ADMINS_POLICY))
            .with_value(
                HASHING_ALGORITHM_KEY,
                HashingAlgorithmValue {
                    name: self.hashing_algorithm.name().to_string(),
                }
                .to_value(),
            )
            .with_value(
                BLOCK_DATA_HASHING_STRUCTURE_KEY,
                BlockDataHashingStructureValue { width: u32::MAX }.to_value(),
            )
            .with_value(
                ORDERER_ADDRESSES_KEY,
                OrdererAddressesValue {
                    addresses: self.orderer_addresses.clone(),
                }
                .to_value(),
            );

        if !self.orderer_orgs.is_empty() {
            let mut orderer = with_implicit_meta_policies(ConfigGroup::new(ADMINS_POLICY))
                .with_value(
                    CONSENSUS_TYPE_KEY,
                    ConsensusTypeValue {
                        consensus_type: self.consensus_type.clone(),
                    }
                    .to_value(),
                )
                .with_value(BATCH_SIZE_KEY, self.batch_size.to_value())
                .with_value(
                    BATCH_TIMEOUT_KEY,
                    BatchTimeoutValue {
                        timeout_ms: self.batch_timeout.as_millis() as u64,
                    }
                    .to_value(),
                );
            for org in &self.orderer_orgs {
                orderer = orderer.with_group(org.name.clone(), org.to_group());
            }
            root = root.with_group(ORDERER_GROUP, orderer);
        }

        if !self.application_orgs.is_empty() {
            let mut application = with_implicit_meta_policies(ConfigGroup::new(ADMINS_POLICY));
            for org in &self.application_orgs {
                application = application.with_group(org.name.clone(), org.to_group());
            }
            root = root.with_group(APPLICATION_GROUP, application);
        }
        root
    }
}
