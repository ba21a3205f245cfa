//! Typed views of a committed channel configuration

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use ledgerconf_common::{APPLICATION_GROUP, GroupPath};
use ledgerconf_policy::{MspManager, PolicyManager};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};

/// Hash function used for block and config digests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HashingAlgorithm {
    #[default]
    #[serde(rename = "SHA256")]
    Sha256,
    #[serde(rename = "SHA384")]
    Sha384,
    #[serde(rename = "SHA512")]
    Sha512,
}

impl HashingAlgorithm {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "SHA256" => Some(HashingAlgorithm::Sha256),
            "SHA384" => Some(HashingAlgorithm::Sha384),
            "SHA512" => Some(HashingAlgorithm::Sha512),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HashingAlgorithm::Sha256 => "SHA256",
            HashingAlgorithm::Sha384 => "SHA384",
            HashingAlgorithm::Sha512 => "SHA512",
        }
    }

    pub fn hasher(self) -> fn(&[u8]) -> Vec<u8> {
        match self {
            HashingAlgorithm::Sha256 => |data: &[u8]| Sha256::digest(data).to_vec(),
            HashingAlgorithm::Sha384 => |data: &[u8]| Sha384::digest(data).to_vec(),
            HashingAlgorithm::Sha512 => |data: &[u8]| Sha512::digest(data).to_vec(),
        }
    }
}

/// Channel-wide settings held by the root group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelConfig {
    pub hashing_algorithm: HashingAlgorithm,
    pub block_data_hashing_structure_width: u32,
    pub orderer_addresses: Vec<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            hashing_algorithm: HashingAlgorithm::default(),
            block_data_hashing_structure_width: u32::MAX,
            orderer_addresses: Vec::new(),
        }
    }
}

impl ChannelConfig {
    pub fn hashing_algorithm(&self) -> fn(&[u8]) -> Vec<u8> {
        self.hashing_algorithm.hasher()
    }

    pub fn block_data_hashing_structure_width(&self) -> u32 {
        self.block_data_hashing_structure_width
    }

    pub fn orderer_addresses(&self) -> &[String] {
        &self.orderer_addresses
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchSize {
    pub max_message_count: u32,
    pub absolute_max_bytes: u32,
    pub preferred_max_bytes: u32,
}

/// Ordering service settings held by the `Orderer` group
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct OrdererConfig {
    pub consensus_type: String,
    pub batch_size: BatchSize,
    pub batch_timeout: Duration,
    pub kafka_brokers: Vec<String>,
    pub chain_creation_policy_names: Vec<String>,
    pub ingress_policy_names: Vec<String>,
    pub egress_policy_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnchorPeer {
    pub host: String,
    pub port: u32,
}

impl std::fmt::Display for AnchorPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ApplicationOrgConfig {
    pub name: String,
    /// Filled from the membership manager when resources are built
    pub msp_id: String,
    pub anchor_peers: Vec<AnchorPeer>,
}

impl ApplicationOrgConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ApplicationConfig {
    pub organizations: BTreeMap<String, ApplicationOrgConfig>,
}

impl ApplicationConfig {
    pub fn organizations(&self) -> &BTreeMap<String, ApplicationOrgConfig> {
        &self.organizations
    }
}

/// Everything the handlers of one committed configuration produced
#[derive(Debug, Clone, Default)]
pub struct Resources {
    channel: Arc<ChannelConfig>,
    orderer: Option<Arc<OrdererConfig>>,
    application: Option<Arc<ApplicationConfig>>,
    policy_manager: Arc<PolicyManager>,
    msp_manager: Arc<MspManager>,
}

impl Resources {
    pub fn channel_config(&self) -> &ChannelConfig {
        &self.channel
    }

    pub fn orderer_config(&self) -> Option<&OrdererConfig> {
        self.orderer.as_deref()
    }

    pub fn application_config(&self) -> Option<&ApplicationConfig> {
        self.application.as_deref()
    }

    pub fn policy_manager(&self) -> &PolicyManager {
        &self.policy_manager
    }

    pub fn msp_manager(&self) -> &MspManager {
        &self.msp_manager
    }
}

/// Next resource set, assembled by handlers during commit.
///
/// Pieces no handler touches stay shared with the committed set.
#[derive(Debug, Clone, Default)]
pub struct ResourcesBuilder {
    inner: Resources,
}

impl ResourcesBuilder {
    pub fn from_committed(committed: &Resources) -> Self {
        Self {
            inner: committed.clone(),
        }
    }

    pub fn channel_mut(&mut self) -> &mut ChannelConfig {
        Arc::make_mut(&mut self.inner.channel)
    }

    pub fn set_channel(&mut self, channel: ChannelConfig) {
        self.inner.channel = Arc::new(channel);
    }

    pub fn set_orderer(&mut self, orderer: Option<OrdererConfig>) {
        self.inner.orderer = orderer.map(Arc::new);
    }

    /// The application config, created empty if the channel had none
    pub fn application_mut(&mut self) -> &mut ApplicationConfig {
        Arc::make_mut(self.inner.application.get_or_insert_with(Default::default))
    }

    /// The application config, only if the channel has one
    pub fn existing_application_mut(&mut self) -> Option<&mut ApplicationConfig> {
        self.inner.application.as_mut().map(Arc::make_mut)
    }

    pub fn clear_application(&mut self) {
        self.inner.application = None;
    }

    pub fn set_policy_manager(&mut self, policy_manager: PolicyManager) {
        self.inner.policy_manager = Arc::new(policy_manager);
    }

    pub fn msp_manager_mut(&mut self) -> &mut MspManager {
        Arc::make_mut(&mut self.inner.msp_manager)
    }

    pub fn build(mut self) -> Resources {
        let stale: Vec<(String, String)> = match &self.inner.application {
            Some(application) => application
                .organizations
                .iter()
                .filter_map(|(name, org)| {
                    let path = GroupPath::root().child(APPLICATION_GROUP).child(name);
                    let msp_id = self
                        .inner
                        .msp_manager
                        .msp_for_org(&path)
                        .map(|msp| msp.msp_id().to_string())
                        .unwrap_or_default();
                    (org.msp_id != msp_id).then(|| (name.clone(), msp_id))
                })
                .collect(),
            None => Vec::new(),
        };
        if !stale.is_empty() {
            let application = self.application_mut();
            for (name, msp_id) in stale {
                if let Some(org) = application.organizations.get_mut(&name) {
                    org.msp_id = msp_id;
                }
            }
        }
        self.inner
    }
}
