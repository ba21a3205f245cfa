//! JSON payloads of the channel config values

use ledgerconf_common::{ConfigTxError, GroupPath, Result};
use ledgerconf_configtx::{AnchorPeer, BatchSize, ConfigValue};
use ledgerconf_policy::MspConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A typed config value payload
pub trait ValuePayload: Serialize + DeserializeOwned {
    fn to_value(&self) -> ConfigValue {
        // Plain structs with string keys always serialize
        ConfigValue::new(serde_json::to_vec(self).unwrap_or_default())
    }
}

/// Decode a proposed value, reporting bad JSON as a rejection of that key
pub fn decode<T: ValuePayload>(path: &GroupPath, key: &str, value: &ConfigValue) -> Result<T> {
    serde_json::from_slice(&value.value)
        .map_err(|e| ConfigTxError::rejected(path, key, format!("cannot decode payload: {}", e)))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HashingAlgorithmValue {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockDataHashingStructureValue {
    pub width: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrdererAddressesValue {
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsensusTypeValue {
    #[serde(rename = "type")]
    pub consensus_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchTimeoutValue {
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KafkaBrokersValue {
    pub brokers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyNamesValue {
    pub names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnchorPeersValue {
    pub anchor_peers: Vec<AnchorPeer>,
}

impl ValuePayload for HashingAlgorithmValue {}
impl ValuePayload for BlockDataHashingStructureValue {}
impl ValuePayload for OrdererAddressesValue {}
impl ValuePayload for ConsensusTypeValue {}
impl ValuePayload for BatchSize {}
impl ValuePayload for BatchTimeoutValue {}
impl ValuePayload for KafkaBrokersValue {}
impl ValuePayload for PolicyNamesValue {}
impl ValuePayload for AnchorPeersValue {}
impl ValuePayload for MspConfig {}

/// Check a `host:port` endpoint
pub fn validate_endpoint(endpoint: &str) -> std::result::Result<(), String> {
    let Some((host, port)) = endpoint.rsplit_once(':') else {
        return Err(format!("'{}' is not of the form host:port", endpoint));
    };
    if host.is_empty() {
        return Err(format!("'{}' has an empty host", endpoint));
    }
    match port.parse::<u16>() {
        Ok(p) if p > 0 => Ok(()),
        _ => Err(format!("'{}' has an invalid port", endpoint)),
    }
}
