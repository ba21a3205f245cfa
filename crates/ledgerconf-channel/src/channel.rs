//! Root group handler: channel-wide settings

use ledgerconf_common::{
    BLOCK_DATA_HASHING_STRUCTURE_KEY, ConfigTxError, GroupPath, HASHING_ALGORITHM_KEY,
    ORDERER_ADDRESSES_KEY, Result,
};
use ledgerconf_configtx::{
    ChannelConfig, ConfigValue, HandlerFactory, HashingAlgorithm, Proposal, Resources,
    ResourcesBuilder, ValueHandler,
};
use tracing::debug;

use crate::values::{
    BlockDataHashingStructureValue, HashingAlgorithmValue, OrdererAddressesValue, decode,
    validate_endpoint,
};

pub const CHANNEL_KEYS: &[&str] = &[
    HASHING_ALGORITHM_KEY,
    BLOCK_DATA_HASHING_STRUCTURE_KEY,
    ORDERER_ADDRESSES_KEY,
];

pub struct ChannelHandler {
    path: GroupPath,
    pending: ChannelConfig,
}

impl ValueHandler for ChannelHandler {
    fn name(&self) -> &str {
        "channel"
    }

    fn propose_config(&mut self, key: &str, proposal: Proposal<'_, ConfigValue>) -> Result<()> {
        let defaults = ChannelConfig::default();
        match (key, proposal) {
            (HASHING_ALGORITHM_KEY, Proposal::Set(value)) => {
                let payload: HashingAlgorithmValue = decode(&self.path, key, value)?;
                self.pending.hashing_algorithm = HashingAlgorithm::parse(&payload.name).ok_or_else(|| {
                    ConfigTxError::rejected(
                        &self.path,
                        key,
                        format!("unsupported hashing algorithm '{}'", payload.name),
                    )
                })?;
            }
            (HASHING_ALGORITHM_KEY, Proposal::Remove) => {
                self.pending.hashing_algorithm = defaults.hashing_algorithm;
            }
            (BLOCK_DATA_HASHING_STRUCTURE_KEY, Proposal::Set(value)) => {
                let payload: BlockDataHashingStructureValue = decode(&self.path, key, value)?;
                if payload.width != u32::MAX {
                    return Err(ConfigTxError::rejected(
                        &self.path,
                        key,
                        format!("width must be {}, got {}", u32::MAX, payload.width),
                    ));
                }
                self.pending.block_data_hashing_structure_width = payload.width;
            }
            (BLOCK_DATA_HASHING_STRUCTURE_KEY, Proposal::Remove) => {
                self.pending.block_data_hashing_structure_width =
                    defaults.block_data_hashing_structure_width;
            }
            (ORDERER_ADDRESSES_KEY, Proposal::Set(value)) => {
                let payload: OrdererAddressesValue = decode(&self.path, key, value)?;
                if payload.addresses.is_empty() {
                    return Err(ConfigTxError::rejected(&self.path, key, "no orderer addresses"));
                }
                for address in &payload.addresses {
                    validate_endpoint(address)
                        .map_err(|reason| ConfigTxError::rejected(&self.path, key, reason))?;
                }
                self.pending.orderer_addresses = payload.addresses;
            }
            (ORDERER_ADDRESSES_KEY, Proposal::Remove) => {
                self.pending.orderer_addresses.clear();
            }
            _ => return Err(ConfigTxError::unknown_key(&self.path, key)),
        }
        Ok(())
    }

    fn commit_config(self: Box<Self>, resources: &mut ResourcesBuilder) {
        debug!(
            hashing = self.pending.hashing_algorithm.name(),
            orderers = self.pending.orderer_addresses.len(),
            "Channel config staged"
        );
        resources.set_channel(self.pending);
    }
}

pub struct ChannelHandlerFactory;

impl HandlerFactory for ChannelHandlerFactory {
    fn name(&self) -> &'static str {
        "channel"
    }

    fn begin_config(&self, path: &GroupPath, committed: &Resources) -> Result<Box<dyn ValueHandler>> {
        Ok(Box::new(ChannelHandler {
            path: path.clone(),
            pending: committed.channel_config().clone(),
        }))
    }
}
