//! `Orderer` group handler: ordering service parameters

use std::time::Duration;

use ledgerconf_common::{
    BATCH_SIZE_KEY, BATCH_TIMEOUT_KEY, CHAIN_CREATION_POLICY_NAMES_KEY, CONSENSUS_TYPE_KEY,
    ConfigTxError, EGRESS_POLICY_NAMES_KEY, GroupPath, INGRESS_POLICY_NAMES_KEY, KAFKA_BROKERS_KEY,
    Result,
};
use ledgerconf_configtx::{
    BatchSize, ConfigValue, HandlerFactory, OrdererConfig, Proposal, Resources, ResourcesBuilder,
    ValueHandler,
};
use tracing::{debug, info};

use crate::values::{
    BatchTimeoutValue, ConsensusTypeValue, KafkaBrokersValue, PolicyNamesValue, decode,
    validate_endpoint,
};

pub const ORDERER_KEYS: &[&str] = &[
    CONSENSUS_TYPE_KEY,
    BATCH_SIZE_KEY,
    BATCH_TIMEOUT_KEY,
    KAFKA_BROKERS_KEY,
    CHAIN_CREATION_POLICY_NAMES_KEY,
    INGRESS_POLICY_NAMES_KEY,
    EGRESS_POLICY_NAMES_KEY,
];

pub struct OrdererHandler {
    path: GroupPath,
    /// Consensus type of the committed config; it can never change afterwards
    committed_consensus: Option<String>,
    pending: OrdererConfig,
    removed: bool,
}

impl OrdererHandler {
    fn reject(&self, key: &str, reason: impl Into<String>) -> ConfigTxError {
        ConfigTxError::rejected(&self.path, key, reason)
    }

    fn policy_names(&self, key: &str, value: &ConfigValue) -> Result<Vec<String>> {
        let payload: PolicyNamesValue = decode(&self.path, key, value)?;
        if payload.names.iter().any(|name| name.trim().is_empty()) {
            return Err(self.reject(key, "policy names must not be empty"));
        }
        Ok(payload.names)
    }

    fn set_consensus_type(&mut self, consensus_type: String) -> Result<()> {
        if consensus_type.trim().is_empty() {
            return Err(self.reject(CONSENSUS_TYPE_KEY, "consensus type must not be empty"));
        }
        if let Some(committed) = &self.committed_consensus
            && *committed != consensus_type
        {
            return Err(self.reject(
                CONSENSUS_TYPE_KEY,
                format!(
                    "consensus type cannot change once committed ('{}' -> '{}')",
                    committed, consensus_type
                ),
            ));
        }
        self.pending.consensus_type = consensus_type;
        Ok(())
    }

    fn set_batch_size(&mut self, batch_size: BatchSize) -> Result<()> {
        if batch_size.max_message_count == 0 {
            return Err(self.reject(BATCH_SIZE_KEY, "max_message_count must be greater than 0"));
        }
        if batch_size.absolute_max_bytes == 0 {
            return Err(self.reject(BATCH_SIZE_KEY, "absolute_max_bytes must be greater than 0"));
        }
        if batch_size.preferred_max_bytes == 0 {
            return Err(self.reject(BATCH_SIZE_KEY, "preferred_max_bytes must be greater than 0"));
        }
        if batch_size.preferred_max_bytes > batch_size.absolute_max_bytes {
            return Err(self.reject(
                BATCH_SIZE_KEY,
                format!(
                    "preferred_max_bytes {} exceeds absolute_max_bytes {}",
                    batch_size.preferred_max_bytes, batch_size.absolute_max_bytes
                ),
            ));
        }
        self.pending.batch_size = batch_size;
        Ok(())
    }
}

impl ValueHandler for OrdererHandler {
    fn name(&self) -> &str {
        "orderer"
    }

    fn propose_config(&mut self, key: &str, proposal: Proposal<'_, ConfigValue>) -> Result<()> {
        let value = match proposal {
            Proposal::Set(value) => value,
            Proposal::Remove => {
                return match key {
                    CONSENSUS_TYPE_KEY if self.committed_consensus.is_some() => {
                        Err(self.reject(key, "consensus type cannot be removed once committed"))
                    }
                    CONSENSUS_TYPE_KEY => {
                        self.pending.consensus_type.clear();
                        Ok(())
                    }
                    BATCH_SIZE_KEY => {
                        self.pending.batch_size = BatchSize::default();
                        Ok(())
                    }
                    BATCH_TIMEOUT_KEY => {
                        self.pending.batch_timeout = Duration::ZERO;
                        Ok(())
                    }
                    KAFKA_BROKERS_KEY => {
                        self.pending.kafka_brokers.clear();
                        Ok(())
                    }
                    CHAIN_CREATION_POLICY_NAMES_KEY => {
                        self.pending.chain_creation_policy_names.clear();
                        Ok(())
                    }
                    INGRESS_POLICY_NAMES_KEY => {
                        self.pending.ingress_policy_names.clear();
                        Ok(())
                    }
                    EGRESS_POLICY_NAMES_KEY => {
                        self.pending.egress_policy_names.clear();
                        Ok(())
                    }
                    _ => Err(ConfigTxError::unknown_key(&self.path, key)),
                };
            }
        };

        match key {
            CONSENSUS_TYPE_KEY => {
                let payload: ConsensusTypeValue = decode(&self.path, key, value)?;
                self.set_consensus_type(payload.consensus_type)?;
            }
            BATCH_SIZE_KEY => {
                let payload: BatchSize = decode(&self.path, key, value)?;
                self.set_batch_size(payload)?;
            }
            BATCH_TIMEOUT_KEY => {
                let payload: BatchTimeoutValue = decode(&self.path, key, value)?;
                if payload.timeout_ms == 0 {
                    return Err(self.reject(key, "timeout_ms must be greater than 0"));
                }
                self.pending.batch_timeout = Duration::from_millis(payload.timeout_ms);
            }
            KAFKA_BROKERS_KEY => {
                let payload: KafkaBrokersValue = decode(&self.path, key, value)?;
                for broker in &payload.brokers {
                    validate_endpoint(broker).map_err(|reason| self.reject(key, reason))?;
                }
                self.pending.kafka_brokers = payload.brokers;
            }
            CHAIN_CREATION_POLICY_NAMES_KEY => {
                self.pending.chain_creation_policy_names = self.policy_names(key, value)?;
            }
            INGRESS_POLICY_NAMES_KEY => {
                self.pending.ingress_policy_names = self.policy_names(key, value)?;
            }
            EGRESS_POLICY_NAMES_KEY => {
                self.pending.egress_policy_names = self.policy_names(key, value)?;
            }
            _ => return Err(ConfigTxError::unknown_key(&self.path, key)),
        }
        Ok(())
    }

    fn propose_group_removal(&mut self) -> Result<()> {
        self.removed = true;
        Ok(())
    }

    fn commit_config(self: Box<Self>, resources: &mut ResourcesBuilder) {
        if self.removed {
            info!("Orderer config removed from channel");
            resources.set_orderer(None);
            return;
        }
        debug!(
            consensus = %self.pending.consensus_type,
            batch_timeout_ms = self.pending.batch_timeout.as_millis() as u64,
            "Orderer config staged"
        );
        resources.set_orderer(Some(self.pending));
    }
}

pub struct OrdererHandlerFactory;

impl HandlerFactory for OrdererHandlerFactory {
    fn name(&self) -> &'static str {
        "orderer"
    }

    fn begin_config(&self, path: &GroupPath, committed: &Resources) -> Result<Box<dyn ValueHandler>> {
        let committed = committed.orderer_config();
        Ok(Box::new(OrdererHandler {
            path: path.clone(),
            committed_consensus: committed
                .map(|orderer| orderer.consensus_type.clone())
                .filter(|consensus| !consensus.is_empty()),
            pending: committed.cloned().unwrap_or_default(),
            removed: false,
        }))
    }
}
