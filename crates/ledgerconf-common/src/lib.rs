//! ledgerconf Common - Shared types, error codes, and constants
//!
//! This crate provides the foundational types used across all ledgerconf components:
//! - `ConfigTxError` and structured error codes
//! - `GroupPath`, the address of a group inside a channel configuration tree
//! - Well-known group names and value keys of the channel topology

pub mod error;
pub mod path;

// Re-exports for convenience
pub use error::{ConfigTxError, ErrorCode, Result};
pub use path::GroupPath;

/// Orderer group name, a direct child of the channel root
pub const ORDERER_GROUP: &str = "Orderer";

/// Application group name, a direct child of the channel root
pub const APPLICATION_GROUP: &str = "Application";

// Channel-level value keys

pub const HASHING_ALGORITHM_KEY: &str = "HashingAlgorithm";
pub const BLOCK_DATA_HASHING_STRUCTURE_KEY: &str = "BlockDataHashingStructure";
pub const ORDERER_ADDRESSES_KEY: &str = "OrdererAddresses";

// Orderer value keys

pub const CONSENSUS_TYPE_KEY: &str = "ConsensusType";
pub const BATCH_SIZE_KEY: &str = "BatchSize";
pub const BATCH_TIMEOUT_KEY: &str = "BatchTimeout";
pub const KAFKA_BROKERS_KEY: &str = "KafkaBrokers";
pub const CHAIN_CREATION_POLICY_NAMES_KEY: &str = "ChainCreationPolicyNames";
pub const INGRESS_POLICY_NAMES_KEY: &str = "IngressPolicyNames";
pub const EGRESS_POLICY_NAMES_KEY: &str = "EgressPolicyNames";

// Organization value keys

pub const MSP_KEY: &str = "MSP";
pub const ANCHOR_PEERS_KEY: &str = "AnchorPeers";

/// Well-known policy names
pub const ADMINS_POLICY: &str = "Admins";
pub const READERS_POLICY: &str = "Readers";
pub const WRITERS_POLICY: &str = "Writers";

/// Outcome labels shared by logs and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outcome {
    #[default]
    Committed,
    RolledBack,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Committed => "committed",
            Outcome::RolledBack => "rolled_back",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
