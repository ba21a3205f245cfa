//! ledgerconf Channel Handlers
//!
//! Typed handlers for the groups of a standard channel:
//! - `/`: hashing algorithm, block data hashing width, orderer addresses
//! - `/Orderer`: consensus type, batching and Kafka brokers, policy names
//! - `/Orderer/*` and `/Application/*`: organization MSPs
//! - `/Application/*`: anchor peers
//!
//! `channel_initializer` wires them into a `RegistryInitializer` ready for
//! `ConfigManager::new`, and `GenesisBuilder` produces a matching genesis tree.

pub mod application;
pub mod channel;
pub mod genesis;
pub mod initializer;
pub mod msp;
pub mod orderer;
pub mod values;

pub use application::{ApplicationHandlerFactory, ApplicationOrgHandlerFactory};
pub use channel::{CHANNEL_KEYS, ChannelHandlerFactory};
pub use genesis::{GenesisBuilder, OrgProfile};
pub use initializer::{channel_initializer, channel_registry};
pub use msp::MspHandlerFactory;
pub use orderer::{ORDERER_KEYS, OrdererHandlerFactory};
pub use values::{
    AnchorPeersValue, BatchTimeoutValue, BlockDataHashingStructureValue, ConsensusTypeValue,
    HashingAlgorithmValue, KafkaBrokersValue, OrdererAddressesValue, PolicyNamesValue,
    ValuePayload, decode, validate_endpoint,
};
