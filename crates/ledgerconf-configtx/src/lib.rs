//! ledgerconf Config Transactions
//!
//! This crate provides the transactional update protocol of a channel
//! configuration:
//! - `ConfigGroup` tree with structural sharing between versions
//! - `ConfigEnvelope` mutations, normalized into a canonical order
//! - Candidate construction with versioning (`merge`) and structural `diff`
//! - Handler contracts (`ValueHandler`, `PolicyHandler`, `Initializer`) and
//!   the `HandlerRegistry` routing keys to handlers
//! - `ConfigManager`: validate and apply updates as all-or-nothing
//!   transactions, publishing typed `Resources`

pub mod diff;
pub mod envelope;
pub mod handler;
pub mod manager;
pub mod policy_handler;
pub mod registry;
pub mod resources;
pub mod transaction;
pub mod tree;

pub use diff::{Change, ConfigDiff, GroupDiff, GroupStatus, diff, merge};
pub use envelope::{ConfigEnvelope, Mutation, MutationOp, MutationSet};
pub use handler::{HandlerFactory, HandlerSet, Initializer, PolicyHandler, Proposal, ValueHandler};
pub use manager::{CommittedConfig, ConfigManager, ConfigReader};
pub use policy_handler::{MembershipSource, MspValueMembership, TreePolicyHandler, policy_manager_from_tree};
pub use registry::{HandlerRegistry, HandlerToken, PathPattern, RegistryInitializer};
pub use resources::{
    AnchorPeer, ApplicationConfig, ApplicationOrgConfig, BatchSize, ChannelConfig, HashingAlgorithm,
    OrdererConfig, Resources, ResourcesBuilder,
};
pub use transaction::{Transaction, TxState};
pub use tree::{ConfigGroup, ConfigPolicy, ConfigValue};
