//! ledgerconf Policy - Membership and policy evaluation
//!
//! This crate provides:
//! - Membership service model (`MspConfig`, `MspManager`, `SignedIdentity`)
//! - Policy definitions (n-of-m signature, implicit meta, reference)
//! - `PolicyManager`: evaluation of a named policy against a signer set, and
//!   the satisfiability check used to refuse updates that would lock a group

pub mod manager;
pub mod msp;
pub mod policy;

pub use manager::{PolicyError, PolicyManager};
pub use msp::{Msp, MspConfig, MspManager, SignedIdentity};
pub use policy::{MetaRule, MspRole, PolicyDefinition, Principal};

/// Maximum chain of policy references followed before giving up
pub const MAX_REFERENCE_DEPTH: usize = 16;
