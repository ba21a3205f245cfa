//! Two-phase transaction over the handlers touched by one update

use std::collections::BTreeMap;

use ledgerconf_common::{ConfigTxError, GroupPath, Result};
use tracing::{debug, warn};

use crate::diff::{ConfigDiff, GroupStatus};
use crate::handler::{HandlerSet, Initializer, PolicyHandler, Proposal};
use crate::resources::{Resources, ResourcesBuilder};
use crate::tree::ConfigGroup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Begun,
    Proposed,
    Committed,
    RolledBack,
}

/// Participants of one update, concluded in the order they were begun.
///
/// Dropping a transaction that was neither committed nor rolled back rolls
/// it back, so every begun participant is concluded exactly once on every
/// exit path.
pub struct Transaction {
    state: TxState,
    groups: Vec<HandlerSet>,
    index: BTreeMap<GroupPath, usize>,
    policy: Option<Box<dyn PolicyHandler>>,
}

impl Transaction {
    /// Begin the handlers of every touched group, then the policy handler.
    ///
    /// If any participant fails to begin, the ones already begun are rolled
    /// back before the error is returned.
    pub fn begin(
        initializer: &dyn Initializer,
        paths: &[GroupPath],
        committed: &Resources,
    ) -> Result<Self> {
        let mut tx = Transaction {
            state: TxState::Begun,
            groups: Vec::with_capacity(paths.len()),
            index: BTreeMap::new(),
            policy: None,
        };
        for path in paths {
            let set = initializer.begin_config(path, committed)?;
            tx.index.insert(path.clone(), tx.groups.len());
            tx.groups.push(set);
        }
        tx.policy = Some(initializer.begin_policy(committed)?);
        debug!(groups = tx.groups.len(), "Config transaction begun");
        Ok(tx)
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn participant_count(&self) -> usize {
        self.groups.iter().map(HandlerSet::len).sum::<usize>() + usize::from(self.policy.is_some())
    }

    /// Offer every change of `diff` to the participant owning it, then let
    /// the policy handler check the candidate as a whole
    pub fn propose(&mut self, diff: &ConfigDiff, candidate: &ConfigGroup, surviving: &[GroupPath]) -> Result<()> {
        for (path, group_diff) in diff.groups() {
            let position = *self.index.get(path).ok_or_else(|| ConfigTxError::HandlerInitFailure {
                path: path.clone(),
                reason: "group was not begun in this transaction".to_string(),
            })?;
            let set = &mut self.groups[position];

            if group_diff.status == GroupStatus::Removed {
                for handler in set.handlers_mut() {
                    handler.propose_group_removal()?;
                }
                continue;
            }
            for (key, change) in &group_diff.values {
                let proposal = match change.after() {
                    Some(value) => Proposal::Set(value),
                    None => Proposal::Remove,
                };
                set.handler_for(key)?.propose_config(key, proposal)?;
            }
        }

        let policy = self.policy_handler()?;
        for (path, group_diff) in diff.groups() {
            if group_diff.status == GroupStatus::Removed {
                continue;
            }
            for (key, change) in &group_diff.policies {
                let proposal = match change.after() {
                    Some(value) => Proposal::Set(value),
                    None => Proposal::Remove,
                };
                policy.propose_policy(path, key, proposal)?;
            }
        }
        policy.finalize(candidate, surviving)?;

        self.state = TxState::Proposed;
        Ok(())
    }

    fn policy_handler(&mut self) -> Result<&mut Box<dyn PolicyHandler>> {
        self.policy.as_mut().ok_or_else(|| ConfigTxError::HandlerInitFailure {
            path: GroupPath::root(),
            reason: "policy handler was not begun".to_string(),
        })
    }

    /// Publish every participant's staged state into the next resource set
    pub fn commit(mut self, resources: &mut ResourcesBuilder) {
        for set in std::mem::take(&mut self.groups) {
            for handler in set.into_handlers() {
                handler.commit_config(resources);
            }
        }
        if let Some(policy) = self.policy.take() {
            policy.commit_config(resources);
        }
        self.state = TxState::Committed;
    }

    /// Discard every participant's staged state
    pub fn rollback(mut self) {
        self.rollback_participants();
    }

    fn rollback_participants(&mut self) {
        for set in std::mem::take(&mut self.groups) {
            set.rollback();
        }
        if let Some(policy) = self.policy.take() {
            policy.rollback_config();
        }
        self.state = TxState::RolledBack;
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.groups.is_empty() || self.policy.is_some() {
            if self.state == TxState::Proposed {
                warn!("Proposed config transaction dropped without being concluded, rolling back");
            }
            self.rollback_participants();
        }
    }
}
