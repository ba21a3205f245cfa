//! Participant contracts of a config transaction
//!
//! Every participant goes through `begin -> propose* -> commit | rollback`.
//! Commit and rollback consume the participant, so it is concluded at most
//! once by construction; the transaction guarantees it is concluded at least
//! once.

use std::collections::BTreeMap;

use ledgerconf_common::{ConfigTxError, GroupPath, Result};

use crate::resources::{Resources, ResourcesBuilder};
use crate::tree::{ConfigGroup, ConfigPolicy, ConfigValue};

/// A proposed change to one keyed element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proposal<'a, T> {
    Set(&'a T),
    Remove,
}

/// Interprets the values of one group for the duration of a transaction.
///
/// Proposals are staged on the handler and must have no visible effect until
/// `commit_config` publishes them into the next resource set.
pub trait ValueHandler: Send {
    /// Name used in logs
    fn name(&self) -> &str;

    fn propose_config(&mut self, key: &str, proposal: Proposal<'_, ConfigValue>) -> Result<()>;

    /// The group this handler was begun for is being deleted
    fn propose_group_removal(&mut self) -> Result<()> {
        Ok(())
    }

    fn commit_config(self: Box<Self>, resources: &mut ResourcesBuilder);

    fn rollback_config(self: Box<Self>) {}
}

/// Begins value handlers for the groups matching a registered path pattern
pub trait HandlerFactory: Send + Sync {
    fn name(&self) -> &'static str;

    fn begin_config(&self, path: &GroupPath, committed: &Resources) -> Result<Box<dyn ValueHandler>>;
}

/// Validates policy edits and stages the next policy manager
pub trait PolicyHandler: Send {
    fn propose_policy(
        &mut self,
        path: &GroupPath,
        key: &str,
        proposal: Proposal<'_, ConfigPolicy>,
    ) -> Result<()>;

    /// Called once every proposal has been accepted. `surviving` lists the
    /// groups whose mod policy must still be satisfiable in `candidate`.
    fn finalize(&mut self, candidate: &ConfigGroup, surviving: &[GroupPath]) -> Result<()>;

    fn commit_config(self: Box<Self>, resources: &mut ResourcesBuilder);

    fn rollback_config(self: Box<Self>) {}
}

/// The value handlers begun for one group, with the keys each one owns
pub struct HandlerSet {
    path: GroupPath,
    handlers: Vec<Box<dyn ValueHandler>>,
    keys: BTreeMap<String, usize>,
}

impl HandlerSet {
    pub fn new(path: GroupPath) -> Self {
        Self {
            path,
            handlers: Vec::new(),
            keys: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &GroupPath {
        &self.path
    }

    /// Add a handler owning `keys`. A key already owned by an earlier handler
    /// in this set stays with that handler.
    pub fn add<I, S>(&mut self, keys: I, handler: Box<dyn ValueHandler>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let index = self.handlers.len();
        for key in keys {
            self.keys.entry(key.into()).or_insert(index);
        }
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn handler_for(&mut self, key: &str) -> Result<&mut dyn ValueHandler> {
        let index = *self
            .keys
            .get(key)
            .ok_or_else(|| ConfigTxError::unknown_key(&self.path, key))?;
        Ok(self.handlers[index].as_mut())
    }

    pub fn handlers_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn ValueHandler>> {
        self.handlers.iter_mut()
    }

    pub fn into_handlers(self) -> Vec<Box<dyn ValueHandler>> {
        self.handlers
    }

    /// Roll back every handler in the set
    pub fn rollback(self) {
        for handler in self.handlers {
            handler.rollback_config();
        }
    }
}

/// Supplies the participants of a transaction
pub trait Initializer: Send + Sync {
    /// Begin the value handlers of a touched group
    fn begin_config(&self, path: &GroupPath, committed: &Resources) -> Result<HandlerSet>;

    /// Begin the policy handler, which joins every transaction
    fn begin_policy(&self, committed: &Resources) -> Result<Box<dyn PolicyHandler>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl ValueHandler for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn propose_config(&mut self, _key: &str, _proposal: Proposal<'_, ConfigValue>) -> Result<()> {
            Ok(())
        }

        fn commit_config(self: Box<Self>, _resources: &mut ResourcesBuilder) {}
    }

    #[test]
    fn test_handler_set_key_routing() {
        let path: GroupPath = "/Orderer".parse().unwrap();
        let mut set = HandlerSet::new(path);
        set.add(["BatchSize", "BatchTimeout"], Box::new(Named("orderer")));
        set.add(["BatchSize", "MSP"], Box::new(Named("msp")));
        assert_eq!(set.len(), 2);

        assert_eq!(set.handler_for("BatchSize").unwrap().name(), "orderer");
        assert_eq!(set.handler_for("MSP").unwrap().name(), "msp");
        let err = set.handler_for("Bogus").err().unwrap();
        assert!(matches!(err, ConfigTxError::UnknownKey { .. }));
    }
}
