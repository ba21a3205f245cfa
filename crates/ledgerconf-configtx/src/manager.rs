//! Config transaction coordinator of one channel

use std::sync::Arc;

use ledgerconf_common::{ConfigTxError, GroupPath, Outcome, Result};
use metrics::{counter, gauge};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::diff::{ConfigDiff, diff, merge};
use crate::envelope::{ConfigEnvelope, MutationSet};
use crate::handler::Initializer;
use crate::resources::{Resources, ResourcesBuilder};
use crate::transaction::Transaction;
use crate::tree::ConfigGroup;

/// One committed configuration of a channel
#[derive(Debug)]
pub struct CommittedConfig {
    sequence: u64,
    tree: Arc<ConfigGroup>,
    resources: Arc<Resources>,
    envelope: Arc<ConfigEnvelope>,
}

impl CommittedConfig {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn tree(&self) -> &Arc<ConfigGroup> {
        &self.tree
    }

    pub fn resources(&self) -> &Arc<Resources> {
        &self.resources
    }

    /// The envelope that produced this configuration
    pub fn envelope(&self) -> &Arc<ConfigEnvelope> {
        &self.envelope
    }

    /// Hex digest of the tree under the channel's hashing algorithm
    pub fn digest(&self) -> Result<String> {
        let hasher = self.resources.channel_config().hashing_algorithm();
        self.tree
            .digest(hasher)
            .map_err(|e| ConfigTxError::InvalidEnvelope(format!("cannot encode config tree: {}", e)))
    }
}

/// Read-only handle on the committed configuration.
///
/// Readers always observe a complete committed configuration, never a
/// partially applied one.
#[derive(Clone)]
pub struct ConfigReader {
    current: Arc<RwLock<Arc<CommittedConfig>>>,
}

impl ConfigReader {
    pub fn snapshot(&self) -> Arc<CommittedConfig> {
        Arc::clone(&self.current.read())
    }

    pub fn sequence(&self) -> u64 {
        self.current.read().sequence
    }
}

type UpdateListener = Box<dyn Fn(&CommittedConfig) + Send + Sync>;

/// Everything steps 1 to 5 of an update produce, ready to commit
struct Prepared {
    tx: Transaction,
    candidate: Arc<ConfigGroup>,
    diff: ConfigDiff,
}

/// Owns the committed configuration of a channel and applies updates to it
/// as all-or-nothing transactions.
///
/// Only one update is in flight at a time: `apply` takes `&mut self`.
/// `validate` and the accessors take `&self` and may run concurrently with
/// readers obtained through [`ConfigManager::reader`].
pub struct ConfigManager {
    chain_id: String,
    initializer: Arc<dyn Initializer>,
    current: Arc<RwLock<Arc<CommittedConfig>>>,
    listeners: Vec<UpdateListener>,
}

impl ConfigManager {
    /// Bootstrap a channel from its genesis tree.
    ///
    /// The genesis tree runs through the same begin, propose and commit
    /// phases as any update, diffed against an empty tree. No signatures are
    /// checked for it.
    pub fn new(
        chain_id: impl Into<String>,
        genesis: ConfigGroup,
        sequence: u64,
        initializer: Arc<dyn Initializer>,
    ) -> Result<Self> {
        let chain_id = chain_id.into();
        if chain_id.is_empty() {
            return Err(ConfigTxError::InvalidEnvelope("chain id must not be empty".to_string()));
        }

        let empty = Arc::new(ConfigGroup::default());
        let candidate = Arc::new(genesis);
        let changes = diff(&empty, &candidate);
        let committed = Resources::default();

        let mut tx = Transaction::begin(initializer.as_ref(), &changes.touched_paths(), &committed)?;
        if let Err(e) = tx.propose(&changes, &candidate, &changes.surviving_paths()) {
            warn!(chain_id = %chain_id, "Genesis config rejected: {}", e);
            tx.rollback();
            return Err(e);
        }
        let mut builder = ResourcesBuilder::from_committed(&committed);
        tx.commit(&mut builder);

        let envelope = ConfigEnvelope::genesis(chain_id.clone(), sequence, &candidate);
        let config = CommittedConfig {
            sequence,
            tree: candidate,
            resources: Arc::new(builder.build()),
            envelope: Arc::new(envelope),
        };
        gauge!("configtx_sequence", "chain_id" => chain_id.clone()).set(sequence as f64);
        info!(
            chain_id = %chain_id,
            sequence,
            groups = changes.touched_paths().len(),
            "Channel config bootstrapped from genesis"
        );

        Ok(Self {
            chain_id,
            initializer,
            current: Arc::new(RwLock::new(Arc::new(config))),
            listeners: Vec::new(),
        })
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn sequence(&self) -> u64 {
        self.current.read().sequence
    }

    /// The envelope that produced the current configuration
    pub fn config_envelope(&self) -> Arc<ConfigEnvelope> {
        Arc::clone(&self.current.read().envelope)
    }

    pub fn snapshot(&self) -> Arc<CommittedConfig> {
        Arc::clone(&self.current.read())
    }

    pub fn resources(&self) -> Arc<Resources> {
        Arc::clone(&self.current.read().resources)
    }

    pub fn reader(&self) -> ConfigReader {
        ConfigReader {
            current: Arc::clone(&self.current),
        }
    }

    /// Register a callback run after every committed update
    pub fn on_update<F>(&mut self, listener: F)
    where
        F: Fn(&CommittedConfig) + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Check an envelope without changing anything. Every participant begun
    /// for it is rolled back.
    pub fn validate(&self, envelope: &ConfigEnvelope) -> Result<()> {
        let current = self.snapshot();
        let result = self.prepare(&current, envelope).map(|prepared| prepared.tx.rollback());
        let outcome = if result.is_ok() { "valid" } else { "invalid" };
        counter!("configtx_validate_total", "outcome" => outcome).increment(1);
        if let Err(e) = &result {
            debug!(chain_id = %self.chain_id, sequence = current.sequence, "Config update is invalid: {}", e);
        }
        result
    }

    /// Apply an envelope. On success the next configuration is committed
    /// with the sequence incremented by one; on failure nothing changes.
    pub fn apply(&mut self, envelope: ConfigEnvelope) -> Result<Arc<CommittedConfig>> {
        let current = self.snapshot();
        let prepared = match self.prepare(&current, &envelope) {
            Ok(prepared) => prepared,
            Err(e) => {
                counter!("configtx_apply_total", "outcome" => Outcome::RolledBack.as_str()).increment(1);
                warn!(
                    chain_id = %self.chain_id,
                    sequence = current.sequence,
                    retryable = e.is_retryable(),
                    "Config update rolled back: {}",
                    e
                );
                return Err(e);
            }
        };

        let Prepared { tx, candidate, diff } = prepared;
        let mut builder = ResourcesBuilder::from_committed(&current.resources);
        tx.commit(&mut builder);

        let next = Arc::new(CommittedConfig {
            sequence: current.sequence + 1,
            tree: candidate,
            resources: Arc::new(builder.build()),
            envelope: Arc::new(envelope),
        });
        *self.current.write() = Arc::clone(&next);

        counter!("configtx_apply_total", "outcome" => Outcome::Committed.as_str()).increment(1);
        gauge!("configtx_sequence", "chain_id" => self.chain_id.clone()).set(next.sequence as f64);
        info!(
            chain_id = %self.chain_id,
            sequence = next.sequence,
            groups = diff.touched_paths().len(),
            signers = next.envelope.signers.len(),
            "Config update committed"
        );

        for listener in &self.listeners {
            listener(&next);
        }
        Ok(next)
    }

    /// Steps 1 to 5: sequence check, candidate, begin, propose, authorize.
    /// On error every begun participant has been rolled back.
    fn prepare(&self, current: &CommittedConfig, envelope: &ConfigEnvelope) -> Result<Prepared> {
        if envelope.chain_id != self.chain_id {
            return Err(ConfigTxError::InvalidEnvelope(format!(
                "envelope is for channel '{}', not '{}'",
                envelope.chain_id, self.chain_id
            )));
        }
        if envelope.base_sequence != current.sequence {
            return Err(ConfigTxError::StaleSequence {
                expected: current.sequence,
                actual: envelope.base_sequence,
            });
        }

        let set = MutationSet::normalize(&envelope.mutations)?;
        let candidate = merge(&current.tree, &set)?;
        let changes = diff(&current.tree, &candidate);
        if changes.is_empty() {
            return Err(ConfigTxError::InvalidEnvelope(
                "update does not change the configuration".to_string(),
            ));
        }

        let mut tx = Transaction::begin(
            self.initializer.as_ref(),
            &changes.touched_paths(),
            &current.resources,
        )?;
        if let Err(e) = tx.propose(&changes, &candidate, &changes.surviving_paths()) {
            tx.rollback();
            return Err(e);
        }
        if let Err(e) = authorize(current, &changes.authorization_paths(), envelope) {
            tx.rollback();
            return Err(e);
        }

        Ok(Prepared {
            tx,
            candidate,
            diff: changes,
        })
    }
}

/// Every existing group an update touches must be approved by its committed
/// mod policy, evaluated against the committed policies and membership.
fn authorize(current: &CommittedConfig, paths: &[GroupPath], envelope: &ConfigEnvelope) -> Result<()> {
    let resources = &current.resources;
    for path in paths {
        let mod_policy = current
            .tree
            .group(path)
            .map(|g| g.mod_policy.as_str())
            .unwrap_or_default();
        if mod_policy.is_empty() {
            return Err(ConfigTxError::AuthorizationDenied {
                path: path.clone(),
                policy: String::new(),
                reason: "group has no mod policy".to_string(),
            });
        }
        resources
            .policy_manager()
            .evaluate(path, mod_policy, &envelope.signers, resources.msp_manager())
            .map_err(|e| ConfigTxError::AuthorizationDenied {
                path: path.clone(),
                policy: mod_policy.to_string(),
                reason: e.to_string(),
            })?;
    }
    Ok(())
}
