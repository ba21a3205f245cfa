//! `Application` group and application organization handlers

use ledgerconf_common::{ANCHOR_PEERS_KEY, ConfigTxError, GroupPath, Result};
use ledgerconf_configtx::{
    AnchorPeer, ApplicationOrgConfig, ConfigValue, HandlerFactory, Proposal, Resources,
    ResourcesBuilder, ValueHandler,
};
use tracing::{debug, info};

use crate::values::{AnchorPeersValue, decode};

/// Keeps the application config present for as long as the group exists
pub struct ApplicationHandler {
    path: GroupPath,
    removed: bool,
}

impl ValueHandler for ApplicationHandler {
    fn name(&self) -> &str {
        "application"
    }

    fn propose_config(&mut self, key: &str, _proposal: Proposal<'_, ConfigValue>) -> Result<()> {
        Err(ConfigTxError::unknown_key(&self.path, key))
    }

    fn propose_group_removal(&mut self) -> Result<()> {
        self.removed = true;
        Ok(())
    }

    fn commit_config(self: Box<Self>, resources: &mut ResourcesBuilder) {
        if self.removed {
            info!("Application config removed from channel");
            resources.clear_application();
        } else {
            resources.application_mut();
        }
    }
}

pub struct ApplicationHandlerFactory;

impl HandlerFactory for ApplicationHandlerFactory {
    fn name(&self) -> &'static str {
        "application"
    }

    fn begin_config(&self, path: &GroupPath, _committed: &Resources) -> Result<Box<dyn ValueHandler>> {
        Ok(Box::new(ApplicationHandler {
            path: path.clone(),
            removed: false,
        }))
    }
}

/// Anchor peers of one application organization
pub struct ApplicationOrgHandler {
    path: GroupPath,
    pending: ApplicationOrgConfig,
    removed: bool,
}

impl ApplicationOrgHandler {
    fn validate_peer(&self, peer: &AnchorPeer) -> Result<()> {
        if peer.host.trim().is_empty() {
            return Err(ConfigTxError::rejected(
                &self.path,
                ANCHOR_PEERS_KEY,
                "anchor peer host must not be empty",
            ));
        }
        if !(1..=65535).contains(&peer.port) {
            return Err(ConfigTxError::rejected(
                &self.path,
                ANCHOR_PEERS_KEY,
                format!("anchor peer port {} is out of range", peer.port),
            ));
        }
        Ok(())
    }
}

impl ValueHandler for ApplicationOrgHandler {
    fn name(&self) -> &str {
        "application-org"
    }

    fn propose_config(&mut self, key: &str, proposal: Proposal<'_, ConfigValue>) -> Result<()> {
        if key != ANCHOR_PEERS_KEY {
            return Err(ConfigTxError::unknown_key(&self.path, key));
        }
        match proposal {
            Proposal::Set(value) => {
                let payload: AnchorPeersValue = decode(&self.path, key, value)?;
                for peer in &payload.anchor_peers {
                    self.validate_peer(peer)?;
                }
                self.pending.anchor_peers = payload.anchor_peers;
            }
            Proposal::Remove => self.pending.anchor_peers.clear(),
        }
        Ok(())
    }

    fn propose_group_removal(&mut self) -> Result<()> {
        self.removed = true;
        Ok(())
    }

    fn commit_config(self: Box<Self>, resources: &mut ResourcesBuilder) {
        let name = self.pending.name.clone();
        if self.removed {
            // The whole application group may be going away with it
            if let Some(application) = resources.existing_application_mut() {
                application.organizations.remove(&name);
            }
            info!(org = %name, "Application organization removed");
            return;
        }
        debug!(org = %name, anchor_peers = self.pending.anchor_peers.len(), "Application organization staged");
        resources
            .application_mut()
            .organizations
            .insert(name, self.pending);
    }
}

pub struct ApplicationOrgHandlerFactory;

impl HandlerFactory for ApplicationOrgHandlerFactory {
    fn name(&self) -> &'static str {
        "application-org"
    }

    fn begin_config(&self, path: &GroupPath, committed: &Resources) -> Result<Box<dyn ValueHandler>> {
        let name = path.name().ok_or_else(|| ConfigTxError::HandlerInitFailure {
            path: path.clone(),
            reason: "an organization group needs a name".to_string(),
        })?;
        let pending = committed
            .application_config()
            .and_then(|application| application.organizations().get(name))
            .cloned()
            .unwrap_or_else(|| ApplicationOrgConfig::new(name));
        Ok(Box::new(ApplicationOrgHandler {
            path: path.clone(),
            pending,
            removed: false,
        }))
    }
}
