//! `MSP` value handler of organization groups

use ledgerconf_common::{ConfigTxError, GroupPath, MSP_KEY, Result};
use ledgerconf_configtx::{
    ConfigValue, HandlerFactory, Proposal, Resources, ResourcesBuilder, ValueHandler,
};
use ledgerconf_policy::MspConfig;
use tracing::info;

enum PendingMsp {
    Unchanged,
    Set(MspConfig),
    Removed,
}

pub struct MspHandler {
    path: GroupPath,
    pending: PendingMsp,
}

impl ValueHandler for MspHandler {
    fn name(&self) -> &str {
        "msp"
    }

    fn propose_config(&mut self, key: &str, proposal: Proposal<'_, ConfigValue>) -> Result<()> {
        if key != MSP_KEY {
            return Err(ConfigTxError::unknown_key(&self.path, key));
        }
        self.pending = match proposal {
            Proposal::Set(value) => PendingMsp::Set(
                MspConfig::decode(&value.value)
                    .map_err(|reason| ConfigTxError::rejected(&self.path, key, reason))?,
            ),
            Proposal::Remove => PendingMsp::Removed,
        };
        Ok(())
    }

    fn propose_group_removal(&mut self) -> Result<()> {
        self.pending = PendingMsp::Removed;
        Ok(())
    }

    fn commit_config(self: Box<Self>, resources: &mut ResourcesBuilder) {
        match self.pending {
            PendingMsp::Unchanged => {}
            PendingMsp::Set(config) => {
                info!(org = %self.path, msp_id = %config.msp_id, "MSP installed");
                resources.msp_manager_mut().upsert(self.path, &config);
            }
            PendingMsp::Removed => {
                if let Some(msp) = resources.msp_manager_mut().remove(&self.path) {
                    info!(org = %self.path, msp_id = msp.msp_id(), "MSP removed");
                }
            }
        }
    }
}

pub struct MspHandlerFactory;

impl HandlerFactory for MspHandlerFactory {
    fn name(&self) -> &'static str {
        "msp"
    }

    fn begin_config(&self, path: &GroupPath, _committed: &Resources) -> Result<Box<dyn ValueHandler>> {
        Ok(Box::new(MspHandler {
            path: path.clone(),
            pending: PendingMsp::Unchanged,
        }))
    }
}
