//! Handler topology of a standard channel

use std::sync::Arc;

use ledgerconf_common::{ANCHOR_PEERS_KEY, MSP_KEY, Result};
use ledgerconf_configtx::{HandlerRegistry, MspValueMembership, RegistryInitializer};

use crate::application::{ApplicationHandlerFactory, ApplicationOrgHandlerFactory};
use crate::channel::{CHANNEL_KEYS, ChannelHandlerFactory};
use crate::msp::MspHandlerFactory;
use crate::orderer::{ORDERER_KEYS, OrdererHandlerFactory};

/// Register the channel, orderer and application handlers.
///
/// Organization groups begin their `MSP` handler first, so the membership is
/// in place before anything derived from it is committed.
pub fn channel_registry() -> Result<HandlerRegistry> {
    let mut registry = HandlerRegistry::new();
    registry.register("/", CHANNEL_KEYS, Arc::new(ChannelHandlerFactory))?;

    registry.register("/Orderer", ORDERER_KEYS, Arc::new(OrdererHandlerFactory))?;
    registry.register("/Orderer/*", &[MSP_KEY], Arc::new(MspHandlerFactory))?;

    registry.register("/Application", &[], Arc::new(ApplicationHandlerFactory))?;
    registry.register("/Application/*", &[MSP_KEY], Arc::new(MspHandlerFactory))?;
    registry.register(
        "/Application/*",
        &[ANCHOR_PEERS_KEY],
        Arc::new(ApplicationOrgHandlerFactory),
    )?;
    Ok(registry)
}

/// Initializer for a standard channel, with membership read from `MSP` values
pub fn channel_initializer() -> Result<RegistryInitializer> {
    Ok(RegistryInitializer::new(
        channel_registry()?,
        Arc::new(MspValueMembership),
    ))
}
