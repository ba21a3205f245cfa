//! `validate`, `apply` and `show`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use ledgerconf_channel::channel_initializer;
use ledgerconf_configtx::{ApplicationConfig, ChannelConfig, ConfigManager, OrdererConfig};
use serde::Serialize;
use tracing::{info, warn};

use crate::document::{self, Format};
use crate::metrics::record_envelope;
use crate::model::Command;

/// Committed state of a channel as printed by `apply` and `show`
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSummary {
    pub chain_id: String,
    pub sequence: u64,
    pub digest: String,
    pub channel: ChannelConfig,
    pub orderer: Option<OrdererConfig>,
    pub application: Option<ApplicationConfig>,
    pub msp_ids: Vec<String>,
}

impl ChannelSummary {
    pub fn from_manager(manager: &ConfigManager) -> anyhow::Result<Self> {
        let committed = manager.snapshot();
        let resources = committed.resources();
        Ok(Self {
            chain_id: manager.chain_id().to_string(),
            sequence: committed.sequence(),
            digest: committed.digest().context("Failed to digest the committed tree")?,
            channel: resources.channel_config().clone(),
            orderer: resources.orderer_config().cloned(),
            application: resources.application_config().cloned(),
            msp_ids: resources.msp_manager().msp_ids().map(str::to_string).collect(),
        })
    }
}

/// Outcome of dry-running one envelope file
#[derive(Debug, Clone, Serialize)]
pub struct EnvelopeReport {
    pub file: PathBuf,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub chain_id: String,
    pub sequence: u64,
    pub envelopes: Vec<EnvelopeReport>,
}

impl ValidationReport {
    pub fn all_valid(&self) -> bool {
        self.envelopes.iter().all(|e| e.valid)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Report {
    Summary(ChannelSummary),
    Validation(ValidationReport),
}

impl Report {
    pub fn success(&self) -> bool {
        match self {
            Report::Summary(_) => true,
            Report::Validation(report) => report.all_valid(),
        }
    }

    pub fn render(&self, format: Format) -> anyhow::Result<String> {
        document::render(self, format)
    }
}

/// Bootstrap the standard channel handlers from a genesis file
pub fn bootstrap(genesis: &Path) -> anyhow::Result<ConfigManager> {
    let document = document::read_genesis(genesis)?;
    let initializer = channel_initializer().context("Failed to register channel handlers")?;
    ConfigManager::new(
        document.chain_id,
        document.tree,
        document.sequence,
        Arc::new(initializer),
    )
    .with_context(|| format!("Genesis config {} rejected", genesis.display()))
}

/// Dry-run every envelope against the genesis state. Envelopes are checked
/// independently of each other.
pub fn validate(genesis: &Path, envelopes: &[PathBuf]) -> anyhow::Result<ValidationReport> {
    let manager = bootstrap(genesis)?;
    let mut reports = Vec::with_capacity(envelopes.len());
    for path in envelopes {
        let envelope = document::read_envelope(path)?;
        record_envelope("validate");
        let report = match manager.validate(&envelope) {
            Ok(()) => EnvelopeReport {
                file: path.clone(),
                valid: true,
                code: None,
                error: None,
            },
            Err(e) => {
                warn!(file = %path.display(), "Envelope is invalid: {}", e);
                EnvelopeReport {
                    file: path.clone(),
                    valid: false,
                    code: Some(e.error_code().code),
                    error: Some(e.to_string()),
                }
            }
        };
        reports.push(report);
    }
    Ok(ValidationReport {
        chain_id: manager.chain_id().to_string(),
        sequence: manager.sequence(),
        envelopes: reports,
    })
}

/// Apply envelopes in order, stopping at the first rejected one
pub fn apply(genesis: &Path, envelopes: &[PathBuf]) -> anyhow::Result<ChannelSummary> {
    let mut manager = bootstrap(genesis)?;
    for path in envelopes {
        let envelope = document::read_envelope(path)?;
        record_envelope("apply");
        let committed = manager
            .apply(envelope)
            .with_context(|| format!("Envelope {} rejected", path.display()))?;
        info!(file = %path.display(), sequence = committed.sequence(), "Envelope applied");
    }
    ChannelSummary::from_manager(&manager)
}

pub fn show(genesis: &Path) -> anyhow::Result<ChannelSummary> {
    ChannelSummary::from_manager(&bootstrap(genesis)?)
}

pub fn execute(command: &Command) -> anyhow::Result<Report> {
    match command {
        Command::Validate { genesis, envelopes } => validate(genesis, envelopes).map(Report::Validation),
        Command::Apply { genesis, envelopes } => apply(genesis, envelopes).map(Report::Summary),
        Command::Show { genesis } => show(genesis).map(Report::Summary),
    }
}
