// Library module of the ledgerconf command line tool
// Loads genesis and envelope documents and drives a channel ConfigManager over them

// Module declarations
pub mod command; // validate, apply and show
pub mod document; // JSON and YAML documents
pub mod metrics; // Metric descriptions
pub mod model; // Command line arguments and settings
pub mod startup; // Logging bootstrap

pub use command::{ChannelSummary, EnvelopeReport, Report, ValidationReport, execute};
pub use document::{Format, GenesisDocument};
