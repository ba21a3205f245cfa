//! Settings of the `ledgerconf` binary
//!
//! Layered, later sources winning: the optional settings file, then
//! `LEDGERCONF_` environment variables (`LEDGERCONF_LOG__LEVEL=debug`), then
//! command line flags.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::{Config, Environment, File};

use crate::document::Format;

pub const DEFAULT_CONFIG_FILE: &str = "conf/ledgerconf.yml";

pub const LOG_LEVEL_PROPERTY: &str = "log.level";
pub const LOG_DIR_PROPERTY: &str = "log.dir";
pub const LOG_CONSOLE_PROPERTY: &str = "log.console";
pub const LOG_FILE_PROPERTY: &str = "log.file";
pub const OUTPUT_FORMAT_PROPERTY: &str = "output.format";

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "ledgerconf", version, about = "Validate and apply channel configuration updates")]
pub struct Cli {
    /// Settings file; skipped if it does not exist
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: PathBuf,
    #[arg(long = "log-level")]
    pub log_level: Option<String>,
    #[arg(long = "log-dir")]
    pub log_dir: Option<String>,
    /// Also write logs to rolling files under the log directory
    #[arg(long = "file-logging")]
    pub file_logging: Option<bool>,
    /// Format of the printed report
    #[arg(short = 'o', long = "output", value_enum)]
    pub output: Option<Format>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Check envelopes against the genesis config without committing anything
    Validate {
        #[arg(short = 'g', long = "genesis")]
        genesis: PathBuf,
        #[arg(required = true)]
        envelopes: Vec<PathBuf>,
    },
    /// Apply envelopes in order and print the resulting channel config
    Apply {
        #[arg(short = 'g', long = "genesis")]
        genesis: PathBuf,
        #[arg(required = true)]
        envelopes: Vec<PathBuf>,
    },
    /// Print the channel config bootstrapped from a genesis file
    Show {
        #[arg(short = 'g', long = "genesis")]
        genesis: PathBuf,
    },
}

/// Settings resolved from every source
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn new(cli: &Cli) -> anyhow::Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::from(cli.config_file.as_path()).required(false))
            .add_source(
                Environment::with_prefix("LEDGERCONF")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(v) = &cli.log_level {
            builder = builder
                .set_override(LOG_LEVEL_PROPERTY, v.as_str())
                .context("Failed to set log level override")?;
        }
        if let Some(v) = &cli.log_dir {
            builder = builder
                .set_override(LOG_DIR_PROPERTY, v.as_str())
                .context("Failed to set log directory override")?;
        }
        if let Some(v) = cli.file_logging {
            builder = builder
                .set_override(LOG_FILE_PROPERTY, v)
                .context("Failed to set file logging override")?;
        }
        if let Some(v) = cli.output {
            builder = builder
                .set_override(OUTPUT_FORMAT_PROPERTY, v.name())
                .context("Failed to set output format override")?;
        }

        let config = builder
            .build()
            .with_context(|| format!("Failed to load settings from {}", cli.config_file.display()))?;
        Ok(Configuration { config })
    }

    pub fn log_level(&self) -> String {
        self.config
            .get_string(LOG_LEVEL_PROPERTY)
            .unwrap_or("info".to_string())
    }

    pub fn log_dir(&self) -> Option<String> {
        self.config.get_string(LOG_DIR_PROPERTY).ok()
    }

    pub fn console_logging(&self) -> bool {
        self.config.get_bool(LOG_CONSOLE_PROPERTY).unwrap_or(true)
    }

    pub fn file_logging(&self) -> bool {
        self.config.get_bool(LOG_FILE_PROPERTY).unwrap_or(false)
    }

    pub fn output_format(&self) -> Format {
        self.config
            .get_string(OUTPUT_FORMAT_PROPERTY)
            .ok()
            .and_then(|v| Format::parse(&v))
            .unwrap_or(Format::Json)
    }
}
