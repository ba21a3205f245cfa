//! Entry point of the `ledgerconf` binary.

use std::process::ExitCode;

use clap::Parser;
use ledgerconf_cli::model::{Cli, Configuration};
use ledgerconf_cli::startup::{LoggingConfig, init_logging};
use ledgerconf_cli::{execute, metrics};
use tracing::error;

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let configuration = Configuration::new(&cli)?;
    let _logging_guard = init_logging(&LoggingConfig::from_configuration(&configuration))?;
    metrics::init_metrics();

    let report = match execute(&cli.command) {
        Ok(report) => report,
        Err(e) => {
            error!("{:#}", e);
            return Err(e);
        }
    };
    println!("{}", report.render(configuration.output_format())?);

    Ok(if report.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
