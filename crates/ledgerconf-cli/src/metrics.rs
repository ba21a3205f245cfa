// Metric descriptions for the config transaction protocol
// ConfigManager records the values; the binary only describes them

use metrics::{counter, describe_counter, describe_gauge};

/// Initialize all metric descriptions
/// Should be called once at application startup
pub fn init_metrics() {
    describe_counter!(
        "configtx_apply_total",
        "Total number of config updates applied, by outcome"
    );
    describe_counter!(
        "configtx_validate_total",
        "Total number of config updates validated, by outcome"
    );
    describe_gauge!("configtx_sequence", "Committed config sequence per channel");
    describe_counter!(
        "ledgerconf_envelopes_total",
        "Total number of envelope files processed, by command"
    );

    tracing::debug!("Metrics initialized");
}

/// Record one envelope file handled by a command
pub fn record_envelope(command: &'static str) {
    counter!("ledgerconf_envelopes_total", "command" => command).increment(1);
}
