//! Genesis and envelope documents on disk
//!
//! The format follows the file extension: `.yml` and `.yaml` are YAML,
//! anything else is JSON.

use std::path::Path;

use anyhow::Context;
use ledgerconf_configtx::{ConfigEnvelope, ConfigGroup};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Json,
    Yaml,
}

impl Format {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml") => Format::Yaml,
            _ => Format::Json,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "json" => Some(Format::Json),
            "yaml" | "yml" => Some(Format::Yaml),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Yaml => "yaml",
        }
    }
}

/// The tree a channel is bootstrapped from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisDocument {
    pub chain_id: String,
    #[serde(default)]
    pub sequence: u64,
    pub tree: ConfigGroup,
}

pub fn read<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    match Format::from_path(path) {
        Format::Json => {
            serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
        }
        Format::Yaml => {
            serde_yaml::from_str(&text).with_context(|| format!("Invalid YAML in {}", path.display()))
        }
    }
}

pub fn write<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let text = render(value, Format::from_path(path))?;
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

pub fn render<T: Serialize>(value: &T, format: Format) -> anyhow::Result<String> {
    match format {
        Format::Json => serde_json::to_string_pretty(value).context("Failed to encode JSON"),
        Format::Yaml => serde_yaml::to_string(value).context("Failed to encode YAML"),
    }
}

pub fn read_genesis(path: &Path) -> anyhow::Result<GenesisDocument> {
    read(path)
}

pub fn read_envelope(path: &Path) -> anyhow::Result<ConfigEnvelope> {
    read(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerconf_common::GroupPath;
    use ledgerconf_configtx::ConfigValue;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(Format::from_path(Path::new("genesis.yml")), Format::Yaml);
        assert_eq!(Format::from_path(Path::new("genesis.YAML")), Format::Yaml);
        assert_eq!(Format::from_path(Path::new("update.json")), Format::Json);
        assert_eq!(Format::from_path(Path::new("update")), Format::Json);
        assert_eq!(Format::parse("YML"), Some(Format::Yaml));
        assert_eq!(Format::parse("toml"), None);
    }

    #[test]
    fn test_envelope_in_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let envelope = ConfigEnvelope::new("mychannel", 3)
            .put_value("/Application/Org1".parse::<GroupPath>().unwrap(), "AnchorPeers", &b"{}"[..])
            .delete_group("/Application/Org2".parse().unwrap());

        for name in ["update.json", "update.yaml"] {
            let path = dir.path().join(name);
            write(&path, &envelope).unwrap();
            let decoded = read_envelope(&path).unwrap();
            assert_eq!(decoded, envelope);
        }
    }

    #[test]
    fn test_genesis_yaml_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genesis.yml");
        std::fs::write(
            &path,
            "chain_id: mychannel\ntree:\n  mod_policy: Admins\n  values:\n    Label:\n      value: aGVsbG8=\n",
        )
        .unwrap();

        let genesis = read_genesis(&path).unwrap();
        assert_eq!(genesis.sequence, 0);
        assert_eq!(
            genesis.tree.values["Label"],
            ConfigValue::new(&b"hello"[..])
        );
    }

    #[test]
    fn test_read_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = read_envelope(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("broken.json"));

        let missing = dir.path().join("missing.json");
        assert!(read_genesis(&missing).is_err());
    }
}
