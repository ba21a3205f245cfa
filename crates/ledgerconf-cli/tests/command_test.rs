// Integration tests for the ledgerconf commands
// Writes genesis and envelope documents to a temp dir and runs validate, apply, and show over them

use std::path::{Path, PathBuf};

use ledgerconf_channel::{AnchorPeersValue, GenesisBuilder, OrgProfile, ValuePayload};
use ledgerconf_cli::command::{apply, show, validate};
use ledgerconf_cli::document::{self, GenesisDocument};
use ledgerconf_cli::model::Command;
use ledgerconf_cli::{Format, Report, execute};
use ledgerconf_common::{ANCHOR_PEERS_KEY, GroupPath};
use ledgerconf_configtx::{AnchorPeer, ConfigEnvelope};
use ledgerconf_policy::{MspConfig, SignedIdentity};
use tempfile::TempDir;

const CHAIN_ID: &str = "mychannel";

fn msp(msp_id: &str) -> MspConfig {
    MspConfig {
        msp_id: msp_id.to_string(),
        admins: vec!["admin".to_string()],
        members: vec!["peer0".to_string()],
    }
}

fn write_genesis(dir: &Path, name: &str) -> PathBuf {
    let tree = GenesisBuilder::new()
        .orderer_org(OrgProfile::new("OrdererOrg", msp("OrdererMSP")))
        .application_org(OrgProfile::new("Org1", msp("Org1MSP")))
        .build();
    let path = dir.join(name);
    document::write(
        &path,
        &GenesisDocument {
            chain_id: CHAIN_ID.to_string(),
            sequence: 0,
            tree,
        },
    )
    .unwrap();
    path
}

fn anchor_peers(base_sequence: u64, port: u32) -> ConfigEnvelope {
    let peers = AnchorPeersValue {
        anchor_peers: vec![AnchorPeer {
            host: "peer0.org1".to_string(),
            port,
        }],
    };
    let org1: GroupPath = "/Application/Org1".parse().unwrap();
    ConfigEnvelope::new(CHAIN_ID, base_sequence)
        .put_value(org1, ANCHOR_PEERS_KEY, peers.to_value().value)
        .signed_by(SignedIdentity::new("Org1MSP", "admin"))
}

fn write_envelope(dir: &Path, name: &str, envelope: &ConfigEnvelope) -> PathBuf {
    let path = dir.join(name);
    document::write(&path, envelope).unwrap();
    path
}

fn setup() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let genesis = write_genesis(dir.path(), "genesis.yaml");
    (dir, genesis)
}

#[test]
fn test_show_genesis() {
    let (_dir, genesis) = setup();
    let summary = show(&genesis).unwrap();
    assert_eq!(summary.chain_id, CHAIN_ID);
    assert_eq!(summary.sequence, 0);
    assert_eq!(summary.digest.len(), 64);
    assert_eq!(summary.msp_ids, vec!["OrdererMSP", "Org1MSP"]);
    assert_eq!(summary.orderer.unwrap().consensus_type, "solo");
}

#[test]
fn test_apply_in_order() {
    let (dir, genesis) = setup();
    let first = write_envelope(dir.path(), "01.json", &anchor_peers(0, 7051));
    let second = write_envelope(dir.path(), "02.yml", &anchor_peers(1, 8051));

    let summary = apply(&genesis, &[first, second]).unwrap();
    assert_eq!(summary.sequence, 2);
    let org1 = &summary.application.unwrap().organizations["Org1"];
    assert_eq!(org1.anchor_peers[0].port, 8051);
    assert_eq!(org1.msp_id, "Org1MSP");
}

#[test]
fn test_apply_stops_at_rejected_envelope() {
    let (dir, genesis) = setup();
    let good = write_envelope(dir.path(), "01.json", &anchor_peers(0, 7051));
    let stale = write_envelope(dir.path(), "02.json", &anchor_peers(0, 8051));

    let err = apply(&genesis, &[good, stale]).unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("02.json"), "{}", message);
    assert!(message.contains("stale sequence"), "{}", message);
}

#[test]
fn test_validate_reports_each_envelope() {
    let (dir, genesis) = setup();
    let good = write_envelope(dir.path(), "good.json", &anchor_peers(0, 7051));
    let unsigned = ConfigEnvelope {
        signers: Vec::new(),
        ..anchor_peers(0, 7051)
    };
    let denied = write_envelope(dir.path(), "denied.json", &unsigned);

    let report = validate(&genesis, &[good, denied]).unwrap();
    assert_eq!(report.sequence, 0);
    assert!(!report.all_valid());
    assert!(report.envelopes[0].valid);
    assert!(!report.envelopes[1].valid);
    assert!(report.envelopes[1].error.as_deref().unwrap().contains("authorization denied"));

    // Nothing was committed by validation
    assert_eq!(show(&genesis).unwrap().sequence, 0);
}

#[test]
fn test_execute_renders_report() {
    let (dir, genesis) = setup();
    let envelope = write_envelope(dir.path(), "update.json", &anchor_peers(0, 7051));

    let report = execute(&Command::Validate {
        genesis: genesis.clone(),
        envelopes: vec![envelope],
    })
    .unwrap();
    assert!(report.success());
    assert!(matches!(report, Report::Validation(_)));

    let rendered = report.render(Format::Json).unwrap();
    let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
    assert_eq!(value["envelopes"][0]["valid"], true);
    assert!(value["envelopes"][0].get("error").is_none());

    let shown = execute(&Command::Show { genesis }).unwrap();
    assert!(shown.render(Format::Yaml).unwrap().contains("chain_id: mychannel"));
}

#[test]
fn test_rejected_genesis() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("genesis.json");
    std::fs::write(&path, r#"{"chain_id":"mychannel","tree":{"mod_policy":"Admins"}}"#).unwrap();

    let err = show(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("rejected"));
}
