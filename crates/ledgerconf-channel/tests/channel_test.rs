// Integration tests for the standard channel handlers
// Drives ConfigManager with the channel initializer: anchor peers, orderer settings, and organization membership

use std::collections::BTreeSet;
use std::sync::Arc;

use ledgerconf_channel::{
    AnchorPeersValue, ConsensusTypeValue, GenesisBuilder, HashingAlgorithmValue, OrgProfile,
    ValuePayload, channel_initializer,
};
use ledgerconf_common::{
    ADMINS_POLICY, ANCHOR_PEERS_KEY, BATCH_SIZE_KEY, CONSENSUS_TYPE_KEY, ConfigTxError, GroupPath,
    HASHING_ALGORITHM_KEY, MSP_KEY,
};
use ledgerconf_configtx::{AnchorPeer, BatchSize, ConfigEnvelope, ConfigManager};
use ledgerconf_policy::{MspConfig, PolicyDefinition, Principal, SignedIdentity};
use proptest::prelude::*;

const CHAIN_ID: &str = "mychannel";
const GENESIS_SEQUENCE: u64 = 5;

fn path(p: &str) -> GroupPath {
    p.parse().unwrap()
}

fn msp(msp_id: &str, admins: &[&str], members: &[&str]) -> MspConfig {
    MspConfig {
        msp_id: msp_id.to_string(),
        admins: admins.iter().map(|s| s.to_string()).collect(),
        members: members.iter().map(|s| s.to_string()).collect(),
    }
}

fn org1_admin(n: usize) -> SignedIdentity {
    SignedIdentity::new("Org1MSP", format!("admin{}", n))
}

fn org2_admin() -> SignedIdentity {
    SignedIdentity::new("Org2MSP", "admin")
}

fn orderer_admin() -> SignedIdentity {
    SignedIdentity::new("OrdererMSP", "orderer-admin")
}

/// Org1 is administered by any 2 of its 3 admins
fn manager() -> ConfigManager {
    let org1_admins = (1..=3)
        .map(|n| Principal::identity("Org1MSP", format!("admin{}", n)))
        .collect();
    let genesis = GenesisBuilder::new()
        .orderer_addresses(vec!["orderer0:7050".to_string()])
        .orderer_org(OrgProfile::new(
            "OrdererOrg",
            msp("OrdererMSP", &["orderer-admin"], &["orderer0"]),
        ))
        .application_org(
            OrgProfile::new("Org1", msp("Org1MSP", &["admin1", "admin2", "admin3"], &["peer1"]))
                .with_policy("MAJORITY", PolicyDefinition::n_out_of(2, org1_admins))
                .with_mod_policy("MAJORITY"),
        )
        .application_org(OrgProfile::new("Org2", msp("Org2MSP", &["admin"], &["peer2"])))
        .build();
    ConfigManager::new(
        CHAIN_ID,
        genesis,
        GENESIS_SEQUENCE,
        Arc::new(channel_initializer().unwrap()),
    )
    .unwrap()
}

fn anchor_peer_update(base_sequence: u64, host: &str, port: u32) -> ConfigEnvelope {
    let peers = AnchorPeersValue {
        anchor_peers: vec![AnchorPeer {
            host: host.to_string(),
            port,
        }],
    };
    ConfigEnvelope::new(CHAIN_ID, base_sequence).put_value(
        path("/Application/Org1"),
        ANCHOR_PEERS_KEY,
        peers.to_value().value,
    )
}

fn org1_peers(manager: &ConfigManager) -> Vec<AnchorPeer> {
    manager.resources().application_config().unwrap().organizations()["Org1"]
        .anchor_peers
        .clone()
}

#[test]
fn test_genesis_resources() {
    let manager = manager();
    assert_eq!(manager.sequence(), GENESIS_SEQUENCE);

    let resources = manager.resources();
    assert_eq!(resources.channel_config().orderer_addresses(), ["orderer0:7050"]);
    assert_eq!(resources.orderer_config().unwrap().consensus_type, "solo");
    assert_eq!(resources.msp_manager().len(), 3);

    let application = resources.application_config().unwrap();
    assert_eq!(application.organizations().len(), 2);
    assert_eq!(application.organizations()["Org1"].msp_id, "Org1MSP");
    assert!(application.organizations()["Org1"].anchor_peers.is_empty());
}

#[test]
fn test_anchor_peer_update_with_majority_of_admins() {
    let mut manager = manager();
    let envelope = anchor_peer_update(GENESIS_SEQUENCE, "p1", 7051)
        .signed_by(org1_admin(1))
        .signed_by(org1_admin(3));

    let committed = manager.apply(envelope).unwrap();
    assert_eq!(committed.sequence(), 6);
    assert_eq!(
        org1_peers(&manager),
        vec![AnchorPeer {
            host: "p1".to_string(),
            port: 7051
        }]
    );
}

#[test]
fn test_anchor_peer_update_with_single_admin_denied() {
    let mut manager = manager();
    let envelope = anchor_peer_update(GENESIS_SEQUENCE, "p1", 7051).signed_by(org1_admin(2));

    let err = manager.apply(envelope).unwrap_err();
    assert!(
        matches!(&err, ConfigTxError::AuthorizationDenied { path, policy, .. }
            if *path == self::path("/Application/Org1") && policy == "MAJORITY"),
        "unexpected error: {}",
        err
    );
    assert_eq!(manager.sequence(), GENESIS_SEQUENCE);
    assert!(org1_peers(&manager).is_empty());
}

#[test]
fn test_invalid_anchor_peer_rejected() {
    let mut manager = manager();
    let envelope = anchor_peer_update(GENESIS_SEQUENCE, "p1", 0)
        .signed_by(org1_admin(1))
        .signed_by(org1_admin(2));

    let err = manager.apply(envelope).unwrap_err();
    assert!(matches!(err, ConfigTxError::ValidationRejected { .. }));
    assert_eq!(manager.sequence(), GENESIS_SEQUENCE);
}

#[test]
fn test_unknown_org_key_rejected() {
    let mut manager = manager();
    let envelope = ConfigEnvelope::new(CHAIN_ID, GENESIS_SEQUENCE)
        .put_value(path("/Application/Org1"), "Endorsement", &b"{}"[..])
        .signed_by(org1_admin(1))
        .signed_by(org1_admin(2));

    let err = manager.apply(envelope).unwrap_err();
    assert!(matches!(err, ConfigTxError::UnknownKey { key, .. } if key == "Endorsement"));
}

#[test]
fn test_consensus_type_is_immutable() {
    let mut manager = manager();
    let kafka = ConsensusTypeValue {
        consensus_type: "kafka".to_string(),
    };
    let envelope = ConfigEnvelope::new(CHAIN_ID, GENESIS_SEQUENCE)
        .put_value(path("/Orderer"), CONSENSUS_TYPE_KEY, kafka.to_value().value)
        .signed_by(orderer_admin());

    let err = manager.apply(envelope).unwrap_err();
    assert!(matches!(err, ConfigTxError::ValidationRejected { key, .. } if key == CONSENSUS_TYPE_KEY));
    assert_eq!(manager.resources().orderer_config().unwrap().consensus_type, "solo");
}

#[test]
fn test_batch_size_update() {
    let mut manager = manager();
    let batch_size = BatchSize {
        max_message_count: 500,
        absolute_max_bytes: 10 * 1024 * 1024,
        preferred_max_bytes: 2 * 1024 * 1024,
    };
    let envelope = ConfigEnvelope::new(CHAIN_ID, GENESIS_SEQUENCE)
        .put_value(path("/Orderer"), BATCH_SIZE_KEY, batch_size.to_value().value)
        .signed_by(orderer_admin());

    manager.apply(envelope).unwrap();
    assert_eq!(manager.resources().orderer_config().unwrap().batch_size, batch_size);
}

#[test]
fn test_hashing_algorithm_changes_digest() {
    let mut manager = manager();
    assert_eq!(manager.snapshot().digest().unwrap().len(), 64);

    let sha512 = HashingAlgorithmValue {
        name: "SHA512".to_string(),
    };
    let envelope = ConfigEnvelope::new(CHAIN_ID, GENESIS_SEQUENCE)
        .put_value(GroupPath::root(), HASHING_ALGORITHM_KEY, sha512.to_value().value)
        .signed_by(orderer_admin())
        .signed_by(org1_admin(1))
        .signed_by(org2_admin());

    let committed = manager.apply(envelope).unwrap();
    assert_eq!(committed.digest().unwrap().len(), 128);
}

fn add_org3(base_sequence: u64, msp_id: &str) -> ConfigEnvelope {
    let org3 = path("/Application/Org3");
    ConfigEnvelope::new(CHAIN_ID, base_sequence)
        .put_group(org3.clone(), ADMINS_POLICY)
        .put_value(org3.clone(), MSP_KEY, msp(msp_id, &["admin"], &[]).encode().unwrap())
        .put_policy(
            org3,
            ADMINS_POLICY,
            PolicyDefinition::n_out_of(1, vec![Principal::admin_of(msp_id)]),
        )
        .signed_by(org1_admin(1))
        .signed_by(org2_admin())
}

#[test]
fn test_duplicate_msp_id_rejected() {
    let mut manager = manager();
    let err = manager.apply(add_org3(GENESIS_SEQUENCE, "Org1MSP")).unwrap_err();
    assert!(matches!(err, ConfigTxError::ValidationRejected { key, .. } if key == MSP_KEY));
    assert_eq!(manager.resources().msp_manager().len(), 3);
}

#[test]
fn test_add_and_remove_org() {
    let mut manager = manager();
    manager.apply(add_org3(GENESIS_SEQUENCE, "Org3MSP")).unwrap();

    let resources = manager.resources();
    let org3 = &resources.application_config().unwrap().organizations()["Org3"];
    assert_eq!(org3.msp_id, "Org3MSP");
    assert!(resources.msp_manager().msp("Org3MSP").is_some());

    // Application now has three orgs; two of them still form a majority
    let envelope = ConfigEnvelope::new(CHAIN_ID, GENESIS_SEQUENCE + 1)
        .delete_group(path("/Application/Org3"))
        .signed_by(org1_admin(1))
        .signed_by(org2_admin());
    manager.apply(envelope).unwrap();

    let resources = manager.resources();
    assert!(!resources.application_config().unwrap().organizations().contains_key("Org3"));
    assert!(resources.msp_manager().msp("Org3MSP").is_none());
    assert_eq!(manager.sequence(), GENESIS_SEQUENCE + 2);
}

#[test]
fn test_remove_application_section() {
    let mut manager = manager();
    let envelope = ConfigEnvelope::new(CHAIN_ID, GENESIS_SEQUENCE)
        .delete_group(path("/Application"))
        .signed_by(orderer_admin())
        .signed_by(org1_admin(1))
        .signed_by(org2_admin());
    manager.apply(envelope).unwrap();

    let resources = manager.resources();
    assert!(resources.application_config().is_none());
    assert!(resources.msp_manager().msp("Org1MSP").is_none());
    assert_eq!(resources.msp_manager().len(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_sequence_advances_only_on_commit(
        rounds in prop::collection::vec(prop::collection::vec(1usize..=3, 0..4), 1..6)
    ) {
        let mut manager = manager();
        for (i, signers) in rounds.iter().enumerate() {
            let before = manager.sequence();
            let mut envelope = anchor_peer_update(before, "p1", 7000 + i as u32);
            for n in signers {
                envelope = envelope.signed_by(org1_admin(*n));
            }
            let distinct: BTreeSet<_> = signers.iter().collect();

            match manager.apply(envelope) {
                Ok(committed) => {
                    prop_assert!(distinct.len() >= 2);
                    prop_assert_eq!(committed.sequence(), before + 1);
                    prop_assert_eq!(org1_peers(&manager)[0].port, 7000 + i as u32);
                }
                Err(e) => {
                    prop_assert!(distinct.len() < 2, "unexpected error: {}", e);
                    prop_assert!(
                        matches!(e, ConfigTxError::AuthorizationDenied { .. }),
                        "unexpected error: {}",
                        e
                    );
                    prop_assert_eq!(manager.sequence(), before);
                }
            }
        }
    }
}
