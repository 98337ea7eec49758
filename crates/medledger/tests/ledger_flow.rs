//! End-to-end ledger behavior over the in-memory store.

use anyhow::Result;
use proptest::prelude::*;

use medledger::{
    AppendError, BreakKind, ChainBreak, LedgerConfig, Role, UnauthorizedReason, ValidatorStatus,
    VerifyOutcome, VerifyRange,
};
use medledger_testkit::{payload_ref, TestFixture, START_MILLIS};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn breaks(outcome: VerifyOutcome) -> Vec<ChainBreak> {
    match outcome {
        VerifyOutcome::Valid => Vec::new(),
        VerifyOutcome::Invalid { breaks, .. } => breaks,
    }
}

#[tokio::test]
async fn test_append_revoke_verify_scenario() -> Result<()> {
    init_tracing();
    let mut fx = TestFixture::new().await;
    let v1 = fx.provision("validator_001", Role::Clinician).await;

    let block0 = fx.append("rec-1", &v1).await;
    assert_eq!(block0.index(), 0);
    assert!(block0.previous_hash().is_sentinel());

    let block1 = fx.append("rec-2", &v1).await;
    assert_eq!(block1.index(), 1);
    assert_eq!(block1.previous_hash(), &block0.hash);

    // Revoked in the same millisecond block1 was stamped.
    fx.ledger
        .set_validator_status(&v1, ValidatorStatus::Revoked)
        .await?;

    let err = fx
        .ledger
        .request_append(&payload_ref("rec-3"), &v1)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppendError::Unauthorized(UnauthorizedReason::Revoked)
    ));

    // Blocks created while the validator was active stay valid.
    let report = fx.ledger.request_verify(None).await?;
    assert_eq!(report.outcome, VerifyOutcome::Valid);
    assert_eq!(report.checked, 2);
    assert_eq!(fx.ledger.blocks(0, 10).await?, vec![block0, block1]);
    Ok(())
}

#[tokio::test]
async fn test_reactivation_restores_append() -> Result<()> {
    init_tracing();
    let mut fx = TestFixture::new().await;
    let v1 = fx.provision("validator_001", Role::Clinician).await;
    fx.append("rec-1", &v1).await;

    fx.tick(5);
    fx.ledger
        .set_validator_status(&v1, ValidatorStatus::Revoked)
        .await?;
    fx.tick(5);
    fx.ledger
        .set_validator_status(&v1, ValidatorStatus::Active)
        .await?;

    let block = fx.append("rec-2", &v1).await;
    assert_eq!(block.index(), 1);
    assert!(fx.ledger.request_verify(None).await?.is_valid());
    Ok(())
}

#[tokio::test]
async fn test_roles_without_append_capability_rejected() -> Result<()> {
    let mut fx = TestFixture::new().await;
    let auditor = fx.provision("auditor_1", Role::Auditor).await;
    let admin = fx.provision("admin_1", Role::Administrator).await;

    let err = fx
        .ledger
        .request_append(&payload_ref("rec-1"), &auditor)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppendError::Unauthorized(UnauthorizedReason::MissingCapability)
    ));

    fx.append("rec-1", &admin).await;
    assert_eq!(fx.ledger.tail().await?.map(|b| b.index()), Some(0));
    Ok(())
}

#[tokio::test]
async fn test_bit_flip_reported_at_index() -> Result<()> {
    init_tracing();
    let mut fx = TestFixture::new().await;
    let v1 = fx.provision("validator_001", Role::Clinician).await;
    for i in 0..4 {
        fx.append(&format!("rec-{}", i), &v1).await;
    }

    fx.store.tamper(2, |b| b.signature.0[10] ^= 0x01)?;

    let outcome = fx.ledger.request_verify(None).await?.outcome;
    assert_eq!(outcome.first_bad_index(), Some(2));
    assert_eq!(breaks(outcome)[0].kind, BreakKind::HashMismatch);
    Ok(())
}

#[tokio::test]
async fn test_collect_all_breaks() -> Result<()> {
    let config = LedgerConfig {
        collect_all_breaks: true,
        ..LedgerConfig::default()
    };
    let mut fx = TestFixture::with_config(config).await;
    let v1 = fx.provision("validator_001", Role::Clinician).await;
    for i in 0..5 {
        fx.append(&format!("rec-{}", i), &v1).await;
    }

    fx.store.tamper(1, |b| b.header.timestamp += 7)?;
    fx.store.tamper(3, |b| b.hash.0[0] ^= 0x80)?;

    let outcome = fx.ledger.request_verify(None).await?.outcome;
    assert_eq!(outcome.first_bad_index(), Some(1));

    let found: Vec<(u64, BreakKind)> = breaks(outcome).iter().map(|b| (b.index, b.kind)).collect();
    assert!(found.contains(&(1, BreakKind::HashMismatch)));
    // Block 3's own fields are intact, so block 4 still links to its recomputed hash.
    assert!(found.contains(&(3, BreakKind::HashMismatch)));
    assert!(!found.iter().any(|(i, _)| *i == 4));
    Ok(())
}

#[tokio::test]
async fn test_suffix_verification_from_checkpoint() -> Result<()> {
    let mut fx = TestFixture::new().await;
    let v1 = fx.provision("validator_001", Role::Clinician).await;
    for i in 0..3 {
        fx.append(&format!("rec-{}", i), &v1).await;
    }

    let first = fx.ledger.request_verify(None).await?;
    let (index, hash) = first.checkpoint.expect("valid run yields a checkpoint");
    assert_eq!(index, 2);

    for i in 3..6 {
        fx.append(&format!("rec-{}", i), &v1).await;
    }

    let report = fx
        .ledger
        .request_verify(Some(VerifyRange::after_checkpoint(index, hash)))
        .await?;
    assert!(report.is_valid());
    assert_eq!(report.from, 3);
    assert_eq!(report.checked, 3);

    // A checkpoint that does not match the stored predecessor breaks the link.
    let mut wrong = hash;
    wrong.0[31] ^= 0xff;
    let report = fx
        .ledger
        .request_verify(Some(VerifyRange::after_checkpoint(index, wrong)))
        .await?;
    assert_eq!(report.outcome.first_bad_index(), Some(3));
    assert_eq!(breaks(report.outcome)[0].kind, BreakKind::BrokenLink);
    Ok(())
}

#[tokio::test]
async fn test_incremental_verify_with_no_new_blocks() -> Result<()> {
    let mut fx = TestFixture::new().await;
    let v1 = fx.provision("validator_001", Role::Clinician).await;
    fx.append("rec-1", &v1).await;
    fx.append("rec-2", &v1).await;

    let (index, hash) = fx
        .ledger
        .request_verify(None)
        .await?
        .checkpoint
        .expect("valid run yields a checkpoint");

    let idle = fx
        .ledger
        .request_verify(Some(VerifyRange::after_checkpoint(index, hash)))
        .await?;
    assert_eq!(idle.outcome, VerifyOutcome::Valid);
    assert_eq!(idle.checked, 0);
    assert_eq!(idle.checkpoint, Some((index, hash)));

    // The carried checkpoint picks up the next block.
    let block = fx.append("rec-3", &v1).await;
    let (index, hash) = idle.checkpoint.expect("carried checkpoint");
    let report = fx
        .ledger
        .request_verify(Some(VerifyRange::after_checkpoint(index, hash)))
        .await?;
    assert!(report.is_valid());
    assert_eq!(report.checked, 1);
    assert_eq!(report.checkpoint, Some((2, block.hash)));
    Ok(())
}

#[tokio::test]
async fn test_expected_genesis_hash_pinned() -> Result<()> {
    let mut fx = TestFixture::new().await;
    let v1 = fx.provision("validator_001", Role::Clinician).await;
    let genesis = fx.append("rec-1", &v1).await;

    let pinned = LedgerConfig {
        expected_genesis_hash: Some(genesis.hash.to_hex()),
        ..LedgerConfig::default()
    };
    let other = LedgerConfig {
        expected_genesis_hash: Some("11".repeat(32)),
        ..LedgerConfig::default()
    };

    let ok = medledger::Ledger::open(fx.store.clone(), pinned).await?;
    assert!(ok.request_verify(None).await?.is_valid());

    let bad = medledger::Ledger::open(fx.store.clone(), other).await?;
    let outcome = bad.request_verify(None).await?.outcome;
    assert_eq!(breaks(outcome)[0].kind, BreakKind::GenesisViolation);
    Ok(())
}

#[tokio::test]
async fn test_block_timestamps_follow_clock() -> Result<()> {
    let mut fx = TestFixture::new().await;
    let v1 = fx.provision("validator_001", Role::Clinician).await;
    fx.tick(999);
    let block = fx.append("rec-1", &v1).await;
    assert_eq!(block.timestamp(), START_MILLIS + 1000);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn any_single_bit_flip_is_located(target in 0usize..6, field in 0usize..5, bit in 0usize..256) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let first_bad = rt.block_on(async move {
            let mut fx = TestFixture::new().await;
            let v1 = fx.provision("validator_001", Role::Clinician).await;
            for i in 0..6 {
                fx.append(&format!("rec-{}", i), &v1).await;
            }

            fx.store
                .tamper(target as u64, |b| flip(b, field, bit))
                .unwrap();
            fx.ledger.request_verify(None).await.unwrap().outcome.first_bad_index()
        });
        prop_assert_eq!(first_bad, Some(target as u64));
    }
}

fn flip(block: &mut medledger::Block, field: usize, bit: usize) {
    match field {
        0 => block.header.timestamp ^= 1 << (bit % 63),
        1 => block.header.previous_hash.0[(bit / 8) % 32] ^= 1 << (bit % 8),
        2 => {
            let mut bytes = block.header.payload_ref.as_str().as_bytes().to_vec();
            let i = (bit / 8) % bytes.len();
            bytes[i] ^= 1 << (bit % 7);
            block.header.payload_ref =
                medledger::PayloadRef::from_stored(String::from_utf8_lossy(&bytes).into_owned());
        }
        3 => block.signature.0[(bit / 8) % 64] ^= 1 << (bit % 8),
        _ => block.hash.0[(bit / 8) % 32] ^= 1 << (bit % 8),
    }
}
