//! The ledger on disk: reopening, rehydration and the wire record.

use std::sync::Arc;

use anyhow::Result;
use tempfile::TempDir;

use medledger::core::{Block, Keypair, ManualClock, PayloadRef, Role, ValidatorId, ValidatorStatus};
use medledger::registry::Keyring;
use medledger::store::{BlockRecord, LedgerStore, SqliteStore};
use medledger::{AppendError, Ledger, LedgerConfig, UnauthorizedReason, VerifyRange};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

const START: i64 = 1_736_870_400_000;

async fn open(path: &std::path::Path, clock: Arc<ManualClock>) -> Result<Ledger<SqliteStore>> {
    let store = Arc::new(SqliteStore::open(path)?);
    Ok(Ledger::open_with(store, Arc::new(Keyring::new()), clock, LedgerConfig::default()).await?)
}

#[tokio::test]
async fn test_reopen_keeps_chain_and_validators() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let path = dir.path().join("ledger.db");
    let clock = Arc::new(ManualClock::new(START));
    let v1 = ValidatorId::new("validator_001")?;
    let keypair = Keypair::from_seed(&[1; 32]);

    let appended: Vec<Block> = {
        let ledger = open(&path, clock.clone()).await?;
        ledger
            .provision_validator(v1.clone(), Role::Clinician, keypair.clone())
            .await?;

        let mut blocks = Vec::new();
        for i in 0..3 {
            clock.advance(1);
            let committed = ledger
                .request_append(&PayloadRef::new(format!("rec-{}", i))?, &v1)
                .await?;
            blocks.push(committed.block);
        }

        clock.advance(1);
        ledger
            .set_validator_status(&v1, ValidatorStatus::Revoked)
            .await?;
        blocks
    };

    // Keys are not persisted; the reopened ledger still knows the validator.
    let ledger = open(&path, clock.clone()).await?;
    let validator = ledger.validator(&v1).expect("validator rehydrated");
    assert_eq!(validator.status, ValidatorStatus::Revoked);
    assert_eq!(validator.public_key, keypair.public_key());
    assert_eq!(ledger.validators()[0].history.len(), 2);

    assert_eq!(ledger.blocks(0, 2).await?, appended);
    let report = ledger.request_verify(None).await?;
    assert!(report.is_valid());
    assert_eq!(report.checked, 3);

    ledger.keyring().insert(v1.clone(), keypair);
    clock.advance(1);
    let err = ledger
        .request_append(&PayloadRef::new("rec-3")?, &v1)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppendError::Unauthorized(UnauthorizedReason::Revoked)
    ));
    Ok(())
}

#[tokio::test]
async fn test_registered_key_without_custody_cannot_append() -> Result<()> {
    let ledger = Ledger::open(SqliteStore::open_memory()?, LedgerConfig::default()).await?;
    let v1 = ValidatorId::new("external_signer")?;
    ledger
        .register_validator(v1.clone(), Keypair::from_seed(&[3; 32]).public_key(), Role::Clinician)
        .await?;

    let err = ledger
        .request_append(&PayloadRef::new("rec-1")?, &v1)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppendError::Unauthorized(UnauthorizedReason::NoCredential)
    ));
    assert!(ledger.tail().await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_suffix_verification_on_disk() -> Result<()> {
    let dir = TempDir::new()?;
    let clock = Arc::new(ManualClock::new(START));
    let ledger = open(&dir.path().join("ledger.db"), clock.clone()).await?;
    let v1 = ValidatorId::new("validator_001")?;
    ledger
        .provision_validator(v1.clone(), Role::Clinician, Keypair::from_seed(&[1; 32]))
        .await?;
    for i in 0..10 {
        clock.advance(1);
        ledger
            .request_append(&PayloadRef::new(format!("rec-{}", i))?, &v1)
            .await?;
    }

    let report = ledger
        .request_verify(Some(VerifyRange {
            from: 4,
            to: Some(7),
            checkpoint: None,
        }))
        .await?;
    assert!(report.is_valid());
    assert_eq!(report.checked, 4);
    assert_eq!(report.checkpoint.map(|(i, _)| i), Some(7));

    let idle = ledger.request_verify(Some(VerifyRange::from(10))).await?;
    assert!(idle.is_valid());
    assert_eq!(idle.checked, 0);
    assert_eq!(idle.checkpoint.map(|(i, _)| i), Some(9));

    let err = ledger
        .request_verify(Some(VerifyRange::from(11)))
        .await
        .unwrap_err();
    assert!(matches!(err, medledger::LedgerError::InvalidRange { .. }));
    Ok(())
}

#[tokio::test]
async fn test_wire_record_carries_a_verifiable_block() -> Result<()> {
    let store = SqliteStore::open_memory()?;
    let ledger = Ledger::open(store, LedgerConfig::default()).await?;
    let v1 = ValidatorId::new("validator_001")?;
    ledger
        .provision_validator(v1.clone(), Role::Clinician, Keypair::from_seed(&[1; 32]))
        .await?;
    let block = ledger
        .request_append(&PayloadRef::new("rec-1")?, &v1)
        .await?
        .block;

    let json = BlockRecord::from(&block).to_json()?;
    let value: serde_json::Value = serde_json::from_str(&json)?;
    assert_eq!(value["index"], 0);
    assert_eq!(value["previousHash"], "0".repeat(64));
    assert_eq!(value["hash"], block.hash.to_hex());

    let decoded = BlockRecord::from_json(&json)?.into_block()?;
    assert_eq!(decoded, block);
    medledger::core::verify_block(&decoded).map_err(|b| anyhow::anyhow!("{}", b))?;

    let stored = ledger.store().get_block(0).await?;
    assert_eq!(stored, Some(block));
    Ok(())
}
