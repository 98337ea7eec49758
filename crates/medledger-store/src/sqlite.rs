//! SQLite implementation of the store traits.
//!
//! This is the primary storage backend for MedLedger. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use medledger_core::{
    Block, BlockHash, BlockHeader, Ed25519PublicKey, Ed25519Signature, PayloadRef, Role,
    StatusChange, ValidatorId, ValidatorRecord, ValidatorStatus,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{CommitResult, LedgerStore, TailToken, ValidatorStore};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime. Commits run in an `IMMEDIATE`
/// transaction so the length check and the insert are atomic even when
/// several processes share the database file.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` on the connection from the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("spawn_blocking failed: {}", e)))?
    }
}

const BLOCK_COLUMNS: &str =
    "idx, timestamp, previous_hash, payload_ref, validator_id, signature, hash";

/// A block row as stored, before conversion.
struct BlockRow {
    idx: i64,
    timestamp: i64,
    previous_hash: Vec<u8>,
    payload_ref: String,
    validator_id: String,
    signature: Vec<u8>,
    hash: Vec<u8>,
}

impl BlockRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            idx: row.get("idx")?,
            timestamp: row.get("timestamp")?,
            previous_hash: row.get("previous_hash")?,
            payload_ref: row.get("payload_ref")?,
            validator_id: row.get("validator_id")?,
            signature: row.get("signature")?,
            hash: row.get("hash")?,
        })
    }

    fn into_block(self) -> Result<Block> {
        let index = u64::try_from(self.idx)
            .map_err(|_| StoreError::InvalidData(format!("negative block index {}", self.idx)))?;
        let previous_hash = BlockHash::try_from(self.previous_hash.as_slice()).map_err(|_| {
            StoreError::InvalidData(format!("previous_hash of block {} is not 32 bytes", index))
        })?;
        let hash = BlockHash::try_from(self.hash.as_slice())
            .map_err(|_| StoreError::InvalidData(format!("hash of block {} is not 32 bytes", index)))?;
        let signature = Ed25519Signature::from_slice(&self.signature)
            .map_err(|e| StoreError::InvalidData(format!("block {}: {}", index, e)))?;

        Ok(Block {
            header: BlockHeader {
                index,
                timestamp: self.timestamp,
                previous_hash,
                payload_ref: PayloadRef::from_stored(self.payload_ref),
                validator_id: ValidatorId::from_stored(self.validator_id),
            },
            signature,
            hash,
        })
    }
}

fn to_sql_index(index: u64) -> Result<i64> {
    i64::try_from(index)
        .map_err(|_| StoreError::InvalidData(format!("index {} exceeds storage range", index)))
}

fn chain_len(conn: &Connection) -> Result<u64> {
    let len: i64 = conn.query_row("SELECT COALESCE(MAX(idx) + 1, 0) FROM blocks", [], |row| {
        row.get(0)
    })?;
    Ok(len as u64)
}

fn parse_status(s: &str) -> Result<ValidatorStatus> {
    s.parse()
        .map_err(|e: medledger_core::CoreError| StoreError::InvalidData(e.to_string()))
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn get_tail(&self) -> Result<(Option<Block>, TailToken)> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {} FROM blocks ORDER BY idx DESC LIMIT 1", BLOCK_COLUMNS),
                    [],
                    BlockRow::from_row,
                )
                .optional()?;

            match row {
                Some(row) => {
                    let block = row.into_block()?;
                    let token = TailToken(block.index() + 1);
                    Ok((Some(block), token))
                }
                None => Ok((None, TailToken::EMPTY)),
            }
        })
        .await
    }

    async fn get_range(&self, from: u64, to: u64) -> Result<Vec<Block>> {
        if from > to || from > i64::MAX as u64 {
            return Ok(Vec::new());
        }
        let from = from as i64;
        let to = to.min(i64::MAX as u64) as i64;

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM blocks WHERE idx >= ?1 AND idx <= ?2 ORDER BY idx",
                BLOCK_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![from, to], BlockRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(BlockRow::into_block).collect()
        })
        .await
    }

    async fn get_block(&self, index: u64) -> Result<Option<Block>> {
        let Ok(idx) = i64::try_from(index) else {
            return Ok(None);
        };

        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM blocks WHERE idx = ?1", BLOCK_COLUMNS),
                params![idx],
                BlockRow::from_row,
            )
            .optional()?
            .map(BlockRow::into_block)
            .transpose()
        })
        .await
    }

    async fn chain_len(&self) -> Result<u64> {
        self.with_conn(|conn| chain_len(conn)).await
    }

    async fn commit(&self, block: &Block, expected: TailToken) -> Result<CommitResult> {
        let block = block.clone();

        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let current = TailToken(chain_len(&tx)?);
            if current != expected {
                tracing::debug!(%expected, %current, "commit rejected: stale tail token");
                return Ok(CommitResult::TokenMismatch { current });
            }
            if block.index() != expected.next_index() {
                return Err(StoreError::InvalidData(format!(
                    "block index {} does not extend chain of length {}",
                    block.index(),
                    expected.chain_len()
                )));
            }

            tx.execute(
                "INSERT INTO blocks (idx, timestamp, previous_hash, payload_ref, validator_id,
                                     signature, hash, committed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    to_sql_index(block.index())?,
                    block.timestamp(),
                    block.previous_hash().as_bytes().as_slice(),
                    block.payload_ref().as_str(),
                    block.validator_id().as_str(),
                    block.signature.as_bytes().as_slice(),
                    block.hash.as_bytes().as_slice(),
                    now_millis(),
                ],
            )?;
            tx.commit()?;

            Ok(CommitResult::Committed {
                token: TailToken(expected.chain_len() + 1),
            })
        })
        .await
    }
}

#[async_trait]
impl ValidatorStore for SqliteStore {
    async fn put_validator(&self, record: &ValidatorRecord) -> Result<()> {
        let record = record.clone();

        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM validators WHERE validator_id = ?1",
                    params![record.id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Err(StoreError::AlreadyExists(record.id.to_string()));
            }

            let provisioned_seq: i64 = tx.query_row(
                "SELECT COALESCE(MAX(provisioned_seq) + 1, 0) FROM validators",
                [],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO validators (validator_id, public_key, role, provisioned_seq)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.id.as_str(),
                    record.public_key.as_bytes().as_slice(),
                    record.role.as_str(),
                    provisioned_seq,
                ],
            )?;
            for (seq, change) in record.history.iter().enumerate() {
                tx.execute(
                    "INSERT INTO validator_status (validator_id, seq, status, effective_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        record.id.as_str(),
                        seq as i64,
                        change.status.as_str(),
                        change.effective_at,
                    ],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn append_status_change(&self, id: &ValidatorId, change: StatusChange) -> Result<()> {
        let id = id.clone();

        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM validators WHERE validator_id = ?1",
                    params![id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(StoreError::NotFound(id.to_string()));
            }

            let seq: i64 = tx.query_row(
                "SELECT COALESCE(MAX(seq) + 1, 0) FROM validator_status WHERE validator_id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO validator_status (validator_id, seq, status, effective_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id.as_str(), seq, change.status.as_str(), change.effective_at],
            )?;

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn load_validators(&self) -> Result<Vec<ValidatorRecord>> {
        self.with_conn(|conn| {
            let mut history: HashMap<String, Vec<StatusChange>> = HashMap::new();
            {
                let mut stmt = conn.prepare_cached(
                    "SELECT validator_id, status, effective_at FROM validator_status
                     ORDER BY validator_id, seq",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })?;
                for row in rows {
                    let (id, status, effective_at) = row?;
                    history.entry(id).or_default().push(StatusChange {
                        status: parse_status(&status)?,
                        effective_at,
                    });
                }
            }

            let mut stmt = conn.prepare_cached(
                "SELECT validator_id, public_key, role FROM validators ORDER BY provisioned_seq",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(id, public_key, role)| {
                    let public_key: [u8; 32] = public_key.as_slice().try_into().map_err(|_| {
                        StoreError::InvalidData(format!("public key of {} is not 32 bytes", id))
                    })?;
                    let role: Role = role
                        .parse()
                        .map_err(|e: medledger_core::CoreError| StoreError::InvalidData(e.to_string()))?;
                    Ok(ValidatorRecord {
                        history: history.remove(&id).unwrap_or_default(),
                        id: ValidatorId::from_stored(id),
                        public_key: Ed25519PublicKey::from_bytes(public_key),
                        role,
                    })
                })
                .collect()
        })
        .await
    }
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
