//! Database schema migrations for SQLite.
//!
//! Versioned migrations: each one transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// Idempotent: safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
            tracing::debug!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- The chain. Row position is the block index.
        CREATE TABLE blocks (
            idx INTEGER PRIMARY KEY,          -- chain position, contiguous from 0
            timestamp INTEGER NOT NULL,       -- creation instant (Unix ms)
            previous_hash BLOB NOT NULL,      -- 32 bytes
            payload_ref TEXT NOT NULL,
            validator_id TEXT NOT NULL,
            signature BLOB NOT NULL,          -- 64 bytes, Ed25519
            hash BLOB NOT NULL,               -- 32 bytes, Blake3 block digest
            committed_at INTEGER NOT NULL     -- local time of commit
        );

        -- Provisioned validators. Never deleted.
        CREATE TABLE validators (
            validator_id TEXT PRIMARY KEY,
            public_key BLOB NOT NULL,         -- 32 bytes, Ed25519
            role TEXT NOT NULL,
            provisioned_seq INTEGER NOT NULL UNIQUE
        );

        -- Append-only status history.
        CREATE TABLE validator_status (
            validator_id TEXT NOT NULL REFERENCES validators(validator_id),
            seq INTEGER NOT NULL,             -- order of recording per validator
            status TEXT NOT NULL,
            effective_at INTEGER NOT NULL,
            PRIMARY KEY (validator_id, seq)
        );

        CREATE INDEX idx_blocks_validator ON blocks(validator_id);
        "#,
    )?;

    Ok(())
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"blocks".to_string()));
        assert!(tables.contains(&"validators".to_string()));
        assert!(tables.contains(&"validator_status".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (99, 0)",
            [],
        )
        .unwrap();

        assert!(matches!(migrate(&mut conn), Err(StoreError::Migration(_))));
    }
}
