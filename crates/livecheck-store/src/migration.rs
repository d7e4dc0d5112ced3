//! Schema versioning for the evidence database

use crate::StoreError;
use rusqlite::{params, Connection, OptionalExtension};

pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Metadata table for tracking schema version
pub fn init_metadata_table(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;
    Ok(())
}

/// Current schema version; 0 for a fresh database
pub fn get_schema_version(conn: &Connection) -> Result<i32, StoreError> {
    let version: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = 'schema_version'",
            [],
            |r| r.get(0),
        )
        .optional()?;

    match version {
        Some(v) => v
            .parse::<i32>()
            .map_err(|_| StoreError::Schema(format!("invalid schema version: {}", v))),
        None => Ok(0),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        params![version.to_string()],
    )?;
    Ok(())
}

/// Run all necessary migrations to bring DB to current version
pub fn migrate_to_current(conn: &Connection) -> Result<(), StoreError> {
    init_metadata_table(conn)?;
    let current_version = get_schema_version(conn)?;

    if current_version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }
    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(StoreError::Schema(format!(
            "database version {} is newer than supported version {}",
            current_version, CURRENT_SCHEMA_VERSION
        )));
    }

    if current_version < 1 {
        migrate_v0_to_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v1_to_v2(conn)?;
    }

    log::info!(
        "evidence schema migrated from v{} to v{}",
        current_version,
        CURRENT_SCHEMA_VERSION
    );
    Ok(())
}

/// v1: sealed evidence records
fn migrate_v0_to_v1(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "BEGIN;
        CREATE TABLE IF NOT EXISTS evidence (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            device_id TEXT NOT NULL,
            consent_digest TEXT NOT NULL,
            content_digest TEXT NOT NULL,
            created_ts_us INTEGER NOT NULL,
            expires_ts_us INTEGER NOT NULL,
            delete_on_expiry INTEGER NOT NULL,
            ciphertext BLOB NOT NULL,
            nonce BLOB NOT NULL,
            wrapped_key BLOB NOT NULL,
            wrap_nonce BLOB NOT NULL,
            kdf_version INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS evidence_session_idx ON evidence(session_id);
        CREATE INDEX IF NOT EXISTS evidence_expiry_idx ON evidence(expires_ts_us);
        INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', '1');
        COMMIT;",
    )?;
    Ok(())
}

/// v2: audit token registry for read access
fn migrate_v1_to_v2(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS audit_tokens (
            digest TEXT PRIMARY KEY,
            label TEXT NOT NULL,
            created_ts_us INTEGER NOT NULL
        );",
    )?;
    set_schema_version(conn, 2)?;
    Ok(())
}
