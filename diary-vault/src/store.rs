//! DuckDB schema and row access for vaults, entries and search tokens.
//!
//! All vaults share three tables keyed by `vault_id`. Entry content lives in
//! the four envelope columns and is never stored in any other form.

use crate::error::{VaultError, VaultResult};
use diary_crypto::{EncryptedEnvelope, KdfParams, Salt};
use duckdb::{params, params_from_iter, Connection};
use serde::Serialize;
use tracing::warn;

pub(crate) const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS vaults (
        vault_id VARCHAR PRIMARY KEY,
        salt VARCHAR NOT NULL,
        kdf_iterations BIGINT NOT NULL,
        algorithm VARCHAR NOT NULL,
        verification VARCHAR NOT NULL,
        created_at BIGINT NOT NULL,
        modified_at BIGINT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS vault_entries (
        vault_id VARCHAR NOT NULL,
        entry_id VARCHAR NOT NULL,
        encrypted_content TEXT,
        iv TEXT,
        auth_tag TEXT,
        algorithm TEXT,
        created_at BIGINT NOT NULL,
        modified_at BIGINT NOT NULL,
        PRIMARY KEY (vault_id, entry_id)
    );
    CREATE TABLE IF NOT EXISTS vault_search_tokens (
        vault_id VARCHAR NOT NULL,
        entry_id VARCHAR NOT NULL,
        token VARCHAR NOT NULL
    );
";

/// Persisted configuration of one vault.
#[derive(Debug)]
pub(crate) struct VaultRecord {
    pub salt: Salt,
    pub kdf: KdfParams,
    pub verification: EncryptedEnvelope,
}

/// Public metadata of a vault. Contains nothing derived from the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultInfo {
    pub vault_id: String,
    pub algorithm: String,
    pub kdf_iterations: u32,
    pub entry_count: i64,
    pub created_at: i64,
    pub modified_at: i64,
}

/// Entry metadata for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    pub entry_id: String,
    pub algorithm: Option<String>,
    pub created_at: i64,
    pub modified_at: i64,
}

pub(crate) fn load_vault(conn: &Connection, vault_id: &str) -> VaultResult<Option<VaultRecord>> {
    let row = conn.query_row(
        "SELECT salt, kdf_iterations, verification FROM vaults WHERE vault_id = ?",
        params![vault_id],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        },
    );
    let (salt_hex, iterations, verification_json) = match row {
        Ok(values) => values,
        Err(duckdb::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let iterations = u32::try_from(iterations)
        .map_err(|_| VaultError::Storage(format!("invalid kdf_iterations: {iterations}")))?;

    Ok(Some(VaultRecord {
        salt: Salt::from_hex(&salt_hex)?,
        kdf: KdfParams::with_iterations(iterations),
        verification: serde_json::from_str(&verification_json)?,
    }))
}

/// The salt a vault's key is currently derived from.
pub(crate) fn current_salt(conn: &Connection, vault_id: &str) -> VaultResult<Option<Salt>> {
    match conn.query_row(
        "SELECT salt FROM vaults WHERE vault_id = ?",
        params![vault_id],
        |row| row.get::<_, String>(0),
    ) {
        Ok(salt_hex) => Ok(Some(Salt::from_hex(&salt_hex)?)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn vault_exists(conn: &Connection, vault_id: &str) -> VaultResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM vaults WHERE vault_id = ?",
        params![vault_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub(crate) fn insert_vault(
    conn: &Connection,
    vault_id: &str,
    salt: &Salt,
    kdf: &KdfParams,
    verification: &EncryptedEnvelope,
    now: i64,
) -> VaultResult<()> {
    conn.execute(
        "INSERT INTO vaults (vault_id, salt, kdf_iterations, algorithm, verification, created_at, modified_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
            vault_id,
            salt.to_hex(),
            i64::from(kdf.iterations),
            verification.algorithm,
            serde_json::to_string(verification)?,
            now,
            now
        ],
    )?;
    Ok(())
}

pub(crate) fn rekey_vault(
    conn: &Connection,
    vault_id: &str,
    salt: &Salt,
    kdf: &KdfParams,
    verification: &EncryptedEnvelope,
    now: i64,
) -> VaultResult<()> {
    conn.execute(
        "UPDATE vaults SET salt = ?, kdf_iterations = ?, algorithm = ?, verification = ?, modified_at = ?
         WHERE vault_id = ?",
        params![
            salt.to_hex(),
            i64::from(kdf.iterations),
            verification.algorithm,
            serde_json::to_string(verification)?,
            now,
            vault_id
        ],
    )?;
    Ok(())
}

pub(crate) fn touch_vault(conn: &Connection, vault_id: &str, now: i64) -> VaultResult<()> {
    conn.execute(
        "UPDATE vaults SET modified_at = ? WHERE vault_id = ?",
        params![now, vault_id],
    )?;
    Ok(())
}

pub(crate) fn vault_info(conn: &Connection, vault_id: &str) -> VaultResult<Option<VaultInfo>> {
    let row = conn.query_row(
        "SELECT v.algorithm, v.kdf_iterations, v.created_at, v.modified_at,
                (SELECT COUNT(*) FROM vault_entries e WHERE e.vault_id = v.vault_id)
         FROM vaults v WHERE v.vault_id = ?",
        params![vault_id],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        },
    );
    match row {
        Ok((algorithm, iterations, created_at, modified_at, entry_count)) => Ok(Some(VaultInfo {
            vault_id: vault_id.to_string(),
            algorithm,
            kdf_iterations: u32::try_from(iterations).map_err(|_| {
                VaultError::Storage(format!("invalid kdf_iterations: {iterations}"))
            })?,
            entry_count,
            created_at,
            modified_at,
        })),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Entries
// ============================================================================

/// Writes an entry envelope, keeping the original `created_at` on update.
pub(crate) fn upsert_entry(
    conn: &Connection,
    vault_id: &str,
    entry_id: &str,
    envelope: &EncryptedEnvelope,
    now: i64,
) -> VaultResult<()> {
    let updated = conn.execute(
        "UPDATE vault_entries
         SET encrypted_content = ?, iv = ?, auth_tag = ?, algorithm = ?, modified_at = ?
         WHERE vault_id = ? AND entry_id = ?",
        params![
            envelope.ciphertext,
            envelope.iv,
            envelope.auth_tag,
            envelope.algorithm,
            now,
            vault_id,
            entry_id
        ],
    )?;
    if updated == 0 {
        conn.execute(
            "INSERT INTO vault_entries
             (vault_id, entry_id, encrypted_content, iv, auth_tag, algorithm, created_at, modified_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                vault_id,
                entry_id,
                envelope.ciphertext,
                envelope.iv,
                envelope.auth_tag,
                envelope.algorithm,
                now,
                now
            ],
        )?;
    }
    Ok(())
}

/// Replaces the envelope of an existing entry without touching timestamps.
pub(crate) fn replace_envelope(
    conn: &Connection,
    vault_id: &str,
    entry_id: &str,
    envelope: &EncryptedEnvelope,
) -> VaultResult<()> {
    conn.execute(
        "UPDATE vault_entries SET encrypted_content = ?, iv = ?, auth_tag = ?, algorithm = ?
         WHERE vault_id = ? AND entry_id = ?",
        params![
            envelope.ciphertext,
            envelope.iv,
            envelope.auth_tag,
            envelope.algorithm,
            vault_id,
            entry_id
        ],
    )?;
    Ok(())
}

/// Loads the envelope of one entry together with its timestamps.
pub(crate) fn load_entry(
    conn: &Connection,
    vault_id: &str,
    entry_id: &str,
) -> VaultResult<(EncryptedEnvelope, i64, i64)> {
    let row = conn.query_row(
        "SELECT encrypted_content, iv, auth_tag, algorithm, created_at, modified_at
         FROM vault_entries WHERE vault_id = ? AND entry_id = ?",
        params![vault_id, entry_id],
        |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
            ))
        },
    );
    match row {
        Ok((content, iv, tag, algorithm, created_at, modified_at)) => Ok((
            EncryptedEnvelope::from_columns(content, iv, tag, algorithm)?,
            created_at,
            modified_at,
        )),
        Err(duckdb::Error::QueryReturnedNoRows) => {
            Err(VaultError::EntryNotFound(entry_id.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// All entry ids with their raw envelope columns, oldest first.
pub(crate) fn load_all_envelopes(
    conn: &Connection,
    vault_id: &str,
) -> VaultResult<Vec<(String, EncryptedEnvelope)>> {
    let mut stmt = conn.prepare(
        "SELECT entry_id, encrypted_content, iv, auth_tag, algorithm
         FROM vault_entries WHERE vault_id = ? ORDER BY created_at, entry_id",
    )?;
    let rows: Vec<(String, Option<String>, Option<String>, Option<String>, Option<String>)> = stmt
        .query_map(params![vault_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
        })?
        .collect::<Result<_, _>>()?;

    rows.into_iter()
        .map(|(entry_id, content, iv, tag, algorithm)| {
            let envelope = EncryptedEnvelope::from_columns(content, iv, tag, algorithm)?;
            Ok((entry_id, envelope))
        })
        .collect()
}

pub(crate) fn delete_entry(conn: &Connection, vault_id: &str, entry_id: &str) -> VaultResult<bool> {
    delete_tokens(conn, vault_id, entry_id)?;
    let affected = conn.execute(
        "DELETE FROM vault_entries WHERE vault_id = ? AND entry_id = ?",
        params![vault_id, entry_id],
    )?;
    Ok(affected > 0)
}

pub(crate) fn list_entries(conn: &Connection, vault_id: &str) -> VaultResult<Vec<EntryInfo>> {
    let mut stmt = conn.prepare(
        "SELECT entry_id, algorithm, created_at, modified_at
         FROM vault_entries WHERE vault_id = ? ORDER BY modified_at DESC, entry_id",
    )?;
    let infos = stmt
        .query_map(params![vault_id], |row| {
            Ok(EntryInfo {
                entry_id: row.get(0)?,
                algorithm: row.get(1)?,
                created_at: row.get(2)?,
                modified_at: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(infos)
}

// ============================================================================
// Search tokens
// ============================================================================

pub(crate) fn delete_tokens(conn: &Connection, vault_id: &str, entry_id: &str) -> VaultResult<()> {
    conn.execute(
        "DELETE FROM vault_search_tokens WHERE vault_id = ? AND entry_id = ?",
        params![vault_id, entry_id],
    )?;
    Ok(())
}

pub(crate) fn replace_tokens(
    conn: &Connection,
    vault_id: &str,
    entry_id: &str,
    tokens: &[String],
) -> VaultResult<()> {
    delete_tokens(conn, vault_id, entry_id)?;
    let mut stmt = conn.prepare(
        "INSERT INTO vault_search_tokens (vault_id, entry_id, token) VALUES (?, ?, ?)",
    )?;
    for token in tokens {
        stmt.execute(params![vault_id, entry_id, token])?;
    }
    Ok(())
}

/// Entry ids carrying every token in `tokens`, most recently modified first.
pub(crate) fn entries_with_all_tokens(
    conn: &Connection,
    vault_id: &str,
    tokens: &[String],
) -> VaultResult<Vec<String>> {
    if tokens.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; tokens.len()].join(", ");
    let sql = format!(
        "SELECT e.entry_id FROM vault_entries e
         JOIN (
             SELECT entry_id FROM vault_search_tokens
             WHERE vault_id = ? AND token IN ({placeholders})
             GROUP BY entry_id
             HAVING COUNT(DISTINCT token) = {count}
         ) t ON t.entry_id = e.entry_id
         WHERE e.vault_id = ?
         ORDER BY e.modified_at DESC, e.entry_id",
        count = tokens.len()
    );

    let mut values: Vec<&str> = Vec::with_capacity(tokens.len() + 2);
    values.push(vault_id);
    values.extend(tokens.iter().map(String::as_str));
    values.push(vault_id);

    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map(params_from_iter(values), |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Runs `f` inside a transaction, rolling back on any error.
pub(crate) fn in_transaction<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> VaultResult<T>,
) -> VaultResult<T> {
    conn.execute_batch("BEGIN TRANSACTION")?;
    match f(conn) {
        Ok(value) => {
            conn.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                warn!(error = %rollback, "Rollback failed");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let conn = conn();
        let err = in_transaction(&conn, |conn| {
            touch_vault(conn, "journal", 1)?;
            conn.execute_batch("CREATE TABLE scratch (id INTEGER)")?;
            Err::<(), _>(VaultError::Storage("boom".to_string()))
        })
        .unwrap_err();
        assert!(matches!(err, VaultError::Storage(msg) if msg == "boom"));
        assert!(conn.execute_batch("SELECT * FROM scratch").is_err());
    }

    #[test]
    fn failed_rollback_keeps_original_error() {
        let conn = conn();
        let err = in_transaction(&conn, |conn| {
            conn.execute_batch("ROLLBACK")?;
            Err::<(), _>(VaultError::EntryNotFound("e1".to_string()))
        })
        .unwrap_err();
        assert!(matches!(err, VaultError::EntryNotFound(id) if id == "e1"));

        let value = in_transaction(&conn, |_| Ok(7)).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn current_salt_tracks_vault_row() {
        let conn = conn();
        assert!(current_salt(&conn, "journal").unwrap().is_none());

        let key = diary_crypto::generate_random_key();
        let verification = diary_crypto::encrypt_bound("v", &key, "verification:journal").unwrap();
        let kdf = KdfParams::default();
        let first = Salt::random();
        insert_vault(&conn, "journal", &first, &kdf, &verification, 1).unwrap();
        assert!(current_salt(&conn, "journal").unwrap() == Some(first));

        let second = Salt::random();
        rekey_vault(&conn, "journal", &second, &kdf, &verification, 2).unwrap();
        assert!(current_salt(&conn, "journal").unwrap() == Some(second));
    }
}
