//! Per-operation vault access.

use crate::error::{VaultError, VaultResult};
use crate::manager::{now_millis, VaultManager};
use crate::store::{self, EntryInfo};
use diary_crypto::{decrypt_bound, encrypt_bound, hash_for_search, keyword_tokens, Salt, VaultKey};
use duckdb::Connection;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;
use zeroize::Zeroizing;

/// An unlocked vault for the span of one logical operation.
///
/// Holds the derived key, which is wiped when the session is dropped. Each
/// entry is sealed with its id as associated data, so an envelope copied to
/// another entry row fails to open.
pub struct VaultSession<'a> {
    manager: &'a VaultManager,
    vault_id: String,
    key: VaultKey,
    salt: Salt,
}

/// An entry prepared for export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedEntry {
    pub entry_id: String,
    pub content: String,
    /// Whether PII redaction was applied to `content`.
    pub redacted: bool,
    pub created_at: i64,
    pub modified_at: i64,
}

impl<'a> VaultSession<'a> {
    pub(crate) fn new(manager: &'a VaultManager, vault_id: &str, key: VaultKey, salt: Salt) -> Self {
        Self {
            manager,
            vault_id: vault_id.to_string(),
            key,
            salt,
        }
    }

    pub fn vault_id(&self) -> &str {
        &self.vault_id
    }

    /// Fails once the vault's salt no longer matches the one this session's
    /// key was derived from.
    fn ensure_current(&self, conn: &Connection) -> VaultResult<()> {
        match store::current_salt(conn, &self.vault_id)? {
            Some(salt) if salt == self.salt => Ok(()),
            Some(_) => Err(VaultError::SessionExpired),
            None => Err(VaultError::NotInitialized),
        }
    }

    /// Encrypts `plaintext` into entry `entry_id`, replacing any previous
    /// envelope and its search tokens.
    pub fn store_entry(&self, entry_id: &str, plaintext: &str) -> VaultResult<()> {
        if entry_id.is_empty() {
            return Err(VaultError::InvalidArgument("entry id is empty".to_string()));
        }
        let envelope = encrypt_bound(plaintext, &self.key, entry_id)?;
        let tokens = keyword_tokens(
            plaintext,
            &self.salt,
            self.manager.config().search_min_word_len,
        );

        let conn = self.manager.lock_conn()?;
        store::in_transaction(&conn, |conn| {
            self.ensure_current(conn)?;
            let now = now_millis();
            store::upsert_entry(conn, &self.vault_id, entry_id, &envelope, now)?;
            store::replace_tokens(conn, &self.vault_id, entry_id, &tokens)?;
            store::touch_vault(conn, &self.vault_id, now)
        })?;

        debug!(vault_id = %self.vault_id, entry_id, tokens = tokens.len(), "Entry stored");
        Ok(())
    }

    /// Stores `plaintext` under a new time-ordered id and returns the id.
    pub fn store_new_entry(&self, plaintext: &str) -> VaultResult<String> {
        let entry_id = Uuid::now_v7().to_string();
        self.store_entry(&entry_id, plaintext)?;
        Ok(entry_id)
    }

    /// Decrypts entry `entry_id`.
    pub fn read_entry(&self, entry_id: &str) -> VaultResult<String> {
        let (envelope, _, _) = {
            let conn = self.manager.lock_conn()?;
            self.ensure_current(&conn)?;
            store::load_entry(&conn, &self.vault_id, entry_id)?
        };
        Ok(decrypt_bound(&envelope, &self.key, entry_id)?)
    }

    pub fn delete_entry(&self, entry_id: &str) -> VaultResult<()> {
        let conn = self.manager.lock_conn()?;
        let deleted = store::in_transaction(&conn, |conn| {
            self.ensure_current(conn)?;
            let deleted = store::delete_entry(conn, &self.vault_id, entry_id)?;
            if deleted {
                store::touch_vault(conn, &self.vault_id, now_millis())?;
            }
            Ok(deleted)
        })?;
        if !deleted {
            return Err(VaultError::EntryNotFound(entry_id.to_string()));
        }
        debug!(vault_id = %self.vault_id, entry_id, "Entry deleted");
        Ok(())
    }

    /// Entry metadata, most recently modified first.
    pub fn list_entries(&self) -> VaultResult<Vec<EntryInfo>> {
        let conn = self.manager.lock_conn()?;
        self.ensure_current(&conn)?;
        store::list_entries(&conn, &self.vault_id)
    }

    /// Ids of entries containing every word of `query`.
    ///
    /// Matching is on whole lower-cased words through keyed tokens; no
    /// plaintext is read or stored. Words shorter than the configured minimum
    /// are ignored, and a query with no indexable words matches nothing.
    pub fn search(&self, query: &str) -> VaultResult<Vec<String>> {
        let tokens = keyword_tokens(query, &self.salt, self.manager.config().search_min_word_len);
        let conn = self.manager.lock_conn()?;
        self.ensure_current(&conn)?;
        store::entries_with_all_tokens(&conn, &self.vault_id, &tokens)
    }

    /// Search token for an exact value under this vault's salt.
    pub fn search_token(&self, content: &str) -> String {
        hash_for_search(content, &self.salt)
    }

    /// Decrypts entry `entry_id` for export, scrubbing PII when export
    /// redaction is enabled.
    pub fn export_entry(&self, entry_id: &str) -> VaultResult<ExportedEntry> {
        let (envelope, created_at, modified_at) = {
            let conn = self.manager.lock_conn()?;
            self.ensure_current(&conn)?;
            store::load_entry(&conn, &self.vault_id, entry_id)?
        };
        let plaintext = Zeroizing::new(decrypt_bound(&envelope, &self.key, entry_id)?);

        let redacted = self.manager.config().export_redaction;
        let content = if redacted {
            self.manager.redactor().redact(&plaintext)
        } else {
            plaintext.to_string()
        };

        debug!(vault_id = %self.vault_id, entry_id, redacted, "Entry exported");
        Ok(ExportedEntry {
            entry_id: entry_id.to_string(),
            content,
            redacted,
            created_at,
            modified_at,
        })
    }
}

impl Drop for VaultSession<'_> {
    fn drop(&mut self) {
        debug!(vault_id = %self.vault_id, "Vault session closed");
    }
}
