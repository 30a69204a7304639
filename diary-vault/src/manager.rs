//! Vault lifecycle: setup, unlock, password change.

use crate::config::VaultConfig;
use crate::error::{VaultError, VaultResult};
use crate::session::VaultSession;
use crate::store::{self, VaultInfo, VaultRecord};
use chrono::Utc;
use diary_crypto::{
    decrypt_bound, derive_key, encrypt_bound, generate_salt, keyword_tokens, require_strength,
    CryptoError, PasswordStrengthResult, Redactor, VaultKey,
};
use duckdb::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Known plaintext sealed at setup. Opening it proves the password.
const VERIFICATION_PLAINTEXT: &str = "diary-plus-vault-verification-v1";

fn verification_binding(vault_id: &str) -> String {
    format!("verification:{vault_id}")
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Manages password-gated vaults sharing one DuckDB connection.
///
/// The manager never holds a key. Each access derives the key into a
/// [`VaultSession`], which wipes it when dropped.
pub struct VaultManager {
    conn: Arc<Mutex<Connection>>,
    config: VaultConfig,
    redactor: Redactor,
}

impl VaultManager {
    /// Opens a vault store backed by a DuckDB file.
    pub fn open(db_path: &Path) -> VaultResult<Self> {
        Self::open_with_config(db_path, VaultConfig::default())
    }

    pub fn open_with_config(db_path: &Path, config: VaultConfig) -> VaultResult<Self> {
        let in_memory = db_path.to_str() == Some(":memory:");
        let conn = if in_memory {
            Connection::open_in_memory()
        } else {
            Connection::open(db_path)
        }?;

        // Cap memory/threads, DuckDB defaults to ~80% RAM per connection
        if !in_memory {
            conn.execute_batch("PRAGMA memory_limit='64MB'; PRAGMA threads=1;")?;
        }

        Self::from_connection(conn, config)
    }

    /// Opens a vault store with an in-memory database.
    pub fn open_in_memory() -> VaultResult<Self> {
        Self::open_in_memory_with_config(VaultConfig::default())
    }

    pub fn open_in_memory_with_config(config: VaultConfig) -> VaultResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, config)
    }

    fn from_connection(conn: Connection, config: VaultConfig) -> VaultResult<Self> {
        conn.execute_batch(store::SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
            redactor: Redactor::standard()?,
        })
    }

    /// Replaces the redactor applied to exports.
    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub(crate) fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    pub(crate) fn lock_conn(&self) -> VaultResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| VaultError::Storage(e.to_string()))
    }

    /// Whether `vault_id` has been set up with a password.
    pub fn is_initialized(&self, vault_id: &str) -> bool {
        let conn = match self.lock_conn() {
            Ok(c) => c,
            Err(_) => return false,
        };
        store::vault_exists(&conn, vault_id).unwrap_or(false)
    }

    /// Public metadata of an initialized vault.
    pub fn vault_info(&self, vault_id: &str) -> VaultResult<VaultInfo> {
        let conn = self.lock_conn()?;
        store::vault_info(&conn, vault_id)?
            .ok_or_else(|| VaultError::VaultNotFound(vault_id.to_string()))
    }

    /// First-time setup: checks password strength, draws a fresh salt and
    /// stores a verification token sealed with the derived key.
    pub fn setup(&self, vault_id: &str, password: &str) -> VaultResult<PasswordStrengthResult> {
        if vault_id.trim().is_empty() {
            return Err(VaultError::InvalidArgument("vault id is blank".to_string()));
        }
        if self.is_initialized(vault_id) {
            return Err(VaultError::AlreadyInitialized);
        }
        let strength = self.check_strength(password)?;

        let salt = generate_salt();
        let kdf = self.config.kdf;
        let key = derive_key(password, &salt, &kdf)?;
        let verification =
            encrypt_bound(VERIFICATION_PLAINTEXT, &key, &verification_binding(vault_id))?;

        let conn = self.lock_conn()?;
        if store::vault_exists(&conn, vault_id)? {
            return Err(VaultError::AlreadyInitialized);
        }
        store::insert_vault(&conn, vault_id, &salt, &kdf, &verification, now_millis())?;

        info!(vault_id, iterations = kdf.iterations, "Vault initialized");
        Ok(strength)
    }

    /// Derives the key for `vault_id` and checks it against the stored
    /// verification token.
    pub fn open_session(&self, vault_id: &str, password: &str) -> VaultResult<VaultSession<'_>> {
        let record = {
            let conn = self.lock_conn()?;
            store::load_vault(&conn, vault_id)?
        }
        .ok_or(VaultError::NotInitialized)?;

        let key = unlock(vault_id, password, &record)?;
        debug!(vault_id, "Vault session opened");
        Ok(VaultSession::new(self, vault_id, key, record.salt))
    }

    /// Re-keys a vault under `new_password`.
    ///
    /// Every entry is decrypted with the old key and sealed again under a key
    /// derived from a new salt, with fresh IVs and rebuilt search tokens. The
    /// whole rewrite is one transaction. Sessions opened before the change
    /// expire. Returns the number of entries re-encrypted.
    pub fn change_password(
        &self,
        vault_id: &str,
        old_password: &str,
        new_password: &str,
    ) -> VaultResult<usize> {
        self.check_strength(new_password)?;

        let record = {
            let conn = self.lock_conn()?;
            store::load_vault(&conn, vault_id)?
        }
        .ok_or(VaultError::NotInitialized)?;
        let old_key = unlock(vault_id, old_password, &record)?;

        let new_salt = generate_salt();
        let new_kdf = self.config.kdf;
        let new_key = derive_key(new_password, &new_salt, &new_kdf)?;
        let verification =
            encrypt_bound(VERIFICATION_PLAINTEXT, &new_key, &verification_binding(vault_id))?;
        let min_word_len = self.config.search_min_word_len;

        let conn = self.lock_conn()?;
        let count = store::in_transaction(&conn, |conn| {
            // Re-keyed by someone else between unlock and lock
            if store::current_salt(conn, vault_id)?.as_ref() != Some(&record.salt) {
                return Err(VaultError::SessionExpired);
            }
            let entries = store::load_all_envelopes(conn, vault_id)?;
            for (entry_id, envelope) in &entries {
                let plaintext = Zeroizing::new(decrypt_bound(envelope, &old_key, entry_id)?);
                let resealed = encrypt_bound(&plaintext, &new_key, entry_id)?;
                store::replace_envelope(conn, vault_id, entry_id, &resealed)?;
                let tokens = keyword_tokens(&plaintext, &new_salt, min_word_len);
                store::replace_tokens(conn, vault_id, entry_id, &tokens)?;
            }
            store::rekey_vault(conn, vault_id, &new_salt, &new_kdf, &verification, now_millis())?;
            Ok(entries.len())
        })?;

        info!(vault_id, entries = count, "Vault password changed");
        Ok(count)
    }

    fn check_strength(&self, password: &str) -> VaultResult<PasswordStrengthResult> {
        require_strength(password, self.config.min_strength_score).map_err(|e| match e {
            CryptoError::InvalidPassword { feedback, .. } => VaultError::WeakPassword(feedback),
            other => other.into(),
        })
    }
}

fn unlock(vault_id: &str, password: &str, record: &VaultRecord) -> VaultResult<VaultKey> {
    if password.is_empty() {
        return Err(VaultError::InvalidPassword);
    }
    let key = derive_key(password, &record.salt, &record.kdf)?;
    match decrypt_bound(&record.verification, &key, &verification_binding(vault_id)) {
        Ok(token) if token == VERIFICATION_PLAINTEXT => Ok(key),
        Ok(_) | Err(CryptoError::Decryption(_)) => {
            warn!(vault_id, "Vault password verification failed");
            Err(VaultError::InvalidPassword)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_rejects_blank_vault_id() {
        let manager = VaultManager::open_in_memory().unwrap();
        assert!(matches!(
            manager.setup("  ", "Str0ng!Passw0rd"),
            Err(VaultError::InvalidArgument(_))
        ));
    }

    #[test]
    fn weak_password_never_touches_storage() {
        let manager = VaultManager::open_in_memory().unwrap();
        let err = manager.setup("journal", "short").unwrap_err();
        assert!(!err.feedback().is_empty());
        assert!(!manager.is_initialized("journal"));
    }

    #[test]
    fn memory_path_opens_in_memory() {
        let manager = VaultManager::open(Path::new(":memory:")).unwrap();
        assert!(!manager.is_initialized("journal"));
    }

    #[test]
    fn verification_token_is_bound_to_vault_id() {
        let manager = VaultManager::open_in_memory().unwrap();
        manager.setup("a", "Str0ng!Passw0rd").unwrap();
        let record = {
            let conn = manager.lock_conn().unwrap();
            store::load_vault(&conn, "a").unwrap().unwrap()
        };
        assert!(matches!(
            unlock("b", "Str0ng!Passw0rd", &record),
            Err(VaultError::InvalidPassword)
        ));
        assert!(unlock("a", "Str0ng!Passw0rd", &record).is_ok());
    }
}
