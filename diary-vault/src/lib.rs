//! Password-gated private vaults for Diary+ journal content.
//!
//! Vaults are backed by DuckDB. Each vault has its own random salt and a
//! verification token sealed with the password-derived key. Entries are stored
//! as AES-256-GCM envelopes in four text columns (`encrypted_content`, `iv`,
//! `auth_tag`, `algorithm`) alongside keyed word tokens for search.
//!
//! Keys are never persisted or cached: [`VaultManager::open_session`] derives
//! the key once, and the returned [`VaultSession`] wipes it on drop.

mod config;
mod error;
mod manager;
mod session;
mod store;

pub use config::VaultConfig;
pub use error::{VaultError, VaultResult};
pub use manager::VaultManager;
pub use session::{ExportedEntry, VaultSession};
pub use store::{EntryInfo, VaultInfo};
