//! C ABI exports for the Diary+ private vault.
//!
//! Two surfaces share one canonical scheme (PBKDF2-HMAC-SHA256 keys,
//! AES-256-GCM envelopes):
//! - stateless primitives for client runtimes that seal and open content
//!   themselves (see [`crypto`])
//! - password-gated vault operations over a DuckDB store opened with
//!   [`diary_init`]
//!
//! All functions use C-compatible types and report errors via return codes.
//! Strings returned through `out_*` pointers must be released with
//! [`diary_free_string`].

pub mod crypto;

use diary_crypto::CryptoError;
use diary_vault::{VaultConfig, VaultError, VaultManager};
use serde::Serialize;
use std::ffi::{c_char, CStr, CString};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

/// Error codes returned by FFI functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiaryError {
    /// Operation succeeded.
    Ok = 0,
    /// Null pointer argument.
    NullPointer = 1,
    /// Invalid UTF-8 string.
    InvalidUtf8 = 2,
    /// JSON serialization error.
    JsonError = 3,
    /// Storage error.
    StorageError = 4,
    /// Entry not found.
    NotFound = 5,
    /// Handle not initialized.
    NotInitialized = 6,
    /// Vault not found or not set up.
    VaultNotFound = 7,
    /// Vault already initialized.
    VaultAlreadyInitialized = 8,
    /// Password failed the strength check.
    WeakPassword = 9,
    /// Password did not open the vault.
    InvalidPassword = 10,
    /// Authentication failed or the envelope is malformed.
    DecryptionFailed = 11,
    /// Envelope names an algorithm this build does not implement.
    UnsupportedAlgorithm = 12,
    /// Invalid argument (bad salt, low iteration count, interior NUL).
    InvalidArgument = 13,
    /// Encryption failed.
    EncryptionFailed = 14,
    /// The vault was re-keyed while the operation was in flight.
    SessionExpired = 15,
    /// Unknown error.
    Unknown = 99,
}

impl From<&CryptoError> for DiaryError {
    fn from(e: &CryptoError) -> Self {
        match e {
            CryptoError::InvalidPassword { .. } => DiaryError::WeakPassword,
            CryptoError::Derivation(_) | CryptoError::InvalidPattern(_) => {
                DiaryError::InvalidArgument
            }
            CryptoError::Encryption(_) => DiaryError::EncryptionFailed,
            CryptoError::Decryption(_) => DiaryError::DecryptionFailed,
            CryptoError::UnsupportedAlgorithm(_) => DiaryError::UnsupportedAlgorithm,
        }
    }
}

impl From<CryptoError> for DiaryError {
    fn from(e: CryptoError) -> Self {
        DiaryError::from(&e)
    }
}

impl From<VaultError> for DiaryError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::NotInitialized | VaultError::VaultNotFound(_) => DiaryError::VaultNotFound,
            VaultError::AlreadyInitialized => DiaryError::VaultAlreadyInitialized,
            VaultError::WeakPassword(_) => DiaryError::WeakPassword,
            VaultError::InvalidPassword => DiaryError::InvalidPassword,
            VaultError::SessionExpired => DiaryError::SessionExpired,
            VaultError::InvalidArgument(_) => DiaryError::InvalidArgument,
            VaultError::EntryNotFound(_) => DiaryError::NotFound,
            VaultError::Storage(_) => DiaryError::StorageError,
            VaultError::Crypto(e) => DiaryError::from(&e),
        }
    }
}

impl From<serde_json::Error> for DiaryError {
    fn from(_: serde_json::Error) -> Self {
        DiaryError::JsonError
    }
}

pub(crate) type FfiResult<T> = Result<T, DiaryError>;

pub(crate) fn status(result: FfiResult<()>) -> DiaryError {
    match result {
        Ok(()) => DiaryError::Ok,
        Err(e) => e,
    }
}

// ============================================================================
// String helpers
// ============================================================================

/// Borrows a required C string argument.
pub(crate) unsafe fn read_str<'a>(ptr: *const c_char) -> FfiResult<&'a str> {
    if ptr.is_null() {
        return Err(DiaryError::NullPointer);
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| DiaryError::InvalidUtf8)
}

/// Borrows an optional C string argument; null means absent.
pub(crate) unsafe fn read_optional_str<'a>(ptr: *const c_char) -> FfiResult<Option<&'a str>> {
    if ptr.is_null() {
        return Ok(None);
    }
    unsafe { read_str(ptr) }.map(Some)
}

/// Hands `value` to the caller through `out`.
pub(crate) unsafe fn write_string(out: *mut *mut c_char, value: String) -> FfiResult<()> {
    if out.is_null() {
        return Err(DiaryError::NullPointer);
    }
    let c_value = CString::new(value).map_err(|_| DiaryError::InvalidArgument)?;
    unsafe { *out = c_value.into_raw() };
    Ok(())
}

pub(crate) unsafe fn write_json<T: Serialize>(out: *mut *mut c_char, value: &T) -> FfiResult<()> {
    let json = serde_json::to_string(value)?;
    unsafe { write_string(out, json) }
}

// ============================================================================
// Handle
// ============================================================================

struct DiaryHandle {
    vault_manager: VaultManager,
}

/// Global handle storage (single instance).
static HANDLE: Mutex<Option<DiaryHandle>> = Mutex::new(None);

fn lock_handle() -> MutexGuard<'static, Option<DiaryHandle>> {
    HANDLE.lock().unwrap_or_else(|poisoned| {
        warn!("recovering from poisoned HANDLE mutex");
        poisoned.into_inner()
    })
}

fn with_vaults<T>(f: impl FnOnce(&VaultManager) -> FfiResult<T>) -> FfiResult<T> {
    let handle = lock_handle();
    let handle = handle.as_ref().ok_or(DiaryError::NotInitialized)?;
    f(&handle.vault_manager)
}

fn install_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn init_vaults(path: &str, config: VaultConfig) -> FfiResult<()> {
    let vault_manager = VaultManager::open_with_config(Path::new(path), config)?;
    *lock_handle() = Some(DiaryHandle { vault_manager });
    Ok(())
}

// ============================================================================
// Core Functions
// ============================================================================

/// Initializes logging and opens the vault store at `db_path`
/// (`":memory:"` for an in-memory store).
///
/// # Safety
/// - `db_path` must be a valid null-terminated UTF-8 string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn diary_init(db_path: *const c_char) -> DiaryError { unsafe {
    install_tracing();
    status(read_str(db_path).and_then(|path| init_vaults(path, VaultConfig::default())))
}}

/// Same as [`diary_init`] with a JSON-encoded vault configuration. Missing
/// fields take their defaults.
///
/// # Safety
/// - `db_path` and `config_json` must be valid null-terminated UTF-8 strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn diary_init_with_config(
    db_path: *const c_char,
    config_json: *const c_char,
) -> DiaryError { unsafe {
    install_tracing();
    status((|| -> FfiResult<()> {
        let path = read_str(db_path)?;
        let config: VaultConfig = serde_json::from_str(read_str(config_json)?)?;
        init_vaults(path, config)
    })())
}}

/// Closes the vault store.
#[unsafe(no_mangle)]
pub extern "C" fn diary_shutdown() {
    *lock_handle() = None;
}

/// Returns the library version as a string.
///
/// # Safety
/// - The returned string is statically allocated and must not be freed.
#[unsafe(no_mangle)]
pub extern "C" fn diary_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

/// Frees a string allocated by this library.
///
/// # Safety
/// - `s` must be a string allocated by this library, or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn diary_free_string(s: *mut c_char) { unsafe {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}}

// ============================================================================
// Vault Functions
// ============================================================================
//
// Every call that touches entry content takes the vault password, derives
// the key for that one call and drops it before returning.

/// Sets up a vault. On success writes the strength result as JSON
/// (`{"isValid","score","feedback"}`) to `out_json` if it is non-null.
///
/// # Safety
/// - `vault_id` and `password` must be valid null-terminated UTF-8 strings.
/// - `out_json` must be null or a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn diary_vault_setup(
    vault_id: *const c_char,
    password: *const c_char,
    out_json: *mut *mut c_char,
) -> DiaryError { unsafe {
    status((|| -> FfiResult<()> {
        let id = read_str(vault_id)?;
        let pwd = read_str(password)?;
        let strength = with_vaults(|vm| Ok(vm.setup(id, pwd)?))?;
        if out_json.is_null() {
            return Ok(());
        }
        write_json(out_json, &strength)
    })())
}}

/// Whether `vault_id` has been set up.
///
/// # Safety
/// - `vault_id` must be a valid null-terminated UTF-8 string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn diary_vault_is_initialized(vault_id: *const c_char) -> bool { unsafe {
    match read_str(vault_id) {
        Ok(id) => with_vaults(|vm| Ok(vm.is_initialized(id))).unwrap_or(false),
        Err(_) => false,
    }
}}

/// Writes vault metadata as JSON to `out_json`.
///
/// # Safety
/// - `vault_id` must be a valid null-terminated UTF-8 string.
/// - `out_json` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn diary_vault_info(
    vault_id: *const c_char,
    out_json: *mut *mut c_char,
) -> DiaryError { unsafe {
    status((|| -> FfiResult<()> {
        let id = read_str(vault_id)?;
        let info = with_vaults(|vm| Ok(vm.vault_info(id)?))?;
        write_json(out_json, &info)
    })())
}}

/// Encrypts `plaintext` into entry `entry_id`.
///
/// # Safety
/// - All string arguments must be valid null-terminated UTF-8 strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn diary_vault_store_entry(
    vault_id: *const c_char,
    password: *const c_char,
    entry_id: *const c_char,
    plaintext: *const c_char,
) -> DiaryError { unsafe {
    status((|| -> FfiResult<()> {
        let id = read_str(vault_id)?;
        let pwd = read_str(password)?;
        let entry = read_str(entry_id)?;
        let text = read_str(plaintext)?;
        with_vaults(|vm| Ok(vm.open_session(id, pwd)?.store_entry(entry, text)?))
    })())
}}

/// Decrypts entry `entry_id` into `out_plaintext`.
///
/// # Safety
/// - All string arguments must be valid null-terminated UTF-8 strings.
/// - `out_plaintext` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn diary_vault_read_entry(
    vault_id: *const c_char,
    password: *const c_char,
    entry_id: *const c_char,
    out_plaintext: *mut *mut c_char,
) -> DiaryError { unsafe {
    status((|| -> FfiResult<()> {
        let id = read_str(vault_id)?;
        let pwd = read_str(password)?;
        let entry = read_str(entry_id)?;
        let text = with_vaults(|vm| Ok(vm.open_session(id, pwd)?.read_entry(entry)?))?;
        write_string(out_plaintext, text)
    })())
}}

/// Deletes entry `entry_id`.
///
/// # Safety
/// - All string arguments must be valid null-terminated UTF-8 strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn diary_vault_delete_entry(
    vault_id: *const c_char,
    password: *const c_char,
    entry_id: *const c_char,
) -> DiaryError { unsafe {
    status((|| -> FfiResult<()> {
        let id = read_str(vault_id)?;
        let pwd = read_str(password)?;
        let entry = read_str(entry_id)?;
        with_vaults(|vm| Ok(vm.open_session(id, pwd)?.delete_entry(entry)?))
    })())
}}

/// Writes entry metadata as a JSON array to `out_json`.
///
/// # Safety
/// - `vault_id` and `password` must be valid null-terminated UTF-8 strings.
/// - `out_json` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn diary_vault_list_entries(
    vault_id: *const c_char,
    password: *const c_char,
    out_json: *mut *mut c_char,
) -> DiaryError { unsafe {
    status((|| -> FfiResult<()> {
        let id = read_str(vault_id)?;
        let pwd = read_str(password)?;
        let entries = with_vaults(|vm| Ok(vm.open_session(id, pwd)?.list_entries()?))?;
        write_json(out_json, &entries)
    })())
}}

/// Writes the ids of entries matching every word of `query` as a JSON array.
///
/// # Safety
/// - All string arguments must be valid null-terminated UTF-8 strings.
/// - `out_json` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn diary_vault_search(
    vault_id: *const c_char,
    password: *const c_char,
    query: *const c_char,
    out_json: *mut *mut c_char,
) -> DiaryError { unsafe {
    status((|| -> FfiResult<()> {
        let id = read_str(vault_id)?;
        let pwd = read_str(password)?;
        let q = read_str(query)?;
        let ids = with_vaults(|vm| Ok(vm.open_session(id, pwd)?.search(q)?))?;
        write_json(out_json, &ids)
    })())
}}

/// Writes a redacted export of entry `entry_id` as JSON to `out_json`.
///
/// # Safety
/// - All string arguments must be valid null-terminated UTF-8 strings.
/// - `out_json` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn diary_vault_export_entry(
    vault_id: *const c_char,
    password: *const c_char,
    entry_id: *const c_char,
    out_json: *mut *mut c_char,
) -> DiaryError { unsafe {
    status((|| -> FfiResult<()> {
        let id = read_str(vault_id)?;
        let pwd = read_str(password)?;
        let entry = read_str(entry_id)?;
        let exported = with_vaults(|vm| Ok(vm.open_session(id, pwd)?.export_entry(entry)?))?;
        write_json(out_json, &exported)
    })())
}}

/// Re-keys a vault under `new_password`. Writes the number of re-encrypted
/// entries to `out_count` if it is non-null.
///
/// # Safety
/// - All string arguments must be valid null-terminated UTF-8 strings.
/// - `out_count` must be null or a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn diary_vault_change_password(
    vault_id: *const c_char,
    old_password: *const c_char,
    new_password: *const c_char,
    out_count: *mut u64,
) -> DiaryError { unsafe {
    status((|| -> FfiResult<()> {
        let id = read_str(vault_id)?;
        let old = read_str(old_password)?;
        let new = read_str(new_password)?;
        let count = with_vaults(|vm| Ok(vm.change_password(id, old, new)?))?;
        if !out_count.is_null() {
            *out_count = count as u64;
        }
        Ok(())
    })())
}}
