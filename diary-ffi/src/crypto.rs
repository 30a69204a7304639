//! Stateless primitives for client runtimes.
//!
//! These mirror the server-side scheme exactly: a key derived here from
//! `(password, salt_hex, iterations)` is byte-identical to the one the vault
//! derives, and envelopes move freely between the two sides as JSON
//! (`{"encrypted_content","iv","auth_tag","algorithm"}`).

use crate::{read_optional_str, read_str, status, write_json, write_string, DiaryError, FfiResult};
use diary_crypto::{
    anonymize_location, decrypt, decrypt_bound, derive_key_hex, encrypt, encrypt_bound,
    generate_salt, hash_for_search, redact_pii, validate_key_strength, EncryptedEnvelope,
    KdfParams, Salt, VaultKey,
};
use std::ffi::c_char;

/// Opaque handle to a derived key. Wiped when freed.
pub struct DiaryKey(VaultKey);

unsafe fn key_ref<'a>(key: *const DiaryKey) -> FfiResult<&'a VaultKey> {
    if key.is_null() {
        return Err(DiaryError::NullPointer);
    }
    Ok(unsafe { &(*key).0 })
}

/// Writes a fresh 256-bit salt as lowercase hex to `out_hex`.
///
/// # Safety
/// - `out_hex` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn diary_generate_salt(out_hex: *mut *mut c_char) -> DiaryError { unsafe {
    status(write_string(out_hex, generate_salt().to_hex()))
}}

/// Derives a key from `password` and the hex salt. `iterations` of 0 uses
/// the default work factor; values below the minimum are refused.
///
/// On success `*out_key` receives a handle that must be released with
/// [`diary_key_free`].
///
/// # Safety
/// - `password` and `salt_hex` must be valid null-terminated UTF-8 strings.
/// - `out_key` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn diary_key_derive(
    password: *const c_char,
    salt_hex: *const c_char,
    iterations: u32,
    out_key: *mut *mut DiaryKey,
) -> DiaryError { unsafe {
    status((|| -> FfiResult<()> {
        if out_key.is_null() {
            return Err(DiaryError::NullPointer);
        }
        let password = read_str(password)?;
        let salt_hex = read_str(salt_hex)?;
        let params = match iterations {
            0 => KdfParams::default(),
            n => KdfParams::with_iterations(n),
        };
        let key = derive_key_hex(password, salt_hex, &params)?;
        *out_key = Box::into_raw(Box::new(DiaryKey(key)));
        Ok(())
    })())
}}

/// Releases a key handle.
///
/// # Safety
/// - `key` must be a handle returned by [`diary_key_derive`], or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn diary_key_free(key: *mut DiaryKey) { unsafe {
    if !key.is_null() {
        drop(Box::from_raw(key));
    }
}}

/// Encrypts `plaintext` and writes the envelope as JSON to `out_json`.
/// A non-null `binding` is authenticated with the ciphertext and must be
/// passed again to decrypt.
///
/// # Safety
/// - `key` must be a live handle from [`diary_key_derive`].
/// - `plaintext` must be a valid null-terminated UTF-8 string.
/// - `binding` must be null or a valid null-terminated UTF-8 string.
/// - `out_json` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn diary_encrypt(
    key: *const DiaryKey,
    plaintext: *const c_char,
    binding: *const c_char,
    out_json: *mut *mut c_char,
) -> DiaryError { unsafe {
    status((|| -> FfiResult<()> {
        let key = key_ref(key)?;
        let plaintext = read_str(plaintext)?;
        let envelope = match read_optional_str(binding)? {
            Some(binding) => encrypt_bound(plaintext, key, binding)?,
            None => encrypt(plaintext, key)?,
        };
        write_json(out_json, &envelope)
    })())
}}

/// Opens a JSON envelope and writes the plaintext to `out_plaintext`.
///
/// # Safety
/// - `key` must be a live handle from [`diary_key_derive`].
/// - `envelope_json` must be a valid null-terminated UTF-8 string.
/// - `binding` must be null or a valid null-terminated UTF-8 string.
/// - `out_plaintext` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn diary_decrypt(
    key: *const DiaryKey,
    envelope_json: *const c_char,
    binding: *const c_char,
    out_plaintext: *mut *mut c_char,
) -> DiaryError { unsafe {
    status((|| -> FfiResult<()> {
        let key = key_ref(key)?;
        let envelope: EncryptedEnvelope = serde_json::from_str(read_str(envelope_json)?)
            .map_err(|_| DiaryError::DecryptionFailed)?;
        let plaintext = match read_optional_str(binding)? {
            Some(binding) => decrypt_bound(&envelope, key, binding)?,
            None => decrypt(&envelope, key)?,
        };
        write_string(out_plaintext, plaintext)
    })())
}}

/// Packs a JSON envelope into base64 `iv || ciphertext || tag`, the layout a
/// WebCrypto client produces when it prepends the IV.
///
/// # Safety
/// - `envelope_json` must be a valid null-terminated UTF-8 string.
/// - `out_b64` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn diary_envelope_pack(
    envelope_json: *const c_char,
    out_b64: *mut *mut c_char,
) -> DiaryError { unsafe {
    status((|| -> FfiResult<()> {
        let envelope: EncryptedEnvelope = serde_json::from_str(read_str(envelope_json)?)
            .map_err(|_| DiaryError::DecryptionFailed)?;
        let sealed = envelope.to_sealed_bytes()?;
        write_string(out_b64, encode_b64(&sealed))
    })())
}}

/// Splits base64 `iv || ciphertext || tag` into a JSON envelope.
///
/// # Safety
/// - `algorithm` and `sealed_b64` must be valid null-terminated UTF-8 strings.
/// - `out_json` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn diary_envelope_unpack(
    algorithm: *const c_char,
    sealed_b64: *const c_char,
    out_json: *mut *mut c_char,
) -> DiaryError { unsafe {
    status((|| -> FfiResult<()> {
        let algorithm = read_str(algorithm)?;
        let sealed = decode_b64(read_str(sealed_b64)?)?;
        let envelope = EncryptedEnvelope::from_sealed_bytes(algorithm, &sealed)?;
        write_json(out_json, &envelope)
    })())
}}

/// Writes the 16-hex-char search token for `content` under the salt.
///
/// # Safety
/// - `content` and `salt_hex` must be valid null-terminated UTF-8 strings.
/// - `out_token` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn diary_hash_for_search(
    content: *const c_char,
    salt_hex: *const c_char,
    out_token: *mut *mut c_char,
) -> DiaryError { unsafe {
    status((|| -> FfiResult<()> {
        let content = read_str(content)?;
        let salt = Salt::from_hex(read_str(salt_hex)?)?;
        write_string(out_token, hash_for_search(content, &salt))
    })())
}}

/// Scores a candidate password and writes the result as JSON.
///
/// # Safety
/// - `password` must be a valid null-terminated UTF-8 string.
/// - `out_json` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn diary_validate_key_strength(
    password: *const c_char,
    out_json: *mut *mut c_char,
) -> DiaryError { unsafe {
    status((|| -> FfiResult<()> {
        let result = validate_key_strength(read_str(password)?);
        write_json(out_json, &result)
    })())
}}

/// Writes `text` with PII replaced by placeholders.
///
/// # Safety
/// - `text` must be a valid null-terminated UTF-8 string.
/// - `out_text` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn diary_redact_pii(
    text: *const c_char,
    out_text: *mut *mut c_char,
) -> DiaryError { unsafe {
    status((|| -> FfiResult<()> { write_string(out_text, redact_pii(read_str(text)?)?) })())
}}

/// Rounds coordinates to `precision` decimal places.
///
/// # Safety
/// - `out_lat` and `out_lng` must be valid pointers.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn diary_anonymize_location(
    lat: f64,
    lng: f64,
    precision: u32,
    out_lat: *mut f64,
    out_lng: *mut f64,
) -> DiaryError { unsafe {
    if out_lat.is_null() || out_lng.is_null() {
        return DiaryError::NullPointer;
    }
    let coords = anonymize_location(lat, lng, precision);
    *out_lat = coords.lat;
    *out_lng = coords.lng;
    DiaryError::Ok
}}

fn encode_b64(bytes: &[u8]) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine};
    STANDARD.encode(bytes)
}

fn decode_b64(value: &str) -> FfiResult<Vec<u8>> {
    use base64::{engine::general_purpose::STANDARD, Engine};
    STANDARD.decode(value).map_err(|_| DiaryError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diary_free_string;
    use diary_crypto::derive_key_hex;
    use pretty_assertions::assert_eq;
    use std::ffi::{CStr, CString};
    use std::ptr;

    const PASSWORD: &str = "Str0ng!Passw0rd";

    unsafe fn take_string(ptr: *mut c_char) -> String {
        let value = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        unsafe { diary_free_string(ptr) };
        value
    }

    fn ffi_salt() -> String {
        let mut out = ptr::null_mut();
        assert_eq!(unsafe { diary_generate_salt(&mut out) }, DiaryError::Ok);
        unsafe { take_string(out) }
    }

    fn ffi_key(password: &str, salt_hex: &str) -> *mut DiaryKey {
        let password = CString::new(password).unwrap();
        let salt = CString::new(salt_hex).unwrap();
        let mut key = ptr::null_mut();
        let result = unsafe { diary_key_derive(password.as_ptr(), salt.as_ptr(), 0, &mut key) };
        assert_eq!(result, DiaryError::Ok);
        key
    }

    fn ffi_encrypt(key: *const DiaryKey, plaintext: &str, binding: Option<&str>) -> String {
        let plaintext = CString::new(plaintext).unwrap();
        let binding = binding.map(|b| CString::new(b).unwrap());
        let binding_ptr = binding.as_ref().map_or(ptr::null(), |b| b.as_ptr());
        let mut out = ptr::null_mut();
        let result = unsafe { diary_encrypt(key, plaintext.as_ptr(), binding_ptr, &mut out) };
        assert_eq!(result, DiaryError::Ok);
        unsafe { take_string(out) }
    }

    fn ffi_decrypt(key: *const DiaryKey, json: &str, binding: Option<&str>) -> Result<String, DiaryError> {
        let json = CString::new(json).unwrap();
        let binding = binding.map(|b| CString::new(b).unwrap());
        let binding_ptr = binding.as_ref().map_or(ptr::null(), |b| b.as_ptr());
        let mut out = ptr::null_mut();
        match unsafe { diary_decrypt(key, json.as_ptr(), binding_ptr, &mut out) } {
            DiaryError::Ok => Ok(unsafe { take_string(out) }),
            e => Err(e),
        }
    }

    #[test]
    fn salt_is_64_hex_chars() {
        let salt = ffi_salt();
        assert_eq!(salt.len(), 64);
        assert!(salt.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn client_envelope_opens_on_server() {
        let salt = ffi_salt();
        let key = ffi_key(PASSWORD, &salt);
        let json = ffi_encrypt(key, "written on the phone", None);
        unsafe { diary_key_free(key) };

        let server_key = derive_key_hex(PASSWORD, &salt, &KdfParams::default()).unwrap();
        let envelope: EncryptedEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(decrypt(&envelope, &server_key).unwrap(), "written on the phone");
    }

    #[test]
    fn client_key_matches_reference_derivation() {
        let salt: String = (0u8..32).map(|b| format!("{b:02x}")).collect();
        let key = ffi_key(PASSWORD, &salt);
        let json = ffi_encrypt(key, "pinned", None);
        unsafe { diary_key_free(key) };

        // PBKDF2-HMAC-SHA256 over the decoded salt bytes, 100k iterations
        let reference = VaultKey::from_bytes([
            0xd4, 0x19, 0x86, 0xe9, 0x8a, 0x46, 0x7c, 0xbd, 0x1f, 0x46, 0x20, 0x63, 0x69, 0xec,
            0xa4, 0x44, 0x8d, 0x91, 0x1c, 0xf4, 0x22, 0xdf, 0x8c, 0xb1, 0x8e, 0x4c, 0x14, 0x8c,
            0xb4, 0x4e, 0x05, 0xca,
        ]);
        let envelope: EncryptedEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(decrypt(&envelope, &reference).unwrap(), "pinned");
    }

    #[test]
    fn server_envelope_opens_on_client() {
        let salt = ffi_salt();
        let server_key = derive_key_hex(PASSWORD, &salt, &KdfParams::default()).unwrap();
        let envelope = encrypt_bound("written on the server", &server_key, "entry-1").unwrap();
        let json = serde_json::to_string(&envelope).unwrap();

        let key = ffi_key(PASSWORD, &salt);
        assert_eq!(
            ffi_decrypt(key, &json, Some("entry-1")).unwrap(),
            "written on the server"
        );
        assert_eq!(
            ffi_decrypt(key, &json, Some("entry-2")),
            Err(DiaryError::DecryptionFailed)
        );
        assert_eq!(ffi_decrypt(key, &json, None), Err(DiaryError::DecryptionFailed));
        unsafe { diary_key_free(key) };
    }

    #[test]
    fn wrong_password_and_bad_envelopes_fail() {
        let salt = ffi_salt();
        let key = ffi_key(PASSWORD, &salt);
        let other = ffi_key("Str0ng!Passw0rD", &salt);
        let json = ffi_encrypt(key, "secret", None);

        assert_eq!(ffi_decrypt(other, &json, None), Err(DiaryError::DecryptionFailed));
        assert_eq!(ffi_decrypt(key, "{}", None), Err(DiaryError::DecryptionFailed));

        let mut envelope: serde_json::Value = serde_json::from_str(&json).unwrap();
        envelope["algorithm"] = "aes-128-gcm".into();
        assert_eq!(
            ffi_decrypt(key, &envelope.to_string(), None),
            Err(DiaryError::UnsupportedAlgorithm)
        );

        unsafe {
            diary_key_free(key);
            diary_key_free(other);
        }
    }

    #[test]
    fn derive_rejects_bad_inputs() {
        let password = CString::new(PASSWORD).unwrap();
        let short_salt = CString::new("abcd").unwrap();
        let salt = CString::new(ffi_salt()).unwrap();
        let mut key = ptr::null_mut();

        let result =
            unsafe { diary_key_derive(password.as_ptr(), short_salt.as_ptr(), 0, &mut key) };
        assert_eq!(result, DiaryError::InvalidArgument);

        let result = unsafe { diary_key_derive(password.as_ptr(), salt.as_ptr(), 1_000, &mut key) };
        assert_eq!(result, DiaryError::InvalidArgument);
        assert!(key.is_null());

        let result = unsafe { diary_key_derive(ptr::null(), salt.as_ptr(), 0, &mut key) };
        assert_eq!(result, DiaryError::NullPointer);
    }

    #[test]
    fn sealed_bytes_round_trip() {
        let salt = ffi_salt();
        let key = ffi_key(PASSWORD, &salt);
        let json = ffi_encrypt(key, "packed", None);

        let json_c = CString::new(json).unwrap();
        let mut packed = ptr::null_mut();
        assert_eq!(unsafe { diary_envelope_pack(json_c.as_ptr(), &mut packed) }, DiaryError::Ok);
        let packed = CString::new(unsafe { take_string(packed) }).unwrap();

        let algorithm = CString::new("aes-256-gcm").unwrap();
        let mut unpacked = ptr::null_mut();
        let result =
            unsafe { diary_envelope_unpack(algorithm.as_ptr(), packed.as_ptr(), &mut unpacked) };
        assert_eq!(result, DiaryError::Ok);
        let unpacked = unsafe { take_string(unpacked) };

        assert_eq!(ffi_decrypt(key, &unpacked, None).unwrap(), "packed");
        unsafe { diary_key_free(key) };
    }

    #[test]
    fn search_hash_matches_core() {
        let salt_hex = ffi_salt();
        let content = CString::new("board meeting").unwrap();
        let salt_c = CString::new(salt_hex.clone()).unwrap();
        let mut out = ptr::null_mut();
        let result = unsafe { diary_hash_for_search(content.as_ptr(), salt_c.as_ptr(), &mut out) };
        assert_eq!(result, DiaryError::Ok);

        let salt = Salt::from_hex(&salt_hex).unwrap();
        assert_eq!(unsafe { take_string(out) }, hash_for_search("board meeting", &salt));
    }

    #[test]
    fn strength_result_is_camel_case_json() {
        let password = CString::new("hello").unwrap();
        let mut out = ptr::null_mut();
        let result = unsafe { diary_validate_key_strength(password.as_ptr(), &mut out) };
        assert_eq!(result, DiaryError::Ok);
        let json: serde_json::Value = serde_json::from_str(&unsafe { take_string(out) }).unwrap();
        assert_eq!(json["isValid"], false);
        assert_eq!(json["score"], 3);
    }

    #[test]
    fn redaction_and_location() {
        let text = CString::new("SSN 123-45-6789").unwrap();
        let mut out = ptr::null_mut();
        assert_eq!(unsafe { diary_redact_pii(text.as_ptr(), &mut out) }, DiaryError::Ok);
        assert_eq!(unsafe { take_string(out) }, "SSN [REDACTED-SSN]");

        let (mut lat, mut lng) = (0.0, 0.0);
        let result = unsafe { diary_anonymize_location(40.712776, -74.005974, 2, &mut lat, &mut lng) };
        assert_eq!(result, DiaryError::Ok);
        assert_eq!((lat, lng), (40.71, -74.01));

        let result =
            unsafe { diary_anonymize_location(1.0, 1.0, 2, ptr::null_mut(), ptr::null_mut()) };
        assert_eq!(result, DiaryError::NullPointer);
    }
}
