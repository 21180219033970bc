//! Versioned, HMAC-authenticated symmetric tokens for at-rest storage.
//!
//! Token layout before base64:
//!
//! ```text
//! [version: 1] [timestamp: 8, big-endian] [iv: 16] [ciphertext] [hmac: 32]
//! ```
//!
//! The 32-byte token key splits into a 16-byte HMAC-SHA256 signing half and a
//! 16-byte AES-128-CBC encryption half. The MAC covers everything before it,
//! so any bit flip (including the version and timestamp) fails authentication
//! before the ciphertext is touched. Tokens are URL-safe base64 strings.
//!
//! The timestamp is informational only; no expiry is enforced.

use crate::cipher::{pkcs7_pad, pkcs7_unpad};
use crate::error::{CryptoError, CryptoResult};
use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

/// Current token format version byte.
pub const TOKEN_VERSION: u8 = 0x80;

const TIMESTAMP_SIZE: usize = 8;
const IV_SIZE: usize = 16;
const MAC_SIZE: usize = 32;
// version + timestamp + iv + one ciphertext block + mac
const MIN_TOKEN_SIZE: usize = 1 + TIMESTAMP_SIZE + IV_SIZE + 16 + MAC_SIZE;

type HmacSha256 = Hmac<Sha256>;
type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

fn split_key(key: &[u8; 32]) -> (&[u8], [u8; 16]) {
    let signing = &key[..16];
    let mut enc = [0u8; 16];
    enc.copy_from_slice(&key[16..]);
    (signing, enc)
}

/// Encrypts and authenticates a payload, returning an opaque token string.
pub fn seal_token(key: &[u8; 32], payload: &[u8]) -> CryptoResult<String> {
    let (signing_key, enc_key) = split_key(key);

    let mut iv = [0u8; IV_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let padded = pkcs7_pad(payload);
    let ciphertext =
        Aes128CbcEnc::new(&enc_key.into(), &iv.into()).encrypt_padded_vec_mut::<NoPadding>(&padded);

    let timestamp = chrono::Utc::now().timestamp().max(0) as u64;

    let mut token = Vec::with_capacity(MIN_TOKEN_SIZE + ciphertext.len());
    token.push(TOKEN_VERSION);
    token.extend_from_slice(&timestamp.to_be_bytes());
    token.extend_from_slice(&iv);
    token.extend_from_slice(&ciphertext);

    let mut mac = HmacSha256::new_from_slice(signing_key)
        .map_err(|_| CryptoError::InvalidKeyLength {
            expected: 16,
            actual: signing_key.len(),
        })?;
    mac.update(&token);
    token.extend_from_slice(&mac.finalize().into_bytes());

    Ok(URL_SAFE.encode(token))
}

/// Authenticates and decrypts a token produced by [`seal_token`].
///
/// Fails with [`CryptoError::AuthenticationFailed`] on a wrong key or any
/// tampering, and [`CryptoError::InvalidTokenFormat`] on structural damage.
pub fn open_token(key: &[u8; 32], token: &str) -> CryptoResult<Vec<u8>> {
    let raw = URL_SAFE
        .decode(token)
        .map_err(|e| CryptoError::InvalidTokenFormat(format!("base64: {e}")))?;

    if raw.len() < MIN_TOKEN_SIZE {
        return Err(CryptoError::InvalidTokenFormat(format!(
            "token too short: {} bytes",
            raw.len()
        )));
    }
    if raw[0] != TOKEN_VERSION {
        return Err(CryptoError::InvalidTokenFormat(format!(
            "unknown version byte 0x{:02x}",
            raw[0]
        )));
    }

    let (signing_key, enc_key) = split_key(key);
    let (body, tag) = raw.split_at(raw.len() - MAC_SIZE);

    let mut mac = HmacSha256::new_from_slice(signing_key)
        .map_err(|_| CryptoError::InvalidKeyLength {
            expected: 16,
            actual: signing_key.len(),
        })?;
    mac.update(body);
    mac.verify_slice(tag)
        .map_err(|_| CryptoError::AuthenticationFailed)?;

    let iv_start = 1 + TIMESTAMP_SIZE;
    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(&body[iv_start..iv_start + IV_SIZE]);
    let ciphertext = &body[iv_start + IV_SIZE..];
    if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
        return Err(CryptoError::InvalidTokenFormat(
            "ciphertext is not block-aligned".into(),
        ));
    }

    let padded = Aes128CbcDec::new(&enc_key.into(), &iv.into())
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailed)?;

    pkcs7_unpad(&padded)
}
