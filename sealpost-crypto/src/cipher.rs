//! AES-256-CBC over explicitly padded buffers.
//!
//! The pad/unpad step is deliberately separate from the cipher call: the
//! envelope protocol pads once and encrypts once regardless of how many
//! recipients the message has.

use crate::error::{CryptoError, CryptoResult};
use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;
/// Symmetric key size in bytes (AES-256).
pub const AES_KEY_SIZE: usize = 32;
/// CBC initialization vector size in bytes.
pub const IV_SIZE: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Encrypts an already PKCS7-padded buffer with AES-256-CBC.
pub fn aes_cbc_encrypt(
    key: &[u8; AES_KEY_SIZE],
    iv: &[u8; IV_SIZE],
    padded: &[u8],
) -> CryptoResult<Vec<u8>> {
    if padded.is_empty() || padded.len() % AES_BLOCK_SIZE != 0 {
        return Err(CryptoError::BadCiphertextLength(padded.len()));
    }
    Ok(Aes256CbcEnc::new(key.into(), iv.into()).encrypt_padded_vec_mut::<NoPadding>(padded))
}

/// Decrypts AES-256-CBC ciphertext. The result still carries PKCS7 padding.
pub fn aes_cbc_decrypt(
    key: &[u8; AES_KEY_SIZE],
    iv: &[u8; IV_SIZE],
    ciphertext: &[u8],
) -> CryptoResult<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % AES_BLOCK_SIZE != 0 {
        return Err(CryptoError::BadCiphertextLength(ciphertext.len()));
    }
    Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| CryptoError::BadPadding)
}

/// Adds PKCS7 padding for a 16-byte block size.
///
/// Always appends at least one byte, so an exact-multiple input grows by a
/// full block.
pub fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    let pad_len = AES_BLOCK_SIZE - (data.len() % AES_BLOCK_SIZE);
    let mut padded = Vec::with_capacity(data.len() + pad_len);
    padded.extend_from_slice(data);
    padded.extend(std::iter::repeat(pad_len as u8).take(pad_len));
    padded
}

/// Strips PKCS7 padding, rejecting malformed trailers.
///
/// Fails when the declared padding length is zero, exceeds the block size or
/// the buffer, or when any padding byte does not match the declared length.
pub fn pkcs7_unpad(data: &[u8]) -> CryptoResult<Vec<u8>> {
    let &last = data.last().ok_or(CryptoError::BadPadding)?;
    let pad_len = last as usize;
    if pad_len == 0 || pad_len > AES_BLOCK_SIZE || pad_len > data.len() {
        return Err(CryptoError::BadPadding);
    }
    let (body, trailer) = data.split_at(data.len() - pad_len);
    if trailer.iter().any(|&b| b != last) {
        return Err(CryptoError::BadPadding);
    }
    Ok(body.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    fn random_key_iv() -> ([u8; AES_KEY_SIZE], [u8; IV_SIZE]) {
        let mut key = [0u8; AES_KEY_SIZE];
        let mut iv = [0u8; IV_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut key);
        rand::rngs::OsRng.fill_bytes(&mut iv);
        (key, iv)
    }

    #[test]
    fn pad_unpad_round_trip() {
        for len in 0..64 {
            let data: Vec<u8> = (0..len as u8).collect();
            let padded = pkcs7_pad(&data);
            assert_eq!(padded.len() % AES_BLOCK_SIZE, 0);
            assert_eq!(pkcs7_unpad(&padded).unwrap(), data);
        }
    }

    #[test]
    fn exact_block_input_gains_full_block() {
        let data = [7u8; AES_BLOCK_SIZE];
        let padded = pkcs7_pad(&data);
        assert_eq!(padded.len(), AES_BLOCK_SIZE * 2);
        assert_eq!(padded[AES_BLOCK_SIZE], AES_BLOCK_SIZE as u8);
    }

    #[test]
    fn unpad_rejects_zero_declared_length() {
        let mut block = [3u8; AES_BLOCK_SIZE];
        block[AES_BLOCK_SIZE - 1] = 0;
        assert!(pkcs7_unpad(&block).is_err());
    }

    #[test]
    fn unpad_rejects_oversized_declared_length() {
        let mut block = [0u8; AES_BLOCK_SIZE];
        block[AES_BLOCK_SIZE - 1] = 17;
        assert!(pkcs7_unpad(&block).is_err());
    }

    #[test]
    fn unpad_rejects_inconsistent_fill() {
        let mut padded = pkcs7_pad(b"hello");
        let len = padded.len();
        padded[len - 2] ^= 0x01;
        assert!(pkcs7_unpad(&padded).is_err());
    }

    #[test]
    fn cbc_round_trip() {
        let (key, iv) = random_key_iv();
        let padded = pkcs7_pad(b"attack at dawn");
        let ct = aes_cbc_encrypt(&key, &iv, &padded).unwrap();
        assert_ne!(ct, padded);
        let pt = aes_cbc_decrypt(&key, &iv, &ct).unwrap();
        assert_eq!(pkcs7_unpad(&pt).unwrap(), b"attack at dawn");
    }

    #[test]
    fn cbc_rejects_partial_block() {
        let (key, iv) = random_key_iv();
        assert!(aes_cbc_encrypt(&key, &iv, b"short").is_err());
        assert!(aes_cbc_decrypt(&key, &iv, &[0u8; 15]).is_err());
    }
}
