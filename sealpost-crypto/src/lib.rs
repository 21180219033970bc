//! Cryptographic primitives for sealpost.
//!
//! Thin, stateless adapters over well-audited RustCrypto implementations:
//! - RSA-OAEP (SHA-256 + MGF1-SHA-256) for wrapping session keys
//! - AES-256-CBC with explicit PKCS7 padding for message bodies
//! - PBKDF2-HMAC-SHA256 for password and passphrase key derivation
//! - A versioned, HMAC-authenticated symmetric token for at-rest storage
//!
//! # Architecture
//!
//! Two distinct symmetric paths exist on purpose. The raw CBC functions in
//! [`cipher`] carry no authentication and are used by the envelope protocol,
//! which derives its integrity expectations from the surrounding OAEP-wrapped
//! key search. The [`token`] module is authenticated end to end and is used
//! exclusively by the at-rest storage layer, where tamper detection is the
//! whole point.

mod cipher;
mod error;
mod kdf;
mod rsa_keys;
mod token;

pub use cipher::{
    aes_cbc_decrypt, aes_cbc_encrypt, pkcs7_pad, pkcs7_unpad, AES_BLOCK_SIZE, AES_KEY_SIZE,
    IV_SIZE,
};
pub use error::{CryptoError, CryptoResult};
pub use kdf::{pbkdf2_sha256, KDF_ITERATIONS, KDF_OUTPUT_SIZE};
pub use rsa_keys::{
    generate_rsa_keypair, load_private_pem, load_public_pem, oaep_unwrap, oaep_wrap,
    public_pem_for_private, rsa_key_bits, RsaKeyPair,
};
pub use token::{open_token, seal_token, TOKEN_VERSION};
