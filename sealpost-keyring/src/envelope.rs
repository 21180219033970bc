//! Hybrid multi-recipient message envelopes.
//!
//! A message body is padded and AES-256-CBC encrypted exactly once under a
//! fresh session key; the session key is then RSA-OAEP wrapped once per
//! recipient. The envelope travels as JSON inside a `PGP MESSAGE` armor
//! block:
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "encrypted_keys": ["<base64 RSA-OAEP ciphertext>", "..."],
//!   "iv": "<base64>",
//!   "encrypted_message": "<base64>"
//! }
//! ```
//!
//! The wrapped keys carry no recipient labels: decryption tries every local
//! private key against every entry.

use crate::armor::{create_armor, parse_armor, ArmorKind};
use crate::error::{KeyringError, KeyringResult};
use crate::store::KeyStore;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use sealpost_crypto::{
    aes_cbc_decrypt, aes_cbc_encrypt, load_private_pem, load_public_pem, oaep_unwrap, oaep_wrap,
    pkcs7_pad, pkcs7_unpad, AES_KEY_SIZE, IV_SIZE,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

/// Envelope format version written by this implementation. Stored for
/// forward compatibility; not checked on decrypt.
pub const ENVELOPE_VERSION: &str = "1.0";

/// The JSON payload inside a `PGP MESSAGE` armor block.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub version: String,
    /// base64 RSA-OAEP ciphertexts of the session key, in recipient list
    /// order. Unlabeled: a wrapped key says nothing about who it is for.
    pub encrypted_keys: Vec<String>,
    /// base64 16-byte CBC IV.
    pub iv: String,
    /// base64 AES-256-CBC ciphertext of the padded message body.
    pub encrypted_message: String,
}

impl KeyStore {
    /// Encrypts `message` for every fingerprint in `recipients`, returning an
    /// armored `PGP MESSAGE` block.
    ///
    /// All recipients are resolved before anything is encrypted, so a missing
    /// key fails the whole call without side effects.
    pub fn encrypt_message(&self, message: &str, recipients: &[&str]) -> KeyringResult<String> {
        if recipients.is_empty() {
            return Err(KeyringError::NoRecipients);
        }

        let inner = self.lock_inner();
        let mut public_keys = Vec::with_capacity(recipients.len());
        for fp in recipients {
            let record = inner
                .ring
                .find_public(fp)
                .ok_or_else(|| KeyringError::KeyNotFound(fp.to_string()))?;
            public_keys.push(load_public_pem(&record.public_key)?);
        }

        let mut session_key = Zeroizing::new([0u8; AES_KEY_SIZE]);
        let mut iv = [0u8; IV_SIZE];
        rand::rngs::OsRng.fill_bytes(session_key.as_mut());
        rand::rngs::OsRng.fill_bytes(&mut iv);

        // The body is encrypted once, regardless of recipient count.
        let ciphertext = aes_cbc_encrypt(&session_key, &iv, &pkcs7_pad(message.as_bytes()))?;

        let mut encrypted_keys = Vec::with_capacity(public_keys.len());
        for public in &public_keys {
            let wrapped = oaep_wrap(public, session_key.as_ref())?;
            encrypted_keys.push(STANDARD.encode(wrapped));
        }

        let envelope = MessageEnvelope {
            version: ENVELOPE_VERSION.to_string(),
            encrypted_keys,
            iv: STANDARD.encode(iv),
            encrypted_message: STANDARD.encode(ciphertext),
        };

        let payload = STANDARD.encode(serde_json::to_vec(&envelope)?);
        debug!("sealed message for {} recipient(s)", recipients.len());
        Ok(create_armor(&payload, ArmorKind::Message))
    }

    /// Decrypts an armored `PGP MESSAGE` block.
    ///
    /// Every held private key is tried against every wrapped key, since the
    /// envelope does not say which entry belongs to whom. `passphrase` is
    /// used to unwrap passphrase-protected private keys — keys it cannot open
    /// are skipped, not fatal. Once a session key is recovered, a failing
    /// body decrypt is a hard error rather than a reason to keep searching.
    pub fn decrypt_message(&self, armored: &str, passphrase: &str) -> KeyringResult<String> {
        let envelope = Self::parse_envelope(armored)?;

        let iv_bytes = STANDARD
            .decode(&envelope.iv)
            .map_err(|e| KeyringError::InvalidMessageFormat(format!("bad iv: {e}")))?;
        let iv: [u8; IV_SIZE] = iv_bytes
            .try_into()
            .map_err(|_| KeyringError::InvalidMessageFormat("iv is not 16 bytes".into()))?;
        let body = STANDARD
            .decode(&envelope.encrypted_message)
            .map_err(|e| KeyringError::InvalidMessageFormat(format!("bad ciphertext: {e}")))?;

        let inner = self.lock_inner();
        let total = inner.ring.private.len();
        let mut loaded = 0usize;

        for record in &inner.ring.private {
            let pem = match record.private_key.unwrap_pem(passphrase) {
                Ok(pem) => pem,
                Err(e) => {
                    debug!("skipping key {}: cannot unwrap ({e})", record.keyid);
                    continue;
                }
            };
            let private = match load_private_pem(&pem) {
                Ok(private) => private,
                Err(e) => {
                    debug!("skipping key {}: unparseable PEM ({e})", record.keyid);
                    continue;
                }
            };
            loaded += 1;

            for wrapped in &envelope.encrypted_keys {
                let Ok(wrapped_bytes) = STANDARD.decode(wrapped) else {
                    continue;
                };
                let Ok(session_key) = oaep_unwrap(&private, &wrapped_bytes) else {
                    continue;
                };
                let session_key = Zeroizing::new(session_key);
                let key: &[u8; AES_KEY_SIZE] = match session_key.as_slice().try_into() {
                    Ok(key) => key,
                    Err(_) => {
                        debug!("recovered session key has wrong length, skipping");
                        continue;
                    }
                };

                let padded = aes_cbc_decrypt(key, &iv, &body)
                    .map_err(|e| KeyringError::DecryptionFailure(e.to_string()))?;
                let plaintext = pkcs7_unpad(&padded).map_err(|_| {
                    KeyringError::DecryptionFailure("message body is corrupt".into())
                })?;
                return String::from_utf8(plaintext).map_err(|_| {
                    KeyringError::DecryptionFailure("decrypted body is not UTF-8".into())
                });
            }
        }

        Err(KeyringError::DecryptionFailure(match (total, loaded) {
            (0, _) => "no private keys available".to_string(),
            (_, 0) => format!("no private keys available: 0 of {total} could be unlocked"),
            _ => format!("{loaded} private keys tried, none matched"),
        }))
    }

    fn parse_envelope(armored: &str) -> KeyringResult<MessageEnvelope> {
        let (label, payload) = parse_armor(armored)?;
        if ArmorKind::from_label(&label) != Some(ArmorKind::Message) {
            return Err(KeyringError::InvalidMessageFormat(format!(
                "expected a MESSAGE block, found {label}"
            )));
        }
        let json = STANDARD
            .decode(&payload)
            .map_err(|e| KeyringError::InvalidMessageFormat(format!("bad base64: {e}")))?;
        serde_json::from_slice(&json)
            .map_err(|e| KeyringError::InvalidMessageFormat(format!("bad envelope: {e}")))
    }
}
