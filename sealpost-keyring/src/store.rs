//! Key store: ring persistence and key lifecycle operations.

use crate::armor::{create_armor, parse_armor, ArmorKind};
use crate::error::{KeyringError, KeyringResult};
use crate::record::{
    fingerprint, key_id, KeyRing, PrivateKeyMaterial, PrivateKeyRecord, PublicKeyRecord,
    TrustLabel,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sealpost_crypto::{
    generate_rsa_keypair, load_private_pem, load_public_pem, public_pem_for_private, rsa_key_bits,
};
use sealpost_storage::SecureStore;
use serde::Serialize;
use std::sync::Mutex;
use tracing::debug;

/// Default RSA modulus size for generated keys.
pub const DEFAULT_KEY_BITS: usize = 2048;
/// Persisted public ring file.
pub const PUBLIC_RING_FILE: &str = "public_keys.json";
/// Persisted private ring file.
pub const PRIVATE_RING_FILE: &str = "private_keys.json";

/// Metadata snapshot of one ring entry, without key material.
#[derive(Clone, Debug, Serialize)]
pub struct KeySummary {
    pub fingerprint: String,
    pub keyid: String,
    pub uids: Vec<String>,
    pub length: u32,
    pub algo: String,
    pub created: i64,
    pub expires: Option<i64>,
    pub trust: TrustLabel,
}

impl From<&PublicKeyRecord> for KeySummary {
    fn from(r: &PublicKeyRecord) -> Self {
        Self {
            fingerprint: r.fingerprint.clone(),
            keyid: r.keyid.clone(),
            uids: r.uids.clone(),
            length: r.length,
            algo: r.algo.clone(),
            created: r.created,
            expires: r.expires,
            trust: r.trust,
        }
    }
}

impl From<&PrivateKeyRecord> for KeySummary {
    fn from(r: &PrivateKeyRecord) -> Self {
        Self {
            fingerprint: r.fingerprint.clone(),
            keyid: r.keyid.clone(),
            uids: r.uids.clone(),
            length: r.length,
            algo: r.algo.clone(),
            created: r.created,
            expires: r.expires,
            trust: r.trust,
        }
    }
}

pub(crate) struct Inner {
    pub(crate) store: SecureStore,
    pub(crate) ring: KeyRing,
}

/// Owner of the key rings and the storage session.
///
/// All mutation goes through one internal lock: a single writer at a time,
/// and every mutation persists both rings before the lock is released.
pub struct KeyStore {
    pub(crate) inner: Mutex<Inner>,
}

impl KeyStore {
    /// Wraps an at-rest store, eagerly loading the rings when a session is
    /// already active.
    pub fn open(store: SecureStore) -> KeyringResult<Self> {
        let ring = if store.is_unlocked() {
            Self::load_ring(&store)?
        } else {
            KeyRing::default()
        };
        Ok(Self {
            inner: Mutex::new(Inner { store, ring }),
        })
    }

    /// Derives the master key and (re)loads the rings from disk.
    pub fn unlock(&self, master_password: &str) -> KeyringResult<()> {
        let mut inner = self.lock_inner();
        inner.store.unlock(master_password)?;
        inner.ring = Self::load_ring(&inner.store)?;
        Ok(())
    }

    /// Ends the storage session and drops the in-memory rings.
    pub fn lock(&self) {
        let mut inner = self.lock_inner();
        inner.store.lock();
        inner.ring = KeyRing::default();
    }

    pub fn is_unlocked(&self) -> bool {
        self.lock_inner().store.is_unlocked()
    }

    /// Rotates the master password, re-encrypting every stored file.
    /// See [`SecureStore::rotate_password`] for failure semantics.
    pub fn rotate_password(
        &self,
        old: &str,
        new: &str,
    ) -> KeyringResult<sealpost_storage::RotationReport> {
        let inner = self.lock_inner();
        Ok(inner.store.rotate_password(old, new)?)
    }

    fn load_ring(store: &SecureStore) -> KeyringResult<KeyRing> {
        let public = match store.load(PUBLIC_RING_FILE)? {
            Some(value) => KeyRing::records_from_value(value)?,
            None => Vec::new(),
        };
        let private = match store.load(PRIVATE_RING_FILE)? {
            Some(value) => KeyRing::records_from_value(value)?,
            None => Vec::new(),
        };
        debug!(
            "loaded key rings: {} public, {} private",
            public.len(),
            private.len()
        );
        Ok(KeyRing { public, private })
    }

    fn persist(inner: &Inner) -> KeyringResult<()> {
        inner
            .store
            .save(PUBLIC_RING_FILE, &serde_json::to_value(&inner.ring.public)?)?;
        inner
            .store
            .save(PRIVATE_RING_FILE, &serde_json::to_value(&inner.ring.private)?)?;
        Ok(())
    }

    pub(crate) fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("key store lock poisoned")
    }

    fn require_unlocked(inner: &Inner) -> KeyringResult<()> {
        if inner.store.is_unlocked() {
            Ok(())
        } else {
            Err(KeyringError::EncryptionNotInitialized)
        }
    }

    // ── Key lifecycle ────────────────────────────────────────────────

    /// Generates an RSA key pair, wraps the private key under `passphrase`,
    /// stores both records with `ultimate` trust and persists the rings.
    /// Returns the new fingerprint.
    pub fn generate_key(
        &self,
        name: &str,
        email: &str,
        passphrase: &str,
        bits: Option<usize>,
    ) -> KeyringResult<String> {
        let bits = bits.unwrap_or(DEFAULT_KEY_BITS);
        let mut inner = self.lock_inner();
        Self::require_unlocked(&inner)?;

        let pair = generate_rsa_keypair(bits)?;
        let fp = fingerprint(&pair.public_pem);
        let keyid = key_id(&fp);
        let uid = format!("{name} <{email}>");
        let created = chrono::Utc::now().timestamp();

        let material = PrivateKeyMaterial::wrap(&pair.private_pem, passphrase)?;

        inner.ring.upsert_public(PublicKeyRecord {
            fingerprint: fp.clone(),
            keyid: keyid.clone(),
            uids: vec![uid.clone()],
            length: bits as u32,
            algo: "RSA".into(),
            created,
            expires: None,
            trust: TrustLabel::Ultimate,
            public_key: pair.public_pem.clone(),
        });
        inner.ring.upsert_private(PrivateKeyRecord {
            fingerprint: fp.clone(),
            keyid,
            uids: vec![uid],
            length: bits as u32,
            algo: "RSA".into(),
            created,
            expires: None,
            trust: TrustLabel::Ultimate,
            private_key: material,
        });

        Self::persist(&inner)?;
        debug!("generated key pair {fp}");
        Ok(fp)
    }

    /// Snapshot of one ring's metadata, in insertion order.
    pub fn list_keys(&self, secret: bool) -> Vec<KeySummary> {
        let inner = self.lock_inner();
        if secret {
            inner.ring.private.iter().map(KeySummary::from).collect()
        } else {
            inner.ring.public.iter().map(KeySummary::from).collect()
        }
    }

    /// Exports a public key as an armored block.
    pub fn export_public_key(&self, fp: &str) -> KeyringResult<String> {
        let inner = self.lock_inner();
        let record = inner
            .ring
            .find_public(fp)
            .ok_or_else(|| KeyringError::KeyNotFound(fp.to_string()))?;
        let payload = STANDARD.encode(record.public_key.as_bytes());
        Ok(create_armor(&payload, ArmorKind::PublicKeyBlock))
    }

    /// Exports a private key as an armored block. Requires the passphrase to
    /// unwrap the stored material; the stored ciphertext is left unchanged.
    pub fn export_private_key(&self, fp: &str, passphrase: &str) -> KeyringResult<String> {
        let inner = self.lock_inner();
        let record = inner
            .ring
            .find_private(fp)
            .ok_or_else(|| KeyringError::KeyNotFound(fp.to_string()))?;
        let pem = record.private_key.unwrap_pem(passphrase)?;
        let payload = STANDARD.encode(pem.as_bytes());
        Ok(create_armor(&payload, ArmorKind::PrivateKeyBlock))
    }

    /// Imports an armored public or private key.
    ///
    /// The key is structurally validated by parsing its PEM; the fingerprint
    /// is always derived from the public half. A private key imported here
    /// carries no passphrase and is stored base64-encoded only — see
    /// [`PrivateKeyMaterial::EncodedPem`].
    pub fn import_key(&self, armored: &str) -> KeyringResult<String> {
        let (label, payload) = parse_armor(armored)?;
        let pem_bytes = STANDARD.decode(&payload).map_err(|e| {
            KeyringError::CorruptKeyData(format!("armor payload is not base64: {e}"))
        })?;
        let pem = String::from_utf8(pem_bytes)
            .map_err(|_| KeyringError::CorruptKeyData("armor payload is not UTF-8".into()))?;

        let is_private = label.contains("PRIVATE KEY");

        let mut inner = self.lock_inner();
        Self::require_unlocked(&inner)?;

        let (public_pem, bits) = if is_private {
            let private = load_private_pem(&pem)
                .map_err(|e| KeyringError::CorruptKeyData(e.to_string()))?;
            let public_pem = public_pem_for_private(&private)?;
            let bits = rsa_key_bits(&private.to_public_key());
            (public_pem, bits)
        } else {
            let public = load_public_pem(&pem)
                .map_err(|e| KeyringError::CorruptKeyData(e.to_string()))?;
            (pem.clone(), rsa_key_bits(&public))
        };

        let fp = fingerprint(&public_pem);
        let keyid = key_id(&fp);
        let created = chrono::Utc::now().timestamp();
        let uid = "Imported Key".to_string();

        inner.ring.upsert_public(PublicKeyRecord {
            fingerprint: fp.clone(),
            keyid: keyid.clone(),
            uids: vec![uid.clone()],
            length: bits as u32,
            algo: "RSA".into(),
            created,
            expires: None,
            trust: TrustLabel::Unknown,
            public_key: public_pem,
        });

        if is_private {
            inner.ring.upsert_private(PrivateKeyRecord {
                fingerprint: fp.clone(),
                keyid,
                uids: vec![uid],
                length: bits as u32,
                algo: "RSA".into(),
                created,
                expires: None,
                trust: TrustLabel::Unknown,
                private_key: PrivateKeyMaterial::EncodedPem(STANDARD.encode(pem.as_bytes())),
            });
        }

        Self::persist(&inner)?;
        debug!("imported {} key {fp}", if is_private { "private" } else { "public" });
        Ok(fp)
    }

    /// Removes one ring entry and persists.
    pub fn delete_key(&self, fp: &str, secret: bool) -> KeyringResult<()> {
        let mut inner = self.lock_inner();
        Self::require_unlocked(&inner)?;
        if !inner.ring.remove(fp, secret) {
            return Err(KeyringError::KeyNotFound(fp.to_string()));
        }
        Self::persist(&inner)?;
        Ok(())
    }
}
