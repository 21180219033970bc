//! Master-password at-rest encryption layer.
//!
//! Every persisted artifact lives under a single data directory as a JSON
//! file of the shape `{version, encrypted, data}`, where `data` is an
//! authenticated token sealed under a key derived from the master password.
//! Legacy plaintext files (`encrypted: false`) load unchanged and can be
//! migrated in place.
//!
//! # Key lifecycle
//!
//! The derivation salt (`.encryption_salt`, 32 random bytes) is created once
//! per installation and never rotated. The derived key exists only in memory
//! for the lifetime of an unlocked session and is zeroized on drop. Password
//! rotation re-encrypts every file under the new derivation in two phases:
//! decrypt everything first, then write everything, so a file that fails to
//! decrypt is left untouched and reported rather than destroyed.
//!
//! A `.lock` file guards the directory against a second process; all
//! within-process mutation goes through `&self` methods with the key behind
//! an `RwLock`.

mod error;

pub use error::{StorageError, StorageResult};

use sealpost_crypto::{open_token, pbkdf2_sha256, seal_token, CryptoError};
use serde_json::{json, Value};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// File format version written into every encrypted record.
pub const FILE_FORMAT_VERSION: &str = "2.1";
/// Per-installation derivation salt, created once.
const SALT_FILE: &str = ".encryption_salt";
/// Directory lock file.
const LOCK_FILE: &str = ".lock";
const SALT_SIZE: usize = 32;
const SHRED_PASSES: u32 = 3;

/// Derived master key, wiped from memory when the session ends.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct MasterKey([u8; 32]);

/// Outcome of a password rotation.
///
/// `failed` names files that could not be decrypted under the old key (or
/// rewritten under the new one); they remain on their previous ciphertext.
#[derive(Debug, Default)]
pub struct RotationReport {
    pub rotated: Vec<String>,
    pub failed: Vec<String>,
}

/// Removes the lock file when the store is dropped.
struct DirLock {
    path: PathBuf,
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("failed to release directory lock {}: {e}", self.path.display());
        }
    }
}

/// Encrypted file store rooted at a single data directory.
pub struct SecureStore {
    root: PathBuf,
    key: RwLock<Option<MasterKey>>,
    _lock: DirLock,
}

impl SecureStore {
    /// Opens (creating if needed) a data directory and takes its lock file.
    ///
    /// Fails with [`StorageError::Locked`] when another process already holds
    /// the directory.
    pub fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let lock_path = root.join(LOCK_FILE);
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    StorageError::Locked(root.clone())
                } else {
                    StorageError::Io(e)
                }
            })?;

        Ok(Self {
            root,
            key: RwLock::new(None),
            _lock: DirLock { path: lock_path },
        })
    }

    /// Root data directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Derives the session key from the master password and sweeps any
    /// remaining plaintext `*.json` files into encrypted form.
    pub fn unlock(&self, password: &str) -> StorageResult<()> {
        let key = self.derive_key(password)?;
        *self.key.write().expect("key lock poisoned") = Some(key);
        self.migrate_directory()?;
        Ok(())
    }

    /// Clears the session key.
    pub fn lock(&self) {
        *self.key.write().expect("key lock poisoned") = None;
    }

    /// Whether a master-password session is active.
    pub fn is_unlocked(&self) -> bool {
        self.key.read().expect("key lock poisoned").is_some()
    }

    /// Round-trips synthetic data through the current key.
    pub fn verify_key(&self) -> bool {
        let probe = json!({"probe": "verification", "n": 12345});
        match self.encrypt_record(&probe).and_then(|t| self.decrypt_record(&t)) {
            Ok(v) => v == probe,
            Err(_) => false,
        }
    }

    fn derive_key(&self, password: &str) -> StorageResult<MasterKey> {
        let salt = self.get_or_create_salt()?;
        Ok(MasterKey(pbkdf2_sha256(password, &salt)))
    }

    fn get_or_create_salt(&self) -> StorageResult<Vec<u8>> {
        let path = self.root.join(SALT_FILE);
        if path.exists() {
            let salt = fs::read(&path)?;
            if salt.len() != SALT_SIZE {
                return Err(StorageError::CorruptFile {
                    name: SALT_FILE.into(),
                    detail: format!("expected {SALT_SIZE} bytes, found {}", salt.len()),
                });
            }
            return Ok(salt);
        }

        let mut salt = vec![0u8; SALT_SIZE];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut salt);
        fs::write(&path, &salt)?;
        Ok(salt)
    }

    fn current_key(&self) -> StorageResult<MasterKey> {
        self.key
            .read()
            .expect("key lock poisoned")
            .clone()
            .ok_or(StorageError::NotInitialized)
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    // ── Record encryption ────────────────────────────────────────────

    /// Serializes a value and seals it into an authenticated token.
    pub fn encrypt_record(&self, value: &Value) -> StorageResult<String> {
        let key = self.current_key()?;
        Self::seal_with(&key, value)
    }

    /// Opens a token and deserializes the enclosed value.
    pub fn decrypt_record(&self, token: &str) -> StorageResult<Value> {
        let key = self.current_key()?;
        Self::open_with(&key, token)
    }

    fn seal_with(key: &MasterKey, value: &Value) -> StorageResult<String> {
        let bytes = serde_json::to_vec(value)?;
        seal_token(&key.0, &bytes).map_err(crypto_to_storage)
    }

    fn open_with(key: &MasterKey, token: &str) -> StorageResult<Value> {
        let bytes = open_token(&key.0, token).map_err(crypto_to_storage)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    // ── File operations ──────────────────────────────────────────────

    /// Encrypts `value` and writes `{version, encrypted: true, data}` under
    /// `name`, via a temp file and rename.
    pub fn save(&self, name: &str, value: &Value) -> StorageResult<()> {
        let key = self.current_key()?;
        self.write_encrypted(&key, &self.path_for(name), value)
    }

    fn write_encrypted(&self, key: &MasterKey, path: &Path, value: &Value) -> StorageResult<()> {
        let token = Self::seal_with(key, value)?;
        let record = json!({
            "version": FILE_FORMAT_VERSION,
            "encrypted": true,
            "data": token,
        });
        let bytes = serde_json::to_vec(&record)?;

        let tmp = path.with_extension("tmp");
        {
            let mut f = File::create(&tmp)?;
            f.write_all(&bytes)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Loads and decrypts a file, or returns `None` when it does not exist.
    ///
    /// Legacy files with `encrypted: false` (or no wrapper at all) return
    /// their raw payload unchanged. Corrupt or tampered files surface an
    /// error rather than a silent default.
    pub fn load(&self, name: &str) -> StorageResult<Option<Value>> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(None);
        }

        let record = self.read_json(&path, name)?;
        if !is_encrypted(&record) {
            // Legacy plaintext: the payload is the `data` field when present,
            // otherwise the whole object.
            let payload = record.get("data").cloned().unwrap_or(record);
            return Ok(Some(payload));
        }

        let token = record
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| StorageError::CorruptFile {
                name: name.into(),
                detail: "encrypted record has no token payload".into(),
            })?;
        Ok(Some(self.decrypt_record(token)?))
    }

    /// Rewrites an unencrypted file into encrypted form in place.
    /// No-op when the file is absent or already encrypted.
    pub fn migrate(&self, name: &str) -> StorageResult<()> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(());
        }
        let record = self.read_json(&path, name)?;
        if is_encrypted(&record) {
            return Ok(());
        }
        debug!("migrating plaintext file {name} to encrypted form");
        let key = self.current_key()?;
        self.write_encrypted(&key, &path, &record)
    }

    /// Migrates every plaintext `*.json` file under the root. Dotfiles are
    /// skipped; individual failures are logged and skipped, not escalated.
    pub fn migrate_directory(&self) -> StorageResult<()> {
        for name in self.data_file_names()? {
            if let Err(e) = self.migrate(&name) {
                warn!("failed to migrate {name}: {e}");
            }
        }
        Ok(())
    }

    /// Overwrites the file with fresh random bytes for three passes (each
    /// flushed and fsynced), then unlinks it. No-op when absent.
    pub fn secure_delete(&self, name: &str) -> StorageResult<()> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(());
        }

        let len = fs::metadata(&path)?.len() as usize;
        let mut f = OpenOptions::new().write(true).open(&path)?;
        let mut noise = vec![0u8; len];
        for _ in 0..SHRED_PASSES {
            rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut noise);
            f.seek(SeekFrom::Start(0))?;
            f.write_all(&noise)?;
            f.flush()?;
            f.sync_all()?;
        }
        drop(f);
        fs::remove_file(&path)?;
        Ok(())
    }

    // ── Password rotation ────────────────────────────────────────────

    /// Re-encrypts every encrypted file under a key derived from `new`.
    ///
    /// Phase 1 decrypts all files under the old key into a staging set;
    /// a file that fails stays untouched on its old ciphertext and is named
    /// in the report. Phase 2 writes each staged record under the new key via
    /// temp file and rename, so a crash never leaves a half-written file.
    /// Afterwards the session key is the new derivation.
    pub fn rotate_password(&self, old: &str, new: &str) -> StorageResult<RotationReport> {
        let old_key = self.derive_key(old)?;

        // The old password must at least produce a working key.
        let probe = json!({"probe": "rotation"});
        let token = Self::seal_with(&old_key, &probe)?;
        if !matches!(Self::open_with(&old_key, &token), Ok(ref v) if *v == probe) {
            return Err(StorageError::DecryptionFailure(
                "old password verification failed".into(),
            ));
        }

        let mut report = RotationReport::default();
        let mut staged: Vec<(String, Value)> = Vec::new();

        // Phase 1: decrypt everything under the old key.
        for name in self.data_file_names()? {
            let path = self.path_for(&name);
            let record = match self.read_json(&path, &name) {
                Ok(r) => r,
                Err(e) => {
                    warn!("rotation: skipping unreadable file {name}: {e}");
                    report.failed.push(name);
                    continue;
                }
            };
            if !is_encrypted(&record) {
                continue;
            }
            let Some(token) = record.get("data").and_then(Value::as_str) else {
                warn!("rotation: encrypted record {name} has no token payload");
                report.failed.push(name);
                continue;
            };
            match Self::open_with(&old_key, token) {
                Ok(v) => staged.push((name, v)),
                Err(e) => {
                    warn!("rotation: cannot decrypt {name} with old key: {e}");
                    report.failed.push(name);
                }
            }
        }

        let new_key = self.derive_key(new)?;

        // Phase 2: rewrite the staged set under the new key.
        for (name, value) in staged {
            let path = self.path_for(&name);
            match self.write_encrypted(&new_key, &path, &value) {
                Ok(()) => report.rotated.push(name),
                Err(e) => {
                    warn!("rotation: failed to re-encrypt {name}: {e}");
                    report.failed.push(name);
                }
            }
        }

        *self.key.write().expect("key lock poisoned") = Some(new_key);
        Ok(report)
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn read_json(&self, path: &Path, name: &str) -> StorageResult<Value> {
        let mut buf = String::new();
        File::open(path)?.read_to_string(&mut buf)?;
        serde_json::from_str(&buf).map_err(|e| StorageError::CorruptFile {
            name: name.into(),
            detail: e.to_string(),
        })
    }

    /// Names of candidate data files directly under the root: `*.json`,
    /// dotfiles excluded. The layout is flat by contract — nothing in this
    /// store writes subdirectories, and the sweep and rotation deliberately
    /// do not recurse into any a caller might create.
    fn data_file_names(&self) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !name.ends_with(".json") {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }
}

fn is_encrypted(record: &Value) -> bool {
    record
        .get("encrypted")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn crypto_to_storage(e: CryptoError) -> StorageError {
    StorageError::DecryptionFailure(e.to_string())
}
