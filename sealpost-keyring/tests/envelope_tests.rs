//! Envelope protocol integration tests: hybrid encryption, multi-recipient
//! sealing, and the failure-tolerant decrypt search.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use pretty_assertions::assert_eq;
use sealpost_keyring::{
    create_armor, parse_armor, ArmorKind, KeyStore, KeyringError, MessageEnvelope,
    ENVELOPE_VERSION,
};
use sealpost_storage::SecureStore;
use tempfile::TempDir;

const TEST_BITS: usize = 1024;
const MASTER: &str = "master password";

fn open_unlocked(dir: &TempDir) -> KeyStore {
    let store = SecureStore::open(dir.path()).unwrap();
    let keys = KeyStore::open(store).unwrap();
    keys.unlock(MASTER).unwrap();
    keys
}

fn generate(keys: &KeyStore, name: &str, passphrase: &str) -> String {
    keys.generate_key(name, &format!("{}@example.com", name.to_lowercase()), passphrase, Some(TEST_BITS))
        .unwrap()
}

fn unarmor_envelope(armored: &str) -> MessageEnvelope {
    let (label, payload) = parse_armor(armored).unwrap();
    assert_eq!(label, "MESSAGE");
    serde_json::from_slice(&STANDARD.decode(payload).unwrap()).unwrap()
}

// ── Round trips ──────────────────────────────────────────────────────

#[test]
fn single_recipient_round_trip() {
    let dir = TempDir::new().unwrap();
    let keys = open_unlocked(&dir);
    let fp = generate(&keys, "Alice", "secret");

    let armored = keys.encrypt_message("hello, sealed world", &[&fp]).unwrap();
    assert!(armored.starts_with("-----BEGIN PGP MESSAGE-----"));

    let plaintext = keys.decrypt_message(&armored, "secret").unwrap();
    assert_eq!(plaintext, "hello, sealed world");
}

#[test]
fn multi_recipient_body_is_encrypted_once() {
    let dir = TempDir::new().unwrap();
    let keys = open_unlocked(&dir);
    let alice = generate(&keys, "Alice", "alice pw");
    let bob = generate(&keys, "Bob", "bob pw");

    let armored = keys.encrypt_message("shared note", &[&alice, &bob]).unwrap();

    let envelope = unarmor_envelope(&armored);
    assert_eq!(envelope.version, ENVELOPE_VERSION);
    assert_eq!(envelope.encrypted_keys.len(), 2);
    assert_ne!(envelope.encrypted_keys[0], envelope.encrypted_keys[1]);
    // One body ciphertext, however many recipients.
    assert!(!envelope.encrypted_message.is_empty());

    // Each recipient opens it independently with their own passphrase.
    assert_eq!(keys.decrypt_message(&armored, "alice pw").unwrap(), "shared note");
    assert_eq!(keys.decrypt_message(&armored, "bob pw").unwrap(), "shared note");
}

#[test]
fn cross_store_round_trip() {
    let alice_dir = TempDir::new().unwrap();
    let bob_dir = TempDir::new().unwrap();
    let alice = open_unlocked(&alice_dir);
    let bob = open_unlocked(&bob_dir);

    let bob_fp = generate(&bob, "Bob", "bob pw");
    generate(&alice, "Alice", "alice pw");
    alice.import_key(&bob.export_public_key(&bob_fp).unwrap()).unwrap();

    let armored = alice.encrypt_message("for bob only", &[&bob_fp]).unwrap();
    assert_eq!(bob.decrypt_message(&armored, "bob pw").unwrap(), "for bob only");

    // Alice's own private key unlocks fine but does not match the envelope.
    let err = alice.decrypt_message(&armored, "alice pw").unwrap_err();
    match err {
        KeyringError::DecryptionFailure(msg) => assert!(msg.contains("none matched"), "{msg}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unicode_and_empty_bodies_round_trip() {
    let dir = TempDir::new().unwrap();
    let keys = open_unlocked(&dir);
    let fp = generate(&keys, "Alice", "secret");

    for body in ["", "déjà vu ☂ 日本語", "line one\nline two\n"] {
        let armored = keys.encrypt_message(body, &[&fp]).unwrap();
        assert_eq!(keys.decrypt_message(&armored, "secret").unwrap(), body);
    }
}

// ── Encrypt failures ─────────────────────────────────────────────────

#[test]
fn empty_recipient_list_is_rejected() {
    let dir = TempDir::new().unwrap();
    let keys = open_unlocked(&dir);

    let err = keys.encrypt_message("hello", &[]).unwrap_err();
    assert!(matches!(err, KeyringError::NoRecipients));
}

#[test]
fn unknown_recipient_fails_before_any_encryption() {
    let dir = TempDir::new().unwrap();
    let keys = open_unlocked(&dir);
    let fp = generate(&keys, "Alice", "secret");

    let err = keys.encrypt_message("hello", &[&fp, "AAAA BBBB"]).unwrap_err();
    match err {
        KeyringError::KeyNotFound(missing) => assert_eq!(missing, "AAAA BBBB"),
        other => panic!("unexpected error: {other}"),
    }
}

// ── Decrypt failures ─────────────────────────────────────────────────

#[test]
fn non_message_armor_is_rejected() {
    let dir = TempDir::new().unwrap();
    let keys = open_unlocked(&dir);
    let fp = generate(&keys, "Alice", "secret");

    let public_block = keys.export_public_key(&fp).unwrap();
    let err = keys.decrypt_message(&public_block, "secret").unwrap_err();
    assert!(matches!(err, KeyringError::InvalidMessageFormat(_)));

    let err = keys.decrypt_message("just some text", "secret").unwrap_err();
    assert!(matches!(err, KeyringError::InvalidArmorFormat(_)));
}

#[test]
fn undecodable_envelope_is_rejected() {
    let dir = TempDir::new().unwrap();
    let keys = open_unlocked(&dir);
    generate(&keys, "Alice", "secret");

    let bogus = create_armor(&STANDARD.encode(b"{\"not\": \"an envelope\"}"), ArmorKind::Message);
    let err = keys.decrypt_message(&bogus, "secret").unwrap_err();
    assert!(matches!(err, KeyringError::InvalidMessageFormat(_)));
}

#[test]
fn wrong_passphrase_reports_zero_unlockable_keys() {
    let dir = TempDir::new().unwrap();
    let keys = open_unlocked(&dir);
    let fp = generate(&keys, "Alice", "secret");

    let armored = keys.encrypt_message("hello", &[&fp]).unwrap();
    let err = keys.decrypt_message(&armored, "not the passphrase").unwrap_err();
    match err {
        KeyringError::DecryptionFailure(msg) => {
            assert!(msg.contains("0 of 1"), "{msg}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn empty_private_ring_is_reported_distinctly() {
    let sender_dir = TempDir::new().unwrap();
    let reader_dir = TempDir::new().unwrap();
    let sender = open_unlocked(&sender_dir);
    let reader = open_unlocked(&reader_dir);

    let fp = generate(&sender, "Alice", "secret");
    reader.import_key(&sender.export_public_key(&fp).unwrap()).unwrap();

    let armored = sender.encrypt_message("hello", &[&fp]).unwrap();
    let err = reader.decrypt_message(&armored, "whatever").unwrap_err();
    match err {
        KeyringError::DecryptionFailure(msg) => {
            assert!(msg.contains("no private keys available"), "{msg}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn tampered_body_fails_after_key_recovery() {
    let dir = TempDir::new().unwrap();
    let keys = open_unlocked(&dir);
    let fp = generate(&keys, "Alice", "secret");

    let armored = keys.encrypt_message("hello hello hello", &[&fp]).unwrap();
    let mut envelope = unarmor_envelope(&armored);

    let mut body = STANDARD.decode(&envelope.encrypted_message).unwrap();
    body.truncate(body.len() - 1);
    envelope.encrypted_message = STANDARD.encode(body);

    let tampered = create_armor(
        &STANDARD.encode(serde_json::to_vec(&envelope).unwrap()),
        ArmorKind::Message,
    );
    let err = keys.decrypt_message(&tampered, "secret").unwrap_err();
    assert!(matches!(err, KeyringError::DecryptionFailure(_)));
}

#[test]
fn foreign_wrapped_keys_are_skipped_not_fatal() {
    let dir = TempDir::new().unwrap();
    let keys = open_unlocked(&dir);
    let fp = generate(&keys, "Alice", "secret");

    let armored = keys.encrypt_message("hello", &[&fp]).unwrap();
    let mut envelope = unarmor_envelope(&armored);
    // An entry our key cannot unwrap, ahead of the real one.
    envelope.encrypted_keys.insert(0, STANDARD.encode([0u8; 128]));

    let rewrapped = create_armor(
        &STANDARD.encode(serde_json::to_vec(&envelope).unwrap()),
        ArmorKind::Message,
    );
    assert_eq!(keys.decrypt_message(&rewrapped, "secret").unwrap(), "hello");
}
