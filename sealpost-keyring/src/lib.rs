//! Key management and hybrid message encryption for sealpost.
//!
//! The [`KeyStore`] owns two fingerprint-indexed key rings (public and
//! private) persisted through the at-rest storage layer, and implements the
//! envelope protocol on top of them: a message body is AES-256-CBC encrypted
//! exactly once under a fresh session key, and only that small key is
//! RSA-OAEP wrapped once per recipient. Everything on the wire travels as
//! ASCII armor.
//!
//! # Trust model
//!
//! There is no certificate authority and no keyserver. Keys generated locally
//! carry `ultimate` trust; imported keys carry `unknown`. Fingerprints are
//! SHA-256 derived from the public key PEM and treated as collision-free.

mod armor;
mod envelope;
mod error;
mod record;
mod store;

pub use armor::{create_armor, parse_armor, ArmorKind};
pub use envelope::{MessageEnvelope, ENVELOPE_VERSION};
pub use error::{KeyringError, KeyringResult};
pub use record::{
    fingerprint, key_id, KeyRing, PrivateKeyMaterial, PrivateKeyRecord, PublicKeyRecord,
    TrustLabel,
};
pub use store::{KeySummary, KeyStore, DEFAULT_KEY_BITS, PRIVATE_RING_FILE, PUBLIC_RING_FILE};
