//! Password-to-key derivation.
//!
//! A single PBKDF2-HMAC-SHA256 invocation serves two independent purposes:
//! the at-rest master key (per-installation salt) and private-key passphrase
//! wrapping (per-key salt). The salts never overlap, so the derivations stay
//! domain-separated without extra machinery.

use sha2::Sha256;

/// PBKDF2 iteration count for both master-password and passphrase derivation.
pub const KDF_ITERATIONS: u32 = 100_000;
/// Derived key size in bytes.
pub const KDF_OUTPUT_SIZE: usize = 32;

/// Derives a 32-byte key from a password and salt via PBKDF2-HMAC-SHA256.
pub fn pbkdf2_sha256(password: &str, salt: &[u8]) -> [u8; KDF_OUTPUT_SIZE] {
    let mut out = [0u8; KDF_OUTPUT_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, KDF_ITERATIONS, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_inputs() {
        let a = pbkdf2_sha256("hunter2", b"0123456789abcdef");
        let b = pbkdf2_sha256("hunter2", b"0123456789abcdef");
        assert_eq!(a, b);
    }

    #[test]
    fn salt_changes_output() {
        let a = pbkdf2_sha256("hunter2", b"0123456789abcdef");
        let b = pbkdf2_sha256("hunter2", b"fedcba9876543210");
        assert_ne!(a, b);
    }

    #[test]
    fn password_changes_output() {
        let a = pbkdf2_sha256("hunter2", b"0123456789abcdef");
        let b = pbkdf2_sha256("hunter3", b"0123456789abcdef");
        assert_ne!(a, b);
    }
}
