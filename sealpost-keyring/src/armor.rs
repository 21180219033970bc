//! ASCII armor wire format.
//!
//! ```text
//! -----BEGIN PGP <TYPE>-----
//!
//! <base64 payload, 64 characters per line>
//! -----END PGP <TYPE>-----
//! ```
//!
//! The decoder is deliberately forgiving about surroundings: it scans for the
//! first BEGIN marker and the first END marker after it, and ignores blank
//! lines in between, so armored blocks survive being pasted into email
//! bodies. Everything else is a hard [`KeyringError::InvalidArmorFormat`].

use crate::error::{KeyringError, KeyringResult};

const BEGIN_PREFIX: &str = "-----BEGIN PGP ";
const END_PREFIX: &str = "-----END PGP ";
const MARKER_SUFFIX: &str = "-----";
const WRAP_WIDTH: usize = 64;

/// Known armor block types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArmorKind {
    PublicKeyBlock,
    PrivateKeyBlock,
    Message,
}

impl ArmorKind {
    /// The `<TYPE>` text between the marker dashes.
    pub fn label(&self) -> &'static str {
        match self {
            ArmorKind::PublicKeyBlock => "PUBLIC KEY BLOCK",
            ArmorKind::PrivateKeyBlock => "PRIVATE KEY BLOCK",
            ArmorKind::Message => "MESSAGE",
        }
    }

    /// Parses a label back into a known kind.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "PUBLIC KEY BLOCK" => Some(ArmorKind::PublicKeyBlock),
            "PRIVATE KEY BLOCK" => Some(ArmorKind::PrivateKeyBlock),
            "MESSAGE" => Some(ArmorKind::Message),
            _ => None,
        }
    }
}

/// Wraps a base64 payload in armor markers, 64 characters per line.
pub fn create_armor(payload: &str, kind: ArmorKind) -> String {
    let label = kind.label();
    let mut out = String::with_capacity(payload.len() + payload.len() / WRAP_WIDTH + 80);
    out.push_str(BEGIN_PREFIX);
    out.push_str(label);
    out.push_str(MARKER_SUFFIX);
    out.push_str("\n\n");

    let bytes = payload.as_bytes();
    for (i, chunk) in bytes.chunks(WRAP_WIDTH).enumerate() {
        if i > 0 {
            out.push('\n');
        }
        // Payload is base64, always valid UTF-8 at any byte boundary.
        out.push_str(std::str::from_utf8(chunk).expect("base64 payload"));
    }

    out.push('\n');
    out.push_str(END_PREFIX);
    out.push_str(label);
    out.push_str(MARKER_SUFFIX);
    out
}

/// Extracts `(label, payload)` from an armored block.
///
/// The payload is the concatenation of all non-empty lines strictly between
/// the first BEGIN marker and the first END marker that follows it.
pub fn parse_armor(text: &str) -> KeyringResult<(String, String)> {
    let lines: Vec<&str> = text.trim().lines().collect();

    let mut label = None;
    let mut begin_idx = None;
    let mut end_idx = None;

    for (i, line) in lines.iter().enumerate() {
        let line = line.trim();
        if begin_idx.is_none() {
            // Both the prefix and the trailing dashes are required; a
            // truncated BEGIN line is ordinary text, not a marker.
            if let Some(ty) = line
                .strip_prefix(BEGIN_PREFIX)
                .and_then(|rest| rest.strip_suffix(MARKER_SUFFIX))
            {
                label = Some(ty.to_string());
                begin_idx = Some(i);
            }
        } else if line.starts_with(END_PREFIX) {
            end_idx = Some(i);
            break;
        }
    }

    let (Some(label), Some(begin), Some(end)) = (label, begin_idx, end_idx) else {
        return Err(KeyringError::InvalidArmorFormat(
            "missing BEGIN or END marker".into(),
        ));
    };

    let payload: String = lines[begin + 1..end]
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();

    Ok((label, payload))
}
