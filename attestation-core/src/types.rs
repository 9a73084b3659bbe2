//! Core types shared by the signer, verifier and metadata store.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Base64 text wrapping an ASCII-armored OpenPGP signed message.
///
/// This is the artifact persisted by the metadata store; once produced it is
/// opaque to this crate.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArmoredSignature(String);

impl ArmoredSignature {
    /// Wrap stored signature text.
    pub fn new(encoded: impl Into<String>) -> Self {
        ArmoredSignature(encoded.into())
    }

    /// Base64-encode freshly armored signature bytes.
    pub fn from_armored(armored: &[u8]) -> Self {
        ArmoredSignature(STANDARD.encode(armored))
    }

    /// Undo the base64 layer, yielding the ASCII armor.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.0.trim())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for ArmoredSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArmoredSignature({} bytes)", self.0.len())
    }
}

impl From<String> for ArmoredSignature {
    fn from(encoded: String) -> Self {
        ArmoredSignature(encoded)
    }
}

/// Authority whose approval is recorded as attestations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationAuthority {
    pub name: String,
    /// Where the authority's note lives, e.g. `projects/my-project`.
    pub note_reference: String,
    /// Base64 armored public key used to check this authority's attestations.
    pub public_key_data: String,
}

impl AttestationAuthority {
    /// Fully qualified note name, `<note_reference>/notes/<name>`.
    pub fn note_name(&self) -> String {
        format!("{}/notes/{}", self.note_reference.trim_end_matches('/'), self.name)
    }
}

/// Package vulnerability reported for an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    pub severity: String,
    pub has_fix_available: bool,
    pub cve: String,
}

/// A stored attestation as listed by the metadata store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PgpAttestation {
    pub signature: ArmoredSignature,
    pub key_id: String,
    /// Store-assigned record id.
    pub occurrence_id: String,
}

/// Metadata store record describing an authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub name: String,
    pub human_readable_name: String,
}

/// Metadata store record tying an attestation to an image and a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub name: String,
    pub resource_url: String,
    pub note_name: String,
    pub attestation: PgpAttestation,
    pub create_time: DateTime<Utc>,
}

/// Resource URL under which the metadata store files an image.
pub fn resource_url(image: &str) -> String {
    format!("https://{image}")
}
