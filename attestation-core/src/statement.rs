//! The canonical statement an authority signs for an image.
//!
//! Shape (Atomic container signature format):
//!
//! ```text
//! {"critical":{"identity":{"docker-reference":"<repo>"},
//!              "image":{"docker-manifest-digest":"sha256:..."},
//!              "type":"atomic container signature"},
//!  "optional":{...}}
//! ```
//!
//! `optional` is left out when empty. The serialized bytes are what gets
//! signed, so [`CanonicalStatement::to_bytes`] must be stable.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::reference::{DigestReference, ReferenceError};
use crate::serialization::{to_canonical_json, SerializationError};

/// Statement type carried in `critical.type`.
pub const ATOMIC_CONTAINER_SIG_TYPE: &str = "atomic container signature";

#[derive(Debug, Error)]
pub enum StatementError {
    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] SerializationError),
}

/// Signed statement binding a repository to a content digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalStatement {
    pub critical: Critical,

    /// Free-form annotations, carried through unmodified.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub optional: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critical {
    pub identity: Identity,
    pub image: Image,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "docker-reference")]
    pub docker_reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    #[serde(rename = "docker-manifest-digest")]
    pub docker_manifest_digest: String,
}

impl CanonicalStatement {
    /// Build the statement for a digest-qualified image reference.
    pub fn build<I, K, V>(image_reference: &str, optional: I) -> Result<Self, StatementError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut builder = StatementBuilder::new(image_reference);
        for (key, value) in optional {
            builder = builder.optional(key, value);
        }
        builder.build()
    }

    pub fn for_reference(reference: &DigestReference) -> Self {
        Self {
            critical: Critical {
                identity: Identity {
                    docker_reference: reference.repository().to_string(),
                },
                image: Image {
                    docker_manifest_digest: reference.digest().to_string(),
                },
                kind: ATOMIC_CONTAINER_SIG_TYPE.to_string(),
            },
            optional: BTreeMap::new(),
        }
    }

    /// Serialize to the exact bytes that are signed and verified.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
        to_canonical_json(self)
    }

    /// SHA-256 of the canonical bytes, hex encoded. Safe to log.
    pub fn fingerprint(&self) -> Result<String, SerializationError> {
        Ok(hex::encode(Sha256::digest(self.to_bytes()?)))
    }
}

/// Builder for [`CanonicalStatement`].
pub struct StatementBuilder {
    image_reference: String,
    optional: BTreeMap<String, String>,
}

impl StatementBuilder {
    pub fn new(image_reference: impl Into<String>) -> Self {
        Self {
            image_reference: image_reference.into(),
            optional: BTreeMap::new(),
        }
    }

    pub fn optional(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.optional.insert(key.into(), value.into());
        self
    }

    /// Validate the reference and build the statement.
    pub fn build(self) -> Result<CanonicalStatement, StatementError> {
        let reference = DigestReference::parse(&self.image_reference)?;
        let mut statement = CanonicalStatement::for_reference(&reference);
        statement.optional = self.optional;
        Ok(statement)
    }
}
