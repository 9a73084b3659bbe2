//! Digest-qualified image references.
//!
//! Attestations are only ever made over `registry/repository@sha256:<hex>`.
//! A tag can change what it points to, so tag-only references are rejected
//! here and must be resolved to a digest by the caller first.

use oci_distribution::Reference;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DIGEST_ALGORITHM: &str = "sha256";
const DIGEST_HEX_LEN: usize = 64;

const DOCKER_HUB_ALIAS: &str = "docker.io";
const DOCKER_HUB: &str = "index.docker.io";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("Image reference {reference:?} is not fully qualified: {reason}")]
    NotFullyQualified { reference: String, reason: String },
}

/// An image reference pinned to a content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DigestReference {
    repository: String,
    digest: String,
}

impl DigestReference {
    /// Parse `registry/repository[:tag]@sha256:<64 hex>`.
    ///
    /// The registry must be explicit and any tag is dropped.
    pub fn parse(reference: &str) -> Result<Self, ReferenceError> {
        let reject = |reason: &str| ReferenceError::NotFullyQualified {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        let (name, digest) = match reference.split('@').collect::<Vec<_>>()[..] {
            [name, digest] => (name, digest),
            [_] => return Err(reject("no digest; resolve the tag to a digest first")),
            _ => return Err(reject("more than one '@' separator")),
        };
        check_digest(digest).map_err(|reason| reject(&reason))?;

        let name = strip_tag(name);
        let (registry, repository) = match name.split_once('/') {
            Some((registry, repository)) if registry.contains('.') || registry.contains(':') => {
                (registry, repository)
            }
            _ => return Err(reject("the registry must be explicitly defined")),
        };

        let registry = if registry == DOCKER_HUB_ALIAS {
            DOCKER_HUB
        } else {
            registry
        };
        if registry == DOCKER_HUB && !repository.contains('/') {
            return Err(reject("the full repository path is required (missing 'library')"));
        }

        let repository = format!("{registry}/{repository}");
        let parsed = Reference::from_str(&format!("{repository}@{digest}"))
            .map_err(|e| reject(&e.to_string()))?;
        if parsed.digest() != Some(digest) {
            return Err(reject("digest could not be recovered from the reference"));
        }

        Ok(Self {
            repository,
            digest: digest.to_string(),
        })
    }

    /// Repository path without tag or digest, e.g. `gcr.io/proj/img`.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Normalized digest, e.g. `sha256:ab12…`.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Hex portion of the digest.
    pub fn digest_hex(&self) -> &str {
        &self.digest[DIGEST_ALGORITHM.len() + 1..]
    }
}

impl FromStr for DigestReference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DigestReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.repository, self.digest)
    }
}

fn check_digest(digest: &str) -> Result<(), String> {
    let hex = digest
        .strip_prefix(DIGEST_ALGORITHM)
        .and_then(|rest| rest.strip_prefix(':'))
        .ok_or_else(|| format!("digest must start with {DIGEST_ALGORITHM}:"))?;

    if hex.len() != DIGEST_HEX_LEN {
        return Err(format!(
            "digest must have {DIGEST_HEX_LEN} hex characters, found {}",
            hex.len()
        ));
    }
    if !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return Err("digest must be lowercase hex".to_string());
    }
    Ok(())
}

/// Drop a `:tag` suffix from the last path component, leaving registry ports alone.
fn strip_tag(name: &str) -> &str {
    match name.rfind(':') {
        Some(colon) if !name[colon..].contains('/') && name[..colon].contains('/') => {
            &name[..colon]
        }
        _ => name,
    }
}
