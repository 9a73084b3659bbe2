//! Attestation facade.
//!
//! [`Attestor`] is the only surface the admission policy and the metadata store
//! need: it builds the canonical statement for an image and signs or verifies
//! it, hiding key parsing and OpenPGP plumbing.

use pgp::packet::PublicKey;
use std::fmt;
use thiserror::Error;

use crate::config::{ConfigError, SigningConfig, SigningDefaults};
use crate::keys::{load_public_key, KeyError, KeyPair};
use crate::reference::ReferenceError;
use crate::signer::{self, SignError};
use crate::statement::{CanonicalStatement, StatementError};
use crate::types::{ArmoredSignature, PgpAttestation};
use crate::verifier::{self, VerifyError};

/// Errors that can occur while creating or verifying an attestation.
#[derive(Debug, Error)]
pub enum AttestationError {
    #[error("Loading key: {0}")]
    Key(#[from] KeyError),

    #[error("Building statement: {0}")]
    Statement(#[from] StatementError),

    #[error("Signing attestation for {image}: {source}")]
    Sign {
        image: String,
        #[source]
        source: SignError,
    },

    #[error("Verifying attestation for {image}: {source}")]
    Verify {
        image: String,
        #[source]
        source: VerifyError,
    },

    #[error("Verification requires a public key")]
    MissingPublicKey,

    #[error("No attestations to verify for {0}")]
    NoAttestations(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Coarse failure category, for operator diagnostics and policy decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedKeyEncoding,
    WrongKeyType,
    UnsupportedKeyPacket,
    MissingPrivateKey,
    MissingPublicKey,
    NotFullyQualified,
    UnsupportedHashAlgorithm,
    MalformedSignatureEncoding,
    MalformedArmor,
    BadOrMissingSignature,
    ContentMismatch,
    IdentityConstruction,
    SigningFailed,
    Serialization,
    KeyGeneration,
    Configuration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl AttestationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AttestationError::Key(e) => match e {
                KeyError::MalformedKeyEncoding(_) => ErrorKind::MalformedKeyEncoding,
                KeyError::WrongKeyType { .. } => ErrorKind::WrongKeyType,
                KeyError::UnsupportedKeyPacket(_) => ErrorKind::UnsupportedKeyPacket,
                KeyError::Generation(_) => ErrorKind::KeyGeneration,
            },
            AttestationError::Statement(e) => match e {
                StatementError::Reference(ReferenceError::NotFullyQualified { .. }) => {
                    ErrorKind::NotFullyQualified
                }
                StatementError::Serialization(_) => ErrorKind::Serialization,
            },
            AttestationError::Sign { source, .. } => match source {
                SignError::MissingPrivateKey => ErrorKind::MissingPrivateKey,
                SignError::MissingPublicKey => ErrorKind::MissingPublicKey,
                SignError::UnsupportedHashAlgorithm(_) => ErrorKind::UnsupportedHashAlgorithm,
                SignError::Identity(_) => ErrorKind::IdentityConstruction,
                SignError::Signing(_) | SignError::Armor(_) => ErrorKind::SigningFailed,
            },
            AttestationError::Verify { source, .. } => match source {
                VerifyError::MalformedSignatureEncoding(_) => ErrorKind::MalformedSignatureEncoding,
                VerifyError::MalformedArmor(_) => ErrorKind::MalformedArmor,
                VerifyError::BadOrMissingSignature(_) => ErrorKind::BadOrMissingSignature,
                VerifyError::ContentMismatch { .. } => ErrorKind::ContentMismatch,
            },
            AttestationError::MissingPublicKey => ErrorKind::MissingPublicKey,
            AttestationError::NoAttestations(_) => ErrorKind::BadOrMissingSignature,
            AttestationError::Config(ConfigError::UnsupportedHashAlgorithm(_)) => {
                ErrorKind::UnsupportedHashAlgorithm
            }
            AttestationError::Config(_) => ErrorKind::Configuration,
        }
    }
}

/// Creates and verifies image attestations under fixed signing defaults.
///
/// Holds no mutable state; share it freely across threads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Attestor {
    defaults: SigningDefaults,
}

impl Attestor {
    pub fn new(defaults: SigningDefaults) -> Self {
        Self { defaults }
    }

    /// Build from a named configuration, e.g. one read at startup.
    pub fn from_config(config: &SigningConfig) -> Result<Self, AttestationError> {
        Ok(Self::new(SigningDefaults::from_config(config)?))
    }

    pub fn defaults(&self) -> &SigningDefaults {
        &self.defaults
    }

    /// Sign the canonical statement for `image` with `key_pair`.
    pub fn create_attestation<I, K, V>(
        &self,
        image: &str,
        optional: I,
        key_pair: &KeyPair,
    ) -> Result<ArmoredSignature, AttestationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let statement = CanonicalStatement::build(image, optional)?;
        let message = statement.to_bytes().map_err(StatementError::from)?;

        let signature =
            signer::sign(&message, key_pair, &self.defaults).map_err(|source| {
                AttestationError::Sign {
                    image: image.to_string(),
                    source,
                }
            })?;

        tracing::debug!(
            "Created attestation for {} (statement {})",
            image,
            statement.fingerprint().unwrap_or_default()
        );
        Ok(signature)
    }

    /// Check `signature` attests `image` under the base64 armored `public_key`.
    ///
    /// The expected statement is rebuilt from the claimed `image`, never taken
    /// from the signature itself.
    pub fn verify_attestation<I, K, V>(
        &self,
        image: &str,
        optional: I,
        public_key: &str,
        signature: &ArmoredSignature,
    ) -> Result<(), AttestationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let public_key = self.load_verification_key(public_key)?;
        let statement = CanonicalStatement::build(image, optional)?;
        self.verify_statement(image, &statement, &public_key, signature)
    }

    /// Succeed with the first stored attestation for `image` that verifies.
    ///
    /// Stored attestations carry no optional metadata. When none verifies the
    /// last failure is returned.
    pub fn verify_any<'a>(
        &self,
        image: &str,
        public_key: &str,
        attestations: &'a [PgpAttestation],
    ) -> Result<&'a PgpAttestation, AttestationError> {
        let public_key = self.load_verification_key(public_key)?;
        let statement = CanonicalStatement::build(image, Vec::<(String, String)>::new())?;

        let mut last_error = AttestationError::NoAttestations(image.to_string());
        for attestation in attestations {
            match self.verify_statement(image, &statement, &public_key, &attestation.signature) {
                Ok(()) => return Ok(attestation),
                Err(e) => {
                    tracing::debug!(
                        "Attestation {} for {} rejected: {}",
                        attestation.occurrence_id,
                        image,
                        e.kind()
                    );
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    fn load_verification_key(&self, public_key: &str) -> Result<PublicKey, AttestationError> {
        if public_key.trim().is_empty() {
            return Err(AttestationError::MissingPublicKey);
        }
        Ok(load_public_key(public_key)?)
    }

    fn verify_statement(
        &self,
        image: &str,
        statement: &CanonicalStatement,
        public_key: &PublicKey,
        signature: &ArmoredSignature,
    ) -> Result<(), AttestationError> {
        let expected = statement.to_bytes().map_err(StatementError::from)?;
        verifier::verify(public_key, signature, &expected).map_err(|source| {
            AttestationError::Verify {
                image: image.to_string(),
                source,
            }
        })?;

        tracing::debug!("Verified attestation for {}", image);
        Ok(())
    }
}
