//! Signing defaults shared by every sign and verify call.
//!
//! The defaults are a plain value: build one at startup (from
//! [`SigningDefaults::STANDARD`] or a deserialized [`SigningConfig`]) and hand
//! it to an [`Attestor`](crate::Attestor). There is no global setter.

use pgp::crypto::hash::HashAlgorithm;
use pgp::crypto::sym::SymmetricKeyAlgorithm;
use pgp::types::CompressionAlgorithm;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// RSA modulus size used when generating authority keys.
pub const RSA_BITS: u32 = 2048;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unsupported hash algorithm: {0}")]
    UnsupportedHashAlgorithm(String),

    #[error("Unknown symmetric cipher: {0}")]
    UnknownCipher(String),

    #[error("Unknown compression algorithm: {0}")]
    UnknownCompression(String),

    #[error("RSA key size {0} is below the 2048 bit minimum")]
    RsaKeyTooSmall(u32),

    #[error("Invalid configuration document: {0}")]
    Parse(String),
}

/// Algorithm choices for signing, verification and key generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningDefaults {
    pub(crate) hash: HashAlgorithm,
    pub(crate) cipher: SymmetricKeyAlgorithm,
    pub(crate) compression: CompressionAlgorithm,
    pub(crate) rsa_bits: u32,
}

impl SigningDefaults {
    /// SHA-256, AES-256, ZLIB, RSA-2048.
    ///
    /// ZLIB matches what deployed verifiers emit and expect. For raw DEFLATE
    /// resolve a [`SigningConfig`] with `compression: "ZIP"`.
    pub const STANDARD: SigningDefaults = SigningDefaults {
        hash: HashAlgorithm::SHA2_256,
        cipher: SymmetricKeyAlgorithm::AES256,
        compression: CompressionAlgorithm::ZLIB,
        rsa_bits: RSA_BITS,
    };

    /// Resolve a named configuration into algorithm identifiers.
    pub fn from_config(config: &SigningConfig) -> Result<Self, ConfigError> {
        let hash = hash_by_name(&config.hash)?;

        let cipher = match normalize(&config.cipher).as_str() {
            "AES128" => SymmetricKeyAlgorithm::AES128,
            "AES192" => SymmetricKeyAlgorithm::AES192,
            "AES256" => SymmetricKeyAlgorithm::AES256,
            _ => return Err(ConfigError::UnknownCipher(config.cipher.clone())),
        };

        let compression = match normalize(&config.compression).as_str() {
            "NONE" | "UNCOMPRESSED" => CompressionAlgorithm::Uncompressed,
            "ZIP" | "DEFLATE" => CompressionAlgorithm::ZIP,
            "ZLIB" => CompressionAlgorithm::ZLIB,
            _ => return Err(ConfigError::UnknownCompression(config.compression.clone())),
        };

        if config.rsa_bits < RSA_BITS {
            return Err(ConfigError::RsaKeyTooSmall(config.rsa_bits));
        }

        Ok(Self {
            hash,
            cipher,
            compression,
            rsa_bits: config.rsa_bits,
        })
    }

    /// Parse a JSON [`SigningConfig`] document and resolve it.
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        let config: SigningConfig =
            serde_json::from_str(document).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_config(&config)
    }

    pub fn hash(&self) -> HashAlgorithm {
        self.hash
    }

    pub fn cipher(&self) -> SymmetricKeyAlgorithm {
        self.cipher
    }

    pub fn compression(&self) -> CompressionAlgorithm {
        self.compression
    }

    pub fn rsa_bits(&self) -> u32 {
        self.rsa_bits
    }
}

impl Default for SigningDefaults {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Human-editable form of [`SigningDefaults`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SigningConfig {
    pub hash: String,
    pub cipher: String,
    pub compression: String,
    pub rsa_bits: u32,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            hash: "SHA256".to_string(),
            cipher: "AES256".to_string(),
            compression: "ZLIB".to_string(),
            rsa_bits: RSA_BITS,
        }
    }
}

/// Map a hash name to an algorithm acceptable for attestation signatures.
///
/// MD5, SHA-1 and RIPEMD-160 are deliberately absent.
pub fn hash_by_name(name: &str) -> Result<HashAlgorithm, ConfigError> {
    match normalize(name).as_str() {
        "SHA224" => Ok(HashAlgorithm::SHA2_224),
        "SHA256" => Ok(HashAlgorithm::SHA2_256),
        "SHA384" => Ok(HashAlgorithm::SHA2_384),
        "SHA512" => Ok(HashAlgorithm::SHA2_512),
        _ => Err(ConfigError::UnsupportedHashAlgorithm(name.to_string())),
    }
}

/// Whether `hash` may be used to sign an attestation.
pub(crate) fn is_signing_hash(hash: HashAlgorithm) -> bool {
    matches!(
        hash,
        HashAlgorithm::SHA2_224
            | HashAlgorithm::SHA2_256
            | HashAlgorithm::SHA2_384
            | HashAlgorithm::SHA2_512
    )
}

fn normalize(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .collect::<String>()
        .to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_standard() {
        let defaults = SigningDefaults::from_config(&SigningConfig::default()).unwrap();
        assert_eq!(defaults, SigningDefaults::STANDARD);
        assert_eq!(SigningDefaults::default().rsa_bits(), 2048);
    }

    #[test]
    fn test_hash_names() {
        assert_eq!(hash_by_name("sha-256").unwrap(), HashAlgorithm::SHA2_256);
        assert_eq!(hash_by_name("SHA512").unwrap(), HashAlgorithm::SHA2_512);
        assert!(matches!(
            hash_by_name("MD5"),
            Err(ConfigError::UnsupportedHashAlgorithm(_))
        ));
        assert!(matches!(
            hash_by_name("sha1"),
            Err(ConfigError::UnsupportedHashAlgorithm(_))
        ));
    }

    #[test]
    fn test_from_json() {
        let defaults = SigningDefaults::from_json(
            r#"{"hash": "SHA384", "cipher": "aes128", "compression": "deflate", "rsaBits": 3072}"#,
        )
        .unwrap();
        assert_eq!(defaults.hash(), HashAlgorithm::SHA2_384);
        assert_eq!(defaults.cipher(), SymmetricKeyAlgorithm::AES128);
        assert_eq!(defaults.compression(), CompressionAlgorithm::ZIP);
        assert_eq!(defaults.rsa_bits(), 3072);

        // Missing fields fall back to the standard values
        let partial = SigningDefaults::from_json(r#"{"hash": "SHA512"}"#).unwrap();
        assert_eq!(partial.cipher(), SymmetricKeyAlgorithm::AES256);
    }

    #[test]
    fn test_rejects_bad_config() {
        let config = SigningConfig {
            rsa_bits: 1024,
            ..SigningConfig::default()
        };
        assert_eq!(
            SigningDefaults::from_config(&config),
            Err(ConfigError::RsaKeyTooSmall(1024))
        );

        let config = SigningConfig {
            cipher: "3DES".to_string(),
            ..SigningConfig::default()
        };
        assert!(matches!(
            SigningDefaults::from_config(&config),
            Err(ConfigError::UnknownCipher(_))
        ));

        assert!(matches!(
            SigningDefaults::from_json("not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
