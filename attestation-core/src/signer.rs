//! OpenPGP signing of canonical statements.

use chrono::{DateTime, SubsecRound, Utc};
use pgp::armor::{self, BlockType};
use pgp::crypto::hash::HashAlgorithm;
use pgp::crypto::sym::SymmetricKeyAlgorithm;
use pgp::packet::{
    KeyFlags, PublicKey, SecretKey, Signature, SignatureConfig, SignatureType, Subpacket,
    SubpacketData, UserId,
};
use pgp::types::{CompressionAlgorithm, PublicKeyTrait, SignedUser, Tag, Version};
use pgp::Message;
use smallvec::smallvec;
use thiserror::Error;

use crate::config::{is_signing_hash, SigningDefaults};
use crate::keys::KeyPair;
use crate::types::ArmoredSignature;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("Signing requires a private key")]
    MissingPrivateKey,

    #[error("Signing requires a public key to certify the signing identity")]
    MissingPublicKey,

    #[error("Unsupported hash algorithm: {0}")]
    UnsupportedHashAlgorithm(String),

    #[error("Could not construct signing identity: {0}")]
    Identity(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Armoring signature failed: {0}")]
    Armor(String),
}

/// Ephemeral identity a signature is made under.
///
/// Built fresh for every signature: an anonymous user id carrying a positive
/// self-certification that is primary, certify and sign capable, and names the
/// signing defaults as preferences. Building it also proves the public and
/// private halves belong together.
pub struct SigningIdentity<'a> {
    public_key: &'a PublicKey,
    secret_key: &'a SecretKey,
    user: SignedUser,
    hash: HashAlgorithm,
    compression: CompressionAlgorithm,
}

impl<'a> SigningIdentity<'a> {
    pub fn new(key_pair: &'a KeyPair, defaults: &SigningDefaults) -> Result<Self, SignError> {
        let secret_key = key_pair.private_key().ok_or(SignError::MissingPrivateKey)?;
        let public_key = key_pair.public_key().ok_or(SignError::MissingPublicKey)?;

        if !is_signing_hash(defaults.hash()) {
            return Err(SignError::UnsupportedHashAlgorithm(format!("{:?}", defaults.hash())));
        }

        if public_key.key_id() != secret_key.key_id() {
            return Err(SignError::Identity(
                "public key does not belong to the private key".to_string(),
            ));
        }

        let user_id = UserId::from_str(Version::New, "");
        let certification = self_certification(secret_key, defaults)
            .sign_certification(secret_key, String::new, Tag::UserId, &user_id)
            .map_err(|e| SignError::Identity(format!("self-certification failed: {e}")))?;
        let user = SignedUser::new(user_id, vec![certification]);
        user.verify(public_key)
            .map_err(|e| SignError::Identity(format!("self-certification does not verify: {e}")))?;

        Ok(Self {
            public_key,
            secret_key,
            user,
            hash: defaults.hash(),
            compression: defaults.compression(),
        })
    }

    pub fn public_key(&self) -> &PublicKey {
        self.public_key
    }

    /// The self-certified (anonymous) user id.
    pub fn user(&self) -> &SignedUser {
        &self.user
    }

    fn certification(&self) -> Option<&Signature> {
        self.user.signatures.first()
    }

    /// Creation time recorded in the self-certification.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.certification()?.created().copied()
    }

    pub fn preferred_hash(&self) -> Option<HashAlgorithm> {
        self.certification()?.preferred_hash_algs().first().copied()
    }

    pub fn preferred_symmetric(&self) -> Option<SymmetricKeyAlgorithm> {
        self.certification()?
            .preferred_symmetric_algs()
            .first()
            .copied()
    }

    /// Sign `message` and return it as an armored, base64-wrapped signed message.
    pub fn sign(&self, message: &[u8]) -> Result<ArmoredSignature, SignError> {
        let literal = Message::new_literal_bytes("", message);
        let signed = literal
            .sign(
                rand::thread_rng(),
                self.secret_key,
                String::new,
                self.hash,
            )
            .map_err(|e| SignError::Signing(e.to_string()))?;

        let signed = match self.compression {
            CompressionAlgorithm::Uncompressed => signed,
            algorithm => signed
                .compress(algorithm)
                .map_err(|e| SignError::Signing(format!("compression: {e}")))?,
        };

        // Armored as a SIGNATURE block, which is what existing verifiers expect
        let mut armored = Vec::new();
        armor::write(&signed, BlockType::Signature, &mut armored, None, true)
            .map_err(|e| SignError::Armor(e.to_string()))?;

        Ok(ArmoredSignature::from_armored(&armored))
    }
}

/// Positive certification config for the anonymous signing user id.
fn self_certification(secret_key: &SecretKey, defaults: &SigningDefaults) -> SignatureConfig {
    let mut flags = KeyFlags::default();
    flags.set_certify(true);
    flags.set_sign(true);

    let mut config = SignatureConfig::v4(
        SignatureType::CertPositive,
        secret_key.algorithm(),
        defaults.hash(),
    );
    config.hashed_subpackets = vec![
        Subpacket::regular(SubpacketData::SignatureCreationTime(
            Utc::now().trunc_subsecs(0),
        )),
        Subpacket::regular(SubpacketData::Issuer(secret_key.key_id())),
        Subpacket::regular(SubpacketData::IsPrimary(true)),
        Subpacket::regular(SubpacketData::KeyFlags(flags.into())),
        Subpacket::regular(SubpacketData::PreferredHashAlgorithms(smallvec![
            defaults.hash()
        ])),
        Subpacket::regular(SubpacketData::PreferredSymmetricAlgorithms(smallvec![
            defaults.cipher()
        ])),
        Subpacket::regular(SubpacketData::PreferredCompressionAlgorithms(smallvec![
            defaults.compression()
        ])),
    ];
    config
}

/// Sign `message` with a fresh identity built from `key_pair`.
pub fn sign(
    message: &[u8],
    key_pair: &KeyPair,
    defaults: &SigningDefaults,
) -> Result<ArmoredSignature, SignError> {
    let identity = SigningIdentity::new(key_pair, defaults)?;
    tracing::debug!(
        "Signing {} byte message with key {:?}",
        message.len(),
        identity.public_key().key_id()
    );
    identity.sign(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::tests::test_keys;
    use crate::keys::KeyPair;

    #[test]
    fn test_sign_produces_signature_armor() {
        let (keys, _) = test_keys();
        let pair = keys.key_pair().unwrap();

        let signature = sign(b"hello", &pair, &SigningDefaults::STANDARD).unwrap();
        let armored = String::from_utf8(signature.decode().unwrap()).unwrap();
        assert!(armored.starts_with("-----BEGIN PGP SIGNATURE-----"));
        assert!(armored.trim_end().ends_with("-----END PGP SIGNATURE-----"));
    }

    #[test]
    fn test_identity_self_certification() {
        let (keys, _) = test_keys();
        let pair = keys.key_pair().unwrap();

        let before = Utc::now().trunc_subsecs(0);
        let identity = SigningIdentity::new(&pair, &SigningDefaults::STANDARD).unwrap();
        assert!(identity.user().id.id().is_empty());
        assert_eq!(identity.user().signatures.len(), 1);

        let certification = &identity.user().signatures[0];
        assert_eq!(certification.typ(), SignatureType::CertPositive);
        assert_eq!(certification.hash_alg(), HashAlgorithm::SHA2_256);
        assert!(certification.is_primary());
        assert!(certification.key_flags().certify());
        assert!(certification.key_flags().sign());
        assert_eq!(certification.preferred_hash_algs(), &[HashAlgorithm::SHA2_256]);
        assert_eq!(
            certification.preferred_symmetric_algs(),
            &[SymmetricKeyAlgorithm::AES256]
        );
        assert_eq!(
            certification.issuer(),
            vec![&identity.public_key().key_id()]
        );

        let created = certification.created().copied().unwrap();
        assert!(created >= before && created <= Utc::now());
        assert_eq!(identity.created_at(), Some(created));
        assert_eq!(identity.preferred_hash(), Some(HashAlgorithm::SHA2_256));
        assert_eq!(identity.preferred_symmetric(), Some(SymmetricKeyAlgorithm::AES256));
    }

    #[test]
    fn test_identity_follows_defaults() {
        let (keys, _) = test_keys();
        let pair = keys.key_pair().unwrap();
        let defaults = SigningDefaults {
            hash: HashAlgorithm::SHA2_512,
            cipher: SymmetricKeyAlgorithm::AES128,
            ..SigningDefaults::STANDARD
        };

        let identity = SigningIdentity::new(&pair, &defaults).unwrap();
        let certification = &identity.user().signatures[0];
        assert_eq!(certification.hash_alg(), HashAlgorithm::SHA2_512);
        assert_eq!(identity.preferred_hash(), Some(HashAlgorithm::SHA2_512));
        assert_eq!(identity.preferred_symmetric(), Some(SymmetricKeyAlgorithm::AES128));
    }

    #[test]
    fn test_missing_keys() {
        let (keys, _) = test_keys();

        let verify_only = KeyPair::verifying(&keys.public_key).unwrap();
        assert!(matches!(
            sign(b"m", &verify_only, &SigningDefaults::STANDARD),
            Err(SignError::MissingPrivateKey)
        ));

        let private_only = KeyPair::from_encoded(&keys.private_key, "").unwrap();
        assert!(matches!(
            sign(b"m", &private_only, &SigningDefaults::STANDARD),
            Err(SignError::MissingPublicKey)
        ));
    }

    #[test]
    fn test_mismatched_halves() {
        let (keys, other) = test_keys();
        let mixed = KeyPair::from_encoded(&keys.private_key, &other.public_key).unwrap();

        assert!(matches!(
            sign(b"m", &mixed, &SigningDefaults::STANDARD),
            Err(SignError::Identity(_))
        ));
    }

    #[test]
    fn test_weak_hash_rejected() {
        let (keys, _) = test_keys();
        let pair = keys.key_pair().unwrap();
        let defaults = SigningDefaults {
            hash: HashAlgorithm::SHA1,
            ..SigningDefaults::STANDARD
        };

        assert!(matches!(
            sign(b"m", &pair, &defaults),
            Err(SignError::UnsupportedHashAlgorithm(_))
        ));
    }
}
