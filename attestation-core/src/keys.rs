//! Key material loading.
//!
//! Authority keys are stored (e.g. in a cluster secret) as base64 text wrapping
//! an ASCII-armored OpenPGP key block. Loading is: base64 decode, armor decode,
//! parse the first packet, then check it is the kind of key the caller asked for.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use pgp::armor::{self, BlockType, Dearmor};
use pgp::packet::{Packet, PacketParser, PublicKey, SecretKey};
use pgp::types::{PublicKeyTrait, SecretKeyTrait};
use pgp::{KeyType, SecretKeyParamsBuilder};
use serde::{Deserialize, Serialize};
use smallvec::smallvec;
use std::fmt;
use std::io::{Cursor, Read};
use thiserror::Error;

use crate::config::SigningDefaults;

/// Secret data key holding the armored public key.
pub const PUBLIC_KEY_FIELD: &str = "public";
/// Secret data key holding the armored private key.
pub const PRIVATE_KEY_FIELD: &str = "private";

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Malformed key encoding: {0}")]
    MalformedKeyEncoding(String),

    #[error("Wrong key type: expected {expected} key, found {found}")]
    WrongKeyType { expected: KeyKind, found: String },

    #[error("Unsupported key packet: {0}")]
    UnsupportedKeyPacket(String),

    #[error("Key generation failed: {0}")]
    Generation(String),
}

/// Which half of a key pair a blob is expected to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Public,
    Private,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Public => write!(f, "public"),
            KeyKind::Private => write!(f, "private"),
        }
    }
}

/// First packet of a decoded key block.
pub enum KeyPacket {
    Public(PublicKey),
    Private(SecretKey),
    /// Anything else; carries a short description of what was found.
    Unsupported(&'static str),
}

impl KeyPacket {
    fn describe(&self) -> &'static str {
        match self {
            KeyPacket::Public(_) => "public key packet",
            KeyPacket::Private(_) => "private key packet",
            KeyPacket::Unsupported(what) => what,
        }
    }
}

/// Decode a base64 armored key block and parse its first packet.
pub fn parse_key_packet(encoded: &str) -> Result<(BlockType, KeyPacket), KeyError> {
    let armored = STANDARD
        .decode(encoded.trim())
        .map_err(|e| KeyError::MalformedKeyEncoding(format!("base64: {e}")))?;

    let mut dearmor = Dearmor::new(Cursor::new(armored));
    let mut body = Vec::new();
    dearmor
        .read_to_end(&mut body)
        .map_err(|e| KeyError::MalformedKeyEncoding(format!("armor: {e}")))?;
    let block = dearmor
        .typ
        .ok_or_else(|| KeyError::MalformedKeyEncoding("armor: missing block header".to_string()))?;

    let packet = match PacketParser::new(Cursor::new(body)).next() {
        None => return Err(KeyError::UnsupportedKeyPacket("empty key block".to_string())),
        Some(Err(e)) => return Err(KeyError::UnsupportedKeyPacket(e.to_string())),
        Some(Ok(Packet::PublicKey(key))) => KeyPacket::Public(key),
        Some(Ok(Packet::SecretKey(key))) => KeyPacket::Private(key),
        Some(Ok(Packet::PublicSubkey(_))) => KeyPacket::Unsupported("public subkey packet"),
        Some(Ok(Packet::SecretSubkey(_))) => KeyPacket::Unsupported("secret subkey packet"),
        Some(Ok(_)) => KeyPacket::Unsupported("non-key packet"),
    };

    Ok((block, packet))
}

/// Load a public key from its at-rest encoding.
pub fn load_public_key(encoded: &str) -> Result<PublicKey, KeyError> {
    let (block, packet) = parse_key_packet(encoded)?;
    match packet {
        KeyPacket::Public(key) if block == BlockType::PublicKey => Ok(key),
        KeyPacket::Unsupported(what) => Err(KeyError::UnsupportedKeyPacket(what.to_string())),
        other => Err(KeyError::WrongKeyType {
            expected: KeyKind::Public,
            found: format!("{} in {:?} block", other.describe(), block),
        }),
    }
}

/// Load a private key from its at-rest encoding.
pub fn load_private_key(encoded: &str) -> Result<SecretKey, KeyError> {
    let (block, packet) = parse_key_packet(encoded)?;
    match packet {
        KeyPacket::Private(key) if block == BlockType::PrivateKey => Ok(key),
        KeyPacket::Unsupported(what) => Err(KeyError::UnsupportedKeyPacket(what.to_string())),
        other => Err(KeyError::WrongKeyType {
            expected: KeyKind::Private,
            found: format!("{} in {:?} block", other.describe(), block),
        }),
    }
}

/// Optional public and private halves of an authority key.
///
/// An empty blob means "absent": verification only needs the public half, so
/// a verifier can be built without ever seeing the private key.
#[derive(Clone, Default)]
pub struct KeyPair {
    public_key: Option<PublicKey>,
    private_key: Option<SecretKey>,
}

impl KeyPair {
    /// Load both halves from their at-rest encodings; empty strings are skipped.
    pub fn from_encoded(private_key: &str, public_key: &str) -> Result<Self, KeyError> {
        let private_key = if private_key.trim().is_empty() {
            None
        } else {
            Some(load_private_key(private_key)?)
        };
        let public_key = if public_key.trim().is_empty() {
            None
        } else {
            Some(load_public_key(public_key)?)
        };

        Ok(Self {
            public_key,
            private_key,
        })
    }

    /// A pair holding only a public key, for verification.
    pub fn verifying(public_key: &str) -> Result<Self, KeyError> {
        Self::from_encoded("", public_key)
    }

    pub fn public_key(&self) -> Option<&PublicKey> {
        self.public_key.as_ref()
    }

    pub fn private_key(&self) -> Option<&SecretKey> {
        self.private_key.as_ref()
    }

    /// Key id of the public half, upper-case hex.
    pub fn key_id(&self) -> Option<String> {
        self.public_key
            .as_ref()
            .map(|key| format!("{:X}", key.key_id()))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.key_id())
            .field(
                "private_key",
                &self.private_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Both halves of a key in their at-rest encoding.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedKeyPair {
    pub public_key: String,
    pub private_key: String,
}

impl EncodedKeyPair {
    pub fn key_pair(&self) -> Result<KeyPair, KeyError> {
        KeyPair::from_encoded(&self.private_key, &self.public_key)
    }
}

impl fmt::Debug for EncodedKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedKeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Cluster secret holding an authority's signing key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningSecret {
    pub secret_name: String,
    #[serde(rename = "public")]
    pub public_key: String,
    #[serde(rename = "private")]
    pub private_key: String,
}

impl SigningSecret {
    pub fn new(secret_name: impl Into<String>, keys: EncodedKeyPair) -> Self {
        Self {
            secret_name: secret_name.into(),
            public_key: keys.public_key,
            private_key: keys.private_key,
        }
    }

    pub fn key_pair(&self) -> Result<KeyPair, KeyError> {
        KeyPair::from_encoded(&self.private_key, &self.public_key)
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningSecret")
            .field("secret_name", &self.secret_name)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Generate a fresh RSA authority key and return it in at-rest form.
///
/// The key is self-certified for `name` and advertises the hash, cipher and
/// compression preferences from `defaults`.
pub fn generate_key_pair(name: &str, defaults: &SigningDefaults) -> Result<EncodedKeyPair, KeyError> {
    let mut rng = rand::thread_rng();

    let params = SecretKeyParamsBuilder::default()
        .key_type(KeyType::Rsa(defaults.rsa_bits()))
        .can_certify(true)
        .can_sign(true)
        .primary_user_id(name.to_string())
        .preferred_symmetric_algorithms(smallvec![defaults.cipher()])
        .preferred_hash_algorithms(smallvec![defaults.hash()])
        .preferred_compression_algorithms(smallvec![defaults.compression()])
        .build()
        .map_err(|e| KeyError::Generation(e.to_string()))?;

    let secret_key = params
        .generate(&mut rng)
        .map_err(|e| KeyError::Generation(e.to_string()))?;
    let signed_secret = secret_key
        .sign(&mut rng, String::new)
        .map_err(|e| KeyError::Generation(e.to_string()))?;
    let signed_public = signed_secret
        .public_key()
        .sign(&mut rng, &signed_secret, String::new)
        .map_err(|e| KeyError::Generation(e.to_string()))?;

    let mut private_armor = Vec::new();
    armor::write(&signed_secret, BlockType::PrivateKey, &mut private_armor, None, true)
        .map_err(|e| KeyError::Generation(e.to_string()))?;
    let mut public_armor = Vec::new();
    armor::write(&signed_public, BlockType::PublicKey, &mut public_armor, None, true)
        .map_err(|e| KeyError::Generation(e.to_string()))?;

    tracing::debug!("Generated {}-bit RSA authority key for {:?}", defaults.rsa_bits(), name);

    Ok(EncodedKeyPair {
        public_key: STANDARD.encode(public_armor),
        private_key: STANDARD.encode(private_armor),
    })
}
