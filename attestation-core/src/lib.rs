//! # Image Attestation
//!
//! Signs and verifies OpenPGP attestations over container image references,
//! so a deployment policy can confirm that an authority approved an exact
//! image digest.
//!
//! ## Key Features
//! - **Canonical statements**: Deterministic JSON, byte-compatible with atomic container signatures
//! - **Strict references**: Only `registry/repository@sha256:<hex>` can be attested
//! - **OpenPGP signatures**: Armored, compressed signed messages over the statement
//! - **Pluggable metadata store**: [`Fetcher`] interface with an in-memory double

pub mod attestation;
pub mod config;
pub mod fetcher;
pub mod keys;
pub mod reference;
pub mod serialization;
pub mod signer;
pub mod statement;
pub mod types;
pub mod verifier;

pub use attestation::{AttestationError, Attestor, ErrorKind};
pub use config::{SigningConfig, SigningDefaults};
pub use fetcher::{FetchError, Fetcher, MemoryFetcher};
pub use keys::{generate_key_pair, EncodedKeyPair, KeyPair, SigningSecret};
pub use reference::DigestReference;
pub use statement::{CanonicalStatement, StatementBuilder};
pub use types::*;

/// Re-export for convenience
pub use pgp::packet::{PublicKey, SecretKey};
