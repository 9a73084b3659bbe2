//! OpenPGP verification of attestation signatures.
//!
//! A valid signature only proves *someone holding the key signed something*.
//! Which image was attested is established by comparing the signed bytes with
//! a statement rebuilt independently by the caller.

use pgp::armor::{BlockType, Dearmor};
use pgp::packet::PublicKey;
use pgp::types::PublicKeyTrait;
use pgp::{Deserializable, Message};
use std::io::{Cursor, Read};
use thiserror::Error;

use crate::types::ArmoredSignature;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Malformed signature encoding: {0}")]
    MalformedSignatureEncoding(String),

    #[error("Could not decode armor signature: {0}")]
    MalformedArmor(String),

    #[error("Bad or missing signature: {0}")]
    BadOrMissingSignature(String),

    #[error("Signature could not be verified. got: {actual}, want: {expected}")]
    ContentMismatch { expected: String, actual: String },
}

/// Check `signature` was made by `public_key` over exactly `expected`.
pub fn verify(
    public_key: &PublicKey,
    signature: &ArmoredSignature,
    expected: &[u8],
) -> Result<(), VerifyError> {
    let armored = signature
        .decode()
        .map_err(|e| VerifyError::MalformedSignatureEncoding(e.to_string()))?;

    let mut dearmor = Dearmor::new(Cursor::new(armored));
    let mut body = Vec::new();
    dearmor
        .read_to_end(&mut body)
        .map_err(|e| VerifyError::MalformedArmor(e.to_string()))?;
    match dearmor.typ {
        Some(BlockType::Signature) | Some(BlockType::Message) => {}
        other => {
            return Err(VerifyError::MalformedArmor(format!(
                "unexpected armor block {other:?}"
            )))
        }
    }
    if body.is_empty() {
        return Err(VerifyError::MalformedArmor("empty armor body".to_string()));
    }

    let message = Message::from_bytes(Cursor::new(body)).map_err(|e| {
        VerifyError::BadOrMissingSignature(format!("could not read signed message: {e}"))
    })?;
    let message = match message {
        Message::Compressed(_) => message.decompress().map_err(|e| {
            VerifyError::BadOrMissingSignature(format!("could not decompress message: {e}"))
        })?,
        other => other,
    };

    // The whole body is drained before the signature is looked at
    let plaintext = message
        .get_content()
        .map_err(|e| VerifyError::BadOrMissingSignature(format!("could not read body: {e}")))?
        .ok_or_else(|| VerifyError::BadOrMissingSignature("message has no body".to_string()))?;

    if !matches!(message, Message::Signed { .. }) {
        return Err(VerifyError::BadOrMissingSignature(
            "no signature found for given key".to_string(),
        ));
    }
    message.verify(public_key).map_err(|e| {
        VerifyError::BadOrMissingSignature(format!(
            "signature does not verify with key {:?}: {e}",
            public_key.key_id()
        ))
    })?;

    if plaintext != expected {
        return Err(VerifyError::ContentMismatch {
            expected: String::from_utf8_lossy(expected).into_owned(),
            actual: String::from_utf8_lossy(&plaintext).into_owned(),
        });
    }

    Ok(())
}
