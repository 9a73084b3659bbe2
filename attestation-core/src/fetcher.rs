//! Metadata store interface.
//!
//! The store keeps vulnerability findings and attestation records (notes and
//! occurrences). Implementations:
//! - [`MemoryFetcher`]: in-process test double
//! - `GrafeasFetcher` in the `image-attestation-grafeas` crate: REST client

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::attestation::{AttestationError, Attestor};
use crate::keys::SigningSecret;
use crate::types::{
    resource_url, AttestationAuthority, Note, Occurrence, PgpAttestation, Vulnerability,
};

/// Errors surfaced by a metadata store.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Creating attestation: {0}")]
    Attestation(#[from] AttestationError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Capability interface to the vulnerability and attestation store.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Package vulnerabilities reported for `image`.
    async fn vulnerabilities(&self, image: &str) -> Result<Vec<Vulnerability>, FetchError>;

    /// Sign `image` with `signing_secret` and store the attestation under `note`.
    async fn create_attestation_occurrence(
        &self,
        note: &Note,
        image: &str,
        signing_secret: &SigningSecret,
    ) -> Result<Occurrence, FetchError>;

    /// Fetch the note recording `authority`.
    async fn attestation_note(&self, authority: &AttestationAuthority) -> Result<Note, FetchError>;

    /// Create the note recording `authority`.
    async fn create_attestation_note(
        &self,
        authority: &AttestationAuthority,
    ) -> Result<Note, FetchError>;

    /// Attestations stored for `image`.
    async fn attestations(&self, image: &str) -> Result<Vec<PgpAttestation>, FetchError>;
}

/// Sign `image` for storage in an occurrence.
///
/// The signer key id recorded alongside the signature is the secret's name.
pub fn sign_for_occurrence(
    attestor: &Attestor,
    image: &str,
    signing_secret: &SigningSecret,
) -> Result<PgpAttestation, AttestationError> {
    let key_pair = signing_secret.key_pair()?;
    let signature =
        attestor.create_attestation(image, Vec::<(String, String)>::new(), &key_pair)?;

    Ok(PgpAttestation {
        signature,
        key_id: signing_secret.secret_name.clone(),
        occurrence_id: String::new(),
    })
}

/// In-memory metadata store.
pub struct MemoryFetcher {
    attestor: Attestor,
    state: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    vulnerabilities: HashMap<String, Vec<Vulnerability>>,
    notes: HashMap<String, Note>,
    occurrences: Vec<Occurrence>,
    next_id: u64,
}

impl MemoryFetcher {
    pub fn new(attestor: Attestor) -> Self {
        Self {
            attestor,
            state: RwLock::new(MemoryState::default()),
        }
    }

    /// Record vulnerabilities reported for `image`.
    pub async fn add_vulnerabilities(&self, image: &str, vulnerabilities: Vec<Vulnerability>) {
        let mut state = self.state.write().await;
        state
            .vulnerabilities
            .entry(image.to_string())
            .or_default()
            .extend(vulnerabilities);
    }

    /// Store an occurrence as-is, e.g. one signed elsewhere.
    pub async fn insert_occurrence(&self, mut occurrence: Occurrence) -> Occurrence {
        let mut state = self.state.write().await;
        state.next_id += 1;
        occurrence.name = format!("occurrences/{}", state.next_id);
        occurrence.attestation.occurrence_id = occurrence.name.clone();
        state.occurrences.push(occurrence.clone());
        occurrence
    }

    pub async fn occurrences(&self) -> Vec<Occurrence> {
        self.state.read().await.occurrences.clone()
    }
}

impl Default for MemoryFetcher {
    fn default() -> Self {
        Self::new(Attestor::default())
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn vulnerabilities(&self, image: &str) -> Result<Vec<Vulnerability>, FetchError> {
        let state = self.state.read().await;
        Ok(state.vulnerabilities.get(image).cloned().unwrap_or_default())
    }

    async fn create_attestation_occurrence(
        &self,
        note: &Note,
        image: &str,
        signing_secret: &SigningSecret,
    ) -> Result<Occurrence, FetchError> {
        if !self.state.read().await.notes.contains_key(&note.name) {
            return Err(FetchError::NotFound(note.name.clone()));
        }

        let attestation = sign_for_occurrence(&self.attestor, image, signing_secret)?;
        let occurrence = self
            .insert_occurrence(Occurrence {
                name: String::new(),
                resource_url: resource_url(image),
                note_name: note.name.clone(),
                attestation,
                create_time: Utc::now(),
            })
            .await;

        tracing::info!(
            "Created attestation occurrence {} for {} under {}",
            occurrence.name,
            image,
            note.name
        );
        Ok(occurrence)
    }

    async fn attestation_note(&self, authority: &AttestationAuthority) -> Result<Note, FetchError> {
        let name = authority.note_name();
        self.state
            .read()
            .await
            .notes
            .get(&name)
            .cloned()
            .ok_or(FetchError::NotFound(name))
    }

    async fn create_attestation_note(
        &self,
        authority: &AttestationAuthority,
    ) -> Result<Note, FetchError> {
        let name = authority.note_name();
        let mut state = self.state.write().await;
        if state.notes.contains_key(&name) {
            return Err(FetchError::AlreadyExists(name));
        }

        let note = Note {
            name: name.clone(),
            human_readable_name: authority.name.clone(),
        };
        state.notes.insert(name, note.clone());
        Ok(note)
    }

    async fn attestations(&self, image: &str) -> Result<Vec<PgpAttestation>, FetchError> {
        let url = resource_url(image);
        let state = self.state.read().await;
        Ok(state
            .occurrences
            .iter()
            .filter(|occurrence| occurrence.resource_url == url)
            .map(|occurrence| occurrence.attestation.clone())
            .collect())
    }
}
