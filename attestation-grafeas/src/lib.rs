//! Grafeas-backed metadata store.
//!
//! Implements [`Fetcher`] over the Grafeas v1beta1 REST API (as served by
//! Container Analysis).
//!
//! ## Record Layout
//! 1. Vulnerabilities and attestations are occurrences filed under the
//!    image's project, keyed by resource URL `https://<image>`
//! 2. Each attestation authority owns a note, `<noteReference>/notes/<name>`
//! 3. An attestation occurrence carries the base64 armored signature and the
//!    signing secret's name as its key id

pub mod client;
pub mod wire;

use anyhow::Context;
use async_trait::async_trait;
use image_attestation::fetcher::sign_for_occurrence;
use image_attestation::{
    AttestationAuthority, Attestor, FetchError, Fetcher, Note, Occurrence, PgpAttestation,
    SigningSecret, Vulnerability,
};
use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

pub use client::{GrafeasClient, GrafeasError};

/// Configuration for the Grafeas endpoint.
#[derive(Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GrafeasConfig {
    /// API root, without the version segment
    pub base_url: String,
    /// OAuth bearer token sent with every request
    pub access_token: Option<String>,
    /// Occurrences requested per page when listing
    pub page_size: u32,
    pub timeout_secs: u64,
}

impl Default for GrafeasConfig {
    fn default() -> Self {
        Self {
            base_url: "https://containeranalysis.googleapis.com".to_string(),
            access_token: None,
            page_size: 100,
            timeout_secs: 30,
        }
    }
}

impl fmt::Debug for GrafeasConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrafeasConfig")
            .field("base_url", &self.base_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("page_size", &self.page_size)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl GrafeasConfig {
    /// Read overrides from `GRAFEAS_URL`, `GRAFEAS_ACCESS_TOKEN`,
    /// `GRAFEAS_PAGE_SIZE` and `GRAFEAS_TIMEOUT_SECS`.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("GRAFEAS_URL") {
            config.base_url = url;
        }
        if let Ok(token) = std::env::var("GRAFEAS_ACCESS_TOKEN") {
            config.access_token = Some(token);
        }
        if let Ok(page_size) = std::env::var("GRAFEAS_PAGE_SIZE") {
            config.page_size = page_size
                .parse()
                .with_context(|| format!("GRAFEAS_PAGE_SIZE={page_size} is not a number"))?;
        }
        if let Ok(timeout) = std::env::var("GRAFEAS_TIMEOUT_SECS") {
            config.timeout_secs = timeout
                .parse()
                .with_context(|| format!("GRAFEAS_TIMEOUT_SECS={timeout} is not a number"))?;
        }
        anyhow::ensure!(config.page_size > 0, "page size must be positive");
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl From<GrafeasError> for FetchError {
    fn from(err: GrafeasError) -> Self {
        match err {
            GrafeasError::Api { status, message } if status == StatusCode::NOT_FOUND => {
                FetchError::NotFound(message)
            }
            GrafeasError::Api { status, message } if status == StatusCode::CONFLICT => {
                FetchError::AlreadyExists(message)
            }
            GrafeasError::Api { status, message } => {
                FetchError::Network(format!("HTTP {status}: {message}"))
            }
            GrafeasError::Network(e) => FetchError::Network(e.to_string()),
            GrafeasError::InvalidResponse(message) => FetchError::InvalidResponse(message),
            GrafeasError::UnknownProject(what) => {
                FetchError::InvalidRequest(format!("cannot determine project for {what}"))
            }
        }
    }
}

/// Metadata store backed by a Grafeas server.
pub struct GrafeasFetcher {
    client: GrafeasClient,
    attestor: Attestor,
}

impl GrafeasFetcher {
    pub fn new(config: GrafeasConfig) -> Result<Self, GrafeasError> {
        Self::with_attestor(config, Attestor::default())
    }

    /// Sign occurrences with `attestor` instead of the standard defaults.
    pub fn with_attestor(config: GrafeasConfig, attestor: Attestor) -> Result<Self, GrafeasError> {
        tracing::info!("Using Grafeas endpoint {}", config.base_url);
        Ok(Self {
            client: GrafeasClient::new(&config)?,
            attestor,
        })
    }

    async fn occurrences(
        &self,
        image: &str,
        kind: &str,
    ) -> Result<Vec<wire::ApiOccurrence>, GrafeasError> {
        let project = wire::image_project(image)
            .ok_or_else(|| GrafeasError::UnknownProject(image.to_string()))?;
        self.client
            .list_occurrences(project, &wire::occurrence_filter(image, kind))
            .await
    }
}

#[async_trait]
impl Fetcher for GrafeasFetcher {
    async fn vulnerabilities(&self, image: &str) -> Result<Vec<Vulnerability>, FetchError> {
        let occurrences = self.occurrences(image, wire::KIND_VULNERABILITY).await?;
        Ok(occurrences.iter().filter_map(wire::to_vulnerability).collect())
    }

    async fn create_attestation_occurrence(
        &self,
        note: &Note,
        image: &str,
        signing_secret: &SigningSecret,
    ) -> Result<Occurrence, FetchError> {
        let project = wire::note_project(&note.name)
            .ok_or_else(|| GrafeasError::UnknownProject(note.name.clone()))?;
        let attestation = sign_for_occurrence(&self.attestor, image, signing_secret)?;

        let body = wire::attestation_occurrence(note, image, &attestation);
        let created = self.client.create_occurrence(project, &body).await?;
        tracing::info!(
            "Created attestation occurrence {} for {} under {}",
            created.name,
            image,
            note.name
        );

        wire::to_occurrence(&created).ok_or_else(|| {
            FetchError::InvalidResponse(format!(
                "occurrence {} has no PGP signed attestation",
                created.name
            ))
        })
    }

    async fn attestation_note(&self, authority: &AttestationAuthority) -> Result<Note, FetchError> {
        let note = self.client.get_note(&authority.note_name()).await?;
        Ok(wire::to_note(&note))
    }

    async fn create_attestation_note(
        &self,
        authority: &AttestationAuthority,
    ) -> Result<Note, FetchError> {
        let note = self
            .client
            .create_note(
                &authority.note_reference,
                &authority.name,
                &wire::attestation_note(authority),
            )
            .await?;
        tracing::info!("Created attestation note {}", note.name);
        Ok(wire::to_note(&note))
    }

    async fn attestations(&self, image: &str) -> Result<Vec<PgpAttestation>, FetchError> {
        let occurrences = self.occurrences(image, wire::KIND_ATTESTATION).await?;
        Ok(occurrences.iter().filter_map(wire::to_pgp_attestation).collect())
    }
}
