//! Grafeas v1beta1 REST client.
//!
//! Thin wrapper over the occurrence and note endpoints; mapping onto store
//! types happens in [`crate::wire`].

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::wire::{ApiNote, ApiOccurrence, ListOccurrencesResponse};
use crate::GrafeasConfig;

const API_VERSION: &str = "v1beta1";

#[derive(Debug, Error)]
pub enum GrafeasError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Grafeas API error: HTTP {status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Cannot determine project for {0}")]
    UnknownProject(String),
}

/// Grafeas client bound to one API endpoint.
pub struct GrafeasClient {
    client: Client,
    base_url: String,
    access_token: Option<String>,
    page_size: u32,
}

impl GrafeasClient {
    pub fn new(config: &GrafeasConfig) -> Result<Self, GrafeasError> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            page_size: config.page_size,
        })
    }

    /// Absolute URL of an API resource path such as `projects/p/notes/n`.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, API_VERSION, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// List every occurrence in `project` matching `filter`, following pages.
    pub async fn list_occurrences(
        &self,
        project: &str,
        filter: &str,
    ) -> Result<Vec<ApiOccurrence>, GrafeasError> {
        let path = format!("projects/{project}/occurrences");
        let mut occurrences = Vec::new();
        let mut page_token = String::new();

        loop {
            let mut query = vec![
                ("filter", filter.to_string()),
                ("pageSize", self.page_size.to_string()),
            ];
            if !page_token.is_empty() {
                query.push(("pageToken", page_token.clone()));
            }

            let response = self.request(Method::GET, &path).query(&query).send().await?;
            let page: ListOccurrencesResponse = decode(response).await?;
            tracing::debug!(
                "Listed {} occurrences in project {}",
                page.occurrences.len(),
                project
            );
            occurrences.extend(page.occurrences);

            if page.next_page_token.is_empty() {
                break;
            }
            if page.next_page_token == page_token {
                tracing::warn!(
                    "Grafeas repeated page token {} for project {}, stopping",
                    page_token,
                    project
                );
                break;
            }
            page_token = page.next_page_token;
        }

        Ok(occurrences)
    }

    pub async fn create_occurrence(
        &self,
        project: &str,
        occurrence: &ApiOccurrence,
    ) -> Result<ApiOccurrence, GrafeasError> {
        let path = format!("projects/{project}/occurrences");
        let response = self.request(Method::POST, &path).json(occurrence).send().await?;
        decode(response).await
    }

    /// Fetch a note by its full name.
    pub async fn get_note(&self, name: &str) -> Result<ApiNote, GrafeasError> {
        let response = self.request(Method::GET, name).send().await?;
        decode(response).await
    }

    /// Create note `note_id` under `parent`, e.g. `projects/p`.
    pub async fn create_note(
        &self,
        parent: &str,
        note_id: &str,
        note: &ApiNote,
    ) -> Result<ApiNote, GrafeasError> {
        let path = format!("{}/notes", parent.trim_end_matches('/'));
        let response = self
            .request(Method::POST, &path)
            .query(&[("noteId", note_id)])
            .json(note)
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GrafeasError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(GrafeasError::Api { status, message });
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| GrafeasError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OCCURRENCES: &str = "/v1beta1/projects/p/occurrences";

    fn client_for(server: &MockServer) -> GrafeasClient {
        let config = GrafeasConfig {
            base_url: server.uri(),
            page_size: 2,
            ..GrafeasConfig::default()
        };
        GrafeasClient::new(&config).unwrap()
    }

    fn occurrence(name: &str) -> serde_json::Value {
        json!({"name": name, "noteName": "projects/p/notes/qa", "kind": "ATTESTATION"})
    }

    #[test]
    fn test_resource_urls() {
        let config = GrafeasConfig {
            base_url: "https://grafeas.example.com/".to_string(),
            ..GrafeasConfig::default()
        };
        let client = GrafeasClient::new(&config).unwrap();

        assert_eq!(
            client.url("projects/p/notes/qa"),
            "https://grafeas.example.com/v1beta1/projects/p/notes/qa"
        );
        assert_eq!(
            client.url("/projects/p/occurrences"),
            "https://grafeas.example.com/v1beta1/projects/p/occurrences"
        );
    }

    #[test]
    fn test_bearer_token_attached() {
        let config = GrafeasConfig {
            access_token: Some("token-123".to_string()),
            ..GrafeasConfig::default()
        };
        let client = GrafeasClient::new(&config).unwrap();

        let request = client.request(Method::GET, "projects/p/notes/qa").build().unwrap();
        assert_eq!(
            request.headers()[reqwest::header::AUTHORIZATION],
            "Bearer token-123"
        );
        assert_eq!(
            request.url().as_str(),
            "https://containeranalysis.googleapis.com/v1beta1/projects/p/notes/qa"
        );
    }

    #[test]
    fn test_no_token_no_auth_header() {
        let client = GrafeasClient::new(&GrafeasConfig::default()).unwrap();
        let request = client.request(Method::GET, "projects/p/notes/qa").build().unwrap();
        assert!(request.headers().get(reqwest::header::AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_list_follows_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(OCCURRENCES))
            .and(query_param("filter", r#"kind="ATTESTATION""#))
            .and(query_param("pageSize", "2"))
            .and(query_param_is_missing("pageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "occurrences": [occurrence("o1"), occurrence("o2")],
                "nextPageToken": "p2",
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(OCCURRENCES))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "occurrences": [occurrence("o3")],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let occurrences = client_for(&server)
            .list_occurrences("p", r#"kind="ATTESTATION""#)
            .await
            .unwrap();
        let names: Vec<_> = occurrences.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, ["o1", "o2", "o3"]);
        assert_eq!(occurrences[0].note_name, "projects/p/notes/qa");
    }

    #[tokio::test]
    async fn test_list_stops_on_repeated_page_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(OCCURRENCES))
            .and(query_param_is_missing("pageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "occurrences": [occurrence("o1")],
                "nextPageToken": "p2",
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(OCCURRENCES))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "occurrences": [occurrence("o2")],
                "nextPageToken": "p2",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let occurrences = client_for(&server).list_occurrences("p", "").await.unwrap();
        assert_eq!(occurrences.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(OCCURRENCES))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).list_occurrences("p", "").await.unwrap_err();
        assert!(matches!(err, GrafeasError::InvalidResponse(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_error_status_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1beta1/projects/p/notes/qa"))
            .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
            .mount(&server)
            .await;

        match client_for(&server).get_note("projects/p/notes/qa").await {
            Err(GrafeasError::Api { status, message }) => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(message, "permission denied");
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_note_sends_id_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta1/projects/p/notes"))
            .and(query_param("noteId", "qa"))
            .and(body_partial_json(json!({"kind": "ATTESTATION"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/p/notes/qa",
                "kind": "ATTESTATION",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let body = ApiNote {
            kind: Some("ATTESTATION".to_string()),
            ..ApiNote::default()
        };
        let note = client_for(&server)
            .create_note("projects/p/", "qa", &body)
            .await
            .unwrap();
        assert_eq!(note.name, "projects/p/notes/qa");
    }
}
