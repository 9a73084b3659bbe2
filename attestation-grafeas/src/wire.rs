//! Grafeas v1beta1 JSON resources and their mapping onto store types.
//!
//! Only the fields this crate reads or writes are modelled; everything else in
//! the API responses is ignored.

use chrono::{DateTime, Utc};
use image_attestation::{
    resource_url, ArmoredSignature, AttestationAuthority, Note, Occurrence, PgpAttestation,
    Vulnerability,
};
use serde::{Deserialize, Serialize};

pub const KIND_VULNERABILITY: &str = "VULNERABILITY";
pub const KIND_ATTESTATION: &str = "ATTESTATION";
pub const CONTENT_TYPE_SIMPLE_SIGNING_JSON: &str = "SIMPLE_SIGNING_JSON";
/// Version kind marking "no fixed version exists".
pub const VERSION_KIND_MAXIMUM: &str = "MAXIMUM";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiOccurrence {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub resource: Resource,
    #[serde(default)]
    pub note_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vulnerability: Option<VulnerabilityDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation: Option<AttestationDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub uri: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VulnerabilityDetails {
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub package_issue: Vec<PackageIssue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageIssue {
    #[serde(default)]
    pub fixed_location: Option<VulnerabilityLocation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityLocation {
    #[serde(default)]
    pub version: Option<PackageVersion>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageVersion {
    #[serde(default)]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttestationDetails {
    #[serde(default)]
    pub attestation: AttestationBody,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pgp_signed_attestation: Option<PgpSignedAttestation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PgpSignedAttestation {
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub pgp_key_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOccurrencesResponse {
    #[serde(default)]
    pub occurrences: Vec<ApiOccurrence>,
    #[serde(default)]
    pub next_page_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiNote {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation_authority: Option<AuthorityDetails>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorityDetails {
    #[serde(default)]
    pub hint: Hint,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    #[serde(default)]
    pub human_readable_name: String,
}

/// Occurrence list filter selecting one kind of record for an image.
pub fn occurrence_filter(image: &str, kind: &str) -> String {
    format!(r#"resourceUrl="{}" AND kind="{}""#, resource_url(image), kind)
}

/// Project an image's records are filed under: `gcr.io/<project>/...`.
pub fn image_project(image: &str) -> Option<&str> {
    image.split('/').nth(1).filter(|project| !project.is_empty())
}

/// Project a note lives in, taken from its `projects/<project>/notes/<id>` name.
pub fn note_project(note_name: &str) -> Option<&str> {
    let mut segments = note_name.split('/');
    segments.find(|segment| *segment == "projects")?;
    segments.next().filter(|project| !project.is_empty())
}

/// A fix exists only when every affected package has a bounded fixed version.
pub fn has_fix_available(details: &VulnerabilityDetails) -> bool {
    details.package_issue.iter().all(|issue| {
        issue
            .fixed_location
            .as_ref()
            .and_then(|location| location.version.as_ref())
            .map_or(false, |version| version.kind != VERSION_KIND_MAXIMUM)
    })
}

pub fn to_vulnerability(occurrence: &ApiOccurrence) -> Option<Vulnerability> {
    let details = occurrence.vulnerability.as_ref()?;
    Some(Vulnerability {
        severity: details.severity.clone(),
        has_fix_available: has_fix_available(details),
        cve: occurrence.note_name.clone(),
    })
}

pub fn to_pgp_attestation(occurrence: &ApiOccurrence) -> Option<PgpAttestation> {
    let signed = occurrence
        .attestation
        .as_ref()?
        .attestation
        .pgp_signed_attestation
        .as_ref()?;
    Some(PgpAttestation {
        signature: ArmoredSignature::new(signed.signature.clone()),
        key_id: signed.pgp_key_id.clone(),
        occurrence_id: occurrence.name.clone(),
    })
}

pub fn to_occurrence(occurrence: &ApiOccurrence) -> Option<Occurrence> {
    Some(Occurrence {
        name: occurrence.name.clone(),
        resource_url: occurrence.resource.uri.clone(),
        note_name: occurrence.note_name.clone(),
        attestation: to_pgp_attestation(occurrence)?,
        create_time: occurrence.create_time.unwrap_or_else(Utc::now),
    })
}

pub fn to_note(note: &ApiNote) -> Note {
    Note {
        name: note.name.clone(),
        human_readable_name: note
            .attestation_authority
            .as_ref()
            .map(|authority| authority.hint.human_readable_name.clone())
            .unwrap_or_default(),
    }
}

/// Request body creating the note that records `authority`.
pub fn attestation_note(authority: &AttestationAuthority) -> ApiNote {
    ApiNote {
        name: String::new(),
        kind: Some(KIND_ATTESTATION.to_string()),
        attestation_authority: Some(AuthorityDetails {
            hint: Hint {
                human_readable_name: authority.name.clone(),
            },
        }),
    }
}

/// Request body storing `attestation` for `image` under `note`.
pub fn attestation_occurrence(
    note: &Note,
    image: &str,
    attestation: &PgpAttestation,
) -> ApiOccurrence {
    ApiOccurrence {
        resource: Resource {
            uri: resource_url(image),
        },
        note_name: note.name.clone(),
        attestation: Some(AttestationDetails {
            attestation: AttestationBody {
                pgp_signed_attestation: Some(PgpSignedAttestation {
                    signature: attestation.signature.as_str().to_string(),
                    content_type: CONTENT_TYPE_SIMPLE_SIGNING_JSON.to_string(),
                    pgp_key_id: attestation.key_id.clone(),
                }),
            },
        }),
        ..ApiOccurrence::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const IMAGE: &str = "gcr.io/my-project/app@sha256:0000000000000000000000000000000000000000000000000000000000000000";

    fn issue(kind: Option<&str>) -> PackageIssue {
        PackageIssue {
            fixed_location: Some(VulnerabilityLocation {
                version: kind.map(|kind| PackageVersion {
                    kind: kind.to_string(),
                }),
            }),
        }
    }

    #[test]
    fn test_occurrence_filter() {
        assert_eq!(
            occurrence_filter(IMAGE, KIND_ATTESTATION),
            format!(r#"resourceUrl="https://{IMAGE}" AND kind="ATTESTATION""#)
        );
    }

    #[test]
    fn test_image_project() {
        assert_eq!(image_project(IMAGE), Some("my-project"));
        assert_eq!(image_project("gcr.io"), None);
        assert_eq!(image_project("gcr.io//app"), None);
    }

    #[test]
    fn test_note_project() {
        assert_eq!(note_project("projects/p1/notes/qa"), Some("p1"));
        assert_eq!(note_project("v1beta1/projects/p1/notes/qa"), Some("p1"));
        assert_eq!(note_project("notes/qa"), None);
        assert_eq!(note_project("projects/"), None);
    }

    #[test]
    fn test_fix_availability() {
        let fixed = VulnerabilityDetails {
            severity: "HIGH".to_string(),
            package_issue: vec![issue(Some("NORMAL")), issue(Some("NORMAL"))],
        };
        assert!(has_fix_available(&fixed));

        let unbounded = VulnerabilityDetails {
            package_issue: vec![issue(Some("NORMAL")), issue(Some(VERSION_KIND_MAXIMUM))],
            ..fixed.clone()
        };
        assert!(!has_fix_available(&unbounded));

        let no_version = VulnerabilityDetails {
            package_issue: vec![issue(None)],
            ..fixed.clone()
        };
        assert!(!has_fix_available(&no_version));

        let no_location = VulnerabilityDetails {
            package_issue: vec![PackageIssue::default()],
            ..fixed
        };
        assert!(!has_fix_available(&no_location));
    }

    #[test]
    fn test_vulnerability_from_response() {
        let response: ListOccurrencesResponse = serde_json::from_value(json!({
            "occurrences": [{
                "name": "projects/my-project/occurrences/1",
                "resource": {"uri": format!("https://{IMAGE}")},
                "noteName": "projects/goog-vulnz/notes/CVE-2018-1000001",
                "kind": "VULNERABILITY",
                "vulnerability": {
                    "severity": "CRITICAL",
                    "packageIssue": [{
                        "affectedLocation": {"cpeUri": "cpe:/o:debian:debian_linux:9"},
                        "fixedLocation": {"version": {"kind": "MAXIMUM"}}
                    }]
                }
            }],
            "nextPageToken": "next"
        }))
        .unwrap();

        assert_eq!(response.next_page_token, "next");
        let vulnerability = to_vulnerability(&response.occurrences[0]).unwrap();
        assert_eq!(vulnerability.severity, "CRITICAL");
        assert!(!vulnerability.has_fix_available);
        assert_eq!(vulnerability.cve, "projects/goog-vulnz/notes/CVE-2018-1000001");
    }

    #[test]
    fn test_attestation_occurrence_body() {
        let note = Note {
            name: "projects/p1/notes/qa".to_string(),
            human_readable_name: "qa".to_string(),
        };
        let attestation = PgpAttestation {
            signature: ArmoredSignature::new("c2ln"),
            key_id: "qa-signer".to_string(),
            occurrence_id: String::new(),
        };

        let body = serde_json::to_value(attestation_occurrence(&note, IMAGE, &attestation)).unwrap();
        assert_eq!(
            body,
            json!({
                "resource": {"uri": format!("https://{IMAGE}")},
                "noteName": "projects/p1/notes/qa",
                "attestation": {"attestation": {"pgpSignedAttestation": {
                    "signature": "c2ln",
                    "contentType": "SIMPLE_SIGNING_JSON",
                    "pgpKeyId": "qa-signer"
                }}}
            })
        );
    }

    #[test]
    fn test_stored_attestation_roundtrip() {
        let note = Note {
            name: "projects/p1/notes/qa".to_string(),
            human_readable_name: "qa".to_string(),
        };
        let attestation = PgpAttestation {
            signature: ArmoredSignature::new("c2ln"),
            key_id: "qa-signer".to_string(),
            occurrence_id: String::new(),
        };
        let mut stored = attestation_occurrence(&note, IMAGE, &attestation);
        stored.name = "projects/p1/occurrences/42".to_string();

        let listed = to_pgp_attestation(&stored).unwrap();
        assert_eq!(listed.occurrence_id, "projects/p1/occurrences/42");
        assert_eq!(listed.key_id, "qa-signer");
        assert_eq!(listed.signature, attestation.signature);

        let occurrence = to_occurrence(&stored).unwrap();
        assert_eq!(occurrence.resource_url, format!("https://{IMAGE}"));
        assert_eq!(occurrence.note_name, note.name);

        assert!(to_pgp_attestation(&ApiOccurrence::default()).is_none());
    }

    #[test]
    fn test_attestation_note_body() {
        let authority = AttestationAuthority {
            name: "qa".to_string(),
            note_reference: "projects/p1".to_string(),
            public_key_data: String::new(),
        };

        let body = attestation_note(&authority);
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"kind": "ATTESTATION", "attestationAuthority": {"hint": {"humanReadableName": "qa"}}})
        );

        let created = ApiNote {
            name: authority.note_name(),
            ..body
        };
        let note = to_note(&created);
        assert_eq!(note.name, "projects/p1/notes/qa");
        assert_eq!(note.human_readable_name, "qa");
    }
}
