//! Wire DTOs and HTTP paths of the plugin RPC protocol.
//!
//! Field names follow the camelCase JSON of the component descriptor
//! format so requests can be read by plugins in any language.

use std::collections::BTreeMap;

use ocm_runtime::{Identity, Location, Raw};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Liveness check.
pub const HEALTHZ: &str = "/healthz";
/// Credential-lookup identity of a typed object.
pub const IDENTITY: &str = "/identity";
/// Download or locate a resource.
pub const RESOURCE_GET: &str = "/resource/get";
/// Upload a resource.
pub const RESOURCE_ADD: &str = "/resource/add";
/// Compute a resource digest.
pub const DIGEST_PROCESS: &str = "/resource/digest/process";
/// One page of component names.
pub const COMPONENT_LIST: &str = "/component/list";

/// A label on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelDto {
    pub name: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub signing: bool,
}

/// A digest on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestDto {
    pub hash_algorithm: String,
    pub normalisation_algorithm: String,
    pub value: String,
}

/// A source reference on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRefDto {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub identity_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<LabelDto>,
}

/// A resource on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDto {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_identity: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<LabelDto>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub src_refs: Vec<SourceRefDto>,
    #[serde(rename = "type")]
    pub typ: String,
    pub relation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<Raw>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<DigestDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// RFC 3339 timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetIdentityRequest {
    pub typ: Raw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetIdentityResponse {
    pub identity: Identity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetGlobalResourceRequest {
    pub resource: ResourceDto,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetGlobalResourceResponse {
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddGlobalResourceRequest {
    pub resource: ResourceDto,
    pub resource_location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddGlobalResourceResponse {
    pub resource: ResourceDto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessResourceDigestRequest {
    pub resource: ResourceDto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessResourceDigestResponse {
    pub resource: ResourceDto,
}

/// One page request; an empty `last` starts from the beginning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListComponentsRequest {
    pub repository: Raw,
    #[serde(default)]
    pub last: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListComponentsResponseHeader {
    pub last: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListComponentsResponse {
    pub list: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<ListComponentsResponseHeader>,
}

/// Body of every non-2xx response a plugin built on these endpoints sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_dto_field_names() {
        let dto: ResourceDto = serde_json::from_value(json!({
            "name": "app",
            "version": "1.0.0",
            "type": "ociImage",
            "relation": "external",
            "extraIdentity": {"arch": "amd64"},
            "srcRefs": [{"identitySelector": {"name": "src"}}],
            "access": {"type": "OCIImage/v1", "imageReference": "ghcr.io/acme/app:1.0"},
            "digest": {
                "hashAlgorithm": "SHA-256",
                "normalisationAlgorithm": "ociArtifactDigest/v1",
                "value": "abc"
            },
            "creationTime": "2024-01-02T03:04:05Z"
        }))
        .unwrap();

        assert_eq!(dto.extra_identity["arch"], "amd64");
        assert_eq!(dto.src_refs[0].identity_selector["name"], "src");
        assert_eq!(dto.digest.as_ref().unwrap().hash_algorithm, "SHA-256");
        assert_eq!(dto.creation_time.as_deref(), Some("2024-01-02T03:04:05Z"));

        let back = serde_json::to_value(&dto).unwrap();
        assert!(back.get("labels").is_none());
        assert_eq!(back["access"]["imageReference"], "ghcr.io/acme/app:1.0");
    }

    #[test]
    fn test_list_response_header_is_optional() {
        let page: ListComponentsResponse =
            serde_json::from_value(json!({"list": ["a", "b"]})).unwrap();
        assert!(page.header.is_none());

        let request: ListComponentsRequest =
            serde_json::from_value(json!({"repository": {"type": "repo/v1"}})).unwrap();
        assert!(request.last.is_empty());
    }

    #[test]
    fn test_add_request_field_names() {
        let value = json!({
            "resource": {"name": "a", "version": "1", "type": "blob", "relation": "local"},
            "resourceLocation": {"locationType": "localFile", "value": "/tmp/a"}
        });
        let request: AddGlobalResourceRequest = serde_json::from_value(value).unwrap();
        assert_eq!(request.resource_location, Location::local_file("/tmp/a"));
    }
}
