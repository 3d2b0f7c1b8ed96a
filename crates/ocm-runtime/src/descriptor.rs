//! Canonical descriptor shapes exchanged with capability handlers.
//!
//! These mirror the parts of a component descriptor the plugin layer passes
//! around. They are the in-process representation; the wire form lives in
//! the plugin crate's DTOs.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::raw::Raw;

/// Name, version, labels and extra identity of a descriptor element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementMeta {
    /// Element name, unique within its component.
    pub name: String,
    /// Element version.
    pub version: String,
    /// Attached labels.
    pub labels: Vec<Label>,
    /// Identity attributes beyond name and version.
    pub extra_identity: BTreeMap<String, String>,
}

impl ElementMeta {
    /// Create metadata with a name and version.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }
}

/// A label: an arbitrary JSON value attached to an element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Label {
    /// Label name.
    pub name: String,
    /// Label value.
    pub value: Value,
    /// Optional label format version.
    pub version: Option<String>,
    /// Whether the label is covered by signatures.
    pub signing: bool,
}

/// A digest of an element's content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Digest {
    /// e.g. `SHA-256`.
    pub hash_algorithm: String,
    /// e.g. `genericBlobDigest/v1`.
    pub normalisation_algorithm: String,
    /// Hex-encoded digest value.
    pub value: String,
}

/// Reference from a resource to the sources it was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRef {
    /// Identity attributes selecting the source.
    pub identity_selector: BTreeMap<String, String>,
    /// Labels on the reference.
    pub labels: Vec<Label>,
}

/// Whether a resource is produced by the component's owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ResourceRelation {
    /// Built and delivered with the component.
    #[default]
    Local,
    /// Third-party artifact referenced by the component.
    External,
}

impl ResourceRelation {
    /// The descriptor string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::External => "external",
        }
    }

    /// Parse the descriptor string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "local" => Some(Self::Local),
            "external" => Some(Self::External),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource of a component version.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resource {
    /// Name, version, labels and extra identity.
    pub meta: ElementMeta,
    /// Artifact type, e.g. `ociImage` or `helmChart`.
    pub typ: String,
    /// Local or external.
    pub relation: ResourceRelation,
    /// Sources the resource was built from.
    pub source_refs: Vec<SourceRef>,
    /// Typed access specification describing where the bytes live.
    pub access: Option<Raw>,
    /// Content digest, if computed.
    pub digest: Option<Digest>,
    /// Content size in bytes, if known.
    pub size: Option<u64>,
    /// When the resource was created.
    pub creation_time: Option<DateTime<Utc>>,
}

impl Resource {
    /// Create a resource with name, version and artifact type.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        typ: impl Into<String>,
    ) -> Self {
        Self {
            meta: ElementMeta::new(name, version),
            typ: typ.into(),
            ..Self::default()
        }
    }

    /// Set the access specification.
    #[must_use]
    pub fn with_access(mut self, access: Raw) -> Self {
        self.access = Some(access);
        self
    }
}

/// Kind of location holding a resource's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocationType {
    /// A path on the local filesystem.
    #[serde(rename = "localFile")]
    LocalFile,
    /// A URL the caller can fetch.
    #[serde(rename = "remoteURL")]
    RemoteUrl,
    /// A named pipe the caller reads from.
    #[serde(rename = "unixNamedPipe")]
    UnixNamedPipe,
}

/// Where a resource's bytes can be read from or written to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// The kind of location.
    pub location_type: LocationType,
    /// Path, URL or pipe name.
    pub value: String,
    /// Media type of the content, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl Location {
    /// A local file location.
    #[must_use]
    pub fn local_file(path: impl Into<String>) -> Self {
        Self {
            location_type: LocationType::LocalFile,
            value: path.into(),
            media_type: None,
        }
    }

    /// A remote URL location.
    #[must_use]
    pub fn remote_url(url: impl Into<String>) -> Self {
        Self {
            location_type: LocationType::RemoteUrl,
            value: url.into(),
            media_type: None,
        }
    }

    /// Set the media type.
    #[must_use]
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_relation_strings() {
        assert_eq!(ResourceRelation::parse("local"), Some(ResourceRelation::Local));
        assert_eq!(
            ResourceRelation::parse("external"),
            Some(ResourceRelation::External)
        );
        assert_eq!(ResourceRelation::parse("remote"), None);
        assert_eq!(ResourceRelation::External.to_string(), "external");
    }

    #[test]
    fn test_location_wire_form() {
        let location =
            Location::remote_url("https://example.com/blob").with_media_type("application/json");
        assert_eq!(
            serde_json::to_value(&location).unwrap(),
            json!({
                "locationType": "remoteURL",
                "value": "https://example.com/blob",
                "mediaType": "application/json"
            })
        );

        let local: Location =
            serde_json::from_value(json!({"locationType": "localFile", "value": "/tmp/x"}))
                .unwrap();
        assert_eq!(local, Location::local_file("/tmp/x"));
    }
}
