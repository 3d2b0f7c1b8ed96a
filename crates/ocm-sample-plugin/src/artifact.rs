//! Artifacts stored as local files: downloads, uploads and digests.

use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;
use ocm_plugin::capability::{DigestProcessorContract, ResourcePluginContract};
use ocm_plugin::wire::{
    AddGlobalResourceRequest, AddGlobalResourceResponse, DigestDto, GetGlobalResourceRequest,
    GetGlobalResourceResponse, GetIdentityRequest, GetIdentityResponse,
    ProcessResourceDigestRequest, ProcessResourceDigestResponse, ResourceDto,
};
use ocm_plugin::{PluginError, PluginResult};
use ocm_runtime::{
    Credentials, Identity, Location, LocationType, Raw, Scheme, SchemeError, Type, Typed,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Hash algorithm reported in digests.
pub const HASH_ALGORITHM: &str = "SHA-256";
/// Normalisation reported in digests: the raw bytes.
pub const NORMALISATION: &str = "genericBlobDigest/v1";

const READ_CHUNK: usize = 65_536;

/// Access specification of an artifact file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SampleArtifact {
    #[serde(rename = "type")]
    pub typ: Type,
    /// Absolute path of the artifact file.
    pub path: String,
    /// Media type of the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl Typed for SampleArtifact {
    fn get_type(&self) -> &Type {
        &self.typ
    }

    fn set_type(&mut self, typ: Type) {
        self.typ = typ;
    }
}

/// Register [`SampleArtifact`] as `SampleArtifact/v1` with the unversioned alias.
pub fn register(scheme: &mut Scheme) -> Result<(), SchemeError> {
    scheme.register_with_alias::<SampleArtifact>([
        Type::versioned("SampleArtifact", "v1"),
        Type::new("SampleArtifact"),
    ])
}

/// Serves [`SampleArtifact`] resources from the local filesystem.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    scheme: Scheme,
}

impl ArtifactStore {
    pub fn new(scheme: Scheme) -> Self {
        Self { scheme }
    }

    fn decode(&self, access: &Raw) -> PluginResult<SampleArtifact> {
        Ok(self.scheme.decode(access)?)
    }

    fn artifact(&self, resource: &ResourceDto) -> PluginResult<SampleArtifact> {
        let access = resource.access.as_ref().ok_or_else(|| {
            PluginError::rejected(400, format!("resource {} has no access", resource.name))
        })?;
        self.decode(access)
    }

    fn identity(&self, access: &Raw) -> PluginResult<GetIdentityResponse> {
        let artifact = self.decode(access)?;
        Ok(GetIdentityResponse {
            identity: Identity::from_pairs([("path", artifact.path)]),
        })
    }
}

fn not_found(path: &str, error: std::io::Error) -> PluginError {
    if error.kind() == ErrorKind::NotFound {
        PluginError::rejected(404, format!("artifact {path} does not exist"))
    } else {
        error.into()
    }
}

/// SHA-256 of a file, hex encoded, and its size.
async fn sha256_file(path: &str) -> PluginResult<(String, u64)> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| not_found(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(buf.get(..n).unwrap_or_default());
        size = size.saturating_add(n as u64);
    }
    Ok((hex::encode(hasher.finalize()), size))
}

#[async_trait]
impl ResourcePluginContract for ArtifactStore {
    async fn get_identity(
        &self,
        request: &GetIdentityRequest,
    ) -> PluginResult<GetIdentityResponse> {
        self.identity(&request.typ)
    }

    async fn get_global_resource(
        &self,
        request: &GetGlobalResourceRequest,
        _credentials: &Credentials,
    ) -> PluginResult<GetGlobalResourceResponse> {
        let artifact = self.artifact(&request.resource)?;
        tokio::fs::metadata(&artifact.path)
            .await
            .map_err(|e| not_found(&artifact.path, e))?;

        debug!(path = %artifact.path, "Serving artifact");
        let mut location = Location::local_file(artifact.path);
        location.media_type = artifact.media_type;
        Ok(GetGlobalResourceResponse { location })
    }

    async fn add_global_resource(
        &self,
        request: &AddGlobalResourceRequest,
        _credentials: &Credentials,
    ) -> PluginResult<AddGlobalResourceResponse> {
        let artifact = self.artifact(&request.resource)?;
        let source = &request.resource_location;
        if source.location_type != LocationType::LocalFile {
            return Err(PluginError::rejected(
                400,
                format!("cannot upload from {:?} locations", source.location_type),
            ));
        }

        if let Some(dir) = Path::new(&artifact.path).parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let size = tokio::fs::copy(&source.value, &artifact.path)
            .await
            .map_err(|e| not_found(&source.value, e))?;
        info!(from = %source.value, to = %artifact.path, size, "Stored artifact");

        let mut resource = request.resource.clone();
        resource.size = Some(size);
        Ok(AddGlobalResourceResponse { resource })
    }
}

#[async_trait]
impl DigestProcessorContract for ArtifactStore {
    async fn get_identity(
        &self,
        request: &GetIdentityRequest,
    ) -> PluginResult<GetIdentityResponse> {
        self.identity(&request.typ)
    }

    async fn process_resource_digest(
        &self,
        request: &ProcessResourceDigestRequest,
        _credentials: &Credentials,
    ) -> PluginResult<ProcessResourceDigestResponse> {
        let artifact = self.artifact(&request.resource)?;
        let (value, size) = sha256_file(&artifact.path).await?;
        debug!(path = %artifact.path, digest = %value, "Computed digest");

        let mut resource = request.resource.clone();
        resource.digest = Some(DigestDto {
            hash_algorithm: HASH_ALGORITHM.to_string(),
            normalisation_algorithm: NORMALISATION.to_string(),
            value,
        });
        resource.size = Some(size);
        Ok(ProcessResourceDigestResponse { resource })
    }
}
