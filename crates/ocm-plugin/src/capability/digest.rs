//! Digest processor capability: compute and attach resource digests.

use std::sync::Arc;

use async_trait::async_trait;
use ocm_runtime::{Credentials, Identity, Raw, Resource};

use super::Capability;
use crate::client::PluginClient;
use crate::convert::{resource_from_wire, resource_to_wire};
use crate::error::PluginResult;
use crate::types::PluginType;
use crate::wire::{
    self, GetIdentityRequest, GetIdentityResponse, ProcessResourceDigestRequest,
    ProcessResourceDigestResponse,
};

/// Wire contract of a digest processor plugin.
#[async_trait]
pub trait DigestProcessorContract: Send + Sync {
    /// Liveness check.
    async fn ping(&self) -> PluginResult<()> {
        Ok(())
    }

    /// Credential-lookup identity of an access specification.
    async fn get_identity(&self, request: &GetIdentityRequest) -> PluginResult<GetIdentityResponse>;

    /// Return the resource with its digest filled in.
    async fn process_resource_digest(
        &self,
        request: &ProcessResourceDigestRequest,
        credentials: &Credentials,
    ) -> PluginResult<ProcessResourceDigestResponse>;
}

/// Canonical digest processor.
#[async_trait]
pub trait DigestProcessor: Send + Sync {
    /// Liveness check; a no-op for in-process handlers.
    async fn ping(&self) -> PluginResult<()> {
        Ok(())
    }

    /// Credential-lookup identity of an access specification.
    async fn digest_identity(&self, access: &Raw) -> PluginResult<Identity>;

    /// Return the resource with its digest filled in.
    async fn process_digest(
        &self,
        resource: &Resource,
        credentials: &Credentials,
    ) -> PluginResult<Resource>;
}

/// Client stub for an external digest processor.
#[derive(Debug, Clone)]
pub struct DigestPluginClient {
    client: PluginClient,
}

impl DigestPluginClient {
    /// Wrap an RPC client.
    #[must_use]
    pub fn new(client: PluginClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DigestProcessorContract for DigestPluginClient {
    async fn ping(&self) -> PluginResult<()> {
        self.client.ping().await
    }

    async fn get_identity(
        &self,
        request: &GetIdentityRequest,
    ) -> PluginResult<GetIdentityResponse> {
        self.client.validate(&request.typ)?;
        self.client
            .call(wire::IDENTITY, request, &Credentials::new())
            .await
    }

    async fn process_resource_digest(
        &self,
        request: &ProcessResourceDigestRequest,
        credentials: &Credentials,
    ) -> PluginResult<ProcessResourceDigestResponse> {
        if let Some(access) = &request.resource.access {
            self.client.validate(access)?;
        }
        self.client
            .call(wire::DIGEST_PROCESS, request, credentials)
            .await
    }
}

/// Adapts a wire contract to [`DigestProcessor`].
#[derive(Clone)]
pub struct DigestProcessorConverter {
    contract: Arc<dyn DigestProcessorContract>,
}

impl DigestProcessorConverter {
    /// Wrap a wire contract.
    #[must_use]
    pub fn new(contract: Arc<dyn DigestProcessorContract>) -> Self {
        Self { contract }
    }
}

#[async_trait]
impl DigestProcessor for DigestProcessorConverter {
    async fn ping(&self) -> PluginResult<()> {
        self.contract.ping().await
    }

    async fn digest_identity(&self, access: &Raw) -> PluginResult<Identity> {
        let request = GetIdentityRequest { typ: access.clone() };
        Ok(self.contract.get_identity(&request).await?.identity)
    }

    async fn process_digest(
        &self,
        resource: &Resource,
        credentials: &Credentials,
    ) -> PluginResult<Resource> {
        let request = ProcessResourceDigestRequest {
            resource: resource_to_wire(resource),
        };
        let response = self
            .contract
            .process_resource_digest(&request, credentials)
            .await?;
        resource_from_wire(&response.resource)
    }
}

/// The digest processor capability.
#[derive(Debug)]
pub struct DigestCapability;

impl Capability for DigestCapability {
    type Handler = dyn DigestProcessor;

    const PLUGIN_TYPE: PluginType = PluginType::DigestProcessor;

    fn connect(client: PluginClient) -> Arc<Self::Handler> {
        Arc::new(DigestProcessorConverter::new(Arc::new(
            DigestPluginClient::new(client),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::MockTransport;
    use crate::error::PluginError;
    use crate::transport::Transport;
    use crate::types::PluginId;
    use crate::wire::DigestDto;
    use serde_json::json;

    struct FixedDigest;

    #[async_trait]
    impl DigestProcessorContract for FixedDigest {
        async fn get_identity(
            &self,
            _request: &GetIdentityRequest,
        ) -> PluginResult<GetIdentityResponse> {
            Ok(GetIdentityResponse {
                identity: Identity::new(),
            })
        }

        async fn process_resource_digest(
            &self,
            request: &ProcessResourceDigestRequest,
            _credentials: &Credentials,
        ) -> PluginResult<ProcessResourceDigestResponse> {
            let mut resource = request.resource.clone();
            resource.digest = Some(DigestDto {
                hash_algorithm: "SHA-256".into(),
                normalisation_algorithm: "genericBlobDigest/v1".into(),
                value: "abcd".into(),
            });
            Ok(ProcessResourceDigestResponse { resource })
        }
    }

    #[tokio::test]
    async fn test_converter_returns_canonical_digest() {
        let processor = DigestProcessorConverter::new(Arc::new(FixedDigest));
        let resource = Resource::new("blob", "1.0.0", "plainText");

        let processed = processor
            .process_digest(&resource, &Credentials::new())
            .await
            .unwrap();
        let digest = processed.digest.unwrap();
        assert_eq!(digest.hash_algorithm, "SHA-256");
        assert_eq!(digest.value, "abcd");
        assert_eq!(processed.meta, resource.meta);
    }

    #[tokio::test]
    async fn test_application_error_surfaces_unchanged() {
        let transport = Arc::new(MockTransport::replying([(
            422,
            json!({"error": "unsupported access"}),
        )]));
        let processor = DigestCapability::connect(PluginClient::new(
            PluginId::from_static("digester"),
            Arc::clone(&transport) as Arc<dyn Transport>,
        ));

        let err = processor
            .process_digest(&Resource::new("a", "1", "blob"), &Credentials::new())
            .await
            .unwrap_err();
        let PluginError::Application { message, operation, .. } = err else {
            panic!("expected application error, got {err}");
        };
        assert_eq!(message, "unsupported access");
        assert_eq!(operation, wire::DIGEST_PROCESS);
        assert_eq!(transport.call_count(), 1);
    }
}
