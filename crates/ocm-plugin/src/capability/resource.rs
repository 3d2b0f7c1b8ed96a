//! Resource repository capability: download and upload resources.

use std::sync::Arc;

use async_trait::async_trait;
use ocm_runtime::{Credentials, Identity, Location, Raw, Resource};

use super::Capability;
use crate::client::PluginClient;
use crate::convert::{resource_from_wire, resource_to_wire};
use crate::error::PluginResult;
use crate::types::PluginType;
use crate::wire::{
    self, AddGlobalResourceRequest, AddGlobalResourceResponse, GetGlobalResourceRequest,
    GetGlobalResourceResponse, GetIdentityRequest, GetIdentityResponse, ResourceDto,
};

/// Wire contract of a resource repository plugin.
#[async_trait]
pub trait ResourcePluginContract: Send + Sync {
    /// Liveness check.
    async fn ping(&self) -> PluginResult<()> {
        Ok(())
    }

    /// Credential-lookup identity of an access specification.
    async fn get_identity(&self, request: &GetIdentityRequest) -> PluginResult<GetIdentityResponse>;

    /// Locate or download a resource.
    async fn get_global_resource(
        &self,
        request: &GetGlobalResourceRequest,
        credentials: &Credentials,
    ) -> PluginResult<GetGlobalResourceResponse>;

    /// Upload a resource from a location; returns the updated resource.
    async fn add_global_resource(
        &self,
        request: &AddGlobalResourceRequest,
        credentials: &Credentials,
    ) -> PluginResult<AddGlobalResourceResponse>;
}

/// Canonical resource repository.
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    /// Liveness check; a no-op for in-process handlers.
    async fn ping(&self) -> PluginResult<()> {
        Ok(())
    }

    /// Credential-lookup identity of an access specification.
    async fn resource_identity(&self, access: &Raw) -> PluginResult<Identity>;

    /// Make a resource's bytes available and say where.
    async fn download_resource(
        &self,
        resource: &Resource,
        credentials: &Credentials,
    ) -> PluginResult<Location>;

    /// Store the bytes at `source` and return the resource with its new access.
    async fn upload_resource(
        &self,
        resource: &Resource,
        source: &Location,
        credentials: &Credentials,
    ) -> PluginResult<Resource>;
}

fn validate_access(client: &PluginClient, resource: &ResourceDto) -> PluginResult<()> {
    match &resource.access {
        Some(access) => client.validate(access),
        None => Ok(()),
    }
}

/// Client stub for an external resource repository.
#[derive(Debug, Clone)]
pub struct ResourcePluginClient {
    client: PluginClient,
}

impl ResourcePluginClient {
    /// Wrap an RPC client.
    #[must_use]
    pub fn new(client: PluginClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourcePluginContract for ResourcePluginClient {
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

    async fn get_global_resource(
        &self,
        request: &GetGlobalResourceRequest,
        credentials: &Credentials,
    ) -> PluginResult<GetGlobalResourceResponse> {
        validate_access(&self.client, &request.resource)?;
        self.client
            .call(wire::RESOURCE_GET, request, credentials)
            .await
    }

    async fn add_global_resource(
        &self,
        request: &AddGlobalResourceRequest,
        credentials: &Credentials,
    ) -> PluginResult<AddGlobalResourceResponse> {
        validate_access(&self.client, &request.resource)?;
        self.client
            .call(wire::RESOURCE_ADD, request, credentials)
            .await
    }
}

/// Adapts a wire contract to [`ResourceRepository`].
#[derive(Clone)]
pub struct ResourcePluginConverter {
    contract: Arc<dyn ResourcePluginContract>,
}

impl ResourcePluginConverter {
    /// Wrap a wire contract.
    #[must_use]
    pub fn new(contract: Arc<dyn ResourcePluginContract>) -> Self {
        Self { contract }
    }
}

#[async_trait]
impl ResourceRepository for ResourcePluginConverter {
    async fn ping(&self) -> PluginResult<()> {
        self.contract.ping().await
    }

    async fn resource_identity(&self, access: &Raw) -> PluginResult<Identity> {
        let request = GetIdentityRequest { typ: access.clone() };
        Ok(self.contract.get_identity(&request).await?.identity)
    }

    async fn download_resource(
        &self,
        resource: &Resource,
        credentials: &Credentials,
    ) -> PluginResult<Location> {
        let request = GetGlobalResourceRequest {
            resource: resource_to_wire(resource),
        };
        Ok(self
            .contract
            .get_global_resource(&request, credentials)
            .await?
            .location)
    }

    async fn upload_resource(
        &self,
        resource: &Resource,
        source: &Location,
        credentials: &Credentials,
    ) -> PluginResult<Resource> {
        let request = AddGlobalResourceRequest {
            resource: resource_to_wire(resource),
            resource_location: source.clone(),
        };
        let response = self.contract.add_global_resource(&request, credentials).await?;
        resource_from_wire(&response.resource)
    }
}

/// The resource repository capability.
#[derive(Debug)]
pub struct ResourceCapability;

impl Capability for ResourceCapability {
    type Handler = dyn ResourceRepository;

    const PLUGIN_TYPE: PluginType = PluginType::ResourceRepository;

    fn connect(client: PluginClient) -> Arc<Self::Handler> {
        Arc::new(ResourcePluginConverter::new(Arc::new(
            ResourcePluginClient::new(client),
        )))
    }
}
