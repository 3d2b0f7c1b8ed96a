//! Host client against served endpoints, over real sockets.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ocm_plugin::capability::{
    Capability, ComponentLister, ComponentListerContract, ListerCapability, ResourceCapability,
    ResourcePluginContract, ResourceRepository,
};
use ocm_plugin::wire::{
    AddGlobalResourceRequest, AddGlobalResourceResponse, GetGlobalResourceRequest,
    GetGlobalResourceResponse, GetIdentityRequest, GetIdentityResponse, ListComponentsRequest,
    ListComponentsResponse, ListComponentsResponseHeader,
};
use ocm_plugin::{
    BoundPlugin, ConnectionType, Endpoints, HttpTransport, LaunchConfig, PluginClient, PluginError,
    PluginId, PluginLocation, PluginResult, PluginType,
};
use ocm_runtime::{Credentials, Identity, Location, Raw, Resource, Scheme, Type, Typed};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
struct LocalBlob {
    #[serde(rename = "type")]
    typ: Type,
    path: String,
}

impl Typed for LocalBlob {
    fn get_type(&self) -> &Type {
        &self.typ
    }
    fn set_type(&mut self, typ: Type) {
        self.typ = typ;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
struct Catalog {
    #[serde(rename = "type")]
    typ: Type,
}

impl Typed for Catalog {
    fn get_type(&self) -> &Type {
        &self.typ
    }
    fn set_type(&mut self, typ: Type) {
        self.typ = typ;
    }
}

/// Serves blobs; downloads require a token.
struct BlobStore;

#[async_trait]
impl ResourcePluginContract for BlobStore {
    async fn get_identity(
        &self,
        request: &GetIdentityRequest,
    ) -> PluginResult<GetIdentityResponse> {
        let path = request
            .typ
            .field("path")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        Ok(GetIdentityResponse {
            identity: Identity::from_pairs([("path", path)]),
        })
    }

    async fn get_global_resource(
        &self,
        request: &GetGlobalResourceRequest,
        credentials: &Credentials,
    ) -> PluginResult<GetGlobalResourceResponse> {
        if credentials.get("token") != Some("s3cr3t") {
            return Err(PluginError::rejected(401, "missing or wrong token"));
        }
        Ok(GetGlobalResourceResponse {
            location: Location::local_file(format!("/cache/{}", request.resource.name)),
        })
    }

    async fn add_global_resource(
        &self,
        request: &AddGlobalResourceRequest,
        _: &Credentials,
    ) -> PluginResult<AddGlobalResourceResponse> {
        let mut resource = request.resource.clone();
        resource.size = Some(42);
        Ok(AddGlobalResourceResponse { resource })
    }
}

/// Five components, two per page.
struct FiveComponents;

#[async_trait]
impl ComponentListerContract for FiveComponents {
    async fn get_identity(&self, _: &GetIdentityRequest) -> PluginResult<GetIdentityResponse> {
        Ok(GetIdentityResponse {
            identity: Identity::new(),
        })
    }

    async fn list_components(
        &self,
        request: &ListComponentsRequest,
        _: &Credentials,
    ) -> PluginResult<ListComponentsResponse> {
        let all = ["a", "b", "c", "d", "e"];
        let start = all
            .iter()
            .position(|c| *c == request.last)
            .map_or(0, |i| i.saturating_add(1));
        let list: Vec<String> = all.iter().skip(start).take(2).map(ToString::to_string).collect();
        let header = list.last().map(|last| ListComponentsResponseHeader { last: last.clone() });
        Ok(ListComponentsResponse { list, header })
    }
}

fn endpoints() -> Endpoints {
    let mut scheme = Scheme::new();
    scheme
        .register_with_alias::<LocalBlob>([
            Type::versioned("LocalBlob", "v1"),
            Type::new("LocalBlob"),
        ])
        .unwrap();
    scheme.register::<Catalog>(Type::versioned("Catalog", "v1")).unwrap();
    Endpoints::new(scheme)
        .with_resource_repository::<LocalBlob>(Arc::new(BlobStore))
        .unwrap()
        .with_component_lister::<Catalog>(Arc::new(FiveComponents))
        .unwrap()
}

struct Running {
    location: PluginLocation,
    cancel: CancellationToken,
    task: JoinHandle<PluginResult<()>>,
}

impl Running {
    async fn start(config: LaunchConfig) -> Self {
        let bound: BoundPlugin = endpoints().bind(&config).await.unwrap();
        let location = bound.location().clone();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(bound.run_until(cancel.clone()));
        Self {
            location,
            cancel,
            task,
        }
    }

    fn client(&self) -> PluginClient {
        PluginClient::new(
            PluginId::from_static("blob-store"),
            Arc::new(HttpTransport::new(self.location.clone())),
        )
    }

    async fn stop(self) {
        self.cancel.cancel();
        self.task.await.unwrap().unwrap();
    }
}

fn blob(path: &str) -> Raw {
    Raw::from_value(json!({"type": "LocalBlob/v1", "path": path})).unwrap()
}

async fn exercise_resource_repository(running: &Running) {
    let client = running.client();
    client.ping().await.unwrap();
    let repository = ResourceCapability::connect(client);

    let identity = repository.resource_identity(&blob("/data/a")).await.unwrap();
    assert_eq!(identity.get("path"), Some("/data/a"));

    let resource = Resource::new("app", "1.0.0", "blob").with_access(blob("/data/a"));
    let location = repository
        .download_resource(&resource, &Credentials::from_pairs([("token", "s3cr3t")]))
        .await
        .unwrap();
    assert_eq!(location, Location::local_file("/cache/app"));

    let uploaded = repository
        .upload_resource(&resource, &Location::local_file("/tmp/app"), &Credentials::new())
        .await
        .unwrap();
    assert_eq!(uploaded.size, Some(42));
    assert_eq!(uploaded.access, resource.access);
}

#[tokio::test]
async fn test_resource_round_trip_over_socket() {
    let dir = tempfile::tempdir().unwrap();
    let config = LaunchConfig::new(
        "blob-resource",
        ConnectionType::Socket,
        PluginType::ResourceRepository,
    )
    .with_socket_dir(dir.path());
    let socket = config.socket_path();

    let running = Running::start(config).await;
    assert_eq!(running.location, PluginLocation::Socket(socket.clone()));
    exercise_resource_repository(&running).await;

    running.stop().await;
    assert!(!socket.exists(), "socket file left behind");
}

#[tokio::test]
async fn test_resource_round_trip_over_tcp() {
    let config =
        LaunchConfig::new("blob-resource", ConnectionType::Tcp, PluginType::ResourceRepository);
    let running = Running::start(config).await;
    assert!(matches!(running.location, PluginLocation::Tcp(addr) if addr.ip().is_loopback()));
    exercise_resource_repository(&running).await;
    running.stop().await;
}

#[tokio::test]
async fn test_stale_socket_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let config = LaunchConfig::new("stale", ConnectionType::Socket, PluginType::ResourceRepository)
        .with_socket_dir(dir.path());
    std::fs::write(config.socket_path(), b"left over").unwrap();

    let running = Running::start(config).await;
    running.client().ping().await.unwrap();
    running.stop().await;
}

#[tokio::test]
async fn test_rejection_status_reaches_the_host() {
    let running = Running::start(LaunchConfig::new(
        "blob-resource",
        ConnectionType::Tcp,
        PluginType::ResourceRepository,
    ))
    .await;
    let repository = ResourceCapability::connect(running.client());

    let resource = Resource::new("app", "1.0.0", "blob").with_access(blob("/data/a"));
    let err = repository
        .download_resource(&resource, &Credentials::new())
        .await
        .unwrap_err();
    match err {
        PluginError::Application { status, message, .. } => {
            assert_eq!(status, 401);
            assert_eq!(message, "missing or wrong token");
        },
        other => panic!("expected application error, got {other}"),
    }
    running.stop().await;
}

#[tokio::test]
async fn test_unserved_type_is_bad_request() {
    let running = Running::start(LaunchConfig::new(
        "blob-resource",
        ConnectionType::Tcp,
        PluginType::ResourceRepository,
    ))
    .await;
    let repository = ResourceCapability::connect(running.client());

    let foreign = Raw::from_value(json!({"type": "OCIImage/v1"})).unwrap();
    let err = repository.resource_identity(&foreign).await.unwrap_err();
    assert!(
        matches!(err, PluginError::Application { status: 400, .. }),
        "got {err}"
    );
    running.stop().await;
}

#[tokio::test]
async fn test_capability_routes_are_separate() {
    let running = Running::start(LaunchConfig::new(
        "catalog-lister",
        ConnectionType::Tcp,
        PluginType::ComponentLister,
    ))
    .await;
    let repository = ResourceCapability::connect(running.client());
    let resource = Resource::new("app", "1.0.0", "blob").with_access(blob("/data/a"));
    let err = repository
        .download_resource(&resource, &Credentials::new())
        .await
        .unwrap_err();
    assert!(
        matches!(err, PluginError::Protocol { status: 404, .. }),
        "got {err}"
    );
    running.stop().await;
}

#[tokio::test]
async fn test_listing_pages_over_http() {
    let running = Running::start(LaunchConfig::new(
        "catalog-lister",
        ConnectionType::Tcp,
        PluginType::ComponentLister,
    ))
    .await;
    let lister = ListerCapability::connect(running.client());

    let repository = Raw::from_value(json!({"type": "Catalog/v1"})).unwrap();
    let mut names = Vec::new();
    let mut page_sizes = Vec::new();
    lister
        .list_components(&repository, "", &Credentials::new(), &mut |page| {
            page_sizes.push(page.len());
            names.extend(page);
            Ok(())
        })
        .await
        .unwrap();
    assert_eq!(names, ["a", "b", "c", "d", "e"]);
    assert_eq!(page_sizes, [2, 2, 1, 0]);
    running.stop().await;
}

#[tokio::test]
async fn test_idle_timeout_stops_the_server() {
    let config = LaunchConfig::new("idle", ConnectionType::Tcp, PluginType::ResourceRepository)
        .with_idle_timeout(Some(1));
    let bound = endpoints().bind(&config).await.unwrap();
    let location = bound.location().clone();
    let server = tokio::spawn(bound.run_until(CancellationToken::new()));

    PluginClient::new(PluginId::from_static("idle"), Arc::new(HttpTransport::new(location)))
        .ping()
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not stop after the idle timeout")
        .unwrap()
        .unwrap();
}
