//! Component lister capability: page through a repository's components.

use std::sync::Arc;

use async_trait::async_trait;
use ocm_runtime::{Credentials, Identity, Raw};

use super::Capability;
use crate::client::PluginClient;
use crate::error::PluginResult;
use crate::paginate::{Page, paginate};
use crate::types::PluginType;
use crate::wire::{
    self, GetIdentityRequest, GetIdentityResponse, ListComponentsRequest, ListComponentsResponse,
};

/// Receives each page of component names. Returning an error stops listing.
pub type PageCallback<'a> = dyn FnMut(Vec<String>) -> PluginResult<()> + Send + 'a;

/// Wire contract of a component lister plugin.
#[async_trait]
pub trait ComponentListerContract: Send + Sync {
    /// Liveness check.
    async fn ping(&self) -> PluginResult<()> {
        Ok(())
    }

    /// Credential-lookup identity of a repository specification.
    async fn get_identity(&self, request: &GetIdentityRequest) -> PluginResult<GetIdentityResponse>;

    /// One page of component names after `request.last`.
    async fn list_components(
        &self,
        request: &ListComponentsRequest,
        credentials: &Credentials,
    ) -> PluginResult<ListComponentsResponse>;
}

/// Canonical component lister.
#[async_trait]
pub trait ComponentLister: Send + Sync {
    /// Liveness check; a no-op for in-process handlers.
    async fn ping(&self) -> PluginResult<()> {
        Ok(())
    }

    /// Credential-lookup identity of a repository specification.
    async fn lister_identity(&self, repository: &Raw) -> PluginResult<Identity>;

    /// Feed every component name after `last` to `callback`, page by page.
    async fn list_components(
        &self,
        repository: &Raw,
        last: &str,
        credentials: &Credentials,
        callback: &mut PageCallback<'_>,
    ) -> PluginResult<()>;
}

/// Client stub for an external component lister.
#[derive(Debug, Clone)]
pub struct ListerPluginClient {
    client: PluginClient,
}

impl ListerPluginClient {
    /// Wrap an RPC client.
    #[must_use]
    pub fn new(client: PluginClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ComponentListerContract for ListerPluginClient {
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

    async fn list_components(
        &self,
        request: &ListComponentsRequest,
        credentials: &Credentials,
    ) -> PluginResult<ListComponentsResponse> {
        self.client.validate(&request.repository)?;
        self.client
            .call(wire::COMPONENT_LIST, request, credentials)
            .await
    }
}

/// Adapts a wire contract to [`ComponentLister`], following cursors.
#[derive(Clone)]
pub struct ListerPluginConverter {
    contract: Arc<dyn ComponentListerContract>,
}

impl ListerPluginConverter {
    /// Wrap a wire contract.
    #[must_use]
    pub fn new(contract: Arc<dyn ComponentListerContract>) -> Self {
        Self { contract }
    }
}

#[async_trait]
impl ComponentLister for ListerPluginConverter {
    async fn ping(&self) -> PluginResult<()> {
        self.contract.ping().await
    }

    async fn lister_identity(&self, repository: &Raw) -> PluginResult<Identity> {
        let request = GetIdentityRequest {
            typ: repository.clone(),
        };
        Ok(self.contract.get_identity(&request).await?.identity)
    }

    async fn list_components(
        &self,
        repository: &Raw,
        last: &str,
        credentials: &Credentials,
        callback: &mut PageCallback<'_>,
    ) -> PluginResult<()> {
        let contract = &self.contract;
        let fetch = |cursor: String| {
            let request = ListComponentsRequest {
                repository: repository.clone(),
                last: cursor,
            };
            async move {
                let response = contract.list_components(&request, credentials).await?;
                Ok(Page {
                    items: response.list,
                    next: response.header.map(|header| header.last),
                })
            }
        };
        paginate(last.to_string(), fetch, callback).await
    }
}

/// The component lister capability.
#[derive(Debug)]
pub struct ListerCapability;

impl Capability for ListerCapability {
    type Handler = dyn ComponentLister;

    const PLUGIN_TYPE: PluginType = PluginType::ComponentLister;

    fn connect(client: PluginClient) -> Arc<Self::Handler> {
        Arc::new(ListerPluginConverter::new(Arc::new(
            ListerPluginClient::new(client),
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
    use crate::wire::ListComponentsResponseHeader;
    use ocm_runtime::Type;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves scripted pages and records every cursor it receives.
    struct ScriptedLister {
        pages: Mutex<Vec<(Vec<&'static str>, Option<&'static str>)>>,
        cursors: Mutex<Vec<String>>,
    }

    impl ScriptedLister {
        fn new(mut pages: Vec<(Vec<&'static str>, Option<&'static str>)>) -> Self {
            pages.reverse();
            Self {
                pages: Mutex::new(pages),
                cursors: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ComponentListerContract for ScriptedLister {
        async fn get_identity(
            &self,
            _request: &GetIdentityRequest,
        ) -> PluginResult<GetIdentityResponse> {
            Ok(GetIdentityResponse {
                identity: Identity::new(),
            })
        }

        async fn list_components(
            &self,
            request: &ListComponentsRequest,
            _credentials: &Credentials,
        ) -> PluginResult<ListComponentsResponse> {
            self.cursors.lock().unwrap().push(request.last.clone());
            let (list, last) = self
                .pages
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| PluginError::NotFound("no more pages".into()))?;
            Ok(ListComponentsResponse {
                list: list.into_iter().map(String::from).collect(),
                header: last.map(|last| ListComponentsResponseHeader { last: last.into() }),
            })
        }
    }

    fn repository() -> Raw {
        Raw::from_value(json!({"type": "SampleRepository/v1"})).unwrap()
    }

    async fn collect(lister: &dyn ComponentLister) -> PluginResult<Vec<String>> {
        let mut names = Vec::new();
        lister
            .list_components(&repository(), "", &Credentials::new(), &mut |page| {
                names.extend(page);
                Ok(())
            })
            .await?;
        Ok(names)
    }

    #[tokio::test]
    async fn test_lists_all_pages_in_order() {
        let scripted = Arc::new(ScriptedLister::new(vec![
            (vec!["a", "b"], Some("A")),
            (vec!["c", "d"], Some("B")),
            (vec!["e"], Some("")),
        ]));
        let lister =
            ListerPluginConverter::new(Arc::clone(&scripted) as Arc<dyn ComponentListerContract>);

        let names = collect(&lister).await.unwrap();
        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(*scripted.cursors.lock().unwrap(), vec!["", "A", "B"]);
    }

    #[tokio::test]
    async fn test_repeated_cursor_terminates() {
        let scripted = Arc::new(ScriptedLister::new(vec![
            (vec!["a"], Some("A")),
            (vec!["b"], Some("A")),
        ]));
        let lister =
            ListerPluginConverter::new(Arc::clone(&scripted) as Arc<dyn ComponentListerContract>);

        assert_eq!(collect(&lister).await.unwrap(), vec!["a", "b"]);
        assert_eq!(scripted.cursors.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_page_with_cursor_terminates() {
        let scripted = Arc::new(ScriptedLister::new(vec![(vec![], Some("A"))]));
        let lister =
            ListerPluginConverter::new(Arc::clone(&scripted) as Arc<dyn ComponentListerContract>);

        assert!(collect(&lister).await.unwrap().is_empty());
        assert_eq!(scripted.cursors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_callback_error_stops_listing() {
        let scripted = Arc::new(ScriptedLister::new(vec![
            (vec!["a"], Some("A")),
            (vec!["b"], None),
        ]));
        let lister =
            ListerPluginConverter::new(Arc::clone(&scripted) as Arc<dyn ComponentListerContract>);

        let result = lister
            .list_components(&repository(), "", &Credentials::new(), &mut |_| {
                Err(PluginError::Conversion("enough".into()))
            })
            .await;
        assert!(matches!(result, Err(PluginError::Conversion(_))));
        assert_eq!(scripted.cursors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_repository_sends_nothing() {
        let transport = Arc::new(MockTransport::default());
        let mut schemas = HashMap::new();
        schemas.insert(
            Type::versioned("SampleRepository", "v1"),
            json!({"type": "object", "required": ["components"]}),
        );
        let lister = ListerCapability::connect(
            PluginClient::new(
                PluginId::from_static("lister"),
                Arc::clone(&transport) as Arc<dyn Transport>,
            )
            .with_schemas(schemas),
        );

        let err = collect(lister.as_ref()).await.unwrap_err();
        assert!(matches!(err, PluginError::Validation { .. }));
        assert_eq!(transport.call_count(), 0);
    }
}
