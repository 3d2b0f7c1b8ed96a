//! A static component catalog served page by page.

use async_trait::async_trait;
use ocm_plugin::capability::ComponentListerContract;
use ocm_plugin::wire::{
    GetIdentityRequest, GetIdentityResponse, ListComponentsRequest, ListComponentsResponse,
    ListComponentsResponseHeader,
};
use ocm_plugin::{PluginError, PluginResult};
use ocm_runtime::{Credentials, Identity, Scheme, SchemeError, Type, Typed};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

fn default_name() -> String {
    "default".to_string()
}

fn default_page_size() -> usize {
    2
}

/// A repository whose component names are part of its specification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SampleRepository {
    #[serde(rename = "type")]
    pub typ: Type,
    /// Repository name, used as its credential identity.
    #[serde(default = "default_name")]
    pub name: String,
    /// Component names in listing order.
    #[serde(default)]
    pub components: Vec<String>,
    /// Names returned per page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Refuse to list without a `token` credential.
    #[serde(default)]
    pub requires_auth: bool,
}

impl Typed for SampleRepository {
    fn get_type(&self) -> &Type {
        &self.typ
    }

    fn set_type(&mut self, typ: Type) {
        self.typ = typ;
    }
}

/// Register [`SampleRepository`] as `SampleRepository/v1`.
pub fn register(scheme: &mut Scheme) -> Result<(), SchemeError> {
    scheme.register::<SampleRepository>(Type::versioned("SampleRepository", "v1"))
}

/// Lists the components named in a [`SampleRepository`].
#[derive(Debug, Clone)]
pub struct Catalog {
    scheme: Scheme,
}

impl Catalog {
    pub fn new(scheme: Scheme) -> Self {
        Self { scheme }
    }
}

/// The page after `last` and whether more names follow it.
fn page<'a>(
    components: &'a [String],
    last: &str,
    size: usize,
) -> PluginResult<(&'a [String], bool)> {
    let start = if last.is_empty() {
        0
    } else {
        components
            .iter()
            .position(|c| c == last)
            .map(|i| i.saturating_add(1))
            .ok_or_else(|| PluginError::rejected(400, format!("unknown cursor {last}")))?
    };
    let end = start.saturating_add(size.max(1)).min(components.len());
    let items = components.get(start..end).unwrap_or_default();
    Ok((items, end < components.len()))
}

#[async_trait]
impl ComponentListerContract for Catalog {
    async fn get_identity(
        &self,
        request: &GetIdentityRequest,
    ) -> PluginResult<GetIdentityResponse> {
        let repository: SampleRepository = self.scheme.decode(&request.typ)?;
        Ok(GetIdentityResponse {
            identity: Identity::from_pairs([("repository", repository.name)]),
        })
    }

    async fn list_components(
        &self,
        request: &ListComponentsRequest,
        credentials: &Credentials,
    ) -> PluginResult<ListComponentsResponse> {
        let repository: SampleRepository = self.scheme.decode(&request.repository)?;
        if repository.requires_auth && credentials.get("token").is_none() {
            return Err(PluginError::rejected(
                401,
                format!("repository {} requires a token", repository.name),
            ));
        }

        let (items, more) = page(&repository.components, &request.last, repository.page_size)?;
        debug!(
            repository = %repository.name,
            cursor = %request.last,
            count = items.len(),
            "Listing page"
        );
        let header = if more {
            items.last().map(|last| ListComponentsResponseHeader { last: last.clone() })
        } else {
            None
        };
        Ok(ListComponentsResponse {
            list: items.to_vec(),
            header,
        })
    }
}
