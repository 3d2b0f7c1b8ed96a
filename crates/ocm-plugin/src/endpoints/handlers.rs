//! Request handlers and error responses.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use ocm_runtime::{Credentials, Type, Typed};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use super::Handler;
use crate::capability::{ComponentListerContract, DigestProcessorContract, ResourcePluginContract};
use crate::error::PluginError;
use crate::types::PluginType;
use crate::wire::{
    AddGlobalResourceRequest, AddGlobalResourceResponse, ErrorResponse, GetGlobalResourceRequest,
    GetGlobalResourceResponse, GetIdentityRequest, GetIdentityResponse, ListComponentsRequest,
    ListComponentsResponse, ProcessResourceDigestRequest, ProcessResourceDigestResponse,
    ResourceDto,
};

/// A [`PluginError`] rendered as an HTTP error response with a
/// `{"error": msg}` body.
#[derive(Debug)]
pub struct ApiError(pub PluginError);

impl From<PluginError> for ApiError {
    fn from(error: PluginError) -> Self {
        Self(error)
    }
}

impl ApiError {
    /// The status code this error is answered with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            PluginError::Rejected { status, .. } | PluginError::Application { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            },
            PluginError::Validation { .. }
            | PluginError::Scheme(_)
            | PluginError::Serialization(_)
            | PluginError::Conversion(_) => StatusCode::BAD_REQUEST,
            PluginError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.0.to_string();
        if status.is_server_error() {
            error!(status = %status, error = %message, "Request failed");
        } else {
            debug!(status = %status, error = %message, "Request rejected");
        }
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Per-router state.
pub(crate) struct ServeState {
    pub(crate) plugin_type: PluginType,
    pub(crate) types: Vec<Type>,
    pub(crate) handler: Handler,
}

impl ServeState {
    fn check_type(&self, typ: &Type) -> Result<(), ApiError> {
        if self.types.contains(typ) {
            return Ok(());
        }
        let typ = if typ.is_empty() { "<none>".to_string() } else { typ.to_string() };
        Err(PluginError::rejected(
            StatusCode::BAD_REQUEST.as_u16(),
            format!("type {typ} is not served by this {} plugin", self.plugin_type),
        )
        .into())
    }

    fn check_access(&self, resource: &ResourceDto) -> Result<(), ApiError> {
        let access = resource.access.as_ref().ok_or_else(|| {
            PluginError::rejected(
                StatusCode::BAD_REQUEST.as_u16(),
                format!("resource {} has no access specification", resource.name),
            )
        })?;
        self.check_type(access.get_type())
    }

    fn wrong_capability(&self) -> ApiError {
        let message = format!("operation not served by this {} plugin", self.plugin_type);
        PluginError::NotFound(message).into()
    }

    fn resource(&self) -> Result<&Arc<dyn ResourcePluginContract>, ApiError> {
        match &self.handler {
            Handler::Resource(handler) => Ok(handler),
            _ => Err(self.wrong_capability()),
        }
    }

    fn digest(&self) -> Result<&Arc<dyn DigestProcessorContract>, ApiError> {
        match &self.handler {
            Handler::Digest(handler) => Ok(handler),
            _ => Err(self.wrong_capability()),
        }
    }

    fn lister(&self) -> Result<&Arc<dyn ComponentListerContract>, ApiError> {
        match &self.handler {
            Handler::Lister(handler) => Ok(handler),
            _ => Err(self.wrong_capability()),
        }
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError(e.into()))
}

/// Credentials from the `Authorization` header; absent or empty means none.
fn credentials(headers: &HeaderMap) -> Result<Credentials, ApiError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(Credentials::new());
    };
    if value.is_empty() {
        return Ok(Credentials::new());
    }
    serde_json::from_slice(value.as_bytes()).map_err(|e| {
        PluginError::rejected(
            StatusCode::BAD_REQUEST.as_u16(),
            format!("invalid credentials header: {e}"),
        )
        .into()
    })
}

pub(crate) async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub(crate) async fn identity(
    State(state): State<Arc<ServeState>>,
    body: Bytes,
) -> ApiResult<GetIdentityResponse> {
    let request: GetIdentityRequest = decode(&body)?;
    state.check_type(request.typ.get_type())?;

    let response = match &state.handler {
        Handler::Resource(handler) => handler.get_identity(&request).await,
        Handler::Digest(handler) => handler.get_identity(&request).await,
        Handler::Lister(handler) => handler.get_identity(&request).await,
    }?;
    Ok(Json(response))
}

pub(crate) async fn get_resource(
    State(state): State<Arc<ServeState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<GetGlobalResourceResponse> {
    let request: GetGlobalResourceRequest = decode(&body)?;
    state.check_access(&request.resource)?;
    let credentials = credentials(&headers)?;
    Ok(Json(
        state
            .resource()?
            .get_global_resource(&request, &credentials)
            .await?,
    ))
}

pub(crate) async fn add_resource(
    State(state): State<Arc<ServeState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<AddGlobalResourceResponse> {
    let request: AddGlobalResourceRequest = decode(&body)?;
    state.check_access(&request.resource)?;
    let credentials = credentials(&headers)?;
    Ok(Json(
        state
            .resource()?
            .add_global_resource(&request, &credentials)
            .await?,
    ))
}

pub(crate) async fn process_digest(
    State(state): State<Arc<ServeState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<ProcessResourceDigestResponse> {
    let request: ProcessResourceDigestRequest = decode(&body)?;
    state.check_access(&request.resource)?;
    let credentials = credentials(&headers)?;
    Ok(Json(
        state
            .digest()?
            .process_resource_digest(&request, &credentials)
            .await?,
    ))
}

pub(crate) async fn list_components(
    State(state): State<Arc<ServeState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<ListComponentsResponse> {
    let request: ListComponentsRequest = decode(&body)?;
    state.check_type(request.repository.get_type())?;
    let credentials = credentials(&headers)?;
    Ok(Json(
        state
            .lister()?
            .list_components(&request, &credentials)
            .await?,
    ))
}
