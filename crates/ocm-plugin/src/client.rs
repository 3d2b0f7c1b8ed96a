//! RPC client bound to one running plugin.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HOST};
use http::{HeaderValue, Method, StatusCode};
use ocm_runtime::{Credentials, Raw, Type};
use ocm_telemetry::{REQUEST_ID_HEADER, RequestContext};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{Instrument, debug};

use crate::error::{PluginError, PluginResult};
use crate::schema::SchemaValidator;
use crate::transport::{HttpRequest, Transport};
use crate::types::PluginId;
use crate::wire::{ErrorResponse, HEALTHZ};

/// Posts JSON requests to a plugin and decodes its responses.
///
/// Cloning is cheap; clones share the transport and the schema cache.
#[derive(Debug, Clone)]
pub struct PluginClient {
    plugin_id: PluginId,
    transport: Arc<dyn Transport>,
    validator: Arc<SchemaValidator>,
}

impl PluginClient {
    /// Create a client without any advertised schemas.
    #[must_use]
    pub fn new(plugin_id: PluginId, transport: Arc<dyn Transport>) -> Self {
        Self {
            plugin_id,
            transport,
            validator: Arc::new(SchemaValidator::default()),
        }
    }

    /// Validate typed payloads against these schemas before sending.
    #[must_use]
    pub fn with_schemas(mut self, schemas: HashMap<Type, Value>) -> Self {
        self.validator = Arc::new(SchemaValidator::new(schemas));
        self
    }

    /// The plugin this client talks to.
    #[must_use]
    pub fn plugin_id(&self) -> &PluginId {
        &self.plugin_id
    }

    /// Validate a typed payload against the plugin's advertised schema.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Validation`] if the payload is rejected.
    pub fn validate(&self, payload: &Raw) -> PluginResult<()> {
        self.validator.validate(&self.plugin_id, payload)
    }

    /// Liveness check: `GET /healthz`.
    ///
    /// # Errors
    ///
    /// Returns an error if the plugin is unreachable or unhealthy.
    pub async fn ping(&self) -> PluginResult<()> {
        let request = http::Request::builder()
            .method(Method::GET)
            .uri(HEALTHZ)
            .header(HOST, "localhost")
            .body(Bytes::new())
            .map_err(|e| PluginError::Conversion(format!("cannot build request: {e}")))?;

        let response = self.transport.send(request).await?;
        if !response.status().is_success() {
            return Err(self.error_from_response(HEALTHZ, response.status(), response.body()));
        }
        Ok(())
    }

    /// POST `request` as JSON to `path` and decode the JSON response.
    ///
    /// Credentials travel JSON-encoded in the `Authorization` header; no
    /// credentials are sent as `{}`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Application`] or [`PluginError::Protocol`]
    /// for non-2xx responses, and transport or decoding errors otherwise.
    pub async fn call<Req, Resp>(
        &self,
        path: &str,
        request: &Req,
        credentials: &Credentials,
    ) -> PluginResult<Resp>
    where
        Req: Serialize + Sync + ?Sized,
        Resp: DeserializeOwned,
    {
        let ctx = RequestContext::new(self.plugin_id.as_str(), path);
        async {
            let request = self.build_request(path, request, credentials, &ctx)?;
            let response = self.transport.send(request).await?;
            let status = response.status();
            if !status.is_success() {
                return Err(self.error_from_response(path, status, response.body()));
            }

            debug!(status = %status, elapsed_ms = ctx.elapsed_ms(), "Plugin call completed");
            serde_json::from_slice(response.body()).map_err(|e| PluginError::Protocol {
                plugin_id: self.plugin_id.clone(),
                operation: path.to_string(),
                status: status.as_u16(),
                body: format!("invalid response body: {e}"),
            })
        }
        .instrument(ctx.span())
        .await
    }

    fn build_request<Req: Serialize + ?Sized>(
        &self,
        path: &str,
        request: &Req,
        credentials: &Credentials,
        ctx: &RequestContext,
    ) -> PluginResult<HttpRequest> {
        let body = serde_json::to_vec(request)?;
        let auth = serde_json::to_vec(credentials)?;
        let auth = HeaderValue::from_bytes(&auth).map_err(|e| {
            PluginError::Conversion(format!("credentials cannot be sent as a header: {e}"))
        })?;

        http::Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(HOST, "localhost")
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, auth)
            .header(REQUEST_ID_HEADER, ctx.header_value())
            .body(Bytes::from(body))
            .map_err(|e| PluginError::Conversion(format!("cannot build request: {e}")))
    }

    fn error_from_response(&self, path: &str, status: StatusCode, body: &Bytes) -> PluginError {
        if let Ok(ErrorResponse { error }) = serde_json::from_slice::<ErrorResponse>(body) {
            return PluginError::Application {
                plugin_id: self.plugin_id.clone(),
                operation: path.to_string(),
                status: status.as_u16(),
                message: error,
            };
        }
        PluginError::Protocol {
            plugin_id: self.plugin_id.clone(),
            operation: path.to_string(),
            status: status.as_u16(),
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }
}
