//! HTTP transport to a running plugin.
//!
//! Plugins speak HTTP/1.1 over a Unix domain socket or a localhost TCP
//! port. The [`Transport`] trait is the seam the RPC client sends through;
//! [`HttpTransport`] is the real implementation.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};
use tracing::debug;

use crate::error::{PluginError, PluginResult};
use crate::types::PluginLocation;

/// A request with a fully buffered body.
pub type HttpRequest = http::Request<Bytes>;

/// A response with a fully buffered body.
pub type HttpResponse = http::Response<Bytes>;

/// Sends one request to a plugin and returns its response.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Send a request.
    async fn send(&self, request: HttpRequest) -> PluginResult<HttpResponse>;
}

/// HTTP/1.1 over a fresh connection per request.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    location: PluginLocation,
}

impl HttpTransport {
    /// Create a transport for a location.
    #[must_use]
    pub fn new(location: PluginLocation) -> Self {
        Self { location }
    }

    /// The plugin's location.
    #[must_use]
    pub fn location(&self) -> &PluginLocation {
        &self.location
    }

    fn error(&self, message: impl fmt::Display) -> PluginError {
        PluginError::Transport {
            location: self.location.to_string(),
            message: message.to_string(),
        }
    }

    async fn exchange<S>(&self, stream: S, request: HttpRequest) -> PluginResult<HttpResponse>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sender, connection) =
            hyper::client::conn::http1::handshake::<_, Full<Bytes>>(TokioIo::new(stream))
                .await
                .map_err(|e| self.error(format!("HTTP handshake failed: {e}")))?;

        let location = self.location.to_string();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(location = %location, error = %e, "Plugin connection closed with error");
            }
        });

        let (parts, body) = request.into_parts();
        let response = sender
            .send_request(http::Request::from_parts(parts, Full::new(body)))
            .await
            .map_err(|e| self.error(format!("request failed: {e}")))?;

        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| self.error(format!("failed to read response body: {e}")))?
            .to_bytes();
        Ok(http::Response::from_parts(parts, body))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> PluginResult<HttpResponse> {
        match &self.location {
            PluginLocation::Socket(path) => {
                let stream = UnixStream::connect(path)
                    .await
                    .map_err(|e| self.error(format!("connect failed: {e}")))?;
                self.exchange(stream, request).await
            },
            PluginLocation::Tcp(addr) => {
                let stream = TcpStream::connect(addr)
                    .await
                    .map_err(|e| self.error(format!("connect failed: {e}")))?;
                self.exchange(stream, request).await
            },
        }
    }
}
