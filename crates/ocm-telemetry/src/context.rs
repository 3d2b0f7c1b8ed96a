//! Request IDs that follow one plugin call from the host into the plugin.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Header carrying the request ID on plugin RPCs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation data for one plugin call.
///
/// The host creates one per RPC and sends its ID in [`REQUEST_ID_HEADER`];
/// the plugin rebuilds it with [`RequestContext::received`], so events on
/// both sides of the call carry the same `request_id`.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique request identifier.
    pub request_id: Uuid,
    /// Plugin instance handling the call.
    pub plugin_id: String,
    /// RPC path.
    pub operation: String,
    /// When this side saw the call start.
    pub started_at: DateTime<Utc>,
}

impl RequestContext {
    /// A fresh context for a call to `plugin_id`.
    #[must_use]
    pub fn new(plugin_id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), plugin_id, operation)
    }

    /// The context of a call received from the host.
    ///
    /// Reuses the ID from the request header when it parses; a missing or
    /// malformed header gets a fresh ID.
    #[must_use]
    pub fn received(
        plugin_id: impl Into<String>,
        operation: impl Into<String>,
        header: Option<&str>,
    ) -> Self {
        let request_id = header
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .unwrap_or_else(Uuid::new_v4);
        Self::with_id(request_id, plugin_id, operation)
    }

    fn with_id(
        request_id: Uuid,
        plugin_id: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            request_id,
            plugin_id: plugin_id.into(),
            operation: operation.into(),
            started_at: Utc::now(),
        }
    }

    /// Value for [`REQUEST_ID_HEADER`].
    #[must_use]
    pub fn header_value(&self) -> String {
        self.request_id.hyphenated().to_string()
    }

    /// Milliseconds since the call started.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_milliseconds()
    }

    /// A span carrying this context.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "plugin_request",
            request_id = %self.request_id,
            plugin_id = %self.plugin_id,
            operation = %self.operation,
        )
    }
}
