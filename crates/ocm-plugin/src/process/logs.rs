//! Forwarding of plugin output into `tracing`.

use tokio::io::{AsyncBufRead, Lines};
use tracing::{debug, info};

use crate::types::PluginId;

/// Copy every line into an `info` event tagged with the plugin and stream
/// until the stream closes.
pub(crate) async fn forward_lines<R>(plugin_id: PluginId, stream: &'static str, mut lines: Lines<R>)
where
    R: AsyncBufRead + Unpin,
{
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                info!(plugin_id = %plugin_id, stream, "{line}");
            },
            Ok(None) => break,
            Err(e) => {
                debug!(plugin_id = %plugin_id, stream, error = %e, "Stopped reading plugin output");
                break;
            },
        }
    }
}

/// Spawn [`forward_lines`] as a background task.
pub(crate) fn spawn_forwarder<R>(plugin_id: PluginId, stream: &'static str, lines: Lines<R>)
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(forward_lines(plugin_id, stream, lines));
}
