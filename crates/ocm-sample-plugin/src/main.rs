//! Reference OCM plugin.
//!
//! Serves `SampleArtifact` access specifications from the local filesystem
//! (resource repository and digest processor) and lists the components of
//! `SampleRepository` specifications (component lister).
//!
//! ```text
//! ocm-sample-plugin capabilities
//! ocm-sample-plugin --config \
//!     '{"id":"sample-resource","type":"socket","pluginType":"resourceRepository"}'
//! ```
//!
//! Logs go to stderr; set `OCM_PLUGIN_LOG` to change the level.

mod artifact;
mod catalog;

use std::sync::Arc;

use anyhow::Result;
use ocm_plugin::{Endpoints, run_plugin};
use ocm_runtime::Scheme;
use ocm_telemetry::{LogConfig, PLUGIN_LOG_ENV, level_from_env, setup_logging};

use artifact::{ArtifactStore, SampleArtifact};
use catalog::{Catalog, SampleRepository};

fn endpoints() -> Result<Endpoints> {
    let mut scheme = Scheme::new();
    artifact::register(&mut scheme)?;
    catalog::register(&mut scheme)?;

    let store = Arc::new(ArtifactStore::new(scheme.clone()));
    let catalog = Arc::new(Catalog::new(scheme.clone()));
    Ok(Endpoints::new(scheme)
        .with_resource_repository::<SampleArtifact>(Arc::clone(&store) as _)?
        .with_digest_processor::<SampleArtifact>(store)?
        .with_component_lister::<SampleRepository>(catalog)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let level = level_from_env(PLUGIN_LOG_ENV, "info");
    if let Err(e) = setup_logging(&LogConfig::for_plugin(level)) {
        eprintln!("Failed to initialize logging: {e}");
    }

    run_plugin(endpoints()?).await?;
    Ok(())
}
