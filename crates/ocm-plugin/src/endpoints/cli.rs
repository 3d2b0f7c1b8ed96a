//! Command-line entry point for plugin binaries.

use std::io::Write;

use clap::{Parser, Subcommand};

use super::Endpoints;
use crate::error::{PluginError, PluginResult};
use crate::types::LaunchConfig;

/// Arguments every plugin binary accepts.
#[derive(Debug, Parser)]
#[command(author, version, about = "OCM plugin", long_about = None)]
pub struct PluginCli {
    /// Launch config JSON passed by the plugin manager.
    #[arg(long, env = "OCM_PLUGIN_CONFIG")]
    pub config: Option<String>,

    /// Run a one-shot command instead of serving.
    #[command(subcommand)]
    pub command: Option<PluginCommand>,
}

/// Plugin subcommands.
#[derive(Debug, Subcommand)]
pub enum PluginCommand {
    /// Print the capabilities document and exit
    Capabilities,
}

/// Parse the process arguments and run the plugin.
///
/// # Errors
///
/// See [`run_plugin_with`].
pub async fn run_plugin(endpoints: Endpoints) -> PluginResult<()> {
    run_plugin_with(endpoints, PluginCli::parse()).await
}

/// Run the plugin for already parsed arguments: print the capabilities
/// document, or serve the launch config until shutdown.
///
/// # Errors
///
/// Returns [`PluginError::ConfigError`] if neither a command nor a config is
/// given or the config is invalid, and serving errors otherwise.
pub async fn run_plugin_with(endpoints: Endpoints, cli: PluginCli) -> PluginResult<()> {
    match (cli.command, cli.config) {
        (Some(PluginCommand::Capabilities), _) => {
            let document = endpoints.capabilities()?;
            let mut stdout = std::io::stdout().lock();
            serde_json::to_writer(&mut stdout, &document)?;
            writeln!(stdout)?;
            stdout.flush()?;
            Ok(())
        },
        (None, Some(json)) => {
            let config = LaunchConfig::from_json(&json)?;
            endpoints.serve(&config).await
        },
        (None, None) => Err(PluginError::ConfigError(
            "expected the capabilities command or --config <json>".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocm_runtime::Scheme;

    #[test]
    fn test_parse_arguments() {
        let cli = PluginCli::try_parse_from(["plugin", "capabilities"]).unwrap();
        assert!(matches!(cli.command, Some(PluginCommand::Capabilities)));

        let cli = PluginCli::try_parse_from(["plugin", "--config", r#"{"id":"x"}"#]).unwrap();
        assert_eq!(cli.config.as_deref(), Some(r#"{"id":"x"}"#));
        assert!(cli.command.is_none());
    }

    #[tokio::test]
    async fn test_missing_config_is_an_error() {
        let cli = PluginCli {
            config: None,
            command: None,
        };
        let err = run_plugin_with(Endpoints::new(Scheme::new()), cli)
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_invalid_config_is_an_error() {
        let cli = PluginCli {
            config: Some("not json".into()),
            command: None,
        };
        assert!(matches!(
            run_plugin_with(Endpoints::new(Scheme::new()), cli).await,
            Err(PluginError::ConfigError(_))
        ));
    }
}
