/// `load_config` module: loads an optional YAML config file into [`SnapshotOptions`].
///
/// The file carries no secrets; the API token and endpoint always come from the
/// environment (see [`crate::client`]). Only the `snapshot:` section is read:
///
/// ```yaml
/// snapshot:
///   repo: acme/site
///   baseurl: /docs/
///   threads: 20
///   widths: [375, 1280]
/// ```
///
/// Every key is optional and falls back to the [`SnapshotOptions`] default.
/// Command-line flags are layered on top by [`crate::cli`].
///
/// # Errors
/// Read and parse failures surface as `anyhow::Error` with the file path in
/// the message.
use anyhow::Result;
use serde::Deserialize;
use sitesnap_core::config::SnapshotOptions;
use std::fs;
use std::path::Path;
use tracing::{error, info};

#[derive(Debug, Default, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub snapshot: SnapshotOptions,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    // An empty file is a valid, all-defaults config.
    if config_content.trim().is_empty() {
        return Ok(CliConfig::default());
    }

    match serde_yaml::from_str::<CliConfig>(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            Ok(conf)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML {:?}: {e}", path_ref))
        }
    }
}
