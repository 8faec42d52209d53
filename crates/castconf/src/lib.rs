//! Minimal configuration loading for castline.
//!
//! Configuration is split into two categories:
//!
//! - **Infrastructure** (`InfraConfig`): paths, bind address, telemetry.
//!   Fixed for the life of the process.
//!
//! - **Session** (`SessionConfig`): how the ingest session behaves - flush
//!   interval, implicit start, listener queue depth, chunk size limit.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/castline/config.toml` (system)
//! 2. `~/.config/castline/config.toml` (user)
//! 3. `./castline.toml` (local override, or the `--config` path)
//! 4. Environment variables (`CASTLINE_*`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! recordings_dir = "~/recordings"
//!
//! [bind]
//! host = "127.0.0.1"
//! http_port = 4000
//!
//! [telemetry]
//! otlp_endpoint = "127.0.0.1:4317"
//! log_level = "info"
//!
//! [session]
//! flush_interval_ms = 10000
//! auto_start = false
//! ```

pub mod infra;
pub mod loader;
pub mod session;

pub use infra::{BindConfig, InfraConfig, PathsConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};
pub use session::SessionConfig;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete castline configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastConfig {
    #[serde(flatten)]
    pub infra: InfraConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

impl CastConfig {
    /// Load configuration, letting `config_path` replace `./castline.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = CastConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            let file_config = loader::load_from_file(&path)?;
            config = loader::merge_configs(config, file_config);
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources, |key| std::env::var(key).ok());

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        // Built by hand so the section order matches the docs
        let mut output = String::new();

        output.push_str("# castline configuration\n\n");

        output.push_str("[paths]\n");
        output.push_str(&format!(
            "recordings_dir = \"{}\"\n",
            self.infra.paths.recordings_dir.display()
        ));

        output.push_str("\n[bind]\n");
        output.push_str(&format!("host = \"{}\"\n", self.infra.bind.host));
        output.push_str(&format!("http_port = {}\n", self.infra.bind.http_port));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!(
            "otlp_endpoint = \"{}\"\n",
            self.infra.telemetry.otlp_endpoint
        ));
        output.push_str(&format!(
            "log_level = \"{}\"\n",
            self.infra.telemetry.log_level
        ));

        output.push_str("\n[session]\n");
        output.push_str(&format!(
            "flush_interval_ms = {}\n",
            self.session.flush_interval_ms
        ));
        output.push_str(&format!("auto_start = {}\n", self.session.auto_start));
        output.push_str(&format!(
            "listener_queue = {}\n",
            self.session.listener_queue
        ));
        output.push_str(&format!(
            "max_chunk_bytes = {}\n",
            self.session.max_chunk_bytes
        ));

        output
    }
}
