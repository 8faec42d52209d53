//! Config file discovery, loading, and environment variable overlay.

use crate::{CastConfig, ConfigError, InfraConfig, SessionConfig};
use crate::infra::{BindConfig, PathsConfig, TelemetryConfig};
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/castline/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("castline/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("castline.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load config from a TOML file.
pub fn load_from_file(path: &Path) -> Result<CastConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_toml(&contents, path)
}

/// Parse config from TOML string. Missing keys keep their defaults.
fn parse_toml(contents: &str, path: &Path) -> Result<CastConfig, ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut config = CastConfig::default();

    if let Some(paths) = table.get("paths").and_then(|v| v.as_table()) {
        if let Some(v) = paths.get("recordings_dir").and_then(|v| v.as_str()) {
            config.infra.paths.recordings_dir = expand_path(v);
        }
    }

    if let Some(bind) = table.get("bind").and_then(|v| v.as_table()) {
        if let Some(v) = bind.get("host").and_then(|v| v.as_str()) {
            config.infra.bind.host = v.to_string();
        }
        if let Some(v) = bind.get("http_port").and_then(|v| v.as_integer()) {
            config.infra.bind.http_port = u16::try_from(v).map_err(|_| ConfigError::Parse {
                path: path.to_path_buf(),
                message: format!("bind.http_port out of range: {}", v),
            })?;
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("otlp_endpoint").and_then(|v| v.as_str()) {
            config.infra.telemetry.otlp_endpoint = v.to_string();
        }
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.infra.telemetry.log_level = v.to_string();
        }
    }

    if let Some(session) = table.get("session").and_then(|v| v.as_table()) {
        if let Some(v) = session.get("flush_interval_ms").and_then(|v| v.as_integer()) {
            config.session.flush_interval_ms = non_negative(v, "session.flush_interval_ms", path)?;
        }
        if let Some(v) = session.get("auto_start").and_then(|v| v.as_bool()) {
            config.session.auto_start = v;
        }
        if let Some(v) = session.get("listener_queue").and_then(|v| v.as_integer()) {
            config.session.listener_queue =
                non_negative(v, "session.listener_queue", path)?.max(1) as usize;
        }
        if let Some(v) = session.get("max_chunk_bytes").and_then(|v| v.as_integer()) {
            config.session.max_chunk_bytes =
                non_negative(v, "session.max_chunk_bytes", path)? as usize;
        }
    }

    Ok(config)
}

fn non_negative(value: i64, key: &str, path: &Path) -> Result<u64, ConfigError> {
    u64::try_from(value).map_err(|_| ConfigError::Parse {
        path: path.to_path_buf(),
        message: format!("{} must not be negative: {}", key, value),
    })
}

/// Pick `overlay` when it differs from the default, otherwise keep `base`.
fn pick<T: PartialEq>(base: T, overlay: T, default: T) -> T {
    if overlay != default {
        overlay
    } else {
        base
    }
}

/// Merge two configs, with `overlay` taking precedence field by field.
pub fn merge_configs(base: CastConfig, overlay: CastConfig) -> CastConfig {
    let paths = PathsConfig::default();
    let bind = BindConfig::default();
    let telemetry = TelemetryConfig::default();
    let session = SessionConfig::default();

    CastConfig {
        infra: InfraConfig {
            paths: PathsConfig {
                recordings_dir: pick(
                    base.infra.paths.recordings_dir,
                    overlay.infra.paths.recordings_dir,
                    paths.recordings_dir,
                ),
            },
            bind: BindConfig {
                host: pick(base.infra.bind.host, overlay.infra.bind.host, bind.host),
                http_port: pick(
                    base.infra.bind.http_port,
                    overlay.infra.bind.http_port,
                    bind.http_port,
                ),
            },
            telemetry: TelemetryConfig {
                otlp_endpoint: pick(
                    base.infra.telemetry.otlp_endpoint,
                    overlay.infra.telemetry.otlp_endpoint,
                    telemetry.otlp_endpoint,
                ),
                log_level: pick(
                    base.infra.telemetry.log_level,
                    overlay.infra.telemetry.log_level,
                    telemetry.log_level,
                ),
            },
        },
        session: SessionConfig {
            flush_interval_ms: pick(
                base.session.flush_interval_ms,
                overlay.session.flush_interval_ms,
                session.flush_interval_ms,
            ),
            auto_start: pick(
                base.session.auto_start,
                overlay.session.auto_start,
                session.auto_start,
            ),
            listener_queue: pick(
                base.session.listener_queue,
                overlay.session.listener_queue,
                session.listener_queue,
            ),
            max_chunk_bytes: pick(
                base.session.max_chunk_bytes,
                overlay.session.max_chunk_bytes,
                session.max_chunk_bytes,
            ),
        },
    }
}

/// Apply environment variable overrides to config.
///
/// `lookup` is `std::env::var` in production; tests pass a map.
pub fn apply_env_overrides<F>(config: &mut CastConfig, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let mut record = |key: &str| sources.env_overrides.push(key.to_string());

    if let Some(v) = lookup("CASTLINE_RECORDINGS_DIR") {
        config.infra.paths.recordings_dir = expand_path(&v);
        record("CASTLINE_RECORDINGS_DIR");
    }

    if let Some(v) = lookup("CASTLINE_HOST") {
        config.infra.bind.host = v;
        record("CASTLINE_HOST");
    }
    if let Some(port) = lookup("CASTLINE_HTTP_PORT").and_then(|v| v.parse().ok()) {
        config.infra.bind.http_port = port;
        record("CASTLINE_HTTP_PORT");
    }

    if let Some(v) = lookup("CASTLINE_OTLP_ENDPOINT") {
        config.infra.telemetry.otlp_endpoint = v;
        record("CASTLINE_OTLP_ENDPOINT");
    }
    // Standard OTEL env var
    if let Some(v) = lookup("OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.infra.telemetry.otlp_endpoint = v;
        record("OTEL_EXPORTER_OTLP_ENDPOINT");
    }
    if let Some(v) = lookup("CASTLINE_LOG_LEVEL") {
        config.infra.telemetry.log_level = v;
        record("CASTLINE_LOG_LEVEL");
    }
    if let Some(v) = lookup("RUST_LOG") {
        config.infra.telemetry.log_level = v;
        record("RUST_LOG");
    }

    if let Some(ms) = lookup("CASTLINE_FLUSH_INTERVAL_MS").and_then(|v| v.parse().ok()) {
        config.session.flush_interval_ms = ms;
        record("CASTLINE_FLUSH_INTERVAL_MS");
    }
    if let Some(v) = lookup("CASTLINE_AUTO_START") {
        config.session.auto_start = matches!(v.as_str(), "1" | "true" | "yes");
        record("CASTLINE_AUTO_START");
    }
}

/// Expand `~/` and a leading `$VAR` in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
        return PathBuf::from(path);
    }

    if let Some(stripped) = path.strip_prefix('$') {
        let (var_name, rest) = match stripped.find('/') {
            Some(pos) => (&stripped[..pos], Some(&stripped[pos + 1..])),
            None => (stripped, None),
        };
        if let Ok(value) = std::env::var(var_name) {
            let base = PathBuf::from(value);
            return match rest {
                Some(rest) => base.join(rest),
                None => base,
            };
        }
    }

    PathBuf::from(path)
}
