// SPDX-License-Identifier: MIT
//! Daemon configuration.
//!
//! Priority: CLI flag / env var  >  `{data_dir}/config.toml`  >  built-in
//! default. The TOML file is optional; a malformed one is logged and
//! ignored rather than aborting startup.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::error;

const DEFAULT_PORT: u16 = 4500;
const DEFAULT_GREET_DELAY_MS: u64 = 3000;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".taskd")
}

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `{data_dir}/config.toml` — all fields are optional overrides.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// WebSocket server port (default: 4500).
    port: Option<u16>,
    /// Bind address for the WebSocket server (default: "127.0.0.1").
    bind_address: Option<String>,
    /// Log level filter string, e.g. "debug", "info,taskd=trace" (default: "info").
    log: Option<String>,
    /// Log output format: "pretty" (default, human-readable) | "json" (structured).
    log_format: Option<String>,
    /// Shared secret override. When unset, the daemon generates
    /// `{data_dir}/auth_token` on first start and clients read the same file.
    auth_token: Option<String>,
    /// Artificial delay for the greeting endpoint, in milliseconds (default: 3000).
    greet_delay_ms: Option<u64>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

// ─── Resolved configuration ──────────────────────────────────────────────────

/// Effective daemon configuration after all layers are applied.
#[derive(Debug, Clone)]
pub struct TaskdConfig {
    pub port: u16,
    pub bind_address: String,
    pub data_dir: PathBuf,
    pub log: String,
    pub log_format: String,
    /// Shared secret override from env or config file; `None` means use the
    /// generated `{data_dir}/auth_token` file.
    pub auth_token: Option<String>,
    /// Artificial delay for the greeting endpoint, in milliseconds.
    pub greet_delay_ms: u64,
}

impl TaskdConfig {
    /// Resolve the effective configuration from CLI arguments, the
    /// environment, the TOML config file, and built-in defaults — in that
    /// order.
    pub fn resolve(
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
        bind_address: Option<String>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        let toml = load_toml(&data_dir).unwrap_or_default();
        let env_token = std::env::var("TASKD_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());

        Self {
            port: port.or(toml.port).unwrap_or(DEFAULT_PORT),
            bind_address: bind_address
                .or(toml.bind_address)
                .unwrap_or_else(default_bind_address),
            log: log.or(toml.log).unwrap_or_else(|| "info".to_string()),
            log_format: toml.log_format.unwrap_or_else(|| "pretty".to_string()),
            auth_token: env_token.or(toml.auth_token),
            greet_delay_ms: toml.greet_delay_ms.unwrap_or(DEFAULT_GREET_DELAY_MS),
            data_dir,
        }
    }
}

impl Default for TaskdConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: default_bind_address(),
            data_dir: default_data_dir(),
            log: "info".to_string(),
            log_format: "pretty".to_string(),
            auth_token: None,
            greet_delay_ms: DEFAULT_GREET_DELAY_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = TaskdConfig::resolve(None, Some(dir.path().to_path_buf()), None, None);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.log, "info");
        assert_eq!(config.greet_delay_ms, DEFAULT_GREET_DELAY_MS);
    }

    #[test]
    fn toml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "port = 9000\nlog = \"debug\"\ngreet_delay_ms = 10\n",
        )
        .unwrap();
        let config = TaskdConfig::resolve(None, Some(dir.path().to_path_buf()), None, None);
        assert_eq!(config.port, 9000);
        assert_eq!(config.log, "debug");
        assert_eq!(config.greet_delay_ms, 10);
    }

    #[test]
    fn cli_beats_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "port = 9000\n").unwrap();
        let config = TaskdConfig::resolve(
            Some(4501),
            Some(dir.path().to_path_buf()),
            Some("warn".to_string()),
            None,
        );
        assert_eq!(config.port, 4501);
        assert_eq!(config.log, "warn");
    }

    #[test]
    fn malformed_toml_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "port = \"oops").unwrap();
        let config = TaskdConfig::resolve(None, Some(dir.path().to_path_buf()), None, None);
        assert_eq!(config.port, DEFAULT_PORT);
    }
}
