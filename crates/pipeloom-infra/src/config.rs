//! Global configuration loader for pipeloom.
//!
//! Reads `pipeloom.toml` from the data directory (`~/.pipeloom/` unless
//! `PIPELOOM_DATA_DIR` says otherwise) and deserializes it into
//! [`GlobalConfig`]. Falls back to defaults when the file is missing or
//! malformed.

use std::path::{Path, PathBuf};

use pipeloom_types::config::GlobalConfig;

/// File name of the global config inside the data directory.
pub const CONFIG_FILE_NAME: &str = "pipeloom.toml";

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "PIPELOOM_DATA_DIR";

/// Resolve the data directory: `PIPELOOM_DATA_DIR`, else `~/.pipeloom`,
/// else `./.pipeloom` when no home directory is known.
pub fn resolve_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pipeloom")
}

/// Load global configuration from `{data_dir}/pipeloom.toml`.
///
/// - Missing file: [`GlobalConfig::default()`].
/// - Unreadable or unparsable file: logs a warning and returns the default.
/// - A relative `context.knowledge_dir` is resolved against `data_dir`.
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let config_path = data_dir.join(CONFIG_FILE_NAME);

    let mut config = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => match toml::from_str::<GlobalConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(
                    "Failed to parse {}: {err}, using defaults",
                    config_path.display()
                );
                GlobalConfig::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No {CONFIG_FILE_NAME} found at {}, using defaults", config_path.display());
            GlobalConfig::default()
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            GlobalConfig::default()
        }
    };

    if config.context.knowledge_dir.is_relative() {
        config.context.knowledge_dir = data_dir.join(&config.context.knowledge_dir);
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeloom_types::llm::ProviderType;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.engine.poll_interval_ms, 100);
        assert_eq!(config.llm.provider, ProviderType::Anthropic);
        assert_eq!(config.context.knowledge_dir, tmp.path().join("knowledge"));
    }

    #[tokio::test]
    async fn valid_toml_is_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join(CONFIG_FILE_NAME),
            r#"
[engine]
poll_interval_ms = 25
stop_drain_timeout_secs = 0

[llm]
provider = "echo"
model = "echo-1"

[context]
knowledge_dir = "/srv/kb"

[server]
port = 8088
"#,
        )
        .await
        .unwrap();

        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.engine.poll_interval_ms, 25);
        assert!(config.engine.stop_drain_timeout().is_none());
        assert_eq!(config.llm.provider, ProviderType::Echo);
        assert_eq!(config.llm.model, "echo-1");
        assert_eq!(config.context.knowledge_dir, PathBuf::from("/srv/kb"));
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[tokio::test]
    async fn invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join(CONFIG_FILE_NAME), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.engine.event_buffer, 256);
        assert_eq!(config.server.port, 3000);
    }
}
