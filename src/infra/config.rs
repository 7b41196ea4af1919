// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::backend::Device;
use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the RAG backend.
    pub base_url: String,

    /// Timeout for plain request/response calls (docs, ingest, upload).
    /// Does not apply to the streaming channel.
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Compute placement requested from the backend.
    pub device: Device,

    /// Seconds of channel silence before the stream is treated as a
    /// transport error. Absent by default: an open channel with no events
    /// persists until the user cancels or the transport fails.
    pub stream_idle_timeout_secs: Option<u64>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            device: Device::Cpu,
            stream_idle_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub chunk_size: u32,
    pub chunk_overlap: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 900,
            chunk_overlap: 150,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_reasonable() {
        let c = Config::default();
        assert_eq!(c.backend.base_url, "http://localhost:8000");
        assert_eq!(c.backend.request_timeout_secs, 30);
        assert_eq!(c.chat.device, Device::Cpu);
        assert_eq!(c.chat.stream_idle_timeout_secs, None);
        assert_eq!(c.ingest.chunk_size, 900);
        assert_eq!(c.ingest.chunk_overlap, 150);
    }

    #[test]
    fn test_load_from_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[backend]
base_url = "http://10.0.0.2:9000"
request_timeout_secs = 5

[chat]
device = "gpu"
"#,
        )
        .unwrap();

        let c = Config::load_from(&path).unwrap();
        assert_eq!(c.backend.base_url, "http://10.0.0.2:9000");
        assert_eq!(c.chat.device, Device::Gpu);
        // Untouched section keeps its defaults
        assert_eq!(c.ingest.chunk_size, 900);
    }

    #[test]
    fn test_idle_timeout_opt_in() {
        let c: Config = toml::from_str("[chat]\nstream_idle_timeout_secs = 45\n").unwrap();
        assert_eq!(c.chat.stream_idle_timeout_secs, Some(45));
    }

    #[test]
    fn test_load_from_bad_toml_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not toml at all [[").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
