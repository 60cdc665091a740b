//! Server configuration: optional TOML file plus environment overrides.

use anyhow::Context;
use docsift_ocr::PipelineConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Path to an optional TOML config file.
pub const CONFIG_ENV: &str = "DOCSIFT_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body, multipart framing included.
    pub max_upload_bytes: usize,
    pub pipeline: PipelineConfig,
    pub engines: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_bytes: 20 * 1024 * 1024,
            pipeline: PipelineConfig::default(),
            engines: EngineConfig::default(),
        }
    }
}

/// Where the real recognition engines find their data. Only consulted when
/// the matching cargo feature is enabled.
#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
#[serde(default)]
pub struct EngineConfig {
    /// Tesseract `tessdata` directory; `None` uses the system default.
    pub tessdata_path: Option<String>,
    pub tesseract_lang: String,
    /// Tesseract worker threads; each holds its own loaded handle.
    pub tesseract_workers: usize,
    /// Directory holding `det.onnx`, `rec.onnx` and `dict.txt`.
    pub onnx_model_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tessdata_path: None,
            tesseract_lang: "eng".to_string(),
            tesseract_workers: 2,
            onnx_model_dir: None,
        }
    }
}

impl ServerConfig {
    /// Read `DOCSIFT_CONFIG` if set, then apply `DOCSIFT_*` overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(host) = lookup("DOCSIFT_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("DOCSIFT_PORT") {
            self.port = port.parse().with_context(|| format!("invalid DOCSIFT_PORT {port:?}"))?;
        }
        if let Some(ms) = lookup("DOCSIFT_TIMEOUT_MS") {
            let ms: u64 = ms.parse().with_context(|| format!("invalid DOCSIFT_TIMEOUT_MS {ms:?}"))?;
            // Zero disables the budget.
            self.pipeline.timeout_ms = (ms > 0).then_some(ms);
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}
