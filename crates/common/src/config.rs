use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShelfConfig {
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub surface: SurfaceConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Run the PDF text extractor on accepted uploads.
    #[serde(default = "default_true")]
    pub extract_text: bool,

    /// Upper bound for a single file's extraction. A file that exceeds it is
    /// kept with empty content. Must be at least 1; `parse_config` rejects 0.
    #[serde(default = "default_extract_timeout_secs")]
    pub extract_timeout_secs: u64,

    #[serde(default = "default_max_concurrent_extractions")]
    pub max_concurrent_extractions: usize,
}

impl UploadConfig {
    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs)
    }

    /// Reject settings that would make every extraction fail.
    pub fn validate(&self) -> Result<()> {
        if self.extract_timeout_secs == 0 {
            bail!("upload.extract_timeout_secs must be at least 1");
        }
        if self.max_concurrent_extractions == 0 {
            bail!("upload.max_concurrent_extractions must be at least 1");
        }
        Ok(())
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            extract_text: true,
            extract_timeout_secs: default_extract_timeout_secs(),
            max_concurrent_extractions: default_max_concurrent_extractions(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SurfaceConfig {
    /// Where downloads are written. Defaults to the current directory.
    #[serde(default)]
    pub download_dir: Option<String>,
    /// Where previews are staged. Defaults to `<tmp>/pdf-shelf-preview`.
    #[serde(default)]
    pub preview_dir: Option<String>,
}

impl SurfaceConfig {
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn preview_dir(&self) -> PathBuf {
        self.preview_dir
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(|| std::env::temp_dir().join("pdf-shelf-preview"))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// Regexes matched against `"<target>: <message>"`; matching events are
    /// dropped from the console output.
    #[serde(default)]
    pub ignore: Vec<String>,
    /// Optional log file, written in addition to stderr.
    #[serde(default)]
    pub file: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_extract_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent_extractions() -> usize {
    4
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

/// `$XDG_CONFIG_HOME/pdf-shelf/config.toml`, falling back to `~/.config`.
pub fn default_config_path() -> String {
    let base = std::env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("pdf-shelf").join("config.toml").display().to_string()
}

/// Parse a config file, warning about keys that are not recognised (usually
/// typos that would otherwise silently fall back to defaults).
pub fn parse_config(text: &str) -> Result<ShelfConfig> {
    let (config, unknown) = parse_config_collecting_unknown(text)?;
    for key in unknown {
        tracing::warn!("unknown config key: {key}");
    }
    config.upload.validate()?;
    Ok(config)
}

fn parse_config_collecting_unknown(text: &str) -> Result<(ShelfConfig, Vec<String>)> {
    let de = toml::Deserializer::new(text);
    let mut unknown = Vec::new();
    let config: ShelfConfig = serde_ignored::deserialize(de, |path| {
        unknown.push(path.to_string());
    })
    .context("parsing config")?;
    Ok((config, unknown))
}

pub fn load_config(path: &str) -> Result<ShelfConfig> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading config {path}"))?;
    parse_config(&text)
}
