//! User configuration, read from `<config dir>/glitchbox/config.toml`.

use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{analysis::DEFAULT_FFT_SIZE, session::RenderSettings, wav};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub render: RenderConfig,
    pub visualizer: VisualizerConfig,
    pub share: ShareConfig,
}

/// Offline render ("save") settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub file_name: String,
    pub output_dir: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            duration_secs: 30.0,
            sample_rate: 48_000,
            file_name: wav::FILE_NAME.to_owned(),
            output_dir: None,
        }
    }
}

impl RenderConfig {
    pub fn settings(&self) -> RenderSettings {
        RenderSettings {
            duration: Duration::try_from_secs_f64(self.duration_secs).unwrap_or_default(),
            sample_rate: self.sample_rate,
        }
    }

    /// Where saved renders are written.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(&self.file_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    pub fft_size: usize,
    /// Capacity of the audio → visualizer sample ring
    pub tap_capacity: usize,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            tap_capacity: 16_384,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    /// Prefix for share links; the expression goes after `#`.
    pub base_url: String,
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("glitchbox").join("config.toml"))
    }

    /// Load from the default location, falling back to defaults.
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        Self::load_or_default(&path)
    }

    /// Load from `path`, falling back to defaults on any failure.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load_from(path) {
            Ok(config) => config,
            Err(err) => {
                if path.exists() {
                    tracing::warn!(%err, "ignoring config file");
                }
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, contents)
    }
}
